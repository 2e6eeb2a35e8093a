//! GrabController — две руки игрока + camera-relative hold + movement strain
//!
//! Архитектура:
//! - Input (Update): press/release кнопки → toggle / try_grab / release
//! - Drive (FixedUpdate): desired hold из camera pose → обе руки → authority
//! - Authority = замедление игрока, когда руки растянуты и под нагрузкой

use bevy::prelude::*;

use super::config::{ConfigError, GrabConfig, GrabMode};
use super::events::ButtonPhase;
use super::hand::{DriveReport, GrabHand, GrabRejection, GrabRequest, Hand, Release, ReleaseReason};
use super::math::{clamp01, inverse_lerp, lerp};
use crate::components::PlayerCamera;
use crate::physics::{BodyId, ColliderId, GrabPhysics, RayQuery};

/// Успешный захват
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabStart {
    pub hand: Hand,
    pub target: BodyId,
    pub collider: ColliderId,
    pub grab_point: Vec3,
    /// Предыдущий объект этой руки (re-entrant start)
    pub replaced: Option<Release>,
}

/// Что сделала кнопка
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ButtonOutcome {
    Started(GrabStart),
    Released(Release),
    Rejected(GrabRejection),
    /// Фаза кнопки ничего не значит в текущем mode/state
    Ignored,
}

/// Итог drive pass обеих рук
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrainReport {
    pub left: DriveReport,
    pub right: DriveReport,
    pub authority: f32,
}

impl StrainReport {
    pub fn hand(&self, hand: Hand) -> &DriveReport {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }
}

/// Authority игрока по strain обеих рук
///
/// stretch = max(l, r); slow01 = inverse_lerp(slow_start, 1, stretch);
/// strain = clamp01(max(slow01, slow01 × load)); authority = lerp(1, min, strain)
pub fn movement_authority(config: &GrabConfig, left: &DriveReport, right: &DriveReport) -> f32 {
    let stretch = left.stretch01.max(right.stretch01);
    let slow01 = inverse_lerp(config.slow_player_start_at_stretch01, 1.0, stretch);
    let load = left.load01.max(right.load01);
    let strain = clamp01(slow01.max(slow01 * load));

    lerp(1.0, config.min_authority_at_full_stretch, strain)
}

/// Grab контроллер игрока (Component)
///
/// Инвариант: одна рука ↔ максимум один объект, один объект ↔ максимум одна рука.
#[derive(Component, Debug)]
pub struct GrabController {
    config: GrabConfig,
    left: GrabHand,
    right: GrabHand,
    /// Последний drive pass (читается authority системой один раз)
    pending_strain: Option<StrainReport>,
}

impl Default for GrabController {
    fn default() -> Self {
        Self::from_validated(GrabConfig::default())
    }
}

impl GrabController {
    /// Конфиг из кода проходит тот же `validate()`, что и JSON
    /// (slack < arm_max < hard_release, положительные силы и дистанции).
    pub fn new(config: GrabConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: GrabConfig) -> Self {
        Self {
            config,
            left: GrabHand::new(Hand::Left),
            right: GrabHand::new(Hand::Right),
            pending_strain: None,
        }
    }

    pub fn config(&self) -> &GrabConfig {
        &self.config
    }

    pub fn hand(&self, hand: Hand) -> &GrabHand {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    fn hand_mut(&mut self, hand: Hand) -> &mut GrabHand {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }

    pub fn is_grabbing(&self, hand: Hand) -> bool {
        self.hand(hand).is_grabbing()
    }

    /// Какая рука держит `body`
    pub fn held_by(&self, body: BodyId) -> Option<Hand> {
        Hand::ALL.into_iter().find(|&hand| self.hand(hand).target() == Some(body))
    }

    /// Забрать strain последнего drive pass (None если drive не было)
    pub fn take_strain(&mut self) -> Option<StrainReport> {
        self.pending_strain.take()
    }

    /// Кнопка руки с учётом GrabMode
    pub fn on_button(
        &mut self,
        hand: Hand,
        phase: ButtonPhase,
        physics: &mut dyn GrabPhysics,
        camera: Option<&PlayerCamera>,
        player_colliders: &[ColliderId],
    ) -> ButtonOutcome {
        match (self.config.grab_mode, phase) {
            (GrabMode::Toggle, ButtonPhase::Pressed) => self.toggle(hand, physics, camera, player_colliders),
            (GrabMode::Toggle, ButtonPhase::Released) => ButtonOutcome::Ignored,
            (GrabMode::Hold, ButtonPhase::Pressed) => {
                if self.is_grabbing(hand) {
                    return ButtonOutcome::Ignored;
                }
                match self.try_grab(hand, physics, camera, player_colliders) {
                    Ok(start) => ButtonOutcome::Started(start),
                    Err(rejection) => ButtonOutcome::Rejected(rejection),
                }
            }
            (GrabMode::Hold, ButtonPhase::Released) => match self.release(hand, physics) {
                Some(release) => ButtonOutcome::Released(release),
                None => ButtonOutcome::Ignored,
            },
        }
    }

    /// Press в toggle mode: держим → отпустить, иначе → попытка захвата
    pub fn toggle(
        &mut self,
        hand: Hand,
        physics: &mut dyn GrabPhysics,
        camera: Option<&PlayerCamera>,
        player_colliders: &[ColliderId],
    ) -> ButtonOutcome {
        if let Some(release) = self.release(hand, physics) {
            return ButtonOutcome::Released(release);
        }

        match self.try_grab(hand, physics, camera, player_colliders) {
            Ok(start) => ButtonOutcome::Started(start),
            Err(rejection) => ButtonOutcome::Rejected(rejection),
        }
    }

    /// Raycast из камеры → start_grab на руке
    pub fn try_grab(
        &mut self,
        hand: Hand,
        physics: &mut dyn GrabPhysics,
        camera: Option<&PlayerCamera>,
        player_colliders: &[ColliderId],
    ) -> Result<GrabStart, GrabRejection> {
        let camera = camera.ok_or(GrabRejection::NoCamera)?;

        let hit = physics
            .cast_ray(&RayQuery {
                origin: camera.position(),
                direction: camera.forward(),
                max_distance: self.config.grab_distance,
                layer_mask: self.config.grab_mask,
                exclude: player_colliders,
            })
            .ok_or(GrabRejection::NothingHit)?;

        let target = hit.body.ok_or(GrabRejection::NoRigidBody)?;

        if let Some(holder) = self.held_by(target) {
            if holder != hand {
                return Err(GrabRejection::AlreadyHeld(holder));
            }
        }

        let grabbable = physics
            .body_info(target)
            .ok_or(GrabRejection::TargetMissing)?
            .grabbable
            .ok_or(GrabRejection::NotGrabbable)?;

        let local_hold = self.config.hold_at_grab_point.then(|| {
            let mut local = camera.inverse_transform_point(hit.point);
            // Forward = -Z: точка не ближе min_hold_forward перед камерой
            local.z = local.z.min(-self.config.min_hold_forward);
            local
        });

        let config = self.config;
        let request = GrabRequest {
            target,
            grab_point: hit.point,
            weight_multiplier: grabbable.weight_multiplier,
            local_hold,
            grabbed_collider: Some(hit.collider),
            ignore_collision: config.ignore_player_collision_while_grabbed,
            player_colliders,
        };
        let replaced = self.hand_mut(hand).start_grab(physics, &request, &config)?;

        Ok(GrabStart {
            hand,
            target,
            collider: hit.collider,
            grab_point: hit.point,
            replaced,
        })
    }

    pub fn release(&mut self, hand: Hand, physics: &mut dyn GrabPhysics) -> Option<Release> {
        self.hand_mut(hand).release(physics, ReleaseReason::Requested)
    }

    /// Отпустить обе руки (despawn игрока, смена уровня)
    pub fn release_all(&mut self, physics: &mut dyn GrabPhysics) -> Vec<Release> {
        Hand::ALL
            .into_iter()
            .filter_map(|hand| self.release(hand, physics))
            .collect()
    }

    /// Куда рука хочет тянуть объект (world space)
    pub fn desired_hold(&self, hand: Hand, camera: &PlayerCamera) -> Vec3 {
        match self.hand(hand).local_hold() {
            Some(local) if self.config.hold_at_grab_point => camera.transform_point(local),
            _ => camera.position() + camera.forward() * self.config.fallback_hold_distance,
        }
    }

    /// Drive обеих рук за один physics step
    ///
    /// Без камеры → None (тик пропущен, руки не тронуты).
    pub fn fixed_update(
        &mut self,
        physics: &mut dyn GrabPhysics,
        camera: Option<&PlayerCamera>,
        delta: f32,
    ) -> Option<StrainReport> {
        let camera = camera?;
        let params = self.config.drive_params();

        let left_hold = self.desired_hold(Hand::Left, camera);
        let right_hold = self.desired_hold(Hand::Right, camera);

        let left = self.left.fixed_update_drive(physics, left_hold, &params, delta);
        let right = self.right.fixed_update_drive(physics, right_hold, &params, delta);

        let report = StrainReport {
            left,
            right,
            authority: movement_authority(&self.config, &left, &right),
        };
        self.pending_strain = Some(report);
        Some(report)
    }
}
