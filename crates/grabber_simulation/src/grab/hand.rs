//! GrabHand — одна рука: state machine + spring-damper drive
//!
//! # States
//! `Idle` ⇄ `Grabbing`. Grabbing ⇔ `active.is_some()`: target, handle и
//! joint живут в одном `ActiveGrab` и появляются/исчезают атомарно.
//!
//! # Drive (один fixed step)
//! 1. Hold target догоняет desired hold (rate limit)
//! 2. dist > hard_release → forced release (stretch = load = 1)
//! 3. stretch01 = inverse_lerp(slack, arm_max, dist)
//! 4. dist ≤ slack → только damping (grey zone)
//! 5. Иначе spring на overshoot за пределы slack + damping
//! 6-7. Clamp силы до effective max force, load01 = |F| / max

use std::fmt;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::{DriveParams, GrabConfig};
use super::hold_target::HoldTargetFilter;
use super::math::{clamp01, inverse_lerp};
use super::spring_handle::{CollisionIgnoreSet, SolverBoost, SpringHandle};
use crate::physics::{BodyId, ColliderId, GrabPhysics};

/// Какая рука
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];
}

/// Почему захват не состоялся (state руки не меняется)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabRejection {
    /// Нет camera pose у игрока
    NoCamera,
    /// Raycast ничего не нашёл в пределах grab_distance
    NothingHit,
    /// Попали в static геометрию
    NoRigidBody,
    /// Тело исчезло между raycast и захватом
    TargetMissing,
    Kinematic,
    /// На теле нет Grabbable
    NotGrabbable,
    /// Grabbable.allow_grab == false
    GrabDisabled,
    /// Объект уже держит другая рука
    AlreadyHeld(Hand),
    /// Солвер отказался создать handle/joint
    JointFailed,
}

impl fmt::Display for GrabRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrabRejection::NoCamera => write!(f, "no camera"),
            GrabRejection::NothingHit => write!(f, "nothing hit"),
            GrabRejection::NoRigidBody => write!(f, "hit has no rigid body"),
            GrabRejection::TargetMissing => write!(f, "target body missing"),
            GrabRejection::Kinematic => write!(f, "target is kinematic"),
            GrabRejection::NotGrabbable => write!(f, "target is not grabbable"),
            GrabRejection::GrabDisabled => write!(f, "grab disabled on target"),
            GrabRejection::AlreadyHeld(hand) => write!(f, "target already held by {:?} hand", hand),
            GrabRejection::JointFailed => write!(f, "failed to create handle joint"),
        }
    }
}

impl std::error::Error for GrabRejection {}

/// Почему рука отпустила объект
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseReason {
    /// Игрок отпустил (toggle / button up / release_all)
    Requested,
    /// Новый start_grab на той же руке
    Regrab,
    /// Runaway divergence: растяжение > hard_release_distance
    HardReleaseDistance,
    /// Тело уничтожено извне посреди захвата
    TargetLost,
    /// Handle или joint исчезли в солвере
    HandleLost,
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseReason::Requested => "requested",
            ReleaseReason::Regrab => "regrab",
            ReleaseReason::HardReleaseDistance => "hard_release_distance",
            ReleaseReason::TargetLost => "target_lost",
            ReleaseReason::HandleLost => "handle_lost",
        };
        f.write_str(name)
    }
}

/// Итог release (что и почему отпустили)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub target: BodyId,
    pub reason: ReleaseReason,
}

/// Параметры start_grab
#[derive(Debug, Clone, Copy)]
pub struct GrabRequest<'a> {
    pub target: BodyId,
    /// World точка попадания (сюда спавнится handle)
    pub grab_point: Vec3,
    pub weight_multiplier: f32,
    /// Camera-local offset hold point (None → fallback перед камерой)
    pub local_hold: Option<Vec3>,
    /// Коллайдер по которому попали (для collision ignore)
    pub grabbed_collider: Option<ColliderId>,
    pub ignore_collision: bool,
    pub player_colliders: &'a [ColliderId],
}

/// Результат одного drive тика
///
/// Инвариант: stretch01, load01 ∈ [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveReport {
    pub stretch01: f32,
    pub load01: f32,
    /// |hold target − handle|
    pub distance: f32,
    /// Сила приложенная к handle в этот тик
    pub force: Vec3,
    pub released: Option<Release>,
}

impl DriveReport {
    fn saturated(released: Option<Release>) -> Self {
        Self {
            stretch01: 1.0,
            load01: 1.0,
            released,
            ..default()
        }
    }

    fn lost(released: Option<Release>) -> Self {
        Self { released, ..default() }
    }
}

/// max(1, mass / mass_reference)
pub fn mass_scale(mass: f32, mass_reference: f32) -> f32 {
    (mass / mass_reference.max(0.01)).max(1.0)
}

/// max_force / weight_multiplier [/ mass_scale]
pub fn effective_max_force(params: &DriveParams, weight_multiplier: f32, mass: f32) -> f32 {
    let mut effective = params.max_force / weight_multiplier.max(0.01);
    if params.scale_by_mass {
        effective /= mass_scale(mass, params.mass_reference);
    }
    effective
}

#[derive(Debug)]
struct ActiveGrab {
    spring: SpringHandle,
    hold: HoldTargetFilter,
    weight_multiplier: f32,
    local_hold: Option<Vec3>,
    ignored: CollisionIgnoreSet,
}

/// Одна рука игрока
#[derive(Debug)]
pub struct GrabHand {
    side: Hand,
    active: Option<ActiveGrab>,
}

impl GrabHand {
    pub fn new(side: Hand) -> Self {
        Self { side, active: None }
    }

    pub fn side(&self) -> Hand {
        self.side
    }

    pub fn is_grabbing(&self) -> bool {
        self.active.is_some()
    }

    pub fn target(&self) -> Option<BodyId> {
        self.active.as_ref().map(|a| a.spring.target())
    }

    pub fn spring(&self) -> Option<&SpringHandle> {
        self.active.as_ref().map(|a| &a.spring)
    }

    /// Camera-local offset сохранённый при захвате
    pub fn local_hold(&self) -> Option<Vec3> {
        self.active.as_ref().and_then(|a| a.local_hold)
    }

    pub fn hold_target(&self) -> Option<Vec3> {
        self.active.as_ref().map(|a| a.hold.position())
    }

    pub fn weight_multiplier(&self) -> Option<f32> {
        self.active.as_ref().map(|a| a.weight_multiplier)
    }

    pub fn ignored_pairs(&self) -> &[(ColliderId, ColliderId)] {
        self.active.as_ref().map(|a| a.ignored.pairs()).unwrap_or(&[])
    }

    /// Idle → Grabbing
    ///
    /// Любой Err (включая `JointFailed`) → текущий захват (если есть) не тронут.
    /// Успех при активном захвате → старый отпускается
    /// (`ReleaseReason::Regrab`) и возвращается в Ok.
    pub fn start_grab(
        &mut self,
        physics: &mut dyn GrabPhysics,
        request: &GrabRequest,
        config: &GrabConfig,
    ) -> Result<Option<Release>, GrabRejection> {
        let info = physics.body_info(request.target).ok_or(GrabRejection::TargetMissing)?;
        if info.kinematic {
            return Err(GrabRejection::Kinematic);
        }
        let grabbable = info.grabbable.ok_or(GrabRejection::NotGrabbable)?;
        if !grabbable.allow_grab {
            return Err(GrabRejection::GrabDisabled);
        }

        let boost = SolverBoost {
            position_iterations: config.min_solver_iterations,
            velocity_iterations: config.min_solver_velocity_iterations,
        };
        let spring = SpringHandle::spawn(physics, request.target, request.grab_point, config.handle_mass, boost)
            .ok_or(GrabRejection::JointFailed)?;

        // Старый захват отпускается только когда новый handle уже есть.
        // Restore до ignore: повторный захват того же коллайдера видит честное состояние пар.
        let replaced = self.release(physics, ReleaseReason::Regrab);

        let ignored = match request.grabbed_collider {
            Some(collider) if request.ignore_collision => {
                CollisionIgnoreSet::ignore(physics, request.player_colliders, collider)
            }
            _ => CollisionIgnoreSet::default(),
        };

        // Hold target = текущая позиция handle → нулевой рывок
        let start = spring.position(physics).unwrap_or(request.grab_point);

        self.active = Some(ActiveGrab {
            spring,
            hold: HoldTargetFilter::new(start),
            weight_multiplier: request.weight_multiplier.max(0.01),
            local_hold: request.local_hold,
            ignored,
        });

        Ok(replaced)
    }

    /// Grabbing → Idle. На idle руке — no-op (None).
    pub fn release(&mut self, physics: &mut dyn GrabPhysics, reason: ReleaseReason) -> Option<Release> {
        let active = self.active.take()?;
        let target = active.spring.target();

        active.ignored.restore(physics);
        active.spring.destroy(physics);

        Some(Release { target, reason })
    }

    /// Один physics step захвата
    pub fn fixed_update_drive(
        &mut self,
        physics: &mut dyn GrabPhysics,
        desired_hold: Vec3,
        params: &DriveParams,
        delta: f32,
    ) -> DriveReport {
        let Some(active) = self.active.as_mut() else {
            return DriveReport::default();
        };

        let Some(info) = physics.body_info(active.spring.target()) else {
            crate::log_warning(&format!(
                "grab.release hand={:?} reason={} (target destroyed mid-grab)",
                self.side,
                ReleaseReason::TargetLost
            ));
            return DriveReport::lost(self.release(physics, ReleaseReason::TargetLost));
        };

        let handle_state = if active.spring.is_intact(physics) {
            active.spring.position(physics).zip(active.spring.velocity(physics))
        } else {
            None
        };
        let Some((handle_position, handle_velocity)) = handle_state else {
            crate::log_warning(&format!(
                "grab.release hand={:?} reason={}",
                self.side,
                ReleaseReason::HandleLost
            ));
            return DriveReport::lost(self.release(physics, ReleaseReason::HandleLost));
        };

        // 1) Rate limit hold target (camera-yank)
        let hold = active.hold.advance(desired_hold, params.hold_target_max_speed, delta);

        // 2) Растяжение руки
        let to_target = hold - handle_position;
        let distance = to_target.length();

        // NaN/inf от солвера = тот же runaway, что и превышение дистанции
        let diverged = !distance.is_finite() || !handle_velocity.is_finite() || !info.mass.is_finite();
        if diverged || distance > params.hard_release_distance {
            crate::log_warning(&format!(
                "grab.release hand={:?} reason={} dist={:.3} limit={:.3}",
                self.side,
                ReleaseReason::HardReleaseDistance,
                distance,
                params.hard_release_distance
            ));
            return DriveReport::saturated(self.release(physics, ReleaseReason::HardReleaseDistance));
        }

        let stretch01 = inverse_lerp(params.slack_radius, params.arm_max_distance, distance);
        let effective_max = effective_max_force(params, active.weight_multiplier, info.mass);

        // 3) Grey zone: никакого pull, только лёгкое демпфирование
        if distance <= params.slack_radius {
            let force = (-handle_velocity * (params.damping * params.grey_zone_damping_scale))
                .clamp_length_max(effective_max);
            active.spring.apply_force(physics, force);
            return DriveReport {
                stretch01,
                load01: 0.0,
                distance,
                force,
                released: None,
            };
        }

        // 4) Spring на overshoot за пределы slack
        let direction = to_target / distance.max(0.0001);
        let error = distance - params.slack_radius;
        let raw = direction * (error * params.spring) - handle_velocity * params.damping;

        let force = raw.clamp_length_max(effective_max);
        let used = force.length();
        active.spring.apply_force(physics, force);

        DriveReport {
            stretch01,
            load01: clamp01(used / effective_max.max(0.001)),
            distance,
            force,
            released: None,
        }
    }
}
