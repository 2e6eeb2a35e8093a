//! Grab Events — вход от input коллаборатора и выход для UI/звука/логов
//!
//! Input → GrabButtonEvent (Update) → GrabController
//! GrabController → GrabStarted / GrabReleased / GrabRejected / HandStrain

use bevy::prelude::*;

use super::hand::{GrabRejection, Hand, ReleaseReason};
use crate::physics::BodyId;

/// Фаза кнопки захвата
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPhase {
    Pressed,
    Released,
}

/// Кнопка руки (левая/правая кнопка мыши)
///
/// Toggle mode: реагирует только Pressed.
/// Hold mode: Pressed = взять, Released = отпустить.
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabButtonEvent {
    pub player: Entity,
    pub hand: Hand,
    pub phase: ButtonPhase,
}

impl GrabButtonEvent {
    pub fn pressed(player: Entity, hand: Hand) -> Self {
        Self {
            player,
            hand,
            phase: ButtonPhase::Pressed,
        }
    }

    pub fn released(player: Entity, hand: Hand) -> Self {
        Self {
            player,
            hand,
            phase: ButtonPhase::Released,
        }
    }
}

/// Рука взяла объект
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabStarted {
    pub player: Entity,
    pub hand: Hand,
    pub body: BodyId,
    /// World точка захвата
    pub grab_point: Vec3,
}

/// Рука отпустила объект (по запросу или forced)
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabReleased {
    pub player: Entity,
    pub hand: Hand,
    pub body: BodyId,
    pub reason: ReleaseReason,
}

/// Попытка захвата отклонена (state руки не изменился)
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabRejected {
    pub player: Entity,
    pub hand: Hand,
    pub rejection: GrabRejection,
}

/// Strain обеих рук за physics step (для UI / анимации рук)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct HandStrain {
    pub player: Entity,
    pub left_stretch01: f32,
    pub left_load01: f32,
    pub right_stretch01: f32,
    pub right_load01: f32,
    /// Authority записанная в motor (если он есть)
    pub authority: f32,
}
