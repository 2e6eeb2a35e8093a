//! Physics module
//!
//! - backend: trait GrabPhysics (контракт rigid-body коллаборатора) + GrabBackend
//! - rapier: GrabPhysics поверх bevy_rapier3d (игровой backend)
//! - headless: детерминированный point-mass мир (test double, replay)
//! - movement: planar motor игрока (потребитель authority)

pub mod backend;
pub mod headless;
pub mod movement;
pub mod rapier;

// Re-export основных типов
pub use backend::{
    BodyId, BodyInfo, ColliderId, ForceMode, GrabBackend, GrabPhysics, Grabbable, HandleId, JointId, RayHit,
    RayQuery,
};
pub use headless::{BodyDesc, ColliderDesc, HeadlessBackend, HeadlessPhysics, Shape};
pub use movement::{LocomotionPlugin, MotorConfig, MovementInput, PlayerBody, PlayerMotor};
pub use rapier::{
    spawn_rapier_crate, spawn_rapier_floor, spawn_rapier_player, GrabHandle, IgnoredContactPairs, RapierBackend,
    RapierGrabPhysics, RapierGrabPhysicsPlugin,
};

use bevy::prelude::*;

use crate::grab::GrabSet;

/// Fixed-step система headless мира
pub fn step_headless_physics(mut physics: ResMut<HeadlessPhysics>, time: Res<Time<Fixed>>) {
    physics.step(time.timestep().as_secs_f32());
}

/// Plugin headless мира (вместо RapierGrabPhysicsPlugin)
///
/// Порядок в FixedUpdate:
/// 1. GrabSet::Drive → GrabSet::Authority
/// 2. apply_motor_input (LocomotionPlugin) — motor читает свежий authority
/// 3. sync_motor_to_headless_body
/// 4. step_headless_physics — силы handle'ов + velocity игрока
/// 5. follow_player_body — камера за телом
pub struct HeadlessPhysicsPlugin;

impl Plugin for HeadlessPhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<HeadlessPhysics>();

        app.add_systems(
            FixedUpdate,
            (
                movement::sync_motor_to_headless_body,
                step_headless_physics,
                movement::follow_player_body,
            )
                .chain()
                .after(GrabSet::Authority)
                .after(movement::apply_motor_input),
        );
    }
}
