//! Grab module — физический захват предметов руками от первого лица
//!
//! Архитектура:
//! - config: GrabConfig (tuning) + DriveParams
//! - hand: GrabHand state machine (Idle ⇄ Grabbing) + spring-damper drive
//! - controller: две руки, raycast из камеры, movement authority
//! - spring_handle: proxy handle + ball joint, collision ignore bookkeeping
//! - hold_target: rate limiter hold point
//! - systems/events: ECS обвязка
//!
//! Физика — внешний коллаборатор через trait GrabPhysics: plugin
//! параметризован backend'ом (`GrabPlugin<RapierBackend>` в игре,
//! `GrabPlugin<HeadlessBackend>` в headless тестах).

use std::marker::PhantomData;

use bevy::prelude::*;

pub mod config;
pub mod controller;
pub mod events;
pub mod hand;
pub mod hold_target;
pub mod math;
pub mod spring_handle;
pub mod systems;

// Tests (separate files with _tests suffix)
#[cfg(test)]
mod controller_tests;

// Re-export основных типов
pub use config::{ConfigError, DriveParams, GrabConfig, GrabMode};
pub use controller::{movement_authority, ButtonOutcome, GrabController, GrabStart, StrainReport};
pub use events::{ButtonPhase, GrabButtonEvent, GrabRejected, GrabReleased, GrabStarted, HandStrain};
pub use hand::{
    effective_max_force, mass_scale, DriveReport, GrabHand, GrabRejection, GrabRequest, Hand, Release, ReleaseReason,
};
pub use hold_target::HoldTargetFilter;
pub use spring_handle::{CollisionIgnoreSet, SolverBoost, SpringHandle};

use crate::physics::GrabBackend;

/// Порядок grab систем
///
/// - Input: Update (кнопки могут прийти в любой frame)
/// - Drive → Authority: FixedUpdate, до locomotion и physics step
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrabSet {
    Input,
    Drive,
    Authority,
}

/// Grab Plugin поверх physics backend `B`
///
/// Порядок выполнения (FixedUpdate):
/// 1. drive_grab_controllers — силы на handles, strain, forced release
/// 2. apply_grab_authority — authority → PlayerMotor
///
/// Ресурсы backend'а вставляет его physics plugin (RapierGrabPhysicsPlugin
/// или HeadlessPhysicsPlugin).
pub struct GrabPlugin<B> {
    _backend: PhantomData<fn() -> B>,
}

impl<B> Default for GrabPlugin<B> {
    fn default() -> Self {
        Self { _backend: PhantomData }
    }
}

impl<B: GrabBackend> Plugin for GrabPlugin<B> {
    fn build(&self, app: &mut App) {
        // Регистрация событий
        app.add_event::<GrabButtonEvent>()
            .add_event::<GrabStarted>()
            .add_event::<GrabReleased>()
            .add_event::<GrabRejected>()
            .add_event::<HandStrain>();

        app.configure_sets(FixedUpdate, (GrabSet::Drive, GrabSet::Authority).chain());

        app.add_systems(Update, systems::process_grab_buttons::<B>.in_set(GrabSet::Input));

        app.add_systems(
            FixedUpdate,
            (
                systems::drive_grab_controllers::<B>.in_set(GrabSet::Drive),
                systems::apply_grab_authority.in_set(GrabSet::Authority),
            ),
        );
    }
}
