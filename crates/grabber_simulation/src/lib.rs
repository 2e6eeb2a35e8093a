//! Grabber Simulation Core
//!
//! Физический захват предметов от первого лица (две руки) на Bevy 0.16
//!
//! Архитектура:
//! - ECS = gameplay layer (grab state machine, strain, locomotion authority)
//! - Physics backend = внешний коллаборатор за trait GrabPhysics
//!   (Rapier в GrabberSimulationPlugin, HeadlessPhysics для детерминированных тестов)

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Публичные модули
pub mod collision_layers;
pub mod components;
pub mod grab;
pub mod logger;
pub mod physics;

// Re-export базовых типов для удобства
pub use components::*;
pub use grab::{
    ButtonPhase, ConfigError, DriveReport, GrabButtonEvent, GrabConfig, GrabController, GrabMode, GrabPlugin, GrabRejected,
    GrabRejection, GrabReleased, GrabSet, GrabStarted, Hand, HandStrain, ReleaseReason,
};
pub use logger::{init_logger, log, log_error, log_info, log_warning, set_log_level, set_logger, LogLevel, LogPrinter};
pub use physics::{
    spawn_rapier_crate, spawn_rapier_floor, spawn_rapier_player, BodyDesc, BodyId, ColliderDesc, ColliderId,
    GrabBackend, GrabHandle, GrabPhysics, Grabbable, HeadlessBackend, HeadlessPhysics, HeadlessPhysicsPlugin,
    IgnoredContactPairs, LocomotionPlugin, MovementInput, PlayerBody, PlayerMotor, RapierBackend, RapierGrabPhysicsPlugin,
};

use collision_layers::COLLISION_LAYER_PLAYER;

/// Главный plugin симуляции (Rapier + grab + locomotion)
pub struct GrabberSimulationPlugin;

impl Plugin for GrabberSimulationPlugin {
    fn build(&self, app: &mut App) {
        insert_simulation_defaults(app);
        app.add_plugins((
            RapierGrabPhysicsPlugin,
            GrabPlugin::<RapierBackend>::default(),
            LocomotionPlugin,
        ));
    }
}

/// Тот же grab стек поверх детерминированного HeadlessPhysics (тесты, replay)
pub struct HeadlessSimulationPlugin;

impl Plugin for HeadlessSimulationPlugin {
    fn build(&self, app: &mut App) {
        insert_simulation_defaults(app);
        app.add_plugins((
            HeadlessPhysicsPlugin,
            GrabPlugin::<HeadlessBackend>::default(),
            LocomotionPlugin,
        ));
    }
}

fn insert_simulation_defaults(app: &mut App) {
    // Fixed timestep 60Hz: drive пружины и physics step
    app.insert_resource(Time::<Fixed>::from_hz(60.0));

    if !app.world().contains_resource::<DeterministicRng>() {
        app.insert_resource(DeterministicRng::new(42));
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(60.0)); // 60Hz FixedUpdate

    app
}

/// Snapshot мира для сравнения детерминизма
pub fn world_snapshot<T: Component>(world: &mut World) -> Vec<u8>
where
    T: std::fmt::Debug,
{
    let mut snapshot = Vec::new();

    let mut query = world.query::<(Entity, &T)>();
    let mut entities: Vec<_> = query.iter(world).collect();

    // Сортируем по Entity ID для детерминизма
    entities.sort_by_key(|(entity, _)| entity.index());

    for (entity, component) in entities {
        snapshot.extend_from_slice(&entity.index().to_le_bytes());
        snapshot.extend_from_slice(format!("{:?}", component).as_bytes());
    }

    snapshot
}

/// Высота центра капсулы над ногами
pub const PLAYER_CENTER_HEIGHT: f32 = 0.9;

/// Spawn игрока: kinematic капсула в headless мире + камера + grab контроллер
///
/// `feet` — точка на полу под игроком. Камера смотрит в -Z.
/// Невалидный config → Err, мир не тронут.
pub fn spawn_headless_player(world: &mut World, feet: Vec3, config: GrabConfig) -> Result<Entity, ConfigError> {
    let controller = GrabController::new(config)?;
    let center = feet + Vec3::Y * PLAYER_CENTER_HEIGHT;

    let (body, colliders) = {
        let mut physics = world.get_resource_or_insert_with(HeadlessPhysics::default);
        let body = physics.add_body(BodyDesc::kinematic(center));

        // Капсула ≈ две сферы, ноги касаются пола
        let colliders: Vec<ColliderId> = [0.5, -0.5]
            .into_iter()
            .filter_map(|y| {
                physics.attach_collider(
                    body,
                    ColliderDesc::sphere(0.4)
                        .with_offset(Vec3::new(0.0, y, 0.0))
                        .with_layers(COLLISION_LAYER_PLAYER),
                )
            })
            .collect();

        (body, colliders)
    };

    let mut camera = PlayerCamera::default();
    camera.pose.translation = center + camera.eye_offset;

    let player = world
        .spawn((
            Player,
            controller,
            camera,
            PlayerColliders(colliders),
            PlayerMotor::default(),
            MovementInput::default(),
            PlayerBody(body),
        ))
        .id();

    Ok(player)
}

/// Spawn grabbable ящика (cuboid) на заданной позиции
pub fn spawn_crate(
    physics: &mut HeadlessPhysics,
    position: Vec3,
    half_extents: Vec3,
    mass: f32,
) -> Option<(BodyId, ColliderId)> {
    let body = physics.add_body(BodyDesc::dynamic(position, mass).grabbable(Grabbable::default()));
    let collider = physics.attach_collider(body, ColliderDesc::cuboid(half_extents))?;
    Some((body, collider))
}
