//! Rapier backend: GrabPhysics поверх bevy_rapier3d
//!
//! Маппинг id → ECS:
//! - BodyId / ColliderId / HandleId / JointId = `Entity::to_bits()`
//! - handle = Dynamic тело без коллайдера (GrabHandle), joint = ImpulseJoint на нём же
//! - continuous сила → ExternalForce (обнуляется перед каждым Drive)
//! - ignored пары → IgnoredContactPairs + physics hooks (FILTER_CONTACT_PAIRS)
//! - solver boost → AdditionalSolverIterations
//!
//! Мутации идут через Commands: spawn/insert видны со следующей системы,
//! Rapier подхватывает их в своём FixedPostUpdate step.

use std::collections::BTreeSet;

use bevy::ecs::system::{SystemParam, SystemParamItem};
use bevy::prelude::*;
use bevy::transform::TransformPlugin;
use bevy_rapier3d::prelude::*;

use super::backend::{
    BodyId, BodyInfo, ColliderId, ForceMode, GrabBackend, GrabPhysics, Grabbable, HandleId, JointId, RayHit, RayQuery,
};
use super::movement::{self, MovementInput, PlayerBody, PlayerMotor};
use crate::collision_layers::{COLLISION_LAYER_ENVIRONMENT, COLLISION_LAYER_PLAYER, COLLISION_LAYER_PROPS};
use crate::components::{Player, PlayerCamera, PlayerColliders};
use crate::grab::{ConfigError, GrabConfig, GrabController, GrabSet};
use crate::PLAYER_CENTER_HEIGHT;

/// Solver iterations Rapier по умолчанию (IntegrationParameters)
pub const RAPIER_SOLVER_ITERATIONS: u32 = 4;

fn entity(bits: u64) -> Option<Entity> {
    Entity::try_from_bits(bits).ok()
}

fn body_id(entity: Entity) -> BodyId {
    BodyId(entity.to_bits())
}

fn layers(memberships: u32) -> CollisionGroups {
    CollisionGroups::new(Group::from_bits_truncate(memberships), Group::ALL)
}

/// Marker: proxy handle захвата (Dynamic тело без коллайдера)
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct GrabHandle;

/// Пары коллайдеров с выключенными контактами
///
/// Пары нормализованы (min, max). Читается physics hooks каждый step.
#[derive(Resource, Debug, Clone, Default)]
pub struct IgnoredContactPairs {
    pairs: BTreeSet<(Entity, Entity)>,
}

impl IgnoredContactPairs {
    fn key(a: Entity, b: Entity) -> (Entity, Entity) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// true если пара новая
    pub fn insert(&mut self, a: Entity, b: Entity) -> bool {
        self.pairs.insert(Self::key(a, b))
    }

    pub fn remove(&mut self, a: Entity, b: Entity) -> bool {
        self.pairs.remove(&Self::key(a, b))
    }

    pub fn contains(&self, a: Entity, b: Entity) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Physics hooks: contact filter по IgnoredContactPairs
#[derive(SystemParam)]
pub struct GrabContactHooks<'w> {
    ignored: Res<'w, IgnoredContactPairs>,
}

impl BevyPhysicsHooks for GrabContactHooks<'_> {
    fn filter_contact_pair(&self, context: PairFilterContextView) -> Option<SolverFlags> {
        if self.ignored.contains(context.collider1(), context.collider2()) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

type BodyItem = (
    &'static RigidBody,
    &'static Transform,
    Option<&'static ReadMassProperties>,
    Option<&'static ColliderMassProperties>,
    Option<&'static Grabbable>,
    Option<&'static AdditionalSolverIterations>,
);

type HandleItem = (
    &'static Transform,
    &'static mut Velocity,
    &'static mut ExternalForce,
    Has<ImpulseJoint>,
);

/// GrabPhysics поверх Rapier ECS (SystemParam)
///
/// Тело = entity с RigidBody, коллайдер = entity с Collider (само тело
/// или его child). Fixed тела в raycast дают hit без body.
#[derive(SystemParam)]
pub struct RapierGrabPhysics<'w, 's> {
    commands: Commands<'w, 's>,
    context: ReadRapierContext<'w, 's>,
    ignored: ResMut<'w, IgnoredContactPairs>,
    bodies: Query<'w, 's, BodyItem, Without<GrabHandle>>,
    colliders: Query<'w, 's, (Has<Sensor>, Option<&'static ChildOf>), With<Collider>>,
    handles: Query<'w, 's, HandleItem, With<GrabHandle>>,
}

/// Backend для `GrabPlugin`: Rapier мир
pub type RapierBackend = RapierGrabPhysics<'static, 'static>;

impl GrabBackend for RapierBackend {
    fn physics<'a>(param: &'a mut SystemParamItem<'_, '_, Self>) -> &'a mut dyn GrabPhysics {
        param
    }
}

/// Масса тела: посчитанная Rapier'ом, иначе явная из ColliderMassProperties
fn body_mass(read: Option<&ReadMassProperties>, collider: Option<&ColliderMassProperties>) -> f32 {
    let computed = read.map(|props| props.get().mass).unwrap_or(0.0);
    if computed > 0.0 {
        return computed;
    }
    match collider {
        Some(ColliderMassProperties::Mass(mass)) => *mass,
        _ => 0.0,
    }
}

impl RapierGrabPhysics<'_, '_> {
    /// Dynamic/kinematic тело, которому принадлежит коллайдер
    fn collider_body(&self, collider: Entity) -> Option<Entity> {
        let owner = if self.bodies.contains(collider) {
            collider
        } else {
            let (_, parent) = self.colliders.get(collider).ok()?;
            parent?.parent()
        };
        let (rigid_body, ..) = self.bodies.get(owner).ok()?;
        match rigid_body {
            RigidBody::Fixed => None,
            _ => Some(owner),
        }
    }
}

impl GrabPhysics for RapierGrabPhysics<'_, '_> {
    fn cast_ray(&self, query: &RayQuery) -> Option<RayHit> {
        let direction = query.direction.normalize_or_zero();
        if direction == Vec3::ZERO || query.max_distance <= 0.0 {
            return None;
        }

        let context = self.context.single().ok()?;
        let exclude: Vec<Entity> = query.exclude.iter().filter_map(|collider| entity(collider.0)).collect();
        let not_excluded = |candidate: Entity| !exclude.contains(&candidate);
        let filter = QueryFilter::new()
            .exclude_sensors()
            .groups(CollisionGroups::new(Group::ALL, Group::from_bits_truncate(query.layer_mask)))
            .predicate(&not_excluded);

        let (collider, distance) = context.cast_ray(query.origin, direction, query.max_distance, true, filter)?;

        Some(RayHit {
            point: query.origin + direction * distance,
            distance,
            collider: ColliderId(collider.to_bits()),
            body: self.collider_body(collider).map(body_id),
        })
    }

    fn body_info(&self, body: BodyId) -> Option<BodyInfo> {
        let (rigid_body, _, read_mass, collider_mass, grabbable, _) = self.bodies.get(entity(body.0)?).ok()?;
        Some(BodyInfo {
            mass: body_mass(read_mass, collider_mass),
            kinematic: !matches!(rigid_body, RigidBody::Dynamic),
            grabbable: grabbable.copied(),
        })
    }

    fn body_world_to_local(&self, body: BodyId, world_point: Vec3) -> Option<Vec3> {
        let (_, transform, ..) = self.bodies.get(entity(body.0)?).ok()?;
        Some(transform.compute_affine().inverse().transform_point3(world_point))
    }

    fn raise_solver_iterations(&mut self, body: BodyId, position_iterations: u32, velocity_iterations: u32) {
        let Some(target) = entity(body.0) else {
            return;
        };
        let Ok((.., current)) = self.bodies.get(target) else {
            return;
        };

        // Rapier крутит один счётчик итераций, поверх базовых
        let wanted = position_iterations
            .max(velocity_iterations)
            .saturating_sub(RAPIER_SOLVER_ITERATIONS) as usize;
        let current = current.map(|extra| extra.0).unwrap_or(0);
        if wanted > current {
            self.commands.entity(target).try_insert(AdditionalSolverIterations(wanted));
        }
    }

    fn collider_is_trigger(&self, collider: ColliderId) -> Option<bool> {
        let (sensor, _) = self.colliders.get(entity(collider.0)?).ok()?;
        Some(sensor)
    }

    fn set_collision_ignored(&mut self, a: ColliderId, b: ColliderId, ignored: bool) {
        let (Some(a), Some(b)) = (entity(a.0), entity(b.0)) else {
            return;
        };

        if !ignored {
            self.ignored.remove(a, b);
            return;
        }

        if !self.colliders.contains(a) || !self.colliders.contains(b) {
            return;
        }
        if self.ignored.insert(a, b) {
            for collider in [a, b] {
                self.commands.entity(collider).try_insert(ActiveHooks::FILTER_CONTACT_PAIRS);
            }
        }
    }

    fn is_collision_ignored(&self, a: ColliderId, b: ColliderId) -> bool {
        match (entity(a.0), entity(b.0)) {
            (Some(a), Some(b)) => self.ignored.contains(a, b),
            _ => false,
        }
    }

    fn spawn_handle(&mut self, position: Vec3, mass: f32) -> HandleId {
        let handle = self
            .commands
            .spawn((
                GrabHandle,
                RigidBody::Dynamic,
                Transform::from_translation(position),
                Velocity::zero(),
                ExternalForce::default(),
                GravityScale(0.0),
                AdditionalMassProperties::Mass(mass),
                LockedAxes::ROTATION_LOCKED,
                Ccd::enabled(),
            ))
            .id();
        HandleId(handle.to_bits())
    }

    fn despawn_handle(&mut self, handle: HandleId) {
        let Some(handle) = entity(handle.0) else {
            return;
        };
        if let Ok(mut commands) = self.commands.get_entity(handle) {
            commands.try_despawn();
        }
    }

    fn handle_position(&self, handle: HandleId) -> Option<Vec3> {
        let (transform, ..) = self.handles.get(entity(handle.0)?).ok()?;
        Some(transform.translation)
    }

    fn handle_velocity(&self, handle: HandleId) -> Option<Vec3> {
        let (_, velocity, ..) = self.handles.get(entity(handle.0)?).ok()?;
        Some(velocity.linvel)
    }

    fn create_ball_joint(&mut self, handle: HandleId, body: BodyId, body_local_anchor: Vec3) -> Option<JointId> {
        let handle = entity(handle.0)?;
        let body = entity(body.0)?;
        if !self.bodies.contains(body) {
            return None;
        }

        // parent = тело (anchor1), child = handle (anchor2 в его центре)
        let joint = SphericalJointBuilder::new()
            .local_anchor1(body_local_anchor)
            .local_anchor2(Vec3::ZERO);
        self.commands
            .get_entity(handle)
            .ok()?
            .try_insert(ImpulseJoint::new(body, joint));

        Some(JointId(handle.to_bits()))
    }

    fn destroy_joint(&mut self, joint: JointId) {
        let Some(joint) = entity(joint.0) else {
            return;
        };
        if let Ok(mut commands) = self.commands.get_entity(joint) {
            commands.try_remove::<ImpulseJoint>();
        }
    }

    fn joint_exists(&self, joint: JointId) -> bool {
        entity(joint.0)
            .and_then(|joint| self.handles.get(joint).ok())
            .map(|(.., jointed)| jointed)
            .unwrap_or(false)
    }

    fn add_handle_force(&mut self, handle: HandleId, force: Vec3, mode: ForceMode) {
        let Some(handle) = entity(handle.0) else {
            return;
        };
        let Ok((_, mut velocity, mut external, _)) = self.handles.get_mut(handle) else {
            return;
        };
        match mode {
            ForceMode::Force => external.force += force,
            ForceMode::VelocityChange => velocity.linvel += force,
        }
    }
}

/// Система: сброс ExternalForce handle'ов перед Drive
///
/// Drive пишет силу заново каждый step, ничего не копится.
pub fn clear_handle_forces(mut handles: Query<&mut ExternalForce, With<GrabHandle>>) {
    for mut external in handles.iter_mut() {
        *external = ExternalForce::default();
    }
}

/// Система: motor velocity → Transform kinematic капсулы
///
/// KinematicPositionBased: Rapier берёт Transform как next position.
pub fn integrate_motor_to_transform(
    mut query: Query<(&PlayerMotor, &mut Transform), With<PlayerBody>>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.timestep().as_secs_f32();

    for (motor, mut transform) in query.iter_mut() {
        transform.translation += motor.velocity * delta;
    }
}

/// Система: камера следует за капсулой
pub fn follow_player_transform(mut query: Query<(&Transform, &mut PlayerCamera), With<PlayerBody>>) {
    for (transform, mut camera) in query.iter_mut() {
        camera.pose.translation = transform.translation + camera.eye_offset;
    }
}

/// Plugin Rapier мира для захвата
///
/// Rapier step в FixedPostUpdate (60Hz, 1 substep). Порядок в FixedUpdate:
/// 1. clear_handle_forces → GrabSet::Drive → GrabSet::Authority
/// 2. apply_motor_input → integrate_motor_to_transform → follow_player_transform
pub struct RapierGrabPhysicsPlugin;

impl Plugin for RapierGrabPhysicsPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<TransformPlugin>() {
            app.add_plugins(TransformPlugin);
        }

        app.init_resource::<IgnoredContactPairs>()
            .add_plugins(RapierPhysicsPlugin::<GrabContactHooks<'static>>::default().in_fixed_schedule())
            .insert_resource(TimestepMode::Fixed {
                dt: 1.0 / 60.0,
                substeps: 1,
            });

        app.add_systems(FixedUpdate, clear_handle_forces.before(GrabSet::Drive));

        app.add_systems(
            FixedUpdate,
            (integrate_motor_to_transform, follow_player_transform)
                .chain()
                .after(GrabSet::Authority)
                .after(movement::apply_motor_input),
        );
    }
}

/// Spawn статичного пола (верхняя грань на y = 0)
pub fn spawn_rapier_floor(world: &mut World, half_extent: f32) -> Entity {
    world
        .spawn((
            RigidBody::Fixed,
            Collider::cuboid(half_extent, 0.5, half_extent),
            layers(COLLISION_LAYER_ENVIRONMENT),
            Transform::from_xyz(0.0, -0.5, 0.0),
        ))
        .id()
}

/// Spawn grabbable ящика (Dynamic cuboid с явной массой)
pub fn spawn_rapier_crate(world: &mut World, position: Vec3, half_extents: Vec3, mass: f32) -> Entity {
    world
        .spawn((
            RigidBody::Dynamic,
            Collider::cuboid(half_extents.x, half_extents.y, half_extents.z),
            ColliderMassProperties::Mass(mass),
            ReadMassProperties::default(),
            Grabbable::default(),
            layers(COLLISION_LAYER_PROPS),
            Transform::from_translation(position),
        ))
        .id()
}

/// Spawn игрока в Rapier мире: kinematic капсула + камера + grab контроллер
///
/// `feet` — точка на полу под игроком. Камера смотрит в -Z.
pub fn spawn_rapier_player(world: &mut World, feet: Vec3, config: GrabConfig) -> Result<Entity, ConfigError> {
    let controller = GrabController::new(config)?;
    let center = feet + Vec3::Y * PLAYER_CENTER_HEIGHT;

    let mut camera = PlayerCamera::default();
    camera.pose.translation = center + camera.eye_offset;

    let player = world
        .spawn((
            Player,
            controller,
            camera,
            PlayerMotor::default(),
            MovementInput::default(),
            RigidBody::KinematicPositionBased,
            Collider::capsule_y(0.5, 0.4),
            layers(COLLISION_LAYER_PLAYER),
            Transform::from_translation(center),
        ))
        .id();

    // Капсула = коллайдер на самом entity игрока
    world.entity_mut(player).insert((
        PlayerColliders(vec![ColliderId(player.to_bits())]),
        PlayerBody(body_id(player)),
    ));

    Ok(player)
}
