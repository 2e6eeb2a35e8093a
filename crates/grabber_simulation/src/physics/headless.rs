//! Headless physics backend (без движка)
//!
//! Минимальный детерминированный мир для headless симуляции и тестов:
//! - Point-mass тела (без вращения), gravity, линейное демпфирование
//! - Коллайдеры: sphere / axis-aligned cuboid (только для raycast + ground)
//! - Ball joint: handle жёстко сидит на anchor тела, силы handle → тело
//! - Ground plane (опционально) вместо полноценного contact solver
//!
//! Детерминизм: все коллекции BTreeMap, порядок итерации = порядок id.

use std::collections::{BTreeMap, BTreeSet};

use bevy::ecs::system::SystemParamItem;
use bevy::prelude::*;

use super::backend::*;
use crate::collision_layers::COLLISION_LAYER_PROPS;

/// Минимум solver iterations у свежего тела (дефолт большинства солверов)
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 6;

/// Форма коллайдера
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Axis-aligned (тела не вращаются)
    Cuboid { half_extents: Vec3 },
}

impl Shape {
    fn half_height(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => *radius,
            Shape::Cuboid { half_extents } => half_extents.y,
        }
    }
}

/// Описание коллайдера при создании
#[derive(Debug, Clone, Copy)]
pub struct ColliderDesc {
    pub shape: Shape,
    /// Смещение от центра тела (или world позиция для static)
    pub offset: Vec3,
    pub trigger: bool,
    pub layers: u32,
}

impl ColliderDesc {
    pub fn sphere(radius: f32) -> Self {
        Self {
            shape: Shape::Sphere { radius },
            offset: Vec3::ZERO,
            trigger: false,
            layers: COLLISION_LAYER_PROPS,
        }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self {
            shape: Shape::Cuboid { half_extents },
            offset: Vec3::ZERO,
            trigger: false,
            layers: COLLISION_LAYER_PROPS,
        }
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn as_trigger(mut self) -> Self {
        self.trigger = true;
        self
    }
}

/// Описание тела при создании
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f32,
    pub kinematic: bool,
    pub grabbable: Option<Grabbable>,
}

impl BodyDesc {
    pub fn dynamic(position: Vec3, mass: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            mass,
            kinematic: false,
            grabbable: None,
        }
    }

    pub fn kinematic(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            mass: 1.0,
            kinematic: true,
            grabbable: None,
        }
    }

    pub fn grabbable(mut self, grabbable: Grabbable) -> Self {
        self.grabbable = Some(grabbable);
        self
    }
}

#[derive(Debug, Clone)]
struct BodyState {
    position: Vec3,
    velocity: Vec3,
    mass: f32,
    kinematic: bool,
    grabbable: Option<Grabbable>,
    position_iterations: u32,
    velocity_iterations: u32,
    force: Vec3,
    velocity_change: Vec3,
}

#[derive(Debug, Clone)]
struct ColliderState {
    body: Option<BodyId>,
    desc: ColliderDesc,
}

#[derive(Debug, Clone)]
struct HandleState {
    position: Vec3,
    velocity: Vec3,
    mass: f32,
    force: Vec3,
    velocity_change: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct JointState {
    handle: HandleId,
    body: BodyId,
    body_local_anchor: Vec3,
}

/// Headless мир (Resource)
#[derive(Resource, Debug, Clone)]
pub struct HeadlessPhysics {
    pub gravity: Vec3,
    /// None → тела падают бесконечно
    pub ground_height: Option<f32>,
    /// Линейное демпфирование тел (1/s)
    pub linear_damping: f32,
    next_id: u64,
    bodies: BTreeMap<BodyId, BodyState>,
    colliders: BTreeMap<ColliderId, ColliderState>,
    handles: BTreeMap<HandleId, HandleState>,
    joints: BTreeMap<JointId, JointState>,
    /// Пары хранятся нормализованно (min, max)
    ignored_pairs: BTreeSet<(ColliderId, ColliderId)>,
}

impl Default for HeadlessPhysics {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            ground_height: Some(0.0),
            linear_damping: 0.05,
            next_id: 1,
            bodies: BTreeMap::new(),
            colliders: BTreeMap::new(),
            handles: BTreeMap::new(),
            joints: BTreeMap::new(),
            ignored_pairs: BTreeSet::new(),
        }
    }
}

fn ordered_pair(a: ColliderId, b: ColliderId) -> (ColliderId, ColliderId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl HeadlessPhysics {
    /// Мир без гравитации и пола (для изолированных тестов drive)
    pub fn zero_gravity() -> Self {
        Self {
            gravity: Vec3::ZERO,
            ground_height: None,
            linear_damping: 0.0,
            ..default()
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_body(&mut self, desc: BodyDesc) -> BodyId {
        let id = BodyId(self.allocate_id());
        self.bodies.insert(
            id,
            BodyState {
                position: desc.position,
                velocity: desc.velocity,
                mass: desc.mass.max(0.001),
                kinematic: desc.kinematic,
                grabbable: desc.grabbable,
                position_iterations: DEFAULT_SOLVER_ITERATIONS,
                velocity_iterations: DEFAULT_SOLVER_ITERATIONS,
                force: Vec3::ZERO,
                velocity_change: Vec3::ZERO,
            },
        );
        id
    }

    /// Внешнее уничтожение тела (вместе с его коллайдерами и joints)
    pub fn remove_body(&mut self, body: BodyId) {
        if self.bodies.remove(&body).is_none() {
            return;
        }

        let owned: Vec<ColliderId> = self
            .colliders
            .iter()
            .filter(|(_, c)| c.body == Some(body))
            .map(|(id, _)| *id)
            .collect();
        for collider in owned {
            self.remove_collider(collider);
        }

        self.joints.retain(|_, joint| joint.body != body);
    }

    pub fn attach_collider(&mut self, body: BodyId, desc: ColliderDesc) -> Option<ColliderId> {
        if !self.bodies.contains_key(&body) {
            return None;
        }
        let id = ColliderId(self.allocate_id());
        self.colliders.insert(id, ColliderState { body: Some(body), desc });
        Some(id)
    }

    /// Static коллайдер (offset трактуется как world позиция)
    pub fn add_static_collider(&mut self, desc: ColliderDesc) -> ColliderId {
        let id = ColliderId(self.allocate_id());
        self.colliders.insert(id, ColliderState { body: None, desc });
        id
    }

    pub fn remove_collider(&mut self, collider: ColliderId) {
        self.colliders.remove(&collider);
        self.ignored_pairs.retain(|(a, b)| *a != collider && *b != collider);
    }

    pub fn body_position(&self, body: BodyId) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.position)
    }

    pub fn body_velocity(&self, body: BodyId) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.velocity)
    }

    pub fn set_body_velocity(&mut self, body: BodyId, velocity: Vec3) {
        if let Some(state) = self.bodies.get_mut(&body) {
            state.velocity = velocity;
        }
    }

    pub fn set_body_position(&mut self, body: BodyId, position: Vec3) {
        if let Some(state) = self.bodies.get_mut(&body) {
            state.position = position;
        }
        self.sync_jointed_handles();
    }

    pub fn solver_iterations(&self, body: BodyId) -> Option<(u32, u32)> {
        self.bodies
            .get(&body)
            .map(|b| (b.position_iterations, b.velocity_iterations))
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn ignored_pair_count(&self) -> usize {
        self.ignored_pairs.len()
    }

    fn collider_center(&self, collider: &ColliderState) -> Option<Vec3> {
        match collider.body {
            Some(body) => self.bodies.get(&body).map(|b| b.position + collider.desc.offset),
            None => Some(collider.desc.offset),
        }
    }

    fn sync_jointed_handles(&mut self) {
        for joint in self.joints.values() {
            let Some(body) = self.bodies.get(&joint.body) else {
                continue;
            };
            if let Some(handle) = self.handles.get_mut(&joint.handle) {
                handle.position = body.position + joint.body_local_anchor;
                handle.velocity = body.velocity;
            }
        }
    }

    /// Один physics step
    ///
    /// 1. Силы jointed handles передаются телу (combined mass)
    /// 2. Интеграция тел (semi-implicit Euler) + ground plane
    /// 3. Jointed handles синхронизируются с anchor, свободные интегрируются сами
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        // Handle масса добавляется к телу пока joint жив
        let mut extra_mass: BTreeMap<BodyId, f32> = BTreeMap::new();
        let mut jointed_handles: BTreeSet<HandleId> = BTreeSet::new();

        for joint in self.joints.values() {
            let (Some(handle), true) = (self.handles.get(&joint.handle), self.bodies.contains_key(&joint.body)) else {
                continue;
            };
            *extra_mass.entry(joint.body).or_insert(0.0) += handle.mass;
            jointed_handles.insert(joint.handle);
        }

        for joint in self.joints.values() {
            let Some(handle) = self.handles.get(&joint.handle) else {
                continue;
            };
            let force = handle.force;
            let impulse = handle.velocity_change * handle.mass;
            let Some(body) = self.bodies.get_mut(&joint.body) else {
                continue;
            };
            let total_mass = body.mass + extra_mass.get(&joint.body).copied().unwrap_or(0.0);
            body.force += force;
            body.velocity_change += impulse / total_mass;
        }

        let damping = 1.0 / (1.0 + self.linear_damping.max(0.0) * dt);

        for (id, body) in self.bodies.iter_mut() {
            if !body.kinematic {
                let total_mass = body.mass + extra_mass.get(id).copied().unwrap_or(0.0);
                body.velocity += (self.gravity + body.force / total_mass) * dt + body.velocity_change;
                body.velocity *= damping;
            }
            body.position += body.velocity * dt;
            body.force = Vec3::ZERO;
            body.velocity_change = Vec3::ZERO;
        }

        if let Some(ground) = self.ground_height {
            self.resolve_ground(ground);
        }

        for (id, handle) in self.handles.iter_mut() {
            if !jointed_handles.contains(id) {
                handle.velocity += handle.force / handle.mass * dt + handle.velocity_change;
                handle.position += handle.velocity * dt;
            }
            handle.force = Vec3::ZERO;
            handle.velocity_change = Vec3::ZERO;
        }

        self.sync_jointed_handles();
    }

    fn resolve_ground(&mut self, ground: f32) {
        // Нижняя точка тела = min по его коллайдерам (non-trigger)
        let mut lowest: BTreeMap<BodyId, f32> = BTreeMap::new();
        for collider in self.colliders.values() {
            let Some(body_id) = collider.body else {
                continue;
            };
            if collider.desc.trigger {
                continue;
            }
            let bottom = collider.desc.offset.y - collider.desc.shape.half_height();
            let entry = lowest.entry(body_id).or_insert(f32::MAX);
            *entry = entry.min(bottom);
        }

        for (body_id, bottom_offset) in lowest {
            let Some(body) = self.bodies.get_mut(&body_id) else {
                continue;
            };
            if body.kinematic {
                continue;
            }
            let penetration = ground - (body.position.y + bottom_offset);
            if penetration > 0.0 {
                body.position.y += penetration;
                body.velocity.y = body.velocity.y.max(0.0);
            }
        }
    }
}

fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    Some((-b - discriminant.sqrt()).max(0.0))
}

fn ray_aabb(origin: Vec3, dir: Vec3, center: Vec3, half_extents: Vec3) -> Option<f32> {
    let min = center - half_extents;
    let max = center + half_extents;
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1e-8 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let t1 = (min[axis] - o) / d;
        let t2 = (max[axis] - o) / d;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
        if t_min > t_max {
            return None;
        }
    }

    if t_max < 0.0 {
        return None;
    }
    Some(t_min.max(0.0))
}

impl GrabPhysics for HeadlessPhysics {
    fn cast_ray(&self, query: &RayQuery) -> Option<RayHit> {
        let direction = query.direction.normalize_or_zero();
        if direction == Vec3::ZERO || query.max_distance <= 0.0 {
            return None;
        }

        let mut best: Option<RayHit> = None;

        for (id, collider) in self.colliders.iter() {
            if collider.desc.trigger
                || collider.desc.layers & query.layer_mask == 0
                || query.exclude.contains(id)
            {
                continue;
            }
            let Some(center) = self.collider_center(collider) else {
                continue;
            };

            let distance = match collider.desc.shape {
                Shape::Sphere { radius } => ray_sphere(query.origin, direction, center, radius),
                Shape::Cuboid { half_extents } => ray_aabb(query.origin, direction, center, half_extents),
            };
            let Some(distance) = distance else {
                continue;
            };
            if distance > query.max_distance {
                continue;
            }
            if best.is_some_and(|hit| hit.distance <= distance) {
                continue;
            }

            best = Some(RayHit {
                point: query.origin + direction * distance,
                distance,
                collider: *id,
                body: collider.body,
            });
        }

        best
    }

    fn body_info(&self, body: BodyId) -> Option<BodyInfo> {
        self.bodies.get(&body).map(|b| BodyInfo {
            mass: b.mass,
            kinematic: b.kinematic,
            grabbable: b.grabbable,
        })
    }

    fn body_world_to_local(&self, body: BodyId, point: Vec3) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| point - b.position)
    }

    fn raise_solver_iterations(&mut self, body: BodyId, position_iterations: u32, velocity_iterations: u32) {
        if let Some(state) = self.bodies.get_mut(&body) {
            state.position_iterations = state.position_iterations.max(position_iterations);
            state.velocity_iterations = state.velocity_iterations.max(velocity_iterations);
        }
    }

    fn collider_is_trigger(&self, collider: ColliderId) -> Option<bool> {
        self.colliders.get(&collider).map(|c| c.desc.trigger)
    }

    fn set_collision_ignored(&mut self, a: ColliderId, b: ColliderId, ignored: bool) {
        if !self.colliders.contains_key(&a) || !self.colliders.contains_key(&b) {
            return;
        }
        let pair = ordered_pair(a, b);
        if ignored {
            self.ignored_pairs.insert(pair);
        } else {
            self.ignored_pairs.remove(&pair);
        }
    }

    fn is_collision_ignored(&self, a: ColliderId, b: ColliderId) -> bool {
        self.ignored_pairs.contains(&ordered_pair(a, b))
    }

    fn spawn_handle(&mut self, position: Vec3, mass: f32) -> HandleId {
        let id = HandleId(self.allocate_id());
        self.handles.insert(
            id,
            HandleState {
                position,
                velocity: Vec3::ZERO,
                mass: mass.max(0.001),
                force: Vec3::ZERO,
                velocity_change: Vec3::ZERO,
            },
        );
        id
    }

    fn despawn_handle(&mut self, handle: HandleId) {
        self.handles.remove(&handle);
        self.joints.retain(|_, joint| joint.handle != handle);
    }

    fn handle_position(&self, handle: HandleId) -> Option<Vec3> {
        self.handles.get(&handle).map(|h| h.position)
    }

    fn handle_velocity(&self, handle: HandleId) -> Option<Vec3> {
        self.handles.get(&handle).map(|h| h.velocity)
    }

    fn create_ball_joint(&mut self, handle: HandleId, body: BodyId, body_local_anchor: Vec3) -> Option<JointId> {
        if !self.handles.contains_key(&handle) || !self.bodies.contains_key(&body) {
            return None;
        }
        let id = JointId(self.allocate_id());
        self.joints.insert(
            id,
            JointState {
                handle,
                body,
                body_local_anchor,
            },
        );
        Some(id)
    }

    fn destroy_joint(&mut self, joint: JointId) {
        self.joints.remove(&joint);
    }

    fn joint_exists(&self, joint: JointId) -> bool {
        self.joints.contains_key(&joint)
    }

    fn add_handle_force(&mut self, handle: HandleId, force: Vec3, mode: ForceMode) {
        let Some(state) = self.handles.get_mut(&handle) else {
            return;
        };
        match mode {
            ForceMode::Force => state.force += force,
            ForceMode::VelocityChange => state.velocity_change += force,
        }
    }
}

/// Backend для `GrabPlugin`: headless мир как resource
pub type HeadlessBackend = ResMut<'static, HeadlessPhysics>;

impl GrabBackend for HeadlessBackend {
    fn physics<'a>(param: &'a mut SystemParamItem<'_, '_, Self>) -> &'a mut dyn GrabPhysics {
        &mut **param
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crate_body(physics: &mut HeadlessPhysics, position: Vec3, mass: f32) -> (BodyId, ColliderId) {
        let body = physics.add_body(BodyDesc::dynamic(position, mass).grabbable(Grabbable::default()));
        let collider = physics
            .attach_collider(body, ColliderDesc::cuboid(Vec3::splat(0.25)))
            .unwrap();
        (body, collider)
    }

    #[test]
    fn test_ray_hits_nearest_collider() {
        let mut physics = HeadlessPhysics::zero_gravity();
        let (_, far) = crate_body(&mut physics, Vec3::new(0.0, 0.0, -3.0), 5.0);
        let (near_body, near) = crate_body(&mut physics, Vec3::new(0.0, 0.0, -1.5), 5.0);

        let hit = physics
            .cast_ray(&RayQuery {
                origin: Vec3::ZERO,
                direction: Vec3::NEG_Z,
                max_distance: 5.0,
                layer_mask: u32::MAX,
                exclude: &[],
            })
            .unwrap();

        assert_eq!(hit.collider, near);
        assert_ne!(hit.collider, far);
        assert_eq!(hit.body, Some(near_body));
        assert!((hit.distance - 1.25).abs() < 1e-5, "distance = {}", hit.distance);
        assert!((hit.point.z + 1.25).abs() < 1e-5);
    }

    #[test]
    fn test_ray_respects_exclude_mask_and_triggers() {
        let mut physics = HeadlessPhysics::zero_gravity();
        let (_, near) = crate_body(&mut physics, Vec3::new(0.0, 0.0, -1.0), 5.0);
        let trigger_body = physics.add_body(BodyDesc::dynamic(Vec3::new(0.0, 0.0, -1.8), 1.0));
        physics.attach_collider(trigger_body, ColliderDesc::sphere(0.3).as_trigger());
        let (far_body, _) = crate_body(&mut physics, Vec3::new(0.0, 0.0, -2.5), 5.0);

        let exclude = [near];
        let hit = physics
            .cast_ray(&RayQuery {
                origin: Vec3::ZERO,
                direction: Vec3::NEG_Z,
                max_distance: 5.0,
                layer_mask: u32::MAX,
                exclude: &exclude,
            })
            .unwrap();
        assert_eq!(hit.body, Some(far_body));

        let miss = physics.cast_ray(&RayQuery {
            origin: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            max_distance: 5.0,
            layer_mask: 0,
            exclude: &[],
        });
        assert!(miss.is_none());
    }

    #[test]
    fn test_ray_max_distance() {
        let mut physics = HeadlessPhysics::zero_gravity();
        crate_body(&mut physics, Vec3::new(0.0, 0.0, -4.0), 5.0);

        let hit = physics.cast_ray(&RayQuery {
            origin: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            max_distance: 3.0,
            layer_mask: u32::MAX,
            exclude: &[],
        });
        assert!(hit.is_none());
    }

    #[test]
    fn test_jointed_handle_moves_body() {
        let mut physics = HeadlessPhysics::zero_gravity();
        let (body, _) = crate_body(&mut physics, Vec3::ZERO, 10.0);
        let handle = physics.spawn_handle(Vec3::new(0.0, 0.25, 0.0), 0.2);
        physics.create_ball_joint(handle, body, Vec3::new(0.0, 0.25, 0.0)).unwrap();

        physics.add_handle_force(handle, Vec3::new(10.2, 0.0, 0.0), ForceMode::Force);
        physics.step(1.0);

        // a = F / (10 + 0.2) = 1 m/s²
        let velocity = physics.body_velocity(body).unwrap();
        assert!((velocity.x - 1.0).abs() < 1e-5, "velocity = {:?}", velocity);

        // Handle остаётся на anchor
        let handle_pos = physics.handle_position(handle).unwrap();
        let body_pos = physics.body_position(body).unwrap();
        assert!((handle_pos - (body_pos + Vec3::new(0.0, 0.25, 0.0))).length() < 1e-5);
    }

    #[test]
    fn test_remove_body_drops_joints_and_ignored_pairs() {
        let mut physics = HeadlessPhysics::zero_gravity();
        let (body, collider) = crate_body(&mut physics, Vec3::ZERO, 10.0);
        let player = physics.add_static_collider(ColliderDesc::sphere(0.4));
        let handle = physics.spawn_handle(Vec3::ZERO, 0.2);
        let joint = physics.create_ball_joint(handle, body, Vec3::ZERO).unwrap();
        physics.set_collision_ignored(player, collider, true);
        assert!(physics.is_collision_ignored(collider, player));

        physics.remove_body(body);

        assert!(!physics.body_exists(body));
        assert!(!physics.joint_exists(joint));
        assert!(!physics.collider_exists(collider));
        assert_eq!(physics.ignored_pair_count(), 0);
        // Handle — собственность grab core, backend его не трогает
        assert!(physics.handle_position(handle).is_some());
    }

    #[test]
    fn test_ground_plane_stops_fall() {
        let mut physics = HeadlessPhysics::default();
        let (body, _) = crate_body(&mut physics, Vec3::new(0.0, 1.0, 0.0), 5.0);

        for _ in 0..240 {
            physics.step(1.0 / 60.0);
        }

        let position = physics.body_position(body).unwrap();
        assert!((position.y - 0.25).abs() < 1e-4, "y = {}", position.y);
    }

    #[test]
    fn test_raise_solver_iterations_never_lowers() {
        let mut physics = HeadlessPhysics::zero_gravity();
        let (body, _) = crate_body(&mut physics, Vec3::ZERO, 1.0);

        physics.raise_solver_iterations(body, 12, 12);
        assert_eq!(physics.solver_iterations(body), Some((12, 12)));

        physics.raise_solver_iterations(body, 4, 20);
        assert_eq!(physics.solver_iterations(body), Some((12, 20)));
    }
}
