//! GrabPhysics — граница между grab core и rigid-body движком
//!
//! Архитектура (та же что strategic/tactical split):
//! - Core (GrabHand/GrabController) = правила: slack, spring, clamp, release
//! - Backend = солвер: тела, коллайдеры, joints, raycast, силы
//!
//! Core держит только id (weak references). Любой id может стать
//! невалидным между тиками — backend обязан отвечать `None`/no-op,
//! а не паниковать.

use bevy::ecs::system::{SystemParam, SystemParamItem};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Id rigid body (внешнее тело, core им не владеет)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Reflect)]
pub struct BodyId(pub u64);

/// Id коллайдера (может принадлежать телу или быть static)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Reflect)]
pub struct ColliderId(pub u64);

/// Id proxy тела (SpringHandle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Reflect)]
pub struct HandleId(pub u64);

/// Id joint constraint (handle ↔ target)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Reflect)]
pub struct JointId(pub u64);

/// Per-object настройки захвата (то что висит на объекте в сцене)
///
/// В Rapier мире — компонент на entity тела, в headless — поле BodyDesc.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[reflect(Component)]
#[serde(default)]
pub struct Grabbable {
    /// false → объект нельзя взять
    pub allow_grab: bool,
    /// Множитель "тяжести" поверх массы (2.0 = тянуть в 2 раза труднее)
    pub weight_multiplier: f32,
}

impl Default for Grabbable {
    fn default() -> Self {
        Self {
            allow_grab: true,
            weight_multiplier: 1.0,
        }
    }
}

/// Snapshot тела, которое потенциально можно взять
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyInfo {
    pub mass: f32,
    pub kinematic: bool,
    /// None → на теле нет Grabbable (захват запрещён)
    pub grabbable: Option<Grabbable>,
}

/// Режим применения силы
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    /// Непрерывная сила (N), интегрируется солвером за шаг
    Force,
    /// Мгновенное изменение скорости (m/s), mass-independent
    VelocityChange,
}

/// Параметры ray-cast запроса
#[derive(Debug, Clone)]
pub struct RayQuery<'a> {
    pub origin: Vec3,
    /// Направление (нормализуется backend'ом)
    pub direction: Vec3,
    pub max_distance: f32,
    /// Битовая маска слоёв (см. collision_layers)
    pub layer_mask: u32,
    /// Коллайдеры которые ray проходит насквозь (иерархия игрока)
    pub exclude: &'a [ColliderId],
}

/// Ближайшее попадание ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub distance: f32,
    pub collider: ColliderId,
    /// None → static геометрия (стена, пол)
    pub body: Option<BodyId>,
}

/// Контракт физического коллаборатора
///
/// Все мутации адресованы текущему physics step: силы накапливаются
/// и применяются солвером на ближайшем шаге.
pub trait GrabPhysics {
    /// Ближайшее non-trigger попадание, или None
    fn cast_ray(&self, query: &RayQuery) -> Option<RayHit>;

    fn body_info(&self, body: BodyId) -> Option<BodyInfo>;

    fn body_exists(&self, body: BodyId) -> bool {
        self.body_info(body).is_some()
    }

    /// World point → local space тела (для connected anchor)
    fn body_world_to_local(&self, body: BodyId, point: Vec3) -> Option<Vec3>;

    /// Поднять solver iterations тела до минимумов (никогда не понижает)
    fn raise_solver_iterations(&mut self, body: BodyId, position_iterations: u32, velocity_iterations: u32);

    /// None → коллайдер уничтожен
    fn collider_is_trigger(&self, collider: ColliderId) -> Option<bool>;

    fn collider_exists(&self, collider: ColliderId) -> bool {
        self.collider_is_trigger(collider).is_some()
    }

    /// Включить/выключить игнор контактов между парой (симметрично)
    fn set_collision_ignored(&mut self, a: ColliderId, b: ColliderId, ignored: bool);

    fn is_collision_ignored(&self, a: ColliderId, b: ColliderId) -> bool;

    /// Proxy тело без гравитации, CCD, interpolation
    fn spawn_handle(&mut self, position: Vec3, mass: f32) -> HandleId;

    fn despawn_handle(&mut self, handle: HandleId);

    fn handle_position(&self, handle: HandleId) -> Option<Vec3>;

    fn handle_velocity(&self, handle: HandleId) -> Option<Vec3>;

    /// Ball joint: translation locked, rotation free.
    /// `handle` anchor = local origin, `body_local_anchor` в local space тела.
    fn create_ball_joint(&mut self, handle: HandleId, body: BodyId, body_local_anchor: Vec3) -> Option<JointId>;

    fn destroy_joint(&mut self, joint: JointId);

    fn joint_exists(&self, joint: JointId) -> bool;

    fn add_handle_force(&mut self, handle: HandleId, force: Vec3, mode: ForceMode);
}

/// Как grab системы достают GrabPhysics из World
///
/// Backend — любой SystemParam: resource (`ResMut<HeadlessPhysics>`) или
/// набор запросов поверх Rapier (`RapierGrabPhysics`). Системы берут его
/// через `StaticSystemParam<B>`.
pub trait GrabBackend: SystemParam + 'static {
    fn physics<'a>(param: &'a mut SystemParamItem<'_, '_, Self>) -> &'a mut dyn GrabPhysics;
}
