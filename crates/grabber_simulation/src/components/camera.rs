//! Camera pose компонент
//!
//! Pose приходит от input коллаборатора (mouse look) каждый frame.
//! Grab core читает его в двух местах: raycast при захвате и
//! camera-relative hold point каждый fixed step.

use bevy::prelude::*;

/// Pose first-person камеры игрока
///
/// # Convention
/// Обычный Bevy `Transform`: forward = -Z, right = +X, up = +Y.
/// Scale не используется (всегда 1).
#[derive(Component, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Component)]
pub struct PlayerCamera {
    pub pose: Transform,
    /// Смещение глаз над центром тела (для follow системы)
    pub eye_offset: Vec3,
}

impl Default for PlayerCamera {
    fn default() -> Self {
        Self {
            pose: Transform::from_xyz(0.0, 1.6, 0.0),
            eye_offset: Vec3::new(0.0, 0.7, 0.0),
        }
    }
}

impl PlayerCamera {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            pose: Transform::from_translation(position).with_rotation(rotation),
            ..default()
        }
    }

    /// Камера в `position`, смотрит на `target`
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            pose: Transform::from_translation(position).looking_at(target, Vec3::Y),
            ..default()
        }
    }

    pub fn position(&self) -> Vec3 {
        self.pose.translation
    }

    /// Повернуть взгляд на `target` (позиция не меняется)
    pub fn look_at(&mut self, target: Vec3) {
        self.pose.look_at(target, Vec3::Y);
    }

    pub fn forward(&self) -> Vec3 {
        self.pose.forward().as_vec3()
    }

    /// Local (camera space) → world
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.pose.transform_point(local)
    }

    /// World → local (camera space)
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.pose.compute_affine().inverse().transform_point3(world)
    }
}
