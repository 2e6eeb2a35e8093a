//! Player motor — потребитель authority от grab системы
//!
//! Архитектура:
//! - Velocity интегрируем сами (crisp feel, mass-independent)
//! - Acceleration/braking масштабируются authority ∈ [0, 1]
//! - GrabController пишет authority не чаще одного раза за fixed step
//!
//! Ground check, прыжки, crouch — забота character controller движка,
//! здесь только планарная часть которую throttle'ит захват.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::backend::BodyId;
use super::headless::HeadlessPhysics;
use crate::components::PlayerCamera;
use crate::grab::GrabSet;

/// Параметры планарного движения
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct MotorConfig {
    /// Скорость ходьбы (m/s)
    pub walk_speed: f32,
    /// Разгон на земле (m/s²)
    pub acceleration: f32,
    /// Торможение без input (m/s²)
    pub braking: f32,
    /// Safety clamp: max изменение скорости за fixed step (m/s)
    pub max_delta_v_per_step: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            walk_speed: 6.5,
            acceleration: 60.0,
            braking: 80.0,
            max_delta_v_per_step: 4.5,
        }
    }
}

/// Motor компонент игрока
///
/// Инвариант: 0.0 ≤ authority ≤ 1.0
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct PlayerMotor {
    pub config: MotorConfig,
    /// 1 = полный контроль, меньше — игрока "тащит" груз
    authority: f32,
    /// Текущая планарная скорость (y всегда 0)
    pub velocity: Vec3,
}

impl Default for PlayerMotor {
    fn default() -> Self {
        Self::new(MotorConfig::default())
    }
}

impl PlayerMotor {
    pub fn new(config: MotorConfig) -> Self {
        Self {
            config,
            authority: 1.0,
            velocity: Vec3::ZERO,
        }
    }

    pub fn authority(&self) -> f32 {
        self.authority
    }

    pub fn set_authority(&mut self, authority: f32) {
        self.authority = authority.clamp(0.0, 1.0);
    }

    /// Один fixed step: двигаем velocity к желаемой (wish direction × speed)
    ///
    /// `direction` — world-space wish direction, y игнорируется.
    pub fn step_velocity(&mut self, direction: Vec3, delta: f32) -> Vec3 {
        let mut wish = Vec3::new(direction.x, 0.0, direction.z);
        if wish.length_squared() > 1.0 {
            wish = wish.normalize();
        }
        let has_input = wish.length_squared() > 0.0001;

        let accel = self.config.acceleration * self.authority;
        let brake = self.config.braking * self.authority;

        let delta_v = if has_input {
            wish * self.config.walk_speed - self.velocity
        } else {
            -self.velocity
        };

        let max_dv = ((if has_input { accel } else { brake }) * delta).min(self.config.max_delta_v_per_step);
        self.velocity += delta_v.clamp_length_max(max_dv.max(0.0));
        self.velocity
    }
}

/// Входные данные для движения (WASD, уже в world space)
///
/// Для headless тестов — mock input через этот компонент.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct MovementInput {
    pub direction: Vec3,
}

/// Kinematic тело игрока (headless body или Rapier капсула)
#[derive(Component, Debug, Clone, Copy)]
pub struct PlayerBody(pub BodyId);

/// Система применения movement input к motor
///
/// Работает в FixedUpdate после записи authority.
pub fn apply_motor_input(
    mut query: Query<(&mut PlayerMotor, &MovementInput)>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.timestep().as_secs_f32();

    for (mut motor, input) in query.iter_mut() {
        motor.step_velocity(input.direction, delta);
    }
}

/// Locomotion Plugin: motor игрока (потребитель grab authority)
pub struct LocomotionPlugin;

impl Plugin for LocomotionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, apply_motor_input.after(GrabSet::Authority));
    }
}

/// Система синхронизации motor velocity → kinematic тело headless мира
pub fn sync_motor_to_headless_body(
    query: Query<(&PlayerMotor, &PlayerBody)>,
    mut physics: ResMut<HeadlessPhysics>,
) {
    for (motor, body) in query.iter() {
        physics.set_body_velocity(body.0, motor.velocity);
    }
}

/// Камера едет за телом игрока (eye offset над центром капсулы)
///
/// Запускается после physics step, чтобы следующий drive видел свежий pose.
pub fn follow_player_body(
    mut query: Query<(&PlayerBody, &mut PlayerCamera)>,
    physics: Res<HeadlessPhysics>,
) {
    for (body, mut camera) in query.iter_mut() {
        if let Some(position) = physics.body_position(body.0) {
            camera.pose.translation = position + camera.eye_offset;
        }
    }
}
