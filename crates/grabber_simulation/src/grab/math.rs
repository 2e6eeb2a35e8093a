//! Scalar/vector helpers для grab математики

use bevy::prelude::*;

/// NaN → 0 (f32::clamp пропускает NaN насквозь)
pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Позиция `value` между `a` и `b`, clamped в [0, 1]. При a == b → 0.
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if (b - a).abs() <= f32::EPSILON {
        return 0.0;
    }
    clamp01((value - a) / (b - a))
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * clamp01(t)
}

/// Сдвинуть `current` к `target` не дальше чем на `max_step`
pub fn move_towards(current: Vec3, target: Vec3, max_step: f32) -> Vec3 {
    let offset = target - current;
    let distance = offset.length();
    if distance <= max_step || distance <= f32::EPSILON {
        return target;
    }
    current + offset / distance * max_step.max(0.0)
}
