//! HoldTargetFilter — rate limiter для desired hold point
//!
//! Камера может дёрнуться за один frame (mouse flick, snap turn), но точка
//! приложения силы не должна телепортироваться: hold target догоняет
//! desired hold point со скоростью не выше `max_speed`.

use bevy::prelude::*;

use super::math::move_towards;

/// Сглаженный hold target (world space)
///
/// Инвариант: |Δposition| за тик ≤ max_speed × dt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldTargetFilter {
    position: Vec3,
}

impl HoldTargetFilter {
    /// Старт в позиции handle → нулевое натяжение в момент захвата
    pub fn new(initial: Vec3) -> Self {
        Self { position: initial }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Продвинуться к `desired` не дальше `max_speed * dt`
    pub fn advance(&mut self, desired: Vec3, max_speed: f32, delta: f32) -> Vec3 {
        // NaN/inf от внешнего input не должен отравить target
        if !desired.is_finite() {
            return self.position;
        }
        let step = (max_speed * delta).max(0.0);
        self.position = move_towards(self.position, desired, step);
        self.position
    }
}
