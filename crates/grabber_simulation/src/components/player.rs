//! Player компоненты: marker + коллайдеры иерархии игрока

use bevy::prelude::Component;

use crate::physics::ColliderId;

/// Marker component для player-controlled entity
///
/// Grab системы используют `With<Player>` filter.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Player;

/// Все коллайдеры иерархии игрока (капсула, руки, ноги)
///
/// - Исключаются из grab raycast (ray проходит сквозь себя)
/// - С ними выключаются контакты захваченного объекта
#[derive(Component, Debug, Clone, Default)]
pub struct PlayerColliders(pub Vec<ColliderId>);
