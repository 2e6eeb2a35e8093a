//! ECS Components игрока
//!
//! - player: marker + коллайдеры иерархии (Player, PlayerColliders)
//! - camera: first-person camera pose (PlayerCamera)

pub mod camera;
pub mod player;

// Re-exports для удобного импорта
pub use camera::*;
pub use player::*;
