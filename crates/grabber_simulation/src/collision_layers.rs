//! Collision Layers Constants
//!
//! Centralised битовые маски для raycast/коллайдеров.
//!
//! ## Архитектура:
//! - **Layers:** на каком слое находится коллайдер
//! - **Mask:** какие слои видит запрос (raycast grab)
//!
//! ## Layers:
//! - Layer 1 (0b1 = 1): Reserved
//! - Layer 2 (0b10 = 2): Player (капсула + руки игрока)
//! - Layer 3 (0b100 = 4): Environment (пол, стены)
//! - Layer 4 (0b1000 = 8): Props (двигаемые объекты)
//! - Layer 5 (0b10000 = 16): Ragdolls (конечности, трупы)

/// Layer 2: Player
pub const COLLISION_LAYER_PLAYER: u32 = 0b10; // 2

/// Layer 3: Environment (static геометрия)
pub const COLLISION_LAYER_ENVIRONMENT: u32 = 0b100; // 4

/// Layer 4: Props (ящики, бочки, инструменты)
pub const COLLISION_LAYER_PROPS: u32 = 0b1000; // 8

/// Layer 5: Ragdolls
pub const COLLISION_LAYER_RAGDOLLS: u32 = 0b10000; // 16

/// Mask: grab raycast — видит всё кроме игрока.
///
/// Environment в маске: стена между камерой и ящиком блокирует захват.
pub const COLLISION_MASK_GRAB: u32 = COLLISION_LAYER_ENVIRONMENT | COLLISION_LAYER_PROPS | COLLISION_LAYER_RAGDOLLS;
