//! Grab tuning: все параметры захвата в одном месте
//!
//! Значения по умолчанию подобраны под first-person масштаб
//! (человек ~1.8m, ящик 25kg переносится одной рукой без усилия).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collision_layers::COLLISION_MASK_GRAB;

/// Как кнопка управляет захватом
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrabMode {
    /// Press = взять, следующий press = отпустить
    #[default]
    Toggle,
    /// Press = взять, release кнопки = отпустить
    Hold,
}

/// Конфигурация GrabController (на игрока)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    // === Raycast ===
    /// Дальность захвата от камеры (метры)
    pub grab_distance: f32,
    /// Слои видимые grab raycast
    pub grab_mask: u32,
    pub grab_mode: GrabMode,

    // === Hold behaviour ===
    /// Запомнить точку захвата относительно камеры (нет рывка при захвате)
    pub hold_at_grab_point: bool,
    /// Минимальная глубина hold point перед камерой (метры)
    pub min_hold_forward: f32,
    /// Hold point без сохранённого offset: столько метров вперёд от камеры
    pub fallback_hold_distance: f32,

    // === Arm range ("grey zone") ===
    /// В этом радиусе рука двигается не таща объект
    pub arm_slack_radius: f32,
    /// На этой дистанции рука полностью вытянута
    pub arm_max_distance: f32,
    /// Safety release при безумном растяжении (взрыв солвера и т.п.)
    pub hard_release_distance: f32,

    // === Hold target smoothing ===
    /// Max скорость невидимого hold target (m/s), убивает camera-yank
    pub hold_target_max_speed: f32,

    // === Force / feel ===
    /// Базовая max сила на руку (N)
    pub base_max_force: f32,
    /// Жёсткость пружины за пределами slack (N/m)
    pub position_spring: f32,
    /// Демпфирование handle (N·s/m)
    pub damping: f32,
    /// Доля damping внутри grey zone
    pub grey_zone_damping_scale: f32,

    // === Weight / mass scaling ===
    /// Тяжёлые объекты уменьшают эффективную силу
    pub scale_force_by_mass: bool,
    /// Масса при которой сила ощущается "нормальной" (kg)
    pub mass_reference: f32,

    // === Strength ===
    pub strength_multiplier: f32,

    // === Movement strain ===
    /// Authority игрока при полном растяжении
    pub min_authority_at_full_stretch: f32,
    /// Stretch (0..1) с которого начинаем тормозить игрока
    pub slow_player_start_at_stretch01: f32,

    // === Collision handling ===
    pub ignore_player_collision_while_grabbed: bool,

    // === Handle / solver ===
    /// Масса proxy тела (kg)
    pub handle_mass: f32,
    pub min_solver_iterations: u32,
    pub min_solver_velocity_iterations: u32,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            grab_distance: 3.0,
            grab_mask: COLLISION_MASK_GRAB,
            grab_mode: GrabMode::Toggle,
            hold_at_grab_point: true,
            min_hold_forward: 0.7,
            fallback_hold_distance: 1.6,
            arm_slack_radius: 0.45,
            arm_max_distance: 1.25,
            hard_release_distance: 2.5,
            hold_target_max_speed: 7.0,
            base_max_force: 700.0,
            position_spring: 4500.0,
            damping: 140.0,
            grey_zone_damping_scale: 0.25,
            scale_force_by_mass: true,
            mass_reference: 25.0,
            strength_multiplier: 1.0,
            min_authority_at_full_stretch: 0.2,
            slow_player_start_at_stretch01: 0.9,
            ignore_player_collision_while_grabbed: true,
            handle_mass: 0.2,
            min_solver_iterations: 12,
            min_solver_velocity_iterations: 12,
        }
    }
}

impl GrabConfig {
    /// Max сила на руку с учётом strength (strength не ниже 5%)
    pub fn max_force(&self) -> f32 {
        self.base_max_force * self.strength_multiplier.max(0.05)
    }

    /// Срез параметров для GrabHand::fixed_update_drive
    pub fn drive_params(&self) -> DriveParams {
        DriveParams {
            spring: self.position_spring,
            damping: self.damping,
            grey_zone_damping_scale: self.grey_zone_damping_scale,
            max_force: self.max_force(),
            slack_radius: self.arm_slack_radius,
            arm_max_distance: self.arm_max_distance,
            hard_release_distance: self.hard_release_distance,
            hold_target_max_speed: self.hold_target_max_speed,
            scale_by_mass: self.scale_force_by_mass,
            mass_reference: self.mass_reference,
        }
    }

    /// Parse + validate JSON конфиг (отсутствующие поля = defaults)
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GrabConfig = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Parse)
    }

    /// Проверка инвариантов: 0 ≤ slack < arm_max < hard_release, силы > 0, доли ∈ [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(field, format!("must be > 0, got {}", value)))
            }
        }

        fn unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::invalid(field, format!("must be in [0, 1], got {}", value)))
            }
        }

        positive("grab_distance", self.grab_distance)?;
        positive("hold_target_max_speed", self.hold_target_max_speed)?;
        positive("base_max_force", self.base_max_force)?;
        positive("handle_mass", self.handle_mass)?;
        positive("fallback_hold_distance", self.fallback_hold_distance)?;

        if !(self.arm_slack_radius >= 0.0) {
            return Err(ConfigError::invalid(
                "arm_slack_radius",
                format!("must be >= 0, got {}", self.arm_slack_radius),
            ));
        }
        if self.arm_max_distance <= self.arm_slack_radius {
            return Err(ConfigError::invalid(
                "arm_max_distance",
                format!(
                    "must be > arm_slack_radius ({}), got {}",
                    self.arm_slack_radius, self.arm_max_distance
                ),
            ));
        }
        if self.hard_release_distance <= self.arm_max_distance {
            return Err(ConfigError::invalid(
                "hard_release_distance",
                format!(
                    "must be > arm_max_distance ({}), got {}",
                    self.arm_max_distance, self.hard_release_distance
                ),
            ));
        }
        if self.position_spring < 0.0 || self.damping < 0.0 {
            return Err(ConfigError::invalid("position_spring/damping", "must be >= 0".to_string()));
        }

        unit("grey_zone_damping_scale", self.grey_zone_damping_scale)?;
        unit("min_authority_at_full_stretch", self.min_authority_at_full_stretch)?;
        unit("slow_player_start_at_stretch01", self.slow_player_start_at_stretch01)?;

        if self.min_hold_forward < 0.0 {
            return Err(ConfigError::invalid(
                "min_hold_forward",
                format!("must be >= 0, got {}", self.min_hold_forward),
            ));
        }

        Ok(())
    }
}

/// Параметры одного drive тика (общие для обеих рук)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveParams {
    pub spring: f32,
    pub damping: f32,
    pub grey_zone_damping_scale: f32,
    /// Уже с учётом strength
    pub max_force: f32,
    pub slack_radius: f32,
    pub arm_max_distance: f32,
    pub hard_release_distance: f32,
    pub hold_target_max_speed: f32,
    pub scale_by_mass: bool,
    pub mass_reference: f32,
}

impl Default for DriveParams {
    fn default() -> Self {
        GrabConfig::default().drive_params()
    }
}

/// Ошибка загрузки/валидации конфига
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: String) -> Self {
        ConfigError::Invalid { field, reason }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(err) => write!(f, "grab config parse error: {}", err),
            ConfigError::Invalid { field, reason } => write!(f, "grab config field '{}' {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid { .. } => None,
        }
    }
}
