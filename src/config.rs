// Timeouts, topics, calibration and hardware configuration
//
// Defaults live in the constants below. A JSON file can override any section;
// missing sections fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::course::{default_course, Course, CourseError, SegmentSpec};
use crate::motor::bus::DEFAULT_BAUDRATE;
use crate::motor::kinematics::HALF_TRACK;
use crate::safety::EstopPolicy;
use crate::sequencer::SequencerSettings;

// Control loop period
pub const TICK_PERIOD_MS: u64 = 10;

// Pause between a segment's stop and the next command
pub const SETTLE_TICKS: u64 = 10;

// Time held stopped in Ready before the first segment
pub const START_SETTLE_TICKS: u64 = 10;

// Zenoh topics
pub const TOPIC_EVENTS: &str = "omni_race/events"; // transitions, estop, result
pub const TOPIC_HEALTH: &str = "omni_race/health"; // health status

// Serial port for the base board
pub const BOARD_PORT: &str = "/dev/ttyUSB0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid course: {0}")]
    Course(#[from] CourseError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_period_ms: u64,
    pub settle_ticks: u64,
    pub start_settle_ticks: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: TICK_PERIOD_MS,
            settle_ticks: SETTLE_TICKS,
            start_settle_ticks: START_SETTLE_TICKS,
        }
    }
}

impl TimingConfig {
    /// Loop period, never shorter than 1 ms
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VehicleConfig {
    /// Centerline to wheel contact line, meters
    pub half_track: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            half_track: HALF_TRACK,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    pub estop_policy: EstopPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    pub port: String,
    pub baudrate: u32,
    /// Run against the in-process simulator instead of the base board
    pub simulate: bool,
    /// Simulator only: space bar acts as the stop button
    pub keyboard_estop: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            port: BOARD_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            simulate: false,
            keyboard_estop: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Publish events and health over zenoh
    pub enabled: bool,
}

/// Main configuration for a race run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default = "default_course")]
    pub course: Vec<SegmentSpec>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            vehicle: VehicleConfig::default(),
            safety: SafetyConfig::default(),
            hardware: HardwareConfig::default(),
            telemetry: TelemetryConfig::default(),
            course: default_course(),
        }
    }
}

impl RaceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and check the course table links
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RaceConfig = serde_json::from_str(text)?;
        config.build_course()?;
        Ok(config)
    }

    pub fn build_course(&self) -> Result<Course, CourseError> {
        Course::new(self.course.clone())
    }

    pub fn sequencer_settings(&self) -> SequencerSettings {
        SequencerSettings {
            tick_period: self.timing.tick_period(),
            settle_ticks: self.timing.settle_ticks,
            start_settle_ticks: self.timing.start_settle_ticks,
        }
    }
}
