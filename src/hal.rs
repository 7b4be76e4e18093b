// Hardware seams for the race core
//
// The sequencer, safety monitor and motion controller only reach the vehicle
// through these traits. The serial base board, the simulator and the test
// fakes all implement them.

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::WheelSpeeds;

/// Error types for talking to the vehicle hardware
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from board {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for board {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Board {id} returned error status: 0x{status:02X}")]
    DeviceError { id: u8, status: u8 },

    #[error("Timeout waiting for response from board {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, HalError>;

/// Electrical behaviour of the drivers when the wheels are stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// Outputs released, wheels spin down freely
    Coast,
    /// Outputs shorted, wheels held
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Raw encoder accumulators, one per wheel, in pulses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelCounts {
    pub front_left: i64,
    pub rear_left: i64,
    pub front_right: i64,
    pub rear_right: i64,
}

impl WheelCounts {
    pub fn new(front_left: i64, rear_left: i64, front_right: i64, rear_right: i64) -> Self {
        Self {
            front_left,
            rear_left,
            front_right,
            rear_right,
        }
    }

    /// Same count on every wheel
    pub fn uniform(count: i64) -> Self {
        Self::new(count, count, count, count)
    }

    /// Returns counts as array [front_left, rear_left, front_right, rear_right]
    pub fn as_array(&self) -> [i64; 4] {
        [
            self.front_left,
            self.rear_left,
            self.front_right,
            self.rear_right,
        ]
    }
}

/// Wheel drive outputs
pub trait Actuator {
    /// Forward four wheel setpoints to the drivers
    fn set_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<()>;

    /// Zero all outputs with the requested electrical behaviour
    fn stop(&mut self, mode: StopMode) -> Result<()>;

    /// Measured wheel speeds, same units as the setpoints
    fn read_wheel_speeds(&mut self) -> Result<WheelSpeeds>;
}

/// Quadrature encoder accumulators
pub trait WheelEncoders {
    fn read_counts(&mut self) -> Result<WheelCounts>;
    fn reset_counts(&mut self) -> Result<()>;
}

/// Operator emergency stop input (already debounced)
pub trait StopButton {
    fn read(&mut self) -> Result<ButtonState>;
}

pub trait BatteryMonitor {
    /// Pack voltage in volts
    fn voltage(&mut self) -> Result<f32>;
}
