// Four-wheel omnidirectional kinematics
// Converts body-frame commands (forward, lateral, angular) to individual wheel
// setpoints and estimates body velocity back from measured wheel speeds.

use serde::{Deserialize, Serialize};

/// Default half of the lateral wheel separation (meters)
pub const HALF_TRACK: f32 = 0.0875;

/// Documented command ranges. The controller does not clamp; callers do.
pub const LINEAR_LIMIT: f32 = 1.0;
pub const ANGULAR_LIMIT: f32 = 5.0;

/// Angular command per unit of preset speed for turning maneuvers
pub const SPIN_SCALE: f32 = 5.0;

/// Unified body velocity command
///
/// A new command fully replaces the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    #[serde(default)]
    pub forward: f32,
    #[serde(default)]
    pub lateral: f32,
    #[serde(default)]
    pub angular: f32,
}

impl VelocityCommand {
    pub const ZERO: Self = Self {
        forward: 0.0,
        lateral: 0.0,
        angular: 0.0,
    };

    pub fn new(forward: f32, lateral: f32, angular: f32) -> Self {
        Self {
            forward,
            lateral,
            angular,
        }
    }

    pub fn straight(forward: f32) -> Self {
        Self::new(forward, 0.0, 0.0)
    }

    pub fn arc(forward: f32, angular: f32) -> Self {
        Self::new(forward, 0.0, angular)
    }

    pub fn is_zero(&self) -> bool {
        self.forward == 0.0 && self.lateral == 0.0 && self.angular == 0.0
    }

    /// True when every axis is inside its documented range
    pub fn within_limits(&self) -> bool {
        self.forward.abs() <= LINEAR_LIMIT
            && self.lateral.abs() <= LINEAR_LIMIT
            && self.angular.abs() <= ANGULAR_LIMIT
    }
}

/// Per-wheel speed setpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub front_left: f32,
    pub rear_left: f32,
    pub front_right: f32,
    pub rear_right: f32,
}

impl WheelSpeeds {
    pub fn new(front_left: f32, rear_left: f32, front_right: f32, rear_right: f32) -> Self {
        Self {
            front_left,
            rear_left,
            front_right,
            rear_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|&s| s == 0.0)
    }

    /// Returns speeds as array [front_left, rear_left, front_right, rear_right]
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.front_left,
            self.rear_left,
            self.front_right,
            self.rear_right,
        ]
    }
}

/// Convert a body command to wheel setpoints
///
/// # Arguments
/// * `cmd` - forward/lateral in [-1, 1], angular in [-5, 5] (unchecked)
/// * `half_track` - distance from the vehicle centerline to the wheel contact line
pub fn mix(cmd: VelocityCommand, half_track: f32) -> WheelSpeeds {
    let angular_component = cmd.angular * half_track;

    WheelSpeeds {
        front_left: cmd.forward - cmd.lateral - angular_component,
        rear_left: cmd.forward + cmd.lateral - angular_component,
        front_right: cmd.forward + cmd.lateral + angular_component,
        rear_right: cmd.forward - cmd.lateral + angular_component,
    }
}

/// Estimate body velocity from measured wheel speeds
///
/// Lateral velocity is not observable with this model and is reported as 0.
pub fn unmix(speeds: WheelSpeeds, half_track: f32) -> VelocityCommand {
    let [fl, rl, fr, rr] = speeds.as_array();

    let forward = (fl + rl + fr + rr) / 4.0;
    let angular = -(fl + rl - fr - rr) / 4.0 / half_track;
    // Keep -0.0 out of logs
    let angular = if angular == 0.0 { 0.0 } else { angular };

    VelocityCommand::new(forward, 0.0, angular)
}

/// Preset maneuvers, mainly for calibration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Maneuver {
    Stop,
    Run,
    Back,
    Left,
    Right,
    SpinLeft,
    SpinRight,
    Brake,
}

impl Maneuver {
    /// Velocity command for this maneuver, or `None` for the stop presets
    ///
    /// `speed` is used as a magnitude and capped at 1.0.
    pub fn command(self, speed: f32) -> Option<VelocityCommand> {
        let speed = speed.abs().min(LINEAR_LIMIT);
        match self {
            Maneuver::Stop | Maneuver::Brake => None,
            Maneuver::Run => Some(VelocityCommand::straight(speed)),
            Maneuver::Back => Some(VelocityCommand::straight(-speed)),
            Maneuver::Left => Some(VelocityCommand::arc(speed, speed * SPIN_SCALE)),
            Maneuver::Right => Some(VelocityCommand::arc(speed, -speed * SPIN_SCALE)),
            Maneuver::SpinLeft => Some(VelocityCommand::arc(0.0, speed * SPIN_SCALE)),
            Maneuver::SpinRight => Some(VelocityCommand::arc(0.0, -speed * SPIN_SCALE)),
        }
    }
}
