// Operator emergency stop
//
// Polled once per tick, before the sequencer. A pressed button stops the
// wheels and clears the distance; it never touches the race state itself.
// What happens to the race afterwards is the runtime's `EstopPolicy`.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::distance::DistanceTracker;
use crate::hal::{Actuator, ButtonState, Result, StopButton, StopMode, WheelEncoders};
use crate::motor::MotionController;

/// What the race does after an emergency stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstopPolicy {
    /// Stay in the current segment and re-issue its command once released
    #[default]
    Resume,
    /// Abandon the race; the vehicle stays braked until restart
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyStatus {
    Clear,
    /// Button went down this tick
    Pressed,
    /// Button still down from an earlier tick
    Held,
}

impl SafetyStatus {
    pub fn is_tripped(self) -> bool {
        self != SafetyStatus::Clear
    }
}

pub struct SafetyMonitor<B> {
    button: B,
    engaged: bool,
    trips: u32,
}

impl<B: StopButton> SafetyMonitor<B> {
    pub fn new(button: B) -> Self {
        Self {
            button,
            engaged: false,
            trips: 0,
        }
    }

    /// Sample the stop input and enforce it
    pub fn poll<A: Actuator, E: WheelEncoders>(
        &mut self,
        motion: &mut MotionController<A>,
        distance: &mut DistanceTracker<E>,
    ) -> Result<SafetyStatus> {
        match self.button.read()? {
            ButtonState::Released => {
                if self.engaged {
                    info!("Emergency stop released");
                }
                self.engaged = false;
                Ok(SafetyStatus::Clear)
            }
            ButtonState::Pressed => {
                motion.stop(StopMode::Brake)?;
                distance.reset()?;

                if self.engaged {
                    Ok(SafetyStatus::Held)
                } else {
                    self.engaged = true;
                    self.trips += 1;
                    warn!(trips = self.trips, "Emergency stop pressed, braking");
                    Ok(SafetyStatus::Pressed)
                }
            }
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Number of distinct presses seen
    pub fn trips(&self) -> u32 {
        self.trips
    }
}
