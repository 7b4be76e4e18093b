// Motor control module for the four-wheel omnidirectional base
//
// Provides:
// - Omnidirectional mixing (body velocity <-> wheel setpoints)
// - The motion controller owning the current command
// - Base board serial protocol and hardware handles

pub mod bus;
mod controller;
mod driver;
pub mod kinematics;

pub use bus::BaseBus;
pub use controller::MotionController;
pub use driver::{BaseBattery, BaseDriver, BaseEncoders, BaseStopButton, BaseWheels};
pub use kinematics::{mix, unmix, Maneuver, VelocityCommand, WheelSpeeds};
