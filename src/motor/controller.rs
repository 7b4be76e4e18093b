// Motion controller
//
// Owns the wheel setpoints and the last issued command. Every command goes
// through the kinematic mix before it reaches the actuator.

use tracing::{debug, trace};

use super::kinematics::{mix, unmix, Maneuver, VelocityCommand, WheelSpeeds, HALF_TRACK};
use crate::hal::{Actuator, Result, StopMode};

pub struct MotionController<A> {
    actuator: A,
    half_track: f32,
    command: VelocityCommand,
    setpoints: WheelSpeeds,
    stopped: bool,
}

impl<A: Actuator> MotionController<A> {
    pub fn new(actuator: A, half_track: f32) -> Self {
        Self {
            actuator,
            half_track,
            command: VelocityCommand::ZERO,
            setpoints: WheelSpeeds::zero(),
            stopped: true,
        }
    }

    pub fn with_default_geometry(actuator: A) -> Self {
        Self::new(actuator, HALF_TRACK)
    }

    /// Command a body velocity
    ///
    /// # Arguments
    /// * `forward` - [-1.0, 1.0], positive = forward
    /// * `lateral` - [-1.0, 1.0]
    /// * `angular` - [-5.0, 5.0], positive = counter-clockwise
    ///
    /// Ranges are the caller's responsibility.
    pub fn set_velocity(
        &mut self,
        forward: f32,
        lateral: f32,
        angular: f32,
    ) -> Result<WheelSpeeds> {
        self.issue(VelocityCommand::new(forward, lateral, angular))
    }

    /// Replace the current command and forward the mixed setpoints
    pub fn issue(&mut self, cmd: VelocityCommand) -> Result<WheelSpeeds> {
        let speeds = mix(cmd, self.half_track);
        self.command = cmd;
        self.setpoints = speeds;
        self.stopped = false;
        trace!(?cmd, ?speeds, "issue velocity");
        self.actuator.set_wheel_speeds(speeds)?;
        Ok(speeds)
    }

    /// Zero all setpoints. Internal state is cleared even if the actuator fails.
    pub fn stop(&mut self, mode: StopMode) -> Result<()> {
        self.command = VelocityCommand::ZERO;
        self.setpoints = WheelSpeeds::zero();
        self.stopped = true;
        debug!(?mode, "stop");
        self.actuator.stop(mode)
    }

    /// Body velocity estimated from measured wheel speeds
    pub fn get_velocity(&mut self) -> Result<VelocityCommand> {
        let measured = self.actuator.read_wheel_speeds()?;
        Ok(unmix(measured, self.half_track))
    }

    /// Run one of the preset maneuvers
    pub fn apply(&mut self, maneuver: Maneuver, speed: f32) -> Result<()> {
        match maneuver {
            Maneuver::Stop => self.stop(StopMode::Coast),
            Maneuver::Brake => self.stop(StopMode::Brake),
            _ => match maneuver.command(speed) {
                Some(cmd) => self.issue(cmd).map(|_| ()),
                None => self.stop(StopMode::Coast),
            },
        }
    }

    /// Last issued command (zero after a stop)
    pub fn command(&self) -> VelocityCommand {
        self.command
    }

    pub fn setpoints(&self) -> WheelSpeeds {
        self.setpoints
    }

    /// True when the last thing sent to the actuator was a stop
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn half_track(&self) -> f32 {
        self.half_track
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}
