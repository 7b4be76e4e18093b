// Fixed-period control loop
//
// Every tick: poll the emergency stop first, then let the sequencer evaluate
// the active segment. Nothing inside a tick blocks, so the stop button is
// sampled at the loop rate for the whole race, timed turns included.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::RaceConfig;
use crate::course::Course;
use crate::distance::DistanceTracker;
use crate::hal::{self, Actuator, BatteryMonitor, StopButton, StopMode, WheelEncoders};
use crate::messages::{RaceEvent, RaceHealth};
use crate::motor::kinematics::Maneuver;
use crate::motor::{BaseDriver, MotionController};
use crate::safety::{EstopPolicy, SafetyMonitor, SafetyStatus};
use crate::sequencer::{RaceSequencer, RaceState, SequencerSettings, Tick};
use crate::sim::SimBase;
use crate::telemetry::Telemetry;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What to do once the hardware is up
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Run the configured course
    Race,
    /// Hold one maneuver for a number of ticks and report the distance
    Jog {
        maneuver: Maneuver,
        speed: f32,
        ticks: u64,
    },
}

pub struct Runtime<A, E, B> {
    motion: MotionController<A>,
    distance: DistanceTracker<E>,
    safety: SafetyMonitor<B>,
    sequencer: RaceSequencer,
    policy: EstopPolicy,
    now: Tick,
    health: RaceHealth,
}

impl<A: Actuator, E: WheelEncoders, B: StopButton> Runtime<A, E, B> {
    pub fn new(
        course: Course,
        settings: SequencerSettings,
        half_track: f32,
        policy: EstopPolicy,
        actuator: A,
        encoders: E,
        button: B,
    ) -> Self {
        Self {
            motion: MotionController::new(actuator, half_track),
            distance: DistanceTracker::new(encoders),
            safety: SafetyMonitor::new(button),
            sequencer: RaceSequencer::new(course, settings),
            policy,
            now: 0,
            health: RaceHealth::Ready,
        }
    }

    /// Run one control tick and return what happened on it
    pub fn step(&mut self) -> hal::Result<Vec<RaceEvent>> {
        let now = self.now;
        self.now += 1;
        let mut events = Vec::new();

        let status = self.safety.poll(&mut self.motion, &mut self.distance)?;
        if status.is_tripped() {
            if status == SafetyStatus::Pressed {
                events.push(RaceEvent::EmergencyStop {
                    tick: now,
                    segment: self.sequencer.current_segment().map(|s| s.id.clone()),
                });
            }
            if self.policy == EstopPolicy::Halt {
                events.extend(self.sequencer.halt(now, &mut self.motion)?);
            }
            self.health = match self.sequencer.state() {
                RaceState::Halted => RaceHealth::Halted,
                _ => RaceHealth::EmergencyStop,
            };
            return Ok(events);
        }

        events.extend(
            self.sequencer
                .tick(now, &mut self.motion, &mut self.distance)?,
        );
        self.health = self.sequencer.health();
        Ok(events)
    }

    /// Brake and leave the sequencer where it is
    pub fn shutdown(&mut self) -> hal::Result<()> {
        self.motion.stop(StopMode::Brake)
    }

    pub fn health(&self) -> RaceHealth {
        self.health
    }

    pub fn sequencer(&self) -> &RaceSequencer {
        &self.sequencer
    }

    pub fn motion(&self) -> &MotionController<A> {
        &self.motion
    }
}

/// Bring up the hardware named by the config and run `mode`
///
/// In race mode this only returns on a hardware fault, Ctrl-C, or a keyboard quit key.
pub async fn run(config: RaceConfig, mode: Mode) -> Result<(), BoxError> {
    if config.hardware.simulate {
        info!("Using simulated base");
        let sim = SimBase::new();
        let (wheels, encoders, button, battery) = sim.split(config.hardware.keyboard_estop)?;
        if config.hardware.keyboard_estop {
            info!("Keyboard: space = emergency stop, q/Esc/Ctrl-C = quit");
        }
        let quit = || sim.quit_requested();
        dispatch(&config, mode, wheels, encoders, button, battery, quit).await
    } else {
        let mut driver = BaseDriver::open(&config.hardware.port, config.hardware.baudrate)?;
        driver.initialize()?;
        let (wheels, encoders, button, battery) = driver.split();
        dispatch(&config, mode, wheels, encoders, button, battery, || false).await
    }
}

async fn dispatch<A, E, B, V, Q>(
    config: &RaceConfig,
    mode: Mode,
    actuator: A,
    encoders: E,
    button: B,
    mut battery: V,
    quit: Q,
) -> Result<(), BoxError>
where
    A: Actuator,
    E: WheelEncoders,
    B: StopButton,
    V: BatteryMonitor,
    Q: Fn() -> bool,
{
    let volts = battery.voltage()?;
    info!("==================== Battery ====================");
    info!("Voltage: {:.2}V", volts);

    let telemetry = if config.telemetry.enabled {
        Some(Telemetry::open().await?)
    } else {
        None
    };
    if let Some(t) = &telemetry {
        t.publish_event(&RaceEvent::Battery { volts }).await?;
    }

    let runtime = Runtime::new(
        config.build_course()?,
        config.sequencer_settings(),
        config.vehicle.half_track,
        config.safety.estop_policy,
        actuator,
        encoders,
        button,
    );

    match mode {
        Mode::Race => run_race(runtime, config.timing.tick_period(), telemetry, quit).await,
        Mode::Jog {
            maneuver,
            speed,
            ticks,
        } => jog(runtime, config.timing.tick_period(), maneuver, speed, ticks).await,
    }
}

/// Long-running race loop
///
/// Ends on Ctrl-C, or once `quit` reports true (the raw-mode keyboard
/// swallows the signal and reports the key instead).
pub async fn run_race<A, E, B, Q>(
    mut runtime: Runtime<A, E, B>,
    tick_period: Duration,
    telemetry: Option<Telemetry>,
    quit: Q,
) -> Result<(), BoxError>
where
    A: Actuator,
    E: WheelEncoders,
    B: StopButton,
    Q: Fn() -> bool,
{
    let mut tick = interval(tick_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        "Race loop started: {}ms tick, {} segments",
        tick_period.as_millis(),
        runtime.sequencer().course().len()
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                warn!("Interrupted, braking");
                runtime.shutdown()?;
                return Ok(());
            }
        }

        let events = runtime.step()?;
        if quit() {
            warn!("Quit requested, braking");
            runtime.shutdown()?;
            return Ok(());
        }

        if let Some(t) = &telemetry {
            for event in &events {
                t.publish_event(event).await?;
            }
            t.publish_health(runtime.health()).await?;
        }
    }
}

/// Calibration helper: hold a maneuver, then brake and report the distance
///
/// The stop button is honoured every tick and ends the run early.
pub async fn jog<A, E, B>(
    mut runtime: Runtime<A, E, B>,
    tick_period: Duration,
    maneuver: Maneuver,
    speed: f32,
    ticks: u64,
) -> Result<(), BoxError>
where
    A: Actuator,
    E: WheelEncoders,
    B: StopButton,
{
    let mut tick = interval(tick_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    runtime.distance.reset()?;
    runtime.motion.apply(maneuver, speed)?;
    info!("Jog {:?} at {:.2} for {} ticks", maneuver, speed, ticks);

    let mut held = 0;
    while held < ticks {
        tick.tick().await;
        let status = runtime
            .safety
            .poll(&mut runtime.motion, &mut runtime.distance)?;
        if status.is_tripped() {
            warn!("Jog aborted by emergency stop after {} ticks", held);
            return Ok(());
        }
        runtime.distance.read()?;
        held += 1;
    }

    runtime.motion.stop(StopMode::Brake)?;
    let velocity = runtime.motion.get_velocity()?;
    info!(
        "Jog complete: {:.0} pulses in {} ticks ({:.2}s), measured {:?}",
        runtime.distance.last(),
        held,
        (tick_period * held as u32).as_secs_f64(),
        velocity
    );
    Ok(())
}
