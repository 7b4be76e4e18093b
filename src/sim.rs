// Simulated base for running the race without hardware.
//
// Wheels follow their setpoints instantly. Each encoder sample advances every
// wheel by one tick's worth of travel, so distance-gated segments finish in a
// predictable number of ticks. The stop button can be scripted or, for
// interactive runs, mapped to the space bar with q, Esc or Ctrl-C as quit.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::warn;

use crate::hal::{
    Actuator, BatteryMonitor, ButtonState, Result, StopButton, StopMode, WheelCounts,
    WheelEncoders,
};
use crate::motor::kinematics::WheelSpeeds;

/// Encoder pulses per tick at a wheel setpoint of 1.0
pub const PULSES_PER_TICK: f64 = 1000.0;

/// Nominal pack voltage reported by the simulator
pub const SIM_BATTERY_VOLTS: f32 = 12.6;

#[derive(Debug, Default)]
struct SimState {
    setpoints: WheelSpeeds,
    counts: [f64; 4],
    last_stop: Option<StopMode>,
    stop_pressed: bool,
    quit_requested: bool,
    samples: u64,
}

/// Shared simulated vehicle
#[derive(Debug, Clone, Default)]
pub struct SimBase {
    state: Rc<RefCell<SimState>>,
}

impl SimBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split into hal handles; `keyboard` maps the space bar to the stop button
    pub fn split(
        &self,
        keyboard: bool,
    ) -> Result<(SimWheels, SimEncoders, SimStopButton, SimBattery)> {
        let keyboard = if keyboard {
            Some(KeyboardGuard::enable()?)
        } else {
            None
        };
        Ok((
            SimWheels {
                state: Rc::clone(&self.state),
            },
            SimEncoders {
                state: Rc::clone(&self.state),
            },
            SimStopButton {
                state: Rc::clone(&self.state),
                keyboard,
            },
            SimBattery,
        ))
    }

    /// Hold or release the simulated stop button
    pub fn set_stop_pressed(&self, pressed: bool) {
        self.state.borrow_mut().stop_pressed = pressed;
    }

    /// Ask the race loop to brake and exit
    pub fn request_quit(&self) {
        self.state.borrow_mut().quit_requested = true;
    }

    /// Set once a quit key (Ctrl-C, q, Esc) was seen
    pub fn quit_requested(&self) -> bool {
        self.state.borrow().quit_requested
    }

    pub fn setpoints(&self) -> WheelSpeeds {
        self.state.borrow().setpoints
    }

    pub fn last_stop(&self) -> Option<StopMode> {
        self.state.borrow().last_stop
    }

    /// Number of encoder samples taken so far
    pub fn samples(&self) -> u64 {
        self.state.borrow().samples
    }
}

pub struct SimWheels {
    state: Rc<RefCell<SimState>>,
}

impl Actuator for SimWheels {
    fn set_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.setpoints = speeds;
        state.last_stop = None;
        Ok(())
    }

    fn stop(&mut self, mode: StopMode) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.setpoints = WheelSpeeds::zero();
        state.last_stop = Some(mode);
        Ok(())
    }

    fn read_wheel_speeds(&mut self) -> Result<WheelSpeeds> {
        Ok(self.state.borrow().setpoints)
    }
}

pub struct SimEncoders {
    state: Rc<RefCell<SimState>>,
}

impl WheelEncoders for SimEncoders {
    fn read_counts(&mut self) -> Result<WheelCounts> {
        let mut state = self.state.borrow_mut();
        let speeds = state.setpoints.as_array();
        for (count, speed) in state.counts.iter_mut().zip(speeds) {
            *count += speed as f64 * PULSES_PER_TICK;
        }
        state.samples += 1;

        let c = state.counts.map(|c| c.round() as i64);
        Ok(WheelCounts::new(c[0], c[1], c[2], c[3]))
    }

    fn reset_counts(&mut self) -> Result<()> {
        self.state.borrow_mut().counts = [0.0; 4];
        Ok(())
    }
}

pub struct SimStopButton {
    state: Rc<RefCell<SimState>>,
    keyboard: Option<KeyboardGuard>,
}

impl StopButton for SimStopButton {
    fn read(&mut self) -> Result<ButtonState> {
        let keys = match &self.keyboard {
            Some(keyboard) => keyboard.drain()?,
            None => Keys::default(),
        };
        let mut state = self.state.borrow_mut();
        state.quit_requested |= keys.quit;
        Ok(if keys.stop || state.stop_pressed {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        })
    }
}

pub struct SimBattery;

impl BatteryMonitor for SimBattery {
    fn voltage(&mut self) -> Result<f32> {
        Ok(SIM_BATTERY_VOLTS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum KeyAction {
    Stop,
    Quit,
}

/// Space is the stop button. Raw mode swallows SIGINT, so Ctrl-C is a key here
fn key_action(key: KeyEvent) -> Option<KeyAction> {
    let down = key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat;
    if !down {
        return None;
    }
    match key.code {
        KeyCode::Char(' ') => Some(KeyAction::Stop),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Keys {
    stop: bool,
    quit: bool,
}

/// Raw terminal mode for the lifetime of the simulated stop button
struct KeyboardGuard;

impl KeyboardGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }

    /// Drain pending key events
    fn drain(&self) -> Result<Keys> {
        let mut keys = Keys::default();
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                match key_action(key) {
                    Some(KeyAction::Stop) => keys.stop = true,
                    Some(KeyAction::Quit) => keys.quit = true,
                    None => {}
                }
            }
        }
        Ok(keys)
    }
}

impl Drop for KeyboardGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoders_follow_setpoints() {
        let sim = SimBase::new();
        let (mut wheels, mut encoders, _, _) = sim.split(false).unwrap();

        wheels
            .set_wheel_speeds(WheelSpeeds::new(0.5, 0.5, -0.25, 1.0))
            .unwrap();
        encoders.read_counts().unwrap();
        let counts = encoders.read_counts().unwrap();
        assert_eq!(counts, WheelCounts::new(1000, 1000, -500, 2000));

        encoders.reset_counts().unwrap();
        wheels.stop(StopMode::Coast).unwrap();
        assert_eq!(encoders.read_counts().unwrap(), WheelCounts::default());
        assert_eq!(sim.last_stop(), Some(StopMode::Coast));
        assert_eq!(sim.samples(), 3);
    }

    #[test]
    fn test_scripted_stop_button() {
        let sim = SimBase::new();
        let (_, _, mut button, mut battery) = sim.split(false).unwrap();
        assert_eq!(button.read().unwrap(), ButtonState::Released);
        sim.set_stop_pressed(true);
        assert_eq!(button.read().unwrap(), ButtonState::Pressed);
        assert_eq!(battery.voltage().unwrap(), SIM_BATTERY_VOLTS);
    }

    #[test]
    fn test_key_mapping() {
        let press = |code, modifiers| key_action(KeyEvent::new(code, modifiers));

        assert_eq!(
            press(KeyCode::Char(' '), KeyModifiers::NONE),
            Some(KeyAction::Stop)
        );
        assert_eq!(
            press(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(KeyAction::Quit)
        );
        assert_eq!(
            press(KeyCode::Char('q'), KeyModifiers::NONE),
            Some(KeyAction::Quit)
        );
        assert_eq!(press(KeyCode::Esc, KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(press(KeyCode::Char('c'), KeyModifiers::NONE), None);

        let mut release = KeyEvent::new(KeyCode::Char(' '), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(key_action(release), None);
    }

    #[test]
    fn test_quit_request_is_shared() {
        let sim = SimBase::new();
        let (_, _, mut button, _) = sim.split(false).unwrap();
        assert!(!sim.quit_requested());
        sim.request_quit();
        assert_eq!(button.read().unwrap(), ButtonState::Released);
        assert!(sim.quit_requested());
    }
}
