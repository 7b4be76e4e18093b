// Recording fakes for the hal traits
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use omni_race_runtime::course::{Course, SegmentSpec};
use omni_race_runtime::hal::{
    Actuator, ButtonState, Result, StopButton, StopMode, WheelCounts, WheelEncoders,
};
use omni_race_runtime::motor::WheelSpeeds;
use omni_race_runtime::runtime::Runtime;
use omni_race_runtime::safety::EstopPolicy;
use omni_race_runtime::sequencer::SequencerSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    SetWheels(WheelSpeeds),
    Stop(StopMode),
    ReadDistance(i64),
    ResetDistance,
}

pub type Log = Rc<RefCell<Vec<Call>>>;

pub struct FakeWheels {
    pub log: Log,
}

impl Actuator for FakeWheels {
    fn set_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        self.log.borrow_mut().push(Call::SetWheels(speeds));
        Ok(())
    }

    fn stop(&mut self, mode: StopMode) -> Result<()> {
        self.log.borrow_mut().push(Call::Stop(mode));
        Ok(())
    }

    fn read_wheel_speeds(&mut self) -> Result<WheelSpeeds> {
        Ok(WheelSpeeds::zero())
    }
}

/// Every wheel advances `step` pulses per sample
pub struct RampEncoders {
    pub log: Log,
    pub step: i64,
    count: i64,
}

impl WheelEncoders for RampEncoders {
    fn read_counts(&mut self) -> Result<WheelCounts> {
        self.count += self.step;
        self.log.borrow_mut().push(Call::ReadDistance(self.count));
        Ok(WheelCounts::uniform(self.count))
    }

    fn reset_counts(&mut self) -> Result<()> {
        self.count = 0;
        self.log.borrow_mut().push(Call::ResetDistance);
        Ok(())
    }
}

pub struct FakeButton {
    pub pressed: Rc<Cell<bool>>,
}

impl StopButton for FakeButton {
    fn read(&mut self) -> Result<ButtonState> {
        Ok(if self.pressed.get() {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        })
    }
}

pub struct Harness {
    pub runtime: Runtime<FakeWheels, RampEncoders, FakeButton>,
    pub log: Log,
    pub button: Rc<Cell<bool>>,
}

impl Harness {
    pub fn new(segments: Vec<SegmentSpec>, settings: SequencerSettings, step: i64) -> Self {
        Self::with_policy(segments, settings, step, EstopPolicy::Resume)
    }

    pub fn with_policy(
        segments: Vec<SegmentSpec>,
        settings: SequencerSettings,
        step: i64,
        policy: EstopPolicy,
    ) -> Self {
        let log: Log = Rc::default();
        let button = Rc::new(Cell::new(false));
        let runtime = Runtime::new(
            Course::new(segments).expect("valid course"),
            settings,
            0.0875,
            policy,
            FakeWheels { log: log.clone() },
            RampEncoders {
                log: log.clone(),
                step,
                count: 0,
            },
            FakeButton {
                pressed: button.clone(),
            },
        );
        Self {
            runtime,
            log,
            button,
        }
    }

    pub fn take_log(&self) -> Vec<Call> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

pub fn settings(settle_ticks: u64, start_settle_ticks: u64) -> SequencerSettings {
    SequencerSettings {
        tick_period: Duration::from_millis(10),
        settle_ticks,
        start_settle_ticks,
    }
}
