// Hardware handles for the serial base board
//
// One serial bus serves the wheels, encoders, stop button and battery sense.
// The control loop is single threaded, so the handles share the bus through
// `Rc<RefCell<_>>` and each implements one of the `hal` traits.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{info, warn};

use super::bus::BaseBus;
use super::kinematics::WheelSpeeds;
use crate::hal::{
    Actuator, BatteryMonitor, ButtonState, HalError, Result, StopButton, StopMode, WheelCounts,
    WheelEncoders,
};

type SharedBus = Rc<RefCell<BaseBus>>;

/// Connection to the base board, before it is split into per-concern handles
pub struct BaseDriver {
    bus: SharedBus,
}

impl BaseDriver {
    /// Connect to the board on the specified serial port
    pub fn open(port: &str, baudrate: u32) -> Result<Self> {
        info!("Opening base board on {} @ {}", port, baudrate);
        let bus = BaseBus::open(port, baudrate)?;
        Ok(Self {
            bus: Rc::new(RefCell::new(bus)),
        })
    }

    /// Check the board answers, then leave it stopped with zeroed encoders
    pub fn initialize(&mut self) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        if !bus.ping()? {
            warn!("Base board not responding to ping");
            return Err(HalError::Timeout {
                id: super::bus::BOARD_ID,
            });
        }
        bus.stop(StopMode::Coast)?;
        bus.reset_encoders()?;
        info!("Base board initialized");
        Ok(())
    }

    pub fn split(self) -> (BaseWheels, BaseEncoders, BaseStopButton, BaseBattery) {
        (
            BaseWheels {
                bus: Rc::clone(&self.bus),
            },
            BaseEncoders {
                bus: Rc::clone(&self.bus),
            },
            BaseStopButton {
                bus: Rc::clone(&self.bus),
            },
            BaseBattery { bus: self.bus },
        )
    }
}

pub struct BaseWheels {
    bus: SharedBus,
}

impl Actuator for BaseWheels {
    fn set_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        self.bus.borrow_mut().set_wheel_speeds(speeds)
    }

    fn stop(&mut self, mode: StopMode) -> Result<()> {
        self.bus.borrow_mut().stop(mode)
    }

    fn read_wheel_speeds(&mut self) -> Result<WheelSpeeds> {
        self.bus.borrow_mut().read_wheel_speeds()
    }
}

impl Drop for BaseWheels {
    fn drop(&mut self) {
        // Leave the vehicle braked whatever path the runtime exits on
        if let Err(e) = self.stop(StopMode::Brake) {
            warn!("Failed to stop wheels on drop: {}", e);
        }
    }
}

pub struct BaseEncoders {
    bus: SharedBus,
}

impl WheelEncoders for BaseEncoders {
    fn read_counts(&mut self) -> Result<WheelCounts> {
        self.bus.borrow_mut().read_encoders()
    }

    fn reset_counts(&mut self) -> Result<()> {
        self.bus.borrow_mut().reset_encoders()
    }
}

pub struct BaseStopButton {
    bus: SharedBus,
}

impl StopButton for BaseStopButton {
    fn read(&mut self) -> Result<ButtonState> {
        Ok(if self.bus.borrow_mut().read_stop_button()? {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        })
    }
}

pub struct BaseBattery {
    bus: SharedBus,
}

impl BatteryMonitor for BaseBattery {
    fn voltage(&mut self) -> Result<f32> {
        self.bus.borrow_mut().read_battery()
    }
}
