// Base board serial protocol
//
// The drive board runs the wheel PID loops and counts encoder pulses. The host
// talks to it with short framed packets:
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Responses:     [0xFF, 0xFF, ID, Length, Status, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::kinematics::WheelSpeeds;
use crate::hal::{HalError, Result, StopMode, WheelCounts};

/// Default serial configuration for the base board
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Board address on the bus
pub const BOARD_ID: u8 = 0x01;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Wheel setpoints travel as signed thousandths
const SPEED_SCALE: f32 = 1000.0;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    SetWheelSpeeds = 0x10,
    Stop = 0x11,
    ReadWheelSpeeds = 0x12,
    ReadEncoders = 0x20,
    ResetEncoders = 0x21,
    ReadStopButton = 0x30,
    ReadBattery = 0x31,
}

/// Base board bus - handles serial communication with the drive board
pub struct BaseBus {
    port: Box<dyn SerialPort>,
    id: u8,
}

impl BaseBus {
    /// Open a connection to the board
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port, id: BOARD_ID })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet and return its parameters
    fn read_response(&mut self) -> Result<Vec<u8>> {
        let id = self.id;
        let mut header = [0u8; 2];
        self.port
            .read_exact(&mut header)
            .map_err(|e| read_error(id, e))?;

        if header != HEADER {
            return Err(HalError::InvalidResponse {
                id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port
            .read_exact(&mut id_length)
            .map_err(|e| read_error(id, e))?;
        let length = id_length[1] as usize;

        if id_length[0] != id {
            return Err(HalError::InvalidResponse {
                id,
                reason: format!("ID mismatch: expected {}, got {}", id, id_length[0]),
            });
        }
        if length < 2 {
            return Err(HalError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // status + params + checksum
        let mut remaining = vec![0u8; length];
        self.port
            .read_exact(&mut remaining)
            .map_err(|e| read_error(id, e))?;

        parse_response(id, length as u8, &remaining)
    }

    /// Send one instruction and wait for its status packet
    fn transact(&mut self, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(self.id, instruction, params);
        self.send_packet(&packet)?;
        self.read_response()
    }

    /// Ping the board to check it is connected
    pub fn ping(&mut self) -> Result<bool> {
        match self.transact(Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(HalError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn set_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        let params = encode_speeds(speeds);
        debug!("Set wheel speeds: {:?}", speeds);
        self.transact(Instruction::SetWheelSpeeds, &params)?;
        Ok(())
    }

    pub fn stop(&mut self, mode: StopMode) -> Result<()> {
        let brake = match mode {
            StopMode::Coast => 0,
            StopMode::Brake => 1,
        };
        self.transact(Instruction::Stop, &[brake])?;
        Ok(())
    }

    pub fn read_wheel_speeds(&mut self) -> Result<WheelSpeeds> {
        let response = self.transact(Instruction::ReadWheelSpeeds, &[])?;
        let raw = expect_len(self.id, &response, 8)?;
        Ok(decode_speeds(raw))
    }

    pub fn read_encoders(&mut self) -> Result<WheelCounts> {
        let response = self.transact(Instruction::ReadEncoders, &[])?;
        let raw = expect_len(self.id, &response, 16)?;
        Ok(decode_counts(raw))
    }

    pub fn reset_encoders(&mut self) -> Result<()> {
        self.transact(Instruction::ResetEncoders, &[])?;
        Ok(())
    }

    /// True while the operator stop button is held
    pub fn read_stop_button(&mut self) -> Result<bool> {
        let response = self.transact(Instruction::ReadStopButton, &[])?;
        let raw = expect_len(self.id, &response, 1)?;
        Ok(raw[0] != 0)
    }

    /// Battery voltage in volts
    pub fn read_battery(&mut self) -> Result<f32> {
        let response = self.transact(Instruction::ReadBattery, &[])?;
        let raw = expect_len(self.id, &response, 2)?;
        let millivolts = u16::from_le_bytes([raw[0], raw[1]]);
        Ok(millivolts as f32 / 1000.0)
    }
}

/// Verify checksum and status of `remaining` = [status, params..., checksum]
fn parse_response(id: u8, length: u8, remaining: &[u8]) -> Result<Vec<u8>> {
    let (&received_checksum, body) = remaining
        .split_last()
        .ok_or_else(|| HalError::InvalidResponse {
            id,
            reason: "Empty response".to_string(),
        })?;

    let mut checksum_data = vec![id, length];
    checksum_data.extend_from_slice(body);
    if BaseBus::checksum(&checksum_data) != received_checksum {
        return Err(HalError::ChecksumMismatch { id });
    }

    let (&status, params) = body.split_first().ok_or_else(|| HalError::InvalidResponse {
        id,
        reason: "Missing status byte".to_string(),
    })?;
    if status != 0 {
        return Err(HalError::DeviceError { id, status });
    }

    Ok(params.to_vec())
}

/// Timeouts on any part of a reply mean the board did not answer in time
fn read_error(id: u8, e: std::io::Error) -> HalError {
    if e.kind() == std::io::ErrorKind::TimedOut {
        HalError::Timeout { id }
    } else {
        HalError::Io(e)
    }
}

fn expect_len(id: u8, response: &[u8], len: usize) -> Result<&[u8]> {
    if response.len() < len {
        return Err(HalError::InvalidResponse {
            id,
            reason: format!("Expected {} bytes, got {}", len, response.len()),
        });
    }
    Ok(&response[..len])
}

/// Scale a setpoint to thousandths, clamped to the signed 16-bit range
fn speed_to_raw(speed: f32) -> i16 {
    let scaled = (speed * SPEED_SCALE).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn encode_speeds(speeds: WheelSpeeds) -> Vec<u8> {
    speeds
        .as_array()
        .iter()
        .flat_map(|&s| speed_to_raw(s).to_le_bytes())
        .collect()
}

fn decode_speeds(raw: &[u8]) -> WheelSpeeds {
    let mut out = [0.0f32; 4];
    for (slot, chunk) in out.iter_mut().zip(raw.chunks_exact(2)) {
        *slot = i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / SPEED_SCALE;
    }
    WheelSpeeds::new(out[0], out[1], out[2], out[3])
}

fn decode_counts(raw: &[u8]) -> WheelCounts {
    let mut out = [0i64; 4];
    for (slot, chunk) in out.iter_mut().zip(raw.chunks_exact(4)) {
        *slot = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64;
    }
    WheelCounts::new(out[0], out[1], out[2], out[3])
}
