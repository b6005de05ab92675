//! Feetech STS3215 servo bus over serial (USB).
//!
//! Implements the Feetech serial protocol for single-servo register reads and
//! writes. Every instruction is answered by a status packet which is checked
//! before the value is trusted.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::time::Duration;

use crate::bus::{MotorBus, Register};
use crate::calibration::CalibrationTable;
use crate::error::{Error, Result};
use crate::roster::{Joint, Roster};

// Feetech protocol constants
const HEADER: [u8; 2] = [0xFF, 0xFF];
const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;

/// Status packet overhead: header(2) + id + length + error + checksum.
const STATUS_OVERHEAD: usize = 6;

pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Hardware interface for a chain of Feetech STS3215 servos.
pub struct FeetechBus {
    port: Box<dyn serialport::SerialPort>,
    calibration: Option<CalibrationTable>,
}

impl FeetechBus {
    /// Open the serial port. `calibration` is only needed for normalized I/O.
    pub fn open(
        serial_port: &str,
        baud_rate: u32,
        calibration: Option<CalibrationTable>,
    ) -> Result<Self> {
        let port = serialport::new(serial_port, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        tracing::info!(
            port = serial_port,
            baud_rate,
            calibrated = calibration.is_some(),
            "Feetech bus connected"
        );

        Ok(Self { port, calibration })
    }

    /// Compare the homing offset and position limits stored in each servo
    /// with the loaded calibration. Returns the names of joints that differ.
    pub fn verify_calibration(&mut self, roster: &Roster) -> Result<Vec<String>> {
        let Some(table) = self.calibration.clone() else {
            return Ok(Vec::new());
        };

        let mut mismatched = Vec::new();
        for joint in roster {
            let Some(cal) = table.get(&joint.name) else {
                continue;
            };
            let stored = (
                self.read_raw(Register::HomingOffset, joint)?,
                self.read_raw(Register::MinPositionLimit, joint)?,
                self.read_raw(Register::MaxPositionLimit, joint)?,
            );
            let expected = (cal.homing_offset, cal.range_min, cal.range_max);
            if stored != expected {
                tracing::warn!(
                    joint = %joint.name,
                    ?stored,
                    ?expected,
                    "Servo calibration differs from calibration file (homing_offset, min, max)"
                );
                mismatched.push(joint.name.clone());
            }
        }
        Ok(mismatched)
    }

    /// Send one instruction and read back its status packet payload.
    fn transact(&mut self, id: u8, instruction: u8, params: &[u8], reply_len: usize) -> Result<Vec<u8>> {
        let packet = build_packet(id, instruction, params);

        self.port.clear(serialport::ClearBuffer::Input)?;
        self.port.write_all(&packet)?;
        self.port.flush()?;

        let mut buf = vec![0u8; STATUS_OVERHEAD + reply_len];
        self.port.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                Error::NoResponse { id }
            } else {
                Error::Transport(e)
            }
        })?;

        let (status, data) = parse_status(id, &buf, reply_len)?;
        if status != 0 {
            tracing::warn!(id, status, "Servo reported an error status");
        }
        Ok(data.to_vec())
    }
}

impl MotorBus for FeetechBus {
    fn read_raw(&mut self, register: Register, joint: &Joint) -> Result<i32> {
        let size = register.size();
        let data = self.transact(joint.id, INST_READ, &[register.address(), size], size as usize)?;

        let mut rdr = Cursor::new(data);
        let raw = match size {
            1 => rdr.read_u8()? as u32,
            _ => rdr.read_u16::<LittleEndian>()? as u32,
        };
        Ok(register.decode(raw))
    }

    fn write_raw(&mut self, register: Register, joint: &Joint, value: i32) -> Result<()> {
        let encoded = register.encode(value);
        let mut params = Vec::with_capacity(1 + register.size() as usize);
        params.push(register.address());
        match register.size() {
            1 => params.write_u8(encoded as u8)?,
            _ => params.write_u16::<LittleEndian>(encoded as u16)?,
        }

        self.transact(joint.id, INST_WRITE, &params, 0)?;
        tracing::trace!(joint = %joint.name, register = %register, value, "Register written");
        Ok(())
    }

    fn calibration(&self) -> Option<&CalibrationTable> {
        self.calibration.as_ref()
    }
}

/// Frame an instruction packet: header, id, length, instruction, params, checksum.
fn build_packet(id: u8, instruction: u8, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8;
    let mut packet = Vec::with_capacity(6 + params.len());
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instruction);
    packet.extend_from_slice(params);

    let checksum = compute_checksum(&packet[2..]);
    packet.push(checksum);
    packet
}

/// Validate a status packet and split it into (error byte, data).
fn parse_status(id: u8, buf: &[u8], data_len: usize) -> Result<(u8, &[u8])> {
    let bad = |reason: String| Error::Protocol { id, reason };

    if buf.len() != STATUS_OVERHEAD + data_len {
        return Err(bad(format!("expected {} bytes, got {}", STATUS_OVERHEAD + data_len, buf.len())));
    }
    if buf[..2] != HEADER {
        return Err(bad(format!("bad header {:02x?}", &buf[..2])));
    }
    if buf[2] != id {
        return Err(bad(format!("reply from servo {}", buf[2])));
    }
    if buf[3] as usize != data_len + 2 {
        return Err(bad(format!("length byte {} for {} data bytes", buf[3], data_len)));
    }
    let last = buf.len() - 1;
    let checksum = compute_checksum(&buf[2..last]);
    if buf[last] != checksum {
        return Err(bad(format!("checksum {:#04x}, expected {:#04x}", buf[last], checksum)));
    }

    Ok((buf[4], &buf[5..last]))
}

/// Compute Feetech checksum: ~(sum of bytes) & 0xFF.
fn compute_checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    !(sum as u8)
}
