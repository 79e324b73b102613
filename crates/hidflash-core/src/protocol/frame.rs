//! Fixed-size HID report frames.
//!
//! Outbound frames are always `TX_FRAME_SIZE` bytes:
//!
//! ```text
//! [0x00][ 'B' 'T' 'L' 'D' 'C' 'M' 'D' op ][ 0 ... ]   command
//! [0x00][ up to 64 bytes of firmware, zero padded ]    data
//! ```
//!
//! Inbound status reports are `RX_FRAME_SIZE` bytes; only the commit status
//! byte is interpreted.

use std::fmt;

use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload too large: {len} bytes, maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Bootloader command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Erase the application flash area.
    ResetPages = 0x00,
    /// Leave the bootloader and start the application.
    RebootMcu = 0x01,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::ResetPages => write!(f, "RESET_PAGES"),
            Opcode::RebootMcu => write!(f, "REBOOT_MCU"),
        }
    }
}

/// Outbound report, report selector included.
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundFrame([u8; TX_FRAME_SIZE]);

impl OutboundFrame {
    fn zeroed() -> Self {
        let mut buf = [0u8; TX_FRAME_SIZE];
        buf[REPORT_ID_OFFSET] = REPORT_ID;
        Self(buf)
    }

    /// Build a command frame carrying the signature and `opcode`.
    pub fn command(opcode: Opcode) -> Self {
        let mut frame = Self::zeroed();
        frame.0[PAYLOAD_OFFSET..OPCODE_OFFSET].copy_from_slice(&COMMAND_SIGNATURE);
        frame.0[OPCODE_OFFSET] = opcode as u8;
        frame
    }

    /// Build a data frame from at most `TX_PAYLOAD_SIZE` bytes of firmware.
    pub fn data(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > TX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: TX_PAYLOAD_SIZE,
            });
        }
        let mut frame = Self::zeroed();
        frame.0[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
        Ok(frame)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        TX_FRAME_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether this frame starts with the command signature.
    pub fn is_command(&self) -> bool {
        self.0[PAYLOAD_OFFSET..OPCODE_OFFSET] == COMMAND_SIGNATURE
    }
}

impl AsRef<[u8]> for OutboundFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_command() {
            write!(f, "OutboundFrame(command 0x{:02X})", self.0[OPCODE_OFFSET])
        } else {
            write!(f, "OutboundFrame(data {:02X?})", &self.0[PAYLOAD_OFFSET..])
        }
    }
}

/// Inbound status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFrame([u8; RX_FRAME_SIZE]);

impl StatusFrame {
    pub fn new(bytes: [u8; RX_FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from a raw report. Short reports are zero-filled, extra bytes dropped.
    pub fn from_report(report: &[u8]) -> Self {
        let mut buf = [0u8; RX_FRAME_SIZE];
        let n = report.len().min(RX_FRAME_SIZE);
        buf[..n].copy_from_slice(&report[..n]);
        Self(buf)
    }

    pub fn commit_status(&self) -> u8 {
        self.0[COMMIT_STATUS_OFFSET]
    }

    /// True once the device has written the last sector to flash.
    pub fn is_sector_committed(&self) -> bool {
        self.commit_status() == STATUS_SECTOR_COMMITTED
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
