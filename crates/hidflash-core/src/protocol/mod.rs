//! Protocol module - HID bootloader wire format.

pub mod constants;
pub mod frame;

pub use constants::*;
pub use frame::{FrameError, Opcode, OutboundFrame, StatusFrame};
