//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to render progress without the
//! transfer engine knowing how it is displayed.

use std::fmt;

use crate::state::FlashPhase;

/// Events emitted by a flash session.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// Device search started.
    SearchStarted { vid: u16, pid: u16 },
    /// One enumeration pass finished, matching or not.
    DiscoveryAttempt { attempt: u32, max_attempts: u32 },
    /// Bootloader found and opened.
    DeviceFound { vid: u16, pid: u16, release: u16 },
    /// Phase changed.
    PhaseChanged { from: FlashPhase, to: FlashPhase },
    /// A sector is about to be sent.
    SectorStarted { index: usize },
    /// All frames of a sector were sent; `total_bytes` is the running count.
    SectorWritten { index: usize, total_bytes: usize },
    /// Device acknowledged the sector.
    SectorCommitted { index: usize, polls: u32 },
    /// Reboot command could not be delivered. The image is already written.
    RebootFailed { message: String },
    /// HID report sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// Session finished successfully.
    Complete { total_bytes: usize },
    /// Session aborted.
    Failed { message: String },
}

/// HID report direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving flash events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait FlashObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &FlashEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FlashObserver for NullObserver {
    fn on_event(&self, _event: &FlashEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::SearchStarted { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Searching for device");
            }
            FlashEvent::DiscoveryAttempt {
                attempt,
                max_attempts,
            } => {
                tracing::debug!(attempt, max_attempts, "Enumeration pass");
            }
            FlashEvent::DeviceFound { vid, pid, release } => {
                tracing::info!(
                    vid = %format!("{:04X}", vid),
                    pid = %format!("{:04X}", pid),
                    release = %format!("{:04X}", release),
                    "Device found"
                );
            }
            FlashEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            FlashEvent::SectorStarted { index } => {
                tracing::debug!(sector = index, "Sending sector");
            }
            FlashEvent::SectorWritten { index, total_bytes } => {
                tracing::info!(sector = index, total_bytes, "Sector sent");
            }
            FlashEvent::SectorCommitted { index, polls } => {
                tracing::debug!(sector = index, polls, "Sector committed");
            }
            FlashEvent::RebootFailed { message } => {
                tracing::warn!("Reboot command failed: {}", message);
            }
            FlashEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "HID report");
            }
            FlashEvent::Complete { total_bytes } => {
                tracing::info!(total_bytes, "Flashing complete");
            }
            FlashEvent::Failed { message } => {
                tracing::error!("Flashing failed: {}", message);
            }
        }
    }
}
