//! Flow-control delays.
//!
//! The bootloader has no handshake for most phases, so the host paces itself
//! with fixed pauses. All of them live here so they can be tuned from the
//! config file and replaced with a recording [`Delay`] in tests.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named delays observed by the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Pause before retrying a write that sent nothing (flash busy).
    pub write_backoff_ms: u64,
    /// Pause between enumeration passes.
    pub discovery_interval_ms: u64,
    /// Pause after opening the device.
    pub device_settle_ms: u64,
    /// Erase-completion window after RESET_PAGES.
    pub erase_settle_ms: u64,
    /// Pause before the first data frame.
    pub flash_start_ms: u64,
    /// Gap between data frames.
    pub chunk_interval_us: u64,
    /// Gap between status polls.
    pub commit_poll_interval_us: u64,
    /// How long a single status read may block.
    pub read_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            write_backoff_ms: 100,
            discovery_interval_ms: 1000,
            device_settle_ms: 2000,
            erase_settle_ms: 2000,
            flash_start_ms: 1000,
            chunk_interval_us: 500,
            commit_poll_interval_us: 500,
            read_timeout_ms: 100,
        }
    }
}

impl Timings {
    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn device_settle(&self) -> Duration {
        Duration::from_millis(self.device_settle_ms)
    }

    pub fn erase_settle(&self) -> Duration {
        Duration::from_millis(self.erase_settle_ms)
    }

    pub fn flash_start(&self) -> Duration {
        Duration::from_millis(self.flash_start_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_micros(self.chunk_interval_us)
    }

    pub fn commit_poll_interval(&self) -> Duration {
        Duration::from_micros(self.commit_poll_interval_us)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Source of blocking pauses.
pub trait Delay {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Records requested pauses without sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    log: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// All pauses requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of pauses equal to `duration`.
    pub fn count(&self, duration: Duration) -> usize {
        self.recorded().iter().filter(|&&d| d == duration).count()
    }

    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut log) = self.log.lock() {
            log.push(duration);
        }
    }
}

impl<D: Delay + ?Sized> Delay for &D {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
