//! HidFlash-Core: firmware transfer for USB-HID bootloaders.
//!
//! This crate flashes a raw firmware image onto a microcontroller running the
//! `BTLDCMD` HID bootloader, using 65-byte output reports for commands and
//! data and 9-byte input reports for flash-commit status.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants and the fixed-size frame codec
//! - **Transport**: HID communication abstraction (nusb, mock) and write retry policy
//! - **Locator**: Polling discovery with bootloader version gate
//! - **Firmware**: Sector reader over any `Read` source
//! - **State**: Transfer phases and session state
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use hidflash_core::{FlashConfig, FlashSession, NusbHost};
//!
//! let config = FlashConfig::default();
//! let host = NusbHost::new(config.timing.read_timeout());
//! let mut session = FlashSession::new(config, host);
//! session.flash_file("firmware.bin").expect("flashing failed");
//! ```

pub mod config;
pub mod events;
pub mod firmware;
pub mod locator;
pub mod protocol;
pub mod session;
pub mod state;
pub mod timing;
pub mod transport;

// Re-exports for convenience
pub use config::{DeviceConfig, FlashConfig, Limits};
pub use events::{FlashEvent, FlashObserver, NullObserver, PacketDirection, TracingObserver};
pub use firmware::{Sector, SectorReader};
pub use locator::{DeviceLocator, LocateFailure};
pub use protocol::{FrameError, Opcode, OutboundFrame, StatusFrame};
pub use session::{FlashError, FlashReport, FlashSession};
pub use state::{FailureKind, FlashPhase};
pub use timing::{Delay, RecordingDelay, ThreadDelay, Timings};
pub use transport::{
    DeviceInfo, HidHost, HidTransport, MockHost, NusbHost, TransportError, WriteFailure,
    reliable_write,
};
