//! HID transport layer abstraction.
//!
//! Defines the `HidHost` and `HidTransport` traits for HID communication,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Identity of an enumerated HID device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    /// bcdDevice, used by the bootloader as its version.
    pub release_number: u16,
}

/// An open HID device.
///
/// Dropping the value closes the device.
pub trait HidTransport: Send + Sync {
    /// Write one output report, report selector byte included.
    ///
    /// `Err` means nothing reached the device. `Ok(n)` with `n` shorter than
    /// `data` means the report was cut off mid-transfer.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read one input report. `Timeout` means no report was pending.
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError>;
}

/// HID subsystem: enumeration and opening.
pub trait HidHost {
    type Device: HidTransport;

    /// List attached devices matching `vid`/`pid`, freshly on every call.
    fn enumerate(&self, vid: u16, pid: u16) -> Result<Vec<DeviceInfo>, TransportError>;

    /// Open the first device matching `vid`/`pid`. `None` if it is gone.
    fn open(&self, vid: u16, pid: u16) -> Result<Option<Self::Device>, TransportError>;
}

impl<T: HidTransport + ?Sized> HidTransport for &T {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(max_len)
    }
}
