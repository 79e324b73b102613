//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod policy;
pub mod traits;

pub use mock::{MockDevice, MockDeviceState, MockHost, ReadOutcome, WriteOutcome};
pub use nusb::{NusbHidDevice, NusbHost};
pub use policy::{WriteFailure, WritePolicy, reliable_write};
pub use traits::{DeviceInfo, HidHost, HidTransport, TransportError};
