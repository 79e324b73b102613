//! nusb-based HID transport implementation.
//!
//! Talks to the bootloader's HID interface through its interrupt endpoints,
//! the same way hidraw does: an unnumbered report is written without its
//! leading zero selector byte, and the byte count reported back includes it.

use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{Buffer, Direction, In, Interrupt, Out, TransferError};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{DeviceInfo, HidHost, HidTransport, TransportError};
use crate::protocol::constants::REPORT_ID;

/// USB interface class code for HID.
const HID_CLASS: u8 = 0x03;

/// Upper bound for a single output report transfer.
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// HID subsystem backed by nusb.
#[derive(Debug, Clone)]
pub struct NusbHost {
    read_timeout: Duration,
}

impl NusbHost {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl HidHost for NusbHost {
    type Device = NusbHidDevice;

    fn enumerate(&self, vid: u16, pid: u16) -> Result<Vec<DeviceInfo>, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        Ok(devices
            .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
            .map(|d| DeviceInfo {
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                release_number: d.device_version(),
            })
            .collect())
    }

    #[instrument(level = "info", skip(self), fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    fn open(&self, vid: u16, pid: u16) -> Result<Option<NusbHidDevice>, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid);

        match device_info {
            Some(info) => NusbHidDevice::open_device_info(info, self.read_timeout).map(Some),
            None => {
                debug!("Device vanished before open");
                Ok(None)
            }
        }
    }
}

/// Open HID bootloader device.
pub struct NusbHidDevice {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    in_packet_size: usize,
    read_timeout: Duration,
}

impl NusbHidDevice {
    fn open_device_info(
        device_info: nusb::DeviceInfo,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            release = %format!("{:04X}", device_info.device_version()),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // Find the HID interface and its interrupt endpoints
        let mut hid_interface = None;
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;
        let mut in_packet_size: usize = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                for alt in iface.alt_settings() {
                    if alt.class() != HID_CLASS {
                        continue;
                    }
                    hid_interface = Some(iface.interface_number());
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == TransferType::Interrupt {
                            if ep.direction() == Direction::In {
                                in_endpoint = ep.address();
                                in_packet_size = ep.max_packet_size();
                            } else {
                                out_endpoint = ep.address();
                            }
                        }
                    }
                }
                if hid_interface.is_some() {
                    break;
                }
            }
        }

        let interface_number = hid_interface.ok_or_else(|| TransportError::EndpointNotFound {
            ep_type: "HID interface".into(),
            direction: "-".into(),
        })?;
        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "Out".into(),
            });
        }

        let interface = device
            .detach_and_claim_interface(interface_number)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: interface_number,
                message: e.to_string(),
            })?;

        info!(
            interface = interface_number,
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            in_packet_size,
            read_timeout,
        })
    }
}

impl HidTransport for NusbHidDevice {
    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        // Unnumbered reports go out without the selector byte.
        let (wire, selector_len) = match data.first() {
            Some(&REPORT_ID) => (&data[1..], 1),
            _ => (data, 0),
        };

        let mut ep = self
            .interface
            .endpoint::<Interrupt, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        ep.submit(Buffer::from(wire.to_vec()));
        let completion = ep.wait_next_complete(WRITE_TIMEOUT).or_else(|| {
            // Cancel and collect the transfer to learn how much was moved.
            ep.cancel_all();
            ep.wait_next_complete(WRITE_TIMEOUT)
        });

        written_len(
            completion.map(|c| (c.status, c.actual_len)),
            selector_len,
        )
    }

    #[instrument(level = "trace", skip(self))]
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut ep = self
            .interface
            .endpoint::<Interrupt, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let len = self.in_packet_size.max(max_len);
        let mut buf = ep.allocate(len);
        buf.set_requested_len(len);
        ep.submit(buf);

        let Some(completion) = ep.wait_next_complete(self.read_timeout) else {
            ep.cancel_all();
            let _ = ep.wait_next_complete(self.read_timeout);
            return Err(TransportError::Timeout {
                timeout_ms: self.read_timeout.as_millis() as u64,
            });
        };

        completion
            .status
            .map_err(|e| match e {
                TransferError::Disconnected => TransportError::Disconnected,
                e => TransportError::ReadFailed(e.to_string()),
            })?;

        let n = completion.actual_len.min(max_len);
        Ok(completion.buffer[..n].to_vec())
    }
}

/// Bytes accounted for by one output transfer, selector byte included.
///
/// A transfer that never completed, even after cancellation, may have moved
/// any part of the report, so it is reported as cut off and never as "nothing
/// sent".
fn written_len(
    outcome: Option<(Result<(), TransferError>, usize)>,
    selector_len: usize,
) -> Result<usize, TransportError> {
    match outcome {
        Some((Ok(()), actual)) => Ok(actual + selector_len),
        Some((Err(e), actual)) if actual > 0 => {
            warn!(error = %e, sent = actual, "Report cut off");
            Ok(actual + selector_len)
        }
        Some((Err(e), _)) => Err(TransportError::WriteFailed(e.to_string())),
        None => {
            warn!("Output transfer still pending after cancel");
            Ok(selector_len)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_write_counts_selector() {
        assert_eq!(written_len(Some((Ok(()), 64)), 1).unwrap(), 65);
        assert_eq!(written_len(Some((Ok(()), 64)), 0).unwrap(), 64);
    }

    #[test]
    fn test_failed_write_with_progress_is_cut_off() {
        assert_eq!(
            written_len(Some((Err(TransferError::Stall), 20)), 1).unwrap(),
            21
        );
    }

    #[test]
    fn test_failed_write_without_progress_is_retryable() {
        assert!(matches!(
            written_len(Some((Err(TransferError::Cancelled), 0)), 1),
            Err(TransportError::WriteFailed(_))
        ));
    }

    #[test]
    fn test_unfinished_write_is_not_retryable() {
        // Shorter than the 65-byte report, so the write is treated as partial.
        assert_eq!(written_len(None, 1).unwrap(), 1);
        assert_eq!(written_len(None, 0).unwrap(), 0);
    }
}
