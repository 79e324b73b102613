//! Bootloader discovery.
//!
//! The bootloader usually enumerates a moment after the target is reset, so
//! the bus is polled until a matching device shows up. Every pass starts from
//! a fresh enumeration.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{DeviceConfig, Limits};
use crate::events::{FlashEvent, FlashObserver};
use crate::timing::Delay;
use crate::transport::HidHost;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateFailure {
    #[error("Device [{vid:04X}:{pid:04X}] not found after {attempts} attempts")]
    NotFound { vid: u16, pid: u16, attempts: u32 },

    #[error("Bootloader version {found:04X} is too old, {required:04X} or newer required")]
    OutdatedBootloader { found: u16, required: u16 },

    #[error("Unable to open device [{vid:04X}:{pid:04X}]{}", open_reason(.reason))]
    OpenFailed {
        vid: u16,
        pid: u16,
        reason: Option<String>,
    },
}

fn open_reason(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

/// Polls the HID bus for a usable bootloader.
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    pub vendor_id: u16,
    pub product_id: u16,
    pub min_release: u16,
    pub max_attempts: u32,
    pub interval: Duration,
}

impl DeviceLocator {
    pub fn new(device: &DeviceConfig, limits: &Limits, interval: Duration) -> Self {
        Self {
            vendor_id: device.vendor_id,
            product_id: device.product_id,
            min_release: device.min_release,
            max_attempts: limits.max_discovery_attempts,
            interval,
        }
    }

    /// Wait for the bootloader, check its version and open it.
    #[instrument(level = "info", skip_all, fields(vid = format!("{:04X}", self.vendor_id), pid = format!("{:04X}", self.product_id)))]
    pub fn locate<H, D, O>(&self, host: &H, delay: &D, observer: &O) -> Result<H::Device, LocateFailure>
    where
        H: HidHost,
        D: Delay + ?Sized,
        O: FlashObserver + ?Sized,
    {
        let (vid, pid) = (self.vendor_id, self.product_id);
        let mut found = None;

        for attempt in 1..=self.max_attempts {
            let devices = match host.enumerate(vid, pid) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, attempt, "Enumeration failed");
                    Vec::new()
                }
            };

            for info in devices
                .iter()
                .filter(|d| d.vendor_id == vid && d.product_id == pid)
            {
                if info.release_number < self.min_release {
                    warn!(
                        release = %format!("{:04X}", info.release_number),
                        required = %format!("{:04X}", self.min_release),
                        "Bootloader too old"
                    );
                    return Err(LocateFailure::OutdatedBootloader {
                        found: info.release_number,
                        required: self.min_release,
                    });
                }
                found.get_or_insert(*info);
            }

            observer.on_event(&FlashEvent::DiscoveryAttempt {
                attempt,
                max_attempts: self.max_attempts,
            });
            if found.is_some() {
                debug!(attempt, "Bootloader present");
                break;
            }

            if attempt < self.max_attempts {
                delay.sleep(self.interval);
            }
        }

        let Some(info) = found else {
            return Err(LocateFailure::NotFound {
                vid,
                pid,
                attempts: self.max_attempts,
            });
        };

        let device = match host.open(vid, pid) {
            Ok(Some(device)) => device,
            Ok(None) => {
                return Err(LocateFailure::OpenFailed {
                    vid,
                    pid,
                    reason: None,
                });
            }
            Err(e) => {
                return Err(LocateFailure::OpenFailed {
                    vid,
                    pid,
                    reason: Some(e.to_string()),
                });
            }
        };

        info!(release = %format!("{:04X}", info.release_number), "Bootloader opened");
        observer.on_event(&FlashEvent::DeviceFound {
            vid,
            pid,
            release: info.release_number,
        });
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::timing::RecordingDelay;
    use crate::transport::{DeviceInfo, MockHost};

    fn locator() -> DeviceLocator {
        DeviceLocator::new(
            &DeviceConfig::default(),
            &Limits::default(),
            Duration::from_secs(1),
        )
    }

    fn bootloader(release_number: u16) -> DeviceInfo {
        DeviceInfo {
            vendor_id: 0x1209,
            product_id: 0xBEBA,
            release_number,
        }
    }

    #[test]
    fn test_found_first_pass() {
        let host = MockHost::with_bootloader(0x0300);
        let delay = RecordingDelay::new();

        let device = locator().locate(&host, &delay, &NullObserver).unwrap();

        assert_eq!(host.enumerations(), 1);
        assert_eq!(host.opens(), 1);
        assert!(delay.recorded().is_empty());
        drop(device);
    }

    #[test]
    fn test_found_after_polling() {
        let host = MockHost::with_bootloader(0x0310);
        for _ in 0..4 {
            host.queue_scan(vec![]);
        }
        let delay = RecordingDelay::new();

        assert!(locator().locate(&host, &delay, &NullObserver).is_ok());
        assert_eq!(host.enumerations(), 5);
        assert_eq!(delay.count(Duration::from_secs(1)), 4);
    }

    #[derive(Default)]
    struct PassCounter {
        passes: std::sync::Mutex<Vec<u32>>,
    }

    impl FlashObserver for PassCounter {
        fn on_event(&self, event: &FlashEvent) {
            if let FlashEvent::DiscoveryAttempt { attempt, .. } = event {
                self.passes.lock().unwrap().push(*attempt);
            }
        }
    }

    #[test]
    fn test_every_pass_reported() {
        let host = MockHost::with_bootloader(0x0300);
        host.queue_scan(vec![]);
        host.queue_scan(vec![]);
        let delay = RecordingDelay::new();
        let observer = PassCounter::default();

        assert!(locator().locate(&host, &delay, &observer).is_ok());
        assert_eq!(*observer.passes.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(delay.recorded().len(), 2);
    }

    #[test]
    fn test_not_found() {
        let host = MockHost::new();
        let delay = RecordingDelay::new();

        let err = locator().locate(&host, &delay, &NullObserver).unwrap_err();

        assert_eq!(
            err,
            LocateFailure::NotFound {
                vid: 0x1209,
                pid: 0xBEBA,
                attempts: 30
            }
        );
        assert_eq!(host.enumerations(), 30);
        assert_eq!(host.opens(), 0);
        assert_eq!(delay.recorded().len(), 29);
    }

    #[test]
    fn test_outdated_rejected() {
        let host = MockHost::with_bootloader(0x0200);

        let err = locator()
            .locate(&host, &RecordingDelay::new(), &NullObserver)
            .unwrap_err();

        assert_eq!(
            err,
            LocateFailure::OutdatedBootloader {
                found: 0x0200,
                required: 0x0300
            }
        );
        assert_eq!(host.opens(), 0);
    }

    #[test]
    fn test_outdated_beside_valid_rejected() {
        let host = MockHost::with_devices(vec![bootloader(0x0300), bootloader(0x0102)]);

        let err = locator()
            .locate(&host, &RecordingDelay::new(), &NullObserver)
            .unwrap_err();
        assert!(matches!(err, LocateFailure::OutdatedBootloader { found: 0x0102, .. }));
    }

    #[test]
    fn test_other_product_ignored() {
        let other = DeviceInfo {
            vendor_id: 0x1209,
            product_id: 0x0001,
            release_number: 0x0001,
        };
        let host = MockHost::with_devices(vec![other]);
        let mut locator = locator();
        locator.max_attempts = 3;

        let err = locator
            .locate(&host, &RecordingDelay::new(), &NullObserver)
            .unwrap_err();
        assert!(matches!(err, LocateFailure::NotFound { attempts: 3, .. }));
    }

    #[test]
    fn test_open_returns_null() {
        let host = MockHost::with_bootloader(0x0300);
        host.fail_open();

        let err = locator()
            .locate(&host, &RecordingDelay::new(), &NullObserver)
            .unwrap_err();
        assert!(matches!(err, LocateFailure::OpenFailed { reason: None, .. }));
    }
}
