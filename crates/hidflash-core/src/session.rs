//! Flash session - high-level orchestrator for the transfer.
//!
//! Drives one bootloader from discovery to reboot:
//! erase, then each sector as sixteen data frames followed by a wait for the
//! device to commit it to flash, then the reboot command. A sector is never
//! advanced past until its commit status has been observed.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::FlashConfig;
use crate::events::{FlashEvent, FlashObserver, PacketDirection, TracingObserver};
use crate::firmware::SectorReader;
use crate::locator::{DeviceLocator, LocateFailure};
use crate::protocol::constants::RX_FRAME_SIZE;
use crate::protocol::{FrameError, Opcode, OutboundFrame, StatusFrame};
use crate::state::{FailureKind, FlashPhase, SessionState};
use crate::timing::{Delay, ThreadDelay};
use crate::transport::{HidHost, HidTransport, TransportError, WriteFailure, WritePolicy, reliable_write};

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("Error opening firmware file {}: {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Locate(#[from] LocateFailure),

    #[error("Error while sending erase Flash command: {0}")]
    EraseCommandFailed(#[source] WriteFailure),

    #[error("Error while flashing sector {sector}, frame {frame}: {source}")]
    DataWriteFailed {
        sector: usize,
        frame: usize,
        source: WriteFailure,
    },

    #[error("Invalid data frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Sector {sector} not committed after {polls} status polls")]
    CommitTimeout { sector: usize, polls: u32 },

    #[error("Status read failed while waiting for sector {sector}: {source}")]
    StatusReadFailed {
        sector: usize,
        source: TransportError,
    },

    #[error("Error reading firmware image: {0}")]
    FirmwareRead(#[source] std::io::Error),
}

impl FlashError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FlashError::FileOpen { .. } => FailureKind::FileOpenFailed,
            FlashError::Locate(LocateFailure::NotFound { .. }) => FailureKind::NotFound,
            FlashError::Locate(LocateFailure::OutdatedBootloader { .. }) => {
                FailureKind::OutdatedBootloader
            }
            FlashError::Locate(LocateFailure::OpenFailed { .. }) => FailureKind::OpenFailed,
            FlashError::EraseCommandFailed(_) => FailureKind::EraseCommandFailed,
            FlashError::DataWriteFailed { .. } | FlashError::Frame(_) => {
                FailureKind::DataWriteFailed
            }
            FlashError::CommitTimeout { .. } => FailureKind::CommitTimeout,
            FlashError::StatusReadFailed { .. } => FailureKind::StatusReadFailed,
            FlashError::FirmwareRead(_) => FailureKind::FirmwareReadFailed,
        }
    }
}

/// Outcome of a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    /// Sectors written and committed.
    pub sectors: usize,
    /// Bytes taken from the firmware image.
    pub firmware_bytes: usize,
    /// Data-frame payload bytes sent, padding of the last sector included.
    pub bytes_sent: usize,
    /// Set when the final reboot command could not be delivered.
    pub reboot_error: Option<WriteFailure>,
}

/// Flash session - owns the configuration and the HID host.
pub struct FlashSession<H: HidHost, O: FlashObserver, D: Delay> {
    config: FlashConfig,
    host: H,
    observer: Arc<O>,
    delay: D,
    state: SessionState,
}

impl<H: HidHost> FlashSession<H, TracingObserver, ThreadDelay> {
    /// Create a new session with default tracing observer and real delays.
    pub fn new(config: FlashConfig, host: H) -> Self {
        Self::with_observer(config, host, Arc::new(TracingObserver), ThreadDelay)
    }
}

impl<H: HidHost, O: FlashObserver, D: Delay> FlashSession<H, O, D> {
    /// Create a new session with a custom observer and delay source.
    pub fn with_observer(config: FlashConfig, host: H, observer: Arc<O>, delay: D) -> Self {
        Self {
            config,
            host,
            observer,
            delay,
            state: SessionState::new(),
        }
    }

    /// Phase reached by the last run.
    pub fn phase(&self) -> FlashPhase {
        self.state.phase
    }

    /// Open `path` and flash it.
    pub fn flash_file<P: AsRef<Path>>(&mut self, path: P) -> Result<FlashReport, FlashError> {
        let path = path.as_ref();
        self.state = SessionState::new();

        info!(path = %path.display(), "Opening firmware image");
        let file = match File::open(path) {
            Ok(f) => f,
            Err(source) => {
                let err = FlashError::FileOpen {
                    path: path.to_path_buf(),
                    source,
                };
                self.fail(&err);
                return Err(err);
            }
        };

        self.flash(BufReader::new(file))
    }

    /// Flash a raw firmware image read from `image`.
    ///
    /// The device handle is released before this returns, on success and on
    /// every failure.
    pub fn flash<R: Read>(&mut self, image: R) -> Result<FlashReport, FlashError> {
        self.state = SessionState::new();

        match self.run(image) {
            Ok(report) => {
                self.emit(FlashEvent::Complete {
                    total_bytes: report.bytes_sent,
                });
                Ok(report)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    #[instrument(skip_all)]
    fn run<R: Read>(&mut self, image: R) -> Result<FlashReport, FlashError> {
        let timing = self.config.timing.clone();
        let policy = WritePolicy {
            max_attempts: self.config.limits.max_write_retries,
            backoff: timing.write_backoff(),
        };

        // Discover
        self.goto(FlashPhase::Discovering);
        self.emit(FlashEvent::SearchStarted {
            vid: self.config.device.vendor_id,
            pid: self.config.device.product_id,
        });
        let locator = DeviceLocator::new(
            &self.config.device,
            &self.config.limits,
            timing.discovery_interval(),
        );
        let device = locator.locate(&self.host, &self.delay, self.observer.as_ref())?;
        let device = ObservedTransport {
            inner: device,
            observer: Arc::clone(&self.observer),
        };
        self.delay.sleep(timing.device_settle());

        // Erase. The device gives no ack; the settle delay covers the erase.
        self.goto(FlashPhase::Erasing);
        info!("Sending erase command");
        reliable_write(
            &device,
            &OutboundFrame::command(Opcode::ResetPages),
            &policy,
            &self.delay,
        )
        .map_err(FlashError::EraseCommandFailed)?;
        self.delay.sleep(timing.erase_settle());
        self.delay.sleep(timing.flash_start());

        // Transfer
        let mut reader = SectorReader::new(image);
        let mut sectors = 0;
        loop {
            self.goto(FlashPhase::TransferringSector);
            let Some(sector) = reader.next_sector().map_err(FlashError::FirmwareRead)? else {
                break;
            };
            self.emit(FlashEvent::SectorStarted {
                index: sector.index,
            });

            for (frame, chunk) in sector.chunks().enumerate() {
                let data = OutboundFrame::data(chunk)?;
                reliable_write(&device, &data, &policy, &self.delay).map_err(|source| {
                    FlashError::DataWriteFailed {
                        sector: sector.index,
                        frame,
                        source,
                    }
                })?;
                self.state.bytes_sent += chunk.len();
                self.delay.sleep(timing.chunk_interval());
            }
            self.state.firmware_bytes += sector.data_len();
            self.emit(FlashEvent::SectorWritten {
                index: sector.index,
                total_bytes: self.state.bytes_sent,
            });

            self.goto(FlashPhase::AwaitingCommit);
            let polls = self.await_commit(&device, sector.index)?;
            self.emit(FlashEvent::SectorCommitted {
                index: sector.index,
                polls,
            });
            sectors += 1;
        }

        // Reboot. The image is complete, so a failure here only gets reported.
        self.goto(FlashPhase::Rebooting);
        info!("Sending reboot command");
        let reboot_error = match reliable_write(
            &device,
            &OutboundFrame::command(Opcode::RebootMcu),
            &policy,
            &self.delay,
        ) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Reboot command not delivered");
                self.emit(FlashEvent::RebootFailed {
                    message: e.to_string(),
                });
                Some(e)
            }
        };

        drop(device);
        self.goto(FlashPhase::Done);

        Ok(FlashReport {
            sectors,
            firmware_bytes: self.state.firmware_bytes,
            bytes_sent: self.state.bytes_sent,
            reboot_error,
        })
    }

    /// Poll status reports until the device reports the sector committed.
    fn await_commit<T: HidTransport>(&self, device: &T, sector: usize) -> Result<u32, FlashError> {
        let max_polls = self.config.limits.max_commit_polls;
        let interval = self.config.timing.commit_poll_interval();

        for poll in 1..=max_polls {
            match device.read(RX_FRAME_SIZE) {
                Ok(report) => {
                    let status = StatusFrame::from_report(&report);
                    if status.is_sector_committed() {
                        debug!(sector, poll, "Sector committed");
                        return Ok(poll);
                    }
                }
                Err(TransportError::Timeout { .. }) => {}
                Err(source) => return Err(FlashError::StatusReadFailed { sector, source }),
            }
            self.delay.sleep(interval);
        }

        warn!(sector, polls = max_polls, "No commit status from device");
        Err(FlashError::CommitTimeout {
            sector,
            polls: max_polls,
        })
    }

    fn goto(&mut self, next: FlashPhase) {
        let from = self.state.phase;
        self.state.goto_phase(next);
        self.emit(FlashEvent::PhaseChanged { from, to: next });
    }

    fn fail(&mut self, err: &FlashError) {
        self.goto(FlashPhase::Failed(err.kind()));
        self.emit(FlashEvent::Failed {
            message: err.to_string(),
        });
    }

    fn emit(&self, event: FlashEvent) {
        self.observer.on_event(&event);
    }
}

/// Transport wrapper that emits packet events.
struct ObservedTransport<T: HidTransport, O: FlashObserver> {
    inner: T,
    observer: Arc<O>,
}

impl<T: HidTransport, O: FlashObserver> HidTransport for ObservedTransport<T, O> {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(data);
        if let Ok(n) = &res {
            self.observer.on_event(&FlashEvent::Packet {
                direction: PacketDirection::Tx,
                length: *n,
                data: Some(data.iter().take(16).cloned().collect()),
            });
        }
        res
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(max_len);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.observer.on_event(&FlashEvent::Packet {
                direction: PacketDirection::Rx,
                length: data.len(),
                data: Some(data.clone()),
            });
        }
        res
    }
}
