//! Bounded retry around a single report write.
//!
//! The bootloader stops servicing USB while its flash is busy, so a write
//! may move no bytes at all; that is retried after a backoff. A write that
//! moved *some* bytes is never retried: the device has already consumed part
//! of a frame and any further bytes would land at the wrong offset.

use thiserror::Error;
use tracing::{debug, warn};

use super::traits::HidTransport;
use crate::protocol::OutboundFrame;
use crate::timing::Delay;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteFailure {
    #[error("Partial write: {written} of {expected} bytes sent")]
    Partial { written: usize, expected: usize },

    #[error("Device busy, gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Retry budget for [`reliable_write`].
#[derive(Debug, Clone, Copy)]
pub struct WritePolicy {
    pub max_attempts: u32,
    pub backoff: std::time::Duration,
}

/// Send `frame`, retrying only while nothing has been transmitted.
pub fn reliable_write<T, D>(
    transport: &T,
    frame: &OutboundFrame,
    policy: &WritePolicy,
    delay: &D,
) -> Result<(), WriteFailure>
where
    T: HidTransport + ?Sized,
    D: Delay + ?Sized,
{
    let expected = frame.len();

    for attempt in 1..=policy.max_attempts {
        match transport.write(frame.as_bytes()) {
            Ok(written) if written >= expected => {
                if attempt > 1 {
                    debug!(attempt, "Write succeeded after retry");
                }
                return Ok(());
            }
            Ok(written) => {
                warn!(written, expected, "Partial write, aborting");
                return Err(WriteFailure::Partial { written, expected });
            }
            Err(e) => {
                debug!(attempt, error = %e, "Write refused, device busy");
                if attempt < policy.max_attempts {
                    delay.sleep(policy.backoff);
                }
            }
        }
    }

    warn!(attempts = policy.max_attempts, "Write retries exhausted");
    Err(WriteFailure::Exhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Opcode, TX_FRAME_SIZE};
    use crate::timing::RecordingDelay;
    use crate::transport::mock::{MockDevice, WriteOutcome};
    use std::time::Duration;

    fn policy() -> WritePolicy {
        WritePolicy {
            max_attempts: 20,
            backoff: Duration::from_millis(100),
        }
    }

    fn frame() -> OutboundFrame {
        OutboundFrame::command(Opcode::ResetPages)
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let device = MockDevice::new();
        let delay = RecordingDelay::new();

        reliable_write(&device, &frame(), &policy(), &delay).unwrap();

        assert_eq!(device.state().write_attempts(), 1);
        assert!(delay.recorded().is_empty());
    }

    #[test]
    fn test_succeeds_on_last_attempt() {
        let device = MockDevice::new();
        device.state().queue_writes(WriteOutcome::Busy, 19);
        let delay = RecordingDelay::new();

        reliable_write(&device, &frame(), &policy(), &delay).unwrap();

        assert_eq!(device.state().write_attempts(), 20);
        assert_eq!(device.state().writes().len(), 1);
        assert_eq!(delay.count(Duration::from_millis(100)), 19);
    }

    #[test]
    fn test_exhausted() {
        let device = MockDevice::new();
        device.state().queue_writes(WriteOutcome::Busy, 20);
        let delay = RecordingDelay::new();

        let err = reliable_write(&device, &frame(), &policy(), &delay).unwrap_err();

        assert_eq!(err, WriteFailure::Exhausted { attempts: 20 });
        assert_eq!(device.state().write_attempts(), 20);
        assert!(device.state().writes().is_empty());
    }

    #[test]
    fn test_partial_aborts_immediately() {
        for written in [1, 32, TX_FRAME_SIZE - 1] {
            let device = MockDevice::new();
            device.state().queue_writes(WriteOutcome::Partial(written), 1);
            let delay = RecordingDelay::new();

            let err = reliable_write(&device, &frame(), &policy(), &delay).unwrap_err();

            assert_eq!(
                err,
                WriteFailure::Partial {
                    written,
                    expected: TX_FRAME_SIZE
                }
            );
            assert_eq!(device.state().write_attempts(), 1);
            assert!(delay.recorded().is_empty());
        }
    }

    #[test]
    fn test_partial_after_busy() {
        let device = MockDevice::new();
        device.state().queue_writes(WriteOutcome::Busy, 3);
        device.state().queue_writes(WriteOutcome::Partial(10), 1);
        let delay = RecordingDelay::new();

        let err = reliable_write(&device, &frame(), &policy(), &delay).unwrap_err();

        assert!(matches!(err, WriteFailure::Partial { written: 10, .. }));
        assert_eq!(device.state().write_attempts(), 4);
    }
}
