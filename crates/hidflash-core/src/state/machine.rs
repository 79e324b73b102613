//! Transfer state machine.
//!
//! ```text
//! Idle -> Discovering -> Erasing -> TransferringSector <-> AwaitingCommit
//!                                          |
//!                                          v
//!                                      Rebooting -> Done
//! ```
//!
//! Any non-terminal phase may move to `Failed`.

use std::fmt;

/// Reason a session ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    FileOpenFailed,
    NotFound,
    OutdatedBootloader,
    OpenFailed,
    EraseCommandFailed,
    DataWriteFailed,
    CommitTimeout,
    StatusReadFailed,
    FirmwareReadFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::FileOpenFailed => "FILE_OPEN_FAILED",
            FailureKind::NotFound => "NOT_FOUND",
            FailureKind::OutdatedBootloader => "OUTDATED_BOOTLOADER",
            FailureKind::OpenFailed => "OPEN_FAILED",
            FailureKind::EraseCommandFailed => "ERASE_COMMAND_FAILED",
            FailureKind::DataWriteFailed => "DATA_WRITE_FAILED",
            FailureKind::CommitTimeout => "COMMIT_TIMEOUT",
            FailureKind::StatusReadFailed => "STATUS_READ_FAILED",
            FailureKind::FirmwareReadFailed => "FIRMWARE_READ_FAILED",
        };
        f.write_str(name)
    }
}

/// Phase of a flash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashPhase {
    #[default]
    Idle,
    Discovering,
    Erasing,
    TransferringSector,
    AwaitingCommit,
    Rebooting,
    Done,
    Failed(FailureKind),
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Idle => write!(f, "IDLE"),
            FlashPhase::Discovering => write!(f, "DISCOVERING"),
            FlashPhase::Erasing => write!(f, "ERASING"),
            FlashPhase::TransferringSector => write!(f, "TRANSFERRING_SECTOR"),
            FlashPhase::AwaitingCommit => write!(f, "AWAITING_COMMIT"),
            FlashPhase::Rebooting => write!(f, "REBOOTING"),
            FlashPhase::Done => write!(f, "DONE"),
            FlashPhase::Failed(kind) => write!(f, "FAILED({})", kind),
        }
    }
}

impl FlashPhase {
    /// Check if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlashPhase::Done | FlashPhase::Failed(_))
    }

    /// Check if `next` is a legal successor of this phase.
    pub fn can_advance_to(&self, next: FlashPhase) -> bool {
        use FlashPhase::*;
        match (self, next) {
            (Done | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Idle, Discovering)
            | (Discovering, Erasing)
            | (Erasing, TransferringSector)
            | (TransferringSector, AwaitingCommit)
            | (TransferringSector, Rebooting)
            | (AwaitingCommit, TransferringSector)
            | (Rebooting, Done) => true,
            _ => false,
        }
    }
}

/// Runtime state of one transfer.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Current phase.
    pub phase: FlashPhase,
    /// Data-frame payload bytes sent, padding included.
    pub bytes_sent: usize,
    /// Bytes read from the firmware image.
    pub firmware_bytes: usize,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new phase.
    pub fn goto_phase(&mut self, next: FlashPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        tracing::debug!(from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            FlashPhase::Idle,
            FlashPhase::Discovering,
            FlashPhase::Erasing,
            FlashPhase::TransferringSector,
            FlashPhase::AwaitingCommit,
            FlashPhase::TransferringSector,
            FlashPhase::Rebooting,
            FlashPhase::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_reordering() {
        assert!(!FlashPhase::Discovering.can_advance_to(FlashPhase::TransferringSector));
        assert!(!FlashPhase::AwaitingCommit.can_advance_to(FlashPhase::Rebooting));
        assert!(!FlashPhase::Erasing.can_advance_to(FlashPhase::Rebooting));
        assert!(!FlashPhase::Idle.can_advance_to(FlashPhase::Erasing));
    }

    #[test]
    fn test_failed_is_absorbing() {
        let failed = FlashPhase::Failed(FailureKind::CommitTimeout);
        assert!(FlashPhase::AwaitingCommit.can_advance_to(failed));
        assert!(failed.is_terminal());
        assert!(!failed.can_advance_to(FlashPhase::Idle));
        assert!(!FlashPhase::Done.can_advance_to(failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FlashPhase::Failed(FailureKind::NotFound).to_string(),
            "FAILED(NOT_FOUND)"
        );
    }
}
