//! Console progress rendering.

use std::io::Write;

use hidflash_core::{FlashEvent, FlashObserver, FlashPhase};

/// Prints the classic flash-tool progress to stdout: `#` per discovery pass,
/// `.` per sector and a running byte count.
pub struct ConsoleObserver;

impl ConsoleObserver {
    fn print(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl FlashObserver for ConsoleObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::SearchStarted { vid, pid } => {
                self.print(&format!("> Searching for [{vid:04X}:{pid:04X}] device...\n"));
            }
            FlashEvent::DiscoveryAttempt { .. } => self.print("#"),
            FlashEvent::DeviceFound { vid, pid, release } => {
                self.print(&format!(
                    "\n> [{vid:04X}:{pid:04X}] device is found ! (bootloader v{}.{:02X})\n",
                    release >> 8,
                    release & 0xFF
                ));
            }
            FlashEvent::PhaseChanged { from, to } => match (from, to) {
                (_, FlashPhase::Erasing) => self.print("> Sending erase Flash command...\n"),
                (FlashPhase::Erasing, FlashPhase::TransferringSector) => {
                    self.print("> Start flashing firmware to Flash...\n")
                }
                (_, FlashPhase::Rebooting) => {
                    self.print("\n> Done!\n> Sending reboot command...\n")
                }
                _ => {}
            },
            FlashEvent::SectorStarted { .. } => self.print("."),
            FlashEvent::SectorWritten { total_bytes, .. } => {
                self.print(&format!(" {total_bytes} Bytes\n"))
            }
            FlashEvent::RebootFailed { .. } => {
                self.print("> Error while sending reboot command.\n")
            }
            _ => {}
        }
    }
}
