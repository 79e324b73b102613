//! Mock HID transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{DeviceInfo, HidHost, HidTransport, TransportError};
use crate::protocol::constants::{BOOTLOADER_PRODUCT_ID, BOOTLOADER_VENDOR_ID, RX_FRAME_SIZE};

/// Scripted result of one write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Whole report accepted.
    Full,
    /// Nothing sent, device busy.
    Busy,
    /// Only this many bytes sent.
    Partial(usize),
}

/// Scripted result of one read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Report(Vec<u8>),
    Timeout,
    Disconnected,
}

#[derive(Debug, Default)]
struct DeviceInner {
    write_script: VecDeque<WriteOutcome>,
    write_attempts: usize,
    writes: Vec<Vec<u8>>,
    read_script: VecDeque<ReadOutcome>,
    reads: usize,
    closed: bool,
}

/// Shared view of a mock device, kept by the test after the device moves.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceState {
    inner: Arc<Mutex<DeviceInner>>,
}

impl MockDeviceState {
    fn lock(&self) -> MutexGuard<'_, DeviceInner> {
        self.inner.lock().unwrap()
    }

    /// Queue `count` write outcomes. Unscripted writes succeed.
    pub fn queue_writes(&self, outcome: WriteOutcome, count: usize) {
        let mut inner = self.lock();
        for _ in 0..count {
            inner.write_script.push_back(outcome);
        }
    }

    /// Queue a status report. Reads with nothing queued time out.
    pub fn queue_status(&self, report: &[u8]) {
        self.lock()
            .read_script
            .push_back(ReadOutcome::Report(report.to_vec()));
    }

    /// Queue a status report with the commit byte set.
    pub fn queue_commit(&self) {
        let mut report = [0u8; RX_FRAME_SIZE];
        report[7] = 0x02;
        self.queue_status(&report);
    }

    pub fn queue_read(&self, outcome: ReadOutcome) {
        self.lock().read_script.push_back(outcome);
    }

    /// Reports fully accepted by the device.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Write calls, including refused and partial ones.
    pub fn write_attempts(&self) -> usize {
        self.lock().write_attempts
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Whether the device has been dropped.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Mock device handle.
#[derive(Debug)]
pub struct MockDevice {
    state: MockDeviceState,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_state(MockDeviceState::default())
    }

    pub fn with_state(state: MockDeviceState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &MockDeviceState {
        &self.state
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.state.inner.lock() {
            inner.closed = true;
        }
    }
}

impl HidTransport for MockDevice {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut inner = self.state.lock();
        if inner.closed {
            return Err(TransportError::Disconnected);
        }
        inner.write_attempts += 1;
        match inner.write_script.pop_front().unwrap_or(WriteOutcome::Full) {
            WriteOutcome::Full => {
                inner.writes.push(data.to_vec());
                Ok(data.len())
            }
            WriteOutcome::Busy => Err(TransportError::WriteFailed("device busy".into())),
            WriteOutcome::Partial(n) => Ok(n.min(data.len())),
        }
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.state.lock();
        inner.reads += 1;
        match inner.read_script.pop_front() {
            Some(ReadOutcome::Report(mut report)) => {
                report.truncate(max_len);
                Ok(report)
            }
            Some(ReadOutcome::Disconnected) => Err(TransportError::Disconnected),
            Some(ReadOutcome::Timeout) | None => Err(TransportError::Timeout { timeout_ms: 100 }),
        }
    }
}

#[derive(Debug, Default)]
struct HostInner {
    scans: VecDeque<Vec<DeviceInfo>>,
    present: Vec<DeviceInfo>,
    enumerations: usize,
    opens: usize,
    open_fails: bool,
}

/// Mock HID subsystem handing out a single [`MockDevice`].
#[derive(Debug, Default)]
pub struct MockHost {
    inner: Mutex<HostInner>,
    device: MockDeviceState,
}

impl MockHost {
    /// Host with no devices attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host where `devices` are attached from the first scan on.
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        let host = Self::new();
        host.inner.lock().unwrap().present = devices;
        host
    }

    /// Host with the bootloader attached at the given release.
    pub fn with_bootloader(release_number: u16) -> Self {
        Self::with_devices(vec![DeviceInfo {
            vendor_id: BOOTLOADER_VENDOR_ID,
            product_id: BOOTLOADER_PRODUCT_ID,
            release_number,
        }])
    }

    /// Script the result of the next scan. Once scripted scans run out,
    /// the attached devices are reported.
    pub fn queue_scan(&self, devices: Vec<DeviceInfo>) {
        self.inner.lock().unwrap().scans.push_back(devices);
    }

    /// Make `open` report a null handle.
    pub fn fail_open(&self) {
        self.inner.lock().unwrap().open_fails = true;
    }

    pub fn device(&self) -> &MockDeviceState {
        &self.device
    }

    pub fn enumerations(&self) -> usize {
        self.inner.lock().unwrap().enumerations
    }

    pub fn opens(&self) -> usize {
        self.inner.lock().unwrap().opens
    }
}

impl HidHost for MockHost {
    type Device = MockDevice;

    /// Returns every scripted device; filtering is left to the caller.
    fn enumerate(&self, _vid: u16, _pid: u16) -> Result<Vec<DeviceInfo>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.enumerations += 1;
        Ok(match inner.scans.pop_front() {
            Some(scan) => scan,
            None => inner.present.clone(),
        })
    }

    fn open(&self, _vid: u16, _pid: u16) -> Result<Option<MockDevice>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.opens += 1;
        if inner.open_fails {
            return Ok(None);
        }
        Ok(Some(MockDevice::with_state(self.device.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_write_script() {
        let mock = MockDevice::new();
        mock.state().queue_writes(WriteOutcome::Busy, 1);
        mock.state().queue_writes(WriteOutcome::Partial(3), 1);

        assert!(mock.write(b"Hello").is_err());
        assert_eq!(mock.write(b"Hello").unwrap(), 3);
        assert_eq!(mock.write(b"World").unwrap(), 5);

        let writes = mock.state().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], b"World");
        assert_eq!(mock.state().write_attempts(), 3);
    }

    #[test]
    fn test_mock_read_queue() {
        let mock = MockDevice::new();
        mock.state().queue_commit();
        mock.state().queue_read(ReadOutcome::Disconnected);

        assert_eq!(mock.read(RX_FRAME_SIZE).unwrap()[7], 0x02);
        assert!(matches!(
            mock.read(RX_FRAME_SIZE),
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            mock.read(RX_FRAME_SIZE),
            Err(TransportError::Timeout { .. })
        ));
        assert_eq!(mock.state().reads(), 3);
    }

    #[test]
    fn test_mock_drop_closes() {
        let host = MockHost::with_bootloader(0x0300);
        let device = host.open(0x1209, 0xBEBA).unwrap().unwrap();
        assert!(!host.device().is_closed());

        drop(device);
        assert!(host.device().is_closed());
    }

    #[test]
    fn test_mock_device_debug() {
        let host = MockHost::with_bootloader(0x0300);
        let opened = host.open(0x1209, 0xBEBA).unwrap();
        assert!(format!("{opened:?}").starts_with("Some(MockDevice"));
    }

    #[test]
    fn test_mock_host_scans() {
        let host = MockHost::with_bootloader(0x0300);
        host.queue_scan(vec![]);

        assert!(host.enumerate(0x1209, 0xBEBA).unwrap().is_empty());
        assert_eq!(host.enumerate(0x1209, 0xBEBA).unwrap().len(), 1);
        assert_eq!(host.enumerations(), 2);
    }
}
