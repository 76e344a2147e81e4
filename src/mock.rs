//! In-memory panel for tests
//!
//! [`MockPanel`] implements [`PanelDevice`] without hardware. It records
//! every command, answers mode changes with ACK/NAK, and can be told to be
//! absent, refuse access, refuse modes, fault or disconnect. Clones share
//! state, so a test can keep one handle while the scheduler owns another.
//!
//! It also tracks how many refreshes are in flight at once, which lets tests
//! check that refresh commands never overlap.
//!
//! ## Example
//!
//! ```
//! use eink_controller::mock::MockPanel;
//! use eink_controller::{Builder, Dimensions, RefreshMode, RefreshScheduler};
//!
//! let panel = MockPanel::new();
//! panel.refuse_mode(RefreshMode::A2);
//!
//! let config = Builder::new()
//!     .dimensions(Dimensions::new(16, 16).unwrap())
//!     .build()
//!     .unwrap();
//! let scheduler = RefreshScheduler::new(panel.clone(), config);
//!
//! assert!(scheduler.full_refresh().is_ok());
//! assert!(scheduler.set_refresh_mode(RefreshMode::A2).is_err());
//! assert_eq!(panel.refreshes().len(), 1);
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::command::{self, ACK, NAK, SET_WAVEFORM, STATUS_FAULT, STATUS_IDLE, WRITE_FRAME};
use crate::error::Error;
use crate::interface::{PanelDevice, PanelInterface};
use crate::mode::RefreshMode;

/// Path reported in errors raised by the mock
pub const MOCK_DEVICE_PATH: &str = "/dev/mock-eink";

/// A recorded command and the data sent after it
pub type Record = (u8, Vec<u8>);

#[derive(Debug)]
struct Panel {
    present: bool,
    deny_permission: bool,
    disconnected: bool,
    refused_modes: Vec<RefreshMode>,
    fault_after: Option<u32>,
    refresh_delay: Duration,
    opens: usize,
    closes: usize,
    log: Vec<Record>,
}

#[derive(Debug)]
struct Shared {
    panel: Mutex<Panel>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Shared {
    fn panel(&self) -> MutexGuard<'_, Panel> {
        self.panel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Errors produced by [`MockInterface`]
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// The panel was disconnected with [`MockPanel::set_disconnected`]
    #[error("mock panel disconnected")]
    Disconnected,
}

/// Simulated panel
#[derive(Clone, Debug)]
pub struct MockPanel {
    shared: Arc<Shared>,
}

impl Default for MockPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPanel {
    /// A present, healthy panel
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                panel: Mutex::new(Panel {
                    present: true,
                    deny_permission: false,
                    disconnected: false,
                    refused_modes: Vec::new(),
                    fault_after: None,
                    refresh_delay: Duration::ZERO,
                    opens: 0,
                    closes: 0,
                    log: Vec::new(),
                }),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// A panel that is not plugged in
    pub fn absent() -> Self {
        let panel = Self::new();
        panel.set_present(false);
        panel
    }

    /// Plug or unplug the panel
    pub fn set_present(&self, present: bool) {
        self.shared.panel().present = present;
    }

    /// Refuse every subsequent open with a permission error
    pub fn deny_permission(&self) {
        self.shared.panel().deny_permission = true;
    }

    /// Make every open handle fail its I/O
    pub fn set_disconnected(&self, disconnected: bool) {
        self.shared.panel().disconnected = disconnected;
    }

    /// NAK any request to switch to `mode`
    pub fn refuse_mode(&self, mode: RefreshMode) {
        self.shared.panel().refused_modes.push(mode);
    }

    /// Report a fault at the end of the next refresh
    pub fn fail_next_refresh(&self) {
        self.fail_refresh_after(0);
    }

    /// Let `completed` refreshes finish normally, then fault the one after
    pub fn fail_refresh_after(&self, completed: u32) {
        self.shared.panel().fault_after = Some(completed);
    }

    /// How long each refresh keeps the panel busy
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.shared.panel().refresh_delay = delay;
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.shared.panel().opens
    }

    /// Number of handles dropped
    pub fn close_count(&self) -> usize {
        self.shared.panel().closes
    }

    /// Refreshes currently being driven
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of refreshes ever driven at the same time
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every command received, across all handles
    pub fn commands(&self) -> Vec<Record> {
        self.shared.panel().log.clone()
    }

    /// Refresh-class commands received
    pub fn refreshes(&self) -> Vec<Record> {
        self.shared
            .panel()
            .log
            .iter()
            .filter(|(cmd, _)| command::is_refresh(*cmd))
            .cloned()
            .collect()
    }

    /// Data of the most recent frame upload, header included
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.shared
            .panel()
            .log
            .iter()
            .rev()
            .find(|(cmd, _)| *cmd == WRITE_FRAME)
            .map(|(_, data)| data.clone())
    }
}

impl PanelDevice for MockPanel {
    type Interface = MockInterface;

    fn probe(&self) -> bool {
        self.shared.panel().present
    }

    fn open(&self) -> Result<MockInterface, Error> {
        let mut panel = self.shared.panel();
        if panel.deny_permission {
            return Err(Error::PermissionDenied {
                path: PathBuf::from(MOCK_DEVICE_PATH),
            });
        }
        if !panel.present {
            return Err(Error::DeviceUnavailable {
                tried: vec![PathBuf::from(MOCK_DEVICE_PATH)],
            });
        }
        panel.opens += 1;
        Ok(MockInterface {
            shared: Arc::clone(&self.shared),
            replies: VecDeque::new(),
            last_command: None,
            refreshing: false,
        })
    }
}

/// Open handle to a [`MockPanel`]
#[derive(Debug)]
pub struct MockInterface {
    shared: Arc<Shared>,
    replies: VecDeque<u8>,
    last_command: Option<u8>,
    refreshing: bool,
}

impl MockInterface {
    fn check_connected(&self) -> Result<(), MockError> {
        if self.shared.panel().disconnected {
            return Err(MockError::Disconnected);
        }
        Ok(())
    }

    fn end_refresh(&mut self) {
        if self.refreshing {
            self.refreshing = false;
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl PanelInterface for MockInterface {
    type Error = MockError;

    fn send_command(&mut self, command: u8) -> Result<(), Self::Error> {
        self.check_connected()?;
        self.shared.panel().log.push((command, Vec::new()));
        self.last_command = Some(command);

        if command::is_refresh(command) && !self.refreshing {
            self.refreshing = true;
            let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.check_connected()?;
        let mut panel = self.shared.panel();
        if let Some((_, recorded)) = panel.log.last_mut() {
            recorded.extend_from_slice(data);
        }

        if self.last_command == Some(SET_WAVEFORM) {
            let refused = data
                .first()
                .and_then(|id| RefreshMode::from_waveform_id(*id))
                .is_none_or(|mode| panel.refused_modes.contains(&mode));
            self.replies.push_back(if refused { NAK } else { ACK });
        }
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, Self::Error> {
        self.check_connected()?;
        Ok(self.replies.pop_front().unwrap_or(STATUS_IDLE))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.check_connected()
    }

    fn busy_wait<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, Self::Error> {
        if !self.refreshing {
            return Ok(STATUS_IDLE);
        }

        let refresh_delay = self.shared.panel().refresh_delay;
        delay.delay_us(refresh_delay.as_micros().min(u128::from(u32::MAX)) as u32);
        self.end_refresh();
        self.check_connected()?;

        let mut panel = self.shared.panel();
        match panel.fault_after {
            Some(0) => {
                panel.fault_after = None;
                Ok(STATUS_FAULT)
            }
            Some(remaining) => {
                panel.fault_after = Some(remaining - 1);
                Ok(STATUS_IDLE)
            }
            None => Ok(STATUS_IDLE),
        }
    }
}

impl Drop for MockInterface {
    fn drop(&mut self) {
        self.end_refresh();
        self.shared.panel().closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDelay;
    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_probe_does_not_open() {
        let panel = MockPanel::new();
        assert!(panel.probe());
        assert_eq!(panel.open_count(), 0);
        assert!(!MockPanel::absent().probe());
    }

    #[test]
    fn test_open_errors() {
        assert!(matches!(
            MockPanel::absent().open(),
            Err(Error::DeviceUnavailable { .. })
        ));
        let denied = MockPanel::new();
        denied.deny_permission();
        assert!(matches!(denied.open(), Err(Error::PermissionDenied { .. })));
    }

    #[test]
    fn test_mode_replies() {
        let panel = MockPanel::new();
        panel.refuse_mode(RefreshMode::A2);
        let mut interface = panel.open().unwrap();

        interface.send_command(SET_WAVEFORM).unwrap();
        interface.send_data(&[RefreshMode::Du.waveform_id()]).unwrap();
        assert_eq!(interface.read_status().unwrap(), ACK);

        interface.send_command(SET_WAVEFORM).unwrap();
        interface.send_data(&[RefreshMode::A2.waveform_id()]).unwrap();
        assert_eq!(interface.read_status().unwrap(), NAK);

        interface.send_command(SET_WAVEFORM).unwrap();
        interface.send_data(&[42]).unwrap();
        assert_eq!(interface.read_status().unwrap(), NAK);
    }

    #[test]
    fn test_refresh_tracking_and_faults() {
        let panel = MockPanel::new();
        panel.fail_next_refresh();
        let mut interface = panel.open().unwrap();

        interface.send_command(command::REFRESH_FULL).unwrap();
        interface.send_data(&[2]).unwrap();
        assert_eq!(panel.in_flight(), 1);
        assert_eq!(interface.busy_wait(&mut NoDelay).unwrap(), STATUS_FAULT);
        assert_eq!(panel.in_flight(), 0);

        interface.send_command(command::REFRESH_PARTIAL).unwrap();
        interface.send_data(&[2]).unwrap();
        assert_eq!(interface.busy_wait(&mut NoDelay).unwrap(), STATUS_IDLE);

        assert_eq!(panel.max_in_flight(), 1);
        assert_eq!(
            panel.refreshes(),
            vec![(command::REFRESH_FULL, vec![2]), (command::REFRESH_PARTIAL, vec![2])]
        );
    }

    #[test]
    fn test_fault_after_completed_refreshes() {
        let panel = MockPanel::new();
        panel.fail_refresh_after(1);
        let mut interface = panel.open().unwrap();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            interface.send_command(command::REFRESH_FULL).unwrap();
            statuses.push(interface.busy_wait(&mut NoDelay).unwrap());
        }
        assert_eq!(statuses, vec![STATUS_IDLE, STATUS_FAULT, STATUS_IDLE]);
    }

    #[test]
    fn test_drop_counts_close() {
        let panel = MockPanel::new();
        let interface = panel.open().unwrap();
        assert_eq!(panel.close_count(), 0);
        drop(interface);
        assert_eq!(panel.open_count(), 1);
        assert_eq!(panel.close_count(), 1);
    }

    #[test]
    fn test_disconnected_fails_io() {
        let panel = MockPanel::new();
        let mut interface = panel.open().unwrap();
        panel.set_disconnected(true);
        assert!(matches!(
            interface.send_command(command::REFRESH_FULL),
            Err(MockError::Disconnected)
        ));
    }
}
