//! Device session lifecycle
//!
//! A [`DeviceSession`] owns at most one open handle to the panel together
//! with the [`PanelState`] and refresh bookkeeping that belong to it. The
//! handle is dropped, and the device closed, exactly once per open: on
//! [`close`](DeviceSession::close), on re-open from the error state, or when
//! the session itself is dropped.
//!
//! The session does not serialize callers. That is the job of
//! [`RefreshScheduler`](crate::RefreshScheduler), which keeps it behind a lock.

use crate::command::{ACK, NAK, SET_WAVEFORM};
use crate::error::Error;
use crate::interface::{InterfaceError, PanelDevice, PanelInterface};
use crate::mode::RefreshMode;
use crate::state::PanelState;

/// Send `SET_WAVEFORM` and wait for the panel's answer
///
/// # Errors
///
/// Returns [`Error::InvalidMode`] when the panel NAKs the waveform and
/// [`Error::HardwareFault`] on I/O failure or an unexpected reply.
pub fn write_mode<I: PanelInterface>(interface: &mut I, mode: RefreshMode) -> Result<(), Error> {
    interface
        .send_command(SET_WAVEFORM)
        .map_err(Error::hardware)?;
    interface
        .send_data(&[mode.waveform_id()])
        .map_err(Error::hardware)?;
    match interface.read_status().map_err(Error::hardware)? {
        ACK => Ok(()),
        NAK => Err(Error::InvalidMode {
            requested: i32::from(mode.waveform_id()),
        }),
        other => Err(Error::hardware(InterfaceError::UnexpectedReply(other))),
    }
}

/// Open panel session and its bookkeeping
#[derive(Debug)]
pub struct DeviceSession<I: PanelInterface> {
    interface: Option<I>,
    state: PanelState,
    refresh_count: u64,
    partials_since_full: u32,
}

impl<I: PanelInterface> Default for DeviceSession<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PanelInterface> DeviceSession<I> {
    /// A closed session
    pub fn new() -> Self {
        Self {
            interface: None,
            state: PanelState::Uninitialized,
            refresh_count: 0,
            partials_since_full: 0,
        }
    }

    /// Open the device and apply `default_mode`
    ///
    /// Does nothing if the session is already open and healthy. A faulted
    /// session is closed first and opened again.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::DeviceUnavailable`] and [`Error::PermissionDenied`]
    /// from the device. Returns [`Error::InitializationFailed`] if the panel
    /// does not accept the default mode; the handle is closed in that case.
    pub fn open<P>(&mut self, device: &P, default_mode: RefreshMode) -> Result<(), Error>
    where
        P: PanelDevice<Interface = I>,
    {
        if self.interface.is_some() {
            if self.state != PanelState::Error {
                return Ok(());
            }
            log::warn!("Re-opening faulted session");
            self.close();
        }

        let mut interface = device.open()?;
        if let Err(err) = write_mode(&mut interface, default_mode) {
            log::error!("Panel refused default mode {default_mode}: {err}");
            return Err(Error::InitializationFailed {
                reason: format!("default mode {default_mode} not applied: {err}"),
            });
        }

        self.interface = Some(interface);
        self.state = self.state.opened(default_mode);
        self.refresh_count = 0;
        self.partials_since_full = 0;
        log::debug!("Session opened in {default_mode}");
        Ok(())
    }

    /// Close the device handle
    ///
    /// Safe to call in any state. Returns `true` if a handle was closed.
    pub fn close(&mut self) -> bool {
        let closed = self.interface.take().is_some();
        self.state = self.state.released();
        self.refresh_count = 0;
        self.partials_since_full = 0;
        if closed {
            log::debug!("Session closed");
        }
        closed
    }

    /// Whether a device handle is held
    pub fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    /// Current state
    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Active mode, if the session is healthy
    pub fn current_mode(&self) -> Option<RefreshMode> {
        self.state.mode()
    }

    /// Refreshes completed in this session
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Partial refreshes since the last full refresh or clear
    pub fn partials_since_full(&self) -> u32 {
        self.partials_since_full
    }

    /// The open handle
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitializationFailed`] if the session is closed.
    pub fn interface_mut(&mut self) -> Result<&mut I, Error> {
        self.interface
            .as_mut()
            .ok_or_else(|| Error::InitializationFailed {
                reason: "session is not open".into(),
            })
    }

    /// Switch the panel to `mode`
    ///
    /// The state only changes once the panel acknowledges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] in the error state, [`Error::InvalidMode`]
    /// if the panel refuses, and [`Error::HardwareFault`] on I/O failure.
    pub fn set_mode(&mut self, mode: RefreshMode) -> Result<(), Error> {
        let next = self.state.mode_changed(mode)?;
        write_mode(self.interface_mut()?, mode)?;
        self.state = next;
        Ok(())
    }

    /// Enter `Refreshing` and return the mode to drive
    pub fn begin_refresh(&mut self) -> Result<RefreshMode, Error> {
        let next = self.state.begin_refresh()?;
        self.state = next;
        next.mode().ok_or(Error::Faulted)
    }

    /// Leave `Refreshing` after a successful refresh and return the new count
    ///
    /// `resets_streak` is set for full refreshes, clears, and partials that
    /// ran a cleanup pass.
    pub fn complete_refresh(&mut self, resets_streak: bool) -> u64 {
        self.state = self.state.refresh_completed();
        self.refresh_count = self.refresh_count.saturating_add(1);
        self.partials_since_full = if resets_streak {
            0
        } else {
            self.partials_since_full.saturating_add(1)
        };
        self.refresh_count
    }

    /// Enter the error state
    pub fn fault(&mut self) {
        self.state = self.state.faulted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockInterface, MockPanel};

    fn open_session(panel: &MockPanel) -> DeviceSession<MockInterface> {
        let mut session = DeviceSession::new();
        session.open(panel, RefreshMode::Gc16).unwrap();
        session
    }

    #[test]
    fn test_open_applies_default_mode() {
        let panel = MockPanel::new();
        let session = open_session(&panel);
        assert_eq!(session.state(), PanelState::Idle(RefreshMode::Gc16));
        assert_eq!(panel.commands(), vec![(SET_WAVEFORM, vec![2])]);
    }

    #[test]
    fn test_open_is_idempotent() {
        let panel = MockPanel::new();
        let mut session = open_session(&panel);
        session.open(&panel, RefreshMode::Du).unwrap();
        assert_eq!(panel.open_count(), 1);
        assert_eq!(session.current_mode(), Some(RefreshMode::Gc16));
    }

    #[test]
    fn test_refused_default_mode_fails_and_closes() {
        let panel = MockPanel::new();
        panel.refuse_mode(RefreshMode::Gc16);
        let mut session: DeviceSession<MockInterface> = DeviceSession::new();
        let err = session.open(&panel, RefreshMode::Gc16).unwrap_err();
        assert!(matches!(err, Error::InitializationFailed { .. }));
        assert!(!session.is_open());
        assert_eq!(panel.close_count(), 1);
    }

    #[test]
    fn test_set_mode_nak_keeps_previous_mode() {
        let panel = MockPanel::new();
        panel.refuse_mode(RefreshMode::A2);
        let mut session = open_session(&panel);

        session.set_mode(RefreshMode::Du).unwrap();
        let err = session.set_mode(RefreshMode::A2).unwrap_err();
        assert!(matches!(err, Error::InvalidMode { requested: 4 }));
        assert_eq!(session.state(), PanelState::Idle(RefreshMode::Du));
    }

    #[test]
    fn test_set_mode_io_failure_is_hardware_fault() {
        let panel = MockPanel::new();
        let mut session = open_session(&panel);
        panel.set_disconnected(true);
        let err = session.set_mode(RefreshMode::Du).unwrap_err();
        assert!(matches!(err, Error::HardwareFault(_)));
        assert_eq!(session.state(), PanelState::Idle(RefreshMode::Gc16));
    }

    #[test]
    fn test_refresh_bookkeeping() {
        let panel = MockPanel::new();
        let mut session = open_session(&panel);

        assert_eq!(session.begin_refresh().unwrap(), RefreshMode::Gc16);
        assert!(matches!(session.begin_refresh(), Err(Error::Busy)));
        assert_eq!(session.complete_refresh(false), 1);
        session.begin_refresh().unwrap();
        assert_eq!(session.complete_refresh(false), 2);
        assert_eq!(session.partials_since_full(), 2);
        session.begin_refresh().unwrap();
        assert_eq!(session.complete_refresh(true), 3);
        assert_eq!(session.partials_since_full(), 0);
    }

    #[test]
    fn test_reopen_after_fault() {
        let panel = MockPanel::new();
        let mut session = open_session(&panel);
        session.begin_refresh().unwrap();
        session.fault();
        assert!(matches!(session.begin_refresh(), Err(Error::Faulted)));

        session.open(&panel, RefreshMode::Gc16).unwrap();
        assert_eq!(session.state(), PanelState::Idle(RefreshMode::Gc16));
        assert_eq!(panel.open_count(), 2);
        assert_eq!(panel.close_count(), 1);
    }

    #[test]
    fn test_close_from_any_state() {
        let panel = MockPanel::new();
        let mut session: DeviceSession<MockInterface> = DeviceSession::new();
        assert!(!session.close());

        session.open(&panel, RefreshMode::Gc16).unwrap();
        session.begin_refresh().unwrap();
        session.complete_refresh(true);
        assert!(session.close());
        assert!(!session.close());
        assert_eq!(session.state(), PanelState::Uninitialized);
        assert_eq!(session.refresh_count(), 0);
        assert_eq!(panel.close_count(), 1);
    }
}
