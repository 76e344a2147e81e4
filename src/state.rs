//! Refresh-mode state machine
//!
//! | From            | Event                  | To                |
//! |-----------------|------------------------|-------------------|
//! | Uninitialized   | session opened         | Idle(default)     |
//! | Idle(m)         | mode acknowledged (m') | Idle(m')          |
//! | Idle(m)         | refresh accepted       | Refreshing(m)     |
//! | Refreshing(m)   | refresh completed      | Idle(m)           |
//! | Refreshing(m)   | hardware fault         | Error             |
//! | any             | session released       | Uninitialized     |
//!
//! `Error` is left only by re-opening the session or releasing it.

use crate::error::Error;
use crate::mode::RefreshMode;

/// State of the panel session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanelState {
    /// No session is open
    #[default]
    Uninitialized,
    /// Session open, waiting for work, with the active mode
    Idle(RefreshMode),
    /// A waveform is being driven with the given mode
    Refreshing(RefreshMode),
    /// The panel faulted during a refresh
    Error,
}

impl PanelState {
    /// Active mode, if a session is open and healthy
    pub fn mode(self) -> Option<RefreshMode> {
        match self {
            Self::Idle(mode) | Self::Refreshing(mode) => Some(mode),
            Self::Uninitialized | Self::Error => None,
        }
    }

    /// Whether a session is open and can accept work
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Idle(_))
    }

    /// Session opened and the default mode was acknowledged
    pub fn opened(self, mode: RefreshMode) -> Self {
        log::trace!("{self:?} -> Idle({mode})");
        Self::Idle(mode)
    }

    /// The panel acknowledged a mode change
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while refreshing and [`Error::Faulted`] in the
    /// error state. Changing mode requires an open session.
    pub fn mode_changed(self, mode: RefreshMode) -> Result<Self, Error> {
        match self {
            Self::Idle(_) => Ok(Self::Idle(mode)),
            Self::Refreshing(_) => Err(Error::Busy),
            Self::Error => Err(Error::Faulted),
            Self::Uninitialized => Err(not_open()),
        }
    }

    /// A refresh request was accepted
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a refresh is already in flight and
    /// [`Error::Faulted`] in the error state.
    pub fn begin_refresh(self) -> Result<Self, Error> {
        match self {
            Self::Idle(mode) => Ok(Self::Refreshing(mode)),
            Self::Refreshing(_) => Err(Error::Busy),
            Self::Error => Err(Error::Faulted),
            Self::Uninitialized => Err(not_open()),
        }
    }

    /// The in-flight refresh completed
    pub fn refresh_completed(self) -> Self {
        match self {
            Self::Refreshing(mode) => Self::Idle(mode),
            other => other,
        }
    }

    /// The panel faulted
    pub fn faulted(self) -> Self {
        log::trace!("{self:?} -> Error");
        Self::Error
    }

    /// The session was released
    pub fn released(self) -> Self {
        Self::Uninitialized
    }
}

fn not_open() -> Error {
    Error::InitializationFailed {
        reason: "session is not open".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_enters_idle_with_default_mode() {
        let state = PanelState::default().opened(RefreshMode::Gc16);
        assert_eq!(state, PanelState::Idle(RefreshMode::Gc16));
        assert!(state.is_ready());
    }

    #[test]
    fn test_mode_sequence_tracks_last_accepted() {
        let mut state = PanelState::Idle(RefreshMode::Gc16);
        for mode in [RefreshMode::Du, RefreshMode::A2, RefreshMode::Partial] {
            state = state.mode_changed(mode).unwrap();
        }
        assert_eq!(state.mode(), Some(RefreshMode::Partial));
    }

    #[test]
    fn test_refresh_cycle() {
        let idle = PanelState::Idle(RefreshMode::Du);
        let refreshing = idle.begin_refresh().unwrap();
        assert_eq!(refreshing, PanelState::Refreshing(RefreshMode::Du));
        assert!(matches!(refreshing.begin_refresh(), Err(Error::Busy)));
        assert!(matches!(
            refreshing.mode_changed(RefreshMode::A2),
            Err(Error::Busy)
        ));
        assert_eq!(refreshing.refresh_completed(), idle);
    }

    #[test]
    fn test_error_state_blocks_work_until_released() {
        let state = PanelState::Refreshing(RefreshMode::Gc16).faulted();
        assert_eq!(state.mode(), None);
        assert!(matches!(state.begin_refresh(), Err(Error::Faulted)));
        assert!(matches!(
            state.mode_changed(RefreshMode::Du),
            Err(Error::Faulted)
        ));
        assert_eq!(state.released(), PanelState::Uninitialized);
    }

    #[test]
    fn test_uninitialized_rejects_work() {
        let state = PanelState::Uninitialized;
        assert!(state.begin_refresh().is_err());
        assert!(state.mode_changed(RefreshMode::Du).is_err());
        assert_eq!(state.refresh_completed(), PanelState::Uninitialized);
    }
}
