//! Error types for the controller
//!
//! This module defines error types for configuration building ([`BuilderError`])
//! and controller operations ([`Error`]).
//!
//! ## Error Types
//!
//! - [`BuilderError`] - Errors during configuration construction
//! - [`Error`] - Runtime errors during session, mode and refresh operations
//! - [`ErrorKind`] - `Copy` discriminant of [`Error`], kept by the boundary facade
//! - [`InterfaceError`](crate::interface::InterfaceError) - Low-level device-node errors
//!
//! ## Example
//!
//! ```
//! use eink_controller::{Builder, BuilderError, Dimensions};
//!
//! // Missing dimensions
//! let result = Builder::new().build();
//! assert!(matches!(result, Err(BuilderError::MissingDimensions)));
//!
//! // Invalid dimensions
//! let result = Dimensions::new(0, 800);
//! assert!(result.is_err());
//! ```

use std::path::PathBuf;

/// Maximum panel width or height in pixels accepted by [`crate::Dimensions`]
///
/// Bounded by the 16-bit width/height fields of the frame header.
pub const MAX_PANEL_EDGE: u16 = 8192;

/// Boxed error returned by a [`PanelInterface`](crate::PanelInterface)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when talking to the panel
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No e-ink hardware found at any configured device path
    #[error("e-ink device unavailable (tried {} path(s))", tried.len())]
    DeviceUnavailable {
        /// Device paths that were tried, in order
        tried: Vec<PathBuf>,
    },
    /// The device exists but access was refused
    #[error("permission denied opening {}", path.display())]
    PermissionDenied {
        /// Path that refused access
        path: PathBuf,
    },
    /// The device opened but could not be brought to a usable state
    #[error("initialization failed: {reason}")]
    InitializationFailed {
        /// What went wrong
        reason: String,
    },
    /// The requested waveform is unknown or was refused by the panel
    #[error("invalid refresh mode {requested}")]
    InvalidMode {
        /// Raw mode value requested by the caller
        requested: i32,
    },
    /// A mode name did not match any waveform
    #[error("unknown refresh mode name {0:?}")]
    UnknownModeName(String),
    /// Another refresh is in flight and the busy policy is `Reject`
    #[error("a refresh is already in progress")]
    Busy,
    /// The panel accepted a command but failed to carry it out
    #[error("hardware fault: {0}")]
    HardwareFault(#[source] BoxError),
    /// The session is in the error state and must be re-opened
    #[error("session faulted, re-initialize before refreshing")]
    Faulted,
    /// Frame dimensions do not match the panel
    #[error("frame is {provided_width}x{provided_height}, panel is {expected_width}x{expected_height}")]
    FrameMismatch {
        /// Panel width
        expected_width: u16,
        /// Panel height
        expected_height: u16,
        /// Frame width
        provided_width: u32,
        /// Frame height
        provided_height: u32,
    },
}

impl Error {
    /// Wrap a device-level failure
    pub fn hardware<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::HardwareFault(source.into())
    }

    /// The `Copy` discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::InitializationFailed { .. } => ErrorKind::InitializationFailed,
            Self::InvalidMode { .. } | Self::UnknownModeName(_) => ErrorKind::InvalidMode,
            Self::Busy => ErrorKind::Busy,
            Self::HardwareFault(_) => ErrorKind::HardwareFault,
            Self::Faulted => ErrorKind::Faulted,
            Self::FrameMismatch { .. } => ErrorKind::FrameMismatch,
        }
    }
}

/// Coarse classification of [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::DeviceUnavailable`]
    DeviceUnavailable,
    /// See [`Error::PermissionDenied`]
    PermissionDenied,
    /// See [`Error::InitializationFailed`]
    InitializationFailed,
    /// See [`Error::InvalidMode`] and [`Error::UnknownModeName`]
    InvalidMode,
    /// See [`Error::Busy`]
    Busy,
    /// See [`Error::HardwareFault`]
    HardwareFault,
    /// See [`Error::Faulted`]
    Faulted,
    /// See [`Error::FrameMismatch`]
    FrameMismatch,
}

/// Errors that can occur when building configuration
///
/// These errors occur during the builder pattern before the controller is created.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    /// Dimensions were not specified
    ///
    /// [`Builder::dimensions()`](crate::config::Builder::dimensions) must be called before building.
    #[error("Dimensions must be specified")]
    MissingDimensions,
    /// Invalid dimensions provided
    ///
    /// See [`Dimensions::new()`](crate::config::Dimensions::new) for constraints.
    #[error("Invalid dimensions {width}x{height} (max {MAX_PANEL_EDGE}x{MAX_PANEL_EDGE})")]
    InvalidDimensions {
        /// Width in pixels requested
        width: u16,
        /// Height in pixels requested
        height: u16,
    },
    /// No device node path was configured
    #[error("At least one device path must be configured")]
    NoDevicePaths,
}
