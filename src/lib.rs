//! E-ink Panel Refresh Controller
//!
//! Drives an e-ink panel exposed by the platform as a device node: opens the
//! session, switches waveforms, serializes full, partial and clear refreshes,
//! counts them, and prepares bitmaps so they render well on a grayscale panel.
//!
//! ## Features
//!
//! - Waveform modes from INIT to A2 with a tracked mode state machine
//! - One refresh at a time, with a blocking or rejecting busy policy
//! - Lazy session opening and automatic anti-ghosting cleanup
//! - Grayscale, contrast and ordered-dither preprocessing on `image` bitmaps
//! - `embedded-graphics` integration (with `graphics` feature)
//! - In-memory [`mock`] panel for testing without hardware
//! - `einkctl` command-line tool (with `cli` feature)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use eink_controller::{Builder, Dimensions, RefreshMode, RefreshScheduler};
//!
//! let dims = match Dimensions::new(1404, 1872) {
//!     Ok(dims) => dims,
//!     Err(_) => return,
//! };
//! let config = match Builder::new().dimensions(dims).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//!
//! let scheduler = RefreshScheduler::from_config(config);
//! if scheduler.initialize().is_err() {
//!     return;
//! }
//! let _ = scheduler.set_refresh_mode(RefreshMode::Du);
//! let _ = scheduler.partial_refresh();
//! scheduler.release();
//! ```
//!
//! Applications that just want success flags can use [`DisplayManager`]
//! instead, which logs failures and keeps the last [`ErrorKind`].

/// Device-node command definitions
pub mod command;
/// Controller configuration types and builder
pub mod config;
/// Error types for the controller
pub mod error;
/// Packed frame buffers
pub mod frame;
/// Hardware interface abstraction
pub mod interface;
/// Boolean facade for applications
pub mod manager;
/// In-memory panel for tests
pub mod mock;
/// Waveform refresh modes
pub mod mode;
/// Bitmap preprocessing for e-ink
pub mod preprocess;
/// Serialized refresh scheduling
pub mod scheduler;
/// Device session lifecycle
pub mod session;
/// Refresh-mode state machine
pub mod state;

/// Graphics support via embedded-graphics (requires `graphics` feature)
#[cfg(feature = "graphics")]
pub mod graphics;

pub use config::{Builder, BusyPolicy, Config, DEFAULT_BUSY_TIMEOUT_MS, Dimensions};
pub use error::{BuilderError, Error, ErrorKind};
pub use frame::{Frame, PixelDepth};
pub use interface::{
    InterfaceError, NodeDevice, NodeInterface, PanelDevice, PanelInterface, StdDelay,
};
pub use manager::DisplayManager;
pub use mode::RefreshMode;
pub use scheduler::{RefreshKind, RefreshRequest, RefreshScheduler};
pub use session::DeviceSession;
pub use state::PanelState;
