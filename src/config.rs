//! Controller configuration types and builder

use std::path::PathBuf;

pub use crate::error::{BuilderError, MAX_PANEL_EDGE};
use crate::frame::PixelDepth;
use crate::mode::RefreshMode;

/// Primary device node for the panel
pub const DEFAULT_DEVICE_PATH: &str = "/dev/eink-panel";

/// Device node tried when [`DEFAULT_DEVICE_PATH`] cannot be opened
pub const FALLBACK_DEVICE_PATH: &str = "/dev/epd";

/// Default timeout for busy-wait in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 30_000;

/// Partial refreshes allowed before a cleanup pass is appended
pub const DEFAULT_GHOSTING_THRESHOLD: u32 = 10;

/// Panel dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
}

impl Dimensions {
    /// Create new dimensions with validation
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidDimensions` if either edge is zero or
    /// larger than [`MAX_PANEL_EDGE`].
    pub fn new(width: u16, height: u16) -> Result<Self, BuilderError> {
        if width == 0 || width > MAX_PANEL_EDGE || height == 0 || height > MAX_PANEL_EDGE {
            return Err(BuilderError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// Calculate the packed frame size in bytes at the given depth
    pub fn buffer_size(&self, depth: PixelDepth) -> usize {
        depth.stride(self.width as u32) * self.height as usize
    }
}

/// What a refresh does when another one is already in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Wait for the in-flight refresh to finish, then run
    #[default]
    Block,
    /// Fail immediately with [`Error::Busy`](crate::Error::Busy)
    Reject,
}

/// Controller configuration
///
/// Use `Builder` to create a Config.
#[derive(Clone, Debug)]
pub struct Config {
    /// Panel dimensions
    pub dimensions: Dimensions,
    /// Device node paths, tried in order
    pub device_paths: Vec<PathBuf>,
    /// Mode applied when a session opens
    pub default_mode: RefreshMode,
    /// Behavior on concurrent refresh requests
    pub busy_policy: BusyPolicy,
    /// Timeout for busy-wait in milliseconds (0 disables the timeout)
    pub busy_timeout_ms: u32,
    /// Consecutive partial refreshes before a cleanup pass (`None` disables)
    pub ghosting_threshold: Option<u32>,
    /// Pixel depth frames are uploaded at
    pub frame_depth: PixelDepth,
}

/// Builder for constructing controller configuration
///
/// # Example
///
/// ```
/// use eink_controller::{Builder, BusyPolicy, Dimensions, RefreshMode};
///
/// let dims = match Dimensions::new(1404, 1872) {
///     Ok(dims) => dims,
///     Err(_) => return,
/// };
/// let config = match Builder::new()
///     .dimensions(dims)
///     .default_mode(RefreshMode::Gl16)
///     .busy_policy(BusyPolicy::Reject)
///     .build()
/// {
///     Ok(config) => config,
///     Err(_) => return,
/// };
/// assert_eq!(config.device_paths.len(), 2);
/// ```
#[must_use]
pub struct Builder {
    dimensions: Option<Dimensions>,
    device_paths: Vec<PathBuf>,
    default_mode: RefreshMode,
    busy_policy: BusyPolicy,
    busy_timeout_ms: u32,
    ghosting_threshold: Option<u32>,
    frame_depth: PixelDepth,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            dimensions: None,
            device_paths: vec![
                PathBuf::from(DEFAULT_DEVICE_PATH),
                PathBuf::from(FALLBACK_DEVICE_PATH),
            ],
            default_mode: RefreshMode::Gc16,
            busy_policy: BusyPolicy::Block,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            ghosting_threshold: Some(DEFAULT_GHOSTING_THRESHOLD),
            frame_depth: PixelDepth::Bpp4,
        }
    }
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set panel dimensions (required)
    pub fn dimensions(mut self, dims: Dimensions) -> Self {
        self.dimensions = Some(dims);
        self
    }

    /// Replace the device node search list
    pub fn device_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.device_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the mode applied when a session opens
    pub fn default_mode(mut self, mode: RefreshMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Set the concurrent refresh policy
    pub fn busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Set the busy-wait timeout in milliseconds
    ///
    /// Default is 30,000ms (30 seconds). Set to 0 to disable timeout.
    pub fn busy_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.busy_timeout_ms = timeout_ms;
        self
    }

    /// Set how many partial refreshes run before a cleanup pass
    ///
    /// `None` disables automatic cleanup.
    pub fn ghosting_threshold(mut self, threshold: Option<u32>) -> Self {
        self.ghosting_threshold = threshold;
        self
    }

    /// Set the pixel depth frames are uploaded at
    pub fn frame_depth(mut self, depth: PixelDepth) -> Self {
        self.frame_depth = depth;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::MissingDimensions` if dimensions were not set,
    /// `BuilderError::NoDevicePaths` if the device path list is empty.
    pub fn build(self) -> Result<Config, BuilderError> {
        if self.device_paths.is_empty() {
            return Err(BuilderError::NoDevicePaths);
        }
        Ok(Config {
            dimensions: self.dimensions.ok_or(BuilderError::MissingDimensions)?,
            device_paths: self.device_paths,
            default_mode: self.default_mode,
            busy_policy: self.busy_policy,
            busy_timeout_ms: self.busy_timeout_ms,
            ghosting_threshold: self.ghosting_threshold,
            frame_depth: self.frame_depth,
        })
    }
}
