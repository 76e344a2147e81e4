//! Application-facing display manager
//!
//! [`DisplayManager`] wraps a [`RefreshScheduler`] for callers that only
//! want to know whether something worked. Every operation returns a plain
//! `bool` (or a count), logs failures, and never returns an error. The kind
//! of the last failure stays available from
//! [`last_error`](DisplayManager::last_error).
//!
//! ## Example
//!
//! ```
//! use eink_controller::mock::MockPanel;
//! use eink_controller::{Builder, Dimensions, DisplayManager, ErrorKind};
//!
//! let dims = match Dimensions::new(32, 16) {
//!     Ok(dims) => dims,
//!     Err(_) => return,
//! };
//! let config = match Builder::new().dimensions(dims).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//! let manager = DisplayManager::new(MockPanel::absent(), config);
//!
//! assert!(!manager.is_device_available());
//! assert!(!manager.initialize());
//! assert_eq!(manager.last_error(), Some(ErrorKind::DeviceUnavailable));
//! ```

use std::sync::{Mutex, PoisonError};

use embedded_hal::delay::DelayNs;
use image::RgbaImage;

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::interface::{NodeDevice, PanelDevice, StdDelay};
use crate::mode::RefreshMode;
use crate::preprocess;
use crate::scheduler::{RefreshKind, RefreshScheduler};

/// Boolean facade over [`RefreshScheduler`]
pub struct DisplayManager<P, D = StdDelay>
where
    P: PanelDevice,
{
    scheduler: RefreshScheduler<P, D>,
    last_error: Mutex<Option<ErrorKind>>,
}

impl DisplayManager<NodeDevice> {
    /// Manage the device nodes named in `config`
    pub fn from_config(config: Config) -> Self {
        Self::with_scheduler(RefreshScheduler::from_config(config))
    }
}

impl<P> DisplayManager<P>
where
    P: PanelDevice,
{
    /// Manage `device`
    pub fn new(device: P, config: Config) -> Self {
        Self::with_scheduler(RefreshScheduler::new(device, config))
    }
}

impl<P, D> DisplayManager<P, D>
where
    P: PanelDevice,
    D: DelayNs,
{
    /// Wrap an existing scheduler
    pub fn with_scheduler(scheduler: RefreshScheduler<P, D>) -> Self {
        Self {
            scheduler,
            last_error: Mutex::new(None),
        }
    }

    /// Open the panel; `true` if it is ready
    pub fn initialize(&self) -> bool {
        self.report("Initialize", self.scheduler.initialize())
    }

    /// Close the panel
    pub fn release(&self) {
        self.scheduler.release();
    }

    /// Full refresh; `true` on success
    pub fn full_refresh(&self) -> bool {
        self.report("Full refresh", self.scheduler.full_refresh())
    }

    /// Partial refresh; `true` on success
    pub fn partial_refresh(&self) -> bool {
        self.report("Partial refresh", self.scheduler.partial_refresh())
    }

    /// Clear to white; `true` on success
    pub fn clear_screen(&self) -> bool {
        self.report("Clear screen", self.scheduler.clear_screen())
    }

    /// Switch waveform by raw id (0 = INIT through 6 = PARTIAL)
    ///
    /// Returns `false` for ids outside that range without touching the panel.
    pub fn set_refresh_mode(&self, mode: i32) -> bool {
        let result = RefreshMode::try_from(mode)
            .and_then(|mode| self.scheduler.set_refresh_mode(mode));
        self.report("Set refresh mode", result)
    }

    /// Preprocess and show an image; `true` on success
    pub fn show_image(&self, image: &RgbaImage, kind: RefreshKind) -> bool {
        self.report("Show image", self.scheduler.show_image(image, kind))
    }

    /// Show the built-in test pattern; `true` on success
    #[cfg(feature = "graphics")]
    pub fn show_test_pattern(&self) -> bool {
        self.report("Test pattern", self.scheduler.show_test_pattern())
    }

    /// Refreshes completed in the current session
    pub fn refresh_count(&self) -> u64 {
        self.scheduler.refresh_count()
    }

    /// Whether the panel is open or can be found
    pub fn is_device_available(&self) -> bool {
        self.scheduler.is_device_available()
    }

    /// Filter a bitmap for e-ink display
    ///
    /// Pure; does not need the panel.
    pub fn optimize_bitmap(&self, source: &RgbaImage) -> RgbaImage {
        preprocess::optimize_bitmap(source)
    }

    /// Kind of the most recent failure, cleared by the next success
    pub fn last_error(&self) -> Option<ErrorKind> {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The wrapped scheduler
    pub fn scheduler(&self) -> &RefreshScheduler<P, D> {
        &self.scheduler
    }

    fn report(&self, operation: &str, result: Result<(), Error>) -> bool {
        let outcome = match &result {
            Ok(()) => {
                log::debug!("{operation}: success");
                None
            }
            Err(err) => {
                log::error!("{operation} failed: {err}");
                Some(err.kind())
            }
        };
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = outcome;
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::command::{REFRESH_FULL, REFRESH_PARTIAL, SET_WAVEFORM};
    use crate::config::{Builder, Dimensions};
    use crate::mock::MockPanel;

    fn manager(panel: &MockPanel) -> DisplayManager<MockPanel> {
        let config = Builder::new()
            .dimensions(Dimensions::new(8, 8).unwrap())
            .build()
            .unwrap();
        DisplayManager::new(panel.clone(), config)
    }

    #[test]
    fn test_operations_report_success() {
        let panel = MockPanel::new();
        let manager = manager(&panel);

        assert!(manager.initialize());
        assert!(manager.full_refresh());
        assert!(manager.partial_refresh());
        assert!(manager.clear_screen());
        assert_eq!(manager.refresh_count(), 3);
        assert_eq!(manager.last_error(), None);
    }

    #[test]
    fn test_out_of_range_mode_is_rejected_locally() {
        let panel = MockPanel::new();
        let manager = manager(&panel);

        assert!(!manager.set_refresh_mode(7));
        assert!(!manager.set_refresh_mode(-1));
        assert_eq!(manager.last_error(), Some(ErrorKind::InvalidMode));
        assert_eq!(panel.open_count(), 0);
    }

    #[test]
    fn test_mode_by_id() {
        let panel = MockPanel::new();
        let manager = manager(&panel);

        assert!(manager.set_refresh_mode(4));
        assert!(manager.partial_refresh());
        assert_eq!(
            panel.commands(),
            vec![
                (SET_WAVEFORM, vec![2]),
                (SET_WAVEFORM, vec![4]),
                (REFRESH_PARTIAL, vec![4]),
            ]
        );
    }

    #[test]
    fn test_failure_is_remembered_until_next_success() {
        let panel = MockPanel::new();
        let manager = manager(&panel);

        panel.fail_next_refresh();
        assert!(!manager.full_refresh());
        assert_eq!(manager.last_error(), Some(ErrorKind::HardwareFault));
        assert!(!manager.partial_refresh());
        assert_eq!(manager.last_error(), Some(ErrorKind::Faulted));

        assert!(manager.initialize());
        assert_eq!(manager.last_error(), None);
        assert!(manager.full_refresh());
        assert_eq!(
            panel.refreshes().last(),
            Some(&(REFRESH_FULL, vec![2]))
        );
    }

    #[test]
    fn test_unavailable_device() {
        let manager = manager(&MockPanel::absent());
        assert!(!manager.is_device_available());
        assert!(!manager.full_refresh());
        assert_eq!(manager.refresh_count(), 0);
        assert_eq!(manager.last_error(), Some(ErrorKind::DeviceUnavailable));
    }

    #[test]
    fn test_show_image_checks_size() {
        let panel = MockPanel::new();
        let manager = manager(&panel);

        let fits = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        assert!(manager.show_image(&fits, RefreshKind::Full));

        let too_wide = RgbaImage::from_pixel(9, 8, Rgba([0, 0, 0, 255]));
        assert!(!manager.show_image(&too_wide, RefreshKind::Full));
        assert_eq!(manager.last_error(), Some(ErrorKind::FrameMismatch));
    }

    #[test]
    fn test_optimize_bitmap_without_panel() {
        let manager = manager(&MockPanel::absent());
        let source = RgbaImage::from_pixel(3, 3, Rgba([10, 200, 30, 128]));
        let out = manager.optimize_bitmap(&source);
        assert_eq!(out.dimensions(), (3, 3));
        assert_eq!(out, manager.optimize_bitmap(&source));
        assert!(out.pixels().all(|p| p.0[3] == 128));
    }
}
