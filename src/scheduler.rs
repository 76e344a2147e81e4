//! Serialized refresh scheduling
//!
//! [`RefreshScheduler`] is the thread-safe entry point to the panel. It keeps
//! the [`DeviceSession`] behind a mutex so that at most one refresh, mode
//! change, open or close runs at a time, whatever thread the calls come from.
//!
//! A refresh on a closed session opens it first. A refresh that finds the
//! session in the error state fails with [`Error::Faulted`] until
//! [`initialize`](RefreshScheduler::initialize) opens it again.
//!
//! ## Example
//!
//! ```
//! use eink_controller::mock::MockPanel;
//! use eink_controller::{Builder, Dimensions, RefreshMode, RefreshScheduler};
//!
//! let dims = match Dimensions::new(16, 16) {
//!     Ok(dims) => dims,
//!     Err(_) => return,
//! };
//! let config = match Builder::new().dimensions(dims).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//! let scheduler = RefreshScheduler::new(MockPanel::new(), config);
//!
//! // The first refresh opens the device
//! assert!(scheduler.full_refresh().is_ok());
//! assert!(scheduler.set_refresh_mode(RefreshMode::Du).is_ok());
//! assert!(scheduler.partial_refresh().is_ok());
//! assert_eq!(scheduler.refresh_count(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use embedded_hal::delay::DelayNs;
use image::RgbaImage;

use crate::command::{self, CLEAR, CLEAR_FILL_WHITE, REFRESH_FULL, REFRESH_PARTIAL, WRITE_FRAME};
use crate::config::{BusyPolicy, Config};
use crate::error::Error;
use crate::frame::Frame;
use crate::interface::{InterfaceError, NodeDevice, PanelDevice, PanelInterface, StdDelay};
use crate::mode::RefreshMode;
use crate::preprocess;
use crate::session::DeviceSession;
use crate::state::PanelState;

/// Kind of refresh to perform
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshKind {
    /// Redraw the whole panel
    Full,
    /// Redraw only what changed
    Partial,
    /// Drive the panel to white
    Clear,
}

impl core::fmt::Display for RefreshKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::Clear => "clear",
        })
    }
}

/// A refresh and the waveform it runs with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshRequest {
    /// What to refresh
    pub kind: RefreshKind,
    /// Waveform to drive
    pub mode: RefreshMode,
}

impl RefreshRequest {
    /// Build a request
    ///
    /// Clears always run with [`RefreshMode::Init`].
    pub fn new(kind: RefreshKind, mode: RefreshMode) -> Self {
        let mode = match kind {
            RefreshKind::Clear => RefreshMode::Init,
            RefreshKind::Full | RefreshKind::Partial => mode,
        };
        Self { kind, mode }
    }

    /// Opcode that starts this refresh
    pub fn command(&self) -> u8 {
        match self.kind {
            RefreshKind::Full => REFRESH_FULL,
            RefreshKind::Partial => REFRESH_PARTIAL,
            RefreshKind::Clear => CLEAR,
        }
    }

    /// Write the opcode and its arguments
    pub fn send<I: PanelInterface>(&self, interface: &mut I) -> Result<(), I::Error> {
        interface.send_command(self.command())?;
        match self.kind {
            RefreshKind::Clear => interface.send_data(&[self.mode.waveform_id(), CLEAR_FILL_WHITE]),
            RefreshKind::Full | RefreshKind::Partial => {
                interface.send_data(&[self.mode.waveform_id()])
            }
        }
    }
}

struct Inner<I, D>
where
    I: PanelInterface,
{
    session: DeviceSession<I>,
    delay: D,
}

/// Thread-safe refresh controller
///
/// All operations take `&self`; share it across threads with an `Arc`.
pub struct RefreshScheduler<P, D = StdDelay>
where
    P: PanelDevice,
{
    /// Device the session is opened from
    device: P,
    /// Controller configuration
    config: Config,
    /// Session and delay, locked for the whole of each operation
    inner: Mutex<Inner<P::Interface, D>>,
    /// Mirror of the session's refresh count, readable without the lock
    refresh_count: AtomicU64,
}

impl RefreshScheduler<NodeDevice> {
    /// Create a scheduler for the device nodes named in `config`
    pub fn from_config(config: Config) -> Self {
        let device = NodeDevice::new(config.device_paths.iter().cloned())
            .with_busy_timeout(config.busy_timeout_ms);
        Self::new(device, config)
    }
}

impl<P> RefreshScheduler<P>
where
    P: PanelDevice,
{
    /// Create a scheduler that sleeps the calling thread while the panel is busy
    pub fn new(device: P, config: Config) -> Self {
        Self::with_delay(device, config, StdDelay)
    }
}

impl<P, D> RefreshScheduler<P, D>
where
    P: PanelDevice,
    D: DelayNs,
{
    /// Create a scheduler with a custom delay provider
    pub fn with_delay(device: P, config: Config, delay: D) -> Self {
        Self {
            device,
            config,
            inner: Mutex::new(Inner {
                session: DeviceSession::new(),
                delay,
            }),
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Open the device and apply the default mode
    ///
    /// Does nothing if the session is already open. From the error state the
    /// device is closed and opened again. Always waits for the lock,
    /// whatever the busy policy.
    pub fn initialize(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.session.state().is_ready() {
            log::debug!("Already initialized");
            return Ok(());
        }
        self.open_session(&mut inner.session)
    }

    /// Close the device
    ///
    /// Safe to call in any state, including when nothing is open. The refresh
    /// count drops back to zero.
    pub fn release(&self) {
        let mut inner = self.lock();
        if inner.session.close() {
            log::info!("E-ink controller released");
        }
        self.refresh_count.store(0, Ordering::Release);
    }

    /// Redraw the whole panel with the active mode
    pub fn full_refresh(&self) -> Result<(), Error> {
        self.run(RefreshKind::Full, None)
    }

    /// Redraw changed regions with the active mode
    ///
    /// Every `ghosting_threshold`-th consecutive partial refresh is followed
    /// by a full pass with [`RefreshMode::Full`] within the same request.
    pub fn partial_refresh(&self) -> Result<(), Error> {
        self.run(RefreshKind::Partial, None)
    }

    /// Drive the panel to white with the [`RefreshMode::Init`] waveform
    pub fn clear_screen(&self) -> Result<(), Error> {
        self.run(RefreshKind::Clear, None)
    }

    /// Switch to `mode` for subsequent refreshes
    ///
    /// The active mode only changes once the panel acknowledges.
    pub fn set_refresh_mode(&self, mode: RefreshMode) -> Result<(), Error> {
        let mut inner = self.lock_for_work()?;
        self.ensure_open(&mut inner.session)?;
        match inner.session.set_mode(mode) {
            Ok(()) => {
                log::info!("Refresh mode set to {mode}");
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to set refresh mode {mode}: {err}");
                Err(err)
            }
        }
    }

    /// Upload `frame` and refresh
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameMismatch`] without touching the device if the
    /// frame is not the panel's size.
    pub fn display(&self, frame: &Frame, kind: RefreshKind) -> Result<(), Error> {
        let dims = self.config.dimensions;
        if frame.width() != u32::from(dims.width) || frame.height() != u32::from(dims.height) {
            return Err(Error::FrameMismatch {
                expected_width: dims.width,
                expected_height: dims.height,
                provided_width: frame.width(),
                provided_height: frame.height(),
            });
        }
        self.run(kind, Some(frame))
    }

    /// Preprocess an RGBA image at the configured depth and display it
    pub fn show_image(&self, image: &RgbaImage, kind: RefreshKind) -> Result<(), Error> {
        let frame = preprocess::prepare(image, self.config.frame_depth);
        self.display(&frame, kind)
    }

    /// Display the built-in gray-ramp test pattern with a full refresh
    #[cfg(feature = "graphics")]
    pub fn show_test_pattern(&self) -> Result<(), Error> {
        let frame = crate::graphics::test_pattern(self.config.dimensions, self.config.frame_depth);
        self.display(&frame, RefreshKind::Full)
    }

    /// Refreshes completed in the current session
    ///
    /// Never waits for an in-flight refresh.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Acquire)
    }

    /// Whether the panel can be used
    ///
    /// True while a session is open. Otherwise probes the device without
    /// opening it. Reports `true` while another operation holds the session.
    pub fn is_device_available(&self) -> bool {
        let open = match self.inner.try_lock() {
            Ok(inner) => inner.session.is_open(),
            Err(TryLockError::Poisoned(poisoned)) => self.recover(poisoned).session.is_open(),
            Err(TryLockError::WouldBlock) => return true,
        };
        open || self.device.probe()
    }

    /// Current session state
    pub fn state(&self) -> PanelState {
        self.lock().session.state()
    }

    /// Active mode, if a healthy session is open
    pub fn current_mode(&self) -> Option<RefreshMode> {
        self.lock().session.current_mode()
    }

    /// Consecutive partial refreshes since the last full refresh or clear
    pub fn partials_since_full(&self) -> u32 {
        self.lock().session.partials_since_full()
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the underlying device
    pub fn device(&self) -> &P {
        &self.device
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P::Interface, D>> {
        self.inner.lock().unwrap_or_else(|poisoned| self.recover(poisoned))
    }

    /// Take the lock back after a panic unwound through an operation
    ///
    /// A refresh interrupted mid-waveform leaves the panel in an unknown
    /// state, so the session is faulted and must be re-initialized.
    fn recover<'a>(
        &self,
        poisoned: PoisonError<MutexGuard<'a, Inner<P::Interface, D>>>,
    ) -> MutexGuard<'a, Inner<P::Interface, D>> {
        let mut inner = poisoned.into_inner();
        if matches!(inner.session.state(), PanelState::Refreshing(_)) {
            log::warn!("Refresh was interrupted, marking session faulted");
            inner.session.fault();
        }
        self.inner.clear_poison();
        inner
    }

    fn lock_for_work(&self) -> Result<MutexGuard<'_, Inner<P::Interface, D>>, Error> {
        match self.config.busy_policy {
            BusyPolicy::Block => Ok(self.lock()),
            BusyPolicy::Reject => match self.inner.try_lock() {
                Ok(inner) => Ok(inner),
                Err(TryLockError::Poisoned(poisoned)) => Ok(self.recover(poisoned)),
                Err(TryLockError::WouldBlock) => {
                    log::warn!("Panel busy, request rejected");
                    Err(Error::Busy)
                }
            },
        }
    }

    fn open_session(&self, session: &mut DeviceSession<P::Interface>) -> Result<(), Error> {
        let result = session.open(&self.device, self.config.default_mode);
        self.refresh_count
            .store(session.refresh_count(), Ordering::Release);
        match result {
            Ok(()) => {
                log::info!("E-ink controller initialized");
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to initialize e-ink controller: {err}");
                Err(err)
            }
        }
    }

    fn ensure_open(&self, session: &mut DeviceSession<P::Interface>) -> Result<(), Error> {
        if session.is_open() {
            return Ok(());
        }
        log::warn!("Device not open, attempting to open");
        self.open_session(session)
    }

    fn run(&self, kind: RefreshKind, frame: Option<&Frame>) -> Result<(), Error> {
        let mut guard = self.lock_for_work()?;
        let Inner { session, delay } = &mut *guard;
        self.ensure_open(session)?;

        let mode = session.begin_refresh()?;
        let request = RefreshRequest::new(kind, mode);
        let partials = session.partials_since_full().saturating_add(1);
        let cleanup = kind == RefreshKind::Partial
            && self
                .config
                .ghosting_threshold
                .is_some_and(|threshold| partials >= threshold);

        let result = session.interface_mut().and_then(|interface| {
            if let Some(frame) = frame {
                upload(interface, frame)?;
            }
            drive(interface, request, delay)?;
            if cleanup {
                log::info!("Running full refresh after {partials} partial refreshes");
                drive(
                    interface,
                    RefreshRequest::new(RefreshKind::Full, RefreshMode::Full),
                    delay,
                )?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                let count = session.complete_refresh(kind != RefreshKind::Partial || cleanup);
                self.refresh_count.store(count, Ordering::Release);
                log::debug!("{kind} refresh ({}) complete, count {count}", request.mode);
                Ok(())
            }
            Err(err) => {
                session.fault();
                log::error!("{kind} refresh failed: {err}");
                Err(err)
            }
        }
    }
}

fn upload<I: PanelInterface>(interface: &mut I, frame: &Frame) -> Result<(), Error> {
    let header = command::frame_header(
        frame.width() as u16,
        frame.height() as u16,
        frame.depth().bits(),
    );
    interface
        .send_command(WRITE_FRAME)
        .map_err(Error::hardware)?;
    interface.send_data(&header).map_err(Error::hardware)?;
    interface.send_data(frame.data()).map_err(Error::hardware)
}

fn drive<I, D>(interface: &mut I, request: RefreshRequest, delay: &mut D) -> Result<(), Error>
where
    I: PanelInterface,
    D: DelayNs,
{
    request.send(interface).map_err(Error::hardware)?;
    interface.flush().map_err(Error::hardware)?;
    match interface.busy_wait(delay).map_err(Error::hardware)? {
        command::STATUS_IDLE => Ok(()),
        command::STATUS_FAULT => Err(Error::hardware(InterfaceError::PanelFault)),
        other => Err(Error::hardware(InterfaceError::UnexpectedReply(other))),
    }
}
