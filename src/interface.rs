//! Hardware interface abstraction
//!
//! This module provides the two driver seams used by the controller:
//!
//! - [`PanelDevice`]: probes for the panel and opens it
//! - [`PanelInterface`]: an open handle that takes commands and data,
//!   reports status and waits for the panel to finish a waveform
//!
//! [`NodeDevice`] and [`NodeInterface`] implement them over a platform device
//! node (by default `/dev/eink-panel`, falling back to `/dev/epd`). The
//! [`mock`](crate::mock) module provides an in-memory implementation for tests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use eink_controller::{command, NodeDevice, PanelDevice, PanelInterface, StdDelay};
//!
//! let device = NodeDevice::new(["/dev/eink-panel", "/dev/epd"]);
//! if !device.probe() {
//!     return;
//! }
//! let mut interface = match device.open() {
//!     Ok(interface) => interface,
//!     Err(_) => return,
//! };
//!
//! // Trigger a full refresh with the GC16 waveform
//! let _ = interface.send_command(command::REFRESH_FULL);
//! let _ = interface.send_data(&[2]);
//! let _ = interface.flush();
//!
//! // Wait for the panel to settle
//! let _ = interface.busy_wait(&mut StdDelay);
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::command::{READ_STATUS, STATUS_BUSY};
use crate::config::DEFAULT_BUSY_TIMEOUT_MS;
use crate::error::Error;

/// Trait for an open handle to the panel
///
/// This trait abstracts over the transport, allowing the
/// [`RefreshScheduler`](crate::RefreshScheduler) to drive a real device node
/// or the in-memory mock.
pub trait PanelInterface {
    /// Error type for interface operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a command opcode to the panel
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn send_command(&mut self, command: u8) -> Result<(), Self::Error>;

    /// Send data bytes belonging to the last command
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn send_data(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Read one status byte
    ///
    /// After [`SET_WAVEFORM`](crate::command::SET_WAVEFORM) this is the
    /// ACK/NAK reply; otherwise it is the panel's current state
    /// ([`STATUS_IDLE`](crate::command::STATUS_IDLE),
    /// [`STATUS_BUSY`](crate::command::STATUS_BUSY) or
    /// [`STATUS_FAULT`](crate::command::STATUS_FAULT)).
    ///
    /// # Errors
    ///
    /// Returns an error if the panel does not answer.
    fn read_status(&mut self) -> Result<u8, Self::Error>;

    /// Push buffered commands to the hardware
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Wait until the panel is no longer busy
    ///
    /// Returns the terminal status byte, which is
    /// [`STATUS_IDLE`](crate::command::STATUS_IDLE) on success and
    /// [`STATUS_FAULT`](crate::command::STATUS_FAULT) when the waveform failed.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the panel stays busy past the
    /// implementation-specific timeout.
    fn busy_wait<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, Self::Error>;
}

/// Trait for something that can be probed for and opened as a panel
pub trait PanelDevice {
    /// Handle type returned by [`PanelDevice::open`]
    type Interface: PanelInterface;

    /// Check whether the panel is present, without opening it
    fn probe(&self) -> bool;

    /// Open the panel
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no panel is present and
    /// [`Error::PermissionDenied`] if access is refused.
    fn open(&self) -> Result<Self::Interface, Error>;
}

/// Errors that can occur at the device-node level
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    /// Read or write on the device node failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Timeout waiting for the panel to leave the busy state
    #[error("Timeout waiting for display")]
    Timeout,
    /// The panel reported [`STATUS_FAULT`](crate::command::STATUS_FAULT)
    #[error("Panel reported a fault")]
    PanelFault,
    /// The panel answered with a byte that is not valid here
    #[error("Unexpected reply 0x{0:02X}")]
    UnexpectedReply(u8),
}

/// [`DelayNs`] backed by [`std::thread::sleep`]
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Panel exposed as a platform device node
#[derive(Clone, Debug)]
pub struct NodeDevice {
    /// Paths tried in order
    paths: Vec<PathBuf>,
    /// Timeout handed to each opened [`NodeInterface`]
    busy_timeout_ms: u32,
}

impl NodeDevice {
    /// Create a device that tries `paths` in order
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Set the busy-wait timeout in milliseconds
    ///
    /// Default is 30,000ms (30 seconds). Set to 0 to disable timeout.
    pub fn with_busy_timeout(mut self, timeout_ms: u32) -> Self {
        self.busy_timeout_ms = timeout_ms;
        self
    }

    /// Paths tried in order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl PanelDevice for NodeDevice {
    type Interface = NodeInterface;

    fn probe(&self) -> bool {
        self.paths.iter().any(|path| path.exists())
    }

    fn open(&self) -> Result<NodeInterface, Error> {
        let mut denied = None;
        for path in &self.paths {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    log::info!("Opened device: {}", path.display());
                    return Ok(NodeInterface::new(file, path.clone(), self.busy_timeout_ms));
                }
                Err(e) => {
                    log::debug!("Failed to open {}: {e}", path.display());
                    if e.kind() == io::ErrorKind::PermissionDenied && denied.is_none() {
                        denied = Some(path.clone());
                    }
                }
            }
        }

        match denied {
            Some(path) => Err(Error::PermissionDenied { path }),
            None => Err(Error::DeviceUnavailable {
                tried: self.paths.clone(),
            }),
        }
    }
}

/// Open handle to a panel device node
///
/// The file descriptor is closed when the handle is dropped.
#[derive(Debug)]
pub struct NodeInterface {
    /// Device node file
    file: File,
    /// Path the node was opened from
    path: PathBuf,
    /// Timeout for busy-wait in milliseconds
    busy_timeout_ms: u32,
}

impl NodeInterface {
    /// Wrap an already-open device node
    pub fn new(file: File, path: PathBuf, busy_timeout_ms: u32) -> Self {
        Self {
            file,
            path,
            busy_timeout_ms,
        }
    }

    /// Path the node was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current busy-wait timeout in milliseconds
    pub fn busy_timeout(&self) -> u32 {
        self.busy_timeout_ms
    }
}

impl Drop for NodeInterface {
    fn drop(&mut self) {
        log::debug!("Device closed: {}", self.path.display());
    }
}

impl PanelInterface for NodeInterface {
    type Error = InterfaceError;

    fn send_command(&mut self, command: u8) -> Result<(), Self::Error> {
        self.file.write_all(&[command])?;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, Self::Error> {
        let mut status = [0u8; 1];
        self.file.read_exact(&mut status)?;
        Ok(status[0])
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn busy_wait<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, Self::Error> {
        let mut iterations = 0u32;
        let timeout_ms = self.busy_timeout_ms;

        loop {
            self.send_command(READ_STATUS)?;
            let status = self.read_status()?;
            if status != STATUS_BUSY {
                return Ok(status);
            }

            delay.delay_ms(1);
            iterations += 1;
            if timeout_ms > 0 && iterations >= timeout_ms {
                return Err(InterfaceError::Timeout);
            }
        }
    }
}
