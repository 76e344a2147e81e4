//! Device-node command definitions
//!
//! This module defines the opcode and status bytes spoken over the panel's
//! device node. Every command is a single opcode byte written to the node,
//! followed by zero or more data bytes.
//!
//! ## Command Structure
//!
//! 1. Write the opcode byte
//! 2. Write the data bytes (if any)
//! 3. For refresh-class commands, flush and poll [`READ_STATUS`] until the
//!    panel is no longer [`STATUS_BUSY`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use eink_controller::{command, PanelInterface, RefreshMode};
//! # fn demo<I: PanelInterface>(interface: &mut I) -> Result<(), I::Error> {
//! // Select the GC16 waveform and read the acknowledgement
//! interface.send_command(command::SET_WAVEFORM)?;
//! interface.send_data(&[RefreshMode::Gc16.waveform_id()])?;
//! let ack = interface.read_status()?;
//! assert_eq!(ack, command::ACK);
//! # Ok(())
//! # }
//! ```

// Mode commands

/// Select waveform command (0x10)
///
/// Requires 1 byte: the waveform identifier (see [`crate::RefreshMode`]).
/// The panel replies with a single [`ACK`] or [`NAK`] status byte.
pub const SET_WAVEFORM: u8 = 0x10;

// Refresh commands

/// Full refresh command (0x20)
///
/// Rewrites every pixel with the given waveform. Clears ghosting.
/// Requires 1 byte: waveform identifier.
pub const REFRESH_FULL: u8 = 0x20;

/// Partial refresh command (0x21)
///
/// Updates only pixels that changed since the previous refresh.
/// Requires 1 byte: waveform identifier.
pub const REFRESH_PARTIAL: u8 = 0x21;

/// Clear command (0x22)
///
/// Drives every pixel to a uniform level.
/// Requires 2 bytes: [waveform identifier, fill level]
pub const CLEAR: u8 = 0x22;

/// Write frame command (0x24)
///
/// Uploads a packed frame into panel memory without refreshing.
/// Requires a 5-byte header [width_LSB, width_MSB, height_LSB, height_MSB, bpp]
/// followed by `height * stride` bytes of pixel data.
pub const WRITE_FRAME: u8 = 0x24;

// Status commands

/// Read status command (0x30)
///
/// The panel replies with one status byte.
pub const READ_STATUS: u8 = 0x30;

/// Panel is idle and ready for the next command
pub const STATUS_IDLE: u8 = 0x00;

/// Panel is still driving a waveform
pub const STATUS_BUSY: u8 = 0x01;

/// Panel reported a failure while executing the last command
pub const STATUS_FAULT: u8 = 0xFF;

/// Command accepted
pub const ACK: u8 = 0x06;

/// Command refused (e.g. unsupported waveform)
pub const NAK: u8 = 0x15;

/// Fill level written by [`CLEAR`] (white)
pub const CLEAR_FILL_WHITE: u8 = 0xFF;

/// Size of the [`WRITE_FRAME`] header in bytes
pub const FRAME_HEADER_LEN: usize = 5;

/// Whether an opcode starts a waveform on the panel
pub fn is_refresh(command: u8) -> bool {
    matches!(command, REFRESH_FULL | REFRESH_PARTIAL | CLEAR)
}

/// Encode the [`WRITE_FRAME`] header
pub fn frame_header(width: u16, height: u16, bits_per_pixel: u8) -> [u8; FRAME_HEADER_LEN] {
    let [w_lo, w_hi] = width.to_le_bytes();
    let [h_lo, h_hi] = height.to_le_bytes();
    [w_lo, w_hi, h_lo, h_hi, bits_per_pixel]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_opcodes() {
        assert!(is_refresh(REFRESH_FULL));
        assert!(is_refresh(REFRESH_PARTIAL));
        assert!(is_refresh(CLEAR));
        assert!(!is_refresh(SET_WAVEFORM));
        assert!(!is_refresh(WRITE_FRAME));
        assert!(!is_refresh(READ_STATUS));
    }

    #[test]
    fn test_frame_header_is_little_endian() {
        assert_eq!(frame_header(1404, 1872, 4), [0x7C, 0x05, 0x50, 0x07, 4]);
    }
}
