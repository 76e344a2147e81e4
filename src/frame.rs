//! Packed frame buffers
//!
//! A [`Frame`] holds gray levels packed MSB-first, several pixels per byte
//! depending on the [`PixelDepth`]. Each row is padded to a whole byte.
//! Level 0 is black and `depth.levels() - 1` is white.
//!
//! ## Example
//!
//! ```
//! use eink_controller::{Frame, PixelDepth};
//!
//! // 8x1 frame at one bit per pixel starts out white
//! let mut frame = Frame::new(8, 1, PixelDepth::Bpp1);
//! assert_eq!(frame.data(), &[0xFF]);
//!
//! // Pixel (0,0) is the most significant bit
//! frame.set(0, 0, 0);
//! assert_eq!(frame.data(), &[0x7F]);
//! ```

/// Bits per pixel of a packed frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelDepth {
    /// 1 bit, black and white
    Bpp1,
    /// 2 bits, 4 gray levels
    Bpp2,
    /// 4 bits, 16 gray levels
    #[default]
    Bpp4,
    /// 8 bits, 256 gray levels
    Bpp8,
}

impl PixelDepth {
    /// Bits per pixel
    pub fn bits(self) -> u8 {
        match self {
            Self::Bpp1 => 1,
            Self::Bpp2 => 2,
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
        }
    }

    /// Number of distinct gray levels
    pub fn levels(self) -> u16 {
        1 << self.bits()
    }

    /// Brightest level (white)
    pub fn max_level(self) -> u8 {
        (self.levels() - 1) as u8
    }

    /// Smallest depth that can hold `levels` gray levels
    pub fn for_levels(levels: u8) -> Self {
        match levels {
            0..=2 => Self::Bpp1,
            3..=4 => Self::Bpp2,
            5..=16 => Self::Bpp4,
            _ => Self::Bpp8,
        }
    }

    /// Bytes per packed row of `width` pixels
    pub fn stride(self, width: u32) -> usize {
        (width as usize * self.bits() as usize).div_ceil(8)
    }

    /// Expand a level to an 8-bit gray value
    pub fn to_gray8(self, level: u8) -> u8 {
        let max = u32::from(self.max_level());
        (u32::from(level.min(self.max_level())) * 255 / max) as u8
    }
}

/// Locate a pixel inside a packed buffer
///
/// Returns `(byte_index, shift)`, where the pixel's level occupies
/// `depth.bits()` bits starting `shift` bits above the byte's LSB.
pub fn pixel_offset(x: u32, y: u32, width: u32, depth: PixelDepth) -> (usize, u8) {
    let bits = depth.bits() as usize;
    let bit_in_row = x as usize * bits;
    let index = y as usize * depth.stride(width) + bit_in_row / 8;
    let shift = (8 - bits - bit_in_row % 8) as u8;
    (index, shift)
}

/// Packed gray frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    depth: PixelDepth,
    data: Vec<u8>,
}

impl Frame {
    /// Create a white frame
    pub fn new(width: u32, height: u32, depth: PixelDepth) -> Self {
        let mut frame = Self {
            width,
            height,
            depth,
            data: vec![0; depth.stride(width) * height as usize],
        };
        frame.fill(depth.max_level());
        frame
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel depth
    pub fn depth(&self) -> PixelDepth {
        self.depth
    }

    /// Packed pixel bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Gray level at (x, y), `None` outside the frame
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let (index, shift) = pixel_offset(x, y, self.width, self.depth);
        let mask = self.depth.max_level();
        self.data.get(index).map(|byte| (byte >> shift) & mask)
    }

    /// Set the gray level at (x, y)
    ///
    /// Levels above the depth's maximum are clamped. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, level: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let (index, shift) = pixel_offset(x, y, self.width, self.depth);
        let mask = self.depth.max_level();
        if let Some(byte) = self.data.get_mut(index) {
            *byte = (*byte & !(mask << shift)) | ((level.min(mask)) << shift);
        }
    }

    /// Set every pixel to `level`
    pub fn fill(&mut self, level: u8) {
        let level = level.min(self.depth.max_level());
        let pattern = match self.depth {
            PixelDepth::Bpp1 => level * 0xFF,
            PixelDepth::Bpp2 => level * 0x55,
            PixelDepth::Bpp4 => level * 0x11,
            PixelDepth::Bpp8 => level,
        };
        self.data.fill(pattern);
    }
}
