//! Graphics support via embedded-graphics
//!
//! [`Frame`] implements [`DrawTarget`] with [`Gray8`] colors, so any
//! embedded-graphics primitive, font or image can be drawn straight into a
//! frame before it is sent to the panel. Luma is rounded to the nearest level
//! the frame's [`PixelDepth`] can hold.
//!
//! ## Example
//!
//! ```
//! use embedded_graphics::{
//!     pixelcolor::Gray8,
//!     prelude::*,
//!     primitives::{Circle, PrimitiveStyle, Rectangle},
//! };
//! use eink_controller::{Frame, PixelDepth};
//!
//! let mut frame = Frame::new(64, 32, PixelDepth::Bpp4);
//!
//! let _ = Rectangle::new(Point::new(2, 2), Size::new(20, 10))
//!     .into_styled(PrimitiveStyle::with_fill(Gray8::BLACK))
//!     .draw(&mut frame);
//!
//! let _ = Circle::new(Point::new(30, 4), 20)
//!     .into_styled(PrimitiveStyle::with_stroke(Gray8::new(0x88), 2))
//!     .draw(&mut frame);
//!
//! assert_eq!(frame.get(3, 3), Some(0));
//! ```

use core::convert::Infallible;
use embedded_graphics_core::{
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    pixelcolor::{Gray8, GrayColor},
    prelude::Pixel,
    primitives::Rectangle,
};

use crate::config::Dimensions;
use crate::frame::{Frame, PixelDepth};

/// Gray bars across the top half of [`test_pattern`]
pub const TEST_PATTERN_BARS: u32 = 16;

/// Checkerboard cell edge in the bottom half of [`test_pattern`]
pub const TEST_PATTERN_CELL: u32 = 8;

/// Round an 8-bit luma to the nearest level at `depth`
pub fn luma_to_level(luma: u8, depth: PixelDepth) -> u8 {
    let max = u32::from(depth.max_level());
    ((u32::from(luma) * max + 127) / 255) as u8
}

/// Build the panel test pattern
///
/// The top half is a ramp of [`TEST_PATTERN_BARS`] gray bars from black on
/// the left to white on the right. The bottom half is a black and white
/// checkerboard, which shows ghosting and dithering artifacts clearly.
pub fn test_pattern(dims: Dimensions, depth: PixelDepth) -> Frame {
    let width = u32::from(dims.width);
    let height = u32::from(dims.height);
    let mut frame = Frame::new(width, height, depth);
    let ramp_height = height / 2;

    for bar in 0..TEST_PATTERN_BARS {
        let left = bar * width / TEST_PATTERN_BARS;
        let right = (bar + 1) * width / TEST_PATTERN_BARS;
        let luma = (bar * 255 / (TEST_PATTERN_BARS - 1)) as u8;
        let area = Rectangle::new(
            Point::new(left as i32, 0),
            Size::new(right - left, ramp_height),
        );
        let _ = frame.fill_solid(&area, Gray8::new(luma));
    }

    for row in (ramp_height..height).step_by(TEST_PATTERN_CELL as usize) {
        for col in (0..width).step_by(TEST_PATTERN_CELL as usize) {
            let dark = ((row - ramp_height) / TEST_PATTERN_CELL + col / TEST_PATTERN_CELL) % 2 == 0;
            let area = Rectangle::new(
                Point::new(col as i32, row as i32),
                Size::new(TEST_PATTERN_CELL, TEST_PATTERN_CELL),
            );
            let color = if dark { Gray8::BLACK } else { Gray8::WHITE };
            let _ = frame.fill_solid(&area, color);
        }
    }

    frame
}

impl DrawTarget for Frame {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<Iter>(&mut self, pixels: Iter) -> Result<(), Self::Error>
    where
        Iter: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let depth = self.depth();

        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }
            self.set(x as u32, y as u32, luma_to_level(color.luma(), depth));
        }

        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(luma_to_level(color.luma(), self.depth()));
        Ok(())
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dimensions;
    use embedded_graphics::{
        prelude::*,
        primitives::{Line, PrimitiveStyle},
    };

    #[test]
    fn test_luma_rounds_to_nearest_level() {
        assert_eq!(luma_to_level(0, PixelDepth::Bpp4), 0);
        assert_eq!(luma_to_level(255, PixelDepth::Bpp4), 15);
        assert_eq!(luma_to_level(0x88, PixelDepth::Bpp4), 8);
        assert_eq!(luma_to_level(127, PixelDepth::Bpp1), 0);
        assert_eq!(luma_to_level(128, PixelDepth::Bpp1), 1);
        assert_eq!(luma_to_level(200, PixelDepth::Bpp8), 200);
    }

    #[test]
    fn test_size_matches_frame() {
        let frame = Frame::new(40, 24, PixelDepth::Bpp2);
        assert_eq!(frame.size(), Size::new(40, 24));
    }

    #[test]
    fn test_draw_clips_to_frame() {
        let mut frame = Frame::new(8, 8, PixelDepth::Bpp1);
        Line::new(Point::new(-4, 2), Point::new(12, 2))
            .into_styled(PrimitiveStyle::with_stroke(Gray8::BLACK, 1))
            .draw(&mut frame)
            .unwrap();

        for x in 0..8 {
            assert_eq!(frame.get(x, 2), Some(0));
            assert_eq!(frame.get(x, 3), Some(1));
        }
    }

    #[test]
    fn test_clear_fills_every_pixel() {
        let mut frame = Frame::new(5, 3, PixelDepth::Bpp4);
        frame.clear(Gray8::BLACK).unwrap();
        assert!(frame.data().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn test_pattern_ramp_is_ascending() {
        let dims = Dimensions::new(64, 32).unwrap();
        let frame = test_pattern(dims, PixelDepth::Bpp4);

        let levels: Vec<u8> = (0..TEST_PATTERN_BARS)
            .map(|bar| frame.get(bar * 4, 0).unwrap())
            .collect();
        assert_eq!(levels, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_pattern_checkerboard() {
        let dims = Dimensions::new(32, 32).unwrap();
        let frame = test_pattern(dims, PixelDepth::Bpp1);

        assert_eq!(frame.get(0, 16), Some(0));
        assert_eq!(frame.get(8, 16), Some(1));
        assert_eq!(frame.get(0, 24), Some(1));
        assert_eq!(frame.get(31, 31), Some(0));
    }

    #[test]
    fn test_pattern_is_deterministic() {
        let dims = Dimensions::new(50, 20).unwrap();
        assert_eq!(
            test_pattern(dims, PixelDepth::Bpp2),
            test_pattern(dims, PixelDepth::Bpp2)
        );
    }
}
