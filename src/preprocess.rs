//! Frame preprocessing for e-ink panels
//!
//! Turns an RGBA bitmap into something the panel renders well:
//!
//! 1. desaturate to grayscale (saturation 0)
//! 2. stretch contrast around mid-gray by [`CONTRAST_GAIN`]
//! 3. ordered-dither down to the target number of gray levels
//!
//! Every function here is pure: the same input always produces the same output.
//!
//! ## Example
//!
//! ```
//! use eink_controller::preprocess::{optimize_bitmap, prepare};
//! use eink_controller::PixelDepth;
//! use image::{Rgba, RgbaImage};
//!
//! let source = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 200]));
//!
//! let optimized = optimize_bitmap(&source);
//! assert_eq!(optimized.get_pixel(0, 0), &Rgba([255, 255, 255, 200]));
//!
//! let frame = prepare(&source, PixelDepth::Bpp4);
//! assert_eq!(frame.get(3, 3), Some(15));
//! ```

use image::{Rgba, RgbaImage};

use crate::frame::{Frame, PixelDepth};

/// Contrast gain applied to each color channel
pub const CONTRAST_GAIN: f32 = 1.3;

/// Bias that keeps mid-gray fixed under [`CONTRAST_GAIN`]
pub const CONTRAST_OFFSET: f32 = (1.0 - CONTRAST_GAIN) / 2.0 * 255.0;

/// Luminance weights used for desaturation (R, G, B)
pub const LUMA_WEIGHTS: [f32; 3] = [0.213, 0.715, 0.072];

/// Gray levels kept by [`optimize_bitmap`]
pub const OPTIMIZED_LEVELS: u16 = 16;

/// 4x4 ordered-dither threshold matrix
const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Apply the grayscale + contrast color filter to one pixel
///
/// Alpha passes through untouched.
pub fn adjust_pixel(Rgba([r, g, b, a]): Rgba<u8>) -> Rgba<u8> {
    let [wr, wg, wb] = LUMA_WEIGHTS;
    let gray = wr * f32::from(r) + wg * f32::from(g) + wb * f32::from(b);
    let value = gray.mul_add(CONTRAST_GAIN, CONTRAST_OFFSET).round().clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, a])
}

/// Quantize an 8-bit gray value to `levels` levels with ordered dithering
///
/// The threshold depends only on (x, y), so the result is deterministic.
/// Pure black and pure white always map to the lowest and highest level.
pub fn dither_level(value: u8, x: u32, y: u32, levels: u16) -> u8 {
    let max = u32::from(levels.saturating_sub(1));
    if max == 0 {
        return 0;
    }
    let threshold = u32::from(BAYER_4X4[(y % 4) as usize][(x % 4) as usize]);
    let numerator = u32::from(value) * max * 16 + (2 * threshold + 1) * 255 / 2;
    (numerator / (255 * 16)).min(max) as u8
}

/// Apply the color filter to a whole bitmap, without quantizing
pub fn apply_color_filter(source: &RgbaImage) -> RgbaImage {
    let mut out = source.clone();
    for pixel in out.pixels_mut() {
        *pixel = adjust_pixel(*pixel);
    }
    out
}

/// Optimize a bitmap for e-ink display
///
/// Applies the color filter and dithers to 16 gray levels, keeping the
/// 8-bit RGBA layout and the source alpha.
pub fn optimize_bitmap(source: &RgbaImage) -> RgbaImage {
    log::debug!(
        "Optimizing bitmap for e-ink: {}x{}",
        source.width(),
        source.height()
    );
    let depth = PixelDepth::for_levels(OPTIMIZED_LEVELS as u8);
    let mut out = apply_color_filter(source);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let Rgba([gray, _, _, alpha]) = *pixel;
        let level = depth.to_gray8(dither_level(gray, x, y, OPTIMIZED_LEVELS));
        *pixel = Rgba([level, level, level, alpha]);
    }
    out
}

/// Convert a bitmap into a packed frame at `depth`
///
/// Translucent pixels are composited over white paper before quantizing.
pub fn prepare(source: &RgbaImage, depth: PixelDepth) -> Frame {
    let mut frame = Frame::new(source.width(), source.height(), depth);
    for (x, y, pixel) in source.enumerate_pixels() {
        let Rgba([gray, _, _, alpha]) = adjust_pixel(*pixel);
        let value = composite_over_white(gray, alpha);
        frame.set(x, y, dither_level(value, x, y, depth.levels()));
    }
    frame
}

fn composite_over_white(gray: u8, alpha: u8) -> u8 {
    let alpha = u32::from(alpha);
    ((u32::from(gray) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x * 37 % 256) as u8,
                (y * 53 % 256) as u8,
                ((x + y) * 11 % 256) as u8,
                ((x * y) % 256) as u8,
            ])
        })
    }

    #[test]
    fn test_offset_matches_gain() {
        assert!((CONTRAST_OFFSET - (-38.25)).abs() < 1e-4);
    }

    #[test]
    fn test_adjust_pixel_is_gray_and_keeps_alpha() {
        let out = adjust_pixel(Rgba([200, 40, 90, 77]));
        assert_eq!(out.0[0], out.0[1]);
        assert_eq!(out.0[1], out.0[2]);
        assert_eq!(out.0[3], 77);
    }

    #[test]
    fn test_adjust_pixel_stretches_contrast() {
        assert_eq!(adjust_pixel(Rgba([0, 0, 0, 255])), Rgba([0, 0, 0, 255]));
        assert_eq!(
            adjust_pixel(Rgba([255, 255, 255, 255])),
            Rgba([255, 255, 255, 255])
        );
        // 100 * 1.3 - 38.25 = 91.75
        assert_eq!(adjust_pixel(Rgba([100, 100, 100, 255])).0[0], 92);
        // 200 * 1.3 - 38.25 = 221.75
        assert_eq!(adjust_pixel(Rgba([200, 200, 200, 255])).0[0], 222);
    }

    #[test]
    fn test_color_filter_maps_every_pixel() {
        let source = gradient(7, 5);
        let filtered = apply_color_filter(&source);
        assert_eq!(filtered.dimensions(), source.dimensions());
        for (src, dst) in source.pixels().zip(filtered.pixels()) {
            assert_eq!(*dst, adjust_pixel(*src));
        }
    }

    #[test]
    fn test_dither_extremes_are_stable() {
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(dither_level(0, x, y, 16), 0);
                assert_eq!(dither_level(255, x, y, 16), 15);
                assert_eq!(dither_level(0, x, y, 2), 0);
                assert_eq!(dither_level(255, x, y, 2), 1);
            }
        }
    }

    #[test]
    fn test_dither_mid_gray_mixes_levels() {
        let mut on = 0;
        for y in 0..4 {
            for x in 0..4 {
                on += u32::from(dither_level(128, x, y, 2));
            }
        }
        assert!(on > 4 && on < 12, "expected a mix, got {on} of 16 set");
    }

    #[test]
    fn test_dither_at_256_levels_is_identity() {
        for value in [0u8, 1, 77, 128, 254, 255] {
            assert_eq!(dither_level(value, 3, 1, 256), value);
        }
    }

    #[test]
    fn test_optimize_is_deterministic() {
        let source = gradient(23, 17);
        let first = optimize_bitmap(&source);
        let second = optimize_bitmap(&source);
        assert_eq!(first.as_raw(), second.as_raw());
        assert_eq!(first.dimensions(), source.dimensions());
    }

    #[test]
    fn test_optimize_preserves_alpha() {
        let source = gradient(19, 11);
        let out = optimize_bitmap(&source);
        for (src, dst) in source.pixels().zip(out.pixels()) {
            assert_eq!(src.0[3], dst.0[3]);
        }
    }

    #[test]
    fn test_optimize_white_is_uniform_white() {
        let source = RgbaImage::from_pixel(9, 7, Rgba([255, 255, 255, 255]));
        let out = optimize_bitmap(&source);
        assert!(out.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn test_optimize_output_is_grayscale_on_16_levels() {
        let out = optimize_bitmap(&gradient(16, 16));
        for pixel in out.pixels() {
            let [r, g, b, _] = pixel.0;
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert_eq!(r % 17, 0);
        }
    }

    #[test]
    fn test_prepare_matches_resolution_and_is_deterministic() {
        let source = gradient(13, 5);
        let a = prepare(&source, PixelDepth::Bpp2);
        let b = prepare(&source, PixelDepth::Bpp2);
        assert_eq!(a, b);
        assert_eq!((a.width(), a.height()), (13, 5));
        assert_eq!(a.depth(), PixelDepth::Bpp2);
    }

    #[test]
    fn test_prepare_transparent_pixels_become_white() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let frame = prepare(&source, PixelDepth::Bpp4);
        assert_eq!(frame, Frame::new(4, 4, PixelDepth::Bpp4));
    }

    #[test]
    fn test_prepare_black_is_black() {
        let source = RgbaImage::from_pixel(8, 4, Rgba([0, 0, 0, 255]));
        let frame = prepare(&source, PixelDepth::Bpp1);
        assert!(frame.data().iter().all(|byte| *byte == 0x00));
    }
}
