//! Frame format conversion and resampling
//!
//! Converts a frame from the layout a source delivers into the layout a
//! transmitter expects, optionally resampling to a new resolution.
//!
//! Everything here is a pure function over immutable frames, so
//! conversions for the program and preview paths can run concurrently.
//!
//! Conversion goes through an RGBA intermediate:
//!
//! ```text
//! source layout ──decode──▶ RGBA ──resample──▶ RGBA ──encode──▶ target layout
//! ```
//!
//! Packed 32-bit layouts are byte permutations of each other, and the
//! fourth byte (alpha or padding) is carried verbatim, so a remap between
//! them without resizing is lossless in both directions. YUV layouts use
//! BT.601 full-range coefficients with 2x2 averaged chroma.

mod resample;
mod yuv;

pub use resample::nearest;

use bytes::Bytes;

use crate::error::{Result, SwitchboardError};
use crate::formats::PixelFormat;
use crate::types::Frame;

/// Whether the converter can read or write this format
pub fn is_supported(format: PixelFormat) -> bool {
    format.is_packed_rgb() || matches!(format, PixelFormat::I420 | PixelFormat::Nv12)
}

/// Convert `frame` to `target_format` at `target_size` (width, height)
///
/// The output keeps the input's timestamp and sequence number.
pub fn convert(frame: &Frame, target_format: PixelFormat, target_size: (u32, u32)) -> Result<Frame> {
    let source_format = frame.format();
    if !is_supported(source_format) || !is_supported(target_format) {
        return Err(SwitchboardError::UnsupportedConversion {
            from: source_format,
            to: target_format,
        });
    }

    let (dst_w, dst_h) = target_size;
    if dst_w == 0 || dst_h == 0 {
        return Err(SwitchboardError::invalid_frame(format!(
            "conversion target {}x{} has a zero dimension",
            dst_w, dst_h
        )));
    }

    let (src_w, src_h) = frame.size();
    let resize = (src_w, src_h) != (dst_w, dst_h);

    let pixels: Bytes = if !resize && source_format == target_format {
        frame.pixels().clone()
    } else if !resize && source_format.is_packed_rgb() && target_format.is_packed_rgb() {
        Bytes::from(remap_packed(frame.pixels(), source_format, target_format))
    } else {
        let rgba = to_rgba(frame.pixels(), source_format, src_w, src_h);
        let rgba = if resize {
            nearest(&rgba, src_w, src_h, dst_w, dst_h)
        } else {
            rgba
        };
        Bytes::from(from_rgba(&rgba, target_format, dst_w, dst_h))
    };

    Ok(Frame::new(pixels, dst_w, dst_h, target_format)?
        .with_timestamp(frame.timestamp())
        .with_sequence(frame.sequence()))
}

/// Byte positions of R, G, B and the fourth byte within a packed pixel
fn channel_order(format: PixelFormat) -> [usize; 4] {
    match format {
        PixelFormat::Rgba | PixelFormat::Rgbx => [0, 1, 2, 3],
        PixelFormat::Bgra | PixelFormat::Bgrx => [2, 1, 0, 3],
        // Only called for packed formats
        _ => [0, 1, 2, 3],
    }
}

fn remap_packed(src: &[u8], from: PixelFormat, to: PixelFormat) -> Vec<u8> {
    let src_order = channel_order(from);
    let dst_order = channel_order(to);
    let mut out = vec![0u8; src.len()];
    for (s, d) in src.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        for channel in 0..4 {
            d[dst_order[channel]] = s[src_order[channel]];
        }
    }
    out
}

fn to_rgba(src: &[u8], format: PixelFormat, width: u32, height: u32) -> Vec<u8> {
    match format {
        PixelFormat::I420 => yuv::i420_to_rgba(src, width, height),
        PixelFormat::Nv12 => yuv::nv12_to_rgba(src, width, height),
        packed => remap_packed(src, packed, PixelFormat::Rgba),
    }
}

fn from_rgba(rgba: &[u8], format: PixelFormat, width: u32, height: u32) -> Vec<u8> {
    match format {
        PixelFormat::I420 => yuv::rgba_to_i420(rgba, width, height),
        PixelFormat::Nv12 => yuv::rgba_to_nv12(rgba, width, height),
        packed => remap_packed(rgba, PixelFormat::Rgba, packed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(format: PixelFormat, width: u32, height: u32, pixels: Vec<u8>) -> Frame {
        Frame::new(pixels, width, height, format).unwrap()
    }

    fn gradient_rgba(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 17) as u8, (y * 29) as u8, (x + y) as u8, 200]);
            }
        }
        data
    }

    #[test]
    fn test_rgba_to_bgra_swaps_red_and_blue() {
        let src = frame(PixelFormat::Rgba, 1, 1, vec![1, 2, 3, 4]);
        let out = convert(&src, PixelFormat::Bgra, (1, 1)).unwrap();
        assert_eq!(&out.pixels()[..], &[3, 2, 1, 4]);
        assert_eq!(out.format(), PixelFormat::Bgra);
    }

    #[test]
    fn test_packed_remap_is_lossless() {
        let src = frame(PixelFormat::Bgrx, 8, 4, gradient_rgba(8, 4));
        for target in [PixelFormat::Rgba, PixelFormat::Bgra, PixelFormat::Rgbx] {
            let there = convert(&src, target, src.size()).unwrap();
            let back = convert(&there, PixelFormat::Bgrx, src.size()).unwrap();
            assert_eq!(back.pixels(), src.pixels(), "via {}", target);
        }
    }

    #[test]
    fn test_identity_shares_buffer() {
        let src = frame(PixelFormat::Bgra, 4, 4, gradient_rgba(4, 4));
        let out = convert(&src, PixelFormat::Bgra, (4, 4)).unwrap();
        assert_eq!(out.pixels().as_ptr(), src.pixels().as_ptr());
    }

    #[test]
    fn test_resize_hits_exact_dimensions() {
        let src = frame(PixelFormat::Rgba, 17, 9, gradient_rgba(17, 9));
        for (w, h) in [(320, 240), (640, 480), (1, 1), (5, 33)] {
            let out = convert(&src, PixelFormat::Bgra, (w, h)).unwrap();
            assert_eq!(out.size(), (w, h));
            assert_eq!(out.pixels().len(), (w * h * 4) as usize);
        }
    }

    #[test]
    fn test_preserves_timestamp_and_sequence() {
        let src = frame(PixelFormat::Rgba, 2, 2, vec![9; 16]).with_sequence(77);
        let out = convert(&src, PixelFormat::I420, (4, 4)).unwrap();
        assert_eq!(out.sequence(), 77);
        assert_eq!(out.timestamp(), src.timestamp());
    }

    #[test]
    fn test_p010_unsupported() {
        let src = frame(
            PixelFormat::P010,
            2,
            2,
            vec![0; PixelFormat::P010.frame_size(2, 2)],
        );
        let err = convert(&src, PixelFormat::Bgra, (2, 2)).unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::UnsupportedConversion {
                from: PixelFormat::P010,
                to: PixelFormat::Bgra
            }
        ));

        let src = frame(PixelFormat::Bgra, 2, 2, vec![0; 16]);
        assert!(convert(&src, PixelFormat::P010, (2, 2)).is_err());
    }

    #[test]
    fn test_zero_target_rejected() {
        let src = frame(PixelFormat::Bgra, 2, 2, vec![0; 16]);
        assert!(convert(&src, PixelFormat::Bgra, (0, 2)).is_err());
    }

    #[test]
    fn test_yuv_roundtrip_flat_color_within_tolerance() {
        let mut pixels = Vec::new();
        for _ in 0..16 {
            pixels.extend_from_slice(&[40, 160, 220, 255]);
        }
        let src = frame(PixelFormat::Rgba, 4, 4, pixels);
        for yuv in [PixelFormat::I420, PixelFormat::Nv12] {
            let there = convert(&src, yuv, (4, 4)).unwrap();
            let back = convert(&there, PixelFormat::Rgba, (4, 4)).unwrap();
            for (a, b) in src.pixels().iter().zip(back.pixels().iter()) {
                assert!((*a as i16 - *b as i16).abs() <= 2, "{} vs {} via {}", a, b, yuv);
            }
        }
    }
}
