//! Pixel formats and fourcc handling
//!
//! Centralizes pixel format knowledge (fourcc codes, buffer sizes, names)
//! so ingestion, conversion and transmission agree on layouts.

use serde::{Deserialize, Serialize};

/// Build a little-endian fourcc code from its four ASCII characters
pub const fn fourcc_code(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// Fourcc constants as announced by network video sources
pub mod fourcc {
    use super::fourcc_code;

    /// RGBA - 8 bits per channel, R first in memory
    pub const RGBA: u32 = fourcc_code(b"RGBA");
    /// BGRA - 8 bits per channel, B first in memory
    pub const BGRA: u32 = fourcc_code(b"BGRA");
    /// RGBX - RGBA with the alpha byte ignored
    pub const RGBX: u32 = fourcc_code(b"RGBX");
    /// BGRX - BGRA with the alpha byte ignored
    pub const BGRX: u32 = fourcc_code(b"BGRX");
    /// I420 - YUV 4:2:0 planar (Y, U, V planes)
    pub const I420: u32 = fourcc_code(b"I420");
    /// NV12 - YUV 4:2:0 semi-planar (Y plane, interleaved UV plane)
    pub const NV12: u32 = fourcc_code(b"NV12");
    /// P010 - 10-bit YUV 4:2:0 semi-planar (HDR)
    pub const P010: u32 = fourcc_code(b"P010");
}

/// Pixel layout of a frame
///
/// All layouts are tightly packed: no row padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba,
    Bgra,
    Rgbx,
    Bgrx,
    I420,
    Nv12,
    P010,
}

impl PixelFormat {
    /// Every format we recognize from a source
    pub const ALL: [PixelFormat; 7] = [
        Self::Rgba,
        Self::Bgra,
        Self::Rgbx,
        Self::Bgrx,
        Self::I420,
        Self::Nv12,
        Self::P010,
    ];

    /// Look up a format by its fourcc code
    pub fn from_fourcc(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.fourcc() == code)
    }

    /// Fourcc code for this format
    pub fn fourcc(&self) -> u32 {
        match self {
            Self::Rgba => fourcc::RGBA,
            Self::Bgra => fourcc::BGRA,
            Self::Rgbx => fourcc::RGBX,
            Self::Bgrx => fourcc::BGRX,
            Self::I420 => fourcc::I420,
            Self::Nv12 => fourcc::NV12,
            Self::P010 => fourcc::P010,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rgba => "RGBA",
            Self::Bgra => "BGRA",
            Self::Rgbx => "RGBX",
            Self::Bgrx => "BGRX",
            Self::I420 => "I420",
            Self::Nv12 => "NV12",
            Self::P010 => "P010",
        }
    }

    /// Packed 4-byte-per-pixel layouts
    pub fn is_packed_rgb(&self) -> bool {
        matches!(self, Self::Rgba | Self::Bgra | Self::Rgbx | Self::Bgrx)
    }

    /// 4:2:0 subsampled layouts
    pub fn is_yuv(&self) -> bool {
        matches!(self, Self::I420 | Self::Nv12 | Self::P010)
    }

    /// Exact buffer size in bytes for a frame of this format
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        let chroma = chroma_size(width, height);
        match self {
            Self::Rgba | Self::Bgra | Self::Rgbx | Self::Bgrx => w * h * 4,
            Self::I420 | Self::Nv12 => w * h + 2 * (chroma.0 * chroma.1),
            // 16-bit samples
            Self::P010 => (w * h + 2 * (chroma.0 * chroma.1)) * 2,
        }
    }
}

/// Dimensions of one 4:2:0 chroma plane (rounded up for odd sizes)
pub fn chroma_size(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown pixel format: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_roundtrip() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(0xDEADBEEF), None);
    }

    #[test]
    fn test_fourcc_byte_order() {
        assert_eq!(fourcc::BGRA.to_le_bytes(), *b"BGRA");
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Bgra.frame_size(4, 2), 32);
        assert_eq!(PixelFormat::I420.frame_size(4, 2), 8 + 2 * 2);
        // Odd dimensions round the chroma planes up
        assert_eq!(PixelFormat::Nv12.frame_size(3, 3), 9 + 2 * 4);
        assert_eq!(PixelFormat::P010.frame_size(2, 2), (4 + 2) * 2);
    }

    #[test]
    fn test_parse_name() {
        assert_eq!("bgra".parse::<PixelFormat>(), Ok(PixelFormat::Bgra));
        assert_eq!("NV12".parse::<PixelFormat>(), Ok(PixelFormat::Nv12));
        assert!("yuyv".parse::<PixelFormat>().is_err());
    }
}
