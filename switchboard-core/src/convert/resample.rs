//! Nearest-neighbor resampling of 4-byte pixels

/// Resample a packed 4-byte-per-pixel image to `dst_w` x `dst_h`
///
/// Each destination pixel takes the source pixel under its center, so
/// integer up-then-down scaling by the same factor returns the original.
pub fn nearest(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let (sw, sh) = (src_w as u64, src_h as u64);
    let (dw, dh) = (dst_w as u64, dst_h as u64);

    let columns: Vec<usize> = (0..dw)
        .map(|x| (((2 * x + 1) * sw) / (2 * dw)).min(sw - 1) as usize)
        .collect();

    let mut out = Vec::with_capacity((dw * dh * 4) as usize);
    for y in 0..dh {
        let sy = (((2 * y + 1) * sh) / (2 * dh)).min(sh - 1) as usize;
        let row = &src[sy * src_w as usize * 4..(sy + 1) * src_w as usize * 4];
        for &sx in &columns {
            out.extend_from_slice(&row[sx * 4..sx * 4 + 4]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| [i as u8, (i >> 8) as u8, 0, 255])
            .collect()
    }

    #[test]
    fn test_same_size_is_identity() {
        let src = numbered(5, 3);
        assert_eq!(nearest(&src, 5, 3, 5, 3), src);
    }

    #[test]
    fn test_up_then_down_is_identity() {
        let src = numbered(6, 4);
        let up = nearest(&src, 6, 4, 12, 8);
        assert_eq!(nearest(&up, 12, 8, 6, 4), src);
    }

    #[test]
    fn test_downscale_picks_centers() {
        // 4x1 -> 2x1 samples source columns 1 and 3
        let src = numbered(4, 1);
        let out = nearest(&src, 4, 1, 2, 1);
        assert_eq!(out[0], 1);
        assert_eq!(out[4], 3);
    }
}
