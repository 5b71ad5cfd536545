//! BT.601 full-range YUV 4:2:0 <-> RGBA

use crate::formats::chroma_size;

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn rgb_to_yuv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    (y, u, v)
}

#[inline]
fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_u8(y + 1.402 * v),
        clamp_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_u8(y + 1.772 * u),
        255,
    ]
}

/// Luma plane plus one averaged (U, V) pair per 2x2 block
fn split_planes(rgba: &[u8], width: u32, height: u32) -> (Vec<u8>, Vec<(u8, u8)>) {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = chroma_size(width, height);

    let mut luma = Vec::with_capacity(w * h);
    for px in rgba.chunks_exact(4) {
        let (y, _, _) = rgb_to_yuv(px[0] as f32, px[1] as f32, px[2] as f32);
        luma.push(clamp_u8(y));
    }

    let mut chroma = Vec::with_capacity(cw * ch);
    for cy in 0..ch {
        for cx in 0..cw {
            let (mut u_sum, mut v_sum, mut n) = (0.0f32, 0.0f32, 0.0f32);
            for y in (cy * 2)..((cy * 2 + 2).min(h)) {
                for x in (cx * 2)..((cx * 2 + 2).min(w)) {
                    let i = (y * w + x) * 4;
                    let (_, u, v) =
                        rgb_to_yuv(rgba[i] as f32, rgba[i + 1] as f32, rgba[i + 2] as f32);
                    u_sum += u;
                    v_sum += v;
                    n += 1.0;
                }
            }
            chroma.push((clamp_u8(u_sum / n), clamp_u8(v_sum / n)));
        }
    }

    (luma, chroma)
}

pub(super) fn rgba_to_i420(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (luma, chroma) = split_planes(rgba, width, height);
    let mut out = luma;
    out.extend(chroma.iter().map(|&(u, _)| u));
    out.extend(chroma.iter().map(|&(_, v)| v));
    out
}

pub(super) fn rgba_to_nv12(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (luma, chroma) = split_planes(rgba, width, height);
    let mut out = luma;
    for (u, v) in chroma {
        out.push(u);
        out.push(v);
    }
    out
}

fn planes_to_rgba(
    luma: &[u8],
    width: u32,
    height: u32,
    chroma_at: impl Fn(usize) -> (u8, u8),
) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (cw, _) = chroma_size(width, height);
    let mut out = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        for x in 0..w {
            let (u, v) = chroma_at((y / 2) * cw + x / 2);
            out.extend_from_slice(&yuv_to_rgba(luma[y * w + x], u, v));
        }
    }
    out
}

pub(super) fn i420_to_rgba(src: &[u8], width: u32, height: u32) -> Vec<u8> {
    let luma_len = (width * height) as usize;
    let (cw, ch) = chroma_size(width, height);
    let plane = cw * ch;
    let (luma, rest) = src.split_at(luma_len);
    let (u_plane, v_plane) = rest.split_at(plane);
    planes_to_rgba(luma, width, height, |i| (u_plane[i], v_plane[i]))
}

pub(super) fn nv12_to_rgba(src: &[u8], width: u32, height: u32) -> Vec<u8> {
    let luma_len = (width * height) as usize;
    let (luma, uv) = src.split_at(luma_len);
    planes_to_rgba(luma, width, height, |i| (uv[i * 2], uv[i * 2 + 1]))
}
