//! Tightly packed RGBA8 buffer utilities
//!
//! Buffers are row-major, top-left origin, 4 bytes per pixel with no row padding.

use crate::color::Rgba;
use crate::geometry::PixelRect;

/// Map a normalized channel to a byte, rounding to nearest
pub fn float_to_byte(v: f32) -> u8 {
    if v <= 0.0 {
        0
    } else if v >= 1.0 {
        255
    } else {
        (v * 255.0 + 0.5) as u8
    }
}

/// Byte length of a `width` x `height` buffer, zero for non-positive sizes
pub fn buffer_len(width: i32, height: i32) -> usize {
    if width <= 0 || height <= 0 {
        0
    } else {
        width as usize * height as usize * 4
    }
}

fn offset(width: i32, height: i32, x: i32, y: i32) -> Option<usize> {
    if x < 0 || y < 0 || x >= width || y >= height {
        return None;
    }
    Some((y as usize * width as usize + x as usize) * 4)
}

/// Fill every pixel with `color`
pub fn clear_pixels(pixels: &mut [u8], color: Rgba) {
    let rgba = color.to_array();
    for px in pixels.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

pub fn get_pixel(pixels: &[u8], width: i32, height: i32, x: i32, y: i32) -> Option<Rgba> {
    let i = offset(width, height, x, y)?;
    pixels.get(i..i + 4).map(Rgba::from_slice)
}

/// Overwrite one pixel; out-of-bounds writes are ignored
pub fn set_pixel(pixels: &mut [u8], width: i32, height: i32, x: i32, y: i32, color: Rgba) {
    if let Some(px) = offset(width, height, x, y).and_then(|i| pixels.get_mut(i..i + 4)) {
        px.copy_from_slice(&color.to_array());
    }
}

/// Composite one pixel with alpha-over; out-of-bounds writes are ignored
pub fn blend_pixel(pixels: &mut [u8], width: i32, height: i32, x: i32, y: i32, color: Rgba) {
    if let Some(px) = offset(width, height, x, y).and_then(|i| pixels.get_mut(i..i + 4)) {
        let out = blend_rgba(color, Rgba::from_slice(px));
        px.copy_from_slice(&out.to_array());
    }
}

/// Straight-alpha "over": `src` composited onto `dst`
pub fn blend_rgba(src: Rgba, dst: Rgba) -> Rgba {
    let sa = src.a as f32 / 255.0;
    let da = dst.a as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba::TRANSPARENT;
    }

    let channel = |s: u8, d: u8| {
        let s = s as f32 / 255.0;
        let d = d as f32 / 255.0;
        float_to_byte((s * sa + d * da * (1.0 - sa)) / out_a)
    };
    Rgba::new(
        channel(src.r, dst.r),
        channel(src.g, dst.g),
        channel(src.b, dst.b),
        float_to_byte(out_a),
    )
}

/// Nearest-neighbour resample
pub fn scale_pixels(src: &[u8], src_w: i32, src_h: i32, dst_w: i32, dst_h: i32) -> Vec<u8> {
    let mut out = vec![0u8; buffer_len(dst_w, dst_h)];
    if src_w <= 0 || src_h <= 0 || out.is_empty() || src.len() < buffer_len(src_w, src_h) {
        return out;
    }

    for y in 0..dst_h {
        let sy = (y as i64 * src_h as i64 / dst_h as i64) as usize;
        for x in 0..dst_w {
            let sx = (x as i64 * src_w as i64 / dst_w as i64) as usize;
            let si = (sy * src_w as usize + sx) * 4;
            let di = (y as usize * dst_w as usize + x as usize) * 4;
            out[di..di + 4].copy_from_slice(&src[si..si + 4]);
        }
    }
    out
}

/// Copy out a sub-rectangle. `None` selects the whole buffer; an empty
/// result after clipping yields `None`.
pub fn crop_pixels(
    src: &[u8],
    width: i32,
    height: i32,
    region: Option<PixelRect>,
) -> Option<(Vec<u8>, i32, i32)> {
    let rect = PixelRect::resolve(region, width, height)?;
    if src.len() < buffer_len(width, height) {
        return None;
    }

    let row_bytes = rect.width() as usize * 4;
    let mut out = Vec::with_capacity(row_bytes * rect.height() as usize);
    for y in rect.y0..rect.y1 {
        let start = (y as usize * width as usize + rect.x0 as usize) * 4;
        out.extend_from_slice(&src[start..start + row_bytes]);
    }
    Some((out, rect.width(), rect.height()))
}

/// Clip an upload of `pixels` laid out for `region` (the whole surface when
/// `None`) against a `width` x `height` surface. Returns the clipped rect and
/// its tightly packed pixels.
pub fn clip_upload(
    pixels: &[u8],
    region: Option<PixelRect>,
    width: i32,
    height: i32,
) -> Option<(PixelRect, Vec<u8>)> {
    let rect = PixelRect::resolve(region, width, height)?;
    let src_w = region.map_or(width, |r| r.width()).max(0) as usize;
    let (ox, oy) = region.map_or((0, 0), |r| (r.x0, r.y0));

    let row_bytes = rect.width() as usize * 4;
    let mut out = Vec::with_capacity(row_bytes * rect.height() as usize);
    for y in rect.y0..rect.y1 {
        let src = ((y - oy) as usize * src_w + (rect.x0 - ox) as usize) * 4;
        out.extend_from_slice(pixels.get(src..src + row_bytes)?);
    }
    Some((rect, out))
}

/// Reverse row order in place
pub fn flip_vertical(pixels: &mut [u8], width: i32, height: i32) {
    if width <= 0 || height <= 1 {
        return;
    }
    let row = width as usize * 4;
    let rows = height as usize;
    if pixels.len() < row * rows {
        return;
    }
    for y in 0..rows / 2 {
        let (top, bottom) = pixels.split_at_mut((rows - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_byte() {
        assert_eq!(float_to_byte(-1.0), 0);
        assert_eq!(float_to_byte(0.0), 0);
        assert_eq!(float_to_byte(0.5), 128);
        assert_eq!(float_to_byte(1.0), 255);
        assert_eq!(float_to_byte(7.0), 255);
    }

    #[test]
    fn test_blend_over() {
        let opaque = Rgba::new(10, 20, 30, 255);
        assert_eq!(blend_rgba(opaque, Rgba::WHITE), opaque);
        assert_eq!(blend_rgba(Rgba::TRANSPARENT, opaque), opaque);
        assert_eq!(blend_rgba(Rgba::TRANSPARENT, Rgba::TRANSPARENT), Rgba::TRANSPARENT);

        let half_red = Rgba::new(255, 0, 0, 128);
        let out = blend_rgba(half_red, Rgba::new(0, 0, 255, 255));
        assert_eq!(out.a, 255);
        assert!(out.r > 120 && out.r < 135);
        assert!(out.b > 120 && out.b < 135);
    }

    #[test]
    fn test_set_and_blend_out_of_bounds() {
        let mut px = vec![0u8; buffer_len(2, 2)];
        set_pixel(&mut px, 2, 2, 5, 0, Rgba::WHITE);
        blend_pixel(&mut px, 2, 2, -1, 1, Rgba::WHITE);
        assert!(px.iter().all(|&b| b == 0));
        set_pixel(&mut px, 2, 2, 1, 1, Rgba::WHITE);
        assert_eq!(get_pixel(&px, 2, 2, 1, 1), Some(Rgba::WHITE));
    }

    #[test]
    fn test_crop_and_flip() {
        let mut px = vec![0u8; buffer_len(3, 3)];
        for y in 0..3 {
            set_pixel(&mut px, 3, 3, 0, y, Rgba::new(y as u8, 0, 0, 255));
        }
        let (cropped, w, h) = crop_pixels(&px, 3, 3, Some(PixelRect::new(0, 1, 2, 3))).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(cropped[0], 1);
        assert!(crop_pixels(&px, 3, 3, Some(PixelRect::new(3, 3, 4, 4))).is_none());

        flip_vertical(&mut px, 3, 3);
        assert_eq!(get_pixel(&px, 3, 3, 0, 0).unwrap().r, 2);
        assert_eq!(get_pixel(&px, 3, 3, 0, 2).unwrap().r, 0);
    }

    #[test]
    fn test_clip_upload_offsets_source() {
        let src: Vec<u8> = (0..16).collect();
        // 2x2 region hanging off the bottom-right of a 3x3 surface
        let (rect, px) = clip_upload(&src, Some(PixelRect::new(2, 2, 4, 4)), 3, 3).unwrap();
        assert_eq!(rect, PixelRect::new(2, 2, 3, 3));
        assert_eq!(px, vec![0, 1, 2, 3]);
        assert!(clip_upload(&src[..8], None, 3, 3).is_none());
    }

    #[test]
    fn test_scale_nearest() {
        let mut src = vec![0u8; buffer_len(2, 1)];
        set_pixel(&mut src, 2, 1, 1, 0, Rgba::WHITE);
        let out = scale_pixels(&src, 2, 1, 4, 2);
        assert_eq!(get_pixel(&out, 4, 2, 1, 1), Some(Rgba::TRANSPARENT));
        assert_eq!(get_pixel(&out, 4, 2, 2, 1), Some(Rgba::WHITE));
    }
}
