//! YUV to RGB conversion
//!
//! IIDC cameras send chroma first: 4:2:2 as `U Y0 V Y1`, 4:1:1 as
//! `U Y0 Y1 V Y2 Y3` and 4:4:4 as `U Y V`.

use iidc_bus::ColorCoding;

use crate::error::ProcessError;

/// Convert one YUV sample to RGB with ITU-R BT.601 coefficients
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v, y);
    let g = 0.714_14f32.mul_add(-v, 0.344_14f32.mul_add(-u, y));
    let b = 1.772f32.mul_add(u, y);

    let clamp = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [clamp(r), clamp(g), clamp(b)]
}

/// Byte positions inside one chroma group
struct GroupLayout {
    pixels: usize,
    bytes: usize,
    luma: &'static [usize],
    u: usize,
    v: usize,
}

const UYVY: GroupLayout = GroupLayout { pixels: 2, bytes: 4, luma: &[1, 3], u: 0, v: 2 };
const UYYVYY: GroupLayout = GroupLayout { pixels: 4, bytes: 6, luma: &[1, 2, 4, 5], u: 0, v: 3 };
const UYV: GroupLayout = GroupLayout { pixels: 1, bytes: 3, luma: &[1], u: 0, v: 2 };

fn layout(coding: ColorCoding) -> Option<&'static GroupLayout> {
    match coding {
        ColorCoding::Yuv422 => Some(&UYVY),
        ColorCoding::Yuv411 => Some(&UYYVYY),
        ColorCoding::Yuv444 => Some(&UYV),
        _ => None,
    }
}

/// Convert a whole YUV frame into interleaved RGB8
pub fn yuv_to_rgb8(
    coding: ColorCoding,
    src: &[u8],
    width: u32,
    height: u32,
    out: &mut Vec<u8>,
) -> Result<(), ProcessError> {
    let group = layout(coding).ok_or(ProcessError::UnsupportedEncoding(coding))?;

    let pixels = width as usize * height as usize;
    let expected = pixels.div_ceil(group.pixels) * group.bytes;
    if src.len() < expected {
        return Err(ProcessError::ShortBuffer {
            expected,
            actual: src.len(),
        });
    }

    out.resize(pixels * 3, 0);
    for (i, rgb) in out.chunks_exact_mut(3).enumerate() {
        let base = (i / group.pixels) * group.bytes;
        let y = src[base + group.luma[i % group.pixels]];
        rgb.copy_from_slice(&yuv_to_rgb(y, src[base + group.u], src[base + group.v]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_chroma_is_gray() {
        assert_eq!(yuv_to_rgb(0, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(255, 128, 128), [255, 255, 255]);
        assert_eq!(yuv_to_rgb(100, 128, 128), [100, 100, 100]);
    }

    #[test]
    fn test_saturated_colors_clamp() {
        let [r, g, b] = yuv_to_rgb(128, 128, 255);
        assert_eq!(r, 255);
        assert!(g < 128);
        assert_eq!(b, 128);
    }

    #[test]
    fn test_uyvy_order() {
        // Two pixels with luma 10 and 200, neutral chroma
        let src = [128u8, 10, 128, 200];
        let mut out = Vec::new();
        yuv_to_rgb8(ColorCoding::Yuv422, &src, 2, 1, &mut out).unwrap();
        assert_eq!(out, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_411_order() {
        let src = [128u8, 1, 2, 128, 3, 4];
        let mut out = Vec::new();
        yuv_to_rgb8(ColorCoding::Yuv411, &src, 4, 1, &mut out).unwrap();
        assert_eq!(out, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn test_444_order() {
        let src = [128u8, 50, 128, 128, 60, 128];
        let mut out = Vec::new();
        yuv_to_rgb8(ColorCoding::Yuv444, &src, 2, 1, &mut out).unwrap();
        assert_eq!(out, vec![50, 50, 50, 60, 60, 60]);
    }

    #[test]
    fn test_rejects_non_yuv_and_short_frames() {
        let mut out = Vec::new();
        assert_eq!(
            yuv_to_rgb8(ColorCoding::Rgb8, &[0; 12], 2, 2, &mut out),
            Err(ProcessError::UnsupportedEncoding(ColorCoding::Rgb8))
        );
        assert_eq!(
            yuv_to_rgb8(ColorCoding::Yuv422, &[0; 6], 2, 2, &mut out),
            Err(ProcessError::ShortBuffer {
                expected: 8,
                actual: 6
            })
        );
    }
}
