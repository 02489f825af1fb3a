//! Bayer demosaicing
//!
//! Reconstructs interleaved RGB from a single-channel sensor mosaic. Border
//! pixels read their neighbors mirrored across the edge; mirroring by an
//! even distance keeps every sample on its own color site.

use iidc_bus::ColorFilter;
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// Demosaicing algorithm, in IIDC order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BayerMethod {
    #[default]
    Nearest,
    Simple,
    Bilinear,
    HqLinear,
    Downsample,
    EdgeSense,
    Vng,
    Ahd,
}

impl BayerMethod {
    const ALL: [BayerMethod; 8] = [
        Self::Nearest,
        Self::Simple,
        Self::Bilinear,
        Self::HqLinear,
        Self::Downsample,
        Self::EdgeSense,
        Self::Vng,
        Self::Ahd,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Self::Nearest | Self::Simple | Self::Bilinear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

fn channel_at(filter: ColorFilter, x: i64, y: i64) -> Channel {
    use Channel::*;
    let cell = match filter {
        ColorFilter::Rggb => [Red, Green, Green, Blue],
        ColorFilter::Gbrg => [Green, Blue, Red, Green],
        ColorFilter::Grbg => [Green, Red, Blue, Green],
        ColorFilter::Bggr => [Blue, Green, Green, Red],
    };
    cell[(y.rem_euclid(2) * 2 + x.rem_euclid(2)) as usize]
}

/// Index mirrored into `0..n`; valid for `-1..=n` when `n >= 2`
fn reflect(i: i64, n: i64) -> usize {
    if i < 0 {
        (-i) as usize
    } else if i >= n {
        (2 * n - 2 - i) as usize
    } else {
        i as usize
    }
}

trait Sample: Copy {
    fn widen(self) -> u32;
    fn narrow(value: u32) -> Self;
}

impl Sample for u8 {
    fn widen(self) -> u32 {
        u32::from(self)
    }
    fn narrow(value: u32) -> Self {
        value.min(u32::from(u8::MAX)) as u8
    }
}

impl Sample for u16 {
    fn widen(self) -> u32 {
        u32::from(self)
    }
    fn narrow(value: u32) -> Self {
        value.min(u32::from(u16::MAX)) as u16
    }
}

struct Mosaic<'a, T> {
    data: &'a [T],
    width: i64,
    height: i64,
    filter: ColorFilter,
}

impl<T: Sample> Mosaic<'_, T> {
    fn get(&self, x: i64, y: i64) -> u32 {
        let index = reflect(y, self.height) * self.width as usize + reflect(x, self.width);
        self.data[index].widen()
    }

    fn channel(&self, x: i64, y: i64) -> Channel {
        channel_at(self.filter, x, y)
    }

    /// Sample of `channel` inside the 2x2 cell holding (x, y)
    fn cell_sample(&self, x: i64, y: i64, channel: Channel) -> u32 {
        let (cx, cy) = (x & !1, y & !1);
        let mut sum = 0;
        let mut count = 0;
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            if self.channel(cx + dx, cy + dy) == channel {
                sum += self.get(cx + dx, cy + dy);
                count += 1;
            }
        }
        (sum + count / 2) / count
    }

    fn nearest(&self, x: i64, y: i64) -> [u32; 3] {
        let own = self.channel(x, y);
        let green = if own == Channel::Green {
            self.get(x, y)
        } else {
            // The horizontal neighbor inside the cell is always green.
            self.get(x ^ 1, y)
        };
        [
            self.cell_sample(x, y, Channel::Red),
            green,
            self.cell_sample(x, y, Channel::Blue),
        ]
    }

    fn simple(&self, x: i64, y: i64) -> [u32; 3] {
        [
            self.cell_sample(x, y, Channel::Red),
            self.cell_sample(x, y, Channel::Green),
            self.cell_sample(x, y, Channel::Blue),
        ]
    }

    fn bilinear(&self, x: i64, y: i64) -> [u32; 3] {
        let own = self.channel(x, y);
        let mut sums = [0u32; 3];
        let mut counts = [0u32; 3];
        for dy in -1..=1 {
            for dx in -1..=1 {
                let channel = self.channel(x + dx, y + dy);
                sums[channel as usize] += self.get(x + dx, y + dy);
                counts[channel as usize] += 1;
            }
        }
        let mut rgb = [0u32; 3];
        for (c, value) in rgb.iter_mut().enumerate() {
            *value = if c == own as usize {
                self.get(x, y)
            } else {
                (sums[c] + counts[c] / 2) / counts[c]
            };
        }
        rgb
    }
}

fn demosaic<T: Sample>(
    src: &[T],
    width: u32,
    height: u32,
    filter: ColorFilter,
    method: BayerMethod,
    out: &mut [T],
) -> Result<(), ProcessError> {
    if width < 2 || height < 2 {
        return Err(ProcessError::TooSmall { width, height });
    }
    let mosaic = Mosaic {
        data: src,
        width: i64::from(width),
        height: i64::from(height),
        filter,
    };
    if !method.is_supported() {
        return Err(ProcessError::UnsupportedMethod(method));
    }

    for (i, rgb) in out.chunks_exact_mut(3).enumerate() {
        let x = (i % width as usize) as i64;
        let y = (i / width as usize) as i64;
        let value = match method {
            BayerMethod::Simple => mosaic.simple(x, y),
            BayerMethod::Bilinear => mosaic.bilinear(x, y),
            _ => mosaic.nearest(x, y),
        };
        for (dst, v) in rgb.iter_mut().zip(value) {
            *dst = T::narrow(v);
        }
    }
    Ok(())
}

fn check_len(
    actual: usize,
    width: u32,
    height: u32,
    bytes_per_sample: usize,
) -> Result<usize, ProcessError> {
    let samples = width as usize * height as usize;
    if actual < samples {
        return Err(ProcessError::ShortBuffer {
            expected: samples * bytes_per_sample,
            actual: actual * bytes_per_sample,
        });
    }
    Ok(samples)
}

/// Demosaic an 8-bit mosaic into `out` as interleaved RGB8
pub fn debayer_u8(
    src: &[u8],
    width: u32,
    height: u32,
    filter: ColorFilter,
    method: BayerMethod,
    out: &mut Vec<u8>,
) -> Result<(), ProcessError> {
    let samples = check_len(src.len(), width, height, 1)?;
    out.resize(samples * 3, 0);
    demosaic(&src[..samples], width, height, filter, method, out)
}

/// Demosaic a 16-bit mosaic into `out` as interleaved RGB16
pub fn debayer_u16(
    src: &[u16],
    width: u32,
    height: u32,
    filter: ColorFilter,
    method: BayerMethod,
    out: &mut Vec<u16>,
) -> Result<(), ProcessError> {
    let samples = check_len(src.len(), width, height, 2)?;
    out.resize(samples * 3, 0);
    demosaic(&src[..samples], width, height, filter, method, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Mosaic of a flat-colored scene
    fn flat_mosaic(filter: ColorFilter, width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                data.push(rgb[channel_at(filter, x, y) as usize]);
            }
        }
        data
    }

    #[test]
    fn test_method_indices() {
        assert_eq!(BayerMethod::default(), BayerMethod::Nearest);
        assert_eq!(BayerMethod::from_index(2), Some(BayerMethod::Bilinear));
        assert_eq!(BayerMethod::from_index(7), Some(BayerMethod::Ahd));
        assert_eq!(BayerMethod::from_index(8), None);
        assert_eq!(BayerMethod::Vng.index(), 6);
    }

    #[test]
    fn test_nearest_single_cell() {
        // R G / G B with distinct greens
        let src = [200u8, 100, 90, 50];
        let mut out = Vec::new();
        debayer_u8(&src, 2, 2, ColorFilter::Rggb, BayerMethod::Nearest, &mut out).unwrap();
        assert_eq!(&out[0..3], &[200, 100, 50]);
        assert_eq!(&out[3..6], &[200, 100, 50]);
        assert_eq!(&out[6..9], &[200, 90, 50]);
        assert_eq!(&out[9..12], &[200, 90, 50]);
    }

    #[test]
    fn test_simple_averages_greens() {
        let src = [200u8, 100, 90, 50];
        let mut out = Vec::new();
        debayer_u8(&src, 2, 2, ColorFilter::Rggb, BayerMethod::Simple, &mut out).unwrap();
        assert!(out.chunks(3).all(|px| px == [200, 95, 50]));
    }

    #[test]
    fn test_odd_dimensions() {
        let src = flat_mosaic(ColorFilter::Gbrg, 5, 3, [10, 20, 30]);
        let mut out = Vec::new();
        debayer_u8(&src, 5, 3, ColorFilter::Gbrg, BayerMethod::Nearest, &mut out).unwrap();
        assert_eq!(out.len(), 5 * 3 * 3);
        assert!(out.chunks(3).all(|px| px == [10, 20, 30]));
    }

    #[test]
    fn test_sixteen_bit() {
        let src: Vec<u16> = vec![4000, 2000, 2000, 1000];
        let mut out = Vec::new();
        debayer_u16(&src, 2, 2, ColorFilter::Rggb, BayerMethod::Bilinear, &mut out).unwrap();
        assert!(out.chunks(3).all(|px| px == [4000, 2000, 1000]));
    }

    #[test]
    fn test_rejected_inputs() {
        let mut out = Vec::new();
        assert_eq!(
            debayer_u8(&[0; 4], 2, 2, ColorFilter::Rggb, BayerMethod::Vng, &mut out),
            Err(ProcessError::UnsupportedMethod(BayerMethod::Vng))
        );
        assert_eq!(
            debayer_u8(&[0; 3], 3, 1, ColorFilter::Rggb, BayerMethod::Nearest, &mut out),
            Err(ProcessError::TooSmall { width: 3, height: 1 })
        );
        assert_eq!(
            debayer_u8(&[0; 3], 2, 2, ColorFilter::Rggb, BayerMethod::Nearest, &mut out),
            Err(ProcessError::ShortBuffer { expected: 4, actual: 3 })
        );
    }

    proptest! {
        #[test]
        fn flat_scene_stays_flat(
            filter in prop::sample::select(ColorFilter::ALL.to_vec()),
            method in prop::sample::select(vec![
                BayerMethod::Nearest,
                BayerMethod::Simple,
                BayerMethod::Bilinear,
            ]),
            width in 2u32..12,
            height in 2u32..12,
            rgb in prop::array::uniform3(any::<u8>()),
        ) {
            let src = flat_mosaic(filter, width, height, rgb);
            let mut out = Vec::new();
            debayer_u8(&src, width, height, filter, method, &mut out).unwrap();
            prop_assert!(out.chunks(3).all(|px| px == rgb));
        }
    }
}
