//! Sample-level helpers for delivered frames

/// Copy `src` into `out`, moving 9..=15 bit samples up so their most
/// significant bit lands in bit 15 of each 16-bit word. Other depths are
/// copied unchanged.
pub fn shift_to_msb(src: &[u8], data_depth: u32, out: &mut Vec<u8>) {
    out.clear();
    out.extend_from_slice(src);
    shift_to_msb_in_place(out, data_depth);
}

pub fn shift_to_msb_in_place(data: &mut [u8], data_depth: u32) {
    if !(9..16).contains(&data_depth) {
        return;
    }
    let shift = 16 - data_depth;
    for word in data.chunks_exact_mut(2) {
        let value = u16::from_ne_bytes([word[0], word[1]]) << shift;
        word.copy_from_slice(&value.to_ne_bytes());
    }
}

/// Mean sample value normalized to `0.0..=1.0`. Samples are bytes for
/// `data_depth <= 8` and native-endian 16-bit words otherwise, unshifted.
pub fn summed_intensity(data: &[u8], width: u32, height: u32, layers: u32, data_depth: u32) -> f64 {
    let layers = if layers == 3 { 3 } else { 1 };
    let count = width as usize * height as usize * layers;
    if count == 0 {
        return 0.0;
    }

    let (sum, max) = if data_depth <= 8 {
        let sum: u64 = data.iter().take(count).map(|&b| u64::from(b)).sum();
        (sum, 255.0)
    } else {
        let sum: u64 = data
            .chunks_exact(2)
            .take(count)
            .map(|w| u64::from(u16::from_ne_bytes([w[0], w[1]])))
            .sum();
        (sum, ((1u64 << data_depth.min(16)) - 1) as f64)
    };
    sum as f64 / count as f64 / max
}
