//! Isochronous packet sizing for continuous modes
//!
//! A continuous-mode camera sends one packet per bus cycle, so the frame
//! rate follows from how many packets one image needs. The solver picks the
//! packet size that gets closest to a target rate within the camera's
//! granularity and maximum.

use serde::{Deserialize, Serialize};

/// Most packets one frame may be split into
const MAX_PACKETS_PER_FRAME: u64 = 4095;

/// Packet size and the rate it yields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacketPlan {
    /// Bytes per isochronous packet
    pub packet_size: u32,
    /// Packets needed for one frame
    pub packets_per_frame: u32,
    /// Resulting frame rate
    pub fps: f64,
}

/// Solve for the packet size that best approximates `rate` frames per second.
///
/// `bits_per_pixel` is the on-wire depth, `bus_period` the cycle time in
/// seconds and `unit`/`max` the camera's packet granularity and limit in
/// bytes. A `unit` of zero means the camera only supports `max`. Returns
/// `None` if the limits leave no usable packet size.
pub fn compute_packet_size(
    width: u32,
    height: u32,
    bits_per_pixel: u32,
    bus_period: f64,
    rate: f64,
    unit: u32,
    max: u32,
) -> Option<PacketPlan> {
    let unit = if unit == 0 { max } else { unit };
    if unit == 0 || bus_period <= 0.0 {
        return None;
    }

    let image_bits = u64::from(width) * u64::from(height) * u64::from(bits_per_pixel);
    if image_bits == 0 {
        return None;
    }

    // Saturating float-to-int cast maps a zero or absurd rate onto the limits.
    let packets = ((1.0 / (bus_period * rate)) + 0.5) as u64;
    let denominator = packets.clamp(1, MAX_PACKETS_PER_FRAME) * 8;

    let mut packet = image_bits.div_ceil(denominator).max(u64::from(unit));
    packet -= packet % u64::from(unit);
    if packet > u64::from(max) {
        packet = u64::from(max) - u64::from(max) % u64::from(unit);
    }
    if packet == 0 {
        return None;
    }

    let packets_per_frame = image_bits.div_ceil(packet * 8);
    Some(PacketPlan {
        packet_size: packet as u32,
        packets_per_frame: packets_per_frame as u32,
        fps: 1.0 / (bus_period * packets_per_frame as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const S400_PERIOD: f64 = 0.000125;

    #[test]
    fn test_vga_rgb_at_30hz() {
        let plan = compute_packet_size(640, 480, 24, S400_PERIOD, 30.0, 4, 4096).unwrap();
        assert_eq!(plan.packet_size, 3452);
        assert_eq!(plan.packets_per_frame, 267);
        assert!((plan.fps - 30.0).abs() < 0.5);
    }

    #[test]
    fn test_fastest_uses_max_packet() {
        let plan = compute_packet_size(640, 480, 24, S400_PERIOD, f64::MAX, 4, 4096).unwrap();
        assert_eq!(plan.packet_size, 4096);
        assert_eq!(plan.packets_per_frame, 225);
    }

    #[test]
    fn test_slow_rate_uses_minimum_packet() {
        // 4095 packets cap the spread, then the unit raises the size.
        let plan = compute_packet_size(8, 8, 8, S400_PERIOD, 0.01, 64, 4096).unwrap();
        assert_eq!(plan.packet_size, 64);
        assert_eq!(plan.packets_per_frame, 1);
    }

    #[test]
    fn test_zero_unit_falls_back_to_max() {
        let plan = compute_packet_size(640, 480, 8, S400_PERIOD, 15.0, 0, 2048).unwrap();
        assert_eq!(plan.packet_size, 2048);
    }

    #[test]
    fn test_unusable_limits() {
        assert!(compute_packet_size(640, 480, 8, S400_PERIOD, 15.0, 0, 0).is_none());
        assert!(compute_packet_size(640, 480, 8, S400_PERIOD, 15.0, 8, 4).is_none());
        assert!(compute_packet_size(0, 480, 8, S400_PERIOD, 15.0, 8, 4096).is_none());
    }

    proptest! {
        #[test]
        fn packet_size_grows_with_rate(
            width in 1u32..2048,
            height in 1u32..2048,
            depth in prop::sample::select(vec![8u32, 12, 16, 24]),
            unit in prop::sample::select(vec![4u32, 8, 64, 512]),
            low in 0.5f64..120.0,
            step in 0.0f64..120.0,
        ) {
            let high = low + step;
            let slow = compute_packet_size(width, height, depth, S400_PERIOD, low, unit, 4096).unwrap();
            let fast = compute_packet_size(width, height, depth, S400_PERIOD, high, unit, 4096).unwrap();
            prop_assert!(slow.packet_size <= fast.packet_size);
            prop_assert!(slow.fps <= fast.fps);
            prop_assert!(fast.packet_size % unit == 0);
            prop_assert!(fast.packet_size <= 4096);
        }
    }
}
