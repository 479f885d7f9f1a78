//! RPLIDAR C1 standard-scan record codec.
//!
//! Record layout (5 bytes):
//!
//! | byte | bits                                       |
//! |------|--------------------------------------------|
//! | 0    | bit0 = S, bit1 = !S, bits2-7 = quality     |
//! | 1    | bit0 = C (always 1), bits1-7 = angle[0..7] |
//! | 2    | angle[7..15]                               |
//! | 3-4  | distance, little-endian Q2 mm              |
//!
//! The angle is a Q6 fixed-point value in degrees.

use crate::types::Sample;

pub const RECORD_LEN: usize = 5;

/// Try to decode one record at the head of `buf`.
///
/// Returns the sample and the number of bytes to advance:
/// `(Some(sample), 5)` on a valid record, `(None, 1)` when the head byte does
/// not start a record (skip it and retry), `(None, 0)` when fewer than five
/// bytes are buffered.
pub fn decode_next(buf: &[u8]) -> (Option<Sample>, usize) {
    if buf.len() < RECORD_LEN {
        return (None, 0);
    }
    let (b0, b1, b2, b3, b4) = (buf[0], buf[1], buf[2], buf[3], buf[4]);

    let s = b0 & 0x01;
    let s_bar = (b0 >> 1) & 0x01;
    let c = b1 & 0x01;
    if s == s_bar || c != 1 {
        return (None, 1);
    }

    let quality = b0 >> 2;
    let angle_q6 = ((b2 as u16) << 7) | ((b1 as u16) >> 1);
    let dist_q2 = ((b4 as u16) << 8) | (b3 as u16);

    let sample = Sample {
        angle_deg: (angle_q6 as f64 / 64.0) % 360.0,
        distance_mm: dist_q2 as f64 / 4.0,
        quality,
        start_flag: s == 1,
    };
    (Some(sample), RECORD_LEN)
}

/// Encode a sample into its wire record.
///
/// Angle is rounded to 1/64°, distance to 0.25 mm; both saturate at their
/// field widths. Quality is truncated to 6 bits.
pub fn encode_sample(
    quality: u8,
    angle_deg: f64,
    distance_mm: f64,
    start_flag: bool,
) -> [u8; RECORD_LEN] {
    let angle = angle_deg.rem_euclid(360.0);
    let angle_q6 = (angle * 64.0).round().clamp(0.0, 32767.0) as u16;
    let dist_q2 = (distance_mm * 4.0).round().clamp(0.0, u16::MAX as f64) as u16;

    let s = start_flag as u8;
    let b0 = ((quality & 0x3F) << 2) | ((s ^ 1) << 1) | s;
    let b1 = (((angle_q6 & 0x7F) as u8) << 1) | 0x01;
    let b2 = (angle_q6 >> 7) as u8;
    let [b3, b4] = dist_q2.to_le_bytes();
    [b0, b1, b2, b3, b4]
}
