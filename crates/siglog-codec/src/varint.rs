//! Variable-length integer encoding.
//!
//! 7 payload bits per byte with the continuation flag in the high bit,
//! most-significant group first. At most 4 bytes, so encodable values are
//! bounded at 2^28 - 1 — a hard format limit on string-table size and
//! per-field indices.

/// Largest value representable in a 4-byte varint.
pub const MAX: u32 = (1 << 28) - 1;

/// Append `value` to `buf` as a varint. Values above [`MAX`] are a caller
/// contract violation.
#[inline]
pub fn write(buf: &mut Vec<u8>, value: u32) {
    debug_assert!(value <= MAX, "varint value out of range: {value}");
    let mut started = false;
    for shift in [21u32, 14, 7] {
        let group = ((value >> shift) & 0x7F) as u8;
        if started || group != 0 {
            buf.push(group | 0x80);
            started = true;
        }
    }
    buf.push((value & 0x7F) as u8);
}

/// Decode a varint from the front of `data`. Returns `(value, bytes_read)`,
/// or `None` if the input is truncated or runs past the 4-byte limit.
#[inline]
pub fn read(data: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &b) in data.iter().enumerate().take(4) {
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    // Truncated, or a 4th byte still carried the continuation flag.
    None
}

/// Number of bytes `value` occupies when varint-encoded.
#[inline]
pub fn encoded_len(value: u32) -> usize {
    match value {
        0..0x80 => 1,
        0x80..0x4000 => 2,
        0x4000..0x20_0000 => 3,
        _ => 4,
    }
}
