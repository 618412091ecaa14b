//! Address prefix matching.
//!
//! Mesh addresses are fixed-width byte strings of which only the leading
//! `nbits` bits are meaningful. Two addresses match when their prefixes
//! agree out to the shorter of the two lengths; a zero-bit prefix matches
//! everything. Both the cache query path and the key responder target
//! selection go through here.

use crate::packet::{ADDRESS_BITS, ADDRESS_SIZE};

/// Count of equal leading bits between two addresses, never exceeding
/// the shorter of the two advertised lengths (clamped to ADDRESS_BITS).
///
/// Comparison is byte-then-bit: whole equal bytes first, then the leading
/// zeros of the first differing byte's XOR.
pub fn matching_bits(
    a: &[u8; ADDRESS_SIZE],
    a_nbits: u8,
    b: &[u8; ADDRESS_SIZE],
    b_nbits: u8,
) -> u8 {
    let limit = a_nbits.min(b_nbits).min(ADDRESS_BITS) as u32;
    let mut count = 0u32;
    for i in 0..ADDRESS_SIZE {
        if count >= limit {
            break;
        }
        let diff = a[i] ^ b[i];
        if diff == 0 {
            count += 8;
        } else {
            count += diff.leading_zeros();
            break;
        }
    }
    count.min(limit) as u8
}

/// True when the two prefixes agree out to `min(a_nbits, b_nbits)` bits.
pub fn matches(a: &[u8; ADDRESS_SIZE], a_nbits: u8, b: &[u8; ADDRESS_SIZE], b_nbits: u8) -> bool {
    let limit = a_nbits.min(b_nbits).min(ADDRESS_BITS);
    matching_bits(a, a_nbits, b, b_nbits) >= limit
}

/// Zero every bit past the first `nbits`, so equal prefixes compare equal
/// byte-for-byte on the wire.
pub fn clamp(address: &mut [u8; ADDRESS_SIZE], nbits: u8) {
    let nbits = nbits.min(ADDRESS_BITS) as usize;
    let full_bytes = nbits / 8;
    let rem = nbits % 8;
    if rem != 0 {
        address[full_bytes] &= 0xFFu8 << (8 - rem);
    }
    for byte in address.iter_mut().skip(full_bytes + usize::from(rem != 0)) {
        *byte = 0;
    }
}
