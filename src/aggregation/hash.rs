//! 64-bit FNV-1a fingerprint of metric names.

/// FNV-1a 64-bit offset basis
pub const FNV_OFFSET: u64 = 14695981039346656037;
/// FNV-1a 64-bit prime
pub const FNV_PRIME: u64 = 1099511628211;

/// Hash a metric name into its storage key.
///
/// Empty input yields [`FNV_OFFSET`].
#[inline]
pub const fn fnv1a(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < data.len() {
        hash ^= data[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}
