//! Ring hash function.
//!
//! FNV-1a (64-bit) over the input bytes, followed by the MurmurHash3
//! `fmix64` finalizer. FNV alone clusters short, similar keys such as
//! `"node#0-1"` / `"node#0-2"` in the high bits; the finalizer spreads
//! them over the whole ring. The output is stable across processes,
//! platforms, and releases.

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Hash a key onto the ring.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    fmix64(hash)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}
