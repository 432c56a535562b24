//! Seeded 64-bit key hashing and the derived mixes used by the builders.

use wyhash::wyhash;

/// Keys usable with the builders: anything reducible to a well-mixed 64-bit
/// fingerprint under an explicit seed. Seeds are always caller-provided;
/// there is no hidden default.
pub trait SeededHash {
    fn hash_seeded(&self, seed: u64) -> u64;
}

impl SeededHash for u64 {
    #[inline]
    fn hash_seeded(&self, seed: u64) -> u64 {
        wyhash(&self.to_le_bytes(), seed)
    }
}

impl SeededHash for [u8] {
    #[inline]
    fn hash_seeded(&self, seed: u64) -> u64 {
        wyhash(self, seed)
    }
}

impl SeededHash for str {
    #[inline]
    fn hash_seeded(&self, seed: u64) -> u64 {
        wyhash(self.as_bytes(), seed)
    }
}

impl<T: SeededHash + ?Sized> SeededHash for &T {
    #[inline]
    fn hash_seeded(&self, seed: u64) -> u64 {
        (**self).hash_seeded(seed)
    }
}

impl SeededHash for Vec<u8> {
    #[inline]
    fn hash_seeded(&self, seed: u64) -> u64 {
        self.as_slice().hash_seeded(seed)
    }
}

impl SeededHash for String {
    #[inline]
    fn hash_seeded(&self, seed: u64) -> u64 {
        self.as_str().hash_seeded(seed)
    }
}

#[inline]
pub(crate) fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Two independent streams derived from one key fingerprint; the ribbon
/// row mapping consumes one for the start column and one for the band.
#[inline]
pub(crate) fn derive_hash_pair(base: u64) -> (u64, u64) {
    (
        mix64(base ^ 0xA24B_1F6F_DA39_2B31),
        mix64(base ^ 0xE703_7ED1_A0B4_28DB),
    )
}

/// Slot mix for the pivot search: two chained wyhash rounds over the 64-bit
/// little-endian encodings, composing the pivot independently of the key
/// fingerprint.
#[inline]
pub(crate) fn pivot_stream(seed: u64, pivot: u64) -> u64 {
    wyhash(&pivot.to_le_bytes(), seed)
}

#[inline]
pub(crate) fn slot_hash(pivot_stream: u64, key_hash: u64) -> u64 {
    wyhash(&key_hash.to_le_bytes(), pivot_stream)
}
