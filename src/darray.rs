//! Constant-time select over dense bitsets.
//!
//! Positions of matching bits are indexed per 1024-bit group: each group
//! stores either an absolute base plus 16-bit subgroup deltas, or — when the
//! group spans 64 KiB or more — a pointer into a verbatim position list.
//! The structure does not own the bitset; queries take the words alongside.

use std::borrow::Cow;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::Result;

const BLOCK_SIZE: usize = 1024;
const SUBBLOCK_SIZE: usize = 32;
const MAX_IN_BLOCK_DISTANCE: u64 = 1 << 16;
const OVERFLOW_FLAG: u64 = 1 << 63;

/// Which bit value a [`DArray`] indexes.
pub trait Polarity {
    fn word(raw: u64) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ones;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zeros;

impl Polarity for Ones {
    #[inline]
    fn word(raw: u64) -> u64 {
        raw
    }
}

impl Polarity for Zeros {
    #[inline]
    fn word(raw: u64) -> u64 {
        !raw
    }
}

/// Select index over set bits.
pub type DArray1<'a> = DArray<'a, Ones>;
/// Select index over unset bits.
pub type DArray0<'a> = DArray<'a, Zeros>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DArray<'a, P = Ones> {
    block_inventory: Cow<'a, [u64]>,
    subblock_inventory: Cow<'a, [u16]>,
    overflow_positions: Cow<'a, [u64]>,
    _polarity: std::marker::PhantomData<P>,
}

impl<'a, P: Polarity> DArray<'a, P> {
    /// Index the matching bits of `words`, of which only the first
    /// `num_bits` are significant.
    pub fn build(words: &[u64], num_bits: usize) -> DArray<'static, P> {
        let mut block_inventory = Vec::new();
        let mut subblock_inventory = Vec::new();
        let mut overflow_positions = Vec::new();
        let mut current: Vec<u64> = Vec::with_capacity(BLOCK_SIZE);

        for (wi, &raw) in words.iter().enumerate() {
            if wi * 64 >= num_bits {
                break;
            }
            let mut w = P::word(raw);
            if (wi + 1) * 64 > num_bits {
                let valid = num_bits - wi * 64;
                w &= (1u64 << valid) - 1;
            }
            while w != 0 {
                let pos = (wi * 64) as u64 + w.trailing_zeros() as u64;
                current.push(pos);
                if current.len() == BLOCK_SIZE {
                    flush_block(
                        &current,
                        &mut block_inventory,
                        &mut subblock_inventory,
                        &mut overflow_positions,
                    );
                    current.clear();
                }
                w &= w - 1;
            }
        }
        if !current.is_empty() {
            flush_block(
                &current,
                &mut block_inventory,
                &mut subblock_inventory,
                &mut overflow_positions,
            );
        }

        DArray {
            block_inventory: Cow::Owned(block_inventory),
            subblock_inventory: Cow::Owned(subblock_inventory),
            overflow_positions: Cow::Owned(overflow_positions),
            _polarity: std::marker::PhantomData,
        }
    }

    /// Position of the `i`-th matching bit of `words`, which must be the
    /// bitset this index was built over. `i` must be below the matching-bit
    /// count.
    #[inline]
    pub fn select(&self, words: &[u64], i: usize) -> usize {
        let entry = self.block_inventory[i / BLOCK_SIZE];
        if entry & OVERFLOW_FLAG != 0 {
            let base = (entry & !OVERFLOW_FLAG) as usize;
            return self.overflow_positions[base + i % BLOCK_SIZE] as usize;
        }
        let start = entry as usize + self.subblock_inventory[i / SUBBLOCK_SIZE] as usize;
        let mut k = i % SUBBLOCK_SIZE;
        if k == 0 {
            return start;
        }

        let mut wi = start >> 6;
        let mut w = P::word(words[wi]) & (!0u64 << (start & 63));
        loop {
            let ones = w.count_ones() as usize;
            if k < ones {
                return (wi << 6) + select_in_word(w, k);
            }
            k -= ones;
            wi += 1;
            w = P::word(words[wi]);
        }
    }

    pub fn size_bits(&self) -> usize {
        self.block_inventory.len() * 64
            + self.subblock_inventory.len() * 16
            + self.overflow_positions.len() * 64
    }

    pub fn into_owned(self) -> DArray<'static, P> {
        DArray {
            block_inventory: Cow::Owned(self.block_inventory.into_owned()),
            subblock_inventory: Cow::Owned(self.subblock_inventory.into_owned()),
            overflow_positions: Cow::Owned(self.overflow_positions.into_owned()),
            _polarity: std::marker::PhantomData,
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64_slice(&self.block_inventory);
        out.write_u16_slice(&self.subblock_inventory);
        out.write_u64_slice(&self.overflow_positions);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let block_inventory = input.read_u64_slice()?;
        let subblock_inventory = input.read_u16_slice()?;
        let overflow_positions = input.read_u64_slice()?;
        Ok(Self {
            block_inventory: Cow::Borrowed(block_inventory),
            subblock_inventory: Cow::Borrowed(subblock_inventory),
            overflow_positions: Cow::Borrowed(overflow_positions),
            _polarity: std::marker::PhantomData,
        })
    }
}

fn flush_block(
    positions: &[u64],
    block_inventory: &mut Vec<u64>,
    subblock_inventory: &mut Vec<u16>,
    overflow_positions: &mut Vec<u64>,
) {
    let first = positions[0];
    let last = *positions.last().unwrap();
    if last - first < MAX_IN_BLOCK_DISTANCE {
        block_inventory.push(first);
        for chunk in positions.chunks(SUBBLOCK_SIZE) {
            subblock_inventory.push((chunk[0] - first) as u16);
        }
    } else {
        block_inventory.push(overflow_positions.len() as u64 | OVERFLOW_FLAG);
        overflow_positions.extend_from_slice(positions);
        // Placeholder entries keep `i / 32` a direct index into the
        // subblock inventory across blocks.
        for _ in 0..positions.len().div_ceil(SUBBLOCK_SIZE) {
            subblock_inventory.push(0);
        }
    }
}

/// Position of the `k`-th set bit of `w`; `k` must be below `popcount(w)`.
#[inline]
fn select_in_word(mut w: u64, k: usize) -> usize {
    for _ in 0..k {
        w &= w - 1;
    }
    w.trailing_zeros() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AlignedBuf, ByteReader, ByteWriter};

    fn positions_of(words: &[u64], num_bits: usize, want_set: bool) -> Vec<usize> {
        (0..num_bits)
            .filter(|&i| {
                let set = words[i / 64] & (1u64 << (i % 64)) != 0;
                set == want_set
            })
            .collect()
    }

    #[test]
    fn select_on_small_pattern() {
        let words = [0b1011u64, 0b1101u64];
        let d = DArray1::build(&words, 128);
        let want = positions_of(&words, 128, true);
        for (i, &p) in want.iter().enumerate() {
            assert_eq!(d.select(&words, i), p);
        }

        let d0 = DArray0::build(&words, 128);
        let want0 = positions_of(&words, 128, false);
        for (i, &p) in want0.iter().enumerate() {
            assert_eq!(d0.select(&words, i), p);
        }
    }

    #[test]
    fn sparse_blocks_spill_to_overflow() {
        // One set bit every 4096 bits forces the 64 KiB span limit.
        let num_bits = BLOCK_SIZE * 4096 + 17;
        let mut words = vec![0u64; num_bits.div_ceil(64)];
        let mut want = Vec::new();
        let mut pos = 0usize;
        while pos < num_bits {
            words[pos / 64] |= 1u64 << (pos % 64);
            want.push(pos);
            pos += 4096;
        }
        let d = DArray1::build(&words, num_bits);
        assert!(!d.overflow_positions.is_empty());
        for (i, &p) in want.iter().enumerate() {
            assert_eq!(d.select(&words, i), p);
        }
    }

    #[test]
    fn trailing_partial_block() {
        let num_bits: usize = 3000;
        let mut words = vec![0u64; num_bits.div_ceil(64)];
        for i in (0..num_bits).step_by(3) {
            words[i / 64] |= 1u64 << (i % 64);
        }
        let d = DArray1::build(&words, num_bits);
        let want = positions_of(&words, num_bits, true);
        for (i, &p) in want.iter().enumerate() {
            assert_eq!(d.select(&words, i), p);
        }
    }

    #[test]
    fn serialization_round_trip() {
        let words: Vec<u64> = (0..64u64).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();
        let d = DArray1::build(&words, words.len() * 64);
        let mut w = ByteWriter::new();
        d.write_into(&mut w);
        let bytes = w.finish();
        let buf = AlignedBuf::from_bytes(&bytes);
        let mut r = ByteReader::new(buf.as_bytes()).unwrap();
        let back = DArray1::read_from(&mut r).unwrap();
        assert_eq!(back, d);
        assert_eq!(r.remaining(), 0);
    }
}
