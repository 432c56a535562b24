//! Banded linear systems over GF(2) for static value retrieval.
//!
//! Every key becomes one equation: a `w`-bit band of coefficients starting at
//! a hashed column, equal to an `r`-bit value. Insertion keeps the system in
//! staircase form by XOR elimination; back-substitution then turns it into a
//! flat table answering `lookup` with a handful of XORs.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::hash::{SeededHash, derive_hash_pair};
use crate::packed::{PackedArray, PackedArrayBuilder, low_mask};

/// Universe growth retry budget for [`solve_rows`].
const MAX_GROW_ROUNDS: usize = 50;

/// Outcome of one row insertion. `Redundant` is a legitimate no-op — the row
/// is already implied by the system — and distinct from `Conflict`, which
/// means the row contradicts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Row stored at this position; `clear_row` on it undoes the insertion.
    Placed(usize),
    Redundant,
    Conflict,
}

/// One hashed equation: start column from `start_hash`, band bits from
/// `band_hash`, right-hand side `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RibbonRow {
    pub start_hash: u64,
    pub band_hash: u64,
    pub value: u64,
}

impl RibbonRow {
    pub fn from_key<K: SeededHash + ?Sized>(key: &K, seed: u64, value: u64) -> Self {
        let (start_hash, band_hash) = derive_hash_pair(key.hash_seeded(seed));
        Self {
            start_hash,
            band_hash,
            value,
        }
    }

    /// Start column and band coefficients for a table of `positions` slots.
    /// The band's low bit is always forced on: the leading column of an
    /// equation is occupied by construction.
    #[inline]
    pub fn place(&self, positions: usize, band_width: usize) -> (usize, u64) {
        debug_assert!(positions > band_width);
        let start = (self.start_hash % (positions - band_width) as u64) as usize;
        let band = (self.band_hash & low_mask(band_width)) | 1;
        (start, band)
    }
}

/// In-progress banded system with `positions` rows.
///
/// Invariant: a stored nonzero band at position `i` has its lowest set bit at
/// column `i`; empty rows are all-zero.
#[derive(Debug, Clone)]
pub struct BandingSystem {
    band_width: usize,
    coeffs: PackedArrayBuilder,
    values: PackedArrayBuilder,
}

impl BandingSystem {
    pub fn new(positions: usize, value_width: usize, band_width: usize) -> Self {
        assert!(
            (2..=64).contains(&band_width),
            "band width must be in [2, 64]"
        );
        assert!(positions > band_width, "need more positions than band bits");
        Self {
            band_width,
            coeffs: PackedArrayBuilder::new(band_width, positions),
            values: PackedArrayBuilder::new(value_width, positions),
        }
    }

    pub fn positions(&self) -> usize {
        self.coeffs.len()
    }

    pub fn band_width(&self) -> usize {
        self.band_width
    }

    /// Eliminates the row against the system until it reaches an empty slot,
    /// vanishes (redundant) or contradicts (conflict).
    pub fn insert(&mut self, mut i: usize, mut band: u64, mut value: u64) -> InsertResult {
        assert!(band & 1 == 1, "band low bit must be set");
        loop {
            let existing = self.coeffs.get(i);
            if existing == 0 {
                self.coeffs.set_from_zero(i, band);
                self.values.set_from_zero(i, value);
                return InsertResult::Placed(i);
            }
            band ^= existing;
            value ^= self.values.get(i);
            if band == 0 {
                return if value == 0 {
                    InsertResult::Redundant
                } else {
                    InsertResult::Conflict
                };
            }
            let shift = band.trailing_zeros() as usize;
            band >>= shift;
            i += shift;
        }
    }

    /// Drops the row stored at `i`, restoring the slot to empty. Used to
    /// back out speculative insertions.
    pub fn clear_row(&mut self, i: usize) {
        self.coeffs.set_to_zero(i);
        self.values.set_to_zero(i);
    }

    /// Back-substitution from the last position down, tracking one `w`-bit
    /// solution window per value bit.
    pub fn solve(self) -> RibbonTable<'static> {
        let positions = self.coeffs.len();
        let value_width = self.values.width();
        let mut table = PackedArrayBuilder::new(value_width, positions);
        let mut state = vec![0u64; value_width];
        for i in (0..positions).rev() {
            let band = self.coeffs.get(i);
            let value = self.values.get(i);
            let mut solved = 0u64;
            for (j, window) in state.iter_mut().enumerate() {
                let mut tmp = *window << 1;
                let bit = ((tmp & band).count_ones() as u64 & 1) ^ ((value >> j) & 1);
                tmp |= bit;
                *window = tmp;
                solved |= bit << j;
            }
            table.set_from_zero(i, solved);
        }
        RibbonTable {
            data: table.finish(),
        }
    }
}

/// Solved retrieval table: one `r`-bit entry per position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RibbonTable<'a> {
    data: PackedArray<'a>,
}

impl<'a> RibbonTable<'a> {
    /// XOR of the table entries selected by the band, walking its set bits.
    #[inline]
    pub fn lookup(&self, mut i: usize, mut band: u64) -> u64 {
        debug_assert!(band & 1 == 1, "band low bit must be set");
        let mut acc = 0u64;
        loop {
            acc ^= self.data.get(i);
            band >>= 1;
            i += 1;
            if band == 0 {
                return acc;
            }
            let shift = band.trailing_zeros() as usize;
            i += shift;
            band >>= shift;
        }
    }

    pub fn positions(&self) -> usize {
        self.data.len()
    }

    pub fn value_width(&self) -> usize {
        self.data.width()
    }

    pub fn size_bits(&self) -> usize {
        self.data.size_bits() + 64
    }

    pub fn into_owned(self) -> RibbonTable<'static> {
        RibbonTable {
            data: self.data.into_owned(),
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64(self.data.len() as u64);
        self.data.write_into(out);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let positions = input.read_u64()? as usize;
        let data = PackedArray::read_from(input)?;
        if data.len() != positions {
            return Err(Error::CorruptData);
        }
        Ok(Self { data })
    }
}

/// One-shot solve with a growing universe: insert every row, and on conflict
/// rebuild with roughly 10% more positions, up to 50 rounds.
pub fn solve_rows(
    rows: &[RibbonRow],
    value_width: usize,
    band_width: usize,
    start_positions: usize,
) -> Result<RibbonTable<'static>> {
    let grow = (rows.len() / 10).max(1);
    let mut positions = start_positions;
    for _ in 0..MAX_GROW_ROUNDS {
        positions = positions.max(band_width + 1);
        let mut system = BandingSystem::new(positions, value_width, band_width);
        let mut ok = true;
        for row in rows {
            let (i, band) = row.place(positions, band_width);
            if system.insert(i, band, row.value) == InsertResult::Conflict {
                ok = false;
                break;
            }
        }
        if ok {
            return Ok(system.solve());
        }
        positions += grow;
    }
    Err(Error::HashCollision)
}
