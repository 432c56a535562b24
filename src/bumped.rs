//! Layered ribbon retrieval with per-bucket bumping.
//!
//! Rows that would make a layer's linear system unsolvable are not forced in:
//! each bucket stores a 2-bit threshold code, and every row whose in-bucket
//! offset falls below the decoded threshold is bumped into the next layer.
//! After at most four layers a plain ribbon with a widened universe absorbs
//! whatever is left, so every key is answered by exactly one table.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::hash::SeededHash;
use crate::packed::{PackedArray, PackedArrayBuilder, bits_for};
use crate::ribbon::{BandingSystem, InsertResult, RibbonRow, RibbonTable, solve_rows};

const MAX_LAYERS: usize = 4;
/// Below this row count cascading another layer stops paying for itself and
/// the remainder goes straight to the fallback ribbon.
const MIN_LAYER_ROWS: usize = 2048;

/// Build parameters for [`BumpedRibbon`].
#[derive(Debug, Clone)]
pub struct RibbonConfig {
    /// Band width, in `[2, 64]`.
    pub band_width: usize,
    /// Slack factor on each layer's table size.
    pub eps: f64,
    /// Bits per stored value; inferred from the largest value when `None`.
    pub value_width: Option<usize>,
    /// Seed retry budget for the random-seed builds.
    pub max_attempts: u32,
}

impl Default for RibbonConfig {
    fn default() -> Self {
        Self {
            band_width: 32,
            eps: 0.0,
            value_width: None,
            max_attempts: 16,
        }
    }
}

/// Per-layer lookup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerLookup {
    Hit(u64),
    Bumped,
}

/// One retrieval layer: a solved table plus the bucket threshold codes that
/// say which rows were pushed to the next layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpedLayer<'a> {
    bucket_size: usize,
    upper_threshold: usize,
    lower_threshold: usize,
    thresholds: PackedArray<'a>,
    table: RibbonTable<'a>,
}

impl<'a> BumpedLayer<'a> {
    #[inline]
    fn threshold(&self, code: u64) -> usize {
        match code {
            0 => 0,
            1 => self.lower_threshold,
            2 => self.upper_threshold,
            _ => self.bucket_size,
        }
    }

    #[inline]
    pub fn lookup(&self, row: &RibbonRow, band_width: usize) -> LayerLookup {
        let (start, band) = row.place(self.table.positions(), band_width);
        let code = self.thresholds.get(start / self.bucket_size);
        if start % self.bucket_size < self.threshold(code) {
            LayerLookup::Bumped
        } else {
            LayerLookup::Hit(self.table.lookup(start, band))
        }
    }

    pub fn size_bits(&self) -> usize {
        self.thresholds.size_bits() + self.table.size_bits() + 3 * 64
    }

    pub fn into_owned(self) -> BumpedLayer<'static> {
        BumpedLayer {
            bucket_size: self.bucket_size,
            upper_threshold: self.upper_threshold,
            lower_threshold: self.lower_threshold,
            thresholds: self.thresholds.into_owned(),
            table: self.table.into_owned(),
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64(self.bucket_size as u64);
        out.write_u64(self.upper_threshold as u64);
        out.write_u64(self.lower_threshold as u64);
        self.thresholds.write_into(out);
        self.table.write_into(out);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let bucket_size = input.read_u64()? as usize;
        let upper_threshold = input.read_u64()? as usize;
        let lower_threshold = input.read_u64()? as usize;
        if bucket_size == 0 || upper_threshold > bucket_size {
            return Err(Error::CorruptData);
        }
        let thresholds = PackedArray::read_from(input)?;
        let table = RibbonTable::read_from(input)?;
        Ok(Self {
            bucket_size,
            upper_threshold,
            lower_threshold,
            thresholds,
            table,
        })
    }
}

/// Static key → value retrieval over `r`-bit values.
///
/// Returns the stored value for every key of the build set; the result for
/// unknown keys is unspecified. Keys themselves are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpedRibbon<'a> {
    band_width: usize,
    seed: u64,
    layers: Vec<BumpedLayer<'a>>,
    fallback: RibbonTable<'a>,
}

impl<'a> BumpedRibbon<'a> {
    /// Deterministic build from `(key, value)` pairs.
    pub fn build_with_seed<K: SeededHash>(
        pairs: &[(K, u64)],
        config: &RibbonConfig,
        seed: u64,
    ) -> Result<Self> {
        let band_width = config.band_width;
        assert!(
            (2..=64).contains(&band_width),
            "band width must be in [2, 64]"
        );
        let value_width = config
            .value_width
            .unwrap_or_else(|| bits_for(pairs.iter().map(|(_, v)| *v).max().unwrap_or(0)));

        let mut remaining: Vec<RibbonRow> = pairs
            .iter()
            .map(|(k, v)| RibbonRow::from_key(k, seed, *v))
            .collect();

        let mut layers = Vec::new();
        while !remaining.is_empty() && layers.len() < MAX_LAYERS {
            if !layers.is_empty() && remaining.len() < MIN_LAYER_ROWS {
                break;
            }
            let (layer, bumped) = build_layer(&remaining, value_width, band_width, config.eps);
            layers.push(layer);
            remaining = bumped;
        }

        let fallback = solve_rows(
            &remaining,
            value_width,
            band_width,
            remaining.len().max(band_width + 1),
        )?;

        Ok(Self {
            band_width,
            seed,
            layers,
            fallback,
        })
    }

    /// Retries fresh seeds from `rng` up to `config.max_attempts` times.
    pub fn build_with_rng<K: SeededHash, R: RngCore>(
        pairs: &[(K, u64)],
        config: &RibbonConfig,
        rng: &mut R,
    ) -> Result<Self> {
        for _ in 0..config.max_attempts.max(1) {
            match Self::build_with_seed(pairs, config, rng.next_u64()) {
                Err(Error::HashCollision) => continue,
                other => return other,
            }
        }
        Err(Error::HashCollision)
    }

    /// Random-seed build drawing from OS entropy.
    pub fn build<K: SeededHash>(pairs: &[(K, u64)], config: &RibbonConfig) -> Result<Self> {
        Self::build_with_rng(pairs, config, &mut OsRng)
    }

    /// Value stored for `key`; arbitrary when `key` was not in the build set.
    #[inline]
    pub fn lookup<K: SeededHash + ?Sized>(&self, key: &K) -> u64 {
        let row = RibbonRow::from_key(key, self.seed, 0);
        for layer in &self.layers {
            if let LayerLookup::Hit(v) = layer.lookup(&row, self.band_width) {
                return v;
            }
        }
        let (start, band) = row.place(self.fallback.positions(), self.band_width);
        self.fallback.lookup(start, band)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn band_width(&self) -> usize {
        self.band_width
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn size_bits(&self) -> usize {
        self.layers.iter().map(BumpedLayer::size_bits).sum::<usize>()
            + self.fallback.size_bits()
            + 3 * 64
    }

    pub fn into_owned(self) -> BumpedRibbon<'static> {
        BumpedRibbon {
            band_width: self.band_width,
            seed: self.seed,
            layers: self.layers.into_iter().map(BumpedLayer::into_owned).collect(),
            fallback: self.fallback.into_owned(),
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64(self.band_width as u64);
        out.write_u64(self.seed);
        out.write_u64(self.layers.len() as u64);
        for layer in &self.layers {
            layer.write_into(out);
        }
        self.fallback.write_into(out);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let band_width = input.read_u64()? as usize;
        if !(2..=64).contains(&band_width) {
            return Err(Error::CorruptData);
        }
        let seed = input.read_u64()?;
        let num_layers = input.read_u64()? as usize;
        if num_layers > MAX_LAYERS {
            return Err(Error::CorruptData);
        }
        let mut layers = Vec::with_capacity(num_layers);
        for _ in 0..num_layers {
            layers.push(BumpedLayer::read_from(input)?);
        }
        let fallback = RibbonTable::read_from(input)?;
        Ok(Self {
            band_width,
            seed,
            layers,
            fallback,
        })
    }
}

/// Builds one layer and returns it with the rows it bumped.
///
/// Rows are inserted bucket by bucket in descending start order, so the first
/// conflict in a bucket pins down exactly the suffix that must escape: the
/// chosen threshold cuts every row below it, and the already-placed ones
/// among them are backed out with `clear_row`.
fn build_layer(
    rows: &[RibbonRow],
    value_width: usize,
    band_width: usize,
    eps: f64,
) -> (BumpedLayer<'static>, Vec<RibbonRow>) {
    let n = rows.len();
    let positions = (((n as f64) * (1.0 + eps)).ceil() as usize).max(band_width + 1);
    let bucket_size = (band_width * band_width / (4 * bits_for(band_width as u64 - 1))).max(1);
    let lower_threshold = bucket_size / 7;
    let upper_threshold = bucket_size / 4;
    let num_buckets = (positions - band_width).div_ceil(bucket_size).max(1);

    // (start, band, row index), sorted by start column.
    let mut placed: Vec<(usize, u64, u32)> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let (start, band) = row.place(positions, band_width);
            (start, band, idx as u32)
        })
        .collect();
    placed.sort_unstable_by_key(|&(start, _, _)| start);

    let mut system = BandingSystem::new(positions, value_width, band_width);
    let mut thresholds = PackedArrayBuilder::new(2, num_buckets);
    let mut bumped = Vec::new();

    let mut cursor = 0usize;
    for bucket in 0..num_buckets {
        let bucket_start = bucket * bucket_size;
        let bucket_end = bucket_start + bucket_size;
        let begin = cursor;
        while cursor < placed.len() && placed[cursor].0 < bucket_end {
            cursor += 1;
        }
        let end = cursor;

        let mut inserted: Vec<(usize, usize)> = Vec::with_capacity(end - begin);
        let mut bump_offset = 0usize;
        for s in (begin..end).rev() {
            let (start, band, idx) = placed[s];
            match system.insert(start, band, rows[idx as usize].value) {
                InsertResult::Placed(slot) => inserted.push((slot, s)),
                InsertResult::Redundant => {}
                InsertResult::Conflict => {
                    bump_offset = start - bucket_start + 1;
                    break;
                }
            }
        }

        let code = [0, lower_threshold, upper_threshold, bucket_size]
            .iter()
            .position(|&t| t >= bump_offset)
            .unwrap();
        let threshold = [0, lower_threshold, upper_threshold, bucket_size][code];
        thresholds.set_from_zero(bucket, code as u64);

        for &(slot, s) in &inserted {
            if placed[s].0 - bucket_start < threshold {
                system.clear_row(slot);
            }
        }
        for &(start, _, idx) in &placed[begin..end] {
            if start - bucket_start < threshold {
                bumped.push(rows[idx as usize]);
            }
        }
    }

    let layer = BumpedLayer {
        bucket_size,
        upper_threshold,
        lower_threshold,
        thresholds: thresholds.finish(),
        table: system.solve(),
    };
    (layer, bumped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AlignedBuf, ByteReader, ByteWriter};

    fn pairs(n: u64, seed: u64) -> Vec<(u64, u64)> {
        (0..n)
            .map(|k| (k, crate::hash::mix64(k ^ seed) & 0xFF))
            .collect()
    }

    #[test]
    fn retrieves_every_value() {
        let pairs = pairs(5000, 11);
        let config = RibbonConfig {
            value_width: Some(8),
            ..RibbonConfig::default()
        };
        let ribbon = BumpedRibbon::build_with_seed(&pairs, &config, 100).unwrap();
        for (k, v) in &pairs {
            assert_eq!(ribbon.lookup(k), *v);
        }
    }

    #[test]
    fn zero_eps_forces_bumping() {
        let pairs = pairs(4096, 3);
        let config = RibbonConfig {
            value_width: Some(8),
            eps: 0.0,
            ..RibbonConfig::default()
        };
        let ribbon = BumpedRibbon::build_with_seed(&pairs, &config, 42).unwrap();
        assert!(ribbon.num_layers() >= 1);
        for (k, v) in &pairs {
            assert_eq!(ribbon.lookup(k), *v);
        }
    }

    #[test]
    fn empty_input_answers_from_fallback() {
        let pairs: Vec<(u64, u64)> = Vec::new();
        let ribbon = BumpedRibbon::build_with_seed(&pairs, &RibbonConfig::default(), 1).unwrap();
        assert_eq!(ribbon.num_layers(), 0);
        // Arbitrary but in-range and crash-free.
        let _ = ribbon.lookup(&77u64);
    }

    #[test]
    fn wide_band_small_input() {
        let pairs = pairs(10, 5);
        let config = RibbonConfig {
            band_width: 64,
            value_width: Some(8),
            ..RibbonConfig::default()
        };
        let ribbon = BumpedRibbon::build_with_seed(&pairs, &config, 8).unwrap();
        for (k, v) in &pairs {
            assert_eq!(ribbon.lookup(k), *v);
        }
    }

    #[test]
    fn serialization_round_trip() {
        let pairs = pairs(3000, 21);
        let config = RibbonConfig {
            value_width: Some(8),
            ..RibbonConfig::default()
        };
        let ribbon = BumpedRibbon::build_with_seed(&pairs, &config, 77).unwrap();

        let mut w = ByteWriter::new();
        ribbon.write_into(&mut w);
        let bytes = w.finish();
        let buf = AlignedBuf::from_bytes(&bytes);
        let mut r = ByteReader::new(buf.as_bytes()).unwrap();
        let back = BumpedRibbon::read_from(&mut r).unwrap();
        assert_eq!(back, ribbon);
        assert_eq!(r.remaining(), 0);
        for (k, v) in &pairs {
            assert_eq!(back.lookup(k), *v);
        }
    }
}
