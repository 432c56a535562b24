//! Minimal perfect hashing via per-bucket pivot search.
//!
//! Keys hash into size-skewed buckets; buckets are placed from largest to
//! smallest, each searching for the smallest pivot that lands every member in
//! a free slot. With a load factor below one the search runs over extra
//! slots, and hits above `n` are rerouted through an Elias–Fano map of the
//! unused slots so the final function stays minimal.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::codec::{ByteReader, ByteWriter};
use crate::elias_fano::EliasFano;
use crate::error::{Error, Result};
use crate::hash::{SeededHash, pivot_stream, slot_hash};
use crate::packed::{DictArray, PackedArray, bits_for};

/// Pivot search gives up on a bucket after this many candidates and reports
/// the build attempt as a collision.
const MAX_PIVOT_ATTEMPTS: u64 = 1 << 20;

/// Skewed hash-to-bucket map: roughly 60% of keys land in the first 30% of
/// buckets, which concentrates the hard-to-place buckets where the search
/// visits them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucketer {
    n: u64,
    m: u64,
    p1: u64,
    p2: u64,
}

impl Bucketer {
    pub fn new(n: u64, c: u64) -> Self {
        assert!(n > 0, "bucketer needs at least one slot");
        assert!(c > 0, "bucket density must be positive");
        let m = (c * n / bits_for(n) as u64).max(1);
        let p1 = (0.6 * n as f64) as u64;
        let p2 = (0.3 * m as f64) as u64;
        Self { n, m, p1, p2 }
    }

    #[inline]
    pub fn bucket(&self, h: u64) -> u64 {
        if self.p2 > 0 && h % self.n < self.p1 {
            h % self.p2
        } else {
            self.p2 + h % (self.m - self.p2)
        }
    }

    /// Number of buckets.
    pub fn buckets(&self) -> u64 {
        self.m
    }

    /// Size of the slot universe the bucketer was built for.
    pub fn slots(&self) -> u64 {
        self.n
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64(self.n);
        out.write_u64(self.m);
        out.write_u64(self.p1);
        out.write_u64(self.p2);
    }

    pub fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let n = input.read_u64()?;
        let m = input.read_u64()?;
        let p1 = input.read_u64()?;
        let p2 = input.read_u64()?;
        if n == 0 || m == 0 || p2 >= m {
            return Err(Error::CorruptData);
        }
        Ok(Self { n, m, p1, p2 })
    }
}

/// Build parameters.
///
/// Larger `c` builds faster and spends more bits per key; smaller `alpha`
/// makes placement easier at the cost of the free-slot map.
#[derive(Debug, Clone)]
pub struct MphfConfig {
    pub c: u64,
    pub alpha: f64,
    /// Seed retry budget for the random-seed builds.
    pub max_attempts: u32,
}

impl Default for MphfConfig {
    fn default() -> Self {
        Self {
            c: 7,
            alpha: 0.95,
            max_attempts: 1000,
        }
    }
}

/// Storage strategy for the per-bucket pivots.
///
/// [`PackedArray`] is the plain choice; [`DictArray`] wins when pivots repeat
/// heavily, which they do at high load factors.
pub trait PivotEncoding<'a>: Sized {
    fn encode(values: &[u64]) -> Self;
    fn get(&self, i: usize) -> u64;
    fn size_bits(&self) -> usize;
    fn write_into(&self, out: &mut ByteWriter);
    fn read_from(input: &mut ByteReader<'a>) -> Result<Self>;
}

impl<'a> PivotEncoding<'a> for PackedArray<'a> {
    fn encode(values: &[u64]) -> Self {
        PackedArray::encode(values)
    }

    #[inline]
    fn get(&self, i: usize) -> u64 {
        PackedArray::get(self, i)
    }

    fn size_bits(&self) -> usize {
        PackedArray::size_bits(self)
    }

    fn write_into(&self, out: &mut ByteWriter) {
        PackedArray::write_into(self, out)
    }

    fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        PackedArray::read_from(input)
    }
}

impl<'a> PivotEncoding<'a> for DictArray<'a> {
    fn encode(values: &[u64]) -> Self {
        DictArray::encode(values)
    }

    #[inline]
    fn get(&self, i: usize) -> u64 {
        DictArray::get(self, i)
    }

    fn size_bits(&self) -> usize {
        DictArray::size_bits(self)
    }

    fn write_into(&self, out: &mut ByteWriter) {
        DictArray::write_into(self, out)
    }

    fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        DictArray::read_from(input)
    }
}

/// Minimal perfect hash function: a bijection from the build key set onto
/// `[0, n)`. Keys are never stored; evaluating an unknown key returns an
/// arbitrary in-range value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mphf<'a, E = PackedArray<'a>> {
    n: u64,
    seed: u64,
    bucketer: Bucketer,
    free_slots: EliasFano<'a>,
    pivots: E,
}

impl<'a, E: PivotEncoding<'a>> Mphf<'a, E> {
    /// Deterministic build: a pure function of `(keys, config, seed)`.
    pub fn build_with_seed<K: SeededHash>(
        keys: &[K],
        config: &MphfConfig,
        seed: u64,
    ) -> Result<Self> {
        let n = keys.len();
        assert!(n > 0, "empty key set is not supported");
        assert!(
            config.alpha > 0.0 && config.alpha <= 1.0,
            "alpha must be in (0, 1]"
        );

        let slots = ((n as f64 / config.alpha) as u64).max(n as u64);
        let bucketer = Bucketer::new(slots, config.c);
        let num_buckets = bucketer.buckets() as usize;

        let hashes: Vec<u64> = keys.iter().map(|k| k.hash_seeded(seed)).collect();
        {
            let mut sorted = hashes.clone();
            sorted.sort_unstable();
            if sorted.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::HashCollision);
            }
        }

        // Bucket layout: counts, prefix offsets, then key indices grouped by
        // bucket so each bucket is a contiguous range of `items`.
        let mut counts = vec![0u32; num_buckets];
        let mut bucket_ids = Vec::with_capacity(n);
        for &h in &hashes {
            let b = bucketer.bucket(h) as usize;
            bucket_ids.push(b as u32);
            counts[b] += 1;
        }
        let mut offsets = vec![0usize; num_buckets + 1];
        for b in 0..num_buckets {
            offsets[b + 1] = offsets[b] + counts[b] as usize;
        }
        let mut cursor = offsets.clone();
        let mut items = vec![0u32; n];
        for (idx, &b) in bucket_ids.iter().enumerate() {
            let b = b as usize;
            items[cursor[b]] = idx as u32;
            cursor[b] += 1;
        }

        let order = bucket_order_by_size(&counts);

        // Global occupancy plus an epoch-marked scratch pass per pivot
        // attempt: a slot seen twice within one attempt is an in-bucket
        // collision, without clearing anything between attempts.
        let slot_count = slots as usize;
        let mut taken = vec![0u64; slot_count.div_ceil(64)];
        let mut seen_epoch = vec![0u32; slot_count];
        let mut epoch = 0u32;
        let max_bucket = counts.iter().copied().max().unwrap_or(0) as usize;
        let mut trial_slots = vec![0usize; max_bucket.max(1)];
        let mut pivots = vec![0u64; num_buckets];

        for &b_u32 in &order {
            let b = b_u32 as usize;
            let start = offsets[b];
            let end = offsets[b + 1];
            if start == end {
                continue;
            }

            let mut found = false;
            for pivot in 0..MAX_PIVOT_ATTEMPTS {
                epoch = epoch.wrapping_add(1);
                if epoch == 0 {
                    seen_epoch.fill(0);
                    epoch = 1;
                }
                let stream = pivot_stream(seed, pivot);
                let mut ok = true;
                for (t, &item) in items[start..end].iter().enumerate() {
                    let slot = (slot_hash(stream, hashes[item as usize]) % slots) as usize;
                    if bit_test(&taken, slot) || seen_epoch[slot] == epoch {
                        ok = false;
                        break;
                    }
                    seen_epoch[slot] = epoch;
                    trial_slots[t] = slot;
                }
                if !ok {
                    continue;
                }
                for &slot in &trial_slots[..end - start] {
                    bit_set(&mut taken, slot);
                }
                pivots[b] = pivot;
                found = true;
                break;
            }
            if !found {
                return Err(Error::HashCollision);
            }
        }

        // With alpha < 1 the universe has `slots - n` unoccupied positions.
        // Occupied positions at or above `n` reroute to the unoccupied
        // positions below `n`, enumerated in ascending order; the ascending
        // walk hands them out in exactly matching number.
        let free_slots = if slots > n as u64 {
            let extra = (slots - n as u64) as usize;
            let mut values = Vec::with_capacity(extra);
            let mut unset_cursor = 0usize;
            for j in 0..extra {
                let v = if bit_test(&taken, n + j) {
                    while bit_test(&taken, unset_cursor) {
                        unset_cursor += 1;
                    }
                    let p = unset_cursor as u64;
                    unset_cursor += 1;
                    p
                } else {
                    values.last().copied().unwrap_or(0)
                };
                values.push(v);
            }
            EliasFano::encode(&values)
        } else {
            EliasFano::encode(&[])
        };

        Ok(Self {
            n: n as u64,
            seed,
            bucketer,
            free_slots,
            pivots: E::encode(&pivots),
        })
    }

    /// Retries fresh seeds from `rng` up to `config.max_attempts` times.
    pub fn build_with_rng<K: SeededHash, R: RngCore>(
        keys: &[K],
        config: &MphfConfig,
        rng: &mut R,
    ) -> Result<Self> {
        for _ in 0..config.max_attempts.max(1) {
            match Self::build_with_seed(keys, config, rng.next_u64()) {
                Err(Error::HashCollision) => continue,
                other => return other,
            }
        }
        Err(Error::HashCollision)
    }

    /// Random-seed build drawing from OS entropy.
    pub fn build<K: SeededHash>(keys: &[K], config: &MphfConfig) -> Result<Self> {
        Self::build_with_rng(keys, config, &mut OsRng)
    }

    /// Maps a key from the build set to its unique index in `[0, n)`.
    #[inline]
    pub fn index<K: SeededHash + ?Sized>(&self, key: &K) -> u64 {
        let h = key.hash_seeded(self.seed);
        let b = self.bucketer.bucket(h);
        let pivot = self.pivots.get(b as usize);
        let slot = slot_hash(pivot_stream(self.seed, pivot), h) % self.bucketer.slots();
        if slot < self.n {
            slot
        } else {
            self.free_slots.get((slot - self.n) as usize)
        }
    }

    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn size_bits(&self) -> usize {
        self.pivots.size_bits() + self.free_slots.size_bits() + 6 * 64
    }

    pub fn bits_per_key(&self) -> f64 {
        self.size_bits() as f64 / self.n as f64
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64(self.n);
        out.write_u64(self.seed);
        self.bucketer.write_into(out);
        self.free_slots.write_into(out);
        self.pivots.write_into(out);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let n = input.read_u64()?;
        let seed = input.read_u64()?;
        let bucketer = Bucketer::read_from(input)?;
        let free_slots = EliasFano::read_from(input)?;
        let pivots = E::read_from(input)?;
        Ok(Self {
            n,
            seed,
            bucketer,
            free_slots,
            pivots,
        })
    }
}

impl<'a> Mphf<'a, PackedArray<'a>> {
    pub fn into_owned(self) -> Mphf<'static, PackedArray<'static>> {
        Mphf {
            n: self.n,
            seed: self.seed,
            bucketer: self.bucketer,
            free_slots: self.free_slots.into_owned(),
            pivots: self.pivots.into_owned(),
        }
    }
}

impl<'a> Mphf<'a, DictArray<'a>> {
    pub fn into_owned(self) -> Mphf<'static, DictArray<'static>> {
        Mphf {
            n: self.n,
            seed: self.seed,
            bucketer: self.bucketer,
            free_slots: self.free_slots.into_owned(),
            pivots: self.pivots.into_owned(),
        }
    }
}

/// Stable processing order: larger buckets first, ties by ascending id.
/// Counting sort over sizes, so ordering stays linear in the bucket count.
fn bucket_order_by_size(counts: &[u32]) -> Vec<u32> {
    if counts.is_empty() {
        return Vec::new();
    }
    let max_len = counts.iter().copied().max().unwrap_or(0) as usize;
    let mut freq = vec![0usize; max_len + 1];
    for &c in counts {
        freq[c as usize] += 1;
    }
    let mut next = vec![0usize; max_len + 1];
    let mut acc = 0usize;
    for len in (0..=max_len).rev() {
        next[len] = acc;
        acc += freq[len];
    }
    let mut order = vec![0u32; counts.len()];
    for (bucket, &c) in counts.iter().enumerate() {
        order[next[c as usize]] = bucket as u32;
        next[c as usize] += 1;
    }
    order
}

#[inline]
fn bit_test(bits: &[u64], idx: usize) -> bool {
    bits[idx >> 6] & (1u64 << (idx & 63)) != 0
}

#[inline]
fn bit_set(bits: &mut [u64], idx: usize) {
    bits[idx >> 6] |= 1u64 << (idx & 63);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AlignedBuf, ByteReader, ByteWriter};

    fn assert_bijective<'a, E: PivotEncoding<'a>>(mphf: &Mphf<'a, E>, keys: &[u64]) {
        let mut hit = vec![false; keys.len()];
        for k in keys {
            let idx = mphf.index(k) as usize;
            assert!(idx < keys.len(), "index {idx} out of range");
            assert!(!hit[idx], "two keys mapped to index {idx}");
            hit[idx] = true;
        }
    }

    #[test]
    fn single_key_maps_to_zero() {
        let keys = [42u64];
        let mphf: Mphf<'_> = Mphf::build_with_seed(&keys, &MphfConfig::default(), 7).unwrap();
        assert_eq!(mphf.index(&42u64), 0);
    }

    #[test]
    fn bucket_order_is_size_then_id() {
        let counts = [2u32, 5, 5, 0, 3];
        assert_eq!(bucket_order_by_size(&counts), vec![1, 2, 4, 0, 3]);
    }

    #[test]
    fn bijective_on_squares() {
        let keys: Vec<u64> = (0..256u64).map(|i| i * i).collect();
        let config = MphfConfig {
            c: 7,
            alpha: 0.80,
            max_attempts: 10,
        };
        let mphf: Mphf<'_> = Mphf::build(&keys, &config).unwrap();
        assert_bijective(&mphf, &keys);
    }

    #[test]
    fn duplicate_keys_are_a_collision() {
        let keys = [5u64, 5];
        let err = Mphf::<PackedArray>::build(&keys, &MphfConfig::default()).unwrap_err();
        assert!(matches!(err, Error::HashCollision));
    }

    #[test]
    fn seeded_build_is_deterministic() {
        let keys: Vec<u64> = (0..500u64).map(|i| i * 3 + 1).collect();
        let config = MphfConfig::default();
        let a: Mphf<'_> = Mphf::build_with_seed(&keys, &config, 99).unwrap();
        let b: Mphf<'_> = Mphf::build_with_seed(&keys, &config, 99).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn string_keys() {
        let keys: Vec<String> = (0..200).map(|i| format!("key-{i}")).collect();
        let mphf: Mphf<'_> = Mphf::build(&keys, &MphfConfig::default()).unwrap();
        let mut hit = vec![false; keys.len()];
        for k in &keys {
            let idx = mphf.index(k.as_str()) as usize;
            assert!(!hit[idx]);
            hit[idx] = true;
        }
    }

    #[test]
    fn dict_encoded_pivots() {
        let keys: Vec<u64> = (0..1000u64).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();
        let mphf: Mphf<'_, DictArray<'_>> = Mphf::build(&keys, &MphfConfig::default()).unwrap();
        assert_bijective(&mphf, &keys);
    }

    #[test]
    fn serialization_round_trip() {
        let keys: Vec<u64> = (0..300u64).map(|i| i * 7 + 3).collect();
        let config = MphfConfig {
            alpha: 0.9,
            ..MphfConfig::default()
        };
        let mphf: Mphf<'_> = Mphf::build_with_seed(&keys, &config, 1234).unwrap();

        let mut w = ByteWriter::new();
        mphf.write_into(&mut w);
        let bytes = w.finish();
        let buf = AlignedBuf::from_bytes(&bytes);
        let mut r = ByteReader::new(buf.as_bytes()).unwrap();
        let back: Mphf<'_> = Mphf::read_from(&mut r).unwrap();
        assert_eq!(back, mphf);
        assert_eq!(r.position() % 8, 0);
        for k in &keys {
            assert_eq!(back.index(k), mphf.index(k));
        }
    }
}
