use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use sdict::bumped::{BumpedRibbon, RibbonConfig};
use sdict::codec::{AlignedBuf, ByteReader, ByteWriter};
use sdict::darray::{DArray0, DArray1};
use sdict::elias_fano::EliasFano;
use sdict::error::Error;
use sdict::mphf::{Mphf, MphfConfig};
use sdict::packed::{DictArray, PackedArray};
use sdict::ribbon::{BandingSystem, InsertResult, RibbonRow, solve_rows};

const DENSE_SEED: u64 = 0x0194_f614_c152_27ba;

#[test]
fn darray_select_on_dense_random_bits() {
    let num_bits: usize = 10_000;
    let mut rng = ChaCha8Rng::seed_from_u64(DENSE_SEED);
    let words: Vec<u64> = (0..num_bits.div_ceil(64)).map(|_| rng.next_u64()).collect();

    let set_positions: Vec<usize> = (0..num_bits)
        .filter(|&i| words[i / 64] & (1u64 << (i % 64)) != 0)
        .collect();
    let ones = DArray1::build(&words, num_bits);
    for (i, &p) in set_positions.iter().enumerate() {
        assert_eq!(ones.select(&words, i), p);
    }

    let unset_positions: Vec<usize> = (0..num_bits)
        .filter(|&i| words[i / 64] & (1u64 << (i % 64)) == 0)
        .collect();
    let zeros = DArray0::build(&words, num_bits);
    for (i, &p) in unset_positions.iter().enumerate() {
        assert_eq!(zeros.select(&words, i), p);
    }
}

#[test]
fn elias_fano_on_seeded_monotone_walk() {
    let mut rng = ChaCha8Rng::seed_from_u64(DENSE_SEED);
    let mut values = Vec::with_capacity(100_000);
    let mut x = 0u64;
    for _ in 0..100_000 {
        x += rng.gen_range(0..50);
        values.push(x);
    }
    let ef = EliasFano::encode(&values);
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(ef.get(i), v);
    }
}

#[test]
fn mphf_is_bijective_on_squares() {
    let keys: Vec<u64> = (0..256u64).map(|i| i * i).collect();
    let config = MphfConfig {
        c: 7,
        alpha: 0.80,
        max_attempts: 10,
    };
    let mphf: Mphf<'_> = Mphf::build(&keys, &config).unwrap();
    let mut seen = vec![false; keys.len()];
    for k in &keys {
        let idx = mphf.index(k) as usize;
        assert!(idx < keys.len());
        assert!(!seen[idx], "two keys collided on index {idx}");
        seen[idx] = true;
    }
}

#[test]
fn mphf_rejects_duplicate_keys() {
    let err = Mphf::<PackedArray>::build(&[5u64, 5], &MphfConfig::default()).unwrap_err();
    assert!(matches!(err, Error::HashCollision));
}

#[test]
fn ribbon_incremental_rows() {
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    let rows: Vec<RibbonRow> = (0..100u64)
        .map(|idx| RibbonRow::from_key(&idx, 100, rng.gen_range(0..1u64 << 8)))
        .collect();

    let positions = 256;
    let mut system = BandingSystem::new(positions, 8, 32);
    let mut kept = Vec::new();
    for row in &rows {
        let (start, band) = row.place(positions, 32);
        match system.insert(start, band, row.value) {
            InsertResult::Placed(_) | InsertResult::Redundant => kept.push(*row),
            InsertResult::Conflict => {}
        }
    }
    assert!(!kept.is_empty());
    let table = system.solve();
    for row in &kept {
        let (start, band) = row.place(positions, 32);
        assert_eq!(table.lookup(start, band), row.value);
    }
}

#[test]
fn ribbon_iterative_rows() {
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    let rows: Vec<RibbonRow> = (0..100u64)
        .map(|idx| RibbonRow::from_key(&idx, 100, rng.gen_range(0..1u64 << 8)))
        .collect();
    let table = solve_rows(&rows, 8, 32, rows.len()).unwrap();
    for row in &rows {
        let (start, band) = row.place(table.positions(), 32);
        assert_eq!(table.lookup(start, band), row.value);
    }
}

#[test]
fn ribbon_bumped_replays_seeded_values() {
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    let pairs: Vec<(u64, u64)> = (0..100u64)
        .map(|idx| (idx, rng.gen_range(0..1u64 << 8)))
        .collect();
    let config = RibbonConfig {
        band_width: 32,
        value_width: Some(8),
        ..RibbonConfig::default()
    };
    let ribbon = BumpedRibbon::build_with_seed(&pairs, &config, 100).unwrap();

    // Replay the generator and check every key against the fresh stream.
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    for idx in 0..100u64 {
        let expected = rng.gen_range(0..1u64 << 8);
        assert_eq!(ribbon.lookup(&idx), expected);
    }
}

#[test]
fn concatenated_structures_share_one_stream() {
    let packed = PackedArray::encode(&[9u64, 8, 7, 6, 5]);
    let dict = DictArray::encode(&[4u64, 4, 2, 4, 2]);
    let ef = EliasFano::encode(&[1u64, 5, 9, 12, 40]);
    let keys: Vec<u64> = (0..64u64).collect();
    let mphf: Mphf<'_> = Mphf::build_with_seed(&keys, &MphfConfig::default(), 5).unwrap();
    let ribbon_pairs: Vec<(u64, u64)> = keys.iter().map(|&k| (k, k % 16)).collect();
    let ribbon =
        BumpedRibbon::build_with_seed(&ribbon_pairs, &RibbonConfig::default(), 5).unwrap();

    let mut writer = ByteWriter::new();
    packed.write_into(&mut writer);
    dict.write_into(&mut writer);
    ef.write_into(&mut writer);
    mphf.write_into(&mut writer);
    ribbon.write_into(&mut writer);
    let bytes = writer.finish();

    let buf = AlignedBuf::from_bytes(&bytes);
    let mut reader = ByteReader::new(buf.as_bytes()).unwrap();
    assert_eq!(PackedArray::read_from(&mut reader).unwrap(), packed);
    assert_eq!(reader.position() % 8, 0);
    assert_eq!(DictArray::read_from(&mut reader).unwrap(), dict);
    assert_eq!(reader.position() % 8, 0);
    assert_eq!(EliasFano::read_from(&mut reader).unwrap(), ef);
    assert_eq!(reader.position() % 8, 0);
    assert_eq!(Mphf::<PackedArray>::read_from(&mut reader).unwrap(), mphf);
    assert_eq!(reader.position() % 8, 0);
    assert_eq!(BumpedRibbon::read_from(&mut reader).unwrap(), ribbon);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn borrowed_reads_can_detach_from_the_buffer() {
    let keys: Vec<u64> = (0..128u64).map(|i| i.wrapping_mul(0xABCD_EF01)).collect();
    let mphf: Mphf<'_> = Mphf::build_with_seed(&keys, &MphfConfig::default(), 3).unwrap();
    let mut writer = ByteWriter::new();
    mphf.write_into(&mut writer);
    let bytes = writer.finish();

    let owned = {
        let buf = AlignedBuf::from_bytes(&bytes);
        let mut reader = ByteReader::new(buf.as_bytes()).unwrap();
        Mphf::<PackedArray>::read_from(&mut reader).unwrap().into_owned()
        // `buf` drops here; the owned copy must stay valid.
    };
    for k in &keys {
        assert_eq!(owned.index(k), mphf.index(k));
    }
}
