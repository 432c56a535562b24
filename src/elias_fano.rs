//! Elias–Fano coding of monotone `u64` sequences.
//!
//! Each value splits into `ℓ` explicit low bits and a unary-coded high part:
//! for value `x_i`, bit `(x_i >> ℓ) + i` of `high_bits` is set. Random access
//! recovers the high part with a select index over `high_bits`.

use std::borrow::Cow;

use crate::codec::{ByteReader, ByteWriter};
use crate::darray::DArray1;
use crate::error::Result;
use crate::packed::{PackedArray, PackedArrayBuilder, low_mask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EliasFano<'a> {
    high_bits: Cow<'a, [u64]>,
    high_bits_select: DArray1<'a>,
    low_bits: PackedArray<'a>,
}

impl<'a> EliasFano<'a> {
    /// Encodes a non-decreasing sequence. Panics on out-of-order input.
    pub fn encode(values: &[u64]) -> EliasFano<'static> {
        let n = values.len();
        if n == 0 {
            return EliasFano {
                high_bits: Cow::Owned(Vec::new()),
                high_bits_select: DArray1::build(&[], 0),
                low_bits: PackedArray::encode(&[]),
            };
        }

        let universe = *values.last().unwrap();
        // Shifts below need ℓ < 64, so the widest split keeps one high bit.
        let low_width = match universe / n as u64 {
            0 => 0,
            q => (64 - q.leading_zeros() as usize).min(63),
        };

        let high_len = (universe >> low_width) as usize + n;
        let mut high_bits = vec![0u64; high_len.div_ceil(64)];
        let mut low_bits = PackedArrayBuilder::new(low_width, n);
        let mut prev = 0u64;
        for (i, &x) in values.iter().enumerate() {
            assert!(x >= prev, "input must be non-decreasing");
            prev = x;
            low_bits.set_from_zero(i, x & low_mask(low_width));
            let h = (x >> low_width) as usize + i;
            high_bits[h >> 6] |= 1u64 << (h & 63);
        }

        let high_bits_select = DArray1::build(&high_bits, high_len);
        EliasFano {
            high_bits: Cow::Owned(high_bits),
            high_bits_select,
            low_bits: low_bits.finish(),
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        let high = (self.high_bits_select.select(&self.high_bits, i) - i) as u64;
        let low_width = self.low_bits.width();
        if low_width == 0 {
            high
        } else {
            (high << low_width) | self.low_bits.get(i)
        }
    }

    pub fn len(&self) -> usize {
        self.low_bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low_bits.is_empty()
    }

    pub fn size_bits(&self) -> usize {
        self.high_bits.len() * 64 + self.high_bits_select.size_bits() + self.low_bits.size_bits()
    }

    pub fn into_owned(self) -> EliasFano<'static> {
        EliasFano {
            high_bits: Cow::Owned(self.high_bits.into_owned()),
            high_bits_select: self.high_bits_select.into_owned(),
            low_bits: self.low_bits.into_owned(),
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64_slice(&self.high_bits);
        self.high_bits_select.write_into(out);
        self.low_bits.write_into(out);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let high_bits = input.read_u64_slice()?;
        let high_bits_select = DArray1::read_from(input)?;
        let low_bits = PackedArray::read_from(input)?;
        Ok(Self {
            high_bits: Cow::Borrowed(high_bits),
            high_bits_select,
            low_bits,
        })
    }
}
