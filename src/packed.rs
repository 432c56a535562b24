//! Fixed-width integers packed tightly into 64-bit words.

use std::borrow::Cow;

use hashbrown::HashMap;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

/// `(1 << w) - 1` without overflowing at `w = 64`.
#[inline]
pub(crate) fn low_mask(width: usize) -> u64 {
    if width >= 64 {
        !0
    } else {
        (1u64 << width) - 1
    }
}

/// Bits needed to store `max`: `⌊log₂ max⌋ + 1`, and 1 for `max = 0`.
#[inline]
pub(crate) fn bits_for(max: u64) -> usize {
    (64 - max.leading_zeros() as usize).max(1)
}

#[inline]
fn words_for(width: usize, len: usize) -> usize {
    (width * len).div_ceil(64)
}

/// Read-only array of `len` integers of `width` bits each, stored
/// back-to-back in little-endian bit order within 64-bit words.
///
/// A deserialized instance borrows the source buffer; call [`into_owned`]
/// to detach it.
///
/// [`into_owned`]: PackedArray::into_owned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArray<'a> {
    width: usize,
    len: usize,
    data: Cow<'a, [u64]>,
}

impl<'a> PackedArray<'a> {
    /// Packs `values` at the smallest width that fits the largest one.
    /// An empty input yields a `width = 1`, zero-length sentinel.
    pub fn encode(values: &[u64]) -> PackedArray<'static> {
        let width = bits_for(values.iter().copied().max().unwrap_or(0));
        let mut builder = PackedArrayBuilder::new(width, values.len());
        for (i, &v) in values.iter().enumerate() {
            builder.set_from_zero(i, v);
        }
        builder.finish()
    }

    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        read_bits(&self.data, self.width, i)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn size_bits(&self) -> usize {
        self.data.len() * 64 + 128
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    pub fn into_owned(self) -> PackedArray<'static> {
        PackedArray {
            width: self.width,
            len: self.len,
            data: Cow::Owned(self.data.into_owned()),
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        out.write_u64(self.width as u64);
        out.write_u64(self.len as u64);
        out.write_u64_slice(&self.data);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let width = input.read_u64()? as usize;
        let len = input.read_u64()? as usize;
        if width > 64 {
            return Err(Error::CorruptData);
        }
        let data = input.read_u64_slice()?;
        if data.len() != words_for(width, len) {
            return Err(Error::CorruptData);
        }
        Ok(Self {
            width,
            len,
            data: Cow::Borrowed(data),
        })
    }
}

#[inline]
fn read_bits(data: &[u64], width: usize, i: usize) -> u64 {
    if width == 0 {
        return 0;
    }
    let pos = i * width;
    let block = pos >> 6;
    let shift = pos & 63;
    if shift + width <= 64 {
        (data[block] >> shift) & low_mask(width)
    } else {
        ((data[block] >> shift) | (data[block + 1] << (64 - shift))) & low_mask(width)
    }
}

/// Write-once builder for [`PackedArray`].
///
/// Backing words start zeroed; `set_from_zero` requires the target bits to
/// still be zero, `set_to_zero` clears a slot for rewriting. The row solver
/// relies on both during elimination.
#[derive(Debug, Clone)]
pub struct PackedArrayBuilder {
    width: usize,
    len: usize,
    data: Vec<u64>,
}

impl PackedArrayBuilder {
    pub fn new(width: usize, len: usize) -> Self {
        assert!(width <= 64, "element width must be at most 64 bits");
        Self {
            width,
            len,
            data: vec![0u64; words_for(width, len)],
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        read_bits(&self.data, self.width, i)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn set_from_zero(&mut self, i: usize, v: u64) {
        debug_assert!(i < self.len);
        debug_assert!(v <= low_mask(self.width));
        debug_assert_eq!(self.get(i), 0, "slot written twice");
        if self.width == 0 {
            return;
        }
        let pos = i * self.width;
        let block = pos >> 6;
        let shift = pos & 63;
        self.data[block] |= v << shift;
        if shift + self.width > 64 {
            self.data[block + 1] |= v >> (64 - shift);
        }
    }

    #[inline]
    pub fn set_to_zero(&mut self, i: usize) {
        debug_assert!(i < self.len);
        if self.width == 0 {
            return;
        }
        let pos = i * self.width;
        let block = pos >> 6;
        let shift = pos & 63;
        self.data[block] &= !(low_mask(self.width) << shift);
        if shift + self.width > 64 {
            self.data[block + 1] &= !(low_mask(self.width) >> (64 - shift));
        }
    }

    pub fn finish(self) -> PackedArray<'static> {
        PackedArray {
            width: self.width,
            len: self.len,
            data: Cow::Owned(self.data),
        }
    }
}

/// Dictionary-coded array: distinct values stored once, positions stored as
/// packed indices into the dictionary. Pays off when values repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictArray<'a> {
    dict: PackedArray<'a>,
    arr: PackedArray<'a>,
}

impl<'a> DictArray<'a> {
    pub fn encode(values: &[u64]) -> DictArray<'static> {
        let mut index: HashMap<u64, u64> = HashMap::new();
        let mut dict = Vec::new();
        let mut arr = Vec::with_capacity(values.len());
        for &v in values {
            let id = *index.entry(v).or_insert_with(|| {
                dict.push(v);
                dict.len() as u64 - 1
            });
            arr.push(id);
        }
        DictArray {
            dict: PackedArray::encode(&dict),
            arr: PackedArray::encode(&arr),
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        self.dict.get(self.arr.get(i) as usize)
    }

    pub fn len(&self) -> usize {
        self.arr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arr.is_empty()
    }

    pub fn size_bits(&self) -> usize {
        self.dict.size_bits() + self.arr.size_bits()
    }

    pub fn into_owned(self) -> DictArray<'static> {
        DictArray {
            dict: self.dict.into_owned(),
            arr: self.arr.into_owned(),
        }
    }

    pub fn write_into(&self, out: &mut ByteWriter) {
        self.dict.write_into(out);
        self.arr.write_into(out);
    }

    pub fn read_from(input: &mut ByteReader<'a>) -> Result<Self> {
        let dict = PackedArray::read_from(input)?;
        let arr = PackedArray::read_from(input)?;
        Ok(Self { dict, arr })
    }
}
