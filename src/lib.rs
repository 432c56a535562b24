//! sdict — succinct static dictionaries.
//!
//! - Build once over a set of **distinct** keys; read-only afterwards.
//! - [`Mphf`]: minimal perfect hashing, key → unique index in `[0, n)`,
//!   a few bits per key.
//! - [`BumpedRibbon`]: key → stored `r`-bit value at near-minimum space.
//! - [`PackedArray`], [`DictArray`], [`EliasFano`], [`DArray`]: the
//!   bit-packed containers underneath, usable on their own.
//! - Everything serializes to a flat 8-byte-aligned format and reads back
//!   either borrowed (zero-copy) or owned.

pub mod bumped;
pub mod codec;
pub mod darray;
pub mod elias_fano;
pub mod error;
pub mod hash;
pub mod mphf;
pub mod packed;
pub mod ribbon;

pub use bumped::{BumpedLayer, BumpedRibbon, LayerLookup, RibbonConfig};
pub use codec::{AlignedBuf, ByteReader, ByteWriter};
pub use darray::{DArray, DArray0, DArray1};
pub use elias_fano::EliasFano;
pub use error::{Error, Result};
pub use hash::SeededHash;
pub use mphf::{Bucketer, Mphf, MphfConfig, PivotEncoding};
pub use packed::{DictArray, PackedArray, PackedArrayBuilder};
pub use ribbon::{BandingSystem, InsertResult, RibbonRow, RibbonTable};
