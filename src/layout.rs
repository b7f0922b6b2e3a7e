//! Compressed image prologue
//!
//! **File Layout** (compressed tier):
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Prologue fields (PROLOGUE schema, 264 bits)  │
//! │ Present-byte bitmap (256 bits)               │
//! │ C-table: alpha × bits(N-1)                   │
//! │ flush                                        │
//! ├──────────────────────────────────────────────┤
//! │ Superbucket headers                          │
//! │   bitmap (alpha bits, flush)                 │
//! │   prefix counts (alpha × u32, not for sb 0)  │
//! ├──────────────────────────────────────────────┤
//! │ Bucket table: pointer_width bits per bucket  │
//! ├──────────────────────────────────────────────┤
//! │ Bucket payloads (byte aligned)               │
//! ├──────────────────────────────────────────────┤
//! │ Marked positions, then anchors (flushed)     │
//! └──────────────────────────────────────────────┘
//! ```
//! Every fixed-width field goes through one schema so reader and writer
//! cannot disagree on order or width.

use crate::bitio::{bit_width, BitReader, BitWriter};
use crate::error::{FmError, Result};
use crate::options::{MAX_BUCKET_SIZE, MIN_BUCKET_SIZE};

/// Compression tag for MTF + multi-table Huffman buckets.
pub const MULTI_HUFFMAN: u8 = 4;

/// One fixed-width prologue field.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub bits: u32,
}

const fn field(name: &'static str, bits: u32) -> Field {
    Field { name, bits }
}

pub const PROLOGUE: [Field; 13] = [
    field("text_len", 32),
    field("compression", 8),
    field("eof_pos", 32),
    field("superbucket_kib", 16),
    field("bucket_size", 16),
    field("alpha_minus_one", 8),
    field("marker", 8),
    field("skip_rate", 32),
    field("superbucket_offset", 32),
    field("bucket_table_offset", 32),
    field("marks_offset", 32),
    field("pointer_width", 8),
    field("substituted", 8),
];

/// Write `values` in schema order.
pub fn write_fields(w: &mut BitWriter, schema: &[Field], values: &[u32]) {
    debug_assert_eq!(schema.len(), values.len());
    for (f, &v) in schema.iter().zip(values) {
        w.write_bits(f.bits, v);
    }
}

/// Read one value per schema field.
pub fn read_fields<const N: usize>(r: &mut BitReader<'_>, schema: &[Field; N]) -> Result<[u32; N]> {
    let mut values = [0u32; N];
    for (slot, f) in values.iter_mut().zip(schema) {
        *slot = r
            .read_bits(f.bits)
            .map_err(|_| FmError::format(format!("truncated prologue field {}", f.name)))?;
    }
    Ok(values)
}

/// Decoded fixed prologue fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prologue {
    /// Length of the indexed (marker-augmented) text
    pub text_len: u32,
    pub compression: u8,
    pub eof_pos: u32,
    pub superbucket_kib: u16,
    pub bucket_size: u16,
    pub alpha_size: u16,
    /// Remapped marker code (meaningful when `skip_rate > 1`)
    pub marker: u8,
    pub skip_rate: u32,
    pub superbucket_offset: u32,
    pub bucket_table_offset: u32,
    pub marks_offset: u32,
    /// Bits per bucket-table entry
    pub pointer_width: u8,
    /// Reserved substituted-character code, always 0
    pub substituted: u8,
}

impl Prologue {
    fn to_values(self) -> [u32; 13] {
        [
            self.text_len,
            u32::from(self.compression),
            self.eof_pos,
            u32::from(self.superbucket_kib),
            u32::from(self.bucket_size),
            u32::from(self.alpha_size) - 1,
            u32::from(self.marker),
            self.skip_rate,
            self.superbucket_offset,
            self.bucket_table_offset,
            self.marks_offset,
            u32::from(self.pointer_width),
            u32::from(self.substituted),
        ]
    }

    fn from_values(v: [u32; 13]) -> Self {
        Self {
            text_len: v[0],
            compression: v[1] as u8,
            eof_pos: v[2],
            superbucket_kib: v[3] as u16,
            bucket_size: v[4] as u16,
            alpha_size: v[5] as u16 + 1,
            marker: v[6] as u8,
            skip_rate: v[7],
            superbucket_offset: v[8],
            bucket_table_offset: v[9],
            marks_offset: v[10],
            pointer_width: v[11] as u8,
            substituted: v[12] as u8,
        }
    }

    /// Width of C-table entries and marked positions.
    #[inline]
    pub fn count_width(&self) -> u32 {
        bit_width(u64::from(self.text_len.saturating_sub(1)))
    }

    /// Superbucket size in bytes.
    #[inline]
    pub fn superbucket_size(&self) -> usize {
        usize::from(self.superbucket_kib) << 10
    }

    /// Bytes taken by the prologue for an alphabet of `alpha` symbols.
    pub fn encoded_len(text_len: u32, alpha: usize) -> usize {
        let fixed: u32 = PROLOGUE.iter().map(|f| f.bits).sum();
        let count_width = bit_width(u64::from(text_len.saturating_sub(1))) as usize;
        (fixed as usize + 256 + alpha * count_width).div_ceil(8)
    }

    /// Write fields, bitmap and C-table, then flush.
    pub fn write(&self, w: &mut BitWriter, presence: &[bool; 256], prefix: &[u32]) {
        write_fields(w, &PROLOGUE, &self.to_values());
        for &p in presence {
            w.write_bit(p);
        }
        let width = self.count_width();
        for &c in prefix {
            w.write_bits(width, c);
        }
        w.flush();
    }

    /// Parse and validate the prologue of a compressed image.
    pub fn read(image: &[u8]) -> Result<(Self, [bool; 256], Vec<u32>)> {
        let mut r = BitReader::at(image, 0)?;
        let p = Self::from_values(read_fields(&mut r, &PROLOGUE)?);
        if p.compression != MULTI_HUFFMAN {
            return Err(FmError::UnsupportedCompression(p.compression));
        }
        p.validate(image.len())?;

        let mut presence = [false; 256];
        for slot in presence.iter_mut() {
            *slot = r.read_bit()?;
        }
        let present = presence.iter().filter(|&&b| b).count();
        if present != usize::from(p.alpha_size) {
            return Err(FmError::format(format!(
                "bitmap lists {present} symbols, header says {}",
                p.alpha_size
            )));
        }

        let width = p.count_width();
        let mut prefix = Vec::with_capacity(present);
        for _ in 0..present {
            prefix.push(r.read_bits(width)?);
        }
        let sorted = prefix.windows(2).all(|w| w[0] < w[1]);
        if prefix.first() != Some(&0) || !sorted || prefix.last().is_some_and(|&c| c >= p.text_len) {
            return Err(FmError::format("C-table is not strictly increasing"));
        }
        Ok((p, presence, prefix))
    }

    fn validate(&self, image_len: usize) -> Result<()> {
        let bucket = u32::from(self.bucket_size);
        let superbucket = self.superbucket_size();
        if !(MIN_BUCKET_SIZE..=MAX_BUCKET_SIZE).contains(&bucket) {
            return Err(FmError::format(format!("bucket size {bucket} out of range")));
        }
        if superbucket == 0 || superbucket % bucket as usize != 0 {
            return Err(FmError::format(format!(
                "superbucket size {superbucket} is not a multiple of bucket size {bucket}"
            )));
        }
        if self.eof_pos >= self.text_len {
            return Err(FmError::format(format!(
                "eof position {} outside text of {} symbols",
                self.eof_pos, self.text_len
            )));
        }
        if !matches!(self.pointer_width, 8 | 16 | 24 | 32) {
            return Err(FmError::format(format!("pointer width {}", self.pointer_width)));
        }
        if self.skip_rate > 1 && u16::from(self.marker) >= self.alpha_size {
            return Err(FmError::format("marker code outside alphabet"));
        }
        let header = Self::encoded_len(self.text_len, usize::from(self.alpha_size));
        let sections = [
            self.superbucket_offset as usize,
            self.bucket_table_offset as usize,
            self.marks_offset as usize,
        ];
        let ordered = header <= sections[0] && sections[0] <= sections[1] && sections[1] <= sections[2];
        if !ordered || sections[2] > image_len {
            return Err(FmError::format(format!(
                "section offsets {sections:?} inconsistent with image of {image_len} bytes"
            )));
        }
        Ok(())
    }
}
