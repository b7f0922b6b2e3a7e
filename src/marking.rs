//! Position marking for locate/extract
//!
//! **Modes**:
//! - `None`: no positions recorded, locate/extract unavailable
//! - `Every`: the offset of every row is stored (full inverse table)
//! - `Sampled`: a marker byte absent from the text is inserted before every
//!   original offset `k * rate` (`k >= 1`); the rows that start with a
//!   marker record the original offset that follows it
//!
//! Sampled mode stores two tables: `positions` in row order of the marker
//! rows (for locate) and `anchors` in ascending offset order holding each
//! marker's rank in `positions` (for extract).

use crate::bitio::{bit_width, BitReader, BitWriter};
use crate::error::{try_with_capacity, FmError, Result};

/// How text positions are made recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marking {
    None,
    Every,
    Sampled { marker: u8, rate: u32 },
}

impl Marking {
    /// Skip rate as stored in the image.
    pub fn skip_rate(&self) -> u32 {
        match *self {
            Marking::None => 0,
            Marking::Every => 1,
            Marking::Sampled { rate, .. } => rate,
        }
    }
}

/// Pick the marking mode for `text` at the requested skip rate.
pub fn choose_marking(text: &[u8], skip_rate: u32) -> Marking {
    match skip_rate {
        0 => Marking::None,
        1 => Marking::Every,
        rate if text.len() <= rate as usize => Marking::Every,
        rate => {
            let mut used = [false; 256];
            for &b in text {
                used[b as usize] = true;
            }
            match used.iter().position(|&u| !u) {
                Some(marker) => Marking::Sampled {
                    marker: marker as u8,
                    rate,
                },
                None => {
                    log::warn!("all 256 byte values occur, marking every position");
                    Marking::Every
                }
            }
        }
    }
}

/// Number of markers inserted into a text of `len` bytes.
#[inline]
pub fn marker_count(len: usize, rate: u32) -> usize {
    len.saturating_sub(1) / rate as usize
}

/// Copy `text` with `marker` inserted before every offset `k * rate`, `k >= 1`.
pub fn insert_markers(text: &[u8], marker: u8, rate: u32) -> Result<Vec<u8>> {
    let rate = rate as usize;
    let mut out = try_with_capacity(text.len() + marker_count(text.len(), rate as u32))?;
    for (i, chunk) in text.chunks(rate).enumerate() {
        if i > 0 {
            out.push(marker);
        }
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

/// Sampled-mode tables derived from the suffix array of the marked text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledTables {
    /// Original offset following each marker, in row order
    pub positions: Vec<u32>,
    /// Rank in `positions` of the k-th marker (k = 1, 2, ...)
    pub anchors: Vec<u32>,
}

/// `first` is the suffix-array index of the first suffix starting with the marker.
pub fn sampled_tables(sa: &[u32], first: usize, markers: usize, rate: u32) -> Result<SampledTables> {
    let mut positions = try_with_capacity(markers)?;
    let mut anchors = vec![0u32; markers];
    let period = u64::from(rate) + 1;
    for (rank, &q) in sa[first..first + markers].iter().enumerate() {
        let k = (u64::from(q) + 1) / period;
        if k == 0 || k as usize > markers {
            return Err(FmError::Search(format!("suffix {q} is not a marker")));
        }
        positions.push((k * u64::from(rate)) as u32);
        anchors[k as usize - 1] = rank as u32;
    }
    Ok(SampledTables { positions, anchors })
}

/// Write a table of fixed-width values followed by a flush.
pub fn write_table(w: &mut BitWriter, values: &[u32], width: u32) {
    for &v in values {
        w.write_bits(width, v);
    }
    w.flush();
}

#[inline]
fn table_bytes(entries: usize, width: u32) -> usize {
    (entries * width as usize).div_ceil(8)
}

/// Read-side view of the marked-position tables inside an image.
#[derive(Debug, Clone, Copy)]
pub struct MarkTable {
    offset: usize,
    entries: usize,
    width: u32,
    anchor_offset: usize,
    anchor_width: u32,
}

impl MarkTable {
    /// Lay out the tables starting at byte `offset`; checks they fit in `image_len`.
    pub fn locate(
        offset: usize,
        entries: usize,
        width: u32,
        with_anchors: bool,
        image_len: usize,
    ) -> Result<Self> {
        let anchor_offset = offset + table_bytes(entries, width);
        let anchor_width = bit_width(entries.saturating_sub(1) as u64);
        let end = if with_anchors {
            anchor_offset + table_bytes(entries, anchor_width)
        } else {
            anchor_offset
        };
        if end > image_len {
            return Err(FmError::format(format!(
                "marked-position tables end at {end}, image has {image_len} bytes"
            )));
        }
        Ok(Self {
            offset,
            entries,
            width,
            anchor_offset,
            anchor_width,
        })
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    fn read(image: &[u8], offset: usize, width: u32, i: usize) -> Result<u32> {
        let bit = offset as u64 * 8 + i as u64 * u64::from(width);
        BitReader::at_bit(image, bit)?.read_bits(width)
    }

    /// Offset recorded for the i-th marked row.
    pub fn position(&self, image: &[u8], i: usize) -> Result<u32> {
        if i >= self.entries {
            return Err(FmError::Search(format!(
                "marked row {i} out of {} entries",
                self.entries
            )));
        }
        Self::read(image, self.offset, self.width, i)
    }

    /// Rank in the position table of marker `k` (1-based).
    pub fn anchor(&self, image: &[u8], k: usize) -> Result<u32> {
        if k == 0 || k > self.entries {
            return Err(FmError::Search(format!("marker {k} out of range")));
        }
        Self::read(image, self.anchor_offset, self.anchor_width, k - 1)
    }

    /// Linear scan for the entry holding `value`.
    pub fn find(&self, image: &[u8], value: u32) -> Result<Option<usize>> {
        let mut r = BitReader::at(image, self.offset)?;
        for i in 0..self.entries {
            if r.read_bits(self.width)? == value {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}
