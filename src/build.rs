//! Index construction
//!
//! Pipeline for the compressed tier:
//! 1. Choose marking and insert markers
//! 2. Remap the alphabet to dense codes (in place)
//! 3. SA-IS suffix array, then BWT with the `$` row removed
//! 4. Marked-position tables from the suffix array
//! 5. Superbucket / bucket sections
//! 6. Prologue + sections + tables into one image

use std::borrow::Cow;

use crate::alphabet::count_occurrences;
use crate::bitio::{bit_width, BitWriter};
use crate::bwt::build_bwt;
use crate::error::{FmError, Result};
use crate::layout::{Prologue, MULTI_HUFFMAN};
use crate::marking::{choose_marking, insert_markers, marker_count, sampled_tables, write_table, Marking};
use crate::occ::{build_sections, Geometry};
use crate::options::{BuildOptions, Resolved};
use crate::sais::suffix_array;
use crate::small::{self, SMALL_TEXT_THRESHOLD};

/// Serialize `text` into the image of the tier its length calls for.
pub fn build_image(text: Cow<'_, [u8]>, options: &BuildOptions) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Err(FmError::Config("cannot index an empty text".into()));
    }
    let resolved = options.resolve()?;
    if text.len() < SMALL_TEXT_THRESHOLD {
        return small::encode(&text);
    }
    build_compressed(text, &resolved)
}

fn image_offset(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| FmError::Config("index image exceeds 4 GiB".into()))
}

/// Build a full compressed FM-index image, whatever the text length.
pub(crate) fn build_compressed(text: Cow<'_, [u8]>, cfg: &Resolved) -> Result<Vec<u8>> {
    let original_len = text.len();
    let marking = choose_marking(&text, cfg.skip_rate);
    log::debug!("marking: {marking:?}");

    let mut working = match marking {
        Marking::Sampled { marker, rate } => insert_markers(&text, marker, rate)?,
        _ => text.into_owned(),
    };
    let n = working.len();
    let text_len = u32::try_from(n)
        .map_err(|_| FmError::Config(format!("text of {n} symbols exceeds the 32-bit limit")))?;

    let stats = count_occurrences(&working)?;
    let alphabet = stats.alphabet;
    alphabet.encode_in_place(&mut working);
    log::debug!("alphabet: {} symbols over {n} positions", alphabet.size());

    let sa = suffix_array(&working);
    let bwt = build_bwt(&working, &sa)?;
    drop(working);

    let count_width = bit_width(u64::from(text_len - 1));
    let (marker_code, marks) = match marking {
        Marking::None => (0, Vec::new()),
        Marking::Every => (0, vec![sa]),
        Marking::Sampled { marker, rate } => {
            let code = alphabet
                .code(marker)
                .ok_or_else(|| FmError::Search("marker missing from the marked text".into()))?;
            let markers = marker_count(original_len, rate);
            let first = stats.prefix[code as usize] as usize;
            if stats.counts[code as usize] as usize != markers {
                return Err(FmError::Search(format!(
                    "{} markers in text, expected {markers}",
                    stats.counts[code as usize]
                )));
            }
            let tables = sampled_tables(&sa, first, markers, rate)?;
            (code, vec![tables.positions, tables.anchors])
        }
    };

    let geom = Geometry {
        len: n,
        alpha: alphabet.size(),
        superbucket_size: cfg.superbucket_size,
        bucket_size: cfg.bucket_size,
    };
    let sections = build_sections(&bwt.symbols, &geom)?;

    let header = Prologue::encoded_len(text_len, alphabet.size());
    let superbucket_offset = header;
    let bucket_table_offset = superbucket_offset + sections.superbuckets.len();
    let marks_offset = bucket_table_offset + sections.bucket_table.len() + sections.payload.len();
    let prologue = Prologue {
        text_len,
        compression: MULTI_HUFFMAN,
        eof_pos: bwt.eof_pos as u32,
        superbucket_kib: (cfg.superbucket_size >> 10) as u16,
        bucket_size: cfg.bucket_size as u16,
        alpha_size: alphabet.size() as u16,
        marker: marker_code,
        skip_rate: marking.skip_rate(),
        superbucket_offset: image_offset(superbucket_offset)?,
        bucket_table_offset: image_offset(bucket_table_offset)?,
        marks_offset: image_offset(marks_offset)?,
        pointer_width: sections.pointer_width,
        substituted: 0,
    };

    let mut w = BitWriter::with_capacity(marks_offset + n / 4);
    prologue.write(&mut w, alphabet.presence(), &stats.prefix);
    debug_assert_eq!(w.byte_len(), header);
    w.write_bytes(&sections.superbuckets);
    w.write_bytes(&sections.bucket_table);
    w.write_bytes(&sections.payload);
    match marks.as_slice() {
        [every] => write_table(&mut w, every, count_width),
        [positions, anchors] => {
            write_table(&mut w, positions, count_width);
            write_table(&mut w, anchors, bit_width(anchors.len().saturating_sub(1) as u64));
        }
        _ => {}
    }
    let image = w.into_bytes();
    log::info!(
        "built FM-index: {original_len} bytes -> {} bytes ({:.1}%)",
        image.len(),
        image.len() as f64 * 100.0 / original_len as f64
    );
    Ok(image)
}
