//! Bucket payload codec
//!
//! A bucket is a run of superbucket-local symbols. On disk:
//! `[present bitmap: alpha bits][MTF + multi-table Huffman stream]`, the
//! stream omitted when only one symbol occurs. The writer flushes to a byte
//! boundary after every bucket.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{FmError, Result};
use crate::{huffman, mtf};

/// Compress `symbols` (each `< alpha`) into `w`.
pub fn write_bucket(w: &mut BitWriter, symbols: &[u8], alpha: usize) -> Result<()> {
    let mut present = vec![false; alpha];
    for &s in symbols {
        *present
            .get_mut(s as usize)
            .ok_or_else(|| FmError::Search(format!("symbol {s} outside bucket alphabet {alpha}")))? = true;
    }
    let mut dense = vec![0u8; alpha];
    let mut local = 0usize;
    for (slot, &p) in dense.iter_mut().zip(&present) {
        w.write_bit(p);
        if p {
            *slot = local as u8;
            local += 1;
        }
    }
    if local > 1 {
        let remapped: Vec<u8> = symbols.iter().map(|&s| dense[s as usize]).collect();
        let ranks = mtf::encode(&remapped, local)?;
        huffman::encode(w, &ranks, local);
    }
    w.flush();
    Ok(())
}

/// Read a bucket's present bitmap. Returns the symbols that occur, ascending.
pub fn read_bucket_alphabet(r: &mut BitReader<'_>, alpha: usize) -> Result<Vec<u8>> {
    let mut symbols = Vec::new();
    for s in 0..alpha {
        if r.read_bit()? {
            symbols.push(s as u8);
        }
    }
    if symbols.is_empty() {
        return Err(FmError::decode("bucket with empty alphabet"));
    }
    Ok(symbols)
}

/// Decode `len` symbols following the bitmap; `symbols` comes from
/// [`read_bucket_alphabet`].
pub fn read_bucket_payload(r: &mut BitReader<'_>, symbols: &[u8], len: usize) -> Result<Vec<u8>> {
    match symbols {
        [] => Err(FmError::decode("bucket with empty alphabet")),
        [only] => Ok(vec![*only; len]),
        _ => {
            let mut run = huffman::decode(r, symbols.len(), len)?;
            mtf::decode_in_place(&mut run, symbols.len())?;
            for s in run.iter_mut() {
                *s = symbols[*s as usize];
            }
            Ok(run)
        }
    }
}
