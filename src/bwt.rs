//! Burrows-Wheeler Transform (BWT)
//!
//! The sentinel `$` is never materialized: the last column is stored with
//! the `$` row removed and its position kept as `eof_pos` (the suffix-array
//! index of the whole-text suffix). In matrix-row terms the `$` sits in row
//! `eof_pos + 1`, row 0 being the sentinel suffix itself.

use crate::error::{try_with_capacity, Result};

/// Last column without the sentinel, plus where the sentinel was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bwt {
    pub symbols: Vec<u8>,
    pub eof_pos: usize,
}

/// Build the BWT from a text and its suffix array (sentinel excluded).
///
/// `bwt[0] = text[n-1]` (the row of the sentinel suffix), then one symbol
/// per suffix-array entry except the whole-text suffix.
pub fn build_bwt(text: &[u8], sa: &[u32]) -> Result<Bwt> {
    let n = text.len();
    let mut symbols = try_with_capacity(n)?;
    let mut eof_pos = 0;
    if n == 0 {
        return Ok(Bwt { symbols, eof_pos });
    }
    symbols.push(text[n - 1]);
    for (i, &p) in sa.iter().enumerate() {
        if p == 0 {
            eof_pos = i;
        } else {
            symbols.push(text[p as usize - 1]);
        }
    }
    Ok(Bwt { symbols, eof_pos })
}

/// LF array: `lf[i]` is the suffix-array index of the row reached from
/// `bwt[i]`. `prefix` is the C-table over the same codes.
pub fn compute_lf(bwt: &[u8], prefix: &[u32]) -> Result<Vec<u32>> {
    let mut running = prefix.to_vec();
    let mut lf = try_with_capacity(bwt.len())?;
    for &c in bwt {
        let slot = &mut running[c as usize];
        lf.push(*slot);
        *slot += 1;
    }
    Ok(lf)
}

/// Recover the text by walking the LF array backward from the last symbol.
/// Occurrences of `marker` are dropped from the output.
pub fn invert_bwt(bwt: &[u8], lf: &[u32], eof_pos: usize, marker: Option<u8>) -> Result<Vec<u8>> {
    let n = bwt.len();
    let mut text = try_with_capacity(n)?;
    let mut j = 0usize;
    for _ in 0..n {
        let c = bwt[j];
        if Some(c) != marker {
            text.push(c);
        }
        let next = lf[j] as usize;
        j = if next < eof_pos { next + 1 } else { next };
    }
    text.reverse();
    Ok(text)
}
