//! Move-to-front transform over a dense alphabet `0..alpha`
//!
//! Buckets use their local alphabet size so ranks stay small; the
//! whole-text small image uses the full 256-symbol list.

use crate::error::{FmError, Result};

fn initial_list(alpha: usize) -> Vec<u8> {
    (0..alpha).map(|i| i as u8).collect()
}

/// Replace every symbol by its rank in the recency list.
/// Symbols must be `< alpha`.
pub fn encode(input: &[u8], alpha: usize) -> Result<Vec<u8>> {
    let mut list = initial_list(alpha);
    let mut out = Vec::with_capacity(input.len());
    for &sym in input {
        let pos = list
            .iter()
            .position(|&s| s == sym)
            .ok_or_else(|| FmError::Search(format!("symbol {sym} outside alphabet {alpha}")))?;
        out.push(pos as u8);
        if pos > 0 {
            list.copy_within(..pos, 1);
            list[0] = sym;
        }
    }
    Ok(out)
}

/// Inverse of [`encode`], in place.
pub fn decode_in_place(ranks: &mut [u8], alpha: usize) -> Result<()> {
    let mut list = initial_list(alpha);
    for r in ranks.iter_mut() {
        let pos = *r as usize;
        if pos >= alpha {
            return Err(FmError::decode(format!("mtf rank {pos} outside alphabet {alpha}")));
        }
        let sym = list[pos];
        if pos > 0 {
            list.copy_within(..pos, 1);
            list[0] = sym;
        }
        *r = sym;
    }
    Ok(())
}
