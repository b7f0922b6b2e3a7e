//! Small-text tiers
//!
//! Below [`SMALL_TEXT_THRESHOLD`] a compressed index does not pay for
//! itself. Such texts are kept as plaintext in memory and searched with
//! Boyer-Moore.
//!
//! **Images**:
//! - Plain (`len < PLAIN_TEXT_LIMIT`): `[len: u32][text]`
//! - Whole-text BWT: `[len: u32][eof_pos: u32][MTF(256) + Huffman stream]`,
//!   inverted back to plaintext on load

use crate::alphabet::prefix_sums;
use crate::bitio::{BitReader, BitWriter};
use crate::bwt::{build_bwt, compute_lf, invert_bwt};
use crate::error::{FmError, Result};
use crate::query::Snippet;
use crate::sais::suffix_array;
use crate::{huffman, mtf};

/// Texts shorter than this are stored raw.
pub const PLAIN_TEXT_LIMIT: usize = 1025;
/// Texts shorter than this never get a compressed FM-index.
pub const SMALL_TEXT_THRESHOLD: usize = 51_200;

/// Serialize a small text, picking the plain or whole-text BWT image.
pub fn encode(text: &[u8]) -> Result<Vec<u8>> {
    let len = text.len();
    debug_assert!(len < SMALL_TEXT_THRESHOLD);
    let mut w = BitWriter::with_capacity(len + 8);
    w.write_u32(len as u32);
    if len < PLAIN_TEXT_LIMIT {
        w.write_bytes(text);
        return Ok(w.into_bytes());
    }
    let bwt = build_bwt(text, &suffix_array(text))?;
    w.write_u32(bwt.eof_pos as u32);
    let ranks = mtf::encode(&bwt.symbols, 256)?;
    huffman::encode(&mut w, &ranks, 256);
    w.flush();
    log::debug!("small text: {len} bytes -> {} byte BWT image", w.byte_len());
    Ok(w.into_bytes())
}

/// Whether an image with this leading length word is a small-text image.
#[inline]
pub fn is_small(len: u32) -> bool {
    (len as usize) < SMALL_TEXT_THRESHOLD
}

/// Plaintext held for Boyer-Moore search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmallText {
    text: Vec<u8>,
}

impl SmallText {
    pub fn new(text: Vec<u8>) -> Self {
        Self { text }
    }

    /// Rebuild the plaintext from a small image.
    pub fn decode(image: &[u8]) -> Result<Self> {
        let mut r = BitReader::at(image, 0)?;
        let len = r.read_u32()? as usize;
        if len >= SMALL_TEXT_THRESHOLD {
            return Err(FmError::format(format!("{len} bytes is not a small text")));
        }
        if len < PLAIN_TEXT_LIMIT {
            let body = image
                .get(4..4 + len)
                .ok_or_else(|| FmError::format(format!("plain image shorter than {len} bytes")))?;
            return Ok(Self::new(body.to_vec()));
        }

        let eof_pos = r.read_u32()? as usize;
        if eof_pos >= len {
            return Err(FmError::format(format!("eof position {eof_pos} outside {len} bytes")));
        }
        let mut bwt = huffman::decode(&mut r, 256, len)?;
        mtf::decode_in_place(&mut bwt, 256)?;
        let mut counts = vec![0u32; 256];
        for &b in &bwt {
            counts[b as usize] += 1;
        }
        let lf = compute_lf(&bwt, &prefix_sums(&counts))?;
        let text = invert_bwt(&bwt, &lf, eof_pos, None)?;
        Ok(Self::new(text))
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.text
    }

    pub fn count(&self, pattern: &[u8]) -> usize {
        self.locate(pattern).len()
    }

    /// Every match offset, ascending.
    pub fn locate(&self, pattern: &[u8]) -> Vec<usize> {
        BoyerMoore::new(pattern).find_all(&self.text)
    }

    pub fn extract(&self, from: usize, to: usize) -> Vec<u8> {
        match clamp_range(from, to, self.text.len()) {
            Some((from, to)) => self.text[from..=to].to_vec(),
            None => Vec::new(),
        }
    }

    pub fn display(&self, pattern: &[u8], context: usize) -> Vec<Snippet> {
        self.locate(pattern)
            .into_iter()
            .map(|at| {
                let start = at.saturating_sub(context);
                let end = (at + pattern.len() + context).min(self.text.len());
                Snippet {
                    offset: Some(at),
                    lead: at - start,
                    text: self.text[start..end].to_vec(),
                }
            })
            .collect()
    }
}

/// Clamp an inclusive `[from, to]` range to a text of `len` bytes.
pub(crate) fn clamp_range(from: usize, to: usize, len: usize) -> Option<(usize, usize)> {
    if len == 0 || from >= len {
        return None;
    }
    let to = to.min(len - 1);
    (from <= to).then_some((from, to))
}

/// Boyer-Moore matcher with bad-character and good-suffix shifts.
pub struct BoyerMoore<'p> {
    pattern: &'p [u8],
    bad_char: [usize; 256],
    good_suffix: Vec<usize>,
}

impl<'p> BoyerMoore<'p> {
    pub fn new(pattern: &'p [u8]) -> Self {
        let m = pattern.len();
        let mut bad_char = [m; 256];
        for (i, &c) in pattern.iter().enumerate().take(m.saturating_sub(1)) {
            bad_char[c as usize] = m - 1 - i;
        }
        Self {
            pattern,
            bad_char,
            good_suffix: good_suffix_table(pattern),
        }
    }

    /// All (possibly overlapping) match offsets in `text`, ascending.
    pub fn find_all(&self, text: &[u8]) -> Vec<usize> {
        let m = self.pattern.len();
        let mut hits = Vec::new();
        if m == 0 || m > text.len() {
            return hits;
        }
        let mut j = 0;
        while j + m <= text.len() {
            let window = &text[j..j + m];
            match (0..m).rev().find(|&i| self.pattern[i] != window[i]) {
                None => {
                    hits.push(j);
                    j += self.good_suffix[0];
                }
                Some(i) => {
                    let bad = self.bad_char[window[i] as usize] as isize - (m - 1 - i) as isize;
                    j += self.good_suffix[i].max(bad.max(1) as usize);
                }
            }
        }
        hits
    }
}

/// `suff[i]` = length of the longest suffix of `pattern[..=i]` that is
/// also a suffix of `pattern`.
fn suffixes(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len();
    let mut suff = vec![0usize; m];
    suff[m - 1] = m;
    let mut g = m as isize - 1;
    let mut f = m - 1;
    for i in (0..m - 1).rev() {
        let ii = i as isize;
        if ii > g && suff[i + m - 1 - f] < (ii - g) as usize {
            suff[i] = suff[i + m - 1 - f];
        } else {
            g = g.min(ii);
            f = i;
            while g >= 0 && pattern[g as usize] == pattern[g as usize + m - 1 - f] {
                g -= 1;
            }
            suff[i] = (f as isize - g) as usize;
        }
    }
    suff
}

fn good_suffix_table(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len();
    if m == 0 {
        return Vec::new();
    }
    let suff = suffixes(pattern);
    let mut gs = vec![m; m];
    let mut j = 0;
    for i in (0..m).rev() {
        if suff[i] == i + 1 {
            while j < m - 1 - i {
                if gs[j] == m {
                    gs[j] = m - 1 - i;
                }
                j += 1;
            }
        }
    }
    for i in 0..m - 1 {
        gs[m - 1 - suff[i]] = m - 1 - i;
    }
    gs
}
