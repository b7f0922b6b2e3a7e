//! Queries over a compressed image
//!
//! **Core Algorithm**: Backward Search
//! - Process pattern from right to left over half-open row intervals
//! - `new_sp = first_row(c) + rank(c, sp)`, same for `ep`
//! - With sampled marking the interval also branches on the marker symbol,
//!   so matches that straddle an inserted marker are still found
//!
//! Row resolution (`locate`) walks LF until it meets a marker or the `$`
//! row. `extract` starts from the anchor row at or after the requested end
//! and walks backward; `display` adds a forward walk through the FL map.

use crate::alphabet::{prefix_sums, Alphabet};
use crate::bwt::{compute_lf, invert_bwt};
use crate::error::{FmError, Result};
use crate::layout::Prologue;
use crate::marking::MarkTable;
use crate::occ::{DecodeContext, Geometry, OccIndex};
use crate::small::clamp_range;

/// Text around one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snippet {
    /// Offset of the match, when positions can be resolved
    pub offset: Option<usize>,
    /// Number of bytes of `text` before the match
    pub lead: usize,
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Marks {
    None,
    Every(MarkTable),
    Sampled { marker: u8, rate: u32, table: MarkTable },
}

/// Metadata of a validated compressed image. Holds no image bytes.
#[derive(Debug, Clone)]
pub struct CompressedIndex {
    prologue: Prologue,
    alphabet: Alphabet,
    /// C-table by code
    prefix: Vec<u32>,
    occ: OccIndex,
    marks: Marks,
    /// Original text length, markers excluded
    text_len: usize,
}

impl CompressedIndex {
    /// Parse the prologue and lay out every section of `image`.
    pub fn open(image: &[u8]) -> Result<Self> {
        let (prologue, presence, prefix) = Prologue::read(image)?;
        let alphabet = Alphabet::from_presence(presence)?;
        let n = prologue.text_len as usize;
        let geom = Geometry {
            len: n,
            alpha: alphabet.size(),
            superbucket_size: prologue.superbucket_size(),
            bucket_size: usize::from(prologue.bucket_size),
        };
        let marks_offset = prologue.marks_offset as usize;
        let occ = OccIndex::new(
            geom,
            prologue.superbucket_offset as usize,
            prologue.bucket_table_offset as usize,
            prologue.pointer_width,
            marks_offset,
        )?;

        let width = prologue.count_width();
        let mut text_len = n;
        let marks = match prologue.skip_rate {
            0 => Marks::None,
            1 => Marks::Every(MarkTable::locate(marks_offset, n, width, false, image.len())?),
            rate => {
                let marker = prologue.marker;
                let c = marker as usize;
                let end = prefix.get(c + 1).map_or(n as u32, |&e| e);
                let markers = (end - prefix[c]) as usize;
                if markers != (n - 1) / (rate as usize + 1) {
                    return Err(FmError::format(format!(
                        "{markers} markers inconsistent with skip rate {rate} over {n} symbols"
                    )));
                }
                text_len = n - markers;
                let table = MarkTable::locate(marks_offset, markers, width, true, image.len())?;
                Marks::Sampled { marker, rate, table }
            }
        };
        log::debug!(
            "opened compressed image: {n} symbols, alphabet {}, skip rate {}",
            alphabet.size(),
            prologue.skip_rate
        );
        Ok(Self {
            prologue,
            alphabet,
            prefix,
            occ,
            marks,
            text_len,
        })
    }

    pub fn len(&self) -> usize {
        self.text_len
    }

    pub fn skip_rate(&self) -> u32 {
        self.prologue.skip_rate
    }

    #[inline]
    fn n(&self) -> usize {
        self.prologue.text_len as usize
    }

    #[inline]
    fn eof_row(&self) -> usize {
        self.prologue.eof_pos as usize + 1
    }

    #[inline]
    fn marker(&self) -> Option<u8> {
        match self.marks {
            Marks::Sampled { marker, .. } => Some(marker),
            _ => None,
        }
    }

    #[inline]
    fn first_row(&self, c: u8) -> usize {
        1 + self.prefix[c as usize] as usize
    }

    #[inline]
    fn end_row(&self, c: u8) -> usize {
        1 + self.prefix.get(c as usize + 1).map_or(self.n(), |&p| p as usize)
    }

    /// Number of BWT symbols in rows `[0, row)`.
    #[inline]
    fn prefix_len(&self, row: usize) -> usize {
        if row > self.eof_row() {
            row - 1
        } else {
            row
        }
    }

    /// Occurrences of `c` in the last column above `row`.
    #[inline]
    fn lrank(&self, image: &[u8], ctx: &mut DecodeContext, c: u8, row: usize) -> Result<usize> {
        Ok(self.occ.rank(image, ctx, c, self.prefix_len(row))? as usize)
    }

    /// Last-column symbol of `row` and the row LF maps it to; `None` on the `$` row.
    fn step_back(&self, image: &[u8], ctx: &mut DecodeContext, row: usize) -> Result<Option<(u8, usize)>> {
        let eof = self.eof_row();
        let idx = match row {
            r if r == eof => return Ok(None),
            r if r > eof => r - 1,
            r => r,
        };
        let (c, rank) = self.occ.probe(image, ctx, idx)?;
        let next = self.first_row(c) + rank as usize - 1;
        Ok(Some((c, next)))
    }

    /// Row intervals `(first_row, rows)` of all matches of `pattern`.
    pub fn backward_search(
        &self,
        image: &[u8],
        ctx: &mut DecodeContext,
        pattern: &[u8],
    ) -> Result<Vec<(usize, usize)>> {
        let mut groups = Vec::new();
        let Some(codes) = self.alphabet.encode(pattern) else {
            return Ok(groups);
        };
        let marker = self.marker();
        let Some(&last) = codes.last() else {
            return Ok(groups);
        };
        if marker.is_some_and(|m| codes.contains(&m)) {
            return Ok(groups);
        }

        // (pattern symbols left, sp, ep, reached through a marker)
        let mut work = vec![(codes.len() - 1, self.first_row(last), self.end_row(last), false)];
        while let Some((left, sp, ep, after_marker)) = work.pop() {
            if sp >= ep {
                continue;
            }
            if left == 0 {
                groups.push((sp, ep - sp));
                continue;
            }
            if let (Some(m), false) = (marker, after_marker) {
                let a = self.lrank(image, ctx, m, sp)?;
                let b = self.lrank(image, ctx, m, ep)?;
                if a < b {
                    work.push((left, self.first_row(m) + a, self.first_row(m) + b, true));
                }
            }
            let c = codes[left - 1];
            let a = self.lrank(image, ctx, c, sp)?;
            let b = self.lrank(image, ctx, c, ep)?;
            work.push((left - 1, self.first_row(c) + a, self.first_row(c) + b, false));
        }
        groups.sort_unstable();
        Ok(groups)
    }

    pub fn count(&self, image: &[u8], ctx: &mut DecodeContext, pattern: &[u8]) -> Result<usize> {
        Ok(self
            .backward_search(image, ctx, pattern)?
            .iter()
            .map(|&(_, rows)| rows)
            .sum())
    }

    /// Text offset of the suffix in `row`.
    fn resolve_row(&self, image: &[u8], ctx: &mut DecodeContext, row: usize) -> Result<usize> {
        match self.marks {
            Marks::None => Err(FmError::NoMarkedChar),
            Marks::Every(table) => {
                let i = row
                    .checked_sub(1)
                    .ok_or_else(|| FmError::Search("sentinel row has no offset".into()))?;
                Ok(table.position(image, i)? as usize)
            }
            Marks::Sampled { marker, table, .. } => {
                let mut row = row;
                let mut steps = 0usize;
                loop {
                    let Some((c, next)) = self.step_back(image, ctx, row)? else {
                        return Ok(steps);
                    };
                    if c == marker {
                        let rank = next
                            .checked_sub(self.first_row(marker))
                            .ok_or_else(|| FmError::Search(format!("marker row {next} below its interval")))?;
                        return Ok(table.position(image, rank)? as usize + steps);
                    }
                    row = next;
                    steps += 1;
                    if steps > self.n() {
                        return Err(FmError::Search(format!("row walk from {row} never reached a mark")));
                    }
                }
            }
        }
    }

    /// Offsets of every row in `groups`, ascending.
    pub fn multi_locate(
        &self,
        image: &[u8],
        ctx: &mut DecodeContext,
        groups: &[(usize, usize)],
    ) -> Result<Vec<usize>> {
        if matches!(self.marks, Marks::None) {
            return Err(FmError::NoMarkedChar);
        }
        let total = groups.iter().map(|&(_, rows)| rows).sum();
        let mut offsets = crate::error::try_with_capacity(total)?;
        for &(sp, rows) in groups {
            for row in sp..sp + rows {
                offsets.push(self.resolve_row(image, ctx, row)?);
            }
        }
        offsets.sort_unstable();
        Ok(offsets)
    }

    pub fn locate(&self, image: &[u8], ctx: &mut DecodeContext, pattern: &[u8]) -> Result<Vec<usize>> {
        if matches!(self.marks, Marks::None) {
            return Err(FmError::NoMarkedChar);
        }
        let groups = self.backward_search(image, ctx, pattern)?;
        self.multi_locate(image, ctx, &groups)
    }

    /// Up to `n` codes preceding the suffix in `row`, nearest first. Markers skipped.
    fn go_back(&self, image: &[u8], ctx: &mut DecodeContext, row: usize, n: usize) -> Result<Vec<u8>> {
        let marker = self.marker();
        let mut out = Vec::with_capacity(n);
        let mut row = row;
        let mut steps = 0usize;
        while out.len() < n {
            let Some((c, next)) = self.step_back(image, ctx, row)? else {
                break;
            };
            if Some(c) != marker {
                out.push(c);
            }
            row = next;
            steps += 1;
            if steps > self.n() {
                return Err(FmError::Search("backward walk overran the text".into()));
            }
        }
        Ok(out)
    }

    /// Row of the suffix one position to the right of the suffix in `row`.
    fn fl_map(&self, image: &[u8], ctx: &mut DecodeContext, row: usize) -> Result<(u8, usize)> {
        let c = self.prefix.partition_point(|&p| p as usize + 1 <= row) - 1;
        let c = c as u8;
        let j = row - self.first_row(c);
        // smallest q with rank(c, q + 1) > j
        let (mut lo, mut hi) = (0usize, self.n() + 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.lrank(image, ctx, c, mid + 1)? > j {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok((c, lo))
    }

    /// Up to `n` codes starting at the suffix in `row`. Markers skipped.
    fn go_forw(&self, image: &[u8], ctx: &mut DecodeContext, row: usize, n: usize) -> Result<Vec<u8>> {
        let marker = self.marker();
        let mut out = Vec::with_capacity(n);
        let mut row = row;
        let mut steps = 0usize;
        while out.len() < n && row != 0 {
            let (c, next) = self.fl_map(image, ctx, row)?;
            if Some(c) != marker {
                out.push(c);
            }
            row = next;
            steps += 1;
            if steps > self.n() {
                return Err(FmError::Search("forward walk overran the text".into()));
            }
        }
        Ok(out)
    }

    fn decode(&self, codes: impl IntoIterator<Item = u8>) -> Vec<u8> {
        codes.into_iter().map(|c| self.alphabet.symbol(c)).collect()
    }

    /// Inclusive range `[from, to]` of the original text.
    pub fn extract(&self, image: &[u8], ctx: &mut DecodeContext, from: usize, to: usize) -> Result<Vec<u8>> {
        let len = self.text_len;
        let Some((from, to)) = clamp_range(from, to, len) else {
            return Ok(Vec::new());
        };
        if from == 0 && to == len - 1 {
            return self.unbuild(image);
        }
        let end = to + 1;
        let (row, anchor) = match self.marks {
            Marks::None => return Err(FmError::NoMarkedChar),
            Marks::Every(_) if end == len => (0, len),
            Marks::Every(table) => {
                let i = table
                    .find(image, end as u32)?
                    .ok_or_else(|| FmError::Search(format!("offset {end} missing from position table")))?;
                (i + 1, end)
            }
            Marks::Sampled { marker, rate, table } => {
                let k = end.div_ceil(rate as usize);
                let at = k * rate as usize;
                if at >= len {
                    (0, len)
                } else {
                    (self.first_row(marker) + table.anchor(image, k)? as usize, at)
                }
            }
        };
        let mut codes = self.go_back(image, ctx, row, anchor - from)?;
        if codes.len() != anchor - from {
            return Err(FmError::Search(format!(
                "walked {} of {} symbols back from offset {anchor}",
                codes.len(),
                anchor - from
            )));
        }
        codes.reverse();
        codes.truncate(to - from + 1);
        Ok(self.decode(codes))
    }

    /// One snippet per occurrence, ordered by offset when offsets are known.
    pub fn display(
        &self,
        image: &[u8],
        ctx: &mut DecodeContext,
        pattern: &[u8],
        context: usize,
    ) -> Result<Vec<Snippet>> {
        let groups = self.backward_search(image, ctx, pattern)?;
        let mut snippets = Vec::new();
        for &(sp, rows) in &groups {
            for row in sp..sp + rows {
                let mut codes = self.go_back(image, ctx, row, context)?;
                codes.reverse();
                let lead = codes.len();
                codes.extend(self.go_forw(image, ctx, row, pattern.len() + context)?);
                let offset = match self.marks {
                    Marks::None => None,
                    _ => Some(self.resolve_row(image, ctx, row)?),
                };
                snippets.push(Snippet {
                    offset,
                    lead,
                    text: self.decode(codes),
                });
            }
        }
        snippets.sort_by_key(|s| s.offset);
        Ok(snippets)
    }

    /// Recover the whole original text by inverting the BWT.
    pub fn unbuild(&self, image: &[u8]) -> Result<Vec<u8>> {
        let bwt = self.occ.decode_all(image)?;
        let mut counts = vec![0u32; self.alphabet.size()];
        for &c in &bwt {
            counts[c as usize] += 1;
        }
        if prefix_sums(&counts) != self.prefix {
            return Err(FmError::decode("decoded symbol counts disagree with the C-table"));
        }
        let lf = compute_lf(&bwt, &self.prefix)?;
        let text = invert_bwt(&bwt, &lf, self.prologue.eof_pos as usize, self.marker())?;
        Ok(self.decode(text))
    }
}
