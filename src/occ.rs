//! Two-level occurrence index
//!
//! **Architecture**:
//! - Superbucket: present bitmap + global prefix counts (32-bit words)
//! - Bucket: local prefix counts (integer code) + present bitmap +
//!   compressed payload
//! - Reversed buckets (odd index with a successor in the same superbucket)
//!   store neither counts nor natural order; their counts are taken from
//!   the next bucket, which always stores them
//!
//! `rank(c, m)` = superbucket prefix + bucket prefix + a scan inside one
//! decoded bucket. The last decoded superbucket and bucket are kept in a
//! [`DecodeContext`] owned by the caller, never by the index.

use crate::bitio::{bit_width, BitReader, BitWriter};
use crate::codec;
use crate::error::{FmError, Result};

/// Block geometry shared by the builder and the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of BWT symbols
    pub len: usize,
    /// Alphabet size of the BWT codes
    pub alpha: usize,
    pub superbucket_size: usize,
    pub bucket_size: usize,
}

impl Geometry {
    #[inline]
    pub fn buckets_per_superbucket(&self) -> usize {
        self.superbucket_size / self.bucket_size
    }

    #[inline]
    pub fn superbuckets(&self) -> usize {
        self.len.div_ceil(self.superbucket_size)
    }

    #[inline]
    pub fn buckets(&self) -> usize {
        self.len.div_ceil(self.bucket_size)
    }

    pub fn buckets_in_superbucket(&self, s: usize) -> usize {
        let start = s * self.superbucket_size;
        let end = (start + self.superbucket_size).min(self.len);
        (end - start).div_ceil(self.bucket_size)
    }

    pub fn bucket_len(&self, b: usize) -> usize {
        let start = b * self.bucket_size;
        (start + self.bucket_size).min(self.len) - start
    }

    /// Head width of the integer code for in-superbucket counts.
    #[inline]
    pub fn count_head_bits(&self) -> u32 {
        bit_width(u64::from(bit_width((self.superbucket_size - self.bucket_size) as u64)))
    }

    #[inline]
    pub fn bitmap_bytes(&self) -> usize {
        self.alpha.div_ceil(8)
    }

    /// Byte offset of superbucket `s` inside the superbucket section.
    #[inline]
    pub fn superbucket_header(&self, s: usize) -> usize {
        s * self.bitmap_bytes() + s.saturating_sub(1) * self.alpha * 4
    }

    pub fn superbucket_section_len(&self) -> usize {
        self.superbucket_header(self.superbuckets())
    }
}

/// Whether bucket `j` of a superbucket with `in_superbucket` buckets is stored reversed.
#[inline]
pub fn is_reversed(j: usize, in_superbucket: usize) -> bool {
    j % 2 == 1 && j + 1 < in_superbucket
}

/// Serialized occurrence-index sections, ready to be placed in an image.
#[derive(Debug)]
pub struct Sections {
    pub superbuckets: Vec<u8>,
    pub bucket_table: Vec<u8>,
    pub payload: Vec<u8>,
    /// Bits per bucket-table entry
    pub pointer_width: u8,
}

/// Compress a remapped BWT into superbucket headers, bucket table and payloads.
pub fn build_sections(bwt: &[u8], geom: &Geometry) -> Result<Sections> {
    let alpha = geom.alpha;
    let head_bits = geom.count_head_bits();
    let mut headers = BitWriter::with_capacity(geom.superbucket_section_len());
    let mut payload = BitWriter::with_capacity(bwt.len() / 2);
    let mut offsets = Vec::with_capacity(geom.buckets());
    let mut before = vec![0u32; alpha];

    for (s, chunk) in bwt.chunks(geom.superbucket_size).enumerate() {
        let mut local = vec![None; alpha];
        let mut sb_alpha = 0usize;
        let mut present = vec![false; alpha];
        for &c in chunk {
            present[c as usize] = true;
        }
        for (slot, &p) in local.iter_mut().zip(&present) {
            headers.write_bit(p);
            if p {
                *slot = Some(sb_alpha as u8);
                sb_alpha += 1;
            }
        }
        headers.flush();
        if s > 0 {
            for &count in &before {
                headers.write_u32(count);
            }
        }

        let in_sb = chunk.len().div_ceil(geom.bucket_size);
        let mut within = vec![0u32; sb_alpha];
        for (j, bucket) in chunk.chunks(geom.bucket_size).enumerate() {
            offsets.push(payload.byte_len());
            let reversed = is_reversed(j, in_sb);
            if j > 0 && !reversed {
                for &count in &within {
                    payload.write_integer(count, head_bits);
                }
            }
            let mut symbols: Vec<u8> = bucket
                .iter()
                .map(|&c| local[c as usize].unwrap_or(0))
                .collect();
            for &s in &symbols {
                within[s as usize] += 1;
            }
            if reversed {
                symbols.reverse();
            }
            codec::write_bucket(&mut payload, &symbols, sb_alpha)?;
        }
        for &c in chunk {
            before[c as usize] += 1;
        }
    }

    let payload = payload.into_bytes();
    let last = offsets.last().copied().unwrap_or(0);
    let last = u32::try_from(last).map_err(|_| FmError::Config("index image exceeds 4 GiB".into()))?;
    let pointer_width = bit_width(u64::from(last)).div_ceil(8) * 8;
    let mut table = BitWriter::with_capacity(offsets.len() * pointer_width as usize / 8);
    for &off in &offsets {
        table.write_bits(pointer_width, off as u32);
    }
    log::debug!(
        "occurrence index: {} superbuckets, {} buckets, payload {} bytes, {}-bit pointers",
        geom.superbuckets(),
        offsets.len(),
        payload.len(),
        pointer_width
    );
    Ok(Sections {
        superbuckets: headers.into_bytes(),
        bucket_table: table.into_bytes(),
        payload,
        pointer_width: pointer_width as u8,
    })
}

/// Decoded superbucket header.
#[derive(Debug, Clone)]
struct SuperbucketView {
    index: usize,
    /// Superbucket-local code -> BWT code
    symbols: Vec<u8>,
    /// BWT code -> superbucket-local code
    local: Vec<Option<u8>>,
    /// Occurrences before this superbucket, per BWT code
    prefix: Vec<u32>,
}

/// Fully decoded bucket, natural order.
#[derive(Debug, Clone)]
struct DecodedBucket {
    index: usize,
    /// Superbucket-local codes
    symbols: Vec<u8>,
    /// Occurrences before this bucket within its superbucket, per local code
    base: Vec<u32>,
}

impl DecodedBucket {
    /// Occurrences of `local` up to and including offset `t`.
    fn count_through(&self, local: u8, t: usize) -> u32 {
        let seen = self.symbols[..=t].iter().filter(|&&s| s == local).count() as u32;
        self.base[local as usize] + seen
    }
}

struct BucketHeader {
    /// Prefix before the bucket, or through its end when reversed
    stored: Vec<u32>,
    reversed: bool,
    /// Local codes occurring in the bucket, ascending
    present: Vec<u8>,
}

/// Per-query scratch: last superbucket header and last decoded bucket.
#[derive(Debug, Default)]
pub struct DecodeContext {
    superbucket: Option<SuperbucketView>,
    bucket: Option<DecodedBucket>,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached state.
    pub fn reset(&mut self) {
        self.superbucket = None;
        self.bucket = None;
    }
}

/// Read side of the occurrence index inside an image.
#[derive(Debug, Clone)]
pub struct OccIndex {
    geom: Geometry,
    superbucket_offset: usize,
    table_offset: usize,
    pointer_bytes: usize,
    payload_offset: usize,
    payload_end: usize,
}

impl OccIndex {
    /// Lay out the sections and check they fit between `superbucket_offset`
    /// and `payload_end`.
    pub fn new(
        geom: Geometry,
        superbucket_offset: usize,
        table_offset: usize,
        pointer_width: u8,
        payload_end: usize,
    ) -> Result<Self> {
        let pointer_bytes = usize::from(pointer_width) / 8;
        if superbucket_offset + geom.superbucket_section_len() > table_offset {
            return Err(FmError::format("superbucket section overlaps bucket table"));
        }
        let payload_offset = table_offset + geom.buckets() * pointer_bytes;
        if payload_offset > payload_end {
            return Err(FmError::format("bucket table overlaps marked positions"));
        }
        Ok(Self {
            geom,
            superbucket_offset,
            table_offset,
            pointer_bytes,
            payload_offset,
            payload_end,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    fn read_superbucket(&self, image: &[u8], s: usize) -> Result<SuperbucketView> {
        let alpha = self.geom.alpha;
        let start = self.superbucket_offset + self.geom.superbucket_header(s);
        let mut r = BitReader::at(image, start)?;
        let mut symbols = Vec::new();
        let mut local = vec![None; alpha];
        for (code, slot) in local.iter_mut().enumerate() {
            if r.read_bit()? {
                *slot = Some(symbols.len() as u8);
                symbols.push(code as u8);
            }
        }
        if symbols.is_empty() {
            return Err(FmError::format(format!("superbucket {s} has an empty alphabet")));
        }
        let mut prefix = vec![0u32; alpha];
        if s > 0 {
            let mut r = BitReader::at(image, start + self.geom.bitmap_bytes())?;
            for p in prefix.iter_mut() {
                *p = r.read_u32()?;
            }
        }
        Ok(SuperbucketView {
            index: s,
            symbols,
            local,
            prefix,
        })
    }

    fn bucket_start(&self, image: &[u8], b: usize) -> Result<usize> {
        let width = self.pointer_bytes as u32 * 8;
        let rel = BitReader::at(image, self.table_offset + b * self.pointer_bytes)?.read_bits(width)?;
        let start = self.payload_offset + rel as usize;
        if start >= self.payload_end {
            return Err(FmError::format(format!("bucket {b} starts past the payload")));
        }
        Ok(start)
    }

    fn read_counts(&self, r: &mut BitReader<'_>, n: usize) -> Result<Vec<u32>> {
        let head_bits = self.geom.count_head_bits();
        (0..n).map(|_| r.read_integer(head_bits)).collect()
    }

    fn read_bucket_header<'i>(
        &self,
        image: &'i [u8],
        sb: &SuperbucketView,
        b: usize,
    ) -> Result<(BucketHeader, BitReader<'i>)> {
        let j = b % self.geom.buckets_per_superbucket();
        let reversed = is_reversed(j, self.geom.buckets_in_superbucket(sb.index));
        let alpha = sb.symbols.len();
        let mut reader = BitReader::at(image, self.bucket_start(image, b)?)?;
        let stored = if j == 0 {
            vec![0; alpha]
        } else if reversed {
            let mut next = BitReader::at(image, self.bucket_start(image, b + 1)?)?;
            self.read_counts(&mut next, alpha)?
        } else {
            self.read_counts(&mut reader, alpha)?
        };
        let present = codec::read_bucket_alphabet(&mut reader, alpha)?;
        Ok((
            BucketHeader {
                stored,
                reversed,
                present,
            },
            reader,
        ))
    }

    fn decode_bucket(&self, image: &[u8], sb: &SuperbucketView, b: usize) -> Result<DecodedBucket> {
        let (header, mut reader) = self.read_bucket_header(image, sb, b)?;
        let mut symbols = codec::read_bucket_payload(&mut reader, &header.present, self.geom.bucket_len(b))?;
        let mut base = header.stored;
        if header.reversed {
            symbols.reverse();
            for &s in &symbols {
                let slot = &mut base[s as usize];
                *slot = slot
                    .checked_sub(1)
                    .ok_or_else(|| FmError::decode(format!("bucket {b} counts underflow")))?;
            }
        }
        Ok(DecodedBucket {
            index: b,
            symbols,
            base,
        })
    }

    fn superbucket<'c>(
        &self,
        image: &[u8],
        slot: &'c mut Option<SuperbucketView>,
        s: usize,
    ) -> Result<&'c SuperbucketView> {
        let view = match slot.take() {
            Some(v) if v.index == s => v,
            _ => self.read_superbucket(image, s)?,
        };
        Ok(slot.insert(view))
    }

    fn bucket<'c>(
        &self,
        image: &[u8],
        sb: &SuperbucketView,
        slot: &'c mut Option<DecodedBucket>,
        b: usize,
    ) -> Result<&'c DecodedBucket> {
        let bucket = match slot.take() {
            Some(v) if v.index == b => v,
            _ => self.decode_bucket(image, sb, b)?,
        };
        Ok(slot.insert(bucket))
    }

    fn check(&self, idx: usize) -> Result<()> {
        if idx >= self.geom.len {
            return Err(FmError::Search(format!(
                "position {idx} outside BWT of {} symbols",
                self.geom.len
            )));
        }
        Ok(())
    }

    /// Symbol at `idx` and its occurrences in `bwt[..=idx]`.
    pub fn probe(&self, image: &[u8], ctx: &mut DecodeContext, idx: usize) -> Result<(u8, u32)> {
        self.check(idx)?;
        let DecodeContext { superbucket, bucket } = ctx;
        let sb = self.superbucket(image, superbucket, idx / self.geom.superbucket_size)?;
        let bk = self.bucket(image, sb, bucket, idx / self.geom.bucket_size)?;
        let t = idx % self.geom.bucket_size;
        let local = bk.symbols[t];
        let code = sb.symbols[local as usize];
        Ok((code, sb.prefix[code as usize].saturating_add(bk.count_through(local, t))))
    }

    /// Occurrences of `code` in `bwt[..m]`.
    pub fn rank(&self, image: &[u8], ctx: &mut DecodeContext, code: u8, m: usize) -> Result<u32> {
        if m == 0 {
            return Ok(0);
        }
        let idx = m - 1;
        self.check(idx)?;
        let DecodeContext { superbucket, bucket } = ctx;
        let sb = self.superbucket(image, superbucket, idx / self.geom.superbucket_size)?;
        let before = sb.prefix[code as usize];
        let Some(local) = sb.local[code as usize] else {
            return Ok(before);
        };
        let b = idx / self.geom.bucket_size;
        let t = idx % self.geom.bucket_size;
        if let Some(bk) = bucket.as_ref().filter(|bk| bk.index == b) {
            return Ok(before.saturating_add(bk.count_through(local, t)));
        }
        let (header, _) = self.read_bucket_header(image, sb, b)?;
        if header.present.binary_search(&local).is_err() {
            return Ok(before.saturating_add(header.stored[local as usize]));
        }
        let bk = self.bucket(image, sb, bucket, b)?;
        Ok(before.saturating_add(bk.count_through(local, t)))
    }

    /// Occurrences of every code in `bwt[..m]`.
    pub fn prefix_counts(&self, image: &[u8], ctx: &mut DecodeContext, m: usize) -> Result<Vec<u32>> {
        let mut counts = vec![0u32; self.geom.alpha];
        if m == 0 {
            return Ok(counts);
        }
        let idx = m - 1;
        self.check(idx)?;
        let DecodeContext { superbucket, bucket } = ctx;
        let sb = self.superbucket(image, superbucket, idx / self.geom.superbucket_size)?;
        let bk = self.bucket(image, sb, bucket, idx / self.geom.bucket_size)?;
        counts.copy_from_slice(&sb.prefix);
        for (local, &base) in bk.base.iter().enumerate() {
            let c = &mut counts[sb.symbols[local] as usize];
            *c = c.saturating_add(base);
        }
        for &s in &bk.symbols[..=idx % self.geom.bucket_size] {
            let c = &mut counts[sb.symbols[s as usize] as usize];
            *c = c.saturating_add(1);
        }
        Ok(counts)
    }

    /// Decompress every bucket back into BWT codes.
    pub fn decode_all(&self, image: &[u8]) -> Result<Vec<u8>> {
        let mut bwt = crate::error::try_with_capacity(self.geom.len)?;
        for s in 0..self.geom.superbuckets() {
            let sb = self.read_superbucket(image, s)?;
            let first = s * self.geom.buckets_per_superbucket();
            for b in first..first + self.geom.buckets_in_superbucket(s) {
                let bk = self.decode_bucket(image, &sb, b)?;
                bwt.extend(bk.symbols.iter().map(|&l| sb.symbols[l as usize]));
            }
        }
        Ok(bwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        image: Vec<u8>,
        occ: OccIndex,
    }

    fn fixture(bwt: &[u8], alpha: usize, superbucket_size: usize, bucket_size: usize) -> Fixture {
        let geom = Geometry {
            len: bwt.len(),
            alpha,
            superbucket_size,
            bucket_size,
        };
        let sections = build_sections(bwt, &geom).unwrap();
        let mut image = vec![0xAA; 3]; // leading junk to exercise offsets
        let sb_offset = image.len();
        image.extend_from_slice(&sections.superbuckets);
        let table_offset = image.len();
        image.extend_from_slice(&sections.bucket_table);
        image.extend_from_slice(&sections.payload);
        let end = image.len();
        let occ = OccIndex::new(geom, sb_offset, table_offset, sections.pointer_width, end).unwrap();
        Fixture { image, occ }
    }

    fn pseudo_bwt(len: usize, alpha: u8, seed: u32) -> Vec<u8> {
        let mut state = seed;
        let mut cur = 0u8;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                // runs, like a real BWT
                if (state >> 28) < 5 {
                    cur = ((state >> 8) % u32::from(alpha)) as u8;
                }
                cur
            })
            .collect()
    }

    #[test]
    fn test_reversal_rule() {
        // 8 buckets: 1,3,5 reversed; 7 is last
        let rev: Vec<bool> = (0..8).map(|j| is_reversed(j, 8)).collect();
        assert_eq!(rev, vec![false, true, false, true, false, true, false, false]);
        // odd count: 5 has no successor
        assert!(!is_reversed(5, 6));
        assert!(is_reversed(3, 5));
        assert!(!is_reversed(1, 2));
    }

    #[test]
    fn test_geometry() {
        let g = Geometry {
            len: 5000,
            alpha: 3,
            superbucket_size: 2048,
            bucket_size: 256,
        };
        assert_eq!(g.superbuckets(), 3);
        assert_eq!(g.buckets(), 20);
        assert_eq!(g.buckets_in_superbucket(2), 4);
        assert_eq!(g.bucket_len(19), 5000 - 19 * 256);
        assert_eq!(g.superbucket_header(0), 0);
        assert_eq!(g.superbucket_header(1), 1);
        assert_eq!(g.superbucket_header(2), 2 + 12);
    }

    #[test]
    fn test_rank_matches_naive() {
        for (len, alpha) in [(5000usize, 3u8), (3000, 40), (2300, 1), (777, 7)] {
            let bwt = pseudo_bwt(len, alpha, len as u32);
            let f = fixture(&bwt, alpha as usize, 2048, 256);
            let mut ctx = DecodeContext::new();
            for m in (0..=len).step_by(37).chain([len]) {
                let expected: Vec<u32> = (0..alpha)
                    .map(|c| bwt[..m].iter().filter(|&&x| x == c).count() as u32)
                    .collect();
                assert_eq!(f.occ.prefix_counts(&f.image, &mut ctx, m).unwrap(), expected);
                for c in 0..alpha {
                    assert_eq!(f.occ.rank(&f.image, &mut ctx, c, m).unwrap(), expected[c as usize]);
                }
            }
        }
    }

    #[test]
    fn test_rank_with_fresh_context() {
        let bwt = pseudo_bwt(4100, 5, 9);
        let f = fixture(&bwt, 5, 2048, 256);
        for m in [1usize, 255, 256, 257, 700, 2048, 2049, 4100] {
            for c in 0..5u8 {
                let mut ctx = DecodeContext::new();
                let expected = bwt[..m].iter().filter(|&&x| x == c).count() as u32;
                assert_eq!(f.occ.rank(&f.image, &mut ctx, c, m).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_probe() {
        let bwt = pseudo_bwt(3333, 4, 5);
        let f = fixture(&bwt, 4, 2048, 256);
        let mut ctx = DecodeContext::new();
        for idx in (0..bwt.len()).rev().step_by(11) {
            let (c, r) = f.occ.probe(&f.image, &mut ctx, idx).unwrap();
            assert_eq!(c, bwt[idx]);
            assert_eq!(r, bwt[..=idx].iter().filter(|&&x| x == c).count() as u32);
        }
        assert!(f.occ.probe(&f.image, &mut ctx, bwt.len()).is_err());
    }

    #[test]
    fn test_decode_all() {
        let bwt = pseudo_bwt(9000, 6, 77);
        let f = fixture(&bwt, 6, 4096, 512);
        assert_eq!(f.occ.decode_all(&f.image).unwrap(), bwt);
    }

    #[test]
    fn test_overlapping_sections_rejected() {
        let geom = Geometry {
            len: 5000,
            alpha: 3,
            superbucket_size: 2048,
            bucket_size: 256,
        };
        assert!(OccIndex::new(geom, 0, 4, 8, 1000).is_err());
        assert!(OccIndex::new(geom, 0, 100, 16, 110).is_err());
    }
}
