//! Multi-table Huffman codec
//!
//! **Stream layout** (bzip2 family):
//! - MTF ranks, with zero runs written as RUNA/RUNB binary digits of
//!   `run + 1`; other ranks become `rank + 1`; end-of-block is `alpha + 1`
//! - 3 bits: number of tables (2..=6, chosen from the coded length)
//! - per table: 5-bit start length, then per symbol `10` (+1), `11` (-1), `0` (next)
//! - per 50-symbol group: unary MTF rank of the table selector, then the codes
//!
//! Tables are refined over four passes that reassign every group to its
//! cheapest table. Code lengths are capped at 20 bits.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::bitio::{BitReader, BitWriter};
use crate::error::{FmError, Result};

pub const GROUP_SIZE: usize = 50;
pub const MAX_GROUPS: usize = 6;
pub const MAX_CODE_LEN: u32 = 20;
const ITERATIONS: usize = 4;
const LESSER_ICOST: u8 = 0;
const GREATER_ICOST: u8 = 15;
const RUNA: u16 = 0;
const RUNB: u16 = 1;

fn group_count(symbols: usize) -> usize {
    match symbols {
        0..=199 => 2,
        200..=599 => 3,
        600..=1199 => 4,
        1200..=2399 => 5,
        _ => MAX_GROUPS,
    }
}

/// Zero-run coding. Output alphabet is `alpha + 2` symbols.
fn run_length_encode(ranks: &[u8], alpha: usize) -> Vec<u16> {
    fn push_run(out: &mut Vec<u16>, zeros: u32) {
        let mut z = zeros + 1;
        while z > 1 {
            out.push(if z & 1 == 1 { RUNB } else { RUNA });
            z >>= 1;
        }
    }

    let mut out = Vec::with_capacity(ranks.len() + 1);
    let mut zeros = 0u32;
    for &r in ranks {
        if r == 0 {
            zeros += 1;
            continue;
        }
        push_run(&mut out, zeros);
        zeros = 0;
        out.push(u16::from(r) + 1);
    }
    push_run(&mut out, zeros);
    out.push(alpha as u16 + 1);
    out
}

/// Length-limited Huffman code lengths. Weights carry the subtree depth in
/// their low byte so merges prefer shallow trees; on overflow the weights
/// are halved and the tree rebuilt.
fn code_lengths(freq: &[u32], max_len: u32) -> Vec<u8> {
    let n = freq.len();
    let mut weight: Vec<u32> = freq.iter().map(|&f| f.max(1) << 8).collect();
    loop {
        let mut w = weight.clone();
        w.resize(2 * n, 0);
        let mut parent = vec![usize::MAX; 2 * n];
        let mut heap: BinaryHeap<Reverse<(u32, usize)>> =
            (0..n).map(|i| Reverse((w[i], i))).collect();
        let mut next = n;
        while let Some(Reverse((w1, a))) = heap.pop() {
            let Some(Reverse((w2, b))) = heap.pop() else {
                break;
            };
            parent[a] = next;
            parent[b] = next;
            let depth = 1 + (w1 & 0xff).max(w2 & 0xff);
            w[next] = ((w1 & !0xff) + (w2 & !0xff)) | depth;
            heap.push(Reverse((w[next], next)));
            next += 1;
        }

        let mut lengths = vec![0u8; n];
        let mut too_long = false;
        for (i, len) in lengths.iter_mut().enumerate() {
            let mut depth = 0u32;
            let mut k = i;
            while parent[k] != usize::MAX {
                k = parent[k];
                depth += 1;
            }
            too_long |= depth > max_len;
            *len = depth.min(255) as u8;
        }
        if !too_long {
            return lengths;
        }
        for wt in weight.iter_mut() {
            *wt = (1 + (*wt >> 8) / 2) << 8;
        }
    }
}

/// Canonical codes from code lengths.
fn assign_codes(lengths: &[u8]) -> Vec<u32> {
    let min = lengths.iter().copied().min().unwrap_or(0);
    let max = lengths.iter().copied().max().unwrap_or(0);
    let mut codes = vec![0u32; lengths.len()];
    let mut code = 0u32;
    for len in min..=max {
        for (s, &l) in lengths.iter().enumerate() {
            if l == len {
                codes[s] = code;
                code += 1;
            }
        }
        code <<= 1;
    }
    codes
}

/// Initial tables: split the histogram into contiguous, equally weighted
/// symbol ranges, one cheap range per table.
fn seed_tables(freq: &[u32], total: u32, n_groups: usize) -> Vec<Vec<u8>> {
    let alpha_size = freq.len();
    let mut tables = vec![vec![GREATER_ICOST; alpha_size]; n_groups];
    let mut remaining = total;
    let mut start = 0usize;
    for n_part in (1..=n_groups).rev() {
        let target = remaining / n_part as u32;
        let mut end = start;
        let mut acc = 0u32;
        while acc < target && end < alpha_size {
            acc += freq[end];
            end += 1;
        }
        if end > start + 1 && n_part != n_groups && n_part != 1 && (n_groups - n_part) % 2 == 1 {
            end -= 1;
            acc -= freq[end];
        }
        for cost in &mut tables[n_part - 1][start..end] {
            *cost = LESSER_ICOST;
        }
        start = end;
        remaining -= acc;
    }
    tables
}

/// Compress MTF ranks (`< alpha`) into `w`.
pub fn encode(w: &mut BitWriter, ranks: &[u8], alpha: usize) {
    let symbols = run_length_encode(ranks, alpha);
    let alpha_size = alpha + 2;
    let n_groups = group_count(symbols.len());

    let mut freq = vec![0u32; alpha_size];
    for &s in &symbols {
        freq[s as usize] += 1;
    }
    let mut lengths = seed_tables(&freq, symbols.len() as u32, n_groups);
    let mut selectors = vec![0u8; symbols.len().div_ceil(GROUP_SIZE)];

    for _ in 0..ITERATIONS {
        let mut table_freq = vec![vec![0u32; alpha_size]; n_groups];
        for (group, chunk) in symbols.chunks(GROUP_SIZE).enumerate() {
            let mut best = 0;
            let mut best_cost = u32::MAX;
            for (t, table) in lengths.iter().enumerate() {
                let cost: u32 = chunk.iter().map(|&s| u32::from(table[s as usize])).sum();
                if cost < best_cost {
                    best_cost = cost;
                    best = t;
                }
            }
            selectors[group] = best as u8;
            for &s in chunk {
                table_freq[best][s as usize] += 1;
            }
        }
        for (table, tf) in lengths.iter_mut().zip(&table_freq) {
            *table = code_lengths(tf, MAX_CODE_LEN);
        }
    }
    let codes: Vec<Vec<u32>> = lengths.iter().map(|l| assign_codes(l)).collect();

    w.write_bits(3, n_groups as u32);
    for table in &lengths {
        let mut cur = table[0];
        w.write_bits(5, u32::from(cur));
        for &target in table {
            while cur < target {
                w.write_bits(2, 0b10);
                cur += 1;
            }
            while cur > target {
                w.write_bits(2, 0b11);
                cur -= 1;
            }
            w.write_bit(false);
        }
    }

    let mut order: Vec<u8> = (0..n_groups as u8).collect();
    for (group, chunk) in symbols.chunks(GROUP_SIZE).enumerate() {
        let sel = selectors[group];
        let pos = order.iter().position(|&t| t == sel).unwrap_or(0);
        order.copy_within(..pos, 1);
        order[0] = sel;
        w.write_unary(pos as u32);

        let t = sel as usize;
        for &s in chunk {
            w.write_bits(u32::from(lengths[t][s as usize]), codes[t][s as usize]);
        }
    }
}

/// Canonical decoding tables for one code-length set.
struct DecodeTable {
    min_len: u32,
    max_len: u32,
    limit: [i64; MAX_CODE_LEN as usize + 2],
    base: [i64; MAX_CODE_LEN as usize + 2],
    perm: Vec<u16>,
}

impl DecodeTable {
    fn new(lengths: &[u8]) -> Self {
        let min_len = lengths.iter().copied().min().map_or(1, u32::from);
        let max_len = lengths.iter().copied().max().map_or(1, u32::from);

        let mut perm = Vec::with_capacity(lengths.len());
        for len in min_len..=max_len {
            for (s, &l) in lengths.iter().enumerate() {
                if u32::from(l) == len {
                    perm.push(s as u16);
                }
            }
        }

        let mut base = [0i64; MAX_CODE_LEN as usize + 2];
        for &l in lengths {
            base[l as usize + 1] += 1;
        }
        for i in 1..base.len() {
            base[i] += base[i - 1];
        }

        let mut limit = [-1i64; MAX_CODE_LEN as usize + 2];
        let mut vec = 0i64;
        for i in min_len as usize..=max_len as usize {
            vec += base[i + 1] - base[i];
            limit[i] = vec - 1;
            vec <<= 1;
        }
        for i in min_len as usize + 1..=max_len as usize {
            base[i] = ((limit[i - 1] + 1) << 1) - base[i];
        }

        Self {
            min_len,
            max_len,
            limit,
            base,
            perm,
        }
    }

    fn decode(&self, r: &mut BitReader<'_>) -> Result<u16> {
        let mut len = self.min_len;
        let mut code = i64::from(r.read_bits(len)?);
        loop {
            if len > self.max_len {
                return Err(FmError::decode("invalid huffman code"));
            }
            if code <= self.limit[len as usize] {
                break;
            }
            len += 1;
            code = (code << 1) | i64::from(r.read_bits(1)?);
        }
        usize::try_from(code - self.base[len as usize])
            .ok()
            .and_then(|i| self.perm.get(i).copied())
            .ok_or_else(|| FmError::decode("huffman code outside table"))
    }
}

/// Decode exactly `len` MTF ranks (`< alpha`) written by [`encode`].
pub fn decode(r: &mut BitReader<'_>, alpha: usize, len: usize) -> Result<Vec<u8>> {
    let alpha_size = alpha + 2;
    let eob = alpha as u16 + 1;

    let n_groups = r.read_bits(3)? as usize;
    if !(2..=MAX_GROUPS).contains(&n_groups) {
        return Err(FmError::decode(format!("bad table count {n_groups}")));
    }
    let mut tables = Vec::with_capacity(n_groups);
    let mut lengths = vec![0u8; alpha_size];
    for _ in 0..n_groups {
        let mut cur = r.read_bits(5)?;
        for slot in lengths.iter_mut() {
            loop {
                if !(1..=MAX_CODE_LEN).contains(&cur) {
                    return Err(FmError::decode(format!("code length {cur} out of range")));
                }
                if !r.read_bit()? {
                    break;
                }
                if r.read_bit()? {
                    cur -= 1;
                } else {
                    cur += 1;
                }
            }
            *slot = cur as u8;
        }
        tables.push(DecodeTable::new(&lengths));
    }

    let mut out = Vec::with_capacity(len);
    let mut order: Vec<usize> = (0..n_groups).collect();
    let mut run = 0usize;
    let mut shift = 0u32;
    loop {
        let pos = r.read_unary(n_groups as u32 - 1)? as usize;
        let t = order[pos];
        order.copy_within(..pos, 1);
        order[0] = t;

        for _ in 0..GROUP_SIZE {
            let sym = tables[t].decode(r)?;
            if sym == RUNA || sym == RUNB {
                if shift >= 24 {
                    return Err(FmError::decode("zero run too long"));
                }
                run += (usize::from(sym) + 1) << shift;
                shift += 1;
                if out.len() + run > len {
                    return Err(FmError::decode("zero run overflows block"));
                }
                continue;
            }
            if shift > 0 {
                out.resize(out.len() + run, 0);
                run = 0;
                shift = 0;
            }
            if sym == eob {
                if out.len() != len {
                    return Err(FmError::decode(format!(
                        "block decoded to {} symbols, expected {len}",
                        out.len()
                    )));
                }
                return Ok(out);
            }
            if out.len() == len {
                return Err(FmError::decode("block longer than expected"));
            }
            out.push((sym - 1) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ranks: &[u8], alpha: usize) {
        let mut w = BitWriter::new();
        encode(&mut w, ranks, alpha);
        let bytes = w.into_bytes();
        let mut r = BitReader::at(&bytes, 0).unwrap();
        assert_eq!(decode(&mut r, alpha, ranks.len()).unwrap(), ranks);
    }

    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *seed >> 33
    }

    #[test]
    fn test_run_length_digits() {
        let rle = |zeros: usize| run_length_encode(&vec![0u8; zeros], 4);
        assert_eq!(rle(0), vec![5]);
        assert_eq!(rle(1), vec![RUNA, 5]);
        assert_eq!(rle(2), vec![RUNB, 5]);
        assert_eq!(rle(3), vec![RUNA, RUNA, 5]);
        assert_eq!(rle(4), vec![RUNB, RUNA, 5]);
        assert_eq!(rle(5), vec![RUNA, RUNB, 5]);
        assert_eq!(run_length_encode(&[2, 0, 3], 4), vec![3, RUNA, 4, 5]);
    }

    #[test]
    fn test_group_count_thresholds() {
        assert_eq!(group_count(1), 2);
        assert_eq!(group_count(199), 2);
        assert_eq!(group_count(200), 3);
        assert_eq!(group_count(1199), 4);
        assert_eq!(group_count(2400), 6);
    }

    #[test]
    fn test_code_lengths_are_prefix_free_and_capped() {
        let mut freq: Vec<u32> = (0..40).map(|i| 1u32 << (i % 16)).collect();
        freq[0] = 0;
        let lengths = code_lengths(&freq, MAX_CODE_LEN);
        assert!(lengths.iter().all(|&l| (1..=MAX_CODE_LEN as u8).contains(&l)));
        // Kraft sum must be exactly one for a full binary tree.
        let kraft: f64 = lengths.iter().map(|&l| 0.5f64.powi(l as i32)).sum();
        assert!((kraft - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_skewed_frequencies_get_short_codes() {
        let lengths = code_lengths(&[1000, 1, 1, 1], MAX_CODE_LEN);
        assert_eq!(lengths[0], 1);
        assert!(lengths[1..].iter().all(|&l| l >= 2));
    }

    #[test]
    fn test_round_trip_small() {
        round_trip(&[0], 1);
        round_trip(&[1, 0, 0, 1, 1, 0], 2);
        round_trip(&[0; 4096], 3);
    }

    #[test]
    fn test_round_trip_random_sizes() {
        let mut seed = 7;
        for &len in &[10usize, 199, 200, 777, 1500, 4096, 20_000] {
            for &alpha in &[2usize, 5, 17, 256] {
                let ranks: Vec<u8> = (0..len)
                    .map(|_| {
                        let x = lcg(&mut seed);
                        // skew towards zero like real MTF output
                        if x % 3 == 0 { 0 } else { (x % alpha as u64) as u8 }
                    })
                    .collect();
                round_trip(&ranks, alpha);
            }
        }
    }

    #[test]
    fn test_wrong_length_is_decode_error() {
        let ranks = vec![1u8, 2, 0, 0, 3];
        let mut w = BitWriter::new();
        encode(&mut w, &ranks, 4);
        let bytes = w.into_bytes();
        let mut r = BitReader::at(&bytes, 0).unwrap();
        assert!(matches!(decode(&mut r, 4, 4), Err(FmError::Decode(_))));
        let mut r = BitReader::at(&bytes, 0).unwrap();
        assert!(matches!(decode(&mut r, 4, 6), Err(FmError::Decode(_))));
    }

    #[test]
    fn test_garbage_does_not_panic() {
        let mut seed = 99;
        for _ in 0..200 {
            let bytes: Vec<u8> = (0..64).map(|_| lcg(&mut seed) as u8).collect();
            let mut r = BitReader::at(&bytes, 0).unwrap();
            let _ = decode(&mut r, 7, 100);
        }
    }
}
