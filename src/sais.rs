//! Suffix array construction (SA-IS)
//!
//! **Algorithm**: induced sorting (Nong, Zhang & Chan). Linear time.
//! - Classify suffixes as S/L type
//! - Sort LMS substrings by induction, name them
//! - Recurse on the reduced string when names collide
//! - Induce the full order from the sorted LMS suffixes
//!
//! The byte text is lifted to `b + 1` with a unique `0` sentinel appended;
//! the sentinel suffix is dropped from the result.

const EMPTY: usize = usize::MAX;

/// Suffix array of `text` (sentinel excluded). `sa[i]` is the start of the
/// i-th smallest suffix.
pub fn suffix_array(text: &[u8]) -> Vec<u32> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lifted: Vec<u32> = Vec::with_capacity(text.len() + 1);
    lifted.extend(text.iter().map(|&b| u32::from(b) + 1));
    lifted.push(0);
    let sa = sais(&lifted, 257);
    // sa[0] is the sentinel.
    sa[1..].iter().map(|&p| p as u32).collect()
}

/// Bucket start (`tails == false`) or end offsets per symbol.
fn buckets(text: &[u32], alpha: usize, tails: bool) -> Vec<usize> {
    let mut sizes = vec![0usize; alpha];
    for &c in text {
        sizes[c as usize] += 1;
    }
    let mut sum = 0;
    for b in sizes.iter_mut() {
        sum += *b;
        *b = if tails { sum } else { sum - *b };
    }
    sizes
}

#[inline]
fn is_lms(stype: &[bool], i: usize) -> bool {
    i > 0 && stype[i] && !stype[i - 1]
}

/// Induce L-type then S-type suffixes from the LMS seeds already in `sa`.
fn induce(text: &[u32], alpha: usize, stype: &[bool], sa: &mut [usize]) {
    let n = text.len();
    let mut heads = buckets(text, alpha, false);
    for i in 0..n {
        let j = sa[i];
        if j != EMPTY && j > 0 && !stype[j - 1] {
            let c = text[j - 1] as usize;
            sa[heads[c]] = j - 1;
            heads[c] += 1;
        }
    }
    let mut tails = buckets(text, alpha, true);
    for i in (0..n).rev() {
        let j = sa[i];
        if j != EMPTY && j > 0 && stype[j - 1] {
            let c = text[j - 1] as usize;
            tails[c] -= 1;
            sa[tails[c]] = j - 1;
        }
    }
}

fn lms_substrings_equal(text: &[u32], stype: &[bool], a: usize, b: usize) -> bool {
    let n = text.len();
    let mut d = 0;
    loop {
        let (x, y) = (a + d, b + d);
        if x >= n || y >= n {
            return false;
        }
        if text[x] != text[y] || stype[x] != stype[y] {
            return false;
        }
        if d > 0 {
            let (lx, ly) = (is_lms(stype, x), is_lms(stype, y));
            if lx || ly {
                return lx && ly;
            }
        }
        d += 1;
    }
}

/// `text` must end with a unique smallest symbol `0`.
fn sais(text: &[u32], alpha: usize) -> Vec<usize> {
    let n = text.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![0],
        _ => {}
    }

    let mut stype = vec![false; n];
    stype[n - 1] = true;
    for i in (0..n - 1).rev() {
        stype[i] = text[i] < text[i + 1] || (text[i] == text[i + 1] && stype[i + 1]);
    }
    let lms: Vec<usize> = (1..n).filter(|&i| is_lms(&stype, i)).collect();

    // Seed LMS positions at bucket tails, then induce to sort LMS substrings.
    let mut sa = vec![EMPTY; n];
    let mut tails = buckets(text, alpha, true);
    for &p in lms.iter().rev() {
        let c = text[p] as usize;
        tails[c] -= 1;
        sa[tails[c]] = p;
    }
    induce(text, alpha, &stype, &mut sa);

    // Name LMS substrings in sorted order.
    let mut names = vec![EMPTY; n];
    let mut name = 0usize;
    let mut prev = EMPTY;
    for &p in sa.iter() {
        if p == EMPTY || !is_lms(&stype, p) {
            continue;
        }
        if prev == EMPTY || !lms_substrings_equal(text, &stype, prev, p) {
            name += 1;
        }
        names[p] = name - 1;
        prev = p;
    }

    let sorted_lms: Vec<usize> = if name < lms.len() {
        let reduced: Vec<u32> = lms.iter().map(|&p| names[p] as u32).collect();
        let reduced_sa = sais(&reduced, name);
        reduced_sa.into_iter().map(|r| lms[r]).collect()
    } else {
        // Unique names: the name is the rank.
        let mut order = vec![0usize; lms.len()];
        for &p in &lms {
            order[names[p]] = p;
        }
        order
    };

    sa.fill(EMPTY);
    let mut tails = buckets(text, alpha, true);
    for &p in sorted_lms.iter().rev() {
        let c = text[p] as usize;
        tails[c] -= 1;
        sa[tails[c]] = p;
    }
    induce(text, alpha, &stype, &mut sa);
    sa
}
