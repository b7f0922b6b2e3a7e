//! Alphabet remapping
//!
//! Maps the bytes present in a text onto dense codes `0..size`, keeping
//! their byte order, and records per-code totals plus the C-table
//! (number of text symbols smaller than each code).

use crate::error::{FmError, Result};

/// Dense byte <-> code mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    present: [bool; 256],
    code: [u8; 256],
    symbols: Vec<u8>,
}

impl Alphabet {
    /// Build from a 256-entry presence map.
    pub fn from_presence(present: [bool; 256]) -> Result<Self> {
        let mut code = [0u8; 256];
        let mut symbols = Vec::new();
        for byte in 0..256usize {
            if present[byte] {
                code[byte] = symbols.len() as u8;
                symbols.push(byte as u8);
            }
        }
        if symbols.is_empty() {
            return Err(FmError::Config("empty alphabet".into()));
        }
        Ok(Self {
            present,
            code,
            symbols,
        })
    }

    /// Number of distinct symbols (1..=256).
    #[inline]
    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.present[byte as usize]
    }

    #[inline]
    pub fn code(&self, byte: u8) -> Option<u8> {
        self.contains(byte).then(|| self.code[byte as usize])
    }

    #[inline]
    pub fn symbol(&self, code: u8) -> u8 {
        self.symbols[code as usize]
    }

    pub fn presence(&self) -> &[bool; 256] {
        &self.present
    }

    /// Remap a pattern; `None` if any byte is absent from the alphabet.
    pub fn encode(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        bytes.iter().map(|&b| self.code(b)).collect()
    }

    /// Remap a text in place.
    pub fn encode_in_place(&self, bytes: &mut [u8]) {
        for b in bytes.iter_mut() {
            *b = self.code[*b as usize];
        }
    }
}

/// Alphabet of a text together with its symbol statistics.
#[derive(Debug, Clone)]
pub struct AlphabetStats {
    pub alphabet: Alphabet,
    /// Occurrences per code
    pub counts: Vec<u32>,
    /// C-table: occurrences of all smaller codes
    pub prefix: Vec<u32>,
}

/// Scan a text and build its alphabet.
pub fn count_occurrences(text: &[u8]) -> Result<AlphabetStats> {
    if text.is_empty() {
        return Err(FmError::Config("cannot index an empty text".into()));
    }
    let mut freq = [0u64; 256];
    for &b in text {
        freq[b as usize] += 1;
    }
    let mut present = [false; 256];
    for (p, &f) in present.iter_mut().zip(freq.iter()) {
        *p = f > 0;
    }
    let alphabet = Alphabet::from_presence(present)?;
    let counts: Vec<u32> = alphabet
        .symbols
        .iter()
        .map(|&s| freq[s as usize] as u32)
        .collect();
    let prefix = prefix_sums(&counts);
    Ok(AlphabetStats {
        alphabet,
        counts,
        prefix,
    })
}

/// Exclusive prefix sums (C-table).
pub fn prefix_sums(counts: &[u32]) -> Vec<u32> {
    let mut sum = 0u32;
    counts
        .iter()
        .map(|&c| {
            let before = sum;
            sum += c;
            before
        })
        .collect()
}
