//! Build configuration
//!
//! `BuildOptions` is what callers set; `Resolved` is what the builder uses
//! after clamping every knob into its legal range.

use core::str::FromStr;

use crate::error::{FmError, Result};

/// Smallest bucket size in bytes.
pub const MIN_BUCKET_SIZE: u32 = 256;
/// Largest bucket size in bytes.
pub const MAX_BUCKET_SIZE: u32 = 4096;
/// Smallest superbucket size in KiB.
pub const MIN_SUPERBUCKET_KIB: u32 = 4;
/// Largest superbucket size in KiB (16-bit header field).
pub const MAX_SUPERBUCKET_KIB: u32 = 0x7fff;

/// Caller-facing index construction options.
///
/// # Example
/// ```
/// use alice_fm::BuildOptions;
///
/// let opts: BuildOptions = "-B 32 -b 2048 -F 0.05".parse().unwrap();
/// assert_eq!(opts.superbucket_kib, 32);
/// assert_eq!(opts.bucket_size, 2048);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildOptions {
    /// Superbucket size in KiB
    pub superbucket_kib: u32,
    /// Bucket size in bytes
    pub bucket_size: u32,
    /// Fraction of text positions to mark for locate/extract (0.0 disables)
    pub marker_frequency: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            superbucket_kib: 16,
            bucket_size: 1024,
            marker_frequency: 0.02,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn superbucket_kib(mut self, kib: u32) -> Self {
        self.superbucket_kib = kib;
        self
    }

    pub fn bucket_size(mut self, bytes: u32) -> Self {
        self.bucket_size = bytes;
        self
    }

    pub fn marker_frequency(mut self, freq: f64) -> Self {
        self.marker_frequency = freq;
        self
    }

    /// Options for an index without locate/extract support.
    pub fn count_only() -> Self {
        Self::default().marker_frequency(0.0)
    }

    /// Clamp every field into range and derive the marker skip rate.
    pub fn resolve(&self) -> Result<Resolved> {
        if !self.marker_frequency.is_finite() {
            return Err(FmError::Config(format!(
                "marker frequency must be finite, got {}",
                self.marker_frequency
            )));
        }
        let freq = self.marker_frequency.clamp(0.0, 1.0);
        let skip_rate = if freq >= 0.5 {
            1
        } else if freq == 0.0 {
            0
        } else {
            (1.0 / freq).floor().min(u32::MAX as f64) as u32
        };

        let bucket_size = self
            .bucket_size
            .clamp(MIN_BUCKET_SIZE, MAX_BUCKET_SIZE)
            .next_power_of_two();

        let kib = self
            .superbucket_kib
            .clamp(MIN_SUPERBUCKET_KIB, MAX_SUPERBUCKET_KIB);
        let mut superbucket_size = (kib << 10).max(bucket_size * 8);
        superbucket_size = superbucket_size.div_ceil(bucket_size) * bucket_size;
        // The header stores KiB, so keep whole kibibytes.
        superbucket_size = superbucket_size.div_ceil(1024) * 1024;

        let resolved = Resolved {
            superbucket_size: superbucket_size as usize,
            bucket_size: bucket_size as usize,
            skip_rate,
        };
        if bucket_size != self.bucket_size
            || superbucket_size != self.superbucket_kib << 10
            || freq != self.marker_frequency
        {
            log::warn!("build options adjusted: {:?} -> {:?}", self, resolved);
        }
        Ok(resolved)
    }
}

impl FromStr for BuildOptions {
    type Err = FmError;

    /// Parse the classic option string: `-B <kib> -b <bytes> -F <freq>`.
    fn from_str(s: &str) -> Result<Self> {
        let mut opts = BuildOptions::default();
        let mut tokens = s.split_whitespace();
        while let Some(flag) = tokens.next() {
            let value = tokens
                .next()
                .ok_or_else(|| FmError::Config(format!("option {flag} needs a value")))?;
            match flag {
                "-B" => opts.superbucket_kib = parse_value(flag, value)?,
                "-b" => opts.bucket_size = parse_value(flag, value)?,
                "-F" => opts.marker_frequency = parse_value(flag, value)?,
                _ => return Err(FmError::Config(format!("unknown option {flag}"))),
            }
        }
        Ok(opts)
    }
}

fn parse_value<T: FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| FmError::Config(format!("bad value {value:?} for option {flag}")))
}

/// Normalized build parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Superbucket size in bytes (multiple of `bucket_size` and of 1 KiB)
    pub superbucket_size: usize,
    /// Bucket size in bytes (power of two)
    pub bucket_size: usize,
    /// 0 = no marking, 1 = every position, n = every n-th position
    pub skip_rate: u32,
}
