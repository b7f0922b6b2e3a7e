//! FM-Index facade
//!
//! **Architecture**:
//! - Image: the serialized index, owned (`Vec<u8>`) or memory-mapped
//! - Kind: small tiers hold the plaintext (Boyer-Moore), the compressed
//!   tier holds only the parsed prologue and section offsets
//! - Queries read the image through a per-query [`DecodeContext`]
//!
//! `FmIndex` is immutable after build/load and can be shared between
//! threads. Each thread that issues many queries should take its own
//! [`Searcher`], which keeps the last decoded bucket around.

use std::borrow::Cow;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::bitio::BitReader;
use crate::build::build_image;
use crate::error::{FmError, Result};
use crate::occ::DecodeContext;
use crate::options::BuildOptions;
use crate::query::{CompressedIndex, Snippet};
use crate::small::{self, SmallText, SMALL_TEXT_THRESHOLD};
use crate::INDEX_EXTENSION;

enum Image {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for Image {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Image::Owned(v) => v,
            Image::Mapped(m) => m,
        }
    }
}

enum Kind {
    Small(SmallText),
    Compressed(CompressedIndex),
}

/// Compressed full-text self-index.
///
/// Counting is independent of text length; locate and extract cost a
/// bounded number of LF steps per result.
pub struct FmIndex {
    image: Image,
    kind: Kind,
}

impl FmIndex {
    /// Build an index over `text`.
    ///
    /// # Example
    /// ```
    /// use alice_fm::{BuildOptions, FmIndex};
    ///
    /// let index = FmIndex::build(b"abracadabra", &BuildOptions::default()).unwrap();
    /// assert_eq!(index.count(b"abra").unwrap(), 2);
    /// ```
    pub fn build(text: &[u8], options: &BuildOptions) -> Result<Self> {
        if !text.is_empty() && text.len() < SMALL_TEXT_THRESHOLD {
            let image = small::encode(text)?;
            return Ok(Self::assemble(Image::Owned(image), Kind::Small(SmallText::new(text.to_vec()))));
        }
        Self::open(Image::Owned(build_image(Cow::Borrowed(text), options)?))
    }

    /// Build an index, reusing `text` as working storage.
    pub fn build_owned(text: Vec<u8>, options: &BuildOptions) -> Result<Self> {
        if !text.is_empty() && text.len() < SMALL_TEXT_THRESHOLD {
            let image = small::encode(&text)?;
            return Ok(Self::assemble(Image::Owned(image), Kind::Small(SmallText::new(text))));
        }
        Self::open(Image::Owned(build_image(Cow::Owned(text), options)?))
    }

    fn assemble(image: Image, kind: Kind) -> Self {
        log::debug!("index ready: {} byte image", image.len());
        Self { image, kind }
    }

    fn open(image: Image) -> Result<Self> {
        let len = BitReader::at(&image, 0)?.read_u32()?;
        let kind = if small::is_small(len) {
            Kind::Small(SmallText::decode(&image)?)
        } else {
            Kind::Compressed(CompressedIndex::open(&image)?)
        };
        Ok(Self::assemble(image, kind))
    }

    /// Load an index from a serialized image.
    pub fn from_bytes(image: Vec<u8>) -> Result<Self> {
        Self::open(Image::Owned(image))
    }

    /// Serialize the index into `w`.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&self.image)?;
        w.flush()
    }

    /// Path of the index file for `base`: `<base>.fmi`.
    pub fn index_path(base: impl AsRef<Path>) -> PathBuf {
        let mut path = base.as_ref().as_os_str().to_owned();
        path.push(".");
        path.push(INDEX_EXTENSION);
        PathBuf::from(path)
    }

    /// Write `<base>.fmi`; returns the path written.
    pub fn save(&self, base: impl AsRef<Path>) -> Result<PathBuf> {
        let path = Self::index_path(base);
        fs::write(&path, &*self.image).map_err(|source| FmError::File {
            path: path.clone(),
            source,
        })?;
        log::debug!("saved {} bytes to {}", self.image.len(), path.display());
        Ok(path)
    }

    /// Read `<base>.fmi` into memory.
    pub fn load(base: impl AsRef<Path>) -> Result<Self> {
        let path = Self::index_path(base);
        let image = fs::read(&path).map_err(|source| FmError::Read { path, source })?;
        Self::from_bytes(image)
    }

    /// Memory-map `<base>.fmi` and query it in place.
    pub fn map(base: impl AsRef<Path>) -> Result<Self> {
        let path = Self::index_path(base);
        let read_err = |source| FmError::Read {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(read_err)?;
        // SAFETY: the mapping is read-only; the index file must not be
        // modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(read_err)?;
        Self::open(Image::Mapped(mmap))
    }

    /// Searcher with its own decode context, for repeated queries.
    pub fn searcher(&self) -> Searcher<'_> {
        Searcher {
            index: self,
            ctx: DecodeContext::new(),
        }
    }

    /// Count occurrences of `pattern`.
    pub fn count(&self, pattern: &[u8]) -> Result<usize> {
        self.searcher().count(pattern)
    }

    pub fn contains(&self, pattern: &[u8]) -> Result<bool> {
        self.searcher().contains(pattern)
    }

    /// All offsets of `pattern`, ascending.
    ///
    /// Fails with [`FmError::NoMarkedChar`] on compressed indexes built
    /// without marking.
    pub fn locate(&self, pattern: &[u8]) -> Result<Vec<usize>> {
        self.searcher().locate(pattern)
    }

    /// Text in the inclusive range `[from, to]`; `to` is clamped to the text.
    pub fn extract(&self, from: usize, to: usize) -> Result<Vec<u8>> {
        self.searcher().extract(from, to)
    }

    /// One snippet per occurrence with up to `context` bytes on each side.
    pub fn display(&self, pattern: &[u8], context: usize) -> Result<Vec<Snippet>> {
        self.searcher().display(pattern, context)
    }

    /// The whole original text.
    pub fn unbuild(&self) -> Result<Vec<u8>> {
        match &self.kind {
            Kind::Small(s) => Ok(s.as_bytes().to_vec()),
            Kind::Compressed(c) => c.unbuild(&self.image),
        }
    }

    /// Original text length.
    pub fn len(&self) -> usize {
        match &self.kind {
            Kind::Small(s) => s.len(),
            Kind::Compressed(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the serialized image in bytes.
    pub fn serialized_size(&self) -> usize {
        self.image.len()
    }

    /// Image size relative to the text (lower is better).
    pub fn compression_ratio(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.serialized_size() as f64 / self.len() as f64
    }

    /// Marker skip rate; small tiers report 1 since every position resolves.
    pub fn skip_rate(&self) -> u32 {
        match &self.kind {
            Kind::Small(_) => 1,
            Kind::Compressed(c) => c.skip_rate(),
        }
    }

    /// Whether queries run over a compressed FM-index image.
    pub fn is_compressed(&self) -> bool {
        matches!(self.kind, Kind::Compressed(_))
    }

    /// The serialized image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.image
    }
}

impl fmt::Debug for FmIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmIndex")
            .field("len", &self.len())
            .field("serialized_size", &self.serialized_size())
            .field("compressed", &self.is_compressed())
            .field("mapped", &matches!(self.image, Image::Mapped(_)))
            .field("skip_rate", &self.skip_rate())
            .finish()
    }
}

/// Query handle owning a private decode context.
pub struct Searcher<'a> {
    index: &'a FmIndex,
    ctx: DecodeContext,
}

impl Searcher<'_> {
    pub fn count(&mut self, pattern: &[u8]) -> Result<usize> {
        let index = self.index;
        match &index.kind {
            Kind::Small(s) => Ok(s.count(pattern)),
            Kind::Compressed(c) => c.count(&index.image, &mut self.ctx, pattern),
        }
    }

    pub fn contains(&mut self, pattern: &[u8]) -> Result<bool> {
        Ok(self.count(pattern)? > 0)
    }

    pub fn locate(&mut self, pattern: &[u8]) -> Result<Vec<usize>> {
        let index = self.index;
        match &index.kind {
            Kind::Small(s) => Ok(s.locate(pattern)),
            Kind::Compressed(c) => c.locate(&index.image, &mut self.ctx, pattern),
        }
    }

    pub fn extract(&mut self, from: usize, to: usize) -> Result<Vec<u8>> {
        let index = self.index;
        match &index.kind {
            Kind::Small(s) => Ok(s.extract(from, to)),
            Kind::Compressed(c) => c.extract(&index.image, &mut self.ctx, from, to),
        }
    }

    pub fn display(&mut self, pattern: &[u8], context: usize) -> Result<Vec<Snippet>> {
        let index = self.index;
        match &index.kind {
            Kind::Small(s) => Ok(s.display(pattern, context)),
            Kind::Compressed(c) => c.display(&index.image, &mut self.ctx, pattern, context),
        }
    }
}

impl fmt::Debug for Searcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Searcher").field("index", self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(len: usize) -> Vec<u8> {
        let words = ["alpha ", "beta ", "gamma ", "delta ", "epsilon ", "zeta "];
        let mut state = 11u32;
        let mut out = Vec::with_capacity(len + 8);
        while out.len() < len {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            out.extend_from_slice(words[(state >> 16) as usize % words.len()].as_bytes());
        }
        out.truncate(len);
        out
    }

    fn naive(text: &[u8], pattern: &[u8]) -> Vec<usize> {
        text.windows(pattern.len())
            .enumerate()
            .filter(|(_, w)| *w == pattern)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_small_tiers() {
        for len in [10usize, 1024, 1025, 20_000] {
            let text = corpus(len);
            let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
            assert!(!index.is_compressed());
            assert_eq!(index.len(), len);
            assert_eq!(index.count(b"a").unwrap(), naive(&text, b"a").len());
            let reloaded = FmIndex::from_bytes(index.as_bytes().to_vec()).unwrap();
            assert_eq!(reloaded.unbuild().unwrap(), text);
        }
    }

    #[test]
    fn test_compressed_tier() {
        let text = corpus(80_000);
        let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
        assert!(index.is_compressed());
        assert_eq!(index.len(), text.len());
        assert!(index.serialized_size() < text.len());

        let mut searcher = index.searcher();
        for pattern in [&b"zeta"[..], b"a e", b"a"] {
            assert_eq!(searcher.count(pattern).unwrap(), naive(&text, pattern).len());
        }
        for pattern in [&b"gamma delta zeta"[..], b"epsilon epsilon beta"] {
            let expected = naive(&text, pattern);
            assert_eq!(searcher.count(pattern).unwrap(), expected.len());
            assert_eq!(searcher.locate(pattern).unwrap(), expected);
        }
        assert!(!searcher.contains(b"omega").unwrap());
        assert_eq!(searcher.extract(1000, 1099).unwrap(), text[1000..1100].to_vec());
        assert_eq!(index.extract(0, usize::MAX).unwrap(), text);
    }

    #[test]
    fn test_build_owned_matches_build() {
        let text = corpus(60_000);
        let a = FmIndex::build(&text, &BuildOptions::default()).unwrap();
        let b = FmIndex::build_owned(text, &BuildOptions::default()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_index_path() {
        assert_eq!(FmIndex::index_path("corpus/genome"), PathBuf::from("corpus/genome.fmi"));
        assert_eq!(FmIndex::index_path("a.txt"), PathBuf::from("a.txt.fmi"));
    }

    #[test]
    fn test_is_sync() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<FmIndex>();
    }
}
