//! # ALICE-FM
//!
//! **Compressed full-text self-index (FM-index)**
//!
//! > "Build once, query many times." The index replaces the text: counting,
//! > locating and extracting never decompress the whole corpus.
//!
//! ## Architecture
//!
//! - **SA-IS + BWT**: linear-time suffix array, `$` row dropped from the last column
//! - **Superbuckets / buckets**: two-level occurrence counts over the BWT
//! - **MTF + multi-table Huffman**: per-bucket compression, decoded on demand
//! - **Position marking**: sampled markers make locate/extract a bounded walk
//! - **Small-text tiers**: short texts skip the index and use Boyer-Moore
//!
//! ## Performance
//!
//! | Operation | Time | Space |
//! |-----------|------|-------|
//! | Build | **O(N)** (SA-IS) | O(N × 5) transient |
//! | Count | **O(M)** bucket probes | O(bucket) |
//! | Locate | O(M + occ × rate) | O(occ) |
//! | Extract | O((to - from + rate)) | O(to - from) |
//!
//! ## Example
//!
//! ```
//! use alice_fm::{BuildOptions, FmIndex};
//!
//! let text = b"abracadabra";
//! let index = FmIndex::build(text, &BuildOptions::default()).unwrap();
//!
//! assert_eq!(index.count(b"abra").unwrap(), 2);
//! assert_eq!(index.count(b"a").unwrap(), 5);
//! assert!(index.contains(b"cadabra").unwrap());
//! assert_eq!(index.locate(b"abra").unwrap(), vec![0, 7]);
//! assert_eq!(index.extract(4, 6).unwrap(), b"cad".to_vec());
//! ```

pub mod alphabet;
pub mod bitio;
pub mod build;
pub mod bwt;
pub mod codec;
pub mod error;
pub mod huffman;
pub mod layout;
pub mod marking;
pub mod mtf;
pub mod occ;
pub mod options;
pub mod query;
pub mod sais;
pub mod search;
pub mod small;

pub use error::{FmError, Result};
pub use options::BuildOptions;
pub use query::Snippet;
pub use search::{FmIndex, Searcher};

/// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension of saved index images.
pub const INDEX_EXTENSION: &str = "fmi";
