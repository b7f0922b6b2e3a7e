//! FM-Index Full-Text Search Example
//!
//! Builds a compressed index, saves it, maps it back and queries it.
//!
//! ```bash
//! cargo run --example full_text_search
//! ```

use alice_fm::{BuildOptions, FmIndex};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== ALICE-FM Compressed Index Demo ===\n");

    let sentence = "the quick brown fox jumps over the lazy dog. \
                    the fox was quick and the dog was lazy. \
                    a quick brown dog outfoxed a lazy fox. ";
    let text = sentence.repeat(1000).into_bytes();
    println!("Text: {} bytes ({} copies of a {}-byte paragraph)", text.len(), 1000, sentence.len());

    let options: BuildOptions = "-B 16 -b 1024 -F 0.05".parse()?;
    let index = FmIndex::build(&text, &options)?;
    println!(
        "Index: {} bytes ({:.1}% of text), skip rate {}",
        index.serialized_size(),
        index.compression_ratio() * 100.0,
        index.skip_rate()
    );

    println!("\n--- Search Results ---\n");
    let mut searcher = index.searcher();
    for query in ["fox", "the", "quick", "lazy", "cat", "brown fox"] {
        let count = searcher.count(query.as_bytes())?;
        if count > 0 {
            let positions = searcher.locate(query.as_bytes())?;
            println!("  \"{query}\" -> {count} occurrences, first at {:?}", &positions[..3.min(positions.len())]);
        } else {
            println!("  \"{query}\" -> not found");
        }
    }

    println!("\n--- Snippets ---\n");
    for snippet in searcher.display(b"outfoxed", 12)?.iter().take(3) {
        println!(
            "  @{:>6}: ...{}...",
            snippet.offset.unwrap_or_default(),
            String::from_utf8_lossy(&snippet.text)
        );
    }

    println!("\n--- Persistence ---\n");
    let dir = std::env::temp_dir().join("alice-fm-demo");
    std::fs::create_dir_all(&dir)?;
    let path = index.save(dir.join("quick_brown_fox"))?;
    let mapped = FmIndex::map(dir.join("quick_brown_fox"))?;
    println!("  saved and mapped {}", path.display());
    println!("  mapped extract(45, 83) = {:?}", String::from_utf8_lossy(&mapped.extract(45, 83)?));
    std::fs::remove_file(path)?;

    Ok(())
}
