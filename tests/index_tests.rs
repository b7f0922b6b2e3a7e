use alice_fm::{BuildOptions, FmError, FmIndex};

fn corpus(len: usize, seed: u32) -> Vec<u8> {
    let words: [&[u8]; 8] = [
        b"banana ", b"bandana ", b"cabana ", b"ananas ", b"nab ", b"bab ", b"\n", b"an ",
    ];
    let mut state = seed;
    let mut text = Vec::with_capacity(len + 8);
    while text.len() < len {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        text.extend_from_slice(words[(state >> 29) as usize]);
    }
    text.truncate(len);
    text
}

fn naive(text: &[u8], pattern: &[u8]) -> Vec<usize> {
    if pattern.is_empty() || pattern.len() > text.len() {
        return Vec::new();
    }
    text.windows(pattern.len())
        .enumerate()
        .filter(|(_, w)| *w == pattern)
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn test_banana() {
    let index = FmIndex::build(b"banana", &BuildOptions::default()).unwrap();
    assert_eq!(index.len(), 6);
    assert_eq!(index.count(b"ana").unwrap(), 2);
    assert_eq!(index.locate(b"ana").unwrap(), vec![1, 3]);
    assert_eq!(index.extract(1, 3).unwrap(), b"ana".to_vec());
    assert_eq!(index.extract(0, 100).unwrap(), b"banana".to_vec());
    assert!(index.extract(4, 2).unwrap().is_empty());
    assert!(index.extract(6, 9).unwrap().is_empty());
    assert_eq!(index.count(b"").unwrap(), 0);
    assert_eq!(index.count(b"bananas").unwrap(), 0);
}

#[test]
fn test_banana_with_terminator() {
    let index = FmIndex::build(b"banana$", &BuildOptions::default()).unwrap();
    assert_eq!(index.count(b"ana").unwrap(), 2);
    assert_eq!(index.locate(b"ana").unwrap(), vec![1, 3]);
    assert_eq!(index.extract(1, 3).unwrap(), b"ana".to_vec());
    assert_eq!(index.extract(0, 6).unwrap(), b"banana$".to_vec());
    assert!(index.contains(b"a$").unwrap());
}

#[test]
fn test_threshold_neighbours_agree() {
    let text = corpus(51_201, 11);
    let below = FmIndex::build(&text[..51_199], &BuildOptions::default()).unwrap();
    let above = FmIndex::build(&text, &BuildOptions::default()).unwrap();
    assert!(!below.is_compressed());
    assert!(above.is_compressed());
    for pattern in [&b"cabana nab"[..], b"ananas bab", b"bandana \n"] {
        let limit = 51_199 - pattern.len();
        let shared: Vec<usize> = above
            .locate(pattern)
            .unwrap()
            .into_iter()
            .filter(|&at| at <= limit)
            .collect();
        assert_eq!(below.locate(pattern).unwrap(), shared, "{pattern:?}");
    }
}

#[test]
fn test_extract_is_repeatable() {
    let text = corpus(64_000, 12);
    let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
    let first = index.extract(10_000, 10_300).unwrap();
    assert_eq!(index.extract(10_000, 10_300).unwrap(), first);
    assert_eq!(index.extract(10_000, 10_120).unwrap(), first[..=120].to_vec());
}

#[test]
fn test_compressed_banana_corpus() {
    let text = corpus(120_000, 1);
    let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
    assert!(index.is_compressed());
    let mut searcher = index.searcher();
    for pattern in [&b"ana"[..], b"b", b"\n", b"an an"] {
        assert_eq!(searcher.count(pattern).unwrap(), naive(&text, pattern).len(), "{pattern:?}");
    }
    for pattern in [&b"banana bandana"[..], b"\nnab", b"cabana ananas ", b"zzz"] {
        let expected = naive(&text, pattern);
        assert_eq!(searcher.count(pattern).unwrap(), expected.len(), "{pattern:?}");
        assert_eq!(searcher.locate(pattern).unwrap(), expected, "{pattern:?}");
    }
    for (from, to) in [(0, 0), (1, 63), (49_999, 50_123), (119_900, 119_999), (119_990, 500_000)] {
        let to_clamped = to.min(text.len() - 1);
        assert_eq!(searcher.extract(from, to).unwrap(), text[from..=to_clamped].to_vec());
    }
}

#[test]
fn test_no_marking() {
    let text = corpus(60_000, 2);
    let index = FmIndex::build(&text, &BuildOptions::count_only()).unwrap();
    assert_eq!(index.skip_rate(), 0);
    assert_eq!(index.count(b"bandana").unwrap(), naive(&text, b"bandana").len());
    assert!(matches!(index.locate(b"bandana"), Err(FmError::NoMarkedChar)));
    assert!(matches!(index.extract(10, 20), Err(FmError::NoMarkedChar)));
    // whole-text extraction inverts the BWT instead
    assert_eq!(index.extract(0, text.len() - 1).unwrap(), text);
    let snippets = index.display(b"cabana bab nab", 3).unwrap();
    assert_eq!(snippets.len(), naive(&text, b"cabana bab nab").len());
    assert!(snippets.iter().all(|s| s.offset.is_none()));
}

#[test]
fn test_every_position_marked() {
    let text = corpus(55_000, 3);
    let index = FmIndex::build(&text, &BuildOptions::default().marker_frequency(1.0)).unwrap();
    assert_eq!(index.skip_rate(), 1);
    assert_eq!(index.locate(b"nab bab").unwrap(), naive(&text, b"nab bab"));
    assert_eq!(index.extract(777, 800).unwrap(), text[777..=800].to_vec());
    assert_eq!(index.extract(54_990, 60_000).unwrap(), text[54_990..].to_vec());
}

#[test]
fn test_tier_thresholds() {
    for (len, compressed) in [(1024, false), (1025, false), (51_199, false), (51_200, true)] {
        let text = corpus(len, 4);
        let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
        assert_eq!(index.is_compressed(), compressed, "len {len}");
        assert_eq!(index.len(), len);
        let reloaded = FmIndex::from_bytes(index.as_bytes().to_vec()).unwrap();
        assert_eq!(reloaded.is_compressed(), compressed);
        assert_eq!(reloaded.count(b"ana").unwrap(), naive(&text, b"ana").len());
        assert_eq!(reloaded.unbuild().unwrap(), text);
    }
    // plain image is the text behind a length word
    let index = FmIndex::build(&corpus(1024, 4), &BuildOptions::default()).unwrap();
    assert_eq!(index.serialized_size(), 1028);
}

#[test]
fn test_empty_text_rejected() {
    assert!(matches!(
        FmIndex::build(b"", &BuildOptions::default()),
        Err(FmError::Config(_))
    ));
    assert!(FmIndex::build_owned(Vec::new(), &BuildOptions::default()).is_err());
}

#[test]
fn test_save_load_map() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("corpus");
    let text = corpus(70_000, 5);
    let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();

    let path = index.save(&base).unwrap();
    assert_eq!(path, dir.path().join("corpus.fmi"));
    assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, index.serialized_size());

    let loaded = FmIndex::load(&base).unwrap();
    let mapped = FmIndex::map(&base).unwrap();
    for other in [&loaded, &mapped] {
        assert_eq!(other.as_bytes(), index.as_bytes());
        assert_eq!(other.len(), text.len());
        assert_eq!(other.locate(b"cabana nab").unwrap(), naive(&text, b"cabana nab"));
        assert_eq!(other.extract(300, 420).unwrap(), text[300..=420].to_vec());
    }

    let mut buf = Vec::new();
    index.write_to(&mut buf).unwrap();
    assert_eq!(buf, index.as_bytes());
}

#[test]
fn test_persistence_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(FmIndex::load(dir.path().join("missing")), Err(FmError::Read { .. })));
    assert!(matches!(FmIndex::map(dir.path().join("missing")), Err(FmError::Read { .. })));

    let index = FmIndex::build(b"banana", &BuildOptions::default()).unwrap();
    let err = index.save(dir.path().join("no/such/dir/idx")).unwrap_err();
    assert!(matches!(err, FmError::File { .. }));
    assert!(err.to_string().contains("idx.fmi"));
}

#[test]
fn test_corrupt_images() {
    let text = corpus(60_000, 6);
    let image = FmIndex::build(&text, &BuildOptions::default()).unwrap().as_bytes().to_vec();

    assert!(FmIndex::from_bytes(Vec::new()).is_err());
    assert!(FmIndex::from_bytes(image[..image.len() / 2].to_vec()).is_err());
    assert!(FmIndex::from_bytes(image[..40].to_vec()).is_err());

    // compression tag follows the 32-bit length
    let mut bad = image.clone();
    bad[4] = 2;
    assert!(matches!(FmIndex::from_bytes(bad), Err(FmError::UnsupportedCompression(2))));

    // bucket size field: 300 is not a multiple of anything useful
    let mut bad = image.clone();
    bad[11..13].copy_from_slice(&300u16.to_be_bytes());
    assert!(matches!(FmIndex::from_bytes(bad), Err(FmError::CompressedFormat(_))));

    // plain image claiming more bytes than it has
    let mut plain = FmIndex::build(b"short text", &BuildOptions::default())
        .unwrap()
        .as_bytes()
        .to_vec();
    plain[3] = 200;
    assert!(FmIndex::from_bytes(plain).is_err());
}

#[test]
fn test_payload_damage_never_panics() {
    let text = corpus(60_000, 7);
    let image = FmIndex::build(&text, &BuildOptions::default()).unwrap().as_bytes().to_vec();
    for k in 1..9 {
        let mut bad = image.clone();
        let at = image.len() * k / 10;
        bad[at] ^= 0x5a;
        if let Ok(index) = FmIndex::from_bytes(bad) {
            let _ = index.count(b"bandana");
            let _ = index.extract(1000, 1040);
        }
    }
}

#[test]
fn test_display_snippets() {
    let text = corpus(80_000, 8);
    let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
    let pattern = b"cabana cabana cabana";
    let snippets = index.display(pattern, 5).unwrap();
    let expected = naive(&text, pattern);
    assert!(!expected.is_empty());
    assert_eq!(snippets.len(), expected.len());
    for (s, &at) in snippets.iter().zip(&expected) {
        assert_eq!(s.offset, Some(at));
        let start = at.saturating_sub(5);
        let end = (at + pattern.len() + 5).min(text.len());
        assert_eq!(s.lead, at - start);
        assert_eq!(s.text, text[start..end].to_vec());
    }
}

#[test]
fn test_option_strings() {
    let opts: BuildOptions = "-B 8 -b 512 -F 0.1".parse().unwrap();
    assert_eq!(opts, BuildOptions::default().superbucket_kib(8).bucket_size(512).marker_frequency(0.1));
    assert!(matches!("-X 1".parse::<BuildOptions>(), Err(FmError::Config(_))));
    assert!(matches!("-b".parse::<BuildOptions>(), Err(FmError::Config(_))));
    assert!(matches!("-F lots".parse::<BuildOptions>(), Err(FmError::Config(_))));

    let text = corpus(52_000, 9);
    let index = FmIndex::build(&text, &opts).unwrap();
    assert_eq!(index.skip_rate(), 10);
    assert_eq!(index.locate(b"an an").unwrap(), naive(&text, b"an an"));
}

#[test]
fn test_searchers_across_threads() {
    let text = corpus(90_000, 10);
    let index = FmIndex::build(&text, &BuildOptions::default()).unwrap();
    let patterns: [&[u8]; 4] = [b"banana an ", b"nab\nnab", b"ananas an", b"bab bab"];
    std::thread::scope(|s| {
        for pattern in patterns {
            let index = &index;
            let text = &text;
            s.spawn(move || {
                let mut searcher = index.searcher();
                assert_eq!(searcher.locate(pattern).unwrap(), naive(text, pattern));
            });
        }
    });
}
