use docrag_core::{Chunker, ChunkerConfig};

fn chunker(size: usize, overlap: usize) -> Chunker {
    Chunker::new(ChunkerConfig { chunk_size: size, chunk_overlap: overlap, ..ChunkerConfig::default() }).expect("valid config")
}

fn prose(sentences: usize) -> String {
    (0..sentences).map(|i| format!("Sentence number {} talks about topic {}. ", i, i % 7)).collect()
}

#[test]
fn empty_and_blank_input_yield_no_chunks() {
    let c = Chunker::default();
    assert!(c.chunk("").is_empty());
    assert!(c.chunk("   \n\n \n").is_empty());
}

#[test]
fn short_text_is_a_single_trimmed_chunk() {
    let chunks = Chunker::default().chunk("  Short text\n");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].index, 0);
    assert_eq!(chunks[0].text, "Short text");
}

#[test]
fn unbroken_text_is_hard_cut_with_overlap() {
    let text: String = (0..2400).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let chunks = chunker(1000, 50).chunk(&text);

    let lens: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
    assert_eq!(lens, vec![1000, 1000, 500]);
    assert_eq!(chunks[0].text, text[0..1000]);
    assert_eq!(chunks[1].text, text[950..1950]);
    assert_eq!(chunks[2].text, text[1900..2400]);
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn chunking_is_deterministic() {
    let text = prose(300);
    let c = chunker(400, 40);
    assert_eq!(c.chunk(&text), c.chunk(&text));
}

#[test]
fn every_chunk_respects_the_bound() {
    let mut text = prose(200);
    text.push_str("\n\n");
    text.push_str(&"x".repeat(3000));
    text.push('\n');
    text.push_str(&prose(50));
    for (size, overlap) in [(1000, 50), (200, 20), (64, 0)] {
        for chunk in chunker(size, overlap).chunk(&text) {
            assert!(chunk.char_len() <= size, "chunk of {} chars exceeds {}", chunk.char_len(), size);
        }
    }
}

#[test]
fn chunks_cover_the_text_in_order() {
    let text = prose(200);
    let chunks = chunker(300, 30).chunk(&text);
    assert!(chunks.len() > 1);

    let mut prev_end = 0usize;
    let mut search_from = 0usize;
    for chunk in &chunks {
        let start = search_from + text[search_from..].find(&chunk.text).expect("chunk is a substring of the input");
        assert!(
            start <= prev_end || text[prev_end..start].trim().is_empty(),
            "characters dropped between byte {} and {}",
            prev_end,
            start
        );
        prev_end = start + chunk.text.len();
        search_from = start + 1;
    }
    assert!(text[prev_end..].trim().is_empty());
}

#[test]
fn paragraph_breaks_are_preferred_over_sentence_breaks() {
    let first = format!("{}.", "A".repeat(600));
    let second = format!("{}. {}", "B".repeat(300), "C".repeat(300));
    let text = format!("{}\n\n{}", first, second);
    let chunks = chunker(1000, 50).chunk(&text);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, first);
    assert_eq!(chunks[1].text, second);
}

#[test]
fn lengths_are_counted_in_characters() {
    let text = "é".repeat(2400);
    let chunks = chunker(1000, 50).chunk(&text);
    let lens: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
    assert_eq!(lens, vec![1000, 1000, 500]);
}

#[test]
fn invalid_configurations_are_rejected() {
    assert!(Chunker::new(ChunkerConfig { chunk_size: 0, chunk_overlap: 0, ..ChunkerConfig::default() }).is_err());
    assert!(Chunker::new(ChunkerConfig { chunk_size: 100, chunk_overlap: 100, ..ChunkerConfig::default() }).is_err());
    assert!(Chunker::new(ChunkerConfig { chunk_size: 100, chunk_overlap: 99, ..ChunkerConfig::default() }).is_ok());
}

#[test]
fn custom_separators_still_hard_cut() {
    let c = Chunker::new(ChunkerConfig { chunk_size: 10, chunk_overlap: 0, separators: vec!["|".into()] }).expect("valid");
    let chunks = c.chunk("abcdefghijklmnopqrstuvwxyz");
    assert!(chunks.iter().all(|ch| ch.char_len() <= 10));
    assert_eq!(chunks.iter().map(|ch| ch.text.as_str()).collect::<String>(), "abcdefghijklmnopqrstuvwxyz");
}
