use super::estimate_token_count as estimate_token_count_impl;
use super::*;

const SAMPLE: &str = "Memory lets the bot recall earlier conversations. It stores each turn \
    as a vector.\n\nKnowledge files are imported in chunks! Every chunk overlaps the previous \
    one so that sentences cut at a boundary keep their context. Retrieval ranks chunks by \
    cosine similarity?\n\nThe assembler then fits the best material into the prompt budget, \
    whole items only, never half a memory.";

fn reconstruct(chunks: &[TextChunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.content);
        } else {
            text.extend(chunk.content.chars().skip(overlap));
        }
    }
    text
}

#[test]
fn estimate_token_count() {
    assert_eq!(estimate_token_count_impl("hello world"), 2);
    assert_eq!(estimate_token_count_impl("This is a test."), 5);
    assert_eq!(estimate_token_count_impl(""), 0);
}

#[test]
fn chunking_is_idempotent() {
    let first = split_text(SAMPLE, 80, 10).expect("split should succeed");
    let second = split_text(SAMPLE, 80, 10).expect("split should succeed");
    assert_eq!(first, second);
}

#[test]
fn reconstruction_is_exact() {
    for (max_size, overlap) in [(40, 0), (60, 5), (80, 10), (120, 59), (500, 50)] {
        let chunks = split_text(SAMPLE, max_size, overlap).expect("split should succeed");
        assert_eq!(
            reconstruct(&chunks, overlap),
            SAMPLE,
            "max {} overlap {}",
            max_size,
            overlap
        );
    }
}

#[test]
fn chunks_respect_max_size_and_share_overlap() {
    let max_size = 70;
    let overlap = 12;
    let chunks = split_text(SAMPLE, max_size, overlap).expect("split should succeed");
    assert!(chunks.len() > 3);

    for chunk in &chunks {
        assert!(chunk.content.chars().count() <= max_size);
        assert_eq!(chunk.content.chars().count(), chunk.end - chunk.start);
    }

    for pair in chunks.windows(2) {
        let tail: String = pair[0]
            .content
            .chars()
            .skip(pair[0].content.chars().count() - overlap)
            .collect();
        let head: String = pair[1].content.chars().take(overlap).collect();
        assert_eq!(tail, head);
        assert_eq!(pair[1].start, pair[0].end - overlap);
    }
}

#[test]
fn chunk_indexes_are_sequential() {
    let chunks = split_text(SAMPLE, 60, 6).expect("split should succeed");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
    }
}

#[test]
fn prefers_paragraph_boundaries() {
    let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
    let chunks = split_text(&text, 40, 0).expect("split should succeed");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, format!("{}\n\n", "a".repeat(30)));
    assert_eq!(chunks[1].content, "b".repeat(30));
}

#[test]
fn prefers_sentence_over_word_boundaries() {
    let text = "One two three four. Five six seven eight nine ten eleven";
    let chunks = split_text(text, 30, 0).expect("split should succeed");
    assert_eq!(chunks[0].content, "One two three four. ");
}

#[test]
fn hard_cut_when_no_boundary() {
    let text = "x".repeat(25);
    let chunks = split_text(&text, 10, 2).expect("split should succeed");
    assert_eq!(chunks[0].content.len(), 10);
    assert_eq!(chunks[1].start, 8);
    assert_eq!(reconstruct(&chunks, 2), text);
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = split_text("short note", 500, 50).expect("split should succeed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "short note");
}

#[test]
fn empty_text_yields_no_chunks() {
    let chunks = split_text("", 500, 50).expect("split should succeed");
    assert!(chunks.is_empty());
}

#[test]
fn multibyte_text_is_split_on_char_boundaries() {
    let text = "héllo wörld ünïcode ".repeat(10);
    let chunks = split_text(&text, 25, 4).expect("split should succeed");
    for chunk in &chunks {
        assert!(chunk.content.chars().count() <= 25);
    }
    assert_eq!(reconstruct(&chunks, 4), text);
}

#[test]
fn overlap_must_be_smaller_than_max_size() {
    assert!(matches!(
        split_text(SAMPLE, 50, 50),
        Err(MemoryError::Chunking(_))
    ));
    assert!(matches!(
        split_text(SAMPLE, 50, 80),
        Err(MemoryError::Chunking(_))
    ));
    assert!(matches!(split_text(SAMPLE, 0, 0), Err(MemoryError::Chunking(_))));
}

#[test]
fn chunk_text_uses_config() {
    let config = ChunkingConfig {
        max_chunk_size: 100,
        overlap_size: 20,
    };
    let from_config = chunk_text(SAMPLE, &config).expect("chunk should succeed");
    let direct = split_text(SAMPLE, 100, 20).expect("split should succeed");
    assert_eq!(from_config, direct);
}
