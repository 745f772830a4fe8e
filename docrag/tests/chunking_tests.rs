//! Property tests for recursive chunking.

use docrag::chunking::{Chunker, RecursiveChunker};
use docrag::document::{Document, DocumentMetadata};
use docrag::error::RagError;
use proptest::prelude::*;

fn doc(text: &str) -> Document {
    Document::new("doc.md", text, DocumentMetadata::new("data/doc.md")).unwrap()
}

/// Text over a small alphabet, so separators and repeated substrings are common.
fn arb_text() -> impl Strategy<Value = String> {
    "[ab .,\n\u{3002}]{0,160}"
}

fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..40).prop_flat_map(|size| (Just(size), 0..size))
}

fn char_slice(text: &str, start: usize, len: usize) -> String {
    text.chars().skip(start).take(len).collect()
}

mod prop_chunk_positions {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn start_index_locates_each_chunk(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            for chunk in chunker.chunk(&doc(&text)) {
                let len = chunk.text.chars().count();
                prop_assert_eq!(char_slice(&text, chunk.metadata.start_index, len), chunk.text);
            }
        }

        #[test]
        fn spans_cover_every_non_whitespace_char(
            text in arb_text(),
            (size, overlap) in arb_sizes(),
        ) {
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            let chars: Vec<char> = text.chars().collect();
            let mut covered = vec![false; chars.len()];
            for chunk in chunker.chunk(&doc(&text)) {
                let start = chunk.metadata.start_index;
                let end = start + chunk.text.chars().count();
                prop_assert!(end <= chars.len(), "span {}..{} past {}", start, end, chars.len());
                covered[start..end].iter_mut().for_each(|c| *c = true);
            }
            for (i, c) in chars.iter().enumerate() {
                prop_assert!(c.is_whitespace() || covered[i], "char {} ({:?}) not covered", i, c);
            }
        }

        #[test]
        fn starts_strictly_increase(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&doc(&text));
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.metadata.chunk_index, i);
                prop_assert_eq!(&chunk.id, &format!("doc.md#{i}"));
            }
            for pair in chunks.windows(2) {
                prop_assert!(
                    pair[0].metadata.start_index < pair[1].metadata.start_index,
                    "{} !< {}",
                    pair[0].metadata.start_index,
                    pair[1].metadata.start_index,
                );
            }
        }

        #[test]
        fn chunks_fit_within_chunk_size(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            for chunk in chunker.chunk(&doc(&text)) {
                prop_assert!(
                    chunk.text.chars().count() <= size,
                    "{:?} longer than {}",
                    chunk.text,
                    size
                );
                prop_assert!(!chunk.text.trim().is_empty());
                prop_assert_eq!(chunk.text.trim(), chunk.text.as_str());
            }
        }

        #[test]
        fn chunking_is_deterministic(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            prop_assert_eq!(chunker.chunk(&doc(&text)), chunker.chunk(&doc(&text)));
        }

        #[test]
        fn overlap_not_below_size_is_rejected(size in 0usize..100, extra in 0usize..100) {
            let result = RecursiveChunker::new(size, size + extra);
            prop_assert!(matches!(result, Err(RagError::ConfigError(_))));
        }
    }
}

#[test]
fn whitespace_only_document_has_no_chunks() {
    let chunker = RecursiveChunker::new(10, 2).unwrap();
    assert!(chunker.chunk(&doc(" \n\n \t ")).is_empty());
    assert!(chunker.chunk(&doc("")).is_empty());
}

#[test]
fn markdown_paragraphs_split_on_blank_lines() {
    let text = "# Title\n\nFirst paragraph here.\n\nSecond paragraph here.";
    let chunker = RecursiveChunker::new(25, 0).unwrap();
    let texts: Vec<String> = chunker.chunk(&doc(text)).into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["# Title", "First paragraph here.", "Second paragraph here."]);
}
