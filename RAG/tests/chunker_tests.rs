//! Properties of the paragraph/sentence chunker.

use grounded_rag::chunker::{
    apply_overlap, char_len, chunk, pack, packing_budget, split_sentences, tail_chars,
};
use proptest::prelude::*;

#[test]
fn password_record_splits_into_two_overlapping_segments() {
    let text = "ID: Q1\nHow do I reset my password?\n\nGo to settings > security > reset.";
    let chunks = chunk(text, 60, 10);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], "ID: Q1\nHow do I reset my password?");
    assert!(chunks.iter().all(|c| char_len(c) <= 60));
    assert!(chunks[1].starts_with(tail_chars(&chunks[0], 10)));
    assert!(chunks[1].ends_with("Go to settings > security > reset."));
}

#[test]
fn long_paragraph_is_packed_by_sentence_with_carry_forward() {
    let text = "The cache stores hot keys. Misses go to disk. Writes are batched every second. \
                Compaction runs at night. Snapshots are kept for a week.";
    let packed = pack(text, 60, 8);
    let budget = packing_budget(60, 8);

    assert!(packed.len() > 1);
    for piece in &packed {
        assert!(!piece.overflow);
        assert!(char_len(&piece.text) <= budget);
    }
    // Sentence-level seed: a closed chunk's tail opens the next one.
    let seed = tail_chars(&packed[0].text, 8);
    assert!(packed[1].text.starts_with(seed));
}

#[test]
fn output_is_stable_across_calls() {
    let text = "One. Two! Three?\n\nFour five six seven eight nine ten eleven twelve.";
    assert_eq!(chunk(text, 25, 5), chunk(text, 25, 5));
}

fn sentence() -> impl Strategy<Value = String> {
    (
        proptest::collection::vec("[a-z]{1,10}", 1..12),
        prop_oneof![Just('.'), Just('!'), Just('?')],
    )
        .prop_map(|(words, end)| format!("{}{}", words.join(" "), end))
}

fn document() -> impl Strategy<Value = (String, Vec<String>)> {
    proptest::collection::vec(proptest::collection::vec(sentence(), 1..6), 1..6).prop_map(
        |paragraphs| {
            let sentences: Vec<String> = paragraphs.iter().flatten().cloned().collect();
            let text = paragraphs
                .iter()
                .map(|p| p.join(" "))
                .collect::<Vec<_>>()
                .join("\n\n");
            (text, sentences)
        },
    )
}

fn limits() -> impl Strategy<Value = (usize, usize)> {
    (20usize..200).prop_flat_map(|max| (Just(max), 0..max / 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn chunking_is_deterministic((text, _) in document(), (max, overlap) in limits()) {
        prop_assert_eq!(chunk(&text, max, overlap), chunk(&text, max, overlap));
    }

    #[test]
    fn only_single_long_sentences_exceed_max((text, sentences) in document(), (max, overlap) in limits()) {
        let packed = pack(&text, max, overlap);
        let chunks = apply_overlap(&packed, max, overlap);
        let budget = packing_budget(max, overlap);

        prop_assert_eq!(&chunks, &chunk(&text, max, overlap));
        for (piece, final_chunk) in packed.iter().zip(&chunks) {
            if piece.overflow {
                prop_assert!(char_len(&piece.text) > budget);
                prop_assert!(sentences.contains(&piece.text));
            } else {
                prop_assert!(char_len(final_chunk) <= max);
            }
        }
    }

    #[test]
    fn chunks_start_with_predecessor_suffix((text, _) in document(), (max, overlap) in limits()) {
        let packed = pack(&text, max, overlap);
        let chunks = apply_overlap(&packed, max, overlap);

        for i in 1..chunks.len() {
            let previous = &packed[i - 1].text;
            let expected = tail_chars(previous, overlap.min(char_len(previous)));
            prop_assert!(chunks[i].starts_with(expected));
        }
    }

    #[test]
    fn no_sentence_is_lost((text, sentences) in document(), (max, overlap) in limits()) {
        let chunks = chunk(&text, max, overlap);
        for sentence in &sentences {
            prop_assert!(
                chunks.iter().any(|c| c.contains(sentence.as_str())),
                "sentence {:?} missing",
                sentence
            );
        }
    }

    #[test]
    fn sentence_split_recovers_generated_sentences((text, sentences) in document()) {
        let recovered: Vec<String> = text
            .split("\n\n")
            .flat_map(split_sentences)
            .map(str::to_string)
            .collect();
        prop_assert_eq!(recovered, sentences);
    }
}
