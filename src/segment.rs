use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{DubError, Result};
use crate::transcript::{Sentence, TranscriptResult, Word};

/// Minimum inter-word gap in seconds that closes a sentence.
pub const SENTENCE_GAP_SECS: f64 = 1.0;

/// Break word-level transcription results into speaker-attributed sentences.
///
/// Words are consumed in document order. A word opens a new sentence when no
/// sentence is open or when its speaker differs from the open sentence's
/// speaker. A word closes the open sentence when the gap to the next word is
/// at least `SENTENCE_GAP_SECS`, or when it is the last word of its
/// recognition result, so a sentence never spans unrelated results. Output
/// order follows input order; downstream stages rely on sentences being
/// sorted by start time, so the input word stream must already be in time
/// order.
pub fn segment_sentences(
    results: &[TranscriptResult],
    source_lang: &str,
) -> Result<Vec<Sentence>> {
    segment_sentences_with_gap(results, source_lang, SENTENCE_GAP_SECS)
}

/// Same as [`segment_sentences`] with a configurable gap threshold.
pub fn segment_sentences_with_gap(
    results: &[TranscriptResult],
    source_lang: &str,
    gap_secs: f64,
) -> Result<Vec<Sentence>> {
    let mut sentences = Vec::new();
    let mut open: Option<OpenSentence> = None;

    for (result_index, result) in results.iter().enumerate() {
        check_word_order(result, result_index)?;

        for (i, word) in result.words.iter().enumerate() {
            let starts_new = match &open {
                None => true,
                Some(current) => current.speaker != word.speaker_tag,
            };

            if starts_new {
                if let Some(finished) = open.take() {
                    sentences.push(finished.finish(source_lang));
                }
                open = Some(OpenSentence::start(word));
            } else if let Some(current) = open.as_mut() {
                current.append(word);
            }

            let closes = match result.words.get(i + 1) {
                Some(next) => next.start_time - word.end_time >= gap_secs,
                // Last word of a result always closes, even without a gap.
                None => true,
            };

            if closes {
                if let Some(finished) = open.take() {
                    sentences.push(finished.finish(source_lang));
                }
            }
        }
    }

    debug!(
        "Segmented {} results into {} sentences",
        results.len(),
        sentences.len()
    );

    Ok(sentences)
}

/// Reject word streams whose timestamps run backwards; downstream ordering
/// guarantees depend on words arriving in time order.
fn check_word_order(result: &TranscriptResult, result_index: usize) -> Result<()> {
    let mut prev_start: Option<f64> = None;

    for word in &result.words {
        if word.end_time < word.start_time {
            return Err(DubError::MalformedTranscript(format!(
                "word '{}' in result {} ends at {} before it starts at {}",
                word.text, result_index, word.end_time, word.start_time
            )));
        }
        if let Some(prev) = prev_start {
            if word.start_time < prev {
                return Err(DubError::MalformedTranscript(format!(
                    "word '{}' in result {} starts at {} before the previous word at {}",
                    word.text, result_index, word.start_time, prev
                )));
            }
        }
        prev_start = Some(word.start_time);
    }

    Ok(())
}

struct OpenSentence {
    speaker: i32,
    start_time: f64,
    end_time: f64,
    words: Vec<String>,
}

impl OpenSentence {
    fn start(word: &Word) -> Self {
        Self {
            speaker: word.speaker_tag,
            start_time: word.start_time,
            end_time: word.end_time,
            words: vec![word.text.clone()],
        }
    }

    fn append(&mut self, word: &Word) {
        self.words.push(word.text.clone());
        self.end_time = word.end_time;
    }

    fn finish(self, source_lang: &str) -> Sentence {
        let mut text = BTreeMap::new();
        text.insert(source_lang.to_string(), self.words.join(" "));
        Sentence {
            speaker: self.speaker,
            start_time: self.start_time,
            end_time: self.end_time,
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64, speaker: i32) -> Word {
        Word {
            text: text.to_string(),
            start_time: start,
            end_time: end,
            speaker_tag: speaker,
        }
    }

    fn result(words: Vec<Word>) -> TranscriptResult {
        TranscriptResult {
            transcript: words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            words,
        }
    }

    #[test]
    fn test_two_speakers_with_gap_roundtrip() {
        let results = vec![result(vec![
            word("the", 0.0, 0.6, 1),
            word("quick", 0.7, 1.3, 1),
            word("fox", 1.4, 2.0, 1),
            word("jumped", 3.5, 4.0, 2),
            word("over", 4.1, 4.5, 2),
        ])];

        let sentences = segment_sentences(&results, "en").unwrap();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].speaker, 1);
        assert_eq!(sentences[0].start_time, 0.0);
        assert_eq!(sentences[0].end_time, 2.0);
        assert_eq!(sentences[0].text_for("en"), Some("the quick fox"));
        assert_eq!(sentences[1].speaker, 2);
        assert_eq!(sentences[1].start_time, 3.5);
        assert_eq!(sentences[1].end_time, 4.5);
        assert_eq!(sentences[1].text_for("en"), Some("jumped over"));
    }

    #[test]
    fn test_gap_of_exactly_one_second_splits() {
        let results = vec![result(vec![
            word("hello", 0.0, 1.0, 1),
            word("world", 2.0, 2.5, 1),
        ])];

        let sentences = segment_sentences(&results, "en").unwrap();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].text_for("en"), Some("hello"));
        assert_eq!(sentences[1].text_for("en"), Some("world"));
    }

    #[test]
    fn test_short_gap_same_speaker_never_splits() {
        let results = vec![result(vec![
            word("one", 0.0, 0.5, 1),
            word("two", 1.4, 1.9, 1),
            word("three", 2.0, 2.4, 1),
        ])];

        let sentences = segment_sentences(&results, "en").unwrap();

        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text_for("en"), Some("one two three"));
        assert_eq!(sentences[0].end_time, 2.4);
    }

    #[test]
    fn test_speaker_change_splits_without_gap() {
        let results = vec![result(vec![
            word("yes", 0.0, 0.4, 1),
            word("no", 0.5, 0.9, 2),
        ])];

        let sentences = segment_sentences(&results, "en").unwrap();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].speaker, 1);
        assert_eq!(sentences[1].speaker, 2);
    }

    #[test]
    fn test_result_boundary_flushes_open_sentence() {
        let results = vec![
            result(vec![word("first", 0.0, 0.5, 1)]),
            result(vec![word("second", 0.6, 1.0, 1)]),
        ];

        let sentences = segment_sentences(&results, "en").unwrap();

        // Same speaker, tiny gap, but the result boundary still splits.
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_empty_result_contributes_nothing() {
        let results = vec![
            result(vec![]),
            result(vec![word("only", 0.0, 0.5, 0)]),
            result(vec![]),
        ];

        let sentences = segment_sentences(&results, "en").unwrap();

        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].speaker, 0);
    }

    #[test]
    fn test_output_sorted_and_non_overlapping() {
        let results = vec![result(vec![
            word("a", 0.0, 0.3, 1),
            word("b", 0.4, 0.8, 1),
            word("c", 2.0, 2.5, 1),
            word("d", 2.6, 3.0, 2),
            word("e", 4.5, 5.0, 2),
        ])];

        let sentences = segment_sentences(&results, "en").unwrap();

        for pair in sentences.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
            assert!(pair[0].end_time <= pair[1].start_time);
        }
        for sentence in &sentences {
            assert!(sentence.start_time < sentence.end_time);
        }
    }

    #[test]
    fn test_non_monotonic_start_times_rejected() {
        let results = vec![result(vec![
            word("later", 2.0, 2.5, 1),
            word("earlier", 1.0, 1.5, 1),
        ])];

        let err = segment_sentences(&results, "en").unwrap_err();
        assert!(matches!(err, DubError::MalformedTranscript(_)));
    }

    #[test]
    fn test_word_ending_before_start_rejected() {
        let results = vec![result(vec![word("bad", 2.0, 1.0, 1)])];

        let err = segment_sentences(&results, "en").unwrap_err();
        assert!(matches!(err, DubError::MalformedTranscript(_)));
    }

    #[test]
    fn test_no_results_yields_no_sentences() {
        let sentences = segment_sentences(&[], "en").unwrap();
        assert!(sentences.is_empty());
    }

    #[test]
    fn test_custom_gap_threshold() {
        let results = vec![result(vec![
            word("one", 0.0, 0.5, 1),
            word("two", 1.2, 1.6, 1),
        ])];

        // 0.7s gap: below the default threshold, above a 0.5s one.
        assert_eq!(segment_sentences(&results, "en").unwrap().len(), 1);
        assert_eq!(
            segment_sentences_with_gap(&results, "en", 0.5)
                .unwrap()
                .len(),
            2
        );
    }
}
