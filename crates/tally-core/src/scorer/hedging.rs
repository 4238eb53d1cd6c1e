//! Explicit-uncertainty detection for model answers.
//!
//! Only phrases that voice genuine doubt count. Approximation language
//! ("approximately", "around", "roughly") is routine in quantitative answers
//! and is not in the lexicon.

use regex::Regex;
use std::sync::OnceLock;

pub const HEDGING_PHRASES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "not certain",
    "uncertain about",
    "unsure about",
    "unsure whether",
    "might be wrong",
    "could be wrong",
    "may be incorrect",
    "i don't know",
    "i do not know",
    "cannot determine",
    "possibly incorrect",
    "potentially wrong",
    // speculative framing
    "i think it might",
    "i believe it could",
    "it seems like maybe",
    "this could possibly",
    "this might possibly",
];

static PATTERNS: OnceLock<Option<Vec<Regex>>> = OnceLock::new();

/// One word-bounded pattern per phrase; inner spaces match any whitespace run.
fn patterns() -> Option<&'static [Regex]> {
    PATTERNS
        .get_or_init(|| {
            HEDGING_PHRASES
                .iter()
                .map(|p| Regex::new(&format!(r"\b{}\b", regex::escape(p).replace(' ', r"\s+"))))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    tracing::warn!(error = %e, "hedging patterns failed to compile, using substring match");
                })
                .ok()
        })
        .as_deref()
}

/// Lexicon phrases found in `text`, case-insensitive.
pub fn find_hedges(text: &str) -> Vec<&'static str> {
    if text.is_empty() {
        return Vec::new();
    }
    // Curly apostrophes are common in LLM output.
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    match patterns() {
        Some(patterns) => HEDGING_PHRASES
            .iter()
            .zip(patterns)
            .filter(|(_, re)| re.is_match(&lower))
            .map(|(p, _)| *p)
            .collect(),
        None => HEDGING_PHRASES
            .iter()
            .copied()
            .filter(|p| lower.contains(p))
            .collect(),
    }
}

pub fn is_hedged(text: &str) -> bool {
    !find_hedges(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximation_is_not_hedging() {
        assert!(!is_hedged("Revenue was approximately $4.2B, around 12% growth."));
    }

    #[test]
    fn explicit_doubt_is_hedging() {
        assert!(is_hedged("The margin is 31%, but I'm not sure about Q4."));
        assert!(is_hedged("I Cannot Determine the exact figure."));
        assert!(is_hedged("I don\u{2019}t know"));
    }

    #[test]
    fn reports_every_matching_phrase() {
        let found = find_hedges("I am not sure; this might possibly be wrong and I could be wrong.");
        assert!(found.contains(&"i am not sure"));
        assert!(found.contains(&"this might possibly"));
        assert!(found.contains(&"could be wrong"));
    }

    #[test]
    fn phrases_match_on_word_boundaries() {
        assert!(is_hedged("I'm not\n  sure this holds."));
        assert!(!is_hedged("I do not knowingly round these figures."));
        assert!(is_hedged("Honestly, I do not know."));
    }
}
