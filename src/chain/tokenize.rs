//! Whitespace tokenization, normalization and training windows.

use crate::brain::{SEPARATOR, TERMINAL_TOKEN};

/// Substrings that mark a token as a link; messages containing one are not
/// learned from.
const FORBIDDEN_SUBSTRINGS: &[&str] = &["https://", "http://", ".com", ".net", ".org"];

/// Whether `word` disqualifies the whole message from training: links, or
/// command-like tokens starting with punctuation other than a quote mark.
pub fn is_forbidden_token(word: &str) -> bool {
    let lowered = word.to_lowercase();
    if FORBIDDEN_SUBSTRINGS
        .iter()
        .any(|forbidden| lowered.contains(forbidden))
    {
        return true;
    }

    match word.chars().next() {
        Some(first) => first.is_ascii_punctuation() && first != '"' && first != '\'',
        None => false,
    }
}

/// Trim everything that is not an ASCII letter or digit from both ends.
pub fn strip_surrounding_punctuation(word: &str) -> &str {
    word.trim_matches(|character: char| !character.is_ascii_alphanumeric())
}

/// Normalized form of a token, or `None` when nothing usable is left.
///
/// A token survives only if, once its surrounding punctuation is gone, it is a
/// single contiguous run of ASCII letters and digits.
pub fn normalize_token(word: &str) -> Option<&str> {
    let stripped = strip_surrounding_punctuation(word);
    if !stripped.is_empty() && stripped.chars().all(|character| character.is_ascii_alphanumeric()) {
        Some(stripped)
    } else {
        None
    }
}

/// Normalized tokens of `text`, without any filtering of the message itself.
pub fn normalize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(normalize_token)
        .map(str::to_string)
        .collect()
}

/// Normalized tokens of a message to be learned from, or `None` if the
/// message contains a forbidden token.
pub fn tokenize_for_training(text: &str) -> Option<Vec<String>> {
    if text.split_whitespace().any(is_forbidden_token) {
        return None;
    }
    Some(normalize(text))
}

/// Join tokens into a seed key.
pub fn join_seed<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Split a seed key back into its tokens.
pub fn split_seed(seed: &str) -> Vec<&str> {
    seed.split(SEPARATOR).filter(|token| !token.is_empty()).collect()
}

/// `(seed, next_token)` pairs produced by sliding a window of
/// `chain_length + 1` over `tokens` followed by the terminal marker.
///
/// ```text
/// [the, quick, brown] (chain_length 2) ->
///     ("the quick", "brown"), ("quick brown", "<stop>")
/// ```
pub fn training_windows(tokens: &[String], chain_length: usize) -> Vec<(String, String)> {
    if chain_length == 0 || tokens.len() < chain_length {
        return Vec::new();
    }

    let mut terminated: Vec<&str> = tokens.iter().map(String::as_str).collect();
    terminated.push(TERMINAL_TOKEN);

    terminated
        .windows(chain_length + 1)
        .map(|window| {
            let (seed, next) = window.split_at(chain_length);
            (join_seed(seed), next[0].to_string())
        })
        .collect()
}
