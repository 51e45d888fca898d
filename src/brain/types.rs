//! Types shared by the brain store and its callers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::collections::BTreeMap;

/// Reserved token marking the end of a trained sequence.
pub const TERMINAL_TOKEN: &str = "<stop>";

/// Separator joining seed tokens into a single key.
pub const SEPARATOR: &str = " ";

/// A weighted edge from a seed to the token that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transition {
    pub next_token: String,
    pub count: i64,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        self.next_token == TERMINAL_TOKEN
    }
}

/// Row counts for one brain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrainStats {
    pub seeds: i64,
    pub transitions: i64,
    /// Sum of every transition count, i.e. the number of trained windows.
    pub total_weight: i64,
}

/// Interchange form of a whole brain: seed to ordered `(next_token, count)`
/// pairs. Serialized as a JSON object of two-element arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainSnapshot {
    pub chain: BTreeMap<String, Vec<(String, i64)>>,
}

impl ChainSnapshot {
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn get(&self, seed: &str) -> Option<&[(String, i64)]> {
        self.chain.get(seed).map(Vec::as_slice)
    }
}

/// Content hash identifying a `(seed, next_token)` pair within one brain.
///
/// The seed is length-prefixed, so no choice of characters in either field
/// can make two different pairs hash alike.
pub fn transition_hash(seed: &str, next_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((seed.len() as u64).to_be_bytes());
    hasher.update(seed.as_bytes());
    hasher.update(next_token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Escape LIKE wildcards so user text only ever matches literally.
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_pair_sensitive() {
        let first = transition_hash("the quick", "brown");
        assert_eq!(first, transition_hash("the quick", "brown"));
        assert_ne!(first, transition_hash("the quick", "bird"));
        assert_ne!(first, transition_hash("quick the", "brown"));
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn hash_keeps_field_boundaries() {
        assert_ne!(transition_hash("a:b", "c"), transition_hash("a", "b:c"));
        assert_ne!(transition_hash("ab", "c"), transition_hash("a", "bc"));
    }

    #[test]
    fn only_the_stop_marker_is_terminal() {
        let stop = Transition { next_token: TERMINAL_TOKEN.into(), count: 1 };
        let word = Transition { next_token: "stop".into(), count: 1 };
        assert!(stop.is_terminal());
        assert!(!word.is_terminal());
    }

    #[test]
    fn snapshot_serializes_as_plain_mapping() {
        let mut snapshot = ChainSnapshot::default();
        snapshot.chain.insert(
            "the quick".into(),
            vec![("brown".into(), 3), ("bird".into(), 1)],
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"the quick":[["brown",3],["bird",1]]}"#);

        let parsed: ChainSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_sure"), "100\\%\\_sure");
        assert_eq!(escape_like("plain"), "plain");
    }
}
