//! Markov chain engine: training, seed resolution and text generation on top
//! of one [`Brain`].

use crate::brain::{Brain, SEPARATOR};
use crate::chain::sampling::{sample_transition, split_budget};
use crate::chain::tokenize::{join_seed, normalize, split_seed, tokenize_for_training, training_windows};
use crate::config::{validate_chattiness, EngineConfig};
use crate::error::{Error, Result};

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

/// How a piece of user text maps onto a seed, decided by its token count.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SeedQuery {
    /// Nothing usable survived normalization.
    Empty,
    /// Fewer tokens than a seed: resolved by fuzzy search.
    Partial(String),
    /// Exactly one seed's worth of tokens: must exist as-is.
    Exact(String),
    /// More tokens than a seed: the trailing window wins over the leading one.
    Overlong { trailing: String, leading: String },
}

impl SeedQuery {
    fn classify(tokens: &[String], chain_length: usize) -> Self {
        if tokens.is_empty() {
            SeedQuery::Empty
        } else if tokens.len() < chain_length {
            SeedQuery::Partial(join_seed(tokens))
        } else if tokens.len() == chain_length {
            SeedQuery::Exact(join_seed(tokens))
        } else {
            SeedQuery::Overlong {
                trailing: join_seed(&tokens[tokens.len() - chain_length..]),
                leading: join_seed(&tokens[..chain_length]),
            }
        }
    }
}

/// Generation front-end for one tenant's brain.
///
/// Stateless between calls apart from the advisory chattiness level, which
/// the host reads to decide whether to reply at all.
#[derive(Debug)]
pub struct Engine {
    brain: Brain,
    config: EngineConfig,
    chattiness: AtomicU8,
}

impl Engine {
    pub fn new(brain: Brain, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            brain,
            chattiness: AtomicU8::new(config.default_chattiness),
            config,
        })
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn tenant_id(&self) -> &str {
        self.brain.tenant_id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn chain_length(&self) -> usize {
        self.config.chain_length
    }

    pub fn max_output_words(&self) -> usize {
        self.config.max_output_words
    }

    pub fn chattiness(&self) -> u8 {
        self.chattiness.load(Ordering::Relaxed)
    }

    /// Set the advisory chattiness level (0–100).
    pub fn set_chattiness(&self, level: u8) -> Result<()> {
        validate_chattiness(level)?;
        self.chattiness.store(level, Ordering::Relaxed);
        Ok(())
    }

    /// Learn from one message. Returns the number of windows written; links,
    /// commands and messages too short to form a seed contribute nothing.
    pub async fn process_message(&self, text: &str) -> Result<usize> {
        let Some(tokens) = tokenize_for_training(text) else {
            tracing::debug!(tenant_id = %self.tenant_id(), "message rejected by filter");
            return Ok(0);
        };

        let windows = training_windows(&tokens, self.chain_length());
        if windows.is_empty() {
            return Ok(0);
        }

        let mut batch = self.brain.begin_batch().await?;
        for (seed, next_token) in &windows {
            batch.add_transition(seed, next_token, 1).await?;
        }
        let written = batch.commit().await?;

        tracing::debug!(tenant_id = %self.tenant_id(), windows = written, "message learned");
        Ok(written)
    }

    /// Turn free text into a seed that exists in the brain.
    pub async fn string_to_seed(&self, text: &str) -> Result<String> {
        let tokens = normalize(text);

        match SeedQuery::classify(&tokens, self.chain_length()) {
            SeedQuery::Empty => Err(Error::SeedNotFound(text.to_string())),
            SeedQuery::Partial(partial) => self
                .brain
                .get_fuzzy_seed(&partial, SEPARATOR)
                .await?
                .ok_or_else(|| Error::SeedNotFound(partial.clone())),
            SeedQuery::Exact(seed) => {
                if self.brain.contains(&seed).await? {
                    Ok(seed)
                } else {
                    Err(Error::SeedNotFound(seed))
                }
            }
            SeedQuery::Overlong { trailing, leading } => {
                if self.brain.contains(&trailing).await? {
                    Ok(trailing)
                } else if self.brain.contains(&leading).await? {
                    Ok(leading)
                } else {
                    Err(Error::SeedNotFound(join_seed(&tokens)))
                }
            }
        }
    }

    /// Walk forward from `seed` for at most `max_words` sampled tokens.
    ///
    /// Stops early at the terminal marker or at a seed with no known
    /// continuation. The result starts with the seed itself.
    pub async fn generate_message(&self, seed: &str, max_words: usize) -> Result<String> {
        let mut message = seed.to_string();
        let mut current: VecDeque<String> = split_seed(seed).into_iter().map(str::to_string).collect();

        for _ in 0..max_words {
            let key = join_seed(current.make_contiguous());
            let transitions = self.brain.get_transitions(&key).await?;
            let next = {
                let mut rng = rand::rng();
                sample_transition(&mut rng, &transitions).cloned()
            };

            let Some(next) = next else {
                break;
            };
            if next.is_terminal() {
                break;
            }

            message.push_str(SEPARATOR);
            message.push_str(&next.next_token);

            current.pop_front();
            current.push_back(next.next_token);
        }

        Ok(message)
    }

    /// Guess up to `max_words` tokens that could have come before `seed`.
    ///
    /// Previous states are picked uniformly, not by weight. The seed itself is
    /// not part of the output, so the result can be prepended to it.
    pub async fn generate_reverse_message(&self, seed: &str, max_words: usize) -> Result<String> {
        let mut current: Vec<String> = split_seed(seed).into_iter().map(str::to_string).collect();
        let mut prefix: VecDeque<String> = VecDeque::new();

        for _ in 0..max_words {
            let Some((forward_token, leading)) = current.split_last() else {
                break;
            };
            let partial = join_seed(leading);

            let Some(previous) = self
                .brain
                .get_previous_state(&partial, forward_token, SEPARATOR)
                .await?
            else {
                break;
            };

            let previous: Vec<String> = split_seed(&previous).into_iter().map(str::to_string).collect();
            // No terminal marker guards sequence starts, so a seed that leads
            // back to itself would otherwise spin until max_words.
            if previous == current {
                break;
            }
            let Some(first) = previous.first() else {
                break;
            };

            prefix.push_front(first.clone());
            current = previous;
        }

        Ok(join_seed(prefix.make_contiguous()))
    }

    /// Generate a reply from `seed`, or from a fresh random seed per attempt
    /// when none is given, using the configured number of tries.
    pub async fn speak(&self, seed: Option<&str>) -> Result<String> {
        self.speak_with_tries(seed, self.config.tries).await
    }

    /// Longest of `tries` forward generations that fits in
    /// `max_output_words`; empty if none does or the brain is empty.
    pub async fn speak_with_tries(&self, seed: Option<&str>, tries: usize) -> Result<String> {
        let fixed_seed = match seed {
            Some(text) => Some(self.string_to_seed(text.trim()).await?),
            None => None,
        };

        let max_words = self.max_output_words();
        let mut longest = Reply::default();

        for _ in 0..tries {
            let seed = match &fixed_seed {
                Some(seed) => seed.clone(),
                None => match self.brain.get_random_seed().await? {
                    Some(seed) => seed,
                    None => break,
                },
            };

            let message = self.generate_message(&seed, max_words).await?;
            longest.offer(message, max_words);
        }

        tracing::debug!(
            tenant_id = %self.tenant_id(),
            words = longest.words,
            "speak finished"
        );
        Ok(longest.message)
    }

    /// Generate around `seed` in both directions using the configured number
    /// of tries.
    pub async fn babble(&self, seed: &str) -> Result<String> {
        self.babble_with_tries(seed, self.config.tries).await
    }

    /// Longest of `tries` reverse-prefix plus forward generations that fits in
    /// `max_output_words`.
    pub async fn babble_with_tries(&self, seed: &str, tries: usize) -> Result<String> {
        let seed = self.string_to_seed(seed.trim()).await?;
        let max_words = self.max_output_words();
        let mut longest = Reply::default();

        for _ in 0..tries {
            let (before, after) = {
                let mut rng = rand::rng();
                split_budget(&mut rng, max_words)
            };

            let prefix = self.generate_reverse_message(&seed, before).await?;
            let forward = self.generate_message(&seed, after).await?;
            let message = if prefix.is_empty() {
                forward
            } else {
                format!("{prefix}{SEPARATOR}{forward}")
            };
            longest.offer(message, max_words);
        }

        tracing::debug!(
            tenant_id = %self.tenant_id(),
            words = longest.words,
            "babble finished"
        );
        Ok(longest.message)
    }

    pub async fn reset(&self) -> Result<()> {
        self.brain.reset().await
    }

    pub async fn export_json(&self, path: &Path) -> Result<()> {
        self.brain.export_json(path).await
    }

    pub async fn import_json(&self, path: &Path) -> Result<usize> {
        self.brain.import_json(path).await
    }
}

/// Longest candidate reply seen so far.
#[derive(Debug, Default)]
struct Reply {
    message: String,
    words: usize,
}

impl Reply {
    /// Keep `message` if it fits in `max_words` and beats the current best.
    fn offer(&mut self, message: String, max_words: usize) {
        let words = message.split_whitespace().count();
        if words > max_words || words <= self.words {
            return;
        }
        self.message = message;
        self.words = words;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::store::tests::open_test_db;
    use crate::brain::{Transition, TERMINAL_TOKEN};

    async fn setup(chain_length: usize, max_output_words: usize) -> (tempfile::TempDir, Engine) {
        let (temp_dir, db) = open_test_db().await;
        let brain = Brain::open(db.sqlite, "guild-1").await.unwrap();
        let config = EngineConfig::new(chain_length, max_output_words, 10).unwrap();
        (temp_dir, Engine::new(brain, config).unwrap())
    }

    fn one(next_token: &str) -> Vec<Transition> {
        vec![Transition {
            next_token: next_token.into(),
            count: 1,
        }]
    }

    #[test]
    fn seed_queries_are_classified_by_length() {
        let tokens: Vec<String> = ["the", "quick", "brown"].iter().map(|t| t.to_string()).collect();
        assert_eq!(SeedQuery::classify(&[], 2), SeedQuery::Empty);
        assert_eq!(
            SeedQuery::classify(&tokens[..1], 2),
            SeedQuery::Partial("the".into())
        );
        assert_eq!(
            SeedQuery::classify(&tokens[..2], 2),
            SeedQuery::Exact("the quick".into())
        );
        assert_eq!(
            SeedQuery::classify(&tokens, 2),
            SeedQuery::Overlong {
                trailing: "quick brown".into(),
                leading: "the quick".into(),
            }
        );
    }

    #[test]
    fn reply_keeps_longest_within_cap() {
        let mut reply = Reply::default();
        reply.offer("a b".into(), 3);
        reply.offer("a b c d".into(), 3);
        reply.offer("x y".into(), 3);
        reply.offer("a b c".into(), 3);
        assert_eq!(reply.message, "a b c");
        assert_eq!(reply.words, 3);
    }

    #[tokio::test]
    async fn training_builds_expected_windows() {
        let (_dir, engine) = setup(2, 100).await;
        let written = engine.process_message("the quick brown fox jumps").await.unwrap();
        assert_eq!(written, 4);

        let brain = engine.brain();
        assert_eq!(
            brain.seeds().await.unwrap(),
            vec!["the quick", "quick brown", "brown fox", "fox jumps"]
        );
        assert_eq!(brain.get_transitions("the quick").await.unwrap(), one("brown"));
        assert_eq!(brain.get_transitions("quick brown").await.unwrap(), one("fox"));
        assert_eq!(brain.get_transitions("brown fox").await.unwrap(), one("jumps"));
        assert_eq!(brain.get_transitions("fox jumps").await.unwrap(), one(TERMINAL_TOKEN));
    }

    #[tokio::test]
    async fn repeated_training_scales_counts_only() {
        let (_dir, engine) = setup(2, 100).await;
        for _ in 0..3 {
            engine.process_message("the quick brown fox").await.unwrap();
        }

        let brain = engine.brain();
        let stats = brain.stats().await.unwrap();
        assert_eq!(stats.seeds, 3);
        assert_eq!(stats.transitions, 3);
        assert_eq!(stats.total_weight, 9);
        for seed in brain.seeds().await.unwrap() {
            for transition in brain.get_transitions(&seed).await.unwrap() {
                assert_eq!(transition.count, 3);
            }
        }
    }

    #[tokio::test]
    async fn filtered_and_short_messages_are_skipped() {
        let (_dir, engine) = setup(2, 100).await;
        assert_eq!(engine.process_message("see https://example.com now").await.unwrap(), 0);
        assert_eq!(engine.process_message("!play some song").await.unwrap(), 0);
        assert_eq!(engine.process_message("hello").await.unwrap(), 0);
        assert_eq!(engine.process_message("... ???").await.unwrap(), 0);
        assert_eq!(engine.process_message("").await.unwrap(), 0);
        assert_eq!(engine.brain().stats().await.unwrap().seeds, 0);
    }

    #[tokio::test]
    async fn speak_from_seed_follows_the_chain() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown fox jumps").await.unwrap();

        let reply = engine.speak(Some("the quick")).await.unwrap();
        assert!(reply.starts_with("the quick"));
        assert_eq!(reply, "the quick brown fox jumps");
        assert!(reply.split_whitespace().count() <= engine.max_output_words());
    }

    #[tokio::test]
    async fn forward_generation_stops_at_the_terminal_marker() {
        let (_dir, engine) = setup(2, 100).await;
        engine.brain().add_transition("lazy dog", TERMINAL_TOKEN, 5).await.unwrap();

        let message = engine.generate_message("lazy dog", 10).await.unwrap();
        assert_eq!(message, "lazy dog");
    }

    #[tokio::test]
    async fn speak_discards_replies_over_the_cap() {
        let (_dir, engine) = setup(2, 3).await;
        engine.process_message("the quick brown fox jumps").await.unwrap();
        assert_eq!(engine.speak(Some("the quick")).await.unwrap(), "");

        engine.process_message("lazy dog").await.unwrap();
        assert_eq!(engine.speak(Some("lazy dog")).await.unwrap(), "lazy dog");
    }

    #[tokio::test]
    async fn speak_on_empty_brain_is_empty_not_an_error() {
        let (_dir, engine) = setup(2, 100).await;
        assert_eq!(engine.speak(None).await.unwrap(), "");
    }

    #[tokio::test]
    async fn speak_with_unknown_seed_is_not_found() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown fox").await.unwrap();
        let error = engine.speak(Some("lazy dog")).await.unwrap_err();
        assert!(error.is_not_found(), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn random_speak_only_produces_trained_text() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown fox").await.unwrap();
        engine.process_message("the quick red fox").await.unwrap();

        for _ in 0..10 {
            let reply = engine.speak(None).await.unwrap();
            assert!(!reply.is_empty());
            for word in reply.split_whitespace() {
                assert!(["the", "quick", "brown", "red", "fox"].contains(&word), "{word}");
            }
        }
    }

    #[tokio::test]
    async fn forward_generation_samples_known_tokens_only() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown fox").await.unwrap();
        engine.process_message("the quick red fox").await.unwrap();
        engine.process_message("the quick brown bear").await.unwrap();

        for _ in 0..20 {
            let message = engine.generate_message("the quick", 1).await.unwrap();
            let next = message.strip_prefix("the quick ").unwrap();
            assert!(next == "brown" || next == "red", "sampled {next}");
        }
    }

    #[tokio::test]
    async fn overlong_input_falls_back_to_leading_window() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown").await.unwrap();

        assert_eq!(engine.string_to_seed("a quick brown").await.unwrap(), "quick brown");
        assert_eq!(engine.string_to_seed("the quick fox").await.unwrap(), "the quick");
        assert_eq!(engine.string_to_seed("The quick brown!").await.unwrap(), "quick brown");
        assert!(engine.string_to_seed("x y z").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn short_input_uses_fuzzy_search() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick").await.unwrap();

        let seed = engine.string_to_seed("quick").await.unwrap();
        assert_eq!(seed, "the quick");
        assert!(engine.string_to_seed("fox").await.unwrap_err().is_not_found());
        assert!(engine.string_to_seed("  ").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn reverse_generation_builds_prefix_without_seed() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown fox jumps").await.unwrap();

        let prefix = engine.generate_reverse_message("brown fox", 10).await.unwrap();
        assert_eq!(prefix, "the quick");

        let prefix = engine.generate_reverse_message("brown fox", 1).await.unwrap();
        assert_eq!(prefix, "quick");
    }

    #[tokio::test]
    async fn reverse_generation_works_for_longer_chains() {
        let (_dir, engine) = setup(3, 100).await;
        engine.process_message("one two three four five").await.unwrap();

        let prefix = engine.generate_reverse_message("three four five", 10).await.unwrap();
        assert_eq!(prefix, "one two");
    }

    #[tokio::test]
    async fn reverse_generation_stops_on_self_loop() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("ha ha ha ha").await.unwrap();

        let prefix = engine.generate_reverse_message("ha ha", 10_000).await.unwrap();
        assert_eq!(prefix, "");
    }

    #[tokio::test]
    async fn unigram_reverse_generation_stops_on_self_loop() {
        let (_dir, engine) = setup(1, 100).await;
        engine.process_message("ha ha").await.unwrap();

        let prefix = engine.generate_reverse_message("ha", 10_000).await.unwrap();
        assert_eq!(prefix, "");
    }

    #[tokio::test]
    async fn babble_wraps_the_seed() {
        let (_dir, engine) = setup(2, 100).await;
        engine.process_message("the quick brown fox jumps").await.unwrap();

        let reply = engine.babble("brown fox").await.unwrap();
        assert!(reply.contains("brown fox jumps"), "{reply}");
        assert!(reply.ends_with("jumps"));
        assert!(reply.split_whitespace().count() <= engine.max_output_words());

        let error = engine.babble("lazy dog").await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn chattiness_is_validated() {
        let (_dir, engine) = setup(2, 100).await;
        assert_eq!(engine.chattiness(), 1);
        engine.set_chattiness(100).unwrap();
        assert_eq!(engine.chattiness(), 100);
        assert!(engine.set_chattiness(101).is_err());
        assert_eq!(engine.chattiness(), 100);
    }
}
