//! Bulk training from files and message streams.

use crate::chain::Engine;
use crate::error::Result;

use anyhow::Context as _;

use std::path::Path;

/// Outcome of a bulk training run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingReport {
    /// Messages read from the source.
    pub messages: usize,
    /// Messages that contributed at least one window.
    pub learned: usize,
    /// Windows written across all messages.
    pub windows: usize,
}

impl TrainingReport {
    /// Messages that were filtered out or too short to learn from.
    pub fn skipped(&self) -> usize {
        self.messages - self.learned
    }
}

/// Feeds many messages into one engine, one transaction per message.
pub struct Trainer<'a> {
    engine: &'a Engine,
}

impl<'a> Trainer<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Train on up to `max_messages` messages from `messages`.
    pub async fn train_on_messages<I, S>(
        &self,
        messages: I,
        max_messages: Option<usize>,
    ) -> Result<TrainingReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = TrainingReport::default();
        let limit = max_messages.unwrap_or(usize::MAX);

        for message in messages.into_iter().take(limit) {
            let windows = self.engine.process_message(message.as_ref()).await?;
            report.messages += 1;
            if windows > 0 {
                report.learned += 1;
                report.windows += windows;
            }
        }

        if report.skipped() > 0 {
            tracing::warn!(
                tenant_id = %self.engine.tenant_id(),
                skipped = report.skipped(),
                "training input skipped"
            );
        }
        tracing::info!(
            tenant_id = %self.engine.tenant_id(),
            messages = report.messages,
            learned = report.learned,
            windows = report.windows,
            "training finished"
        );
        Ok(report)
    }

    /// Train on each line of a text file.
    ///
    /// With `max_characters`, whole lines are read until their combined length
    /// reaches the budget; the line that crosses it is still included.
    pub async fn train_on_file(
        &self,
        path: &Path,
        max_characters: Option<usize>,
    ) -> Result<TrainingReport> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read training file: {}", path.display()))?;

        let lines = limit_lines(&content, max_characters);
        tracing::debug!(path = %path.display(), lines = lines.len(), "training from file");
        self.train_on_messages(lines, None).await
    }
}

fn limit_lines(content: &str, max_characters: Option<usize>) -> Vec<&str> {
    let Some(budget) = max_characters else {
        return content.lines().collect();
    };

    let mut consumed = 0;
    let mut lines = Vec::new();
    for line in content.lines() {
        if consumed >= budget {
            break;
        }
        consumed += line.chars().count() + 1;
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::store::tests::open_test_db;
    use crate::brain::Brain;
    use crate::config::EngineConfig;

    async fn setup() -> (tempfile::TempDir, Engine) {
        let (temp_dir, db) = open_test_db().await;
        let brain = Brain::open(db.sqlite, "trainer").await.unwrap();
        (temp_dir, Engine::new(brain, EngineConfig::default()).unwrap())
    }

    #[test]
    fn character_budget_is_line_granular() {
        let content = "one two\nthree four\nfive six\n";
        assert_eq!(limit_lines(content, None).len(), 3);
        assert_eq!(limit_lines(content, Some(1)), vec!["one two"]);
        assert_eq!(limit_lines(content, Some(8)), vec!["one two"]);
        assert_eq!(limit_lines(content, Some(9)), vec!["one two", "three four"]);
        assert!(limit_lines(content, Some(0)).is_empty());
    }

    #[tokio::test]
    async fn messages_are_counted_and_capped() {
        let (_dir, engine) = setup().await;
        let trainer = Trainer::new(&engine);
        let messages = ["the quick brown", "http://spam.example", "hi", "lazy dog sleeps"];

        let report = trainer.train_on_messages(messages, Some(3)).await.unwrap();
        assert_eq!(
            report,
            TrainingReport {
                messages: 3,
                learned: 1,
                windows: 2,
            }
        );
        assert_eq!(report.skipped(), 2);
        assert!(!engine.brain().contains("lazy dog").await.unwrap());
    }

    #[tokio::test]
    async fn file_lines_are_learned() {
        let (dir, engine) = setup().await;
        let path = dir.path().join("corpus.txt");
        std::fs::write(&path, "the quick brown fox\nthe lazy dog\n").unwrap();

        let report = Trainer::new(&engine).train_on_file(&path, None).await.unwrap();
        assert_eq!(report.messages, 2);
        assert_eq!(report.windows, 5);
        assert!(engine.brain().contains("the lazy").await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let (dir, engine) = setup().await;
        let result = Trainer::new(&engine)
            .train_on_file(&dir.path().join("missing.txt"), None)
            .await;
        assert!(result.is_err());
    }
}
