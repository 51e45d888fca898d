//! Top-level error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the brain, engine and registry.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested seed could not be resolved. Recoverable: the caller
    /// should ask for a different phrase.
    #[error("seed not found: '{0}'")]
    SeedNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed brain snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// True for the "try another phrase" outcome, as opposed to storage or
    /// configuration failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::SeedNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_seed_not_found_is_recoverable() {
        assert!(Error::SeedNotFound("the quick".into()).is_not_found());
        assert!(!Error::InvalidConfig("chain_length".into()).is_not_found());
        assert!(!Error::Other(anyhow::anyhow!("boom")).is_not_found());
    }

    #[test]
    fn seed_not_found_names_the_seed() {
        let error = Error::SeedNotFound("lazy dog".into());
        assert_eq!(error.to_string(), "seed not found: 'lazy dog'");
    }
}
