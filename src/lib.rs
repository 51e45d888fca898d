//! Persistent, multi-tenant Markov-chain chat brain.
//!
//! A [`BrainRegistry`] owns one SQLite pool and an [`Engine`] per tenant.
//! Each engine learns from chat messages through sliding-window training and
//! answers with weighted forward generation ([`Engine::speak`]) or with a
//! guessed lead-in plus continuation ([`Engine::babble`]).

pub mod brain;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod registry;
pub mod telemetry;

pub use brain::{Brain, BrainStats, ChainSnapshot, Transition};
pub use chain::{Engine, Trainer, TrainingReport};
pub use config::{Config, EngineConfig};
pub use error::{Error, Result};
pub use registry::BrainRegistry;

use std::sync::Arc;

/// Identifier of the community or server a brain belongs to.
pub type TenantId = Arc<str>;
