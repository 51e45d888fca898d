//! Persistent Markov brain: per-tenant seed and transition tables.

pub mod schema;
pub mod store;
pub mod types;

pub use schema::BrainTables;
pub use store::{Brain, TrainingBatch};
pub use types::{BrainStats, ChainSnapshot, Transition, SEPARATOR, TERMINAL_TOKEN};
