//! Markov chain text engine built on top of a brain.

pub mod engine;
pub mod sampling;
pub mod tokenize;
pub mod trainer;

pub use engine::Engine;
pub use trainer::{Trainer, TrainingReport};
