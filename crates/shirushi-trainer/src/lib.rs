//! # Shirushi Trainer
//!
//! Multi-task training for the Shirushi labeling engine: configuration,
//! CoNLL-style data handling, token-level evaluation, and the scheduler
//! that interleaves shard-sized batches across tasks sharing one encoder.

pub mod config;
pub mod data;
pub mod eval;
pub mod scheduler;

// Re-export primary API
pub use config::{TaskConfig, TrainingConfig};
pub use data::{Sentence, load_conll, write_predictions};
pub use eval::accuracy;
pub use scheduler::TrainingScheduler;
