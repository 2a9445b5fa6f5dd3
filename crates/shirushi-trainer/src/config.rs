//! Multi-task training configuration, deserialized from JSON.
//!
//! Enum-valued options (the inference mode) are resolved at
//! deserialization time; an unknown string is a fatal configuration error,
//! never a per-call dispatch.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shirushi_core::{InferenceMode, ModelConfig};

fn default_weight() -> f32 {
    1.0
}

fn default_min_word_freq() -> u64 {
    5
}

fn default_shards_per_epoch() -> usize {
    10
}

fn default_epochs() -> usize {
    30
}

fn default_seed() -> u64 {
    42
}

fn default_char_dim() -> usize {
    32
}

fn default_char_hidden() -> usize {
    32
}

fn default_encoder_hidden() -> usize {
    128
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_batch_size() -> usize {
    8
}

/// One labeling task sharing the encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name, used for head parameter paths and output files.
    pub name: String,
    /// CoNLL-style training data.
    pub train: PathBuf,
    /// CoNLL-style development data, evaluated after each epoch.
    pub dev: PathBuf,
    /// CoNLL-style test data, evaluated after training.
    pub test: PathBuf,
    /// Inference mode: `"viterbi"` (default) or `"greedy"`.
    #[serde(default)]
    pub mode: InferenceMode,
    /// Loss weight of this task against the shared parameters.
    #[serde(default = "default_weight")]
    pub weight: f32,
}

/// Global training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Pretrained embedding file, `<word> <d1> .. <dn>` per line.
    pub embeddings: PathBuf,
    /// Optional document-frequency file, `<word> <count>` per line.
    #[serde(default)]
    pub doc_frequencies: Option<PathBuf>,
    /// Words at or below this document frequency are dropped from the
    /// embedding table. Only applies when `doc_frequencies` is set.
    #[serde(default = "default_min_word_freq")]
    pub min_word_freq: u64,
    /// Shards each task's training data is split into per epoch.
    #[serde(default = "default_shards_per_epoch")]
    pub shards_per_epoch: usize,
    /// Total number of epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Seed for shuffling and parameter initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Character embedding dimensionality.
    #[serde(default = "default_char_dim")]
    pub char_dim: usize,
    /// Hidden size of each character LSTM direction.
    #[serde(default = "default_char_hidden")]
    pub char_hidden: usize,
    /// Hidden size of each sentence LSTM direction.
    #[serde(default = "default_encoder_hidden")]
    pub encoder_hidden: usize,
    /// SGD learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Sentences whose losses are accumulated before one parameter update.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Where test predictions are written after training; skipped if unset.
    #[serde(default)]
    pub predictions_dir: Option<PathBuf>,
    /// Where the trained weights (safetensors) and the dictionary sidecar
    /// are saved after training; skipped if unset.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// The tasks to train jointly.
    pub tasks: Vec<TaskConfig>,
}

impl TrainingConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.tasks.is_empty(), "config declares no tasks");
        anyhow::ensure!(self.shards_per_epoch > 0, "shards_per_epoch must be positive");
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        Ok(())
    }

    /// The core model hyperparameters carried by this config.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            char_dim: self.char_dim,
            char_hidden: self.char_hidden,
            encoder_hidden: self.encoder_hidden,
            seed: self.seed,
        }
    }
}
