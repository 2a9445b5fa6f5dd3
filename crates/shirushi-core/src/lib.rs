//! # Shirushi Core
//!
//! A neural sequence-labeling engine for tasks such as named-entity
//! tagging, part-of-speech tagging, and chunking. Per-token embeddings
//! (pretrained word vectors plus character LSTM states) feed one shared
//! bidirectional encoder; each task owns a linear-chain CRF head with
//! Viterbi decoding for inference and forward-algorithm partition scoring
//! for the training loss.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shirushi_core::model::{InferenceMode, Model, ModelConfig, TaskSpec};
//! use shirushi_core::tags::TagDictionary;
//! use shirushi_core::vocab::{CharVocabulary, PretrainedEmbeddings};
//!
//! let pretrained = PretrainedEmbeddings::load("embeddings.txt", None).unwrap();
//! let chars = CharVocabulary::from_corpus(["the", "cat"]);
//! let tags = TagDictionary::from_tags(["O", "B-PER", "I-PER"]).unwrap();
//!
//! let model = Model::new(
//!     &ModelConfig::default(),
//!     &pretrained,
//!     chars,
//!     vec![TaskSpec { name: "ner".into(), tags, mode: InferenceMode::Viterbi }],
//! )
//! .unwrap();
//!
//! let sentence = vec!["the".to_string(), "cat".to_string()];
//! let path = model.predict(0, &sentence).unwrap();
//! assert_eq!(path.len(), 2);
//! ```
pub mod decode;
pub mod error;
pub mod model;
pub mod tags;
pub mod vocab;

// Re-export primary API
pub use decode::{LOG_ZERO, ViterbiDecoder, greedy_decode};
pub use error::{Result, ShirushiError};
pub use model::{CrfHead, EmbeddingComposer, InferenceMode, Model, ModelConfig, SequenceEncoder, TaskSpec};
pub use tags::TagDictionary;
pub use vocab::{CharVocabulary, OOV_INDEX, PretrainedEmbeddings, Vocabulary, load_doc_frequencies};
