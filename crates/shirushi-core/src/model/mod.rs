//! # Model Aggregate
//!
//! One explicitly-owned bundle of every learned parameter: the embedding
//! tables, the character and sentence LSTMs, and the per-task CRF heads.
//! All components read it by reference; parameter updates go through the
//! optimizer holding [`Model::trainable_vars`], never through ambient
//! mutation. Graph construction is per sentence: one sentence is composed,
//! encoded, and scored end-to-end before the next one starts.

pub mod composer;
pub mod crf;
pub mod encoder;

use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::tags::TagDictionary;
use crate::vocab::{CharVocabulary, PretrainedEmbeddings};

pub use composer::EmbeddingComposer;
pub use crf::{CrfHead, InferenceMode};
pub use encoder::SequenceEncoder;

/// Hyperparameters of the shared encoder stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Character embedding dimensionality.
    pub char_dim: usize,
    /// Hidden size of each character LSTM direction.
    pub char_hidden: usize,
    /// Hidden size of each sentence LSTM direction.
    pub encoder_hidden: usize,
    /// Seed for parameter initialization.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            char_dim: 32,
            char_hidden: 32,
            encoder_hidden: 128,
            seed: 42,
        }
    }
}

/// One task head to build: name, tag dictionary, inference mode.
pub struct TaskSpec {
    pub name: String,
    pub tags: TagDictionary,
    pub mode: InferenceMode,
}

/// The full parameter set: embeddings, shared encoder, per-task CRF heads.
pub struct Model {
    varmap: VarMap,
    composer: EmbeddingComposer,
    encoder: SequenceEncoder,
    heads: Vec<CrfHead>,
}

impl Model {
    /// Build a model on the CPU device.
    ///
    /// All parameters get a seeded small-uniform initialization; the word
    /// table is then overwritten with the pretrained rows (row 0 stays the
    /// zero OOV embedding until gradients move it).
    pub fn new(
        config: &ModelConfig,
        pretrained: &PretrainedEmbeddings,
        chars: CharVocabulary,
        tasks: Vec<TaskSpec>,
    ) -> Result<Self> {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let composer = EmbeddingComposer::new(
            pretrained,
            chars,
            config.char_dim,
            config.char_hidden,
            vb.pp("composer"),
        )?;
        let encoder =
            SequenceEncoder::new(composer.output_dim(), config.encoder_hidden, vb.pp("encoder"))?;

        let mut heads = Vec::with_capacity(tasks.len());
        for task in tasks {
            info!(
                task = %task.name,
                tags = task.tags.real_tag_count(),
                mode = ?task.mode,
                "building CRF head"
            );
            heads.push(CrfHead::new(
                task.tags,
                encoder.output_dim(),
                task.mode,
                vb.pp(format!("heads.{}", task.name)),
            )?);
        }

        randomize_parameters(&varmap, config.seed, &device)?;

        // Pretrained rows replace the seeded initialization of the word table.
        let table = Tensor::from_vec(
            pretrained.vectors().to_vec(),
            (pretrained.row_count(), pretrained.dim()),
            &device,
        )?;
        varmap.set_one("composer.words.weight", &table)?;

        Ok(Self {
            varmap,
            composer,
            encoder,
            heads,
        })
    }

    /// Per-token hidden vectors for one sentence.
    pub fn hidden_states(&self, words: &[String]) -> Result<Tensor> {
        if words.is_empty() {
            return Err(crate::error::ShirushiError::EmptySentence);
        }
        let composed = self.composer.compose(words)?;
        self.encoder.encode(&composed)
    }

    /// Emission scores of one task for one sentence.
    pub fn emissions(&self, head: usize, words: &[String]) -> Result<Tensor> {
        let hidden = self.hidden_states(words)?;
        self.heads[head].emissions(&hidden)
    }

    /// Per-sentence training loss of one task (partition minus gold score).
    pub fn loss(&self, head: usize, words: &[String], gold: &[usize]) -> Result<Tensor> {
        let emissions = self.emissions(head, words)?;
        self.heads[head].loss(&emissions, gold)
    }

    /// Predicted tag indices for one sentence, using the head's mode.
    pub fn predict(&self, head: usize, words: &[String]) -> Result<Vec<usize>> {
        let emissions = self.emissions(head, words)?;
        self.heads[head].decode(&emissions)
    }

    /// The task head at `index`.
    pub fn head(&self, index: usize) -> &CrfHead {
        &self.heads[index]
    }

    /// Number of task heads.
    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    /// The embedding composer (vocabulary lookups live here).
    pub fn composer(&self) -> &EmbeddingComposer {
        &self.composer
    }

    /// Every trainable variable, for the optimizer. The optimizer's update
    /// step is the single writer; decode/score calls only read.
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Save all weights as safetensors.
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Load weights saved by [`Model::save_weights`] into a model built
    /// with the same configuration and dictionaries.
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.varmap.load(path)?;
        Ok(())
    }
}

/// Overwrite every variable with seeded uniform values in [-0.1, 0.1].
///
/// Candle's CPU init is not seedable, so reproducibility comes from
/// regenerating each tensor from one deterministic stream, iterating names
/// in sorted order.
fn randomize_parameters(varmap: &VarMap, seed: u64, device: &Device) -> Result<()> {
    let mut rng = oorandom::Rand32::new(seed);
    let data = varmap.data().lock().unwrap();
    let mut names: Vec<String> = data.keys().cloned().collect();
    names.sort();
    for name in &names {
        let var = &data[name];
        let count = var.shape().elem_count();
        let values: Vec<f32> = (0..count)
            .map(|_| (rng.rand_float() * 2.0 - 1.0) * 0.1)
            .collect();
        let tensor = Tensor::from_vec(values, var.shape().clone(), device)?;
        var.set(&tensor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::PretrainedEmbeddings;
    use std::io::Write;

    fn tiny_pretrained() -> PretrainedEmbeddings {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "shirushi-model-{}-{unique}.emb",
            std::process::id()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"the 0.1 0.2 0.3\ncat 0.4 0.5 0.6\nsat 0.7 0.8 0.9\n")
            .unwrap();
        let emb = PretrainedEmbeddings::load(&path, None).unwrap();
        std::fs::remove_file(path).ok();
        emb
    }

    fn tiny_model() -> Model {
        let pretrained = tiny_pretrained();
        let chars = CharVocabulary::from_corpus(["the", "cat", "sat"]);
        let tags = TagDictionary::from_tags(["O", "B-X"]).unwrap();
        let config = ModelConfig {
            char_dim: 4,
            char_hidden: 4,
            encoder_hidden: 6,
            seed: 7,
        };
        Model::new(
            &config,
            &pretrained,
            chars,
            vec![TaskSpec {
                name: "toy".into(),
                tags,
                mode: InferenceMode::Viterbi,
            }],
        )
        .unwrap()
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn composition_is_deterministic() {
        let model = tiny_model();
        let a = model
            .composer()
            .compose_word("cat")
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        let b = model
            .composer()
            .compose_word("cat")
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn same_seed_same_parameters() {
        let a = tiny_model();
        let b = tiny_model();
        let sentence = words(&["the", "cat"]);
        let ea = a.emissions(0, &sentence).unwrap().to_vec2::<f32>().unwrap();
        let eb = b.emissions(0, &sentence).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(ea, eb);
    }

    #[test]
    fn oov_words_compose_without_error() {
        let model = tiny_model();
        // "dog" is out of vocabulary, "?" has no known characters at all.
        let out = model.hidden_states(&words(&["dog", "?"])).unwrap();
        assert_eq!(out.dims2().unwrap().0, 2);
    }

    #[test]
    fn prediction_length_matches_sentence_length() {
        let model = tiny_model();
        let sentence = words(&["the", "cat", "sat"]);
        let path = model.predict(0, &sentence).unwrap();
        assert_eq!(path.len(), 3);
        let real = model.head(0).tags().real_tag_count();
        // START/STOP never leak into predictions.
        assert!(path.iter().all(|&t| t < real + 2));
    }

    #[test]
    fn loss_is_finite_and_nonnegative_for_gold_viterbi_path() {
        let model = tiny_model();
        let sentence = words(&["the", "cat"]);
        let path = model.predict(0, &sentence).unwrap();
        let loss = model
            .loss(0, &sentence, &path)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss.is_finite());
        assert!(loss >= -1e-4);
    }

    #[test]
    fn empty_sentence_is_rejected() {
        let model = tiny_model();
        assert!(model.hidden_states(&[]).is_err());
    }
}
