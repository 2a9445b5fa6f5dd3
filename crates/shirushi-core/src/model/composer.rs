//! # Embedding Composer
//!
//! Turns a raw word into one fixed-size vector: the pretrained word
//! embedding concatenated with the final states of a forward and a backward
//! character-level LSTM pass. The character LSTMs start from the zero state
//! for every token, so composition is deterministic under fixed parameters.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, LSTM, LSTMConfig, Module, RNN, VarBuilder};

use crate::error::Result;
use crate::vocab::{CharVocabulary, PretrainedEmbeddings, Vocabulary};

/// Composes per-token input vectors from word and character embeddings.
pub struct EmbeddingComposer {
    vocab: Vocabulary,
    chars: CharVocabulary,
    word_table: Embedding,
    char_table: Embedding,
    char_fwd: LSTM,
    char_bwd: LSTM,
    word_dim: usize,
    char_hidden: usize,
    device: Device,
}

impl EmbeddingComposer {
    /// Build the composer's tables and character LSTMs under `vb`.
    ///
    /// The word table is created with the pretrained shape; the caller is
    /// responsible for copying the pretrained rows into the VarMap
    /// afterwards (see `Model::new`).
    pub fn new(
        pretrained: &PretrainedEmbeddings,
        chars: CharVocabulary,
        char_dim: usize,
        char_hidden: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let device = vb.device().clone();
        let word_table =
            candle_nn::embedding(pretrained.row_count(), pretrained.dim(), vb.pp("words"))?;
        let char_table = candle_nn::embedding(chars.len().max(1), char_dim, vb.pp("chars"))?;
        let char_fwd = candle_nn::lstm(char_dim, char_hidden, LSTMConfig::default(), vb.pp("char_fwd"))?;
        let char_bwd = candle_nn::lstm(char_dim, char_hidden, LSTMConfig::default(), vb.pp("char_bwd"))?;

        Ok(Self {
            vocab: pretrained.vocabulary(),
            chars,
            word_table,
            char_table,
            char_fwd,
            char_bwd,
            word_dim: pretrained.dim(),
            char_hidden,
            device,
        })
    }

    /// Dimensionality of one composed vector.
    pub fn output_dim(&self) -> usize {
        self.word_dim + 2 * self.char_hidden
    }

    /// Compose a whole sentence into a `[seq_len, output_dim]` tensor.
    pub fn compose(&self, words: &[String]) -> Result<Tensor> {
        let rows = words
            .iter()
            .map(|word| self.compose_word(word))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::stack(&rows, 0)?)
    }

    /// Compose one token: `[word_vector, char_fwd_final, char_bwd_final]`.
    pub fn compose_word(&self, word: &str) -> Result<Tensor> {
        let index = self.vocab.word_to_index(word) as u32;
        let ids = Tensor::new(&[index], &self.device)?;
        let word_vector = self.word_table.forward(&ids)?.squeeze(0)?;

        // Unknown characters are skipped, not substituted.
        let char_ids: Vec<u32> = word
            .chars()
            .filter_map(|c| self.chars.char_to_index(c))
            .map(|i| i as u32)
            .collect();

        let (fwd, bwd) = if char_ids.is_empty() {
            let zeros = Tensor::zeros(self.char_hidden, DType::F32, &self.device)?;
            (zeros.clone(), zeros)
        } else {
            let forward = self.final_state(&self.char_fwd, &char_ids)?;
            let reversed: Vec<u32> = char_ids.iter().rev().copied().collect();
            let backward = self.final_state(&self.char_bwd, &reversed)?;
            (forward, backward)
        };

        Ok(Tensor::cat(&[&word_vector, &fwd, &bwd], 0)?)
    }

    /// Run one character LSTM from the zero state and keep its final h.
    fn final_state(&self, lstm: &LSTM, char_ids: &[u32]) -> Result<Tensor> {
        let ids = Tensor::new(char_ids, &self.device)?;
        let embedded = self.char_table.forward(&ids)?.unsqueeze(0)?;
        let states = lstm.seq(&embedded)?;
        let last = states.last().expect("char sequence is non-empty");
        Ok(last.h().squeeze(0)?)
    }
}
