//! # Sequence Encoder
//!
//! Bidirectional LSTM over a sentence's composed embeddings, shared across
//! every task head. Gradients from any task's loss propagate into these
//! weights, so concurrently trained tasks compete for encoder capacity.

use candle_core::{IndexOp, Tensor};
use candle_nn::{LSTM, LSTMConfig, RNN, VarBuilder};

use crate::error::Result;

/// Shared bidirectional recurrent encoder.
pub struct SequenceEncoder {
    fwd: LSTM,
    bwd: LSTM,
    hidden: usize,
}

impl SequenceEncoder {
    /// Build the forward and backward LSTMs under `vb`.
    pub fn new(input_dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        let fwd = candle_nn::lstm(input_dim, hidden, LSTMConfig::default(), vb.pp("fwd"))?;
        let bwd = candle_nn::lstm(input_dim, hidden, LSTMConfig::default(), vb.pp("bwd"))?;
        Ok(Self { fwd, bwd, hidden })
    }

    /// Dimensionality of one per-token hidden vector.
    pub fn output_dim(&self) -> usize {
        2 * self.hidden
    }

    /// Encode `[seq_len, input_dim]` composed embeddings into
    /// `[seq_len, 2 * hidden]` per-token hidden vectors, concatenating the
    /// forward state at t with the backward state at t.
    pub fn encode(&self, embedded: &Tensor) -> Result<Tensor> {
        let (seq_len, _) = embedded.dims2()?;

        let input = embedded.unsqueeze(0)?;
        let fwd_states = self.fwd.seq(&input)?;

        let reversed_rows = (0..seq_len)
            .rev()
            .map(|t| embedded.i(t))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let reversed = Tensor::stack(&reversed_rows, 0)?.unsqueeze(0)?;
        let bwd_states = self.bwd.seq(&reversed)?;

        let mut rows = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let forward = fwd_states[t].h().squeeze(0)?;
            let backward = bwd_states[seq_len - 1 - t].h().squeeze(0)?;
            rows.push(Tensor::cat(&[&forward, &backward], 0)?);
        }
        Ok(Tensor::stack(&rows, 0)?)
    }
}
