//! # Viterbi and Greedy Decoding
//!
//! Inference-side dynamic programming over emission and transition scores.
//! Decoding never touches the autodiff graph: scores are plain `f32`
//! matrices extracted from the model, and the returned path is globally
//! optimal for those scores, with no pruning.

use crate::error::{Result, ShirushiError};

/// Large negative stand-in for log(0), shared by the decoder and the
/// partition scorer. Finite so that arithmetic on it stays well-defined.
pub const LOG_ZERO: f32 = -10000.0;

/// Viterbi decoder for one tag dictionary.
///
/// `start` and `stop` are the pseudo-tag indices of the owning dictionary;
/// every decoded path implicitly begins at START and ends at STOP, neither
/// of which appears in the output.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    tag_count: usize,
    start: usize,
    stop: usize,
}

impl ViterbiDecoder {
    /// Create a decoder over `tag_count` tags (including START/STOP).
    pub fn new(tag_count: usize, start: usize, stop: usize) -> Self {
        Self {
            tag_count,
            start,
            stop,
        }
    }

    /// Decode the highest-scoring tag sequence.
    ///
    /// # Arguments
    /// * `emissions` - `[seq_len, tag_count]` per-token tag scores
    /// * `transitions` - `[tag_count, tag_count]`, `transitions[to][from]`
    ///
    /// # Returns
    /// The optimal tag index path (length `seq_len`) and its score.
    ///
    /// # Panics
    /// If the backtrace does not terminate at START. That means the tag
    /// dictionary and the score matrices disagree about indices, which is a
    /// bookkeeping bug rather than bad input.
    pub fn decode(
        &self,
        emissions: &[Vec<f32>],
        transitions: &[Vec<f32>],
    ) -> Result<(Vec<usize>, f32)> {
        self.check_dimensions(emissions, transitions)?;

        let seq_len = emissions.len();
        if seq_len == 0 {
            return Ok((Vec::new(), transitions[self.stop][self.start]));
        }

        // Best score of any path ending in tag p before the first token.
        let mut forward = vec![LOG_ZERO; self.tag_count];
        forward[self.start] = 0.0;

        let mut backptr = vec![vec![0usize; self.tag_count]; seq_len];

        for (t, emission) in emissions.iter().enumerate() {
            let mut next = vec![LOG_ZERO; self.tag_count];
            for (n, next_score) in next.iter_mut().enumerate() {
                // Strict `>` keeps the first index seen on ties.
                let mut best_prev = 0;
                let mut best = forward[0] + transitions[n][0];
                for (p, &fwd) in forward.iter().enumerate().skip(1) {
                    let score = fwd + transitions[n][p];
                    if score > best {
                        best = score;
                        best_prev = p;
                    }
                }
                *next_score = best + emission[n];
                backptr[t][n] = best_prev;
            }
            forward = next;
        }

        // Close every path with its transition into STOP.
        let mut best_last = 0;
        let mut best_score = forward[0] + transitions[self.stop][0];
        for (p, &fwd) in forward.iter().enumerate().skip(1) {
            let score = fwd + transitions[self.stop][p];
            if score > best_score {
                best_score = score;
                best_last = p;
            }
        }

        let mut path = vec![0usize; seq_len];
        let mut current = best_last;
        path[seq_len - 1] = current;
        for t in (1..seq_len).rev() {
            current = backptr[t][current];
            path[t - 1] = current;
        }

        let root = backptr[0][current];
        assert_eq!(
            root, self.start,
            "viterbi backtrace did not terminate at START: tag indices are inconsistent"
        );

        Ok((path, best_score))
    }

    fn check_dimensions(&self, emissions: &[Vec<f32>], transitions: &[Vec<f32>]) -> Result<()> {
        if let Some(row) = emissions.first() {
            if row.len() != self.tag_count {
                return Err(ShirushiError::LengthMismatch {
                    reason: format!(
                        "emission row has {} scores, decoder expects {}",
                        row.len(),
                        self.tag_count
                    ),
                });
            }
        }
        if transitions.len() != self.tag_count {
            return Err(ShirushiError::LengthMismatch {
                reason: format!(
                    "transition matrix has {} rows, decoder expects {}",
                    transitions.len(),
                    self.tag_count
                ),
            });
        }
        Ok(())
    }
}

/// Per-step argmax over emission scores, ignoring transitions entirely.
///
/// Ties are broken to the lowest index by the strict `>` scan. Intended for
/// tasks where sequential tag dependence is weak.
pub fn greedy_decode(emissions: &[Vec<f32>]) -> Vec<usize> {
    emissions
        .iter()
        .map(|row| {
            let mut best = 0;
            let mut best_score = row[0];
            for (i, &score) in row.iter().enumerate().skip(1) {
                if score > best_score {
                    best_score = score;
                    best = i;
                }
            }
            best
        })
        .collect()
}
