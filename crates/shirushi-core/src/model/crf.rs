//! # CRF Head
//!
//! One linear-chain conditional random field per task: a learned projection
//! from encoder hidden vectors to per-tag emission scores, plus a learned
//! tag-transition matrix. The head is a pure function of its parameters and
//! the encoder output; it exposes Viterbi/greedy decoding for inference and
//! partition/gold-path scoring for the training loss.

use candle_core::{D, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::decode::{LOG_ZERO, ViterbiDecoder, greedy_decode};
use crate::error::{Result, ShirushiError};
use crate::tags::TagDictionary;

/// How a task turns emission scores into a tag sequence. Resolved once at
/// model construction, never re-dispatched from strings per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Globally optimal path over emissions plus transitions.
    Viterbi,
    /// Per-step emission argmax, transitions ignored.
    Greedy,
}

impl Default for InferenceMode {
    fn default() -> Self {
        Self::Viterbi
    }
}

/// Per-task CRF output layer.
pub struct CrfHead {
    tags: TagDictionary,
    emission: Linear,
    transitions: Tensor,
    decoder: ViterbiDecoder,
    mode: InferenceMode,
}

impl CrfHead {
    /// Build the emission projection and transition matrix under `vb`.
    pub fn new(
        tags: TagDictionary,
        input_dim: usize,
        mode: InferenceMode,
        vb: VarBuilder,
    ) -> Result<Self> {
        let tag_count = tags.tag_count();
        let emission = candle_nn::linear(input_dim, tag_count, vb.pp("emission"))?;
        let transitions =
            vb.get_with_hints((tag_count, tag_count), "transitions", candle_nn::init::ZERO)?;
        let decoder = ViterbiDecoder::new(tag_count, tags.start_index(), tags.stop_index());

        Ok(Self {
            tags,
            emission,
            transitions,
            decoder,
            mode,
        })
    }

    /// The task's tag dictionary.
    pub fn tags(&self) -> &TagDictionary {
        &self.tags
    }

    /// The inference mode this head was configured with.
    pub fn mode(&self) -> InferenceMode {
        self.mode
    }

    /// Project `[seq_len, input_dim]` hidden vectors to
    /// `[seq_len, tag_count]` emission scores. Recomputed per sentence.
    pub fn emissions(&self, hidden: &Tensor) -> Result<Tensor> {
        Ok(self.emission.forward(hidden)?)
    }

    /// Log of the summed exponentiated scores of every possible tag
    /// sequence (the training partition function), via the forward
    /// algorithm in log space.
    pub fn partition(&self, emissions: &Tensor) -> Result<Tensor> {
        let (seq_len, tag_count) = emissions.dims2()?;
        if seq_len == 0 {
            return Err(ShirushiError::EmptySentence);
        }

        // Mirrors the decoder's initialization, summing instead of maximizing.
        let mut init = vec![LOG_ZERO; tag_count];
        init[self.tags.start_index()] = 0.0;
        let mut forward = Tensor::from_vec(init, tag_count, emissions.device())?;

        for t in 0..seq_len {
            // scores[next][prev] = forward[prev] + transitions[next][prev]
            let scores = self.transitions.broadcast_add(&forward.unsqueeze(0)?)?;
            forward = log_sum_exp(&scores)?.add(&emissions.i(t)?)?;
        }

        let terminal = forward.add(&self.transitions.i(self.tags.stop_index())?)?;
        log_sum_exp(&terminal)
    }

    /// Score of an explicit gold tag sequence: START transition, internal
    /// transitions, emissions, STOP transition.
    pub fn sentence_score(&self, emissions: &Tensor, gold: &[usize]) -> Result<Tensor> {
        let (seq_len, _) = emissions.dims2()?;
        if seq_len == 0 {
            return Err(ShirushiError::EmptySentence);
        }
        if gold.len() != seq_len {
            return Err(ShirushiError::LengthMismatch {
                reason: format!("{} gold tags for {} tokens", gold.len(), seq_len),
            });
        }

        let start = self.tags.start_index();
        let stop = self.tags.stop_index();

        let mut score = self.transitions.i((gold[0], start))?;
        for i in 1..seq_len {
            score = score.add(&self.transitions.i((gold[i], gold[i - 1]))?)?;
        }
        for (i, &tag) in gold.iter().enumerate() {
            score = score.add(&emissions.i((i, tag))?)?;
        }
        Ok(score.add(&self.transitions.i((stop, gold[seq_len - 1]))?)?)
    }

    /// Negative conditional log-likelihood of the gold sequence,
    /// differentiable with respect to every emission and transition score.
    pub fn loss(&self, emissions: &Tensor, gold: &[usize]) -> Result<Tensor> {
        let partition = self.partition(emissions)?;
        let gold_score = self.sentence_score(emissions, gold)?;
        Ok(partition.sub(&gold_score)?)
    }

    /// Decode with the configured inference mode.
    pub fn decode(&self, emissions: &Tensor) -> Result<Vec<usize>> {
        match self.mode {
            InferenceMode::Viterbi => Ok(self.viterbi(emissions)?.0),
            InferenceMode::Greedy => self.greedy(emissions),
        }
    }

    /// Highest-scoring tag path and its score.
    pub fn viterbi(&self, emissions: &Tensor) -> Result<(Vec<usize>, f32)> {
        let emissions = emissions.to_vec2::<f32>()?;
        let transitions = self.transitions.to_vec2::<f32>()?;
        self.decoder.decode(&emissions, &transitions)
    }

    /// Per-step emission argmax, transitions ignored.
    pub fn greedy(&self, emissions: &Tensor) -> Result<Vec<usize>> {
        Ok(greedy_decode(&emissions.to_vec2::<f32>()?))
    }
}

/// Numerically stable log-sum-exp over the last dimension.
fn log_sum_exp(t: &Tensor) -> Result<Tensor> {
    let max = t.max_keepdim(D::Minus1)?;
    let shifted = t.broadcast_sub(&max)?;
    let summed = shifted.exp()?.sum_keepdim(D::Minus1)?;
    Ok(summed.log()?.add(&max)?.squeeze(D::Minus1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn test_head(real_tags: &[&str], mode: InferenceMode) -> (CrfHead, VarMap) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let tags = TagDictionary::from_tags(real_tags.iter().copied()).unwrap();
        let head = CrfHead::new(tags, 3, mode, vb.pp("head")).unwrap();
        (head, varmap)
    }

    fn set_transitions(varmap: &mut VarMap, values: &[Vec<f32>]) {
        let tag_count = values.len();
        let flat: Vec<f32> = values.iter().flatten().copied().collect();
        let tensor = Tensor::from_vec(flat, (tag_count, tag_count), &Device::Cpu).unwrap();
        varmap.set_one("head.transitions", &tensor).unwrap();
    }

    fn emissions_tensor(values: &[Vec<f32>]) -> Tensor {
        let rows = values.len();
        let cols = values[0].len();
        let flat: Vec<f32> = values.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows, cols), &Device::Cpu).unwrap()
    }

    fn skewed_transitions(tag_count: usize) -> Vec<Vec<f32>> {
        (0..tag_count)
            .map(|to| {
                (0..tag_count)
                    .map(|from| ((to * 5 + from * 2) % 7) as f32 * 0.13 - 0.3)
                    .collect()
            })
            .collect()
    }

    /// Brute-force log(sum over all paths of exp(path score)) under the
    /// START/STOP convention, enumerating every tag at every position.
    fn brute_force_partition(
        emissions: &[Vec<f32>],
        transitions: &[Vec<f32>],
        start: usize,
        stop: usize,
    ) -> f64 {
        let tag_count = transitions.len();
        let seq_len = emissions.len();
        let mut paths: Vec<Vec<usize>> = vec![Vec::new()];
        for _ in 0..seq_len {
            paths = paths
                .iter()
                .flat_map(|p| {
                    (0..tag_count).map(move |t| {
                        let mut next = p.clone();
                        next.push(t);
                        next
                    })
                })
                .collect();
        }
        let mut total = 0f64;
        for path in &paths {
            let mut score = transitions[path[0]][start] as f64;
            for i in 1..seq_len {
                score += transitions[path[i]][path[i - 1]] as f64;
            }
            for (i, &tag) in path.iter().enumerate() {
                score += emissions[i][tag] as f64;
            }
            score += transitions[stop][path[seq_len - 1]] as f64;
            total += score.exp();
        }
        total.ln()
    }

    #[test]
    fn partition_matches_brute_force_enumeration() {
        let (head, mut varmap) = test_head(&["A", "B"], InferenceMode::Viterbi);
        let transitions = skewed_transitions(head.tags().tag_count());
        set_transitions(&mut varmap, &transitions);

        let emissions = vec![
            vec![0.4, -0.1, -2.0, -2.0],
            vec![-0.3, 0.7, -2.0, -2.0],
            vec![0.2, 0.1, -2.0, -2.0],
        ];
        let tensor = emissions_tensor(&emissions);

        let expected = brute_force_partition(
            &emissions,
            &transitions,
            head.tags().start_index(),
            head.tags().stop_index(),
        );
        let actual = head.partition(&tensor).unwrap().to_scalar::<f32>().unwrap();
        assert!(
            (actual as f64 - expected).abs() < 1e-3,
            "partition {actual} != brute force {expected}"
        );
    }

    #[test]
    fn viterbi_score_equals_sentence_score_of_decoded_path() {
        let (head, mut varmap) = test_head(&["A", "B", "C"], InferenceMode::Viterbi);
        let transitions = skewed_transitions(head.tags().tag_count());
        set_transitions(&mut varmap, &transitions);

        let emissions = emissions_tensor(&[
            vec![0.9, -0.2, 0.3, -3.0, -3.0],
            vec![-0.5, 1.2, 0.0, -3.0, -3.0],
            vec![0.1, 0.4, -0.9, -3.0, -3.0],
            vec![0.6, -0.6, 0.8, -3.0, -3.0],
        ]);

        let (path, score) = head.viterbi(&emissions).unwrap();
        let gold_score = head
            .sentence_score(&emissions, &path)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!((score - gold_score).abs() < 1e-4);
    }

    #[test]
    fn partition_upper_bounds_any_single_path() {
        let (head, mut varmap) = test_head(&["A", "B"], InferenceMode::Viterbi);
        set_transitions(&mut varmap, &skewed_transitions(head.tags().tag_count()));

        let emissions = emissions_tensor(&[vec![0.3, 0.1, -1.0, -1.0], vec![-0.2, 0.5, -1.0, -1.0]]);
        let (path, _) = head.viterbi(&emissions).unwrap();

        let partition = head.partition(&emissions).unwrap().to_scalar::<f32>().unwrap();
        let gold = head
            .sentence_score(&emissions, &path)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        // The log-sum over all paths dominates the best path's score, so the
        // loss of the Viterbi path is non-negative.
        assert!(partition >= gold - 1e-5);
    }

    #[test]
    fn loss_is_differentiable_through_emissions_and_transitions() {
        let (head, _varmap) = test_head(&["A", "B"], InferenceMode::Viterbi);
        let emissions_var =
            candle_core::Var::from_tensor(&emissions_tensor(&[
                vec![0.2, 0.4, 0.0, 0.0],
                vec![0.1, -0.3, 0.0, 0.0],
            ]))
            .unwrap();

        let loss = head.loss(emissions_var.as_tensor(), &[0, 1]).unwrap();
        let grads = loss.backward().unwrap();
        let grad = grads.get(emissions_var.as_tensor());
        assert!(grad.is_some(), "no gradient flowed into the emission scores");
    }

    #[test]
    fn greedy_mode_dispatch() {
        let (head, _varmap) = test_head(&["A", "B"], InferenceMode::Greedy);
        let emissions = emissions_tensor(&[
            vec![0.1, 0.9, -1.0, -1.0],
            vec![0.8, 0.2, -1.0, -1.0],
        ]);
        assert_eq!(head.decode(&emissions).unwrap(), vec![1, 0]);
    }

    #[test]
    fn gold_length_mismatch_is_rejected() {
        let (head, _varmap) = test_head(&["A", "B"], InferenceMode::Viterbi);
        let emissions = emissions_tensor(&[vec![0.0; 4], vec![0.0; 4]]);
        assert!(head.sentence_score(&emissions, &[0]).is_err());
    }

    #[test]
    fn empty_sentence_is_rejected() {
        let (head, _varmap) = test_head(&["A", "B"], InferenceMode::Viterbi);
        let empty = Tensor::zeros((0, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(head.partition(&empty).is_err());
    }
}
