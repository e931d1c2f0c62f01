//! Per-keyword sliding-window classification.

pub mod arbiter;

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{HarkError, Result};
use crate::inference::{ModelHandle, Tensor, TensorMap};
use crate::{EMBEDDING_DIM, SCORE_HISTORY};

/// One registered trigger phrase: its classifier plus the fixed-length ring
/// of the most recent embedding vectors it scores over.
pub struct KeywordDetector {
    keyword: String,
    classifier: ModelHandle,
    input_name: String,
    output_name: String,
    window_size: usize,
    /// Always exactly `window_size` entries, oldest first. Zero-initialised.
    history: VecDeque<Vec<f32>>,
    /// Bounded rolling score history for diagnostics and offline peak
    /// scoring. Always exactly `SCORE_HISTORY` entries.
    scores: VecDeque<f32>,
}

impl KeywordDetector {
    /// Build a detector for `keyword`.
    ///
    /// The classifier window size is read from the model's declared input
    /// shape (second dimension); models with a dynamic length fall back to
    /// `default_window_size`.
    pub fn new(
        keyword: String,
        classifier: ModelHandle,
        default_window_size: usize,
    ) -> Result<Self> {
        let inputs = classifier.input_info();
        let input_name = inputs
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "input".to_string());
        let output_name = classifier
            .output_info()
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "output".to_string());

        let window_size = inputs
            .first()
            .and_then(|p| p.dim(1))
            .filter(|&n| n >= 1)
            .unwrap_or(default_window_size);
        if window_size == 0 {
            return Err(HarkError::Session(format!(
                "keyword \"{keyword}\" resolved a zero-length window"
            )));
        }

        let history = (0..window_size).map(|_| vec![0.0; EMBEDDING_DIM]).collect();
        let scores = (0..SCORE_HISTORY).map(|_| 0.0).collect();

        Ok(Self {
            keyword,
            classifier,
            input_name,
            output_name,
            window_size,
            history,
            scores,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Push one embedding vector (dropping the oldest), score the current
    /// window, and record the score.
    pub fn observe(&mut self, embedding: &[f32]) -> Result<f32> {
        self.history.pop_front();
        self.history.push_back(embedding.to_vec());

        let mut flattened = Vec::with_capacity(self.window_size * EMBEDDING_DIM);
        for entry in &self.history {
            flattened.extend_from_slice(entry);
        }

        let mut inputs = TensorMap::new();
        inputs.insert(
            self.input_name.clone(),
            Tensor::f32(vec![1, self.window_size, EMBEDDING_DIM], flattened),
        );
        let output = self.classifier.run_for(inputs, &self.output_name)?;
        let score = output
            .as_f32()
            .and_then(|d| d.first().copied())
            .ok_or_else(|| {
                HarkError::Inference(format!(
                    "classifier for \"{}\" produced no score",
                    self.keyword
                ))
            })?;

        self.scores.pop_front();
        self.scores.push_back(score);
        debug!(keyword = %self.keyword, score, "keyword scored");
        Ok(score)
    }

    pub fn latest_score(&self) -> f32 {
        self.scores.back().copied().unwrap_or(0.0)
    }

    /// Rolling score history, oldest first.
    pub fn scores(&self) -> impl Iterator<Item = f32> + '_ {
        self.scores.iter().copied()
    }

    /// Zero the embedding ring and score history without replacing the
    /// classifier.
    pub fn reset(&mut self) {
        for entry in &mut self.history {
            entry.iter_mut().for_each(|v| *v = 0.0);
        }
        self.scores.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::ScriptedModel;
    use crate::inference::TensorInfo;

    fn detector_with_scores(scores: Vec<f32>) -> KeywordDetector {
        let model = ScriptedModel::scalar_sequence("output", scores);
        KeywordDetector::new("alexa".into(), ModelHandle::new(model), 16).unwrap()
    }

    #[test]
    fn window_size_read_from_declared_input_shape() {
        let model = ScriptedModel::scalar_sequence("output", vec![0.0])
            .with_inputs(vec![TensorInfo::new("x", vec![Some(1), Some(24), Some(96)])]);
        let det = KeywordDetector::new("alexa".into(), ModelHandle::new(model), 16).unwrap();
        assert_eq!(det.window_size(), 24);
        assert_eq!(det.history.len(), 24);
    }

    #[test]
    fn dynamic_input_shape_falls_back_to_default() {
        let model = ScriptedModel::scalar_sequence("output", vec![0.0])
            .with_inputs(vec![TensorInfo::new("x", vec![Some(1), None, Some(96)])]);
        let det = KeywordDetector::new("alexa".into(), ModelHandle::new(model), 16).unwrap();
        assert_eq!(det.window_size(), 16);
    }

    #[test]
    fn history_length_is_invariant_across_observations() {
        let mut det = detector_with_scores(vec![0.1; 4]);
        for i in 0..100 {
            det.observe(&vec![i as f32; EMBEDDING_DIM]).unwrap();
            assert_eq!(det.history.len(), det.window_size());
            assert_eq!(det.scores.len(), SCORE_HISTORY);
        }
        // Newest embedding sits at the tail.
        assert_eq!(det.history.back().unwrap()[0], 99.0);
    }

    #[test]
    fn scores_ring_records_latest() {
        let mut det = detector_with_scores(vec![0.1, 0.9]);
        det.observe(&vec![0.0; EMBEDDING_DIM]).unwrap();
        assert_eq!(det.latest_score(), 0.1);
        det.observe(&vec![0.0; EMBEDDING_DIM]).unwrap();
        assert_eq!(det.latest_score(), 0.9);
        assert_eq!(det.scores().count(), SCORE_HISTORY);
    }

    #[test]
    fn reset_zeroes_rings_but_keeps_sizes() {
        let mut det = detector_with_scores(vec![0.8]);
        det.observe(&vec![1.0; EMBEDDING_DIM]).unwrap();
        det.reset();
        assert_eq!(det.history.len(), det.window_size());
        assert_eq!(det.scores.len(), SCORE_HISTORY);
        assert_eq!(det.latest_score(), 0.0);
        assert!(det.history.iter().all(|e| e.iter().all(|&v| v == 0.0)));
    }
}
