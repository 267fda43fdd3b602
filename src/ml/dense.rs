//! p_up model inference.
//!
//! The predictor ships as a small dense network exported to JSON by the
//! external training pipeline. A model file commits to the feature
//! contract it was trained against — the vector width and the feature-set
//! version from `indicators::features` — and loading fails fast on any
//! mismatch so the caller can fall back to the rule score instead of
//! silently feeding a stale model.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HelixError, Result};
use crate::indicators::{FEATURE_DIM, FEATURE_SET_VERSION};

use super::sigmoid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

/// z-score normalization fitted at training time, applied to the feature
/// vector before the first layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Normalization {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.mean.len() != FEATURE_DIM || self.std.len() != FEATURE_DIM {
            return Err(format!(
                "normalization vectors must have length {FEATURE_DIM}, got mean {} / std {}",
                self.mean.len(),
                self.std.len()
            ));
        }
        if self.std.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err("normalization std must be finite and > 0".to_string());
        }
        Ok(())
    }

    fn apply(&self, features: &mut [f64]) {
        for (value, (mean, std)) in features.iter_mut().zip(self.mean.iter().zip(&self.std)) {
            *value = (*value - mean) / std.max(1e-12);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn validate(&self, idx: usize, expected_in: usize) -> std::result::Result<(), String> {
        if self.out_dim() == 0 {
            return Err(format!("layer[{idx}] out_dim must be > 0"));
        }
        if self.bias.len() != self.out_dim() {
            return Err(format!(
                "layer[{idx}] bias len {} != out_dim {}",
                self.bias.len(),
                self.out_dim()
            ));
        }
        for (r, row) in self.weights.iter().enumerate() {
            if row.len() != expected_in {
                return Err(format!(
                    "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                    row.len()
                ));
            }
        }
        let finite = self
            .weights
            .iter()
            .flatten()
            .chain(&self.bias)
            .all(|v| v.is_finite());
        if !finite {
            return Err(format!("layer[{idx}] contains non-finite parameters"));
        }
        Ok(())
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| {
                let sum = bias + row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>();
                match self.activation {
                    Activation::Linear => sum,
                    Activation::Relu => sum.max(0.0),
                    Activation::Tanh => sum.tanh(),
                    Activation::Sigmoid => sigmoid(sum),
                }
            })
            .collect()
    }
}

/// Probability-of-up network plus the feature contract it was trained
/// against. The single output of the last layer is read as p_up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PupModel {
    /// Feature-set version at training time; must equal the extractor's
    /// current [`FEATURE_SET_VERSION`]
    pub feature_set_version: u32,
    /// Declared input width; must equal [`FEATURE_DIM`]
    pub feature_dim: usize,
    #[serde(default)]
    pub normalization: Option<Normalization>,
    pub layers: Vec<DenseLayer>,
    /// Training provenance (run id, data range, ...), carried for logs only
    #[serde(default)]
    pub trained_by: Option<String>,
}

impl PupModel {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let model: Self = serde_json::from_str(&content)?;
        model.validate().map_err(HelixError::Validation)?;
        Ok(model)
    }

    /// Check the feature contract and every layer shape.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.feature_set_version != FEATURE_SET_VERSION {
            return Err(format!(
                "model trained against feature set v{}, extractor is v{FEATURE_SET_VERSION}",
                self.feature_set_version
            ));
        }
        if self.feature_dim != FEATURE_DIM {
            return Err(format!(
                "model declares {} inputs, feature vector has {FEATURE_DIM}",
                self.feature_dim
            ));
        }
        if let Some(normalization) = &self.normalization {
            normalization.validate()?;
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }

        let mut expected_in = self.feature_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            layer.validate(idx, expected_in)?;
            expected_in = layer.out_dim();
        }
        if expected_in != 1 {
            return Err(format!(
                "last layer must emit a single p_up, got out_dim {expected_in}"
            ));
        }
        Ok(())
    }

    /// Run the feature vector through the network and read p_up.
    pub fn p_up(&self, features: &[f64]) -> Result<f64> {
        if features.len() != FEATURE_DIM {
            return Err(HelixError::Predictor(format!(
                "feature vector has {} values, model expects {FEATURE_DIM}",
                features.len()
            )));
        }

        let mut x = features.to_vec();
        if let Some(normalization) = &self.normalization {
            normalization.apply(&mut x);
        }
        for layer in &self.layers {
            x = layer.forward(&x);
        }

        let raw = x[0];
        if !raw.is_finite() {
            return Err(HelixError::Predictor(
                "model produced a non-finite p_up".to_string(),
            ));
        }
        Ok(raw.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-layer model reading only the first feature
    fn tiny_model(weight0: f64, activation: Activation) -> PupModel {
        let mut row = vec![0.0; FEATURE_DIM];
        row[0] = weight0;
        PupModel {
            feature_set_version: FEATURE_SET_VERSION,
            feature_dim: FEATURE_DIM,
            normalization: None,
            layers: vec![DenseLayer {
                weights: vec![row],
                bias: vec![0.0],
                activation,
            }],
            trained_by: None,
        }
    }

    fn zero_features() -> Vec<f64> {
        vec![0.0; FEATURE_DIM]
    }

    #[test]
    fn sigmoid_output_centers_at_half() {
        let model = tiny_model(1.0, Activation::Sigmoid);
        model.validate().unwrap();

        let neutral = model.p_up(&zero_features()).unwrap();
        assert!((neutral - 0.5).abs() < 1e-12);

        let mut up = zero_features();
        up[0] = 1.0;
        assert!(model.p_up(&up).unwrap() > 0.5);

        let mut down = zero_features();
        down[0] = -1.0;
        assert!(model.p_up(&down).unwrap() < 0.5);
    }

    #[test]
    fn stale_feature_set_version_is_rejected() {
        let mut model = tiny_model(1.0, Activation::Sigmoid);
        model.feature_set_version = FEATURE_SET_VERSION - 1;
        let err = model.validate().unwrap_err();
        assert!(err.contains("feature set"));
    }

    #[test]
    fn wrong_feature_dim_is_rejected() {
        let mut model = tiny_model(1.0, Activation::Sigmoid);
        model.feature_dim = FEATURE_DIM + 1;
        assert!(model.validate().is_err());
    }

    #[test]
    fn layer_shape_mismatch_is_rejected() {
        let mut model = tiny_model(1.0, Activation::Linear);
        model.layers[0].weights[0].pop();
        assert!(model.validate().is_err());

        let mut model = tiny_model(1.0, Activation::Linear);
        model.layers[0].bias.push(0.0);
        assert!(model.validate().is_err());
    }

    #[test]
    fn multi_output_last_layer_is_rejected() {
        let mut model = tiny_model(1.0, Activation::Linear);
        let row = model.layers[0].weights[0].clone();
        model.layers[0].weights.push(row);
        model.layers[0].bias.push(0.0);
        assert!(model.validate().is_err());
    }

    #[test]
    fn normalization_is_applied_before_the_first_layer() {
        let mut model = tiny_model(1.0, Activation::Linear);
        model.normalization = Some(Normalization {
            mean: vec![10.0; FEATURE_DIM],
            std: vec![2.0; FEATURE_DIM],
        });
        model.validate().unwrap();

        let mut features = zero_features();
        features[0] = 12.0;
        // Other features normalize to −5 but carry zero weight
        let p = model.p_up(&features).unwrap();
        assert!((p - 1.0).abs() < 1e-12, "z-scored input should be exactly 1");
    }

    #[test]
    fn mismatched_input_length_is_a_predictor_error() {
        let model = tiny_model(1.0, Activation::Sigmoid);
        let err = model.p_up(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, HelixError::Predictor(_)));
    }

    #[test]
    fn output_is_clamped_to_probability_range() {
        // Linear head can overshoot; p_up never leaves [0, 1]
        let model = tiny_model(100.0, Activation::Linear);
        let mut features = zero_features();
        features[0] = 1.0;
        assert_eq!(model.p_up(&features).unwrap(), 1.0);
        features[0] = -1.0;
        assert_eq!(model.p_up(&features).unwrap(), 0.0);
    }
}
