//! Fully connected neural network estimator.
//!
//! ```text
//! Input (D) → [Linear → ReLU]* → Linear(classes) → Softmax
//! ```
//!
//! Weights are stored in the ensemble artifact as plain row-major matrices
//! and materialised as candle tensors when the network is built.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use stackguard_core::{Result, StackGuardError};

use super::{check_input, EstimatorKind, ProbabilityEstimator};
use crate::sparse::SparseVector;

/// Trained parameters of one dense layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `out × in` weight matrix.
    pub weights: Vec<Vec<f32>>,
    /// One bias per output unit.
    pub bias: Vec<f32>,
}

impl DenseLayer {
    fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn in_dim(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NeuralNetworkParams {
    layers: Vec<DenseLayer>,
}

/// Multi-layer perceptron with ReLU hidden activations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "NeuralNetworkParams", into = "NeuralNetworkParams")]
pub struct NeuralNetwork {
    params: Vec<DenseLayer>,
    linears: Vec<candle_nn::Linear>,
    device: Device,
}

impl NeuralNetwork {
    /// Build a network on the CPU from trained layer parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] if the layer shapes do not
    /// chain, or [`StackGuardError::Inference`] if a tensor cannot be created.
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self> {
        Self::on_device(layers, &Device::Cpu)
    }

    /// Build a network on a specific candle device.
    pub fn on_device(layers: Vec<DenseLayer>, device: &Device) -> Result<Self> {
        validate_layers(&layers)?;

        let linears = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let flat: Vec<f32> = layer.weights.iter().flatten().copied().collect();
                let weight = Tensor::from_vec(flat, (layer.out_dim(), layer.in_dim()), device)
                    .map_err(|e| {
                        StackGuardError::Inference(format!("Failed to build layer {i} weights: {e}"))
                    })?;
                let bias = Tensor::from_vec(layer.bias.clone(), layer.out_dim(), device).map_err(
                    |e| StackGuardError::Inference(format!("Failed to build layer {i} bias: {e}")),
                )?;
                Ok(candle_nn::Linear::new(weight, Some(bias)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params: layers,
            linears,
            device: device.clone(),
        })
    }
}

fn validate_layers(layers: &[DenseLayer]) -> Result<()> {
    let Some(first) = layers.first() else {
        return Err(StackGuardError::MalformedModel(
            "neural network has no layers".to_string(),
        ));
    };
    if first.in_dim() == 0 {
        return Err(StackGuardError::MalformedModel(
            "neural network input width is zero".to_string(),
        ));
    }

    let mut expected_in = first.in_dim();
    for (i, layer) in layers.iter().enumerate() {
        if layer.out_dim() == 0 || layer.bias.len() != layer.out_dim() {
            return Err(StackGuardError::MalformedModel(format!(
                "layer {i} has {} weight rows and {} biases",
                layer.out_dim(),
                layer.bias.len()
            )));
        }
        if layer.weights.iter().any(|row| row.len() != expected_in) {
            return Err(StackGuardError::MalformedModel(format!(
                "layer {i} expects input width {expected_in}"
            )));
        }
        expected_in = layer.out_dim();
    }

    if expected_in < 2 {
        return Err(StackGuardError::MalformedModel(format!(
            "neural network output layer has {expected_in} units, need at least 2"
        )));
    }
    Ok(())
}

impl ProbabilityEstimator for NeuralNetwork {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::NeuralNetwork
    }

    fn n_features(&self) -> usize {
        self.params.first().map_or(0, DenseLayer::in_dim)
    }

    fn n_classes(&self) -> usize {
        self.params.last().map_or(0, DenseLayer::out_dim)
    }

    fn predict_proba(&self, x: &SparseVector) -> Result<Vec<f32>> {
        check_input(self.kind(), self.n_features(), x)?;

        // Shape [1, n_features] for the linear layers.
        let mut hidden = Tensor::from_vec(x.to_dense(), (1, self.n_features()), &self.device)
            .map_err(|e| StackGuardError::Inference(format!("Failed to create input tensor: {e}")))?;

        let last = self.linears.len() - 1;
        for (i, linear) in self.linears.iter().enumerate() {
            hidden = candle_nn::Module::forward(linear, &hidden).map_err(|e| {
                StackGuardError::Inference(format!("Layer {i} forward failed: {e}"))
            })?;
            if i < last {
                hidden = hidden
                    .relu()
                    .map_err(|e| StackGuardError::Inference(format!("Layer {i} ReLU failed: {e}")))?;
            }
        }

        let probs = candle_nn::ops::softmax(&hidden, candle_core::D::Minus1)
            .map_err(|e| StackGuardError::Inference(format!("Softmax failed: {e}")))?;

        probs.squeeze(0).and_then(|t| t.to_vec1::<f32>()).map_err(|e| {
            StackGuardError::Inference(format!("Failed to extract probabilities: {e}"))
        })
    }
}

impl TryFrom<NeuralNetworkParams> for NeuralNetwork {
    type Error = StackGuardError;

    fn try_from(params: NeuralNetworkParams) -> Result<Self> {
        Self::new(params.layers)
    }
}

impl From<NeuralNetwork> for NeuralNetworkParams {
    fn from(network: NeuralNetwork) -> Self {
        Self {
            layers: network.params,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// 2 inputs → 2 hidden (identity) → 2 outputs.
    fn network() -> NeuralNetwork {
        NeuralNetwork::new(vec![
            DenseLayer {
                weights: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                bias: vec![0.0, 0.0],
            },
            DenseLayer {
                weights: vec![vec![2.0, 0.0], vec![0.0, 2.0]],
                bias: vec![0.0, 0.0],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_forward_produces_probabilities() {
        let nn = network();
        assert_eq!(nn.n_features(), 2);
        assert_eq!(nn.n_classes(), 2);
        let p = nn.predict_proba(&SparseVector::from_dense(&[1.0, 0.0])).unwrap();
        // logits [2, 0]
        let expected = 1.0 / (1.0 + (-2.0_f32).exp());
        assert!((p[0] - expected).abs() < 1e-5);
        assert!((p[0] + p[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_relu_clips_negative_hidden_units() {
        let nn = network();
        let p = nn.predict_proba(&SparseVector::from_dense(&[-5.0, 0.0])).unwrap();
        // hidden [0, 0] after ReLU, logits [0, 0]
        assert!((p[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_width_mismatch() {
        let err = network().predict_proba(&SparseVector::zeros(5)).unwrap_err();
        assert_eq!(err.kind(), "shape_mismatch");
    }

    #[test]
    fn test_rejects_unchained_layers() {
        let err = NeuralNetwork::new(vec![
            DenseLayer {
                weights: vec![vec![1.0, 0.0]],
                bias: vec![0.0],
            },
            DenseLayer {
                weights: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
                bias: vec![0.0, 0.0],
            },
        ])
        .unwrap_err();
        assert_eq!(err.kind(), "malformed_model");
    }

    #[test]
    fn test_rejects_empty_network() {
        assert!(NeuralNetwork::new(Vec::new()).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let nn = network();
        let json = serde_json::to_string(&nn).unwrap();
        let restored: NeuralNetwork = serde_json::from_str(&json).unwrap();
        let x = SparseVector::from_dense(&[0.3, 0.7]);
        assert_eq!(nn.predict_proba(&x).unwrap(), restored.predict_proba(&x).unwrap());
    }
}
