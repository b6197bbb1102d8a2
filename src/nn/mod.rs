//! Fixed-topology fully-connected network used as the snake controller.
//!
//! Each layer transition holds a `rows x cols` weight matrix and a bias row.
//! Inference works on row vectors: `h = act(h . W + b)`.
//!
//! The flat parameter vector is every weight matrix in layer order (row-major),
//! followed by every bias row in layer order. The genetic algorithm evolves
//! exactly this vector.

mod activation;
pub mod file;

pub use activation::{Activation, LEAKY_SLOPE};

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Network {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activations: Vec<Activation>,
}

impl Network {
    /// Random network with ReLU hidden layers and a sigmoid output layer.
    /// Weights and biases are drawn uniformly from `[-1, 1]` using `rng`.
    pub fn new<R: Rng>(layers: &[usize], rng: &mut R) -> Result<Self> {
        let activations = Self::default_activations(layers.len().saturating_sub(1));
        Self::with_activations(layers, &activations, rng)
    }

    pub fn with_activations<R: Rng>(
        layers: &[usize],
        activations: &[Activation],
        rng: &mut R,
    ) -> Result<Self> {
        validate(layers, activations)?;
        let mut weights = Vec::with_capacity(layers.len() - 1);
        let mut biases = Vec::with_capacity(layers.len() - 1);
        for pair in layers.windows(2) {
            weights.push(Array2::from_shape_fn((pair[0], pair[1]), |_| {
                rng.gen_range(-1.0..=1.0)
            }));
            biases.push(Array1::from_shape_fn(pair[1], |_| rng.gen_range(-1.0..=1.0)));
        }
        Ok(Self {
            weights,
            biases,
            activations: activations.to_vec(),
        })
    }

    /// Builds a network of the given topology straight from a flat parameter vector.
    pub fn from_parameters(
        layers: &[usize],
        activations: &[Activation],
        parameters: &[f64],
    ) -> Result<Self> {
        let mut net = Self::zeroed(layers, activations)?;
        net.deserialize_all_parameters(parameters)?;
        Ok(net)
    }

    fn zeroed(layers: &[usize], activations: &[Activation]) -> Result<Self> {
        validate(layers, activations)?;
        Ok(Self {
            weights: layers
                .windows(2)
                .map(|p| Array2::zeros((p[0], p[1])))
                .collect(),
            biases: layers.windows(2).map(|p| Array1::zeros(p[1])).collect(),
            activations: activations.to_vec(),
        })
    }

    pub fn default_activations(transitions: usize) -> Vec<Activation> {
        let mut acts = vec![Activation::Relu; transitions.saturating_sub(1)];
        if transitions > 0 {
            acts.push(Activation::Sigmoid);
        }
        acts
    }

    /// Length of the flat parameter vector for a topology.
    pub fn parameter_count_for(layers: &[usize]) -> usize {
        layers.windows(2).map(|p| p[0] * p[1] + p[1]).sum()
    }

    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.weights.len() + 1);
        sizes.push(self.weights[0].nrows());
        sizes.extend(self.weights.iter().map(|w| w.ncols()));
        sizes
    }

    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    pub fn input_size(&self) -> usize {
        self.weights[0].nrows()
    }

    pub fn parameter_count(&self) -> usize {
        weight_count(&self.weights) + bias_count(&self.biases)
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_size() {
            return Err(Error::InputLength {
                expected: self.input_size(),
                actual: input.len(),
            });
        }
        let mut h = ArrayView1::from(input).to_owned();
        for ((w, b), act) in self.weights.iter().zip(&self.biases).zip(&self.activations) {
            h = h.dot(w) + b;
            act.apply(&mut h);
        }
        Ok(h.to_vec())
    }

    pub fn serialize_weights(&self) -> Vec<f64> {
        self.weights.iter().flat_map(|w| w.iter().copied()).collect()
    }

    pub fn serialize_biases(&self) -> Vec<f64> {
        self.biases.iter().flat_map(|b| b.iter().copied()).collect()
    }

    pub fn serialize_all_parameters(&self) -> Vec<f64> {
        let mut v = self.serialize_weights();
        v.extend(self.serialize_biases());
        v
    }

    pub fn deserialize_weights(&mut self, values: &[f64]) -> Result<()> {
        check_len(weight_count(&self.weights), values)?;
        fill(self.weights.iter_mut().flat_map(|w| w.iter_mut()), values);
        Ok(())
    }

    pub fn deserialize_biases(&mut self, values: &[f64]) -> Result<()> {
        check_len(bias_count(&self.biases), values)?;
        fill(self.biases.iter_mut().flat_map(|b| b.iter_mut()), values);
        Ok(())
    }

    /// Restores weights then biases. On a length mismatch nothing is modified.
    pub fn deserialize_all_parameters(&mut self, values: &[f64]) -> Result<()> {
        check_len(self.parameter_count(), values)?;
        let (w, b) = values.split_at(weight_count(&self.weights));
        self.deserialize_weights(w)?;
        self.deserialize_biases(b)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        file::save(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        file::load(path)
    }

    pub(crate) fn weights(&self) -> &[Array2<f64>] {
        &self.weights
    }

    pub(crate) fn biases(&self) -> &[Array1<f64>] {
        &self.biases
    }
}

fn validate(layers: &[usize], activations: &[Activation]) -> Result<()> {
    if layers.len() < 3 {
        return Err(Error::InvalidTopology(layers.len()));
    }
    if layers.contains(&0) {
        return Err(Error::ZeroSizedLayer);
    }
    if activations.len() != layers.len() - 1 {
        return Err(Error::ActivationCount {
            expected: layers.len() - 1,
            actual: activations.len(),
        });
    }
    Ok(())
}

fn weight_count(weights: &[Array2<f64>]) -> usize {
    weights.iter().map(|w| w.len()).sum()
}

fn bias_count(biases: &[Array1<f64>]) -> usize {
    biases.iter().map(|b| b.len()).sum()
}

fn check_len(expected: usize, values: &[f64]) -> Result<()> {
    if values.len() != expected {
        return Err(Error::ParameterLength {
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

fn fill<'a>(dst: impl Iterator<Item = &'a mut f64>, src: &[f64]) {
    for (d, s) in dst.zip(src) {
        *d = *s;
    }
}
