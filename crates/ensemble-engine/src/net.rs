//! Small feed-forward network mapping a feature vector to model weights.
//!
//! Dense(64) + batch norm + ReLU + dropout(0.3), Dense(32) + batch norm +
//! ReLU + dropout(0.2), Dense(8), softmax. Training runs sample-at-a-time,
//! so the norm layers keep running statistics (momentum-updated during
//! training, frozen at inference) with a learnable affine, and dropout masks
//! come from a seeded RNG so a retrain over the same history reproduces the
//! same snapshot. Inference always runs in eval mode: dropout off,
//! normalisation using the stored statistics, same input, same weights.
//! Snapshots are immutable; replacement is a pointer swap in the runtime
//! registry.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use valuation_core::types::MODEL_COUNT;

const HIDDEN_1: usize = 64;
const HIDDEN_2: usize = 32;
const NORM_EPS: f64 = 1e-5;
/// Momentum for the running normalisation statistics.
const NORM_MOMENTUM: f64 = 0.1;
const DROPOUT_1: f64 = 0.3;
const DROPOUT_2: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    /// Row-major (out, in).
    weights: Vec<f64>,
    bias: Vec<f64>,
    inputs: usize,
    outputs: usize,
}

impl Dense {
    fn new_seeded(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        // Xavier-uniform initialisation.
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self { weights, bias: vec![0.0; outputs], inputs, outputs }
    }

    fn matrix(&self) -> Array2<f64> {
        Array2::from_shape_vec((self.outputs, self.inputs), self.weights.clone())
            .unwrap_or_else(|_| Array2::zeros((self.outputs, self.inputs)))
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matrix().dot(x) + Array1::from_vec(self.bias.clone())
    }
}

/// Per-feature normalisation with running statistics and a learnable
/// affine.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Norm {
    gamma: Vec<f64>,
    beta: Vec<f64>,
    mean: Vec<f64>,
    variance: Vec<f64>,
}

impl Norm {
    fn identity(size: usize) -> Self {
        Self {
            gamma: vec![1.0; size],
            beta: vec![0.0; size],
            mean: vec![0.0; size],
            variance: vec![1.0; size],
        }
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(x.iter().enumerate().map(|(i, v)| {
            let normalised = (v - self.mean[i]) / (self.variance[i] + NORM_EPS).sqrt();
            self.gamma[i] * normalised + self.beta[i]
        }))
    }

    /// Fold a training activation into the running statistics.
    fn observe(&mut self, z: &Array1<f64>) {
        for (i, value) in z.iter().enumerate() {
            let delta = value - self.mean[i];
            self.mean[i] += NORM_MOMENTUM * delta;
            self.variance[i] =
                (1.0 - NORM_MOMENTUM) * self.variance[i] + NORM_MOMENTUM * delta * delta;
        }
    }

    /// Backprop through the affine: updates gamma/beta against the
    /// normalised activation and returns the gradient for the dense layer
    /// below. The running statistics are treated as constants here; they
    /// move via `observe`.
    fn backward(&mut self, upstream: &Array1<f64>, z: &Array1<f64>, lr: f64) -> Array1<f64> {
        let mut downstream = Array1::zeros(upstream.len());
        for i in 0..upstream.len() {
            let inv_std = 1.0 / (self.variance[i] + NORM_EPS).sqrt();
            let normalised = (z[i] - self.mean[i]) * inv_std;
            let g = upstream[i];
            downstream[i] = g * self.gamma[i] * inv_std;
            self.gamma[i] -= lr * g * normalised;
            self.beta[i] -= lr * g;
        }
        downstream
    }
}

fn relu(x: Array1<f64>) -> Array1<f64> {
    x.mapv(|v| v.max(0.0))
}

fn softmax(x: &Array1<f64>) -> Array1<f64> {
    let max = x.fold(f64::NEG_INFINITY, |a, b| a.max(*b));
    let exp = x.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    if sum <= 0.0 {
        Array1::from_elem(x.len(), 1.0 / x.len() as f64)
    } else {
        exp / sum
    }
}

/// Inverted dropout: zero a unit with probability `rate`, scale survivors by
/// 1/keep so the expected activation is unchanged. Returns the masked
/// activation and the mask for the backward pass.
fn dropout(x: Array1<f64>, rate: f64, rng: &mut StdRng) -> (Array1<f64>, Array1<f64>) {
    let keep = 1.0 - rate;
    let mask = Array1::from_iter(
        (0..x.len()).map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 }),
    );
    (&x * &mask, mask)
}

/// Immutable network snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightNet {
    fc1: Dense,
    norm1: Norm,
    fc2: Dense,
    norm2: Norm,
    fc3: Dense,
    pub input_dim: usize,
    /// Seed for parameter init and the training dropout masks.
    seed: u64,
}

impl WeightNet {
    /// Fresh network with seeded initialisation; same seed, same parameters.
    pub fn new_seeded(input_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            fc1: Dense::new_seeded(input_dim, HIDDEN_1, &mut rng),
            norm1: Norm::identity(HIDDEN_1),
            fc2: Dense::new_seeded(HIDDEN_1, HIDDEN_2, &mut rng),
            norm2: Norm::identity(HIDDEN_2),
            fc3: Dense::new_seeded(HIDDEN_2, MODEL_COUNT, &mut rng),
            input_dim,
            seed,
        }
    }

    fn sanitise(&self, features: &[f64]) -> Array1<f64> {
        let mut input = vec![0.0; self.input_dim];
        for (slot, value) in input.iter_mut().zip(features.iter()) {
            *slot = if value.is_finite() { *value } else { 0.0 };
        }
        Array1::from_vec(input)
    }

    /// Eval-mode forward pass; returns softmax weights over the models.
    /// Dropout is off and the norm layers use their stored statistics.
    pub fn forward(&self, features: &[f64]) -> [f64; MODEL_COUNT] {
        let x = self.sanitise(features);

        let h1 = relu(self.norm1.forward(&self.fc1.forward(&x)));
        let h2 = relu(self.norm2.forward(&self.fc2.forward(&h1)));
        let out = softmax(&self.fc3.forward(&h2));

        let mut weights = [0.0; MODEL_COUNT];
        for (slot, value) in weights.iter_mut().zip(out.iter()) {
            *slot = *value;
        }
        weights
    }

    /// Mean-squared-error training against target weight vectors.
    ///
    /// Per-sample SGD in fixed order, dropout masks from the seeded RNG,
    /// running statistics updated as activations flow through; the whole
    /// run is reproducible for a fixed seed and sample set. Returns the
    /// final epoch loss.
    pub fn train(
        &mut self,
        samples: &[(Vec<f64>, [f64; MODEL_COUNT])],
        epochs: usize,
        learning_rate: f64,
    ) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));
        let mut last_loss = 0.0;

        for _ in 0..epochs {
            last_loss = 0.0;
            for (features, target) in samples {
                last_loss += self.backward_step(features, target, learning_rate, &mut rng);
            }
            last_loss /= samples.len() as f64;
        }
        last_loss
    }

    /// One SGD step in train mode; returns the sample loss.
    fn backward_step(
        &mut self,
        features: &[f64],
        target: &[f64; MODEL_COUNT],
        lr: f64,
        rng: &mut StdRng,
    ) -> f64 {
        let x = self.sanitise(features);

        // Forward in train mode, keeping intermediates.
        let z1 = self.fc1.forward(&x);
        self.norm1.observe(&z1);
        let n1 = self.norm1.forward(&z1);
        let (a1, mask1) = dropout(relu(n1.clone()), DROPOUT_1, rng);

        let z2 = self.fc2.forward(&a1);
        self.norm2.observe(&z2);
        let n2 = self.norm2.forward(&z2);
        let (a2, mask2) = dropout(relu(n2.clone()), DROPOUT_2, rng);

        let z3 = self.fc3.forward(&a2);
        let s = softmax(&z3);

        let y = Array1::from_vec(target.to_vec());
        let diff = &s - &y;
        let loss = diff.mapv(|d| d * d).sum() / MODEL_COUNT as f64;

        // dL/ds then through softmax: dz_i = s_i (g_i - sum_j g_j s_j).
        let g = diff.mapv(|d| 2.0 * d / MODEL_COUNT as f64);
        let weighted: f64 = g.iter().zip(s.iter()).map(|(gi, si)| gi * si).sum();
        let dz3 = Array1::from_iter(s.iter().zip(g.iter()).map(|(si, gi)| si * (gi - weighted)));

        // fc3 grads, then back through dropout, relu and the norm.
        let w3 = self.fc3.matrix();
        let da2 = w3.t().dot(&dz3);
        apply_dense_grads(&mut self.fc3, &dz3, &a2, lr);

        let da2 = &da2 * &mask2;
        let dn2 = Array1::from_iter(
            da2.iter()
                .zip(n2.iter())
                .map(|(d, n)| if *n > 0.0 { *d } else { 0.0 }),
        );
        let dz2 = self.norm2.backward(&dn2, &z2, lr);
        let w2 = self.fc2.matrix();
        let da1 = w2.t().dot(&dz2);
        apply_dense_grads(&mut self.fc2, &dz2, &a1, lr);

        let da1 = &da1 * &mask1;
        let dn1 = Array1::from_iter(
            da1.iter()
                .zip(n1.iter())
                .map(|(d, n)| if *n > 0.0 { *d } else { 0.0 }),
        );
        let dz1 = self.norm1.backward(&dn1, &z1, lr);
        apply_dense_grads(&mut self.fc1, &dz1, &x, lr);

        loss
    }
}

fn apply_dense_grads(layer: &mut Dense, dz: &Array1<f64>, input: &Array1<f64>, lr: f64) {
    for out in 0..layer.outputs {
        for inp in 0..layer.inputs {
            layer.weights[out * layer.inputs + inp] -= lr * dz[out] * input[inp];
        }
        layer.bias[out] -= lr * dz[out];
    }
}
