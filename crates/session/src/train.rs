use ndarray::Axis;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tinyflow_core::{node::NodeId, tensor::Tensor};

use crate::{interpreter::Session, SessionError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seed of the minibatch sampler.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 11,
            learning_rate: 1e-2,
            seed: 0,
        }
    }
}

impl TrainConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Feature rows and their targets. Row `i` of `features` belongs to row `i` of `targets`.
#[derive(Debug, Clone)]
pub struct Samples {
    features: Tensor,
    targets: Tensor,
}

impl Samples {
    pub fn new(features: Tensor, targets: Tensor) -> Result<Self, SessionError> {
        let rows = features.shape().first().copied();
        if rows.is_none() || rows != targets.shape().first().copied() {
            return Err(SessionError::ShapeMismatch {
                op: "Samples",
                expected: features.shape().to_vec(),
                actual: targets.shape().to_vec(),
            });
        }
        Ok(Self { features, targets })
    }

    pub fn rows(&self) -> usize {
        self.features.shape()[0]
    }

    pub fn features(&self) -> &Tensor {
        &self.features
    }

    pub fn targets(&self) -> &Tensor {
        &self.targets
    }

    /// Draws `n` rows uniformly with replacement.
    pub fn resample<R: Rng>(&self, n: usize, rng: &mut R) -> Samples {
        let rows = self.rows();
        let indices = (0..n).map(|_| rng.gen_range(0..rows)).collect::<Vec<_>>();
        Samples {
            features: self.features.select(Axis(0), &indices),
            targets: self.targets.select(Axis(0), &indices),
        }
    }
}

/// Scales every column of a `(rows, features)` matrix to zero mean and unit variance.
/// Constant columns are only centered.
pub fn standardize(features: &Tensor) -> Result<Tensor, SessionError> {
    let x = features
        .view()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|_| SessionError::Rank {
            op: "standardize",
            expected: 2,
            actual: features.shape().to_vec(),
        })?;
    let mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| SessionError::EmptyBatch("standardize".into()))?;
    let std = x
        .std_axis(Axis(0), 0.)
        .mapv(|s| if s > 0. { s } else { 1. });
    Ok(((&x - &mean) / &std).into_dyn())
}

/// Minibatch SGD over a session whose graph reads features from `x` and targets from `y`.
pub struct Trainer {
    config: TrainConfig,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Trains `trainables` and returns the average loss of every epoch.
    pub fn fit(
        &mut self,
        session: &mut Session,
        x: NodeId,
        y: NodeId,
        samples: &Samples,
        trainables: &[NodeId],
    ) -> Result<Vec<f64>, SessionError> {
        let TrainConfig {
            epochs,
            batch_size,
            learning_rate,
            ..
        } = self.config;
        if batch_size == 0 {
            return Err(SessionError::EmptyBatch("Trainer".into()));
        }
        let steps_per_epoch = samples.rows() / batch_size;
        if steps_per_epoch == 0 {
            return Err(SessionError::Message(
                format!(
                    "{} samples cannot fill a batch of {}",
                    samples.rows(),
                    batch_size
                )
                .into(),
            ));
        }

        log::info!(
            "Training on {} samples: {} epochs of {} steps",
            samples.rows(),
            epochs,
            steps_per_epoch
        );

        let mut total_loss = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let mut loss = 0.;
            for _ in 0..steps_per_epoch {
                let batch = samples.resample(batch_size, &mut self.rng);
                session.feed(x, batch.features)?;
                session.feed(y, batch.targets)?;
                session.forward_and_backward()?;
                session.sgd_update(trainables, learning_rate)?;
                loss += session.loss()?;
            }
            let loss = loss / steps_per_epoch as f64;
            log::debug!("Epoch {}/{}: loss {:.6}", epoch + 1, epochs, loss);
            total_loss.push(loss);
        }

        Ok(total_loss)
    }
}
