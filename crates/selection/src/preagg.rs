//! Pre-aggregation partition selection.
//!
//! Keeps a partition with `n` users with probability `p(n)`, the largest
//! sequence satisfying, for every `n >= 1`,
//!
//! ```text
//! p(n)         <= e^eps * p(n - 1)     + delta
//! 1 - p(n - 1) <= e^eps * (1 - p(n))   + delta
//! ```
//!
//! with `p(0) = 0`. The first constraint binds up to `first_crossover`, the
//! second up to `second_crossover`, after which `p(n) = 1`. Both constraints
//! use the per-partition budget: `eps / k` and `1 - (1 - delta)^(1/k)`.

use partition_selection_core::{PartitionSelectionConfig, Result, ValidatedParameters};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::strategy::PartitionSelectionStrategy;

/// Closed-form optimal partition selection over the true user count.
#[derive(Debug)]
pub struct PreaggPartitionSelection {
    params: ValidatedParameters,
    eps: f64,
    delta: f64,
    first_crossover: i64,
    second_crossover: i64,
    // Keep probability at `first_crossover`, the anchor of the saturation regime.
    crossover_probability: f64,
    rng: ChaCha20Rng,
}

impl PreaggPartitionSelection {
    /// Create a builder.
    pub fn builder() -> PreaggPartitionSelectionBuilder {
        PreaggPartitionSelectionBuilder::new()
    }

    fn new(params: ValidatedParameters, rng: ChaCha20Rng) -> Self {
        let eps = params.per_partition_epsilon();
        let delta = params.per_partition_delta();
        let first_crossover = first_crossover(eps, delta);
        let crossover_probability = growth_probability(first_crossover, eps, delta);
        let second_crossover =
            second_crossover(first_crossover, crossover_probability, eps, delta);
        Self {
            params,
            eps,
            delta,
            first_crossover,
            second_crossover,
            crossover_probability,
            rng,
        }
    }

    /// Last user count at which the growth constraint binds.
    ///
    /// Saturates at `i64::MAX - 1` for budgets so small that the growth
    /// regime never ends within `i64`.
    pub fn first_crossover(&self) -> i64 {
        self.first_crossover
    }

    /// Last user count with a keep probability below one.
    pub fn second_crossover(&self) -> i64 {
        self.second_crossover
    }

    /// Probability that a partition with `num_users` users is kept.
    pub fn probability_of_keep(&self, num_users: i64) -> f64 {
        if num_users <= 0 {
            0.0
        } else if num_users <= self.first_crossover {
            growth_probability(num_users, self.eps, self.delta)
        } else if num_users <= self.second_crossover {
            let m = (num_users - self.first_crossover) as f64;
            // 1 - p(n) = e^(-m eps) (1 - p(n1)) - delta (1 - e^(-m eps)) / (e^eps - 1)
            // delta / (e^eps - 1) goes to 0, not NaN, when e^eps overflows.
            let decay = (-m * self.eps).exp();
            let p = -(-m * self.eps).exp_m1() * (1.0 + self.delta / self.eps.exp_m1())
                + decay * self.crossover_probability;
            p.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Decide whether to keep a partition, drawing from a caller-owned generator.
    ///
    /// Lets a shared instance serve many threads, each with its own `rng`.
    pub fn should_keep_with_rng<R: Rng + ?Sized>(&self, num_users: i64, rng: &mut R) -> bool {
        bernoulli(self.probability_of_keep(num_users), rng)
    }
}

fn bernoulli<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    if p <= 0.0 {
        return false;
    }
    if p >= 1.0 {
        return true;
    }
    rng.gen::<f64>() < p
}

/// `p(n) = delta * (e^(n eps) - 1) / (e^eps - 1)`, evaluated as
/// `delta * e^((n - 1) eps) * (1 - e^(-n eps)) / (1 - e^(-eps))` so that it
/// stays finite for large `eps` and exact as `eps -> 0`.
fn growth_probability(n: i64, eps: f64, delta: f64) -> f64 {
    if n <= 0 {
        return 0.0;
    }
    let n = n as f64;
    let p = delta * ((n - 1.0) * eps).exp() * (-(-n * eps).exp_m1()) / (-(-eps).exp_m1());
    p.clamp(0.0, 1.0)
}

// The growth step stays binding while p(n - 1) <= (1 - delta) / (1 + e^eps),
// i.e. e^((n - 1) eps) - 1 <= (1 - delta) / delta * tanh(eps / 2).
fn first_crossover(eps: f64, delta: f64) -> i64 {
    let decay = (-eps).exp();
    let ratio = (1.0 - delta) / delta * (-(-eps).exp_m1()) / (1.0 + decay);
    // Capped so that `second_crossover` always has room above it.
    floor_to_i64(ratio.ln_1p() / eps)
        .saturating_add(1)
        .min(i64::MAX - 1)
}

// The drop probability reaches zero after m more users, where
// e^(m eps) - 1 <= (1 - p(n1)) (e^eps - 1) / delta. Factoring e^eps out of
// the log gives m <= 1 + ln(1 + (1 - e^(-eps)) ((1 - p(n1)) / delta - 1)) / eps.
fn second_crossover(first: i64, crossover_probability: f64, eps: f64, delta: f64) -> i64 {
    let slack = (1.0 - crossover_probability) / delta - 1.0;
    let steps = floor_to_i64(1.0 + (-(-eps).exp_m1() * slack).ln_1p() / eps).max(1);
    first.saturating_add(steps)
}

fn floor_to_i64(x: f64) -> i64 {
    // `as` saturates on overflow and maps NaN to 0.
    x.floor() as i64
}

impl PartitionSelectionStrategy for PreaggPartitionSelection {
    fn should_keep(&mut self, num_users: i64) -> bool {
        let p = self.probability_of_keep(num_users);
        bernoulli(p, &mut self.rng)
    }

    fn params(&self) -> &ValidatedParameters {
        &self.params
    }
}

/// Builder for [`PreaggPartitionSelection`].
#[derive(Clone, Debug, Default)]
pub struct PreaggPartitionSelectionBuilder {
    config: PartitionSelectionConfig,
    seed: Option<u64>,
}

impl PreaggPartitionSelectionBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: PartitionSelectionConfig) -> Self {
        Self { config, seed: None }
    }

    /// Set epsilon.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config = self.config.with_epsilon(epsilon);
        self
    }

    /// Set delta.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.config = self.config.with_delta(delta);
        self
    }

    /// Set the maximum number of partitions a user can contribute to.
    pub fn with_max_partitions_contributed(mut self, max_partitions_contributed: i64) -> Self {
        self.config = self
            .config
            .with_max_partitions_contributed(max_partitions_contributed);
        self
    }

    /// Seed the internal generator for reproducible decisions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the parameters and derive the crossover points.
    pub fn build(self) -> Result<PreaggPartitionSelection> {
        let params = self.config.validate().map_err(|err| {
            tracing::debug!(target: "partition_selection", error = %err, "preagg_build_rejected");
            err
        })?;
        let rng = match self.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let selection = PreaggPartitionSelection::new(params, rng);
        tracing::debug!(
            target: "partition_selection",
            epsilon = params.epsilon(),
            delta = params.delta(),
            max_partitions_contributed = params.max_partitions_contributed(),
            first_crossover = selection.first_crossover,
            second_crossover = selection.second_crossover,
            "preagg_built"
        );
        Ok(selection)
    }
}
