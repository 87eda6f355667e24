//! Privacy parameters shared by every partition selection strategy.

use crate::error::{Result, SelectionError};

/// Unvalidated privacy parameters, as supplied by a caller.
///
/// Every field is optional; [`PartitionSelectionConfig::validate`] turns the
/// struct into [`ValidatedParameters`] or reports the first rule it breaks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PartitionSelectionConfig {
    /// Privacy loss bound.
    pub epsilon: Option<f64>,
    /// Failure probability bound.
    pub delta: Option<f64>,
    /// Maximum number of distinct partitions a single user may contribute to.
    pub max_partitions_contributed: Option<i64>,
}

impl PartitionSelectionConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set epsilon.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }

    /// Set delta.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Set the maximum number of partitions a user can contribute to.
    pub fn with_max_partitions_contributed(mut self, max_partitions_contributed: i64) -> Self {
        self.max_partitions_contributed = Some(max_partitions_contributed);
        self
    }

    /// Validate the configuration. The first failing rule wins.
    pub fn validate(&self) -> Result<ValidatedParameters> {
        let epsilon = validate_epsilon(self.epsilon)?;
        let delta = validate_delta(self.delta)?;
        let max_partitions_contributed =
            validate_max_partitions_contributed(self.max_partitions_contributed)?;
        Ok(ValidatedParameters {
            epsilon,
            delta,
            max_partitions_contributed,
        })
    }
}

/// Privacy parameters that passed validation.
///
/// Only obtainable through [`PartitionSelectionConfig::validate`], so holding
/// one proves `epsilon` is finite and positive, `delta` lies in `(0, 1)` and
/// `max_partitions_contributed` is positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidatedParameters {
    epsilon: f64,
    delta: f64,
    max_partitions_contributed: i64,
}

impl ValidatedParameters {
    /// Epsilon.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Delta.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Maximum number of partitions a user can contribute to.
    pub fn max_partitions_contributed(&self) -> i64 {
        self.max_partitions_contributed
    }

    /// Epsilon available to a single partition.
    pub fn per_partition_epsilon(&self) -> f64 {
        self.epsilon / self.max_partitions_contributed as f64
    }

    /// Delta available to a single partition.
    pub fn per_partition_delta(&self) -> f64 {
        per_partition_delta(self.delta, self.max_partitions_contributed)
    }
}

/// Split `delta` across `k` partitions so that the union over all of them
/// fails with probability at most `delta`: `1 - (1 - delta)^(1/k)`.
pub fn per_partition_delta(delta: f64, k: i64) -> f64 {
    -((-delta).ln_1p() / k as f64).exp_m1()
}

/// Inverse of [`per_partition_delta`]: `1 - (1 - delta_k)^k`.
pub fn total_delta(per_partition_delta: f64, k: i64) -> f64 {
    -((-per_partition_delta).ln_1p() * k as f64).exp_m1()
}

fn validate_epsilon(epsilon: Option<f64>) -> Result<f64> {
    let epsilon = epsilon.ok_or_else(|| SelectionError::invalid("Epsilon has to be set."))?;
    if !epsilon.is_finite() {
        return Err(SelectionError::invalid(format!(
            "Epsilon has to be finite but is {epsilon}"
        )));
    }
    if epsilon <= 0.0 {
        return Err(SelectionError::invalid(format!(
            "Epsilon has to be positive but is {epsilon}"
        )));
    }
    Ok(epsilon)
}

fn validate_delta(delta: Option<f64>) -> Result<f64> {
    let delta = delta.ok_or_else(|| SelectionError::invalid("Delta has to be set."))?;
    if !delta.is_finite() {
        return Err(SelectionError::invalid(format!(
            "Delta has to be finite but is {delta}"
        )));
    }
    if delta <= 0.0 || delta >= 1.0 {
        return Err(SelectionError::invalid(format!(
            "Delta has to be in the interval (0, 1) but is {delta}"
        )));
    }
    Ok(delta)
}

fn validate_max_partitions_contributed(k: Option<i64>) -> Result<i64> {
    let k = k.ok_or_else(|| {
        SelectionError::invalid("Max number of partitions a user can contribute to has to be set.")
    })?;
    if k <= 0 {
        return Err(SelectionError::invalid(format!(
            "Max number of partitions a user can contribute to has to be positive but is {k}"
        )));
    }
    Ok(k)
}
