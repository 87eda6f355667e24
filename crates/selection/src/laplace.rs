//! Laplace-threshold partition selection.
//!
//! Adds `Laplace(k / eps)` noise to the user count and keeps the partition
//! when the noised count reaches a threshold. The threshold is placed so that
//! a partition with a single user survives with probability at most the
//! per-partition delta.

use partition_selection_core::{
    per_partition_delta, total_delta, LaplaceMechanismBuilder, NoiseMechanism,
    NoiseMechanismBuilder, PartitionSelectionConfig, Result, SelectionError, ValidatedParameters,
};

use crate::strategy::PartitionSelectionStrategy;

/// Threshold a noised user count.
#[derive(Debug)]
pub struct LaplacePartitionSelection {
    params: ValidatedParameters,
    threshold: f64,
    mechanism: Box<dyn NoiseMechanism>,
}

impl LaplacePartitionSelection {
    /// Create a builder.
    pub fn builder() -> LaplacePartitionSelectionBuilder {
        LaplacePartitionSelectionBuilder::new()
    }

    /// Noised-count cutoff at or above which a partition is kept.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The noise mechanism in use.
    pub fn mechanism(&self) -> &dyn NoiseMechanism {
        self.mechanism.as_ref()
    }

    /// Smallest threshold such that a partition with one user is kept with
    /// probability at most `delta`, accounting for `k` partitions per user.
    ///
    /// `threshold = 1 - (k / epsilon) * ln(2 * delta_k)` where
    /// `delta_k = 1 - (1 - delta)^(1/k)`.
    pub fn calculate_threshold(epsilon: f64, delta: f64, max_partitions_contributed: i64) -> f64 {
        let k = max_partitions_contributed as f64;
        let delta_k = per_partition_delta(delta, max_partitions_contributed);
        1.0 - k * (2.0 * delta_k).ln() / epsilon
    }

    /// Inverse of [`Self::calculate_threshold`]: the delta spent by `threshold`.
    pub fn calculate_delta(epsilon: f64, threshold: f64, max_partitions_contributed: i64) -> f64 {
        let k = max_partitions_contributed as f64;
        // P[1 + Laplace(k / eps) >= threshold] for threshold >= 1.
        let delta_k = 0.5 * (-epsilon * (threshold - 1.0) / k).exp();
        total_delta(delta_k, max_partitions_contributed)
    }
}

impl PartitionSelectionStrategy for LaplacePartitionSelection {
    fn should_keep(&mut self, num_users: i64) -> bool {
        if num_users <= 0 {
            return false;
        }
        self.mechanism.add_noise(num_users as f64) >= self.threshold
    }

    fn params(&self) -> &ValidatedParameters {
        &self.params
    }
}

/// Builder for [`LaplacePartitionSelection`].
#[derive(Debug, Default)]
pub struct LaplacePartitionSelectionBuilder {
    config: PartitionSelectionConfig,
    mechanism: Option<Box<dyn NoiseMechanismBuilder>>,
    seed: Option<u64>,
    threshold: Option<f64>,
}

impl LaplacePartitionSelectionBuilder {
    /// Create an empty builder using the default Laplace mechanism.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: PartitionSelectionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
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

    /// Use a custom noise mechanism. It is calibrated to `epsilon` and an L1
    /// sensitivity of `max_partitions_contributed` at build time.
    pub fn with_laplace_mechanism<B>(mut self, builder: B) -> Self
    where
        B: NoiseMechanismBuilder + 'static,
    {
        self.mechanism = Some(Box::new(builder));
        self
    }

    /// Seed the default Laplace mechanism. Ignored when a custom mechanism is
    /// set, whichever setter is called first.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the threshold derived from `(epsilon, delta, k)`.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Validate the parameters, resolve the threshold and build the mechanism.
    pub fn build(self) -> Result<LaplacePartitionSelection> {
        let params = self.config.validate().map_err(|err| {
            tracing::debug!(target: "partition_selection", error = %err, "laplace_build_rejected");
            err
        })?;
        let k = params.max_partitions_contributed();

        let threshold = match self.threshold {
            Some(t) if !t.is_finite() => {
                return Err(SelectionError::invalid(format!(
                    "Threshold has to be finite but is {t}"
                )));
            }
            Some(t) => t,
            None => LaplacePartitionSelection::calculate_threshold(
                params.epsilon(),
                params.delta(),
                k,
            ),
        };

        let mechanism = match (&self.mechanism, self.seed) {
            (Some(builder), _) => builder.build(params.epsilon(), k as f64)?,
            (None, Some(seed)) => LaplaceMechanismBuilder::new()
                .with_seed(seed)
                .build(params.epsilon(), k as f64)?,
            (None, None) => LaplaceMechanismBuilder::new().build(params.epsilon(), k as f64)?,
        };

        tracing::debug!(
            target: "partition_selection",
            epsilon = params.epsilon(),
            delta = params.delta(),
            max_partitions_contributed = k,
            threshold,
            diversity = mechanism.diversity(),
            "laplace_built"
        );
        Ok(LaplacePartitionSelection {
            params,
            threshold,
            mechanism,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partition_selection_core::ZeroNoiseMechanismBuilder;
    use proptest::prelude::*;
    use statrs::distribution::{ContinuousCDF, Laplace};

    fn seeded(epsilon: f64, delta: f64, k: i64) -> LaplacePartitionSelection {
        LaplacePartitionSelection::builder()
            .with_epsilon(epsilon)
            .with_delta(delta)
            .with_max_partitions_contributed(k)
            .with_seed(11)
            .build()
            .expect("valid parameters")
    }

    fn kept_fraction(s: &mut LaplacePartitionSelection, num_users: i64, trials: usize) -> f64 {
        (0..trials).filter(|_| s.should_keep(num_users)).count() as f64 / trials as f64
    }

    #[test]
    fn threshold_matches_reference_values() {
        let cases = [
            (0.5, 0.02, 1, 7.43775164974),
            (1.0986, 0.00001, 1, 10.85),
            (2.1972, 0.00001, 1, 5.92),
            (2.1972, 0.00001, 5, 29.28),
        ];
        for (epsilon, delta, k, expected) in cases {
            let t = LaplacePartitionSelection::calculate_threshold(epsilon, delta, k);
            assert!((t - expected).abs() < 0.01, "threshold({epsilon}, {delta}, {k}) = {t}");
        }
    }

    #[test]
    fn delta_matches_reference_values() {
        let d = LaplacePartitionSelection::calculate_delta(0.5, 7.43775164974, 1);
        assert!((d - 0.02).abs() < 0.001);
        let cases = [
            (1.0986, 10.85, 1),
            (2.1972, 5.92, 1),
            (2.1972, 29.28, 5),
        ];
        for (epsilon, threshold, k) in cases {
            let d = LaplacePartitionSelection::calculate_delta(epsilon, threshold, k);
            assert!((d - 0.00001).abs() < 0.000001, "delta({epsilon}, {threshold}, {k}) = {d}");
        }
    }

    #[test]
    fn threshold_round_trips_through_delta() {
        let d = LaplacePartitionSelection::calculate_delta(0.5, 10.0, 1);
        let t = LaplacePartitionSelection::calculate_threshold(0.5, d, 1);
        assert!((t - 10.0).abs() < 0.02);
    }

    #[test]
    fn zero_noise_cuts_exactly_at_threshold() {
        let mut s = LaplacePartitionSelection::builder()
            .with_laplace_mechanism(ZeroNoiseMechanismBuilder)
            .with_epsilon(0.5)
            .with_delta(0.02)
            .with_max_partitions_contributed(1)
            .build()
            .unwrap();
        assert!((s.threshold() - 7.43775164974).abs() < 0.001);
        assert!(!s.should_keep(7));
        assert!(s.should_keep(8));
        assert_eq!(s.mechanism().diversity(), 0.0);
    }

    #[test]
    fn explicit_threshold_is_used_verbatim() {
        let mut s = LaplacePartitionSelection::builder()
            .with_laplace_mechanism(ZeroNoiseMechanismBuilder)
            .with_epsilon(0.5)
            .with_delta(0.02)
            .with_max_partitions_contributed(1)
            .with_threshold(3.0)
            .build()
            .unwrap();
        assert_eq!(s.threshold(), 3.0);
        assert!(!s.should_keep(2));
        assert!(s.should_keep(3));
    }

    #[test]
    fn seed_never_replaces_a_custom_mechanism() {
        let seed_last = LaplacePartitionSelection::builder()
            .with_laplace_mechanism(ZeroNoiseMechanismBuilder)
            .with_seed(5)
            .with_epsilon(0.5)
            .with_delta(0.02)
            .with_max_partitions_contributed(1);
        let seed_first = LaplacePartitionSelection::builder()
            .with_seed(5)
            .with_laplace_mechanism(ZeroNoiseMechanismBuilder)
            .with_epsilon(0.5)
            .with_delta(0.02)
            .with_max_partitions_contributed(1);

        for builder in [seed_last, seed_first] {
            let mut s = builder.build().unwrap();
            assert_eq!(s.mechanism().diversity(), 0.0);
            for _ in 0..1000 {
                assert!(!s.should_keep(7));
                assert!(s.should_keep(8));
            }
        }
    }

    #[test]
    fn seed_makes_default_mechanism_reproducible() {
        let mut a = seeded(0.5, 0.02, 1);
        let mut b = seeded(0.5, 0.02, 1);
        assert_eq!(a.mechanism().diversity(), 2.0);
        for _ in 0..1000 {
            assert_eq!(a.should_keep(7), b.should_keep(7));
        }
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let err = LaplacePartitionSelection::builder()
            .with_epsilon(0.5)
            .with_delta(0.02)
            .with_max_partitions_contributed(1)
            .with_threshold(f64::NAN)
            .build()
            .unwrap_err();
        assert!(err.to_string().starts_with("Threshold has to be finite"));
    }

    #[test]
    fn parameter_errors_take_precedence_over_threshold() {
        let err = LaplacePartitionSelection::builder()
            .with_laplace_mechanism(ZeroNoiseMechanismBuilder)
            .with_epsilon(2.0)
            .with_delta(0.1)
            .with_threshold(f64::INFINITY)
            .build()
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Max number of partitions a user can contribute to has to be set"));
    }

    #[test]
    fn mechanism_is_calibrated_to_k_over_epsilon() {
        let s = seeded(0.5, 0.02, 4);
        assert_eq!(s.mechanism().epsilon(), 0.5);
        assert_eq!(s.mechanism().l1_sensitivity(), 4.0);
        assert_eq!(s.mechanism().diversity(), 8.0);
    }

    #[test]
    fn keep_rate_follows_laplace_tail() {
        let mut s = seeded(0.5, 0.02, 1);
        let noise = Laplace::new(0.0, 2.0).unwrap();
        let trials = 200_000;
        for n in [1i64, 4, 7, 10] {
            let expected = 1.0 - noise.cdf(s.threshold() - n as f64);
            let observed = kept_fraction(&mut s, n, trials);
            assert!(
                (observed - expected).abs() < 0.006,
                "n = {n}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn zero_users_are_never_kept() {
        let mut s = seeded(0.1, 0.5, 1);
        for _ in 0..1000 {
            assert!(!s.should_keep(0));
        }
    }

    proptest! {
        #[test]
        fn threshold_and_delta_are_inverse(
            epsilon in 1e-3f64..10.0,
            delta in 1e-10f64..0.5,
            k in 1i64..100,
        ) {
            let t = LaplacePartitionSelection::calculate_threshold(epsilon, delta, k);
            prop_assert!(t >= 1.0);
            let d = LaplacePartitionSelection::calculate_delta(epsilon, t, k);
            prop_assert!((d - delta).abs() <= 1e-6 * delta);
        }

        #[test]
        fn larger_threshold_spends_less_delta(
            epsilon in 1e-2f64..5.0,
            a in 1.0f64..50.0,
            b in 1.0f64..50.0,
            k in 1i64..10,
        ) {
            let (lo, hi) = (a.min(b), a.max(b));
            let d_lo = LaplacePartitionSelection::calculate_delta(epsilon, lo, k);
            let d_hi = LaplacePartitionSelection::calculate_delta(epsilon, hi, k);
            prop_assert!(d_hi <= d_lo);
        }
    }
}
