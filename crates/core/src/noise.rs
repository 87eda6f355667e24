//! Noise mechanisms consumed by threshold-based partition selection.

use std::fmt::Debug;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Exp};

use crate::error::{Result, SelectionError};

/// A source of symmetric noise calibrated to `(epsilon, l1_sensitivity)`.
pub trait NoiseMechanism: Send + Debug {
    /// Return `value` plus one fresh, independent noise draw.
    fn add_noise(&mut self, value: f64) -> f64;

    /// Epsilon the mechanism was calibrated to.
    fn epsilon(&self) -> f64;

    /// L1 sensitivity the mechanism was calibrated to.
    fn l1_sensitivity(&self) -> f64;

    /// Scale of the noise distribution.
    fn diversity(&self) -> f64;
}

/// Factory for a [`NoiseMechanism`].
///
/// The partition selection builder supplies epsilon and the L1 sensitivity;
/// everything else (e.g. seeding) is configured on the builder itself.
pub trait NoiseMechanismBuilder: Debug {
    /// Build a mechanism calibrated to the given parameters.
    fn build(&self, epsilon: f64, l1_sensitivity: f64) -> Result<Box<dyn NoiseMechanism>>;
}

fn check_calibration(epsilon: f64, l1_sensitivity: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(SelectionError::invalid(format!(
            "Noise epsilon has to be positive and finite but is {epsilon}"
        )));
    }
    if !l1_sensitivity.is_finite() || l1_sensitivity <= 0.0 {
        return Err(SelectionError::invalid(format!(
            "L1 sensitivity has to be positive and finite but is {l1_sensitivity}"
        )));
    }
    Ok(())
}

/// Sample `Laplace(0, scale)` as the difference of two exponentials.
pub fn sample_laplace<R: Rng + ?Sized>(exp: &Exp<f64>, rng: &mut R) -> f64 {
    exp.sample(rng) - exp.sample(rng)
}

/// Laplace mechanism with sensitivity calibration.
///
/// Not `Clone`: a copy would replay the same noise stream.
#[derive(Debug)]
pub struct LaplaceMechanism {
    epsilon: f64,
    l1_sensitivity: f64,
    exp: Exp<f64>,
    rng: ChaCha20Rng,
}

impl LaplaceMechanism {
    /// Create a new Laplace mechanism seeded from OS entropy.
    pub fn new(epsilon: f64, l1_sensitivity: f64) -> Result<Self> {
        Self::with_rng(epsilon, l1_sensitivity, ChaCha20Rng::from_entropy())
    }

    /// Create a new Laplace mechanism with a fixed seed.
    pub fn seeded(epsilon: f64, l1_sensitivity: f64, seed: u64) -> Result<Self> {
        Self::with_rng(epsilon, l1_sensitivity, ChaCha20Rng::seed_from_u64(seed))
    }

    fn with_rng(epsilon: f64, l1_sensitivity: f64, rng: ChaCha20Rng) -> Result<Self> {
        check_calibration(epsilon, l1_sensitivity)?;
        // Exp is parameterized by rate, i.e. 1 / scale.
        let exp = Exp::new(epsilon / l1_sensitivity)
            .map_err(|e| SelectionError::invalid(format!("Invalid Laplace scale: {e}")))?;
        Ok(Self {
            epsilon,
            l1_sensitivity,
            exp,
            rng,
        })
    }
}

impl NoiseMechanism for LaplaceMechanism {
    fn add_noise(&mut self, value: f64) -> f64 {
        value + sample_laplace(&self.exp, &mut self.rng)
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn l1_sensitivity(&self) -> f64 {
        self.l1_sensitivity
    }

    fn diversity(&self) -> f64 {
        self.l1_sensitivity / self.epsilon
    }
}

/// Builder for [`LaplaceMechanism`].
#[derive(Clone, Debug, Default)]
pub struct LaplaceMechanismBuilder {
    seed: Option<u64>,
}

impl LaplaceMechanismBuilder {
    /// Create a builder whose mechanisms are seeded from OS entropy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the mechanism's generator for reproducible draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl NoiseMechanismBuilder for LaplaceMechanismBuilder {
    fn build(&self, epsilon: f64, l1_sensitivity: f64) -> Result<Box<dyn NoiseMechanism>> {
        let mechanism = match self.seed {
            Some(seed) => LaplaceMechanism::seeded(epsilon, l1_sensitivity, seed)?,
            None => LaplaceMechanism::new(epsilon, l1_sensitivity)?,
        };
        Ok(Box::new(mechanism))
    }
}

/// A mechanism that adds no noise at all. Only useful for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct ZeroNoiseMechanism {
    epsilon: f64,
    l1_sensitivity: f64,
}

impl ZeroNoiseMechanism {
    /// Create a zero-noise mechanism reporting the given calibration.
    pub fn new(epsilon: f64, l1_sensitivity: f64) -> Result<Self> {
        check_calibration(epsilon, l1_sensitivity)?;
        Ok(Self {
            epsilon,
            l1_sensitivity,
        })
    }
}

impl NoiseMechanism for ZeroNoiseMechanism {
    fn add_noise(&mut self, value: f64) -> f64 {
        value
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn l1_sensitivity(&self) -> f64 {
        self.l1_sensitivity
    }

    fn diversity(&self) -> f64 {
        0.0
    }
}

/// Builder for [`ZeroNoiseMechanism`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroNoiseMechanismBuilder;

impl NoiseMechanismBuilder for ZeroNoiseMechanismBuilder {
    fn build(&self, epsilon: f64, l1_sensitivity: f64) -> Result<Box<dyn NoiseMechanism>> {
        Ok(Box::new(ZeroNoiseMechanism::new(epsilon, l1_sensitivity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::{ContinuousCDF, Laplace};

    #[test]
    fn test_laplace_deterministic() {
        let mut m1 = LaplaceMechanism::seeded(0.5, 1.0, 42).unwrap();
        let mut m2 = LaplaceMechanism::seeded(0.5, 1.0, 42).unwrap();
        for _ in 0..100 {
            assert_eq!(m1.add_noise(3.0), m2.add_noise(3.0));
        }
    }

    #[test]
    fn test_laplace_statistics() {
        let mut m = LaplaceMechanism::seeded(0.5, 2.0, 123).unwrap();
        assert_eq!(m.diversity(), 4.0);

        let n = 200_000;
        let draws: Vec<f64> = (0..n).map(|_| m.add_noise(0.0)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

        assert!(mean.abs() < 0.1);
        // Var[Laplace(b)] = 2 b^2 = 32.
        assert!((var - 32.0).abs() < 1.0);

        let reference = Laplace::new(0.0, 4.0).unwrap();
        let below = draws.iter().filter(|&&x| x < 3.0).count() as f64 / n as f64;
        assert!((below - reference.cdf(3.0)).abs() < 0.005);
    }

    #[test]
    fn test_zero_noise_is_identity() {
        let mut m = ZeroNoiseMechanismBuilder.build(1.0, 3.0).unwrap();
        assert_eq!(m.add_noise(7.25), 7.25);
        assert_eq!(m.epsilon(), 1.0);
        assert_eq!(m.l1_sensitivity(), 3.0);
        assert_eq!(m.diversity(), 0.0);
    }

    #[test]
    fn test_builder_rejects_bad_calibration() {
        let builder = LaplaceMechanismBuilder::new();
        let err = builder.build(0.0, 1.0).unwrap_err();
        assert!(err.to_string().starts_with("Noise epsilon has to be positive"));
        let err = builder.build(1.0, f64::NAN).unwrap_err();
        assert!(err.to_string().starts_with("L1 sensitivity has to be positive"));
        assert!(ZeroNoiseMechanismBuilder.build(-1.0, 1.0).is_err());
    }

    #[test]
    fn test_builder_seed_is_reproducible() {
        let builder = LaplaceMechanismBuilder::new().with_seed(9);
        let mut a = builder.build(1.0, 1.0).unwrap();
        let mut b = builder.build(1.0, 1.0).unwrap();
        assert_eq!(a.add_noise(0.0), b.add_noise(0.0));
    }
}
