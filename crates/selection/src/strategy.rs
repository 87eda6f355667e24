//! The partition selection interface and its runtime-selectable sum type.

use std::fmt::Debug;

use partition_selection_core::{PartitionSelectionConfig, Result, ValidatedParameters};

use crate::laplace::{LaplacePartitionSelection, LaplacePartitionSelectionBuilder};
use crate::preagg::{PreaggPartitionSelection, PreaggPartitionSelectionBuilder};

/// Decides whether a partition may be revealed, given its distinct user count.
///
/// `should_keep` is an independent Bernoulli draw on each call. Its success
/// probability is zero for `num_users <= 0`, non-decreasing in `num_users`,
/// and reaches one for some finite count.
///
/// Drawing mutates internal randomness, hence `&mut self`: concurrent callers
/// either own separate instances or serialize access to a shared one.
pub trait PartitionSelectionStrategy: Send + Debug {
    /// Randomized keep/drop decision for a partition with `num_users` users.
    fn should_keep(&mut self, num_users: i64) -> bool;

    /// Validated construction parameters.
    fn params(&self) -> &ValidatedParameters;

    /// Epsilon.
    fn epsilon(&self) -> f64 {
        self.params().epsilon()
    }

    /// Delta.
    fn delta(&self) -> f64 {
        self.params().delta()
    }

    /// Maximum number of partitions a user can contribute to.
    fn max_partitions_contributed(&self) -> i64 {
        self.params().max_partitions_contributed()
    }
}

impl<S: PartitionSelectionStrategy + ?Sized> PartitionSelectionStrategy for Box<S> {
    fn should_keep(&mut self, num_users: i64) -> bool {
        (**self).should_keep(num_users)
    }

    fn params(&self) -> &ValidatedParameters {
        (**self).params()
    }
}

/// Which strategy to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PartitionSelectionKind {
    /// [`PreaggPartitionSelection`].
    #[default]
    Preagg,
    /// [`LaplacePartitionSelection`] with the default Laplace mechanism.
    Laplace,
}

/// Any partition selection strategy, with variant-specific introspection.
#[derive(Debug)]
pub enum PartitionSelection {
    /// Closed-form selection.
    Preagg(PreaggPartitionSelection),
    /// Noisy-threshold selection.
    Laplace(LaplacePartitionSelection),
}

impl PartitionSelection {
    /// Build the requested strategy from a shared configuration.
    pub fn build(kind: PartitionSelectionKind, config: PartitionSelectionConfig) -> Result<Self> {
        match kind {
            PartitionSelectionKind::Preagg => PreaggPartitionSelectionBuilder::from_config(config)
                .build()
                .map(Self::Preagg),
            PartitionSelectionKind::Laplace => {
                LaplacePartitionSelectionBuilder::from_config(config)
                    .build()
                    .map(Self::Laplace)
            }
        }
    }

    /// The variant held.
    pub fn kind(&self) -> PartitionSelectionKind {
        match self {
            Self::Preagg(_) => PartitionSelectionKind::Preagg,
            Self::Laplace(_) => PartitionSelectionKind::Laplace,
        }
    }

    /// First crossover, for the pre-aggregation variant.
    pub fn first_crossover(&self) -> Option<i64> {
        match self {
            Self::Preagg(s) => Some(s.first_crossover()),
            Self::Laplace(_) => None,
        }
    }

    /// Second crossover, for the pre-aggregation variant.
    pub fn second_crossover(&self) -> Option<i64> {
        match self {
            Self::Preagg(s) => Some(s.second_crossover()),
            Self::Laplace(_) => None,
        }
    }

    /// Noised-count threshold, for the Laplace variant.
    pub fn threshold(&self) -> Option<f64> {
        match self {
            Self::Preagg(_) => None,
            Self::Laplace(s) => Some(s.threshold()),
        }
    }
}

impl PartitionSelectionStrategy for PartitionSelection {
    fn should_keep(&mut self, num_users: i64) -> bool {
        match self {
            Self::Preagg(s) => s.should_keep(num_users),
            Self::Laplace(s) => s.should_keep(num_users),
        }
    }

    fn params(&self) -> &ValidatedParameters {
        match self {
            Self::Preagg(s) => s.params(),
            Self::Laplace(s) => s.params(),
        }
    }
}

impl From<PreaggPartitionSelection> for PartitionSelection {
    fn from(s: PreaggPartitionSelection) -> Self {
        Self::Preagg(s)
    }
}

impl From<LaplacePartitionSelection> for PartitionSelection {
    fn from(s: LaplacePartitionSelection) -> Self {
        Self::Laplace(s)
    }
}
