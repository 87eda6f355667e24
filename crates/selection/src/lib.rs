//! Differentially private partition selection.
//!
//! Decides, per partition, whether revealing that the partition exists is
//! safe under `(epsilon, delta)`-DP, as a function of its distinct user count.
//! Two interchangeable strategies are provided: [`PreaggPartitionSelection`]
//! (closed-form optimal keep probabilities) and [`LaplacePartitionSelection`]
//! (noisy count against a threshold).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod laplace;
pub mod preagg;
pub mod strategy;

pub use laplace::{LaplacePartitionSelection, LaplacePartitionSelectionBuilder};
pub use preagg::{PreaggPartitionSelection, PreaggPartitionSelectionBuilder};
pub use strategy::{PartitionSelection, PartitionSelectionKind, PartitionSelectionStrategy};

/// Common imports for partition selection.
pub mod prelude {
    pub use crate::{
        LaplacePartitionSelection, LaplacePartitionSelectionBuilder, PartitionSelection,
        PartitionSelectionKind, PartitionSelectionStrategy, PreaggPartitionSelection,
        PreaggPartitionSelectionBuilder,
    };
}
