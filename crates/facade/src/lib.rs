//! Facade crate re-exporting the stable partition selection API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use partition_selection_core as core;
pub use partition_selection_strategies as strategies;

pub use partition_selection_core::{
    per_partition_delta, total_delta, ErrorKind, LaplaceMechanism, LaplaceMechanismBuilder,
    NoiseMechanism, NoiseMechanismBuilder, PartitionSelectionConfig, Result, SelectionError,
    ValidatedParameters, ZeroNoiseMechanism, ZeroNoiseMechanismBuilder,
};
pub use partition_selection_strategies::{
    LaplacePartitionSelection, LaplacePartitionSelectionBuilder, PartitionSelection,
    PartitionSelectionKind, PartitionSelectionStrategy, PreaggPartitionSelection,
    PreaggPartitionSelectionBuilder,
};

/// Convenience prelude covering the whole API.
pub mod prelude {
    pub use partition_selection_core::prelude::*;
    pub use partition_selection_strategies::prelude::*;
}
