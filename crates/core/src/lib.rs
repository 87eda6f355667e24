//! Core building blocks for differentially private partition selection.
//!
//! This crate provides the shared privacy parameter validation, the error
//! type, and the noise mechanisms that threshold-based strategies consume.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod noise;
pub mod params;

pub use error::{ErrorKind, Result, SelectionError};
pub use noise::{
    sample_laplace, LaplaceMechanism, LaplaceMechanismBuilder, NoiseMechanism,
    NoiseMechanismBuilder, ZeroNoiseMechanism, ZeroNoiseMechanismBuilder,
};
pub use params::{
    per_partition_delta, total_delta, PartitionSelectionConfig, ValidatedParameters,
};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        ErrorKind, LaplaceMechanism, LaplaceMechanismBuilder, NoiseMechanism,
        NoiseMechanismBuilder, PartitionSelectionConfig, Result, SelectionError,
        ValidatedParameters, ZeroNoiseMechanism, ZeroNoiseMechanismBuilder,
    };
}
