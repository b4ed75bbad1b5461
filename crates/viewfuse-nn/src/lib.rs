#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Dense 3D backbone blocks with sampling reporting.
pub mod blocks;

/// 2D feature-map convolutions for modality branches.
pub mod conv;

/// Whole-tensor feature dropout.
pub mod dropout;

/// Error types for the neural operators.
pub mod error;

/// Feature fusion operators.
pub mod fusion;

/// Linear layers over feature matrices.
pub mod linear;

/// CSR-run pooling operators.
pub mod pool;

pub use blocks::{DenseBlock, DenseBlockOutput, LinearBlock, StridedSampleBlock};
pub use conv::{FeatureMap, IdentityConv, ModalityConv, PointwiseConv, StridedAvgConv};
pub use dropout::FeatureDropout;
pub use error::NnError;
pub use fusion::{ConcatLinearFusion, Fusion, GatedSumFusion, SumFusion};
pub use linear::{linear_forward, Linear};
pub use pool::{AttentivePool, GroupPool, MaxPool, MeanPool};
