use thiserror::Error;

use viewfuse_core::CoreError;

/// An error type for the sparse voxel backends.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SparseError {
    /// Error from the underlying feature matrices.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The feature row count does not match the voxel count.
    #[error("feature rows ({rows}) do not match voxel count ({voxels})")]
    FeatureRowsMismatch {
        /// Number of feature rows.
        rows: usize,
        /// Number of voxel coordinates.
        voxels: usize,
    },

    /// The tensor stride must be positive.
    #[error("invalid tensor stride {stride}, expected >= 1")]
    InvalidStride {
        /// The offending stride.
        stride: u32,
    },

    /// A strided convolution ratio must be greater than one.
    #[error("invalid stride ratio {ratio}, expected > 1")]
    InvalidStrideRatio {
        /// The offending ratio.
        ratio: u32,
    },

    /// No coordinates are recorded at the requested stride.
    #[error("no coordinate map recorded at stride {stride}")]
    MissingCoords {
        /// The requested stride.
        stride: u32,
    },

    /// The coordinate manager holds no map between the two strides.
    #[error("no coordinate map recorded between strides {stride_in} and {stride_out}")]
    MissingCoordsMap {
        /// Input stride.
        stride_in: u32,
        /// Output stride.
        stride_out: u32,
    },

    /// A coordinate failed to resolve against the target voxel set.
    #[error("coordinate join failed for voxel row {row}")]
    CoordJoinFailed {
        /// Source row whose floored coordinate has no target voxel.
        row: usize,
    },
}
