#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Batch-first sparse voxel tensors with a coordinate manager.
pub mod backend_a;

/// Batch-last sparse voxel tensors with per-stride coordinate maps.
pub mod backend_b;

/// Voxel coordinate flooring and hash-join utilities.
pub mod coords;

/// Error types for the sparse backends.
pub mod error;

pub use backend_a::{CoordManagerA, CoordsMapA, PointwiseConvA, SparseBlockA, SparseTensorA, StridedConvA};
pub use backend_b::{PointwiseConvB, SparseBlockB, SparseTensorB, StridedConvB};
pub use coords::{floor_coords, hash_join, VoxelCoord};
pub use error::SparseError;
