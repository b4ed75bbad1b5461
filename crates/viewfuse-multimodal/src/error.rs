use thiserror::Error;

use viewfuse_core::CoreError;
use viewfuse_nn::NnError;
use viewfuse_sparse::SparseError;

use crate::state::{Backend, Modality};

/// An error type for the multimodal fusion core.
#[derive(Error, Debug, PartialEq)]
pub enum MultimodalError {
    /// Error from the core data structures.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from a sparse voxel backend.
    #[error(transparent)]
    Sparse(#[from] SparseError),

    /// Error from a neural operator.
    #[error(transparent)]
    Nn(#[from] NnError),

    /// The same modality was configured twice.
    #[error("modality '{modality}' configured more than once")]
    DuplicateModality {
        /// The repeated modality.
        modality: Modality,
    },

    /// A configured branch found no holder for its modality in the state.
    #[error("no data holder for modality '{modality}' in the multimodal state")]
    MissingModality {
        /// The modality without a holder.
        modality: Modality,
    },

    /// A modality data holder must carry at least one setting.
    #[error("modality data holder has no settings")]
    EmptyModalityData,

    /// Settings of one holder disagree on the 3D point count.
    #[error("settings disagree on point count: expected {expected}, got {actual}")]
    SettingPointMismatch {
        /// Point count of the first setting.
        expected: usize,
        /// Point count of the offending setting.
        actual: usize,
    },

    /// A holder's mapping does not cover the 3D point set.
    #[error("mapping covers {groups} points but the 3D representation holds {points}")]
    PointCountMismatch {
        /// Number of 3D points.
        points: usize,
        /// Number of points covered by the mapping.
        groups: usize,
    },

    /// The atomic index does not partition observations per view entry.
    #[error("atomic index partitions {atomic_groups} groups but the mapping holds {views} views")]
    ViewCountMismatch {
        /// Number of view entries in the view index.
        views: usize,
        /// Number of groups in the atomic index.
        atomic_groups: usize,
    },

    /// Projection features must carry one row per view entry.
    #[error("projection features have {actual} rows, expected {expected} (one per view)")]
    ProjectionRowsMismatch {
        /// Number of view entries.
        expected: usize,
        /// Projection row count.
        actual: usize,
    },

    /// A pixel coordinate lies outside the reference grid.
    #[error("pixel ({x}, {y}) outside reference grid {width}x{height}")]
    PixelOutOfBounds {
        /// Pixel x coordinate.
        x: u32,
        /// Pixel y coordinate.
        y: u32,
        /// Reference grid width.
        width: usize,
        /// Reference grid height.
        height: usize,
    },

    /// The adapter was configured with no backend at all.
    #[error("backend set is empty, at least one backend must be enabled")]
    EmptyBackendSet,

    /// A 3D representation of a disabled or unknown backend reached the
    /// adapter.
    #[error("unsupported 3D representation format '{backend}': backend not enabled in this adapter")]
    UnsupportedFormat {
        /// The received backend.
        backend: Backend,
    },

    /// A 3D block of one backend was applied to a tensor of another.
    #[error("block for backend '{block}' applied to a '{tensor}' tensor")]
    BlockBackendMismatch {
        /// Backend the block operates on.
        block: Backend,
        /// Backend of the received tensor.
        tensor: Backend,
    },

    /// A reindexing map does not match the operator's output point count.
    #[error("reindexing map covers {actual} points, expected {expected}")]
    ReindexLength {
        /// Expected point count.
        expected: usize,
        /// Point count covered by the map.
        actual: usize,
    },

    /// Feature rows substituted into a 3D representation must match its
    /// point count.
    #[error("feature rows ({rows}) do not match 3D point count ({points})")]
    FeatureRowsMismatch {
        /// Number of feature rows.
        rows: usize,
        /// Number of 3D points.
        points: usize,
    },
}
