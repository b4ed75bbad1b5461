#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Multimodal downsampling blocks orchestrating 3D blocks and branches.
pub mod block;

/// Per-modality processing branches.
pub mod branch;

/// Encoder stacks of multimodal blocks.
pub mod encoder;

/// Error types for the fusion core.
pub mod error;

/// Per-modality data holders with two-level CSR mappings.
pub mod modality;

/// Backend-polymorphic reindexing of point sets.
pub mod reindex;

/// Multimodal state and backend-tagged 3D representations.
pub mod state;

pub use block::MultimodalBlockDown;
pub use branch::UnimodalBranch;
pub use encoder::MultimodalEncoder;
pub use error::MultimodalError;
pub use modality::{ModalityData, Setting};
pub use reindex::{BackendSet, Block3d, Reindex, ReindexAdapter, ReindexMode};
pub use state::{Backend, ForwardCtx, Modality, MultimodalState, Point3d};
