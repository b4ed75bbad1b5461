#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Compressed run (CSR) index structures.
pub mod csr;

/// Error types for the core data structures.
pub mod error;

/// Dense row-major feature matrices.
pub mod features;

/// Per-point visibility masks.
pub mod mask;

pub use csr::{stable_argsort, CsrIndex};
pub use error::CoreError;
pub use features::Features;
pub use mask::SeenMask;
