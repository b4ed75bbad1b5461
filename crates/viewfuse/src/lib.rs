#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use viewfuse_core as core;

#[doc(inline)]
pub use viewfuse_multimodal as multimodal;

#[doc(inline)]
pub use viewfuse_nn as nn;

#[doc(inline)]
pub use viewfuse_sparse as sparse;
