use thiserror::Error;

use viewfuse_core::CoreError;

/// An error type for the neural operators.
#[derive(Error, Debug, PartialEq)]
pub enum NnError {
    /// Error from the underlying feature matrices.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A weight shape does not match the operator's input/output channels.
    #[error("weight shape mismatch: expected {expected} values, got {actual}")]
    WeightShape {
        /// Expected number of weight values.
        expected: usize,
        /// Actual number of weight values.
        actual: usize,
    },

    /// A stride must be positive.
    #[error("invalid stride {stride}, expected >= 1")]
    InvalidStride {
        /// The offending stride.
        stride: usize,
    },

    /// A dropout probability outside `[0, 1)`.
    #[error("invalid dropout probability {p}, expected 0 <= p < 1")]
    InvalidDropout {
        /// The offending probability.
        p: f32,
    },

    /// The pooling operator requires projection features but none were given.
    #[error("pooling operator requires projection features but none were provided")]
    MissingProjection,

    /// The pooling operator requires point context but none was given.
    #[error("pooling operator requires point context features but none were provided")]
    MissingContext,

    /// Context rows must match the number of pooled groups.
    #[error("context rows ({actual}) do not match group count ({expected})")]
    ContextRows {
        /// Expected row count (one per group).
        expected: usize,
        /// Actual context row count.
        actual: usize,
    },

    /// Projection rows must match the number of pooled value rows.
    #[error("projection rows ({actual}) do not match value rows ({expected})")]
    ProjectionRows {
        /// Expected row count (one per value row).
        expected: usize,
        /// Actual projection row count.
        actual: usize,
    },

    /// A feature-map size is not an integer downscale of its reference grid.
    #[error("feature map {actual}x{actual_h} is not an integer downscale of {reference}x{reference_h}")]
    NonIntegerScale {
        /// Reference grid width.
        reference: usize,
        /// Reference grid height.
        reference_h: usize,
        /// Actual grid width.
        actual: usize,
        /// Actual grid height.
        actual_h: usize,
    },

    /// A modality operator produced a feature map finer than its input.
    ///
    /// Resolution-increasing modality operators are unsupported: no
    /// reverse mapping exists at a resolution finer than the atomic index
    /// encodes.
    #[error("upsampling modality convolution is unsupported ({input} -> {output} pixels)")]
    UpsamplingUnsupported {
        /// Input pixel count.
        input: usize,
        /// Output pixel count.
        output: usize,
    },
}
