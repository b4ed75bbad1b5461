use viewfuse_core::Features;

use crate::error::NnError;
use crate::linear::Linear;

/// Output of a dense 3D block: the transformed features plus the sampling
/// indices the block applied, if any.
///
/// `sampling` is `None` for blocks that keep the point set; otherwise
/// `sampling[i]` is the input row of output point `i`. A block reporting
/// the identity ordering is treated downstream as if it reported `None`.
#[derive(Debug, Clone)]
pub struct DenseBlockOutput {
    /// The transformed per-point features.
    pub features: Features,
    /// Sampling indices with respect to the input ordering.
    pub sampling: Option<Vec<usize>>,
}

/// A dense 3D backbone block over per-point features.
pub trait DenseBlock {
    /// Apply the block.
    fn forward(&self, x: &Features) -> Result<DenseBlockOutput, NnError>;
}

/// A point-preserving block applying a linear layer to every point.
#[derive(Debug, Clone)]
pub struct LinearBlock {
    linear: Linear,
}

impl LinearBlock {
    /// Create a block from its layer.
    pub fn new(linear: Linear) -> Self {
        Self { linear }
    }
}

impl DenseBlock for LinearBlock {
    fn forward(&self, x: &Features) -> Result<DenseBlockOutput, NnError> {
        Ok(DenseBlockOutput {
            features: self.linear.forward(x)?,
            sampling: None,
        })
    }
}

/// A downsampling block keeping every `stride`-th point, optionally
/// followed by a linear layer on the surviving points.
#[derive(Debug, Clone)]
pub struct StridedSampleBlock {
    stride: usize,
    linear: Option<Linear>,
}

impl StridedSampleBlock {
    /// Create a strided sampler.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::InvalidStride`] for a zero stride.
    pub fn new(stride: usize, linear: Option<Linear>) -> Result<Self, NnError> {
        if stride == 0 {
            return Err(NnError::InvalidStride { stride });
        }
        Ok(Self { stride, linear })
    }
}

impl DenseBlock for StridedSampleBlock {
    fn forward(&self, x: &Features) -> Result<DenseBlockOutput, NnError> {
        let idx: Vec<usize> = (0..x.rows()).step_by(self.stride).collect();
        let sampled = x.gather(&idx)?;
        let features = match &self.linear {
            Some(linear) => linear.forward(&sampled)?,
            None => sampled,
        };
        Ok(DenseBlockOutput {
            features,
            sampling: Some(idx),
        })
    }
}
