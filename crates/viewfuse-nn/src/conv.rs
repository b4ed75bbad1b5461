use rayon::prelude::*;

use viewfuse_core::Features;

use crate::error::NnError;
use crate::linear::Linear;

/// A 2D modality feature map stored as a flattened `[height * width, C]`
/// matrix, row-major over pixels (`row = y * width + x`).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    features: Features,
    width: usize,
    height: usize,
}

impl FeatureMap {
    /// Create a feature map from its flattened pixel features.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::Core`] with an invalid-shape error if the
    /// feature row count is not `width * height`.
    pub fn new(features: Features, width: usize, height: usize) -> Result<Self, NnError> {
        if features.rows() != width * height {
            return Err(NnError::Core(viewfuse_core::CoreError::InvalidShape {
                expected: width * height,
                actual: features.rows(),
            }));
        }
        Ok(Self {
            features,
            width,
            height,
        })
    }

    /// The flattened pixel features.
    #[inline]
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Grid width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Feature channels per pixel.
    #[inline]
    pub fn channels(&self) -> usize {
        self.features.cols()
    }

    /// Derive the integer downscale factor of this map relative to a
    /// reference grid.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::UpsamplingUnsupported`] if this map is finer
    /// than the reference, and [`NnError::NonIntegerScale`] if the
    /// reference size is not an integer multiple of this map's size on
    /// both axes with the same factor.
    pub fn scale_from(&self, ref_width: usize, ref_height: usize) -> Result<u32, NnError> {
        if self.width > ref_width || self.height > ref_height {
            return Err(NnError::UpsamplingUnsupported {
                input: ref_width * ref_height,
                output: self.width * self.height,
            });
        }
        if self.width == 0
            || self.height == 0
            || ref_width % self.width != 0
            || ref_height % self.height != 0
            || ref_width / self.width != ref_height / self.height
        {
            return Err(NnError::NonIntegerScale {
                reference: ref_width,
                reference_h: ref_height,
                actual: self.width,
                actual_h: self.height,
            });
        }
        Ok((ref_width / self.width) as u32)
    }

    /// Flattened pixel row for a reference-resolution coordinate at the
    /// given downscale factor.
    #[inline]
    pub fn index_at_scale(&self, coord: [u32; 2], scale: u32) -> usize {
        let x = (coord[0] / scale) as usize;
        let y = (coord[1] / scale) as usize;
        y * self.width + x
    }
}

/// A 2D convolution operator applied to a modality feature map.
///
/// Operators may preserve the grid or downscale it by an integer factor;
/// producing a finer grid than the input is rejected downstream when the
/// scale is re-derived.
pub trait ModalityConv {
    /// Apply the operator to a feature map.
    fn forward(&self, x: &FeatureMap) -> Result<FeatureMap, NnError>;
}

/// Pass-through convolution.
#[derive(Debug, Clone, Default)]
pub struct IdentityConv;

impl ModalityConv for IdentityConv {
    fn forward(&self, x: &FeatureMap) -> Result<FeatureMap, NnError> {
        Ok(x.clone())
    }
}

/// 1x1 convolution: a linear layer over every pixel, grid unchanged.
#[derive(Debug, Clone)]
pub struct PointwiseConv {
    linear: Linear,
}

impl PointwiseConv {
    /// Create a 1x1 convolution from its channel-mixing layer.
    pub fn new(linear: Linear) -> Self {
        Self { linear }
    }
}

impl ModalityConv for PointwiseConv {
    fn forward(&self, x: &FeatureMap) -> Result<FeatureMap, NnError> {
        let features = self.linear.forward(x.features())?;
        FeatureMap::new(features, x.width(), x.height())
    }
}

/// Strided average-pooling convolution: non-overlapping `stride x stride`
/// windows averaged into one output pixel, optionally followed by a
/// channel-mixing layer. Windows are processed in parallel.
#[derive(Debug, Clone)]
pub struct StridedAvgConv {
    stride: usize,
    linear: Option<Linear>,
}

impl StridedAvgConv {
    /// Create a strided average-pooling convolution.
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

impl ModalityConv for StridedAvgConv {
    fn forward(&self, x: &FeatureMap) -> Result<FeatureMap, NnError> {
        let s = self.stride;
        if x.width() % s != 0 || x.height() % s != 0 {
            return Err(NnError::NonIntegerScale {
                reference: x.width(),
                reference_h: x.height(),
                actual: x.width() / s,
                actual_h: x.height() / s,
            });
        }
        let (out_w, out_h) = (x.width() / s, x.height() / s);
        let cols = x.channels();
        let mut out = Features::zeros(out_w * out_h, cols);
        let inv = 1.0 / (s * s) as f32;

        out.as_mut_slice()
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(pixel, dst)| {
                let ox = pixel % out_w;
                let oy = pixel / out_w;
                for dy in 0..s {
                    for dx in 0..s {
                        let src = x.features().row((oy * s + dy) * x.width() + ox * s + dx);
                        for (d, v) in dst.iter_mut().zip(src.iter()) {
                            *d += v;
                        }
                    }
                }
                for d in dst.iter_mut() {
                    *d *= inv;
                }
            });

        let pooled = FeatureMap::new(out, out_w, out_h)?;
        match &self.linear {
            Some(linear) => {
                let mixed = linear.forward(pooled.features())?;
                FeatureMap::new(mixed, out_w, out_h)
            }
            None => Ok(pooled),
        }
    }
}
