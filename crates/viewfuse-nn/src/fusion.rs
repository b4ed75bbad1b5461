use viewfuse_core::Features;

use crate::error::NnError;
use crate::linear::Linear;

/// Combine pooled modality features into the 3D feature stream.
///
/// Both inputs have one row per 3D point; the output replaces the 3D
/// features downstream.
pub trait Fusion {
    /// Fuse `x_mod` into `x_3d`, returning the new 3D features.
    fn fuse(&self, x_3d: &Features, x_mod: &Features) -> Result<Features, NnError>;
}

/// Residual sum fusion: `x_3d + x_mod`, requiring equal shapes.
#[derive(Debug, Clone, Default)]
pub struct SumFusion;

impl Fusion for SumFusion {
    fn fuse(&self, x_3d: &Features, x_mod: &Features) -> Result<Features, NnError> {
        Ok(x_3d.add(x_mod)?)
    }
}

/// Gated residual fusion: `x_3d + sigmoid(x_mod . gate + bias) * x_mod`.
///
/// The per-row gate suppresses modality rows that carry no signal (e.g.
/// unseen points pooled to zero).
#[derive(Debug, Clone)]
pub struct GatedSumFusion {
    gate: Vec<f32>,
    bias: f32,
}

impl GatedSumFusion {
    /// Create a gated sum with the given gate weights (one per modality
    /// channel) and bias.
    pub fn new(gate: Vec<f32>, bias: f32) -> Self {
        Self { gate, bias }
    }
}

impl Fusion for GatedSumFusion {
    fn fuse(&self, x_3d: &Features, x_mod: &Features) -> Result<Features, NnError> {
        if self.gate.len() != x_mod.cols() {
            return Err(NnError::WeightShape {
                expected: x_mod.cols(),
                actual: self.gate.len(),
            });
        }
        let mut out = x_3d.clone();
        if out.rows() != x_mod.rows() {
            return Err(NnError::Core(viewfuse_core::CoreError::LengthMismatch {
                left: out.rows(),
                right: x_mod.rows(),
            }));
        }
        if out.cols() != x_mod.cols() {
            return Err(NnError::Core(viewfuse_core::CoreError::ColsMismatch {
                expected: out.cols(),
                actual: x_mod.cols(),
            }));
        }
        for i in 0..out.rows() {
            let m = x_mod.row(i);
            let z: f32 = m
                .iter()
                .zip(self.gate.iter())
                .map(|(v, w)| v * w)
                .sum::<f32>()
                + self.bias;
            let g = 1.0 / (1.0 + (-z).exp());
            for (o, v) in out.row_mut(i).iter_mut().zip(m.iter()) {
                *o += g * v;
            }
        }
        Ok(out)
    }
}

/// Concatenation fusion: columns of `x_3d` and `x_mod` concatenated, then
/// projected by a linear layer.
#[derive(Debug, Clone)]
pub struct ConcatLinearFusion {
    linear: Linear,
}

impl ConcatLinearFusion {
    /// Create a concatenation fusion with the projection layer applied to
    /// the concatenated channels.
    pub fn new(linear: Linear) -> Self {
        Self { linear }
    }
}

impl Fusion for ConcatLinearFusion {
    fn fuse(&self, x_3d: &Features, x_mod: &Features) -> Result<Features, NnError> {
        let cat = x_3d.hcat(x_mod)?;
        self.linear.forward(&cat)
    }
}
