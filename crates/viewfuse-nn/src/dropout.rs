use rand::Rng;

use viewfuse_core::Features;

use crate::error::NnError;

/// Whole-tensor feature dropout with inverted scaling.
///
/// Every element is zeroed independently with probability `p` and
/// surviving elements are scaled by `1 / (1 - p)`, so activations keep
/// their expected magnitude. Applied to the full feature storage of
/// either stream; an exclusive per-point 3D/modality dropout scheme would
/// slot in here as an alternative operator.
#[derive(Debug, Clone)]
pub struct FeatureDropout {
    p: f32,
}

impl FeatureDropout {
    /// Create a dropout operator.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::InvalidDropout`] unless `0 <= p < 1`.
    pub fn new(p: f32) -> Result<Self, NnError> {
        if !(0.0..1.0).contains(&p) {
            return Err(NnError::InvalidDropout { p });
        }
        Ok(Self { p })
    }

    /// The drop probability.
    #[inline]
    pub fn p(&self) -> f32 {
        self.p
    }

    /// Apply dropout, drawing the mask from `rng`.
    pub fn apply<R: Rng>(&self, x: &Features, rng: &mut R) -> Features {
        if self.p == 0.0 {
            return x.clone();
        }
        let keep = 1.0 - self.p;
        let scale = 1.0 / keep;
        let mut out = x.clone();
        for v in out.as_mut_slice() {
            if rng.random::<f32>() < self.p {
                *v = 0.0;
            } else {
                *v *= scale;
            }
        }
        out
    }
}
