use viewfuse_core::{Features, SeenMask};
use viewfuse_nn::{FeatureDropout, Fusion, GroupPool, ModalityConv};

use crate::error::MultimodalError;
use crate::modality::ModalityData;
use crate::state::{ForwardCtx, Point3d};

/// A per-modality processing branch:
///
/// ```text
/// IN 3D    ------------------------------------           --   OUT 3D
///                                 \            \         /
/// IN Mod   -- Conv -- Atomic Pool -- View Pool -- Fusion
///                   \
///                    ---------------------------------------  OUT Mod
/// ```
///
/// The convolution may preserve the feature-map grid or downscale it;
/// resolution-increasing operators are rejected when the holder
/// re-derives its scale, since no reverse mapping exists at a finer
/// resolution than the atomic index encodes.
pub struct UnimodalBranch {
    conv: Option<Box<dyn ModalityConv>>,
    atomic_pool: Box<dyn GroupPool>,
    view_pool: Box<dyn GroupPool>,
    fusion: Box<dyn Fusion>,
    drop_3d: Option<FeatureDropout>,
    drop_mod: Option<FeatureDropout>,
}

impl UnimodalBranch {
    /// Assemble a branch from its operators. `conv = None` leaves the
    /// modality features untouched.
    pub fn new(
        conv: Option<Box<dyn ModalityConv>>,
        atomic_pool: Box<dyn GroupPool>,
        view_pool: Box<dyn GroupPool>,
        fusion: Box<dyn Fusion>,
    ) -> Self {
        Self {
            conv,
            atomic_pool,
            view_pool,
            fusion,
            drop_3d: None,
            drop_mod: None,
        }
    }

    /// Enable whole-tensor dropout on the 3D and/or modality features.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::Nn`] for probabilities outside `[0, 1)`.
    pub fn with_dropout(mut self, drop_3d: f32, drop_mod: f32) -> Result<Self, MultimodalError> {
        self.drop_3d = if drop_3d > 0.0 {
            Some(FeatureDropout::new(drop_3d)?)
        } else {
            None
        };
        self.drop_mod = if drop_mod > 0.0 {
            Some(FeatureDropout::new(drop_mod)?)
        } else {
            None
        };
        Ok(self)
    }

    /// Run the branch over one modality.
    ///
    /// Returns the fused 3D representation, the seen mask produced by
    /// view pooling, and the holder carrying the convolved features for
    /// downstream blocks.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::PointCountMismatch`] if the holder's
    /// mapping does not cover the 3D point set; operator errors
    /// propagate unchanged.
    pub fn forward(
        &self,
        x3d: Point3d,
        data: ModalityData,
        ctx: &mut ForwardCtx,
    ) -> Result<(Point3d, SeenMask, ModalityData), MultimodalError> {
        if data.num_points() != x3d.num_points() {
            return Err(MultimodalError::PointCountMismatch {
                points: x3d.num_points(),
                groups: data.num_points(),
            });
        }

        // Convolve the modality features, holding the convolved maps in
        // the returned holder for downstream modules.
        let data = match &self.conv {
            Some(conv) => {
                let maps = data
                    .settings()
                    .iter()
                    .map(|s| conv.forward(s.map()))
                    .collect::<Result<Vec<_>, _>>()?;
                data.update_features_and_scale(maps)?
            }
            None => data,
        };

        // Per setting: gather observation features off the map and pool
        // them into one row per view entry, conditioned on the owner
        // point's 3D features.
        let x3d_feats = x3d.features();
        let mut pooled_settings = Vec::with_capacity(data.num_settings());
        for setting in data.settings() {
            let fm_idx = setting.feature_map_indexing();
            let x_atomic = setting.map().features().gather(&fm_idx)?;
            let owners = setting.view_owner_ids();
            let context = x3d_feats.gather(&owners)?;
            let pooled =
                self.atomic_pool
                    .pool(&x_atomic, Some(&context), None, setting.atomic_csr())?;
            pooled_settings.push(pooled);
        }

        // Concatenate view rows across settings and order them into one
        // contiguous run per 3D point before view pooling.
        let (x_views, x_proj, view_csr) = if data.num_settings() > 1 {
            let pooled_refs: Vec<&Features> = pooled_settings.iter().collect();
            let proj_refs: Vec<&Features> =
                data.settings().iter().map(|s| s.projection()).collect();
            let sorting = data.view_cat_sorting();
            let x_views = Features::vcat(&pooled_refs)?.gather(&sorting)?;
            let x_proj = Features::vcat(&proj_refs)?.gather(&sorting)?;
            (x_views, x_proj, data.view_cat_csr())
        } else {
            let setting = &data.settings()[0];
            (
                pooled_settings.remove(0),
                setting.projection().clone(),
                setting.view_csr().clone(),
            )
        };

        // View pooling conditioned on the 3D features and the projection
        // features; a point is seen iff at least one view contributes.
        let x_mod = self
            .view_pool
            .pool(&x_views, Some(x3d_feats), Some(&x_proj), &view_csr)?;
        let seen = SeenMask::from_vec(view_csr.counts().iter().map(|&c| c > 0).collect());
        if seen.count_seen() == 0 {
            log::warn!("no 3D point is covered by this modality");
        }
        log::debug!(
            "unimodal branch: {} views over {} points, {} seen",
            view_csr.num_elements(),
            view_csr.num_groups(),
            seen.count_seen()
        );

        // Whole-tensor dropout on either stream, training mode only.
        let mut x3d_feats = x3d_feats.clone();
        let mut x_mod = x_mod;
        if ctx.training {
            if let Some(drop) = &self.drop_3d {
                x3d_feats = drop.apply(&x3d_feats, ctx.rng());
            }
            if let Some(drop) = &self.drop_mod {
                x_mod = drop.apply(&x_mod, ctx.rng());
            }
        }

        let fused = self.fusion.fuse(&x3d_feats, &x_mod)?;
        let x3d = x3d.with_features(fused)?;

        Ok((x3d, seen, data))
    }
}
