use viewfuse_core::{stable_argsort, CsrIndex, Features};
use viewfuse_nn::FeatureMap;

use crate::error::MultimodalError;
use crate::reindex::ReindexMode;

/// One modality setting (e.g. one camera): a feature map plus the
/// two-level mapping tying 3D points to its observations.
///
/// The mapping is a CSR of CSRs. The view index partitions K view
/// entries per 3D point (M+1 pointers); the atomic index partitions N
/// atomic observations per view entry (K+1 pointers). Pixel coordinates
/// are stored at the reference grid resolution so the feature-map
/// indexing survives convolution downscaling.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    map: FeatureMap,
    ref_width: usize,
    ref_height: usize,
    scale: u32,
    view_csr: CsrIndex,
    atomic_csr: CsrIndex,
    pixel_coords: Vec<[u32; 2]>,
    projection: Features,
}

impl Setting {
    /// Assemble a setting, validating the mapping invariants.
    ///
    /// The feature map passed here defines the reference grid; its
    /// resolution must match the pixel coordinates.
    ///
    /// # Errors
    ///
    /// * [`MultimodalError::ViewCountMismatch`] if the atomic index does
    ///   not partition exactly one group per view entry.
    /// * [`MultimodalError::Core`] if the atomic pointer total does not
    ///   match the observation count.
    /// * [`MultimodalError::ProjectionRowsMismatch`] if projection rows
    ///   differ from the view count.
    /// * [`MultimodalError::PixelOutOfBounds`] for a coordinate outside
    ///   the reference grid.
    pub fn new(
        map: FeatureMap,
        view_csr: CsrIndex,
        atomic_csr: CsrIndex,
        pixel_coords: Vec<[u32; 2]>,
        projection: Features,
    ) -> Result<Self, MultimodalError> {
        let views = view_csr.num_elements();
        if atomic_csr.num_groups() != views {
            return Err(MultimodalError::ViewCountMismatch {
                views,
                atomic_groups: atomic_csr.num_groups(),
            });
        }
        atomic_csr.check_elements(pixel_coords.len())?;
        if projection.rows() != views {
            return Err(MultimodalError::ProjectionRowsMismatch {
                expected: views,
                actual: projection.rows(),
            });
        }
        for c in &pixel_coords {
            if c[0] as usize >= map.width() || c[1] as usize >= map.height() {
                return Err(MultimodalError::PixelOutOfBounds {
                    x: c[0],
                    y: c[1],
                    width: map.width(),
                    height: map.height(),
                });
            }
        }
        let (ref_width, ref_height) = (map.width(), map.height());
        Ok(Self {
            map,
            ref_width,
            ref_height,
            scale: 1,
            view_csr,
            atomic_csr,
            pixel_coords,
            projection,
        })
    }

    /// Number of 3D points covered by the mapping.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.view_csr.num_groups()
    }

    /// Number of view entries.
    #[inline]
    pub fn num_views(&self) -> usize {
        self.view_csr.num_elements()
    }

    /// Number of atomic observations.
    #[inline]
    pub fn num_observations(&self) -> usize {
        self.atomic_csr.num_elements()
    }

    /// The current feature map.
    #[inline]
    pub fn map(&self) -> &FeatureMap {
        &self.map
    }

    /// The current downscale factor relative to the reference grid.
    #[inline]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Per-view projection features.
    #[inline]
    pub fn projection(&self) -> &Features {
        &self.projection
    }

    /// The point-to-view index (M+1 pointers over K views).
    #[inline]
    pub fn view_csr(&self) -> &CsrIndex {
        &self.view_csr
    }

    /// The view-to-observation index (K+1 pointers over N observations).
    #[inline]
    pub fn atomic_csr(&self) -> &CsrIndex {
        &self.atomic_csr
    }

    /// Owner 3D point of each view entry, in view order.
    pub fn view_owner_ids(&self) -> Vec<usize> {
        self.view_csr.group_ids()
    }

    /// The per-point atomic pointer array (M+1), i.e. the composition of
    /// the two mapping levels: entry `p` is the first observation of
    /// point `p`'s first view.
    pub fn point_atomic_pointers(&self) -> Vec<usize> {
        self.view_csr
            .pointers()
            .iter()
            .map(|&v| self.atomic_csr.pointers()[v])
            .collect()
    }

    /// Rows into the flattened feature map, one per atomic observation,
    /// at the current scale.
    pub fn feature_map_indexing(&self) -> Vec<usize> {
        self.pixel_coords
            .iter()
            .map(|&c| self.map.index_at_scale(c, self.scale))
            .collect()
    }

    /// Substitute a convolved feature map and re-derive the scale.
    ///
    /// The CSR structures are untouched: only the backing tensor and the
    /// scale-dependent feature-map indexing change.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::Nn`] if the new grid is finer than the
    /// reference or not an integer downscale of it.
    pub fn update_features_and_scale(&self, map: FeatureMap) -> Result<Self, MultimodalError> {
        let scale = map.scale_from(self.ref_width, self.ref_height)?;
        Ok(Self {
            map,
            ref_width: self.ref_width,
            ref_height: self.ref_height,
            scale,
            view_csr: self.view_csr.clone(),
            atomic_csr: self.atomic_csr.clone(),
            pixel_coords: self.pixel_coords.clone(),
            projection: self.projection.clone(),
        })
    }

    /// Re-index the mapping to a new 3D point set.
    ///
    /// `idx = None` means the point set did not change: the setting is
    /// returned as-is, skipping all reindexing work. With `Pick`, output
    /// point `i` takes over the mapping of input point `idx[i]`. With
    /// `Merge`, input point `j` flows into output point `idx[j]` and
    /// view runs concatenate in ascending source order; observations
    /// follow their views, so both mapping levels are conserved.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::Core`] for indices that do not match
    /// the mapping's point count.
    pub fn select_points(
        &self,
        idx: Option<&[usize]>,
        mode: ReindexMode,
    ) -> Result<Self, MultimodalError> {
        let Some(idx) = idx else {
            return Ok(self.clone());
        };

        let (view_csr, view_order) = match mode {
            ReindexMode::Pick => self.view_csr.pick(idx)?,
            ReindexMode::Merge => self.view_csr.merge(idx)?,
        };

        // observations follow their views
        let counts: Vec<usize> = view_order.iter().map(|&v| self.atomic_csr.count(v)).collect();
        let atomic_csr = CsrIndex::from_counts(&counts);
        let mut pixel_coords = Vec::with_capacity(self.pixel_coords.len());
        for &v in &view_order {
            for obs in self.atomic_csr.range(v) {
                pixel_coords.push(self.pixel_coords[obs]);
            }
        }
        let projection = self.projection.gather(&view_order)?;

        Ok(Self {
            map: self.map.clone(),
            ref_width: self.ref_width,
            ref_height: self.ref_height,
            scale: self.scale,
            view_csr,
            atomic_csr,
            pixel_coords,
            projection,
        })
    }
}

/// A per-modality data holder: one or more settings covering the same 3D
/// point set.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityData {
    settings: Vec<Setting>,
}

impl ModalityData {
    /// Assemble a holder from its settings.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::EmptyModalityData`] for an empty
    /// setting list and [`MultimodalError::SettingPointMismatch`] if the
    /// settings disagree on the point count.
    pub fn new(settings: Vec<Setting>) -> Result<Self, MultimodalError> {
        let Some(first) = settings.first() else {
            return Err(MultimodalError::EmptyModalityData);
        };
        let expected = first.num_points();
        for s in &settings {
            if s.num_points() != expected {
                return Err(MultimodalError::SettingPointMismatch {
                    expected,
                    actual: s.num_points(),
                });
            }
        }
        Ok(Self { settings })
    }

    /// Number of 3D points covered by the mappings.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.settings[0].num_points()
    }

    /// Number of settings.
    #[inline]
    pub fn num_settings(&self) -> usize {
        self.settings.len()
    }

    /// The settings, in their fixed order.
    #[inline]
    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Total view entries across settings.
    pub fn num_views(&self) -> usize {
        self.settings.iter().map(|s| s.num_views()).sum()
    }

    /// Total atomic observations across settings.
    pub fn num_observations(&self) -> usize {
        self.settings.iter().map(|s| s.num_observations()).sum()
    }

    /// Substitute convolved feature maps, one per setting.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::Core`] with a length mismatch if the
    /// map count differs from the setting count.
    pub fn update_features_and_scale(
        &self,
        maps: Vec<FeatureMap>,
    ) -> Result<Self, MultimodalError> {
        if maps.len() != self.settings.len() {
            return Err(MultimodalError::Core(
                viewfuse_core::CoreError::LengthMismatch {
                    left: maps.len(),
                    right: self.settings.len(),
                },
            ));
        }
        let settings = self
            .settings
            .iter()
            .zip(maps)
            .map(|(s, m)| s.update_features_and_scale(m))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { settings })
    }

    /// Re-index every setting to a new 3D point set (see
    /// [`Setting::select_points`]).
    pub fn select_points(
        &self,
        idx: Option<&[usize]>,
        mode: ReindexMode,
    ) -> Result<Self, MultimodalError> {
        if idx.is_none() {
            return Ok(self.clone());
        }
        let settings = self
            .settings
            .iter()
            .map(|s| s.select_points(idx, mode))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { settings })
    }

    /// The stable ordering that groups view rows concatenated across
    /// settings into one contiguous run per 3D point.
    ///
    /// Stability keeps rows of earlier settings first within a point, so
    /// two settings each seeing a point contribute exactly one entry
    /// each, in setting order.
    pub fn view_cat_sorting(&self) -> Vec<usize> {
        let mut owners = Vec::with_capacity(self.num_views());
        for s in &self.settings {
            owners.extend(s.view_owner_ids());
        }
        stable_argsort(&owners)
    }

    /// The merged point-to-view index over all settings (M+1 pointers),
    /// matching the row order produced by [`Self::view_cat_sorting`].
    pub fn view_cat_csr(&self) -> CsrIndex {
        let mut counts = vec![0usize; self.num_points()];
        for s in &self.settings {
            for (p, c) in s.view_csr().counts().iter().enumerate() {
                counts[p] += c;
            }
        }
        CsrIndex::from_counts(&counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewfuse_core::CsrIndex;

    /// 10 points, observations at points [0, 0, 2]: one view each for
    /// points 0 and 2, with 2 and 1 observations.
    fn small_setting() -> Setting {
        let map = FeatureMap::new(
            Features::from_vec(4, 1, vec![10.0, 11.0, 12.0, 13.0]).unwrap(),
            2,
            2,
        )
        .unwrap();
        let mut view_counts = vec![0usize; 10];
        view_counts[0] = 1;
        view_counts[2] = 1;
        let view_csr = CsrIndex::from_counts(&view_counts);
        let atomic_csr = CsrIndex::from_counts(&[2, 1]);
        let pixel_coords = vec![[0, 0], [1, 0], [0, 1]];
        let projection = Features::from_vec(2, 1, vec![0.5, 0.7]).unwrap();
        Setting::new(map, view_csr, atomic_csr, pixel_coords, projection).unwrap()
    }

    fn five_point_setting() -> Setting {
        // 5 points, one view per point, one observation per view
        let map = FeatureMap::new(Features::zeros(9, 1), 3, 3).unwrap();
        let view_csr = CsrIndex::from_counts(&[1; 5]);
        let atomic_csr = CsrIndex::from_counts(&[1; 5]);
        let pixel_coords = vec![[0, 0], [1, 0], [2, 0], [0, 1], [1, 1]];
        let projection = Features::from_vec(5, 1, vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        Setting::new(map, view_csr, atomic_csr, pixel_coords, projection).unwrap()
    }

    #[test]
    fn test_construction_validation() {
        let map = FeatureMap::new(Features::zeros(4, 1), 2, 2).unwrap();
        let view_csr = CsrIndex::from_counts(&[1, 1]);
        let atomic_csr = CsrIndex::from_counts(&[1]);
        let err = Setting::new(
            map.clone(),
            view_csr.clone(),
            atomic_csr,
            vec![[0, 0]],
            Features::zeros(2, 1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            MultimodalError::ViewCountMismatch {
                views: 2,
                atomic_groups: 1
            }
        );

        let err = Setting::new(
            map.clone(),
            view_csr.clone(),
            CsrIndex::from_counts(&[1, 1]),
            vec![[0, 0], [5, 0]],
            Features::zeros(2, 1),
        )
        .unwrap_err();
        assert!(matches!(err, MultimodalError::PixelOutOfBounds { .. }));

        let err = Setting::new(
            map,
            view_csr,
            CsrIndex::from_counts(&[1, 1]),
            vec![[0, 0], [1, 0]],
            Features::zeros(3, 1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            MultimodalError::ProjectionRowsMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_point_atomic_pointers_composition() {
        let s = small_setting();
        let ptr = s.point_atomic_pointers();
        assert_eq!(ptr.len(), 11);
        assert_eq!(&ptr[..4], &[0, 2, 2, 3]);
        assert_eq!(ptr[10], 3);
    }

    #[test]
    fn test_select_points_none_is_identity() {
        let s = small_setting();
        let out = s.select_points(None, ReindexMode::Pick).unwrap();
        assert_eq!(out, s);
        let out = s.select_points(None, ReindexMode::Merge).unwrap();
        assert_eq!(out, s);
    }

    #[test]
    fn test_select_points_pick() {
        let s = five_point_setting();
        let out = s.select_points(Some(&[0, 2, 4]), ReindexMode::Pick).unwrap();
        assert_eq!(out.num_points(), 3);
        // the mapping of former point 2 now belongs to output point 1
        assert_eq!(out.projection().row(1), &[2.0]);
        assert_eq!(out.view_csr().counts(), vec![1, 1, 1]);
        assert_eq!(out.pixel_coords[1], [2, 0]);
    }

    #[test]
    fn test_select_points_merge_conserves() {
        let s = small_setting();
        // halve the point set: p -> p / 2
        let idx: Vec<usize> = (0..10).map(|p| p / 2).collect();
        let out = s.select_points(Some(&idx), ReindexMode::Merge).unwrap();
        assert_eq!(out.num_points(), 5);
        assert_eq!(out.num_views(), s.num_views());
        assert_eq!(out.num_observations(), s.num_observations());
        // points 0 and 2 both land in distinct outputs 0 and 1
        assert_eq!(out.view_csr().counts(), vec![1, 1, 0, 0, 0]);
        assert_eq!(out.atomic_csr().counts(), vec![2, 1]);
    }

    #[test]
    fn test_merge_concatenates_in_source_order() {
        let s = five_point_setting();
        // all five points collapse into one
        let out = s
            .select_points(Some(&[0, 0, 0, 0, 0]), ReindexMode::Merge)
            .unwrap();
        assert_eq!(out.num_points(), 1);
        assert_eq!(out.view_csr().counts(), vec![5]);
        // projection rows stay in ascending source order
        assert_eq!(
            out.projection().as_slice(),
            &[0.0, 1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_update_features_and_scale() {
        let s = five_point_setting();
        assert_eq!(s.scale(), 1);
        let before = s.feature_map_indexing();
        assert_eq!(before, vec![0, 1, 2, 3, 4]);

        // same grid: scale stays 1, indexing unchanged
        let same = s
            .update_features_and_scale(FeatureMap::new(Features::zeros(9, 4), 3, 3).unwrap())
            .unwrap();
        assert_eq!(same.scale(), 1);
        assert_eq!(same.view_csr(), s.view_csr());

        // upsampled grid is rejected
        let err = s
            .update_features_and_scale(FeatureMap::new(Features::zeros(36, 1), 6, 6).unwrap())
            .unwrap_err();
        assert!(matches!(err, MultimodalError::Nn(_)));
    }

    #[test]
    fn test_scale_two_indexing() {
        // 4x4 reference grid, observations across it
        let map = FeatureMap::new(Features::zeros(16, 1), 4, 4).unwrap();
        let view_csr = CsrIndex::from_counts(&[1, 1]);
        let atomic_csr = CsrIndex::from_counts(&[1, 1]);
        let s = Setting::new(
            map,
            view_csr,
            atomic_csr,
            vec![[3, 1], [2, 3]],
            Features::zeros(2, 1),
        )
        .unwrap();

        let down = s
            .update_features_and_scale(FeatureMap::new(Features::zeros(4, 1), 2, 2).unwrap())
            .unwrap();
        assert_eq!(down.scale(), 2);
        // [3,1] -> (1,0) -> row 1; [2,3] -> (1,1) -> row 3
        assert_eq!(down.feature_map_indexing(), vec![1, 3]);
    }

    #[test]
    fn test_multi_setting_view_cat() {
        // two settings, each one view per point over 3 points
        let make = |offset: f32| {
            let map = FeatureMap::new(Features::zeros(4, 1), 2, 2).unwrap();
            let view_csr = CsrIndex::from_counts(&[1, 1, 1]);
            let atomic_csr = CsrIndex::from_counts(&[1, 1, 1]);
            let projection =
                Features::from_vec(3, 1, vec![offset, offset + 1.0, offset + 2.0]).unwrap();
            Setting::new(
                map,
                view_csr,
                atomic_csr,
                vec![[0, 0], [1, 0], [0, 1]],
                projection,
            )
            .unwrap()
        };
        let data = ModalityData::new(vec![make(0.0), make(10.0)]).unwrap();

        let order = data.view_cat_sorting();
        // rows: setting 0 owners [0,1,2], setting 1 owners [0,1,2];
        // sorted by owner with setting 0 first within each point
        assert_eq!(order, vec![0, 3, 1, 4, 2, 5]);

        let csr = data.view_cat_csr();
        assert_eq!(csr.counts(), vec![2, 2, 2]);
        // each merged run holds exactly one entry from each setting
        for p in 0..3 {
            let run = csr.range(p);
            assert_eq!(run.len(), 2);
        }
    }

    #[test]
    fn test_modality_data_validation() {
        assert_eq!(
            ModalityData::new(vec![]).unwrap_err(),
            MultimodalError::EmptyModalityData
        );
        let err = ModalityData::new(vec![small_setting(), five_point_setting()]).unwrap_err();
        assert_eq!(
            err,
            MultimodalError::SettingPointMismatch {
                expected: 10,
                actual: 5
            }
        );
    }
}
