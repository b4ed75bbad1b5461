use std::collections::BTreeMap;

use viewfuse_core::Features;

use crate::coords::{floor_coords, unique_coords, VoxelCoord};
use crate::error::SparseError;

/// Spatial column layout of the batch-first convention: the batch index
/// lives in column 0, spatial coordinates in columns 1..4.
pub const SPATIAL_COLS_A: [usize; 3] = [1, 2, 3];

/// A source-to-target voxel row mapping between two stride levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordsMapA {
    /// Voxel rows at the finer stride.
    pub source: Vec<usize>,
    /// For each source row, its voxel row at the coarser stride.
    pub target: Vec<usize>,
}

/// Records voxel coordinates per stride level and the row mappings
/// between stride pairs, as strided convolutions are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordManagerA {
    coords: BTreeMap<u32, Vec<VoxelCoord>>,
    maps: BTreeMap<(u32, u32), CoordsMapA>,
}

impl CoordManagerA {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the voxel coordinates at a stride level.
    pub fn insert_coords(&mut self, stride: u32, coords: Vec<VoxelCoord>) {
        self.coords.insert(stride, coords);
    }

    /// Record the row mapping between two stride levels.
    pub fn insert_map(&mut self, stride_in: u32, stride_out: u32, map: CoordsMapA) {
        self.maps.insert((stride_in, stride_out), map);
    }

    /// The voxel coordinates recorded at a stride level.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::MissingCoords`] if the stride was never recorded.
    pub fn coords(&self, stride: u32) -> Result<&[VoxelCoord], SparseError> {
        self.coords
            .get(&stride)
            .map(|c| c.as_slice())
            .ok_or(SparseError::MissingCoords { stride })
    }

    /// The row mapping between two stride levels.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::MissingCoordsMap`] if no strided convolution
    /// recorded that transition.
    pub fn coords_map(&self, stride_in: u32, stride_out: u32) -> Result<&CoordsMapA, SparseError> {
        self.maps
            .get(&(stride_in, stride_out))
            .ok_or(SparseError::MissingCoordsMap {
                stride_in,
                stride_out,
            })
    }
}

/// A sparse voxel tensor in the batch-first convention.
///
/// Coordinates have shape `[N, 4]` with the batch index in the first
/// column. The coordinate manager travels with the tensor and accumulates
/// the stride history needed to recover reindexing maps.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTensorA {
    coords: Vec<VoxelCoord>,
    features: Features,
    stride: u32,
    manager: CoordManagerA,
}

impl SparseTensorA {
    /// Create a tensor at the given stride, seeding the coordinate manager.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::FeatureRowsMismatch`] if the feature row
    /// count differs from the voxel count, and [`SparseError::InvalidStride`]
    /// for a zero stride.
    pub fn new(coords: Vec<VoxelCoord>, features: Features, stride: u32) -> Result<Self, SparseError> {
        if features.rows() != coords.len() {
            return Err(SparseError::FeatureRowsMismatch {
                rows: features.rows(),
                voxels: coords.len(),
            });
        }
        if stride == 0 {
            return Err(SparseError::InvalidStride { stride });
        }
        let mut manager = CoordManagerA::new();
        manager.insert_coords(stride, coords.clone());
        Ok(Self {
            coords,
            features,
            stride,
            manager,
        })
    }

    /// Number of voxels.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.coords.len()
    }

    /// The voxel coordinates.
    #[inline]
    pub fn coords(&self) -> &[VoxelCoord] {
        &self.coords
    }

    /// The voxel features.
    #[inline]
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The current tensor stride.
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// The coordinate manager accumulated along the stride history.
    #[inline]
    pub fn manager(&self) -> &CoordManagerA {
        &self.manager
    }

    /// Replace the feature matrix, keeping coordinates and stride.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::FeatureRowsMismatch`] if the new row count
    /// differs from the voxel count.
    pub fn with_features(&self, features: Features) -> Result<Self, SparseError> {
        if features.rows() != self.coords.len() {
            return Err(SparseError::FeatureRowsMismatch {
                rows: features.rows(),
                voxels: self.coords.len(),
            });
        }
        Ok(Self {
            coords: self.coords.clone(),
            features,
            stride: self.stride,
            manager: self.manager.clone(),
        })
    }
}

/// A convolution block over batch-first sparse tensors.
pub trait SparseBlockA {
    /// Apply the block, returning a new tensor (possibly at a coarser stride).
    fn forward(&self, x: &SparseTensorA) -> Result<SparseTensorA, SparseError>;
}

/// Strided voxel convolution: floors coordinates to a coarser grid,
/// merges coinciding voxels by feature mean, and records the row mapping
/// in the coordinate manager.
#[derive(Debug, Clone)]
pub struct StridedConvA {
    ratio: u32,
}

impl StridedConvA {
    /// Create a strided convolution with the given stride ratio.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::InvalidStrideRatio`] for a ratio below 2.
    pub fn new(ratio: u32) -> Result<Self, SparseError> {
        if ratio < 2 {
            return Err(SparseError::InvalidStrideRatio { ratio });
        }
        Ok(Self { ratio })
    }
}

impl SparseBlockA for StridedConvA {
    fn forward(&self, x: &SparseTensorA) -> Result<SparseTensorA, SparseError> {
        let stride_out = x.stride * self.ratio;
        let floored = floor_coords(&x.coords, SPATIAL_COLS_A, stride_out);
        let (out_coords, inverse) = unique_coords(&floored);
        log::debug!(
            "strided conv A: {} voxels at stride {} -> {} voxels at stride {}",
            x.num_points(),
            x.stride,
            out_coords.len(),
            stride_out
        );

        let features = mean_scatter(&x.features, &inverse, out_coords.len());

        let mut manager = x.manager.clone();
        manager.insert_coords(stride_out, out_coords.clone());
        manager.insert_map(
            x.stride,
            stride_out,
            CoordsMapA {
                source: (0..inverse.len()).collect(),
                target: inverse,
            },
        );

        Ok(SparseTensorA {
            coords: out_coords,
            features,
            stride: stride_out,
            manager,
        })
    }
}

/// Channel-wise affine transform preserving the voxel set and stride.
#[derive(Debug, Clone)]
pub struct PointwiseConvA {
    scale: Vec<f32>,
    bias: Vec<f32>,
}

impl PointwiseConvA {
    /// Create a per-channel affine transform.
    pub fn new(scale: Vec<f32>, bias: Vec<f32>) -> Self {
        Self { scale, bias }
    }
}

impl SparseBlockA for PointwiseConvA {
    fn forward(&self, x: &SparseTensorA) -> Result<SparseTensorA, SparseError> {
        let features = channel_affine(&x.features, &self.scale, &self.bias)?;
        x.with_features(features)
    }
}

/// Mean-scatter feature rows into `num_out` groups given each row's group id.
pub(crate) fn mean_scatter(features: &Features, inverse: &[usize], num_out: usize) -> Features {
    let cols = features.cols();
    let mut out = Features::zeros(num_out, cols);
    let mut counts = vec![0usize; num_out];
    for (row, &g) in inverse.iter().enumerate() {
        counts[g] += 1;
        let src = features.row(row);
        let dst = out.row_mut(g);
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d += s;
        }
    }
    for (g, &n) in counts.iter().enumerate() {
        if n > 1 {
            let inv = 1.0 / n as f32;
            for v in out.row_mut(g) {
                *v *= inv;
            }
        }
    }
    out
}

/// Per-channel `x * scale + bias` over every row.
pub(crate) fn channel_affine(
    features: &Features,
    scale: &[f32],
    bias: &[f32],
) -> Result<Features, SparseError> {
    if scale.len() != features.cols() || bias.len() != features.cols() {
        return Err(SparseError::Core(viewfuse_core::CoreError::ColsMismatch {
            expected: features.cols(),
            actual: scale.len(),
        }));
    }
    let mut out = features.clone();
    for i in 0..out.rows() {
        for (c, v) in out.row_mut(i).iter_mut().enumerate() {
            *v = *v * scale[c] + bias[c];
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tensor_2x2() -> SparseTensorA {
        // two voxels in batch 0 sharing a coarse cell, one in batch 1
        let coords = vec![[0, 0, 0, 0], [0, 1, 0, 0], [1, 0, 0, 0]];
        let features = Features::from_vec(3, 2, vec![1.0, 0.0, 3.0, 0.0, 5.0, 1.0]).unwrap();
        SparseTensorA::new(coords, features, 1).unwrap()
    }

    #[test]
    fn test_new_validates_rows() {
        let err = SparseTensorA::new(vec![[0, 0, 0, 0]], Features::zeros(2, 1), 1).unwrap_err();
        assert_eq!(err, SparseError::FeatureRowsMismatch { rows: 2, voxels: 1 });
    }

    #[test]
    fn test_strided_conv_merges_and_records_map() {
        let x = tensor_2x2();
        let conv = StridedConvA::new(2).unwrap();
        let y = conv.forward(&x).unwrap();

        assert_eq!(y.stride(), 2);
        assert_eq!(y.num_points(), 2);
        // batch column untouched by flooring
        assert_eq!(y.coords(), &[[0, 0, 0, 0], [1, 0, 0, 0]]);
        // merged voxel features are averaged
        assert_relative_eq!(y.features().row(0)[0], 2.0);

        let map = y.manager().coords_map(1, 2).unwrap();
        assert_eq!(map.source, vec![0, 1, 2]);
        assert_eq!(map.target, vec![0, 0, 1]);
    }

    #[test]
    fn test_pointwise_conv_preserves_voxels() {
        let x = tensor_2x2();
        let conv = PointwiseConvA::new(vec![2.0, 1.0], vec![0.0, -1.0]);
        let y = conv.forward(&x).unwrap();
        assert_eq!(y.stride(), x.stride());
        assert_eq!(y.coords(), x.coords());
        assert_relative_eq!(y.features().row(0)[0], 2.0);
        assert_relative_eq!(y.features().row(0)[1], -1.0);
    }

    #[test]
    fn test_missing_map_is_an_error() {
        let x = tensor_2x2();
        assert_eq!(
            x.manager().coords_map(1, 2).unwrap_err(),
            SparseError::MissingCoordsMap {
                stride_in: 1,
                stride_out: 2
            }
        );
    }
}
