use std::collections::BTreeMap;

use viewfuse_core::Features;

use crate::backend_a::{channel_affine, mean_scatter};
use crate::coords::{floor_coords, unique_coords, VoxelCoord};
use crate::error::SparseError;

/// Spatial column layout of the batch-last convention: spatial
/// coordinates in columns 0..3, the batch index in column 3.
pub const SPATIAL_COLS_B: [usize; 3] = [0, 1, 2];

/// A sparse voxel tensor in the batch-last convention.
///
/// Unlike the batch-first backend, this backend keeps no explicit row
/// mapping between stride levels; it only retains the coordinate set per
/// visited stride. Recovering a reindexing between strides therefore
/// requires flooring the finer coordinates and joining on coordinate
/// equality.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTensorB {
    coords: Vec<VoxelCoord>,
    features: Features,
    stride: u32,
    coord_maps: BTreeMap<u32, Vec<VoxelCoord>>,
}

impl SparseTensorB {
    /// Create a tensor at the given stride, recording its coordinate set.
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
        let mut coord_maps = BTreeMap::new();
        coord_maps.insert(stride, coords.clone());
        Ok(Self {
            coords,
            features,
            stride,
            coord_maps,
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

    /// The coordinate set recorded at a visited stride.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::MissingCoords`] if the stride was never visited.
    pub fn coord_map(&self, stride: u32) -> Result<&[VoxelCoord], SparseError> {
        self.coord_maps
            .get(&stride)
            .map(|c| c.as_slice())
            .ok_or(SparseError::MissingCoords { stride })
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
            coord_maps: self.coord_maps.clone(),
        })
    }
}

/// A convolution block over batch-last sparse tensors.
pub trait SparseBlockB {
    /// Apply the block, returning a new tensor (possibly at a coarser stride).
    fn forward(&self, x: &SparseTensorB) -> Result<SparseTensorB, SparseError>;
}

/// Strided voxel convolution for the batch-last convention.
///
/// Floors the three spatial columns to the coarser grid (batch column
/// untouched), merges coinciding voxels by feature mean, and records the
/// coarser coordinate set.
#[derive(Debug, Clone)]
pub struct StridedConvB {
    ratio: u32,
}

impl StridedConvB {
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

impl SparseBlockB for StridedConvB {
    fn forward(&self, x: &SparseTensorB) -> Result<SparseTensorB, SparseError> {
        let stride_out = x.stride * self.ratio;
        let floored = floor_coords(&x.coords, SPATIAL_COLS_B, stride_out);
        let (out_coords, inverse) = unique_coords(&floored);
        log::debug!(
            "strided conv B: {} voxels at stride {} -> {} voxels at stride {}",
            x.num_points(),
            x.stride,
            out_coords.len(),
            stride_out
        );

        let features = mean_scatter(&x.features, &inverse, out_coords.len());

        let mut coord_maps = x.coord_maps.clone();
        coord_maps.insert(stride_out, out_coords.clone());

        Ok(SparseTensorB {
            coords: out_coords,
            features,
            stride: stride_out,
            coord_maps,
        })
    }
}

/// Channel-wise affine transform preserving the voxel set and stride.
#[derive(Debug, Clone)]
pub struct PointwiseConvB {
    scale: Vec<f32>,
    bias: Vec<f32>,
}

impl PointwiseConvB {
    /// Create a per-channel affine transform.
    pub fn new(scale: Vec<f32>, bias: Vec<f32>) -> Self {
        Self { scale, bias }
    }
}

impl SparseBlockB for PointwiseConvB {
    fn forward(&self, x: &SparseTensorB) -> Result<SparseTensorB, SparseError> {
        let features = channel_affine(&x.features, &self.scale, &self.bias)?;
        x.with_features(features)
    }
}
