use std::collections::HashMap;

use crate::error::SparseError;

/// A voxel coordinate: three spatial columns plus one batch column.
///
/// Which column carries the batch index is a backend convention: the
/// batch-first backend stores it in column 0, the batch-last backend in
/// column 3.
pub type VoxelCoord = [i32; 4];

/// Floor the spatial columns of each coordinate to a coarser voxel grid,
/// leaving the batch column untouched.
///
/// `spatial` lists the three column indices holding spatial coordinates;
/// flooring uses euclidean division so negative coordinates snap toward
/// negative infinity, matching voxelization of centered point clouds.
pub fn floor_coords(coords: &[VoxelCoord], spatial: [usize; 3], stride: u32) -> Vec<VoxelCoord> {
    let s = stride as i32;
    coords
        .iter()
        .map(|c| {
            let mut out = *c;
            for col in spatial {
                out[col] = c[col].div_euclid(s) * s;
            }
            out
        })
        .collect()
}

/// Resolve each query coordinate to its row in `target` by exact
/// coordinate equality, via a hash map keyed on the full coordinate.
///
/// # Errors
///
/// Returns [`SparseError::CoordJoinFailed`] naming the first query row
/// with no matching target voxel.
pub fn hash_join(queries: &[VoxelCoord], target: &[VoxelCoord]) -> Result<Vec<usize>, SparseError> {
    let lut: HashMap<VoxelCoord, usize> = target
        .iter()
        .enumerate()
        .map(|(i, &c)| (c, i))
        .collect();
    queries
        .iter()
        .enumerate()
        .map(|(row, c)| lut.get(c).copied().ok_or(SparseError::CoordJoinFailed { row }))
        .collect()
}

/// Deduplicate coordinates preserving first-occurrence order.
///
/// Returns the unique coordinates and, for each input row, the index of
/// its unique representative.
pub fn unique_coords(coords: &[VoxelCoord]) -> (Vec<VoxelCoord>, Vec<usize>) {
    let mut lut: HashMap<VoxelCoord, usize> = HashMap::new();
    let mut unique = Vec::new();
    let mut inverse = Vec::with_capacity(coords.len());
    for &c in coords {
        let next = unique.len();
        let idx = *lut.entry(c).or_insert_with(|| {
            unique.push(c);
            next
        });
        inverse.push(idx);
    }
    (unique, inverse)
}
