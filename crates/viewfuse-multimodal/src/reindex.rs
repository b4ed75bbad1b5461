use serde::{Deserialize, Serialize};

use viewfuse_core::stable_argsort;
use viewfuse_nn::DenseBlock;
use viewfuse_sparse::{floor_coords, hash_join, SparseBlockA, SparseBlockB};

use crate::error::MultimodalError;
use crate::state::{Backend, Point3d};

/// How a reindexing map relates input to output points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexMode {
    /// Point subset selection: output point `i` comes from input point
    /// `idx[i]`.
    Pick,
    /// Point aggregation: input point `j` flows into output point
    /// `idx[j]`; several inputs may share an output.
    Merge,
}

/// The reindexing a 3D block applied to the point set.
///
/// `idx = None` is the distinguished no-op: the point set and its order
/// are unchanged and all downstream reindexing work is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reindex {
    /// The index map, `None` when nothing changed.
    pub idx: Option<Vec<usize>>,
    /// Interpretation of the index map.
    pub mode: ReindexMode,
}

impl Reindex {
    /// A no-op reindexing.
    pub fn noop(mode: ReindexMode) -> Self {
        Self { idx: None, mode }
    }
}

/// The set of backends an adapter is able to process.
///
/// Backends are injected capabilities: a representation of a backend
/// outside this set is rejected with an unsupported-format error rather
/// than silently passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSet {
    /// Dense per-point tensors.
    pub dense: bool,
    /// Batch-first sparse voxel tensors.
    pub sparse_a: bool,
    /// Batch-last sparse voxel tensors.
    pub sparse_b: bool,
}

impl BackendSet {
    /// Every backend enabled.
    pub fn all() -> Self {
        Self {
            dense: true,
            sparse_a: true,
            sparse_b: true,
        }
    }

    /// Only the given backend enabled.
    pub fn only(backend: Backend) -> Self {
        let mut set = Self {
            dense: false,
            sparse_a: false,
            sparse_b: false,
        };
        match backend {
            Backend::Dense => set.dense = true,
            Backend::SparseA => set.sparse_a = true,
            Backend::SparseB => set.sparse_b = true,
        }
        set
    }

    /// Whether the set contains a backend.
    pub fn contains(&self, backend: Backend) -> bool {
        match backend {
            Backend::Dense => self.dense,
            Backend::SparseA => self.sparse_a,
            Backend::SparseB => self.sparse_b,
        }
    }

    /// Whether no backend is enabled.
    pub fn is_empty(&self) -> bool {
        !(self.dense || self.sparse_a || self.sparse_b)
    }
}

/// A 3D block tagged by the backend it operates on.
pub enum Block3d {
    /// Block over dense per-point features.
    Dense(Box<dyn DenseBlock>),
    /// Block over batch-first sparse tensors.
    SparseA(Box<dyn SparseBlockA>),
    /// Block over batch-last sparse tensors.
    SparseB(Box<dyn SparseBlockB>),
}

impl Block3d {
    /// The backend this block operates on.
    pub fn backend(&self) -> Backend {
        match self {
            Block3d::Dense(_) => Backend::Dense,
            Block3d::SparseA(_) => Backend::SparseA,
            Block3d::SparseB(_) => Backend::SparseB,
        }
    }
}

impl std::fmt::Debug for Block3d {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Block3d({})", self.backend())
    }
}

/// Runs 3D blocks and recovers the reindexing they applied to the point
/// set, uniformly across backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexAdapter {
    backends: BackendSet,
}

impl ReindexAdapter {
    /// Create an adapter over the given backend capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::EmptyBackendSet`] if no backend is
    /// enabled.
    pub fn new(backends: BackendSet) -> Result<Self, MultimodalError> {
        if backends.is_empty() {
            return Err(MultimodalError::EmptyBackendSet);
        }
        Ok(Self { backends })
    }

    /// The enabled backends.
    pub fn backends(&self) -> BackendSet {
        self.backends
    }

    /// Run a block and recover its reindexing.
    ///
    /// For dense blocks the sampling indices reported by the block are
    /// compared against the identity ordering. For the batch-first
    /// sparse backend the map between the old and new stride is read
    /// from the tensor's coordinate manager, sorted by source order. For
    /// the batch-last backend the input coordinates are floored to the
    /// coarser grid (batch column untouched) and joined against the
    /// output coordinates by coordinate-hash equality.
    ///
    /// # Errors
    ///
    /// * [`MultimodalError::UnsupportedFormat`] if the representation's
    ///   backend is not enabled.
    /// * [`MultimodalError::BlockBackendMismatch`] if block and tensor
    ///   disagree on the backend.
    /// * [`MultimodalError::ReindexLength`] if the recovered map does
    ///   not cover the input point set.
    pub fn forward_block(
        &self,
        block: &Block3d,
        x3d: Point3d,
    ) -> Result<(Point3d, Reindex), MultimodalError> {
        let tensor_backend = x3d.backend();
        if !self.backends.contains(tensor_backend) {
            return Err(MultimodalError::UnsupportedFormat {
                backend: tensor_backend,
            });
        }

        match (block, x3d) {
            (Block3d::Dense(b), Point3d::Dense(f)) => {
                let points_in = f.rows();
                let out = b.forward(&f)?;
                let idx = match out.sampling {
                    None => None,
                    Some(idx) => {
                        let identity =
                            idx.len() == points_in && idx.iter().enumerate().all(|(i, &v)| i == v);
                        if identity {
                            None
                        } else {
                            if idx.len() != out.features.rows() {
                                return Err(MultimodalError::ReindexLength {
                                    expected: out.features.rows(),
                                    actual: idx.len(),
                                });
                            }
                            Some(idx)
                        }
                    }
                };
                Ok((Point3d::Dense(out.features), Reindex { idx, mode: ReindexMode::Pick }))
            }

            (Block3d::SparseA(b), Point3d::SparseA(t)) => {
                let stride_in = t.stride();
                let points_in = t.num_points();
                let out = b.forward(&t)?;
                let stride_out = out.stride();
                let idx = if stride_in == stride_out {
                    None
                } else {
                    let map = out.manager().coords_map(stride_in, stride_out)?;
                    let order = stable_argsort(&map.source);
                    let idx: Vec<usize> = order.iter().map(|&k| map.target[k]).collect();
                    if idx.len() != points_in {
                        return Err(MultimodalError::ReindexLength {
                            expected: points_in,
                            actual: idx.len(),
                        });
                    }
                    Some(idx)
                };
                Ok((Point3d::SparseA(out), Reindex { idx, mode: ReindexMode::Merge }))
            }

            (Block3d::SparseB(b), Point3d::SparseB(t)) => {
                let stride_in = t.stride();
                let points_in = t.num_points();
                let out = b.forward(&t)?;
                let stride_out = out.stride();
                let idx = if stride_in == stride_out {
                    None
                } else {
                    let in_coords = out.coord_map(stride_in)?;
                    let floored =
                        floor_coords(in_coords, viewfuse_sparse::backend_b::SPATIAL_COLS_B, stride_out);
                    let idx = hash_join(&floored, out.coord_map(stride_out)?)?;
                    if idx.len() != points_in {
                        return Err(MultimodalError::ReindexLength {
                            expected: points_in,
                            actual: idx.len(),
                        });
                    }
                    Some(idx)
                };
                Ok((Point3d::SparseB(out), Reindex { idx, mode: ReindexMode::Merge }))
            }

            (block, x3d) => Err(MultimodalError::BlockBackendMismatch {
                block: block.backend(),
                tensor: x3d.backend(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewfuse_core::Features;
    use viewfuse_nn::{LinearBlock, Linear, StridedSampleBlock};
    use viewfuse_sparse::{SparseTensorA, SparseTensorB, StridedConvA, StridedConvB};

    fn adapter() -> ReindexAdapter {
        ReindexAdapter::new(BackendSet::all()).unwrap()
    }

    #[test]
    fn test_empty_backend_set_rejected() {
        let set = BackendSet {
            dense: false,
            sparse_a: false,
            sparse_b: false,
        };
        assert_eq!(
            ReindexAdapter::new(set).unwrap_err(),
            MultimodalError::EmptyBackendSet
        );
    }

    #[test]
    fn test_disabled_backend_is_unsupported() {
        let adapter = ReindexAdapter::new(BackendSet::only(Backend::Dense)).unwrap();
        let coords = vec![[0, 0, 0, 0]];
        let t = SparseTensorA::new(coords, Features::zeros(1, 1), 1).unwrap();
        let block = Block3d::SparseA(Box::new(StridedConvA::new(2).unwrap()));
        let err = adapter
            .forward_block(&block, Point3d::SparseA(t))
            .unwrap_err();
        assert_eq!(
            err,
            MultimodalError::UnsupportedFormat {
                backend: Backend::SparseA
            }
        );
    }

    #[test]
    fn test_block_tensor_mismatch() {
        let block = Block3d::Dense(Box::new(LinearBlock::new(Linear::identity(1))));
        let t = SparseTensorB::new(vec![[0, 0, 0, 0]], Features::zeros(1, 1), 1).unwrap();
        let err = adapter()
            .forward_block(&block, Point3d::SparseB(t))
            .unwrap_err();
        assert_eq!(
            err,
            MultimodalError::BlockBackendMismatch {
                block: Backend::Dense,
                tensor: Backend::SparseB
            }
        );
    }

    #[test]
    fn test_dense_identity_sampling_is_noop() {
        let x = Point3d::Dense(Features::zeros(4, 1));
        let block = Block3d::Dense(Box::new(StridedSampleBlock::new(1, None).unwrap()));
        let (_, reindex) = adapter().forward_block(&block, x).unwrap();
        assert_eq!(reindex.idx, None);
        assert_eq!(reindex.mode, ReindexMode::Pick);
    }

    #[test]
    fn test_dense_sampling_reports_pick() {
        let x = Point3d::Dense(Features::from_vec(5, 1, vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap());
        let block = Block3d::Dense(Box::new(StridedSampleBlock::new(2, None).unwrap()));
        let (out, reindex) = adapter().forward_block(&block, x).unwrap();
        assert_eq!(out.num_points(), 3);
        assert_eq!(reindex.idx, Some(vec![0, 2, 4]));
        assert_eq!(reindex.mode, ReindexMode::Pick);
    }

    #[test]
    fn test_sparse_a_merge_from_coords_map() {
        // voxels 0 and 1 share a coarse cell
        let coords = vec![[0, 0, 0, 0], [0, 1, 0, 0], [0, 4, 4, 4]];
        let t = SparseTensorA::new(coords, Features::zeros(3, 1), 1).unwrap();
        let block = Block3d::SparseA(Box::new(StridedConvA::new(2).unwrap()));
        let (out, reindex) = adapter().forward_block(&block, Point3d::SparseA(t)).unwrap();
        assert_eq!(out.num_points(), 2);
        assert_eq!(reindex.mode, ReindexMode::Merge);
        assert_eq!(reindex.idx, Some(vec![0, 0, 1]));
    }

    #[test]
    fn test_sparse_b_merge_from_hash_join() {
        // batch column last: voxels 0/1 merge, voxel 2 in another batch
        let coords = vec![[0, 0, 0, 0], [1, 0, 0, 0], [0, 0, 0, 1]];
        let t = SparseTensorB::new(coords, Features::zeros(3, 1), 1).unwrap();
        let block = Block3d::SparseB(Box::new(StridedConvB::new(2).unwrap()));
        let (out, reindex) = adapter().forward_block(&block, Point3d::SparseB(t)).unwrap();
        assert_eq!(out.num_points(), 2);
        assert_eq!(reindex.mode, ReindexMode::Merge);
        assert_eq!(reindex.idx, Some(vec![0, 0, 1]));
    }

    #[test]
    fn test_stride_preserving_sparse_block_is_noop() {
        let coords = vec![[0, 0, 0, 0], [0, 1, 0, 0]];
        let t = SparseTensorA::new(coords, Features::zeros(2, 1), 1).unwrap();
        let block = Block3d::SparseA(Box::new(viewfuse_sparse::PointwiseConvA::new(
            vec![1.0],
            vec![0.0],
        )));
        let (_, reindex) = adapter().forward_block(&block, Point3d::SparseA(t)).unwrap();
        assert_eq!(reindex.idx, None);
    }
}
