use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use viewfuse_core::{Features, SeenMask};
use viewfuse_sparse::{SparseTensorA, SparseTensorB};

use crate::error::MultimodalError;
use crate::modality::ModalityData;

/// The tensor backends a 3D representation can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Dense per-point feature tensor.
    Dense,
    /// Sparse voxel tensor, batch-first coordinate convention.
    SparseA,
    /// Sparse voxel tensor, batch-last coordinate convention.
    SparseB,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Backend::Dense => "dense",
            Backend::SparseA => "sparse_a",
            Backend::SparseB => "sparse_b",
        };
        write!(f, "{}", name)
    }
}

/// The closed set of supported modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// 2D camera imagery.
    Image,
    /// 2D depth maps.
    Depth,
}

impl Modality {
    /// Every supported modality.
    pub const ALL: [Modality; 2] = [Modality::Image, Modality::Depth];

    /// The modality's canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Depth => "depth",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A 3D feature representation, tagged by backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Point3d {
    /// Dense per-point features.
    Dense(Features),
    /// Batch-first sparse voxel tensor.
    SparseA(SparseTensorA),
    /// Batch-last sparse voxel tensor.
    SparseB(SparseTensorB),
}

impl Point3d {
    /// The backend this representation lives in.
    pub fn backend(&self) -> Backend {
        match self {
            Point3d::Dense(_) => Backend::Dense,
            Point3d::SparseA(_) => Backend::SparseA,
            Point3d::SparseB(_) => Backend::SparseB,
        }
    }

    /// Number of 3D points (voxels for the sparse backends).
    pub fn num_points(&self) -> usize {
        match self {
            Point3d::Dense(f) => f.rows(),
            Point3d::SparseA(t) => t.num_points(),
            Point3d::SparseB(t) => t.num_points(),
        }
    }

    /// The per-point feature matrix.
    pub fn features(&self) -> &Features {
        match self {
            Point3d::Dense(f) => f,
            Point3d::SparseA(t) => t.features(),
            Point3d::SparseB(t) => t.features(),
        }
    }

    /// Replace the per-point features, keeping the point set.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::FeatureRowsMismatch`] if the row count
    /// differs from the point count.
    pub fn with_features(&self, features: Features) -> Result<Point3d, MultimodalError> {
        if features.rows() != self.num_points() {
            return Err(MultimodalError::FeatureRowsMismatch {
                rows: features.rows(),
                points: self.num_points(),
            });
        }
        Ok(match self {
            Point3d::Dense(_) => Point3d::Dense(features),
            Point3d::SparseA(t) => Point3d::SparseA(t.with_features(features)?),
            Point3d::SparseB(t) => Point3d::SparseB(t.with_features(features)?),
        })
    }
}

/// The state threaded through the multimodal pipeline: 3D features, the
/// running seen mask, and every modality's data holder.
#[derive(Debug, Clone)]
pub struct MultimodalState {
    /// The 3D feature representation.
    pub x3d: Point3d,
    /// Per-point visibility, `None` until a branch first sets it.
    pub seen: Option<SeenMask>,
    /// Modality holders, iterated in this fixed order.
    pub modalities: Vec<(Modality, ModalityData)>,
}

impl MultimodalState {
    /// Assemble a state, validating modality uniqueness and that every
    /// holder covers the 3D point set.
    ///
    /// # Errors
    ///
    /// Returns [`MultimodalError::DuplicateModality`] for a repeated
    /// modality key and [`MultimodalError::PointCountMismatch`] for a
    /// holder whose mapping does not cover the point set.
    pub fn new(
        x3d: Point3d,
        modalities: Vec<(Modality, ModalityData)>,
    ) -> Result<Self, MultimodalError> {
        for (i, (m, data)) in modalities.iter().enumerate() {
            if modalities[..i].iter().any(|(other, _)| other == m) {
                return Err(MultimodalError::DuplicateModality { modality: *m });
            }
            if data.num_points() != x3d.num_points() {
                return Err(MultimodalError::PointCountMismatch {
                    points: x3d.num_points(),
                    groups: data.num_points(),
                });
            }
        }
        Ok(Self {
            x3d,
            seen: None,
            modalities,
        })
    }

    /// The holder attached to a modality, if configured.
    pub fn modality(&self, modality: Modality) -> Option<&ModalityData> {
        self.modalities
            .iter()
            .find(|(m, _)| *m == modality)
            .map(|(_, d)| d)
    }
}

/// Per-forward execution context: training flag and the random source
/// for dropout masks.
#[derive(Debug)]
pub struct ForwardCtx {
    /// Whether dropout is active.
    pub training: bool,
    rng: StdRng,
}

impl ForwardCtx {
    /// An evaluation context; dropout is disabled.
    pub fn eval() -> Self {
        Self {
            training: false,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// A training context seeded for reproducible dropout masks.
    pub fn train(seed: u64) -> Self {
        Self {
            training: true,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The random source.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
