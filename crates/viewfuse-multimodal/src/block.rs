use viewfuse_core::SeenMask;

use crate::branch::UnimodalBranch;
use crate::error::MultimodalError;
use crate::reindex::{Block3d, Reindex, ReindexAdapter, ReindexMode};
use crate::state::{ForwardCtx, Modality, MultimodalState};

/// One multimodal downsampling stage:
///
/// ```text
///              -- 3D Conv ---- Merge i -- 3D Conv --
/// State IN          ...         |                     State OUT
///              -- Mod i Conv --|------------------
///                    ...
/// ```
///
/// The down block runs first and may shrink or reorder the 3D point set;
/// the reindexing it applies is propagated into the seen mask and every
/// modality holder before the branches run. The conv block runs last,
/// through the same machinery.
pub struct MultimodalBlockDown {
    down_block: Option<Block3d>,
    conv_block: Option<Block3d>,
    branches: Vec<(Modality, UnimodalBranch)>,
    adapter: ReindexAdapter,
}

impl MultimodalBlockDown {
    /// Assemble a stage from already-instantiated blocks and branches.
    ///
    /// Branches run in the given order. `None` blocks are identities:
    /// state passes through them untouched with no reindexing cost.
    ///
    /// # Errors
    ///
    /// * [`MultimodalError::DuplicateModality`] if a modality appears
    ///   twice in `branches`.
    /// * [`MultimodalError::UnsupportedFormat`] if a block operates on a
    ///   backend the adapter has not enabled.
    pub fn new(
        down_block: Option<Block3d>,
        conv_block: Option<Block3d>,
        branches: Vec<(Modality, UnimodalBranch)>,
        adapter: ReindexAdapter,
    ) -> Result<Self, MultimodalError> {
        for (i, (m, _)) in branches.iter().enumerate() {
            if branches[..i].iter().any(|(other, _)| other == m) {
                return Err(MultimodalError::DuplicateModality { modality: *m });
            }
        }
        for block in [down_block.as_ref(), conv_block.as_ref()].into_iter().flatten() {
            if !adapter.backends().contains(block.backend()) {
                return Err(MultimodalError::UnsupportedFormat {
                    backend: block.backend(),
                });
            }
        }
        Ok(Self {
            down_block,
            conv_block,
            branches,
            adapter,
        })
    }

}

impl std::fmt::Debug for MultimodalBlockDown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultimodalBlockDown")
            .field("down_block", &self.down_block)
            .field("conv_block", &self.conv_block)
            .field("modalities", &self.modalities())
            .finish_non_exhaustive()
    }
}

impl MultimodalBlockDown {
    /// The modalities this stage processes, in branch order.
    pub fn modalities(&self) -> Vec<Modality> {
        self.branches.iter().map(|(m, _)| *m).collect()
    }

    /// Run the stage.
    pub fn forward(
        &self,
        state: MultimodalState,
        ctx: &mut ForwardCtx,
    ) -> Result<MultimodalState, MultimodalError> {
        let mut state = self.forward_3d_block(state, self.down_block.as_ref())?;

        for (modality, branch) in &self.branches {
            let slot = state
                .modalities
                .iter()
                .position(|(m, _)| m == modality)
                .ok_or(MultimodalError::MissingModality {
                    modality: *modality,
                })?;
            let data = state.modalities[slot].1.clone();
            let (x3d, seen_mod, data) = branch.forward(state.x3d, data, ctx)?;
            state.x3d = x3d;
            state.modalities[slot].1 = data;
            state.seen = Some(fold_seen(state.seen.take(), seen_mod)?);
        }

        self.forward_3d_block(state, self.conv_block.as_ref())
    }

    /// Run a 3D block and propagate its reindexing into the seen mask
    /// and every modality holder.
    fn forward_3d_block(
        &self,
        state: MultimodalState,
        block: Option<&Block3d>,
    ) -> Result<MultimodalState, MultimodalError> {
        let Some(block) = block else {
            return Ok(state);
        };

        let MultimodalState {
            x3d,
            seen,
            modalities,
        } = state;
        let (x3d, reindex) = self.adapter.forward_block(block, x3d)?;

        let Reindex { idx, mode } = reindex;
        let Some(idx) = idx else {
            // point set untouched: skip all reindexing work
            return Ok(MultimodalState {
                x3d,
                seen,
                modalities,
            });
        };
        log::debug!(
            "3d block reindex: {:?} over {} indices -> {} points",
            mode,
            idx.len(),
            x3d.num_points()
        );

        let seen = match seen {
            None => None,
            Some(seen) => {
                let seen = match mode {
                    ReindexMode::Pick => seen.pick(&idx)?,
                    ReindexMode::Merge => seen.merge(&idx)?,
                };
                if seen.len() != x3d.num_points() {
                    return Err(MultimodalError::ReindexLength {
                        expected: x3d.num_points(),
                        actual: seen.len(),
                    });
                }
                Some(seen)
            }
        };

        let modalities = modalities
            .into_iter()
            .map(|(m, data)| Ok((m, data.select_points(Some(&idx), mode)?)))
            .collect::<Result<Vec<_>, MultimodalError>>()?;

        Ok(MultimodalState {
            x3d,
            seen,
            modalities,
        })
    }
}

/// Fold a branch seen mask into a running mask by logical OR.
///
/// Exposed for callers assembling pipelines outside
/// [`MultimodalBlockDown`]; OR is commutative, so modality order does
/// not change the result.
pub fn fold_seen(
    running: Option<SeenMask>,
    update: SeenMask,
) -> Result<SeenMask, MultimodalError> {
    match running {
        None => Ok(update),
        Some(running) => Ok(running.or(&update)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewfuse_core::{CsrIndex, Features};
    use viewfuse_nn::{FeatureMap, MaxPool, MeanPool, StridedSampleBlock, SumFusion};

    use crate::modality::{ModalityData, Setting};
    use crate::reindex::BackendSet;
    use crate::state::Point3d;

    fn setting_5pt(values: [f32; 4]) -> Setting {
        // 5 points; points 0 and 2 each see one view of one observation
        let map = FeatureMap::new(Features::from_vec(4, 1, values.to_vec()).unwrap(), 2, 2).unwrap();
        let view_csr = CsrIndex::from_counts(&[1, 0, 1, 0, 0]);
        let atomic_csr = CsrIndex::from_counts(&[1, 1]);
        let pixel_coords = vec![[0, 0], [1, 1]];
        let projection = Features::from_vec(2, 1, vec![1.0, 1.0]).unwrap();
        Setting::new(map, view_csr, atomic_csr, pixel_coords, projection).unwrap()
    }

    fn image_branch() -> UnimodalBranch {
        UnimodalBranch::new(
            None,
            Box::new(MaxPool),
            Box::new(MeanPool),
            Box::new(SumFusion),
        )
    }

    fn state_5pt() -> MultimodalState {
        let data = ModalityData::new(vec![setting_5pt([2.0, 0.0, 0.0, 7.0])]).unwrap();
        MultimodalState::new(
            Point3d::Dense(Features::zeros(5, 1)),
            vec![(Modality::Image, data)],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_modality_rejected() {
        let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
        let err = MultimodalBlockDown::new(
            None,
            None,
            vec![
                (Modality::Image, image_branch()),
                (Modality::Image, image_branch()),
            ],
            adapter,
        )
        .unwrap_err();
        assert_eq!(
            err,
            MultimodalError::DuplicateModality {
                modality: Modality::Image
            }
        );
    }

    #[test]
    fn test_block_backend_must_be_enabled() {
        let adapter = ReindexAdapter::new(BackendSet::only(crate::state::Backend::SparseA)).unwrap();
        let err = MultimodalBlockDown::new(
            Some(Block3d::Dense(Box::new(
                StridedSampleBlock::new(2, None).unwrap(),
            ))),
            None,
            vec![],
            adapter,
        )
        .unwrap_err();
        assert_eq!(
            err,
            MultimodalError::UnsupportedFormat {
                backend: crate::state::Backend::Dense
            }
        );
    }

    #[test]
    fn test_identity_blocks_pass_state_through() {
        let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
        let block = MultimodalBlockDown::new(None, None, vec![], adapter).unwrap();
        let state = state_5pt();
        let mut ctx = ForwardCtx::eval();
        let out = block.forward(state.clone(), &mut ctx).unwrap();
        assert_eq!(out.x3d, state.x3d);
        assert!(out.seen.is_none());
    }

    #[test]
    fn test_down_block_reindexes_before_branch() {
        let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
        let block = MultimodalBlockDown::new(
            // picks points [0, 2, 4]
            Some(Block3d::Dense(Box::new(
                StridedSampleBlock::new(2, None).unwrap(),
            ))),
            None,
            vec![(Modality::Image, image_branch())],
            adapter,
        )
        .unwrap();

        let mut ctx = ForwardCtx::eval();
        let out = block.forward(state_5pt(), &mut ctx).unwrap();
        assert_eq!(out.x3d.num_points(), 3);
        // former point 2 is now point 1 and still sees its observation
        let seen = out.seen.unwrap();
        assert_eq!(seen.as_slice(), &[true, true, false]);
        assert_eq!(out.x3d.features().row(1), &[0.0 + 7.0]);
        // holder was reindexed alongside
        assert_eq!(out.modalities[0].1.num_points(), 3);
        assert_eq!(out.modalities[0].1.num_views(), 2);
    }

    #[test]
    fn test_seen_or_across_modalities_commutes() {
        // image sees point 0, depth sees point 2
        let image = ModalityData::new(vec![{
            let map = FeatureMap::new(Features::zeros(4, 1), 2, 2).unwrap();
            let view_csr = CsrIndex::from_counts(&[1, 0, 0, 0, 0]);
            let atomic_csr = CsrIndex::from_counts(&[1]);
            Setting::new(map, view_csr, atomic_csr, vec![[0, 0]], Features::zeros(1, 1)).unwrap()
        }])
        .unwrap();
        let depth = ModalityData::new(vec![{
            let map = FeatureMap::new(Features::zeros(4, 1), 2, 2).unwrap();
            let view_csr = CsrIndex::from_counts(&[0, 0, 1, 0, 0]);
            let atomic_csr = CsrIndex::from_counts(&[1]);
            Setting::new(map, view_csr, atomic_csr, vec![[0, 0]], Features::zeros(1, 1)).unwrap()
        }])
        .unwrap();

        let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
        let run = |order: Vec<Modality>| {
            let branches = order
                .into_iter()
                .map(|m| (m, image_branch()))
                .collect::<Vec<_>>();
            let block = MultimodalBlockDown::new(None, None, branches, adapter.clone()).unwrap();
            let state = MultimodalState::new(
                Point3d::Dense(Features::zeros(5, 1)),
                vec![
                    (Modality::Image, image.clone()),
                    (Modality::Depth, depth.clone()),
                ],
            )
            .unwrap();
            let mut ctx = ForwardCtx::eval();
            block.forward(state, &mut ctx).unwrap().seen.unwrap()
        };

        let ab = run(vec![Modality::Image, Modality::Depth]);
        let ba = run(vec![Modality::Depth, Modality::Image]);
        assert_eq!(ab, ba);
        assert_eq!(ab.as_slice(), &[true, false, true, false, false]);
    }

    #[test]
    fn test_missing_modality_is_an_error() {
        let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
        let block = MultimodalBlockDown::new(
            None,
            None,
            vec![(Modality::Depth, image_branch())],
            adapter,
        )
        .unwrap();
        let mut ctx = ForwardCtx::eval();
        let err = block.forward(state_5pt(), &mut ctx).unwrap_err();
        assert_eq!(
            err,
            MultimodalError::MissingModality {
                modality: Modality::Depth
            }
        );
    }
}
