use crate::block::MultimodalBlockDown;
use crate::error::MultimodalError;
use crate::state::{ForwardCtx, MultimodalState};

/// A stack of multimodal downsampling stages applied in sequence.
///
/// Each stage may shrink or reorder the 3D point set; the stage itself
/// propagates that reindexing into every modality holder, so stages
/// compose without further bookkeeping. The final state carries the
/// fused features and seen mask in backbone point order, ready for a
/// prediction head.
pub struct MultimodalEncoder {
    stages: Vec<MultimodalBlockDown>,
}

impl MultimodalEncoder {
    /// Assemble an encoder from its stages.
    pub fn new(stages: Vec<MultimodalBlockDown>) -> Self {
        Self { stages }
    }

    /// Number of stages.
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage in order.
    pub fn forward(
        &self,
        state: MultimodalState,
        ctx: &mut ForwardCtx,
    ) -> Result<MultimodalState, MultimodalError> {
        let mut state = state;
        for (i, stage) in self.stages.iter().enumerate() {
            log::debug!(
                "encoder stage {}/{}: {} points in",
                i + 1,
                self.stages.len(),
                state.x3d.num_points()
            );
            state = stage.forward(state, ctx)?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewfuse_core::{CsrIndex, Features};
    use viewfuse_nn::{FeatureMap, MaxPool, MeanPool, StridedSampleBlock, SumFusion};

    use crate::block::MultimodalBlockDown;
    use crate::branch::UnimodalBranch;
    use crate::modality::{ModalityData, Setting};
    use crate::reindex::{BackendSet, Block3d, ReindexAdapter};
    use crate::state::{Modality, MultimodalState, Point3d};

    fn branch() -> UnimodalBranch {
        UnimodalBranch::new(
            None,
            Box::new(MaxPool),
            Box::new(MeanPool),
            Box::new(SumFusion),
        )
    }

    fn stage(stride: Option<usize>) -> MultimodalBlockDown {
        let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
        let down = stride.map(|s| {
            Block3d::Dense(Box::new(StridedSampleBlock::new(s, None).unwrap()))
        });
        MultimodalBlockDown::new(down, None, vec![(Modality::Image, branch())], adapter).unwrap()
    }

    fn state_8pt() -> MultimodalState {
        // every even point sees one observation
        let map = FeatureMap::new(Features::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap(), 2, 2)
            .unwrap();
        let view_csr = CsrIndex::from_counts(&[1, 0, 1, 0, 1, 0, 1, 0]);
        let atomic_csr = CsrIndex::from_counts(&[1, 1, 1, 1]);
        let pixel_coords = vec![[0, 0], [1, 0], [0, 1], [1, 1]];
        let projection = Features::zeros(4, 1);
        let setting = Setting::new(map, view_csr, atomic_csr, pixel_coords, projection).unwrap();
        let data = ModalityData::new(vec![setting]).unwrap();
        MultimodalState::new(
            Point3d::Dense(Features::zeros(8, 1)),
            vec![(Modality::Image, data)],
        )
        .unwrap()
    }

    #[test]
    fn test_two_stage_encoder_shrinks_and_stays_aligned() {
        let encoder = MultimodalEncoder::new(vec![stage(Some(2)), stage(Some(2))]);
        let mut ctx = crate::state::ForwardCtx::eval();
        let out = encoder.forward(state_8pt(), &mut ctx).unwrap();

        // 8 -> 4 -> 2 points; survivors are former points 0 and 4,
        // both seen
        assert_eq!(out.x3d.num_points(), 2);
        assert_eq!(out.modalities[0].1.num_points(), 2);
        assert_eq!(out.seen.unwrap().as_slice(), &[true, true]);
        // stage 1 fuses 1.0 (pixel 0) and 3.0 (pixel 2); stage 2 fuses
        // them again on the surviving points
        assert_eq!(out.x3d.features().row(0), &[2.0]);
        assert_eq!(out.x3d.features().row(1), &[6.0]);
    }

    #[test]
    fn test_empty_encoder_is_identity() {
        let encoder = MultimodalEncoder::new(vec![]);
        let mut ctx = crate::state::ForwardCtx::eval();
        let state = state_8pt();
        let out = encoder.forward(state.clone(), &mut ctx).unwrap();
        assert_eq!(out.x3d, state.x3d);
        assert_eq!(encoder.num_stages(), 0);
    }
}
