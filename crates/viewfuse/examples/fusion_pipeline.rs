//! Runs a two-stage multimodal encoder over a synthetic sample: a dense
//! point cloud with one image modality, downsampled twice while the
//! image mapping follows along.

use viewfuse::core::{CsrIndex, Features};
use viewfuse::multimodal::{
    BackendSet, Block3d, Modality, ModalityData, MultimodalBlockDown, MultimodalEncoder,
    MultimodalState, Point3d, ReindexAdapter, Setting, UnimodalBranch,
};
use viewfuse::multimodal::ForwardCtx;
use viewfuse::nn::{FeatureMap, MaxPool, MeanPool, StridedSampleBlock, SumFusion};

fn image_setting(num_points: usize) -> Setting {
    // a 4x4 single-channel image, every other point observed once
    let pixels: Vec<f32> = (0..16).map(|i| i as f32 / 16.0).collect();
    let map = FeatureMap::new(Features::from_vec(16, 1, pixels).unwrap(), 4, 4).unwrap();

    let mut view_counts = vec![0usize; num_points];
    let mut pixel_coords = Vec::new();
    for p in (0..num_points).step_by(2) {
        view_counts[p] = 1;
        pixel_coords.push([(p % 4) as u32, (p / 4) as u32]);
    }
    let num_views = pixel_coords.len();
    let view_csr = CsrIndex::from_counts(&view_counts);
    let atomic_csr = CsrIndex::from_counts(&vec![1; num_views]);
    let projection = Features::zeros(num_views, 1);

    Setting::new(map, view_csr, atomic_csr, pixel_coords, projection).unwrap()
}

fn stage() -> MultimodalBlockDown {
    let adapter = ReindexAdapter::new(BackendSet::all()).unwrap();
    let branch = UnimodalBranch::new(
        None,
        Box::new(MaxPool),
        Box::new(MeanPool),
        Box::new(SumFusion),
    );
    MultimodalBlockDown::new(
        Some(Block3d::Dense(Box::new(
            StridedSampleBlock::new(2, None).unwrap(),
        ))),
        None,
        vec![(Modality::Image, branch)],
        adapter,
    )
    .unwrap()
}

fn main() {
    env_logger::init();

    let num_points = 16;
    let data = ModalityData::new(vec![image_setting(num_points)]).unwrap();
    let state = MultimodalState::new(
        Point3d::Dense(Features::zeros(num_points, 1)),
        vec![(Modality::Image, data)],
    )
    .unwrap();

    let encoder = MultimodalEncoder::new(vec![stage(), stage()]);
    let mut ctx = ForwardCtx::eval();
    let out = encoder.forward(state, &mut ctx).unwrap();

    let seen = out.seen.expect("at least one branch ran");
    log::info!(
        "encoded {} -> {} points, {} seen",
        num_points,
        out.x3d.num_points(),
        seen.count_seen()
    );
    for (i, (&s, row)) in seen
        .as_slice()
        .iter()
        .zip((0..out.x3d.num_points()).map(|i| out.x3d.features().row(i)))
        .enumerate()
    {
        println!("point {i:2}  seen={s}  features={row:?}");
    }
}
