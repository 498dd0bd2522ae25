//! End-to-end session scenarios

use std::sync::Arc;
use std::time::Duration;

use ndarray::Array3;
use voxseg_algorithms::classification::{ClassifierKind, ForestParams, TreeParams};
use voxseg_algorithms::texture::FeatureVolume;
use voxseg_core::{CancelToken, Error, Orientation, Volume};
use voxseg_engine::{
    BrushModifiers, CommitStatus, ConfigUpdate, LabelField, MaskCompositor, MergeMode, PaddedMask,
    SegmentOutcome, SegmentScope, SegmentationAlgorithm, SegmentationStrategy, Session, SessionConfig,
    SessionState, StorageConfig, StrategyInput, StrokeEvent, StrokePoint,
};
use voxseg_engine::strategy::{feature_params, FloodFillStrategy};
use voxseg_engine::{run_strategy, FeatureCache};

const WAIT: Duration = Duration::from_secs(60);

fn dab(orientation: Orientation, slice: usize, center: (isize, isize), background: bool) -> [StrokeEvent; 2] {
    [
        StrokeEvent::Start {
            point: StrokePoint { orientation, slice, center },
            modifiers: BrushModifiers { alternate: background, erase: false },
        },
        StrokeEvent::End,
    ]
}

fn paint(session: &mut Session<i16>, events: [StrokeEvent; 2]) {
    for event in events {
        session.handle(event).unwrap();
    }
}

fn single_voxel_config(algorithm: SegmentationAlgorithm) -> SessionConfig {
    SessionConfig { algorithm, brush_size: 1, ..Default::default() }
}

/// Left half 10, right half 200 along x
fn two_region_volume() -> Arc<Volume<i16>> {
    Arc::new(Volume::from_array(Array3::from_shape_fn((6, 8, 12), |(_, _, x)| if x < 6 { 10 } else { 200 })))
}

#[test]
fn classifier_separates_centre_from_corner_on_constant_volume() {
    let volume = Arc::new(Volume::<i16>::filled(10, 10, 10, 100));
    let config = single_voxel_config(SegmentationAlgorithm::Classifier);
    let (mut session, _handle) = Session::new(volume, config, MaskCompositor::default()).unwrap();
    let mut mask = PaddedMask::new((10, 10, 10));

    paint(&mut session, dab(Orientation::Axial, 5, (5, 5), false));
    paint(&mut session, dab(Orientation::Axial, 0, (0, 0), true));
    let report = session.wait(&mut mask, WAIT).unwrap().unwrap();

    assert!(report.is_committed(), "{report:?}");
    assert_eq!(mask.get(5, 5, 5), Some(253));
    assert_eq!(mask.get(0, 0, 0), Some(0));
    assert!(mask.is_edited());
}

#[test]
fn classifier_refit_is_deterministic() {
    let volume = two_region_volume();
    let run = || {
        let config = single_voxel_config(SegmentationAlgorithm::Classifier);
        let (mut session, _handle) = Session::new(Arc::clone(&volume), config, MaskCompositor::default()).unwrap();
        paint(&mut session, dab(Orientation::Axial, 3, (4, 2), false));
        paint(&mut session, dab(Orientation::Axial, 3, (4, 5), true));
        paint(&mut session, dab(Orientation::Axial, 3, (4, 9), true));
        let mut mask = PaddedMask::new((6, 8, 12));
        session.segment_now(&mut mask).unwrap();
        mask
    };
    assert_eq!(run().padded(), run().padded());
}

#[test]
fn flood_fill_with_identical_features_fills_everything() {
    let volume = Volume::<i16>::filled(4, 5, 6, 0);
    let features = FeatureVolume::from_descriptors(Array3::from_elem((4, 5, 6), [2.0, 2.0, 2.0]));
    let mut markers = Array3::zeros((4, 5, 6));
    markers[(1, 2, 3)] = 1;
    let input = StrategyInput { volume: &volume, features: Some(&features), markers: markers.view(), scope: SegmentScope::Volume };

    let outcome = FloodFillStrategy.segment(&input, &SessionConfig::default(), &CancelToken::new()).unwrap();
    let SegmentOutcome::Labels(output) = outcome else {
        panic!("flood fill declined");
    };
    assert_eq!(output.field, LabelField::Inclusion(Array3::from_elem((4, 5, 6), true)));

    let mut mask = PaddedMask::new((4, 5, 6));
    MaskCompositor::default().commit(&mut mask, &output, MergeMode::Overwrite).unwrap();
    assert!(mask.interior().iter().all(|v| *v == 253));
}

#[test]
fn empty_release_leaves_mask_unedited() {
    let volume = two_region_volume();
    let (mut session, _handle) =
        Session::new(volume, SessionConfig::default(), MaskCompositor::default()).unwrap();
    let mut mask = PaddedMask::new((6, 8, 12));

    let erase = StrokeEvent::Start {
        point: StrokePoint { orientation: Orientation::Axial, slice: 2, center: (3, 3) },
        modifiers: BrushModifiers { alternate: false, erase: true },
    };
    session.handle(erase).unwrap();
    session.handle(StrokeEvent::End).unwrap();
    let report = session.wait(&mut mask, WAIT).unwrap().unwrap();

    assert!(matches!(report.status, CommitStatus::NotReady(_)));
    assert!(!mask.is_edited());
    assert!(mask.padded().iter().all(|v| *v == 0));
}

#[test]
fn single_label_never_commits_for_any_algorithm() {
    for algorithm in SegmentationAlgorithm::ALL {
        let (mut session, _handle) =
            Session::new(two_region_volume(), single_voxel_config(algorithm), MaskCompositor::default()).unwrap();
        let mut mask = PaddedMask::new((6, 8, 12));
        paint(&mut session, dab(Orientation::Axial, 2, (3, 3), true));
        let report = session.wait(&mut mask, WAIT).unwrap().unwrap();
        assert!(matches!(report.status, CommitStatus::NotReady(_)), "{algorithm:?}: {report:?}");
        assert!(!mask.is_edited());
    }
}

#[test]
fn watershed_commits_slice_then_expands_to_volume() {
    let (mut session, _handle) = Session::new(
        two_region_volume(),
        single_voxel_config(SegmentationAlgorithm::Watershed),
        MaskCompositor::default(),
    )
    .unwrap();
    let mut mask = PaddedMask::new((6, 8, 12));

    paint(&mut session, dab(Orientation::Axial, 2, (4, 1), false));
    paint(&mut session, dab(Orientation::Axial, 2, (4, 10), true));
    let report = session.wait(&mut mask, WAIT).unwrap().unwrap();
    assert!(report.is_committed());

    let foreground_at = |mask: &PaddedMask, z: usize| {
        (0..8).flat_map(|y| (0..12).map(move |x| (y, x))).filter(|&(y, x)| mask.get(z, y, x) == Some(253)).count()
    };
    assert_eq!(foreground_at(&mask, 2), 8 * 6);
    assert_eq!(foreground_at(&mask, 0), 0);

    let report = session.expand_to_3d(&mut mask).unwrap();
    assert!(report.is_committed());
    for z in 0..6 {
        assert_eq!(foreground_at(&mask, z), 8 * 6, "slice {z}");
    }
}

#[test]
fn additive_commits_never_downgrade_foreground() {
    let config = SessionConfig { merge_mode: MergeMode::Additive, ..single_voxel_config(SegmentationAlgorithm::Watershed) };
    let (mut session, _handle) = Session::new(two_region_volume(), config, MaskCompositor::default()).unwrap();
    let mut mask = PaddedMask::new((6, 8, 12));

    paint(&mut session, dab(Orientation::Axial, 2, (4, 1), false));
    paint(&mut session, dab(Orientation::Axial, 2, (4, 10), true));
    session.wait(&mut mask, WAIT).unwrap().unwrap();
    let first = mask.padded().clone();

    // A background mark inside the foreground basin shrinks the new basin
    paint(&mut session, dab(Orientation::Axial, 2, (0, 0), true));
    session.wait(&mut mask, WAIT).unwrap().unwrap();

    for (before, after) in first.iter().zip(mask.padded().iter()) {
        if *before == 253 {
            assert_eq!(*after, 253);
        }
    }
}

#[test]
fn last_release_wins() {
    let (mut session, _handle) = Session::new(
        two_region_volume(),
        single_voxel_config(SegmentationAlgorithm::WatershedIft),
        MaskCompositor::default(),
    )
    .unwrap();
    let mut mask = PaddedMask::new((6, 8, 12));

    paint(&mut session, dab(Orientation::Axial, 1, (4, 1), false));
    paint(&mut session, dab(Orientation::Axial, 1, (4, 10), true));
    paint(&mut session, dab(Orientation::Axial, 4, (4, 1), false));
    paint(&mut session, dab(Orientation::Axial, 4, (4, 10), true));
    let newest = session.pending_job().unwrap();

    let report = session.wait(&mut mask, WAIT).unwrap().unwrap();
    assert_eq!(report.job, newest);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.poll(&mut mask).unwrap().is_none());
    assert_eq!(mask.get(4, 0, 0), Some(253));
}

#[test]
fn config_updates_apply_before_next_release() {
    let (mut session, handle) =
        Session::new(two_region_volume(), single_voxel_config(SegmentationAlgorithm::Watershed), MaskCompositor::default())
            .unwrap();
    handle.send(ConfigUpdate::Algorithm(SegmentationAlgorithm::FloodFill)).unwrap();
    handle.send(ConfigUpdate::MgSize(0)).unwrap();

    paint(&mut session, dab(Orientation::Axial, 2, (4, 1), false));
    assert_eq!(session.config().algorithm, SegmentationAlgorithm::FloodFill);
    assert_eq!(session.config().mg_size, 3);

    let mut mask = PaddedMask::new((6, 8, 12));
    let report = session.wait(&mut mask, WAIT).unwrap().unwrap();
    assert!(report.is_committed(), "{report:?}");
}

#[test]
fn storage_failure_aborts_session() {
    let config = SessionConfig {
        storage: StorageConfig { resident_limit_bytes: 0, spill_dir: Some("/nonexistent/voxseg-spill".into()) },
        ..SessionConfig::default()
    };
    let (mut session, _handle) = Session::new(two_region_volume(), config, MaskCompositor::default()).unwrap();
    let [start, end] = dab(Orientation::Axial, 0, (1, 1), false);

    let err = session.handle(start).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(session.handle(start).unwrap(), SessionState::Aborted);
    assert_eq!(session.handle(end).unwrap(), SessionState::Aborted);

    let mut mask = PaddedMask::new((6, 8, 12));
    let report = session.segment_now(&mut mask).unwrap();
    assert!(matches!(report.status, CommitStatus::Declined(_)));
    assert!(!mask.is_edited());
}

#[test]
fn degenerate_training_set_declines_commit() {
    // Both marks sit on interior voxels of a constant volume: identical descriptors
    let volume = Arc::new(Volume::<i16>::filled(8, 8, 8, 50));
    let (mut session, _handle) =
        Session::new(volume, single_voxel_config(SegmentationAlgorithm::Classifier), MaskCompositor::default()).unwrap();
    let mut mask = PaddedMask::new((8, 8, 8));

    paint(&mut session, dab(Orientation::Axial, 3, (3, 3), false));
    paint(&mut session, dab(Orientation::Axial, 4, (4, 4), true));
    let report = session.wait(&mut mask, WAIT).unwrap().unwrap();

    assert!(matches!(report.status, CommitStatus::Declined(_)), "{report:?}");
    assert!(!mask.is_edited());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn classifier_keeps_a_single_background_mark_above_the_sample_cap() {
    let volume = Arc::new(Volume::<i16>::filled(10, 10, 10, 100));
    let tree = TreeParams { max_training_samples: 16, ..Default::default() };
    let config = SessionConfig {
        algorithm: SegmentationAlgorithm::Classifier,
        brush_size: 5,
        classifier: ClassifierKind::RandomForest(ForestParams { trees: 9, tree, ..Default::default() }),
        ..Default::default()
    };
    let (mut session, handle) = Session::new(volume, config, MaskCompositor::default()).unwrap();
    let mut mask = PaddedMask::new((10, 10, 10));

    // 13 voxels per dab on five slices against one background voxel
    for slice in 3..8 {
        paint(&mut session, dab(Orientation::Axial, slice, (5, 5), false));
    }
    handle.send(ConfigUpdate::BrushSize(1)).unwrap();
    paint(&mut session, dab(Orientation::Axial, 0, (0, 0), true));
    let counts = session.markers().unwrap().counts().unwrap();
    assert!(counts.foreground > 16);
    assert_eq!(counts.background, 1);

    let report = session.segment_now(&mut mask).unwrap();
    assert!(report.is_committed(), "{report:?}");
    assert_eq!(mask.get(5, 5, 5), Some(253));
    assert_eq!(mask.get(0, 0, 0), Some(0));
}

#[test]
fn superseded_job_still_warms_the_feature_cache() {
    let volume = Volume::<i16>::from_array(Array3::from_shape_fn((48, 48, 48), |(z, y, x)| ((z * 7 + y * 3 + x) % 50) as i16));
    let mut markers = Array3::zeros((48, 48, 48));
    markers[(10, 10, 10)] = 1;
    markers[(30, 30, 30)] = 2;
    let config = single_voxel_config(SegmentationAlgorithm::Classifier);
    let cache = FeatureCache::new();
    let cancel = CancelToken::new();

    let outcome = std::thread::scope(|scope| {
        let token = cancel.clone();
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            token.cancel();
        });
        run_strategy(&volume, markers.view(), SegmentScope::Volume, &config, &cache, &cancel).unwrap()
    });

    assert!(matches!(outcome, SegmentOutcome::Cancelled | SegmentOutcome::Labels(_)), "{outcome:?}");
    assert!(cache.is_cached(volume.id(), feature_params(&config)));
}
