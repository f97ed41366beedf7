//! Integration tests: double-count removal properties and end-to-end
//! runs through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use livedead_pipeline::{
    CapabilityError, CentroidSet, Channel, ChannelPair, Extractor, GrayImage, LiveDeadReport,
    NoClock, Pipeline, PipelineError, PipelineParameters, Point, Preprocessor, Stage, analyze,
};

fn set(points: &[(i32, i32)]) -> CentroidSet {
    points.iter().map(|&(x, y)| Point::new(x, y)).collect()
}

/// Deterministic scatter of `n` points in a 200x200 field.
fn scatter(n: usize, seed: u64) -> CentroidSet {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            let x = i32::try_from((state >> 33) % 200).unwrap();
            let y = i32::try_from((state >> 17) % 200).unwrap();
            Point::new(x, y)
        })
        .collect()
}

// ───────────────────────── Double-count removal ─────────────────────────

#[test]
fn scenario_one_live_point_overlaps_a_dead_point() {
    let result = analyze(&set(&[(0, 0), (100, 100)]), &set(&[(1, 1)]), 20.0);
    assert_eq!(result.validated_live_count, 1);
    assert_eq!(result.dead_count, 1);
    assert!(!result.audit[0].retained);
    assert!(result.audit[1].retained);
}

#[test]
fn scenario_no_live_points() {
    let result = analyze(&set(&[]), &set(&[(5, 5), (10, 10)]), 20.0);
    assert_eq!(result.validated_live_count, 0);
    assert_eq!(result.dead_count, 2);
}

#[test]
fn scenario_no_dead_points() {
    let result = analyze(&set(&[(0, 0)]), &set(&[]), 20.0);
    assert_eq!(result.validated_live_count, 1);
    assert_eq!(result.dead_count, 0);
}

#[test]
fn live_count_never_exceeds_candidates_and_shrinks_with_radius() {
    let live = scatter(60, 1);
    let dead = scatter(25, 2);
    let mut previous = usize::MAX;
    for r in [0.0, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0, 300.0] {
        let result = analyze(&live, &dead, r);
        assert!(result.validated_live_count <= live.len());
        assert!(
            result.validated_live_count <= previous,
            "radius {r} un-discarded a point"
        );
        assert_eq!(result.dead_count, dead.len());
        previous = result.validated_live_count;
    }
    // Every live point is within 300 px of some dead point in a 200x200 field.
    assert_eq!(previous, 0);
}

#[test]
fn zero_radius_keeps_every_live_point() {
    let live = scatter(40, 3);
    let result = analyze(&live, &live, 0.0);
    assert_eq!(result.validated_live_count, live.len());
}

#[test]
fn analysis_is_idempotent() {
    let live = scatter(30, 4);
    let dead = scatter(30, 5);
    assert_eq!(analyze(&live, &dead, 15.0), analyze(&live, &dead, 15.0));
}

#[test]
fn input_order_does_not_change_the_outcome() {
    let live = scatter(50, 6);
    let dead = scatter(20, 7);
    let forward = analyze(&live, &dead, 18.0);

    let live_rev: CentroidSet = live.iter().rev().copied().collect();
    let dead_rev: CentroidSet = dead.iter().rev().copied().collect();
    let reversed = analyze(&live_rev, &dead_rev, 18.0);

    assert_eq!(forward.validated_live_count, reversed.validated_live_count);
    assert_eq!(forward.dead_count, reversed.dead_count);

    let mut kept_forward: Vec<Point> = forward.retained_points().collect();
    let mut kept_reversed: Vec<Point> = reversed.retained_points().collect();
    kept_forward.sort_by_key(|p| (p.x, p.y));
    kept_reversed.sort_by_key(|p| (p.x, p.y));
    assert_eq!(kept_forward, kept_reversed);
}

#[test]
fn matches_exhaustive_scan() {
    let live = scatter(80, 8);
    let dead = scatter(35, 9);
    let radius = 12.0_f64;
    let result = analyze(&live, &dead, radius);
    for entry in &result.audit {
        let near_any = dead
            .iter()
            .any(|&q| entry.point.distance(q) < radius);
        assert_eq!(entry.retained, !near_any, "point {}", entry.point);
    }
}

#[test]
fn report_lists_every_original_live_candidate() {
    let live = set(&[(0, 0), (100, 100), (3, 4)]);
    let result = analyze(&live, &set(&[(1, 1)]), 20.0);
    let report = LiveDeadReport::from(&result);
    assert_eq!(report.number_live, 1);
    assert_eq!(report.number_dead, 1);
    assert_eq!(report.candidates().collect::<Vec<_>>(), live.points());
    assert_eq!(
        report.table.to_csv(),
        "Start X,Start Y\n0,0\n100,100\n3,4\n"
    );
}

// ───────────────────────── Controller ─────────────────────────

/// Hands out a fixed mask regardless of the input.
struct FixedMask(GrayImage);

impl Preprocessor for FixedMask {
    fn segment(
        &self,
        _image: &GrayImage,
        _rolling_ball_radius: f64,
        _tolerance: f64,
    ) -> Result<GrayImage, CapabilityError> {
        Ok(self.0.clone())
    }
}

/// Returns one centroid per foreground pixel, in raster order.
struct PixelCentroids;

impl Extractor for PixelCentroids {
    fn extract_centroids(
        &self,
        mask: &GrayImage,
        _min_size: f64,
    ) -> Result<CentroidSet, CapabilityError> {
        Ok(mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 255)
            .map(|(x, y, _)| Point::new(i32::try_from(x).unwrap(), i32::try_from(y).unwrap()))
            .collect())
    }
}

fn stub_pipeline(automatic: bool) -> Pipeline<FixedMask, PixelCentroids, NoClock> {
    let mut mask = GrayImage::new(50, 50);
    mask.put_pixel(5, 5, image::Luma([255]));
    mask.put_pixel(40, 40, image::Luma([255]));
    let pair = ChannelPair::new(GrayImage::new(50, 50), GrayImage::new(50, 50));
    let params = PipelineParameters {
        automatic,
        ..PipelineParameters::default()
    };
    Pipeline::with_capabilities(pair, params, FixedMask(mask), PixelCentroids, NoClock).unwrap()
}

#[test]
fn manual_navigation_saturates() {
    let mut pipeline = stub_pipeline(false);
    assert_eq!(pipeline.stage(), Stage::PreprocessLive);
    pipeline.advance();
    pipeline.advance();
    assert_eq!(pipeline.advance(), Stage::LocateDead);
    assert_eq!(pipeline.retreat(), Stage::PreprocessDead);
    pipeline.advance();
    pipeline.advance();
    assert_eq!(pipeline.advance(), Stage::Analyze);
}

#[test]
fn automatic_mode_finishes_in_one_call() {
    let mut pipeline = stub_pipeline(true);
    assert_eq!(pipeline.run_current().unwrap(), Stage::Analyze);
    let result = pipeline.finish().unwrap();
    // Same mask in both channels: every live point sits on a dead one.
    assert_eq!(result.validated_live_count, 0);
    assert_eq!(result.dead_count, 2);
}

#[test]
fn automatic_mode_from_a_later_stage_runs_the_rest() {
    let mut pipeline = stub_pipeline(false);
    pipeline.run_stage(Stage::PreprocessLive).unwrap();
    pipeline.run_stage(Stage::LocateLive).unwrap();

    let mut params = pipeline.parameters().clone();
    params.automatic = true;
    pipeline.set_parameters(params).unwrap();
    assert_eq!(pipeline.run_stage(Stage::PreprocessDead).unwrap(), Stage::Analyze);
    assert!(pipeline.result().is_some());
}

#[test]
fn analysis_needs_both_centroid_sets() {
    let mut pipeline = stub_pipeline(false);
    pipeline.run_stage(Stage::PreprocessLive).unwrap();
    pipeline.run_stage(Stage::LocateLive).unwrap();
    let err = pipeline.run_stage(Stage::Analyze).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingInput {
            stage: Stage::Analyze
        }
    ));
    assert_eq!(pipeline.centroids(Channel::Live).unwrap().len(), 2);
}

// ───────────────────────── End to end ─────────────────────────

/// Dim, unevenly lit field with bright round cells.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn field(cells: &[(f64, f64)]) -> GrayImage {
    GrayImage::from_fn(96, 96, |x, y| {
        let mut v = 12.0 + f64::from(x) * 0.2;
        for &(cx, cy) in cells {
            let d2 = (f64::from(x) - cx).powi(2) + (f64::from(y) - cy).powi(2);
            v += 170.0 * (-d2 / 10.0).exp();
        }
        image::Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

#[test]
fn default_capabilities_count_synthetic_cells() {
    let live = field(&[(20.0, 20.0), (70.0, 24.0), (24.0, 70.0), (60.0, 60.0)]);
    let dead = field(&[(21.0, 21.0), (80.0, 80.0)]);
    let params = PipelineParameters {
        rolling_ball_radius: 12.0,
        ..PipelineParameters::default()
    };
    let mut pipeline = Pipeline::new(ChannelPair::new(live, dead), params).unwrap();
    let result = pipeline.run_to_completion().unwrap();

    assert_eq!(result.audit.len(), 4);
    assert_eq!(result.dead_count, 2);
    assert_eq!(result.validated_live_count, 3);

    let diags = pipeline.diagnostics();
    assert_eq!(diags.stages.len(), 5);
    assert!(diags.report().contains("Live: 3  |  Dead: 2"));
}
