//! livedead-pipeline: staged live/dead cell counting (sans-IO).
//!
//! Counts cells in a pair of fluorescence images through five stages:
//! preprocess live -> locate live -> preprocess dead -> locate dead ->
//! analyze. Each preprocessing stage bins the channel, subtracts a
//! rolling-ball background and splits touching cells with a
//! maxima-seeded watershed; each locating stage reduces the mask to one
//! centroid per particle; the analysis drops live centroids that sit on
//! top of a dead one, so a cell stained in both channels is counted once,
//! as dead.
//!
//! The image-processing steps sit behind the [`Preprocessor`] and
//! [`Extractor`] traits and can be replaced. [`Pipeline`] drives the
//! stages one at a time or all at once; [`process`] is the one-call
//! entry point.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and images and returns structured data. Reading files and
//! printing results lives in `livedead-cli`.

pub mod background;
pub mod channel;
pub mod dedup;
pub mod diagnostics;
pub mod extract;
pub mod maxima;
pub mod params;
pub mod pipeline;
pub mod report;
pub mod segment;
pub mod stage;
pub mod types;

pub use channel::ChannelPair;
pub use dedup::{AuditEntry, ValidatedResult, analyze};
pub use diagnostics::{Clock, NoClock, PipelineDiagnostics};
pub use extract::{Extractor, ParticleAnalyzer};
pub use params::PipelineParameters;
pub use pipeline::Pipeline;
pub use report::{LiveDeadReport, Table};
pub use segment::{Preprocessor, RollingBallSegmenter};
pub use stage::Stage;
pub use types::{
    CapabilityError, CentroidSet, Channel, Dimensions, GrayImage, PipelineError, Point,
    SegmentedImage,
};

/// Count live and dead cells in two encoded channel images.
///
/// Decodes both images (PNG, JPEG, BMP, TIFF, WebP), then runs every
/// stage with the default capabilities, whatever the
/// [`automatic`](PipelineParameters::automatic) flag says.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
/// if a channel cannot be decoded, [`PipelineError::InvalidParameter`] if
/// `params` is out of range, and [`PipelineError::Capability`] if a stage
/// fails.
pub fn process(
    live_bytes: &[u8],
    dead_bytes: &[u8],
    params: &PipelineParameters,
) -> Result<ValidatedResult, PipelineError> {
    process_with_diagnostics(live_bytes, dead_bytes, params, NoClock).map(|(result, _)| result)
}

/// Like [`process`], also returning per-stage diagnostics timed with
/// `clock`.
///
/// # Errors
///
/// See [`process`].
pub fn process_with_diagnostics<C: Clock>(
    live_bytes: &[u8],
    dead_bytes: &[u8],
    params: &PipelineParameters,
    clock: C,
) -> Result<(ValidatedResult, PipelineDiagnostics), PipelineError> {
    let channels = ChannelPair::from_bytes(live_bytes, dead_bytes)?;
    let mut pipeline = Pipeline::with_capabilities(
        channels,
        params.clone(),
        RollingBallSegmenter::default(),
        ParticleAnalyzer::default(),
        clock,
    )?;
    pipeline.run_to_completion()?;
    pipeline.finish_with_diagnostics()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(img: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )
        .unwrap();
        buf
    }

    /// Gaussian spots on a dim floor.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn spots(centres: &[(f64, f64)]) -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            let mut v = 15.0;
            for &(cx, cy) in centres {
                let d2 = (f64::from(x) - cx).powi(2) + (f64::from(y) - cy).powi(2);
                v += 190.0 * (-d2 / 8.0).exp();
            }
            image::Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    fn params() -> PipelineParameters {
        PipelineParameters {
            rolling_ball_radius: 10.0,
            ..PipelineParameters::default()
        }
    }

    #[test]
    fn process_counts_cells_and_removes_double_counts() {
        let live = encode_png(&spots(&[(16.0, 16.0), (46.0, 20.0), (30.0, 46.0)]));
        let dead = encode_png(&spots(&[(17.0, 17.0), (8.0, 54.0)]));
        let result = process(&live, &dead, &params()).unwrap();
        assert_eq!(result.audit.len(), 3);
        assert_eq!(result.dead_count, 2);
        assert_eq!(result.validated_live_count, 2);
        assert!(!result.audit[0].retained);
    }

    #[test]
    fn process_rejects_empty_input() {
        let dead = encode_png(&spots(&[]));
        assert!(matches!(
            process(&[], &dead, &params()),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn process_rejects_invalid_parameters() {
        let img = encode_png(&spots(&[]));
        let bad = PipelineParameters {
            rolling_ball_radius: f64::INFINITY,
            ..PipelineParameters::default()
        };
        assert!(matches!(
            process(&img, &img, &bad),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn blank_images_count_nothing() {
        let img = encode_png(&spots(&[]));
        let result = process(&img, &img, &params()).unwrap();
        assert_eq!(result.validated_live_count, 0);
        assert_eq!(result.dead_count, 0);
    }

    #[test]
    fn diagnostics_cover_every_stage() {
        let img = encode_png(&spots(&[(30.0, 30.0)]));
        let (_, diags) = process_with_diagnostics(&img, &img, &params(), NoClock).unwrap();
        let stages: Vec<Stage> = diags.stages.iter().map(|d| d.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
    }
}
