//! Pipeline controller: drive the five stages over one channel pair.
//!
//! [`Pipeline`] owns every artifact of a run (the two masks, the two
//! centroid sets and the final result) and exposes the same controls a
//! step-by-step host offers:
//!
//! ```rust
//! # use livedead_pipeline::{ChannelPair, Pipeline, PipelineError, PipelineParameters, Stage};
//! # fn run(pair: ChannelPair) -> Result<(), PipelineError> {
//! let mut pipeline = Pipeline::new(pair, PipelineParameters::default())?;
//!
//! // Manual mode: each call runs exactly one stage.
//! pipeline.run_current()?; // LIVE - Preprocess image
//! pipeline.advance();
//! pipeline.run_current()?; // LIVE - locate cells
//!
//! // Re-tune the live channel and re-run only its stages.
//! let mut params = pipeline.parameters().clone();
//! params.live_tolerance = 12.0;
//! pipeline.set_parameters(params)?;
//! pipeline.run_stage(Stage::PreprocessLive)?;
//! # Ok(())
//! # }
//! ```
//!
//! With [`automatic`](PipelineParameters::automatic) set, a single
//! [`run_stage`](Pipeline::run_stage) call continues through
//! [`Stage::Analyze`].
//!
//! # Artifacts
//!
//! Each stage reads the parameters current at the moment it starts and
//! replaces the artifact it produces. Replacing a mask or centroid set
//! drops whatever was derived from the old one (the channel's centroids
//! and the result), so fresh and stale data are never combined. The
//! other channel is left alone.
//!
//! A capability failure aborts the run: every artifact is discarded and
//! the controller stays at the failing stage.

use crate::channel::{ChannelPair, bin_image};
use crate::dedup::{self, ValidatedResult};
use crate::diagnostics::{Clock, NoClock, PipelineDiagnostics, StageDiagnostics, StageMetrics};
use crate::extract::{Extractor, ParticleAnalyzer};
use crate::params::PipelineParameters;
use crate::report::LiveDeadReport;
use crate::segment::{Preprocessor, RollingBallSegmenter};
use crate::stage::Stage;
use crate::types::{CentroidSet, Channel, PipelineError, SegmentedImage};

// ───────────────────────── Per-channel storage ─────────────────────────

/// One optional artifact per channel.
#[derive(Debug, Clone)]
struct ChannelSlots<T> {
    live: Option<T>,
    dead: Option<T>,
}

impl<T> Default for ChannelSlots<T> {
    fn default() -> Self {
        Self {
            live: None,
            dead: None,
        }
    }
}

impl<T> ChannelSlots<T> {
    const fn get(&self, channel: Channel) -> Option<&T> {
        match channel {
            Channel::Live => self.live.as_ref(),
            Channel::Dead => self.dead.as_ref(),
        }
    }

    const fn slot_mut(&mut self, channel: Channel) -> &mut Option<T> {
        match channel {
            Channel::Live => &mut self.live,
            Channel::Dead => &mut self.dead,
        }
    }

    fn set(&mut self, channel: Channel, value: T) {
        *self.slot_mut(channel) = Some(value);
    }

    fn clear(&mut self, channel: Channel) {
        *self.slot_mut(channel) = None;
    }

    fn clear_all(&mut self) {
        self.live = None;
        self.dead = None;
    }
}

// ───────────────────────── Controller ─────────────────────────

/// Stateful driver of one live/dead run.
///
/// Generic over the two image-processing capabilities and the clock used
/// for stage timing; [`Pipeline::new`] picks the default implementations.
#[derive(Debug)]
pub struct Pipeline<P = RollingBallSegmenter, E = ParticleAnalyzer, C = NoClock> {
    channels: ChannelPair,
    params: PipelineParameters,
    preprocessor: P,
    extractor: E,
    clock: C,
    stage: Stage,
    masks: ChannelSlots<SegmentedImage>,
    centroids: ChannelSlots<CentroidSet>,
    result: Option<ValidatedResult>,
    diagnostics: PipelineDiagnostics,
}

impl Pipeline {
    /// Create a controller using [`RollingBallSegmenter`] and
    /// [`ParticleAnalyzer`], positioned at [`Stage::FIRST`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if `params` fails
    /// [`validate`](PipelineParameters::validate).
    pub fn new(channels: ChannelPair, params: PipelineParameters) -> Result<Self, PipelineError> {
        Self::with_capabilities(
            channels,
            params,
            RollingBallSegmenter::default(),
            ParticleAnalyzer::default(),
            NoClock,
        )
    }
}

impl<P, E, C> Pipeline<P, E, C>
where
    P: Preprocessor,
    E: Extractor,
    C: Clock,
{
    /// Create a controller with explicit capabilities and clock.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if `params` fails
    /// [`validate`](PipelineParameters::validate).
    pub fn with_capabilities(
        channels: ChannelPair,
        params: PipelineParameters,
        preprocessor: P,
        extractor: E,
        clock: C,
    ) -> Result<Self, PipelineError> {
        params.validate()?;
        if !channels.dimensions_match() {
            tracing::warn!(
                live = ?channels.get(Channel::Live).dimensions(),
                dead = ?channels.get(Channel::Dead).dimensions(),
                "channel images differ in size"
            );
        }
        Ok(Self {
            channels,
            params,
            preprocessor,
            extractor,
            clock,
            stage: Stage::FIRST,
            masks: ChannelSlots::default(),
            centroids: ChannelSlots::default(),
            result: None,
            diagnostics: PipelineDiagnostics::default(),
        })
    }

    // ─── Parameters and navigation ───

    /// The parameters the next stage will read.
    #[must_use]
    pub const fn parameters(&self) -> &PipelineParameters {
        &self.params
    }

    /// Replace the parameters. Takes effect at the next stage run;
    /// existing artifacts are kept.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] and keeps the current
    /// parameters if `params` is out of range.
    pub fn set_parameters(&mut self, params: PipelineParameters) -> Result<(), PipelineError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// The current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to the next stage without running it. Saturates at
    /// [`Stage::Analyze`].
    pub const fn advance(&mut self) -> Stage {
        self.stage = self.stage.next();
        self.stage
    }

    /// Move to the previous stage without running it. Saturates at
    /// [`Stage::PreprocessLive`].
    pub const fn retreat(&mut self) -> Stage {
        self.stage = self.stage.previous();
        self.stage
    }

    // ─── Execution ───

    /// Run `stage` and make it current.
    ///
    /// In automatic mode the following stages run too, up to and
    /// including [`Stage::Analyze`]. Returns the stage reached.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingInput`] if the stage's input has
    /// not been produced; nothing is changed in that case. Returns
    /// [`PipelineError::Capability`] if preprocessing or extraction
    /// fails; every artifact is discarded.
    pub fn run_stage(&mut self, stage: Stage) -> Result<Stage, PipelineError> {
        let mut stage = stage;
        loop {
            self.run_one(stage)?;
            if !self.params.automatic || stage == Stage::LAST {
                return Ok(stage);
            }
            stage = stage.next();
        }
    }

    /// Run the current stage again (in automatic mode, through
    /// [`Stage::Analyze`]).
    ///
    /// # Errors
    ///
    /// See [`run_stage`](Self::run_stage).
    pub fn run_current(&mut self) -> Result<Stage, PipelineError> {
        self.run_stage(self.stage)
    }

    /// Run every stage in order, regardless of the automatic flag, and
    /// return the result.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; see [`run_stage`](Self::run_stage).
    pub fn run_to_completion(&mut self) -> Result<&ValidatedResult, PipelineError> {
        for stage in Stage::ALL {
            self.run_one(stage)?;
        }
        self.result
            .as_ref()
            .ok_or(PipelineError::MissingInput { stage: Stage::LAST })
    }

    /// Run exactly one stage, timing it and handling failure.
    fn run_one(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.stage = stage;
        let params = self.params.clone();
        tracing::info!(stage = stage.name(), "stage started");

        let start = self.clock.now();
        let outcome = match stage {
            Stage::PreprocessLive => self.preprocess(Channel::Live, &params),
            Stage::LocateLive => self.locate(Channel::Live, &params),
            Stage::PreprocessDead => self.preprocess(Channel::Dead, &params),
            Stage::LocateDead => self.locate(Channel::Dead, &params),
            Stage::Analyze => self.analyze(&params),
        };
        let duration = self.clock.elapsed(&start);

        match outcome {
            Ok(metrics) => {
                self.diagnostics.record(StageDiagnostics {
                    stage,
                    duration,
                    metrics,
                });
                Ok(())
            }
            Err(err) => {
                if matches!(err, PipelineError::Capability { .. }) {
                    self.discard_artifacts();
                }
                tracing::warn!(stage = stage.name(), error = %err, "stage failed");
                Err(err)
            }
        }
    }

    /// Bin, segment, and store the mask for `channel`.
    fn preprocess(
        &mut self,
        channel: Channel,
        params: &PipelineParameters,
    ) -> Result<StageMetrics, PipelineError> {
        let stage = Stage::preprocess(channel);
        let binned = bin_image(self.channels.get(channel), params.binning);
        let mask = self
            .preprocessor
            .segment(
                &binned,
                params.rolling_ball_radius,
                params.tolerance(channel),
            )
            .map_err(|source| PipelineError::Capability { stage, source })?;

        let segmented = SegmentedImage::new(channel, mask);
        let dims = segmented.dimensions();
        let foreground_pixels = segmented.foreground_pixels();
        tracing::info!(
            %channel,
            width = dims.width,
            height = dims.height,
            foreground_pixels,
            "image preprocessed"
        );

        self.masks.set(channel, segmented);
        self.centroids.clear(channel);
        self.result = None;

        Ok(StageMetrics::Preprocess {
            channel,
            binning: params.binning,
            width: dims.width,
            height: dims.height,
            foreground_pixels,
        })
    }

    /// Extract and store the centroids of `channel`'s mask.
    fn locate(
        &mut self,
        channel: Channel,
        params: &PipelineParameters,
    ) -> Result<StageMetrics, PipelineError> {
        let stage = Stage::locate(channel);
        let mask = self
            .masks
            .get(channel)
            .ok_or(PipelineError::MissingInput { stage })?;
        let min_size = params.min_particle_size(channel);
        let centroids = self
            .extractor
            .extract_centroids(mask.mask(), min_size)
            .map_err(|source| PipelineError::Capability { stage, source })?;

        let centroid_count = centroids.len();
        tracing::info!(%channel, count = centroid_count, "cells located");

        self.centroids.set(channel, centroids);
        self.result = None;

        Ok(StageMetrics::Locate {
            channel,
            min_size,
            centroid_count,
        })
    }

    /// Remove double counts and store the result.
    fn analyze(&mut self, params: &PipelineParameters) -> Result<StageMetrics, PipelineError> {
        let missing = || PipelineError::MissingInput {
            stage: Stage::Analyze,
        };
        let live = self.centroids.get(Channel::Live).ok_or_else(missing)?;
        let dead = self.centroids.get(Channel::Dead).ok_or_else(missing)?;

        let result = dedup::analyze(live, dead, params.double_counting_radius);
        tracing::info!(
            live = result.validated_live_count,
            dead = result.dead_count,
            discarded = result.discarded_count(),
            "analysis complete"
        );

        let metrics = StageMetrics::Analyze {
            radius: params.double_counting_radius,
            live_candidates: result.audit.len(),
            retained: result.validated_live_count,
            dead_count: result.dead_count,
        };
        self.result = Some(result);
        Ok(metrics)
    }

    fn discard_artifacts(&mut self) {
        self.masks.clear_all();
        self.centroids.clear_all();
        self.result = None;
    }

    // ─── Artifacts ───

    /// The raw channel images.
    #[must_use]
    pub const fn channels(&self) -> &ChannelPair {
        &self.channels
    }

    /// The most recent mask for `channel`, if its preprocessing stage has
    /// run.
    #[must_use]
    pub const fn segmented(&self, channel: Channel) -> Option<&SegmentedImage> {
        self.masks.get(channel)
    }

    /// The most recent centroids for `channel`, if its locating stage has
    /// run on the current mask.
    #[must_use]
    pub const fn centroids(&self, channel: Channel) -> Option<&CentroidSet> {
        self.centroids.get(channel)
    }

    /// The result of the last analysis, if it is still current.
    #[must_use]
    pub const fn result(&self) -> Option<&ValidatedResult> {
        self.result.as_ref()
    }

    /// The output contract for the current result.
    #[must_use]
    pub fn report(&self) -> Option<LiveDeadReport> {
        self.result.as_ref().map(LiveDeadReport::from)
    }

    /// Timing and counts of every successful stage run so far.
    #[must_use]
    pub const fn diagnostics(&self) -> &PipelineDiagnostics {
        &self.diagnostics
    }

    /// End the run and hand over the result. Masks and centroid sets are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingInput`] for [`Stage::Analyze`] if
    /// no current result exists.
    pub fn finish(self) -> Result<ValidatedResult, PipelineError> {
        self.result.ok_or(PipelineError::MissingInput {
            stage: Stage::Analyze,
        })
    }

    /// Like [`finish`](Self::finish), also returning the diagnostics.
    ///
    /// # Errors
    ///
    /// See [`finish`](Self::finish).
    pub fn finish_with_diagnostics(
        self,
    ) -> Result<(ValidatedResult, PipelineDiagnostics), PipelineError> {
        let diagnostics = self.diagnostics;
        self.result
            .map(|r| (r, diagnostics))
            .ok_or(PipelineError::MissingInput {
                stage: Stage::Analyze,
            })
    }
}
