//! Pipeline diagnostics: timing and counts for each stage run.
//!
//! The controller records one [`StageDiagnostics`] entry every time a
//! stage runs successfully, so a manual session that re-runs a stage
//! keeps the history of every attempt. Time is read through the
//! [`Clock`] trait, which keeps the library free of platform timer
//! choices and lets tests supply a deterministic clock.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stage::Stage;
use crate::types::Channel;

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

impl<C: Clock + ?Sized> Clock for &C {
    type Instant = C::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        (**self).elapsed(since)
    }
}

/// A [`Clock`] that never advances. Every stage reports a zero duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) -> Self::Instant {}

    fn elapsed(&self, _since: &Self::Instant) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics for a single stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// The stage that ran.
    pub stage: Stage,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Preprocessing metrics.
    Preprocess {
        /// Channel that was segmented.
        channel: Channel,
        /// Binning factor applied before segmentation.
        binning: u32,
        /// Mask width in pixels.
        width: u32,
        /// Mask height in pixels.
        height: u32,
        /// Particle pixels in the mask.
        foreground_pixels: u64,
    },
    /// Centroid extraction metrics.
    Locate {
        /// Channel whose mask was analysed.
        channel: Channel,
        /// Minimum particle size passed to the extractor.
        min_size: f64,
        /// Number of centroids found.
        centroid_count: usize,
    },
    /// Double-count removal metrics.
    Analyze {
        /// Double-counting radius in pixels.
        radius: f64,
        /// Live candidates before removal.
        live_candidates: usize,
        /// Live candidates retained.
        retained: usize,
        /// Dead candidates.
        dead_count: usize,
    },
}

/// Every stage run of one pipeline, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// One entry per successful stage run, re-runs included.
    pub stages: Vec<StageDiagnostics>,
}

impl PipelineDiagnostics {
    /// Append a stage record.
    pub fn record(&mut self, entry: StageDiagnostics) {
        self.stages.push(entry);
    }

    /// The most recent run of `stage`, if it has run.
    #[must_use]
    pub fn latest(&self, stage: Stage) -> Option<&StageDiagnostics> {
        self.stages.iter().rev().find(|d| d.stage == stage)
    }

    /// Sum of all recorded stage durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|d| d.duration).sum()
    }

    /// Forget every record.
    pub fn clear(&mut self) {
        self.stages.clear();
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Stage runs: {}  |  Total duration: {:.3}ms",
            self.stages.len(),
            duration_ms(self.total_duration()),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<26} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration());
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let name = diag.stage.label();
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<26} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        if let Some(StageDiagnostics {
            metrics:
                StageMetrics::Analyze {
                    retained,
                    dead_count,
                    ..
                },
            ..
        }) = self.latest(Stage::Analyze)
        {
            lines.push(String::new());
            lines.push(format!("Live: {retained}  |  Dead: {dead_count}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Preprocess {
            binning,
            width,
            height,
            foreground_pixels,
            ..
        } => {
            let total = u64::from(*width) * u64::from(*height);
            #[allow(clippy::cast_precision_loss)]
            let coverage = if total > 0 {
                *foreground_pixels as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            format!("bin={binning} {width}x{height} fg={foreground_pixels} ({coverage:.1}%)")
        }
        StageMetrics::Locate {
            min_size,
            centroid_count,
            ..
        } => format!("min_size={min_size:.0} centroids={centroid_count}"),
        StageMetrics::Analyze {
            radius,
            live_candidates,
            retained,
            dead_count,
        } => format!(
            "r={radius:.1} live={live_candidates}->{retained} dead={dead_count}"
        ),
    }
}
