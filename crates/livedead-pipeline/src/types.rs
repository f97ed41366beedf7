//! Shared types for the live/dead counting pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Re-export `GrayImage` so downstream crates can hand channel images to
/// the pipeline without depending on `image` directly.
pub use image::GrayImage;

/// Pixel value marking particle interior in a segmented mask.
pub const FOREGROUND: u8 = 255;

/// Pixel value marking background and separation lines in a segmented mask.
pub const BACKGROUND: u8 = 0;

/// A 2D integer point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: i32,
    /// Vertical position (pixels from top edge).
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Exact for every pair of `i32` coordinates.
    #[must_use]
    pub const fn distance_squared(self, other: Self) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dy = self.y as i64 - other.y as i64;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distance(self, other: Self) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Ordered collection of particle centroids extracted from one mask.
///
/// Order follows the extractor's output order and is preserved through
/// analysis so the audit table lists candidates as they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentroidSet(Vec<Point>);

impl CentroidSet {
    /// Create a centroid set from points in extraction order.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if no centroids were found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of centroids.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// All centroids in extraction order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Iterate over centroids in extraction order.
    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.0.iter()
    }

    /// Consumes the set and returns the underlying points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

impl FromIterator<Point> for CentroidSet {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CentroidSet {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Fluorescence channel a stage operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Live-cell stain (e.g. calcein).
    Live,
    /// Dead-cell stain (e.g. ethidium homodimer).
    Dead,
}

impl Channel {
    /// Both channels in processing order.
    pub const ALL: [Self; 2] = [Self::Live, Self::Dead];

    /// Upper-case label used in stage titles.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Dead => "DEAD",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Dead => f.write_str("dead"),
        }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a grayscale image.
    #[must_use]
    pub fn of(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Binary particle mask produced by a preprocessing stage.
///
/// Owned by the pipeline for the current run and replaced wholesale each
/// time its producing stage is re-entered.
#[derive(Debug, Clone)]
pub struct SegmentedImage {
    channel: Channel,
    mask: GrayImage,
}

impl SegmentedImage {
    /// Wrap a mask produced for `channel`.
    #[must_use]
    pub const fn new(channel: Channel, mask: GrayImage) -> Self {
        Self { channel, mask }
    }

    /// The channel this mask was segmented from.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// The binary mask ([`FOREGROUND`] inside particles).
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.mask)
    }

    /// Number of particle pixels in the mask.
    #[must_use]
    pub fn foreground_pixels(&self) -> u64 {
        self.mask.pixels().filter(|p| p.0[0] != BACKGROUND).count() as u64
    }

    /// Consumes the artifact and returns the mask.
    #[must_use]
    pub fn into_mask(self) -> GrayImage {
        self.mask
    }
}

/// Failure reported by a [`Preprocessor`](crate::Preprocessor) or
/// [`Extractor`](crate::Extractor) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CapabilityError {
    /// The input image has zero width or height.
    #[error("image has no pixels")]
    EmptyImage,

    /// A mask handed to the extractor contains values other than 0 and 255.
    #[error("mask is not binary: found pixel value {value}")]
    NotBinary {
        /// The first offending pixel value.
        value: u8,
    },

    /// Any other implementation-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors that can occur while running the pipeline.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode a channel image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A numeric parameter is negative, non-finite, or below its minimum.
    #[error("parameter {name:?} is out of range: {value}")]
    InvalidParameter {
        /// Plugin-facing parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A named setting could not be parsed into its typed value.
    #[error("setting {name:?} has unparseable value {value:?}")]
    InvalidSetting {
        /// Plugin-facing setting name.
        name: String,
        /// The raw setting string.
        value: String,
    },

    /// The image-processing capability failed; the run was aborted.
    #[error("pipeline aborted at {stage}: {source}")]
    Capability {
        /// Stage that invoked the capability.
        stage: Stage,
        /// The underlying capability failure.
        #[source]
        source: CapabilityError,
    },

    /// A stage was entered before the stage producing its input ran.
    #[error("{stage} has no input: run the preceding stage first")]
    MissingInput {
        /// The stage that could not run.
        stage: Stage,
    },
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidParameter { name: String, value: f64 },
    InvalidSetting { name: String, value: String },
    Capability { stage: Stage, source: CapabilityError },
    MissingInput { stage: Stage },
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidParameter { name, value } => PipelineErrorProxy::InvalidParameter {
                name: (*name).to_owned(),
                value: *value,
            },
            Self::InvalidSetting { name, value } => PipelineErrorProxy::InvalidSetting {
                name: name.clone(),
                value: value.clone(),
            },
            Self::Capability { stage, source } => PipelineErrorProxy::Capability {
                stage: *stage,
                source: source.clone(),
            },
            Self::MissingInput { stage } => PipelineErrorProxy::MissingInput { stage: *stage },
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message
            // under the `image` setting name.
            PipelineErrorProxy::ImageDecode(msg) => Self::InvalidSetting {
                name: "image".to_owned(),
                value: msg,
            },
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidParameter { name, value } => Self::InvalidParameter {
                name: crate::params::canonical_name(&name).ok_or_else(|| {
                    serde::de::Error::custom(format!("unknown parameter name {name:?}"))
                })?,
                value,
            },
            PipelineErrorProxy::InvalidSetting { name, value } => {
                Self::InvalidSetting { name, value }
            }
            PipelineErrorProxy::Capability { stage, source } => Self::Capability { stage, source },
            PipelineErrorProxy::MissingInput { stage } => Self::MissingInput { stage },
        })
    }
}
