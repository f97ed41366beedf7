//! Channel image loading and binning.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, TIFF, WebP) and produces the
//! 8-bit grayscale rasters the preprocessing stages consume. Colour and
//! 16-bit inputs are reduced to 8-bit luminance.

use image::GrayImage;
use image::imageops::FilterType;

use crate::types::{Channel, Dimensions, PipelineError};

/// Decode raw image bytes into an 8-bit grayscale channel image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_channel(bytes: &[u8]) -> Result<GrayImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_luma8())
}

/// Shrink an image by an integer binning factor.
///
/// Both axes are divided by `factor` (rounded down, never below one
/// pixel) with an area-averaging filter. A factor of 0 or 1 returns the
/// image unchanged.
#[must_use = "returns the binned image"]
pub fn bin_image(image: &GrayImage, factor: u32) -> GrayImage {
    if factor <= 1 {
        return image.clone();
    }

    let width = (image.width() / factor).max(1);
    let height = (image.height() / factor).max(1);
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// The pair of raw channel images a run works on.
///
/// Both images are read-only for the lifetime of the run. Matching
/// dimensions are expected but not enforced.
#[derive(Debug, Clone)]
pub struct ChannelPair {
    live: GrayImage,
    dead: GrayImage,
}

impl ChannelPair {
    /// Pair already-decoded live and dead images.
    #[must_use]
    pub const fn new(live: GrayImage, dead: GrayImage) -> Self {
        Self { live, dead }
    }

    /// Decode both channels from encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error, live channel first.
    pub fn from_bytes(live: &[u8], dead: &[u8]) -> Result<Self, PipelineError> {
        Ok(Self {
            live: decode_channel(live)?,
            dead: decode_channel(dead)?,
        })
    }

    /// The raw image for `channel`.
    #[must_use]
    pub const fn get(&self, channel: Channel) -> &GrayImage {
        match channel {
            Channel::Live => &self.live,
            Channel::Dead => &self.dead,
        }
    }

    /// Dimensions of the live channel.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.live)
    }

    /// Whether both channels have the same dimensions.
    #[must_use]
    pub fn dimensions_match(&self) -> bool {
        self.live.dimensions() == self.dead.dimensions()
    }
}
