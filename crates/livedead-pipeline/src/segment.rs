//! Preprocessing: turn a raw channel image into a binary particle mask.
//!
//! This module defines the [`Preprocessor`] trait, the capability the
//! pipeline calls in its two preprocessing stages, and
//! [`RollingBallSegmenter`], the default implementation.
//!
//! # Strategy pattern
//!
//! The pipeline only supplies parameters and consumes the mask, so any
//! segmentation method can be swapped in, including synthetic stubs in
//! tests.

use image::GrayImage;

use crate::types::CapabilityError;

/// Segments a grayscale image into a binary mask of candidate cells.
///
/// Input: a raw channel image. Output: a mask of the same dimensions
/// with [`FOREGROUND`](crate::types::FOREGROUND) inside candidate cells
/// and [`BACKGROUND`](crate::types::BACKGROUND) elsewhere.
pub trait Preprocessor {
    /// Segment `image` using the given rolling-ball radius and maxima
    /// noise tolerance.
    ///
    /// # Errors
    ///
    /// Returns a [`CapabilityError`] if the image cannot be processed.
    fn segment(
        &self,
        image: &GrayImage,
        rolling_ball_radius: f64,
        tolerance: f64,
    ) -> Result<GrayImage, CapabilityError>;
}

impl<P: Preprocessor + ?Sized> Preprocessor for &P {
    fn segment(
        &self,
        image: &GrayImage,
        rolling_ball_radius: f64,
        tolerance: f64,
    ) -> Result<GrayImage, CapabilityError> {
        (**self).segment(image, rolling_ball_radius, tolerance)
    }
}

/// Background subtraction followed by maxima-seeded watershed.
///
/// 1. Subtract a rolling-ball background
///    ([`subtract_background`](crate::background::subtract_background)).
/// 2. Threshold at [`threshold_factor`](Self::threshold_factor) times the
///    mean of the subtracted image.
/// 3. Find maxima standing more than the tolerance above their
///    surroundings ([`find_maxima`](crate::maxima::find_maxima)).
/// 4. Flood the above-threshold foreground from those maxima and cut
///    separation lines between touching cells
///    ([`segment_watershed`](crate::maxima::segment_watershed)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingBallSegmenter {
    /// Multiple of the mean intensity used as the foreground threshold.
    pub threshold_factor: f64,

    /// Discard maxima whose tolerance area touches the image border.
    pub exclude_edge_maxima: bool,
}

impl RollingBallSegmenter {
    /// Default for [`threshold_factor`](Self::threshold_factor).
    pub const DEFAULT_THRESHOLD_FACTOR: f64 = 2.0;
}

impl Default for RollingBallSegmenter {
    fn default() -> Self {
        Self {
            threshold_factor: Self::DEFAULT_THRESHOLD_FACTOR,
            exclude_edge_maxima: true,
        }
    }
}

impl Preprocessor for RollingBallSegmenter {
    fn segment(
        &self,
        image: &GrayImage,
        rolling_ball_radius: f64,
        tolerance: f64,
    ) -> Result<GrayImage, CapabilityError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CapabilityError::EmptyImage);
        }

        let subtracted = crate::background::subtract_background(image, rolling_ball_radius);
        let threshold = self.threshold_factor * crate::maxima::mean_intensity(&subtracted);
        tracing::debug!(rolling_ball_radius, threshold, "background subtracted");

        let maxima =
            crate::maxima::find_maxima(&subtracted, tolerance, threshold, self.exclude_edge_maxima);
        Ok(crate::maxima::segment_watershed(
            &subtracted,
            &maxima,
            threshold,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BACKGROUND, FOREGROUND};

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn two_cells() -> GrayImage {
        GrayImage::from_fn(48, 48, |x, y| {
            let mut v = 12.0;
            for (cx, cy) in [(12.0, 14.0), (34.0, 32.0)] {
                let d2 = (f64::from(x) - cx).powi(2) + (f64::from(y) - cy).powi(2);
                v += 180.0 * (-d2 / 12.5).exp();
            }
            image::Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn empty_image_is_a_capability_error() {
        let result = RollingBallSegmenter::default().segment(&GrayImage::new(0, 0), 50.0, 8.0);
        assert_eq!(result.unwrap_err(), CapabilityError::EmptyImage);
    }

    #[test]
    fn cells_become_foreground_and_floor_background() {
        let mask = RollingBallSegmenter::default()
            .segment(&two_cells(), 10.0, 8.0)
            .unwrap();
        assert_eq!(mask.dimensions(), (48, 48));
        assert_eq!(mask.get_pixel(12, 14).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(34, 32).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(2, 45).0[0], BACKGROUND);
        assert_eq!(mask.get_pixel(24, 24).0[0], BACKGROUND);
    }

    #[test]
    fn uniform_image_segments_to_nothing() {
        let img = GrayImage::from_pixel(20, 20, image::Luma([90]));
        let mask = RollingBallSegmenter::default().segment(&img, 5.0, 8.0).unwrap();
        assert!(mask.pixels().all(|p| p.0[0] == BACKGROUND));
    }

    #[test]
    fn works_without_background_subtraction() {
        let mask = RollingBallSegmenter::default()
            .segment(&two_cells(), 0.0, 8.0)
            .unwrap();
        assert_eq!(mask.get_pixel(12, 14).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(34, 32).0[0], FOREGROUND);
    }

    #[test]
    fn references_are_preprocessors() {
        let segmenter = RollingBallSegmenter::default();
        let by_ref: &dyn Preprocessor = &segmenter;
        assert!(by_ref.segment(&two_cells(), 0.0, 8.0).is_ok());
    }
}
