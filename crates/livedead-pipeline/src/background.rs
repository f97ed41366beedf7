//! Rolling-ball style background subtraction.
//!
//! The background is estimated as the grayscale morphological opening of
//! the image by a disk of the rolling-ball radius: anything narrower than
//! the disk (cells) is removed from the estimate, slowly varying
//! illumination is kept. Subtracting the estimate leaves the cells on a
//! near-zero floor.
//!
//! Large radii are expensive to open at full resolution, so the opening
//! is computed on a block-minimum shrunken copy and scaled back up.

use image::GrayImage;
use image::imageops::FilterType;
use imageproc::morphology::{Mask, grayscale_open};

/// Radii below this disable background subtraction.
const MIN_RADIUS: f64 = 1.0;

/// Shrink factor used to estimate the background for `radius`.
#[must_use]
pub const fn shrink_factor(radius: f64) -> u32 {
    if radius <= 10.0 {
        1
    } else if radius <= 30.0 {
        2
    } else if radius <= 100.0 {
        4
    } else {
        8
    }
}

/// Estimate the background of `image` for a rolling ball of `radius`
/// pixels.
///
/// The estimate never exceeds the image at any pixel.
#[must_use = "returns the background estimate"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_background(image: &GrayImage, radius: f64) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || radius.is_nan() || radius < MIN_RADIUS {
        return GrayImage::new(w, h);
    }

    let shrink = shrink_factor(radius);
    let disk_radius = (radius / f64::from(shrink))
        .round()
        .clamp(1.0, f64::from(u8::MAX)) as u8;
    let mask = Mask::disk(disk_radius);

    let background = if shrink > 1 {
        let small = shrink_by_minimum(image, shrink);
        let opened = grayscale_open(&small, &mask);
        image::imageops::resize(&opened, w, h, FilterType::Triangle)
    } else {
        grayscale_open(image, &mask)
    };

    GrayImage::from_fn(w, h, |x, y| {
        let b = background.get_pixel(x, y).0[0];
        let v = image.get_pixel(x, y).0[0];
        image::Luma([b.min(v)])
    })
}

/// Subtract the rolling-ball background from `image`.
///
/// A radius below one pixel returns the image unchanged.
#[must_use = "returns the background-subtracted image"]
pub fn subtract_background(image: &GrayImage, radius: f64) -> GrayImage {
    if radius.is_nan() || radius < MIN_RADIUS {
        return image.clone();
    }

    let background = estimate_background(image, radius);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y).0[0];
        let b = background.get_pixel(x, y).0[0];
        image::Luma([v.saturating_sub(b)])
    })
}

/// Shrink `image` by `factor`, each output pixel taking the minimum of
/// its source block. Partial blocks at the right and bottom edges are
/// included.
#[must_use]
fn shrink_by_minimum(image: &GrayImage, factor: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    let sw = w.div_ceil(factor);
    let sh = h.div_ceil(factor);
    GrayImage::from_fn(sw, sh, |bx, by| {
        let x0 = bx * factor;
        let y0 = by * factor;
        let x1 = (x0 + factor).min(w);
        let y1 = (y0 + factor).min(h);
        let mut min = u8::MAX;
        for y in y0..y1 {
            for x in x0..x1 {
                min = min.min(image.get_pixel(x, y).0[0]);
            }
        }
        image::Luma([min])
    })
}
