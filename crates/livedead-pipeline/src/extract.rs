//! Particle extraction: one centroid per qualifying mask region.
//!
//! This module defines the [`Extractor`] trait, the capability the
//! pipeline calls in its two locating stages, and [`ParticleAnalyzer`],
//! the default implementation built on
//! `imageproc::region_labelling::connected_components`.

use image::GrayImage;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::{BACKGROUND, CapabilityError, CentroidSet, FOREGROUND, Point};

/// Extracts particle centroids from a binary mask.
pub trait Extractor {
    /// Return one centroid per region of at least `min_size` pixels, in
    /// a stable order.
    ///
    /// # Errors
    ///
    /// Returns a [`CapabilityError`] if the mask cannot be analysed.
    fn extract_centroids(
        &self,
        mask: &GrayImage,
        min_size: f64,
    ) -> Result<CentroidSet, CapabilityError>;
}

impl<E: Extractor + ?Sized> Extractor for &E {
    fn extract_centroids(
        &self,
        mask: &GrayImage,
        min_size: f64,
    ) -> Result<CentroidSet, CapabilityError> {
        (**self).extract_centroids(mask, min_size)
    }
}

/// Measurements of one connected mask region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Pixel count.
    pub area: u64,
    /// Number of pixel edges shared with background or the image border.
    pub perimeter: u64,
    /// Mean x of pixel centres.
    pub centroid_x: f64,
    /// Mean y of pixel centres.
    pub centroid_y: f64,
    /// Raster index of the region's first pixel.
    first_pixel: u64,
}

impl Particle {
    /// `4π·area / perimeter²`, clamped to `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn circularity(&self) -> f64 {
        if self.perimeter == 0 {
            return 0.0;
        }
        let p = self.perimeter as f64;
        (4.0 * std::f64::consts::PI * self.area as f64 / (p * p)).min(1.0)
    }

    /// Centroid truncated to whole pixel coordinates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn centroid(&self) -> Point {
        Point::new(self.centroid_x as i32, self.centroid_y as i32)
    }
}

/// Label 8-connected foreground regions and measure each one.
///
/// Regions are returned in raster order of their first pixel.
///
/// # Errors
///
/// Returns [`CapabilityError::NotBinary`] if the mask contains values
/// other than [`BACKGROUND`] and [`FOREGROUND`].
#[allow(clippy::cast_precision_loss)]
pub fn measure_particles(mask: &GrayImage) -> Result<Vec<Particle>, CapabilityError> {
    struct Acc {
        area: u64,
        perimeter: u64,
        sum_x: f64,
        sum_y: f64,
        first_pixel: u64,
    }

    if let Some(p) = mask
        .pixels()
        .find(|p| p.0[0] != BACKGROUND && p.0[0] != FOREGROUND)
    {
        return Err(CapabilityError::NotBinary { value: p.0[0] });
    }

    let labels = connected_components(mask, Connectivity::Eight, image::Luma([BACKGROUND]));
    let (w, h) = mask.dimensions();

    let mut accs: std::collections::BTreeMap<u32, Acc> = std::collections::BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let exposed = [(-1_i64, 0_i64), (1, 0), (0, -1), (0, 1)]
            .iter()
            .filter(|&&(dx, dy)| {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                nx < 0
                    || ny < 0
                    || nx >= i64::from(w)
                    || ny >= i64::from(h)
                    || mask
                        .get_pixel(
                            u32::try_from(nx).unwrap_or(0),
                            u32::try_from(ny).unwrap_or(0),
                        )
                        .0[0]
                        == BACKGROUND
            })
            .count() as u64;

        let acc = accs.entry(label).or_insert(Acc {
            area: 0,
            perimeter: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            first_pixel: u64::from(y) * u64::from(w) + u64::from(x),
        });
        acc.area += 1;
        acc.perimeter += exposed;
        acc.sum_x += f64::from(x) + 0.5;
        acc.sum_y += f64::from(y) + 0.5;
    }

    let mut particles: Vec<Particle> = accs
        .into_values()
        .map(|a| Particle {
            area: a.area,
            perimeter: a.perimeter,
            centroid_x: a.sum_x / a.area as f64,
            centroid_y: a.sum_y / a.area as f64,
            first_pixel: a.first_pixel,
        })
        .collect();
    particles.sort_by_key(|p| p.first_pixel);
    Ok(particles)
}

/// Size- and shape-filtered particle analysis.
///
/// Keeps regions whose area is at least the requested minimum size and
/// whose circularity lies in
/// `[min_circularity, max_circularity]`. The defaults accept every shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleAnalyzer {
    /// Lower circularity bound (inclusive).
    pub min_circularity: f64,
    /// Upper circularity bound (inclusive).
    pub max_circularity: f64,
}

impl Default for ParticleAnalyzer {
    fn default() -> Self {
        Self {
            min_circularity: 0.0,
            max_circularity: 1.0,
        }
    }
}

impl Extractor for ParticleAnalyzer {
    #[allow(clippy::cast_precision_loss)]
    fn extract_centroids(
        &self,
        mask: &GrayImage,
        min_size: f64,
    ) -> Result<CentroidSet, CapabilityError> {
        let particles = measure_particles(mask)?;
        let total = particles.len();
        let kept: CentroidSet = particles
            .iter()
            .filter(|p| p.area as f64 >= min_size)
            .filter(|p| {
                let c = p.circularity();
                c >= self.min_circularity && c <= self.max_circularity
            })
            .map(Particle::centroid)
            .collect();
        tracing::debug!(regions = total, kept = kept.len(), min_size, "particles measured");
        Ok(kept)
    }
}
