//! Prominent local maxima and watershed segmentation.
//!
//! [`find_maxima`] keeps only maxima that stand out from their
//! surroundings by more than a noise tolerance. [`segment_watershed`]
//! then floods the above-threshold foreground from those maxima,
//! brightest first, and cuts one-pixel separation lines where two basins
//! meet. The result is a binary mask with one particle per maximum.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::types::{BACKGROUND, FOREGROUND};

/// A local maximum accepted by [`find_maxima`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maximum {
    /// Column of the maximum pixel.
    pub x: u32,
    /// Row of the maximum pixel.
    pub y: u32,
    /// Intensity at the maximum.
    pub value: u8,
}

/// Offsets of the 8-connected neighbourhood.
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Neighbours that follow a pixel in raster order.
const FORWARD_NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (-1, 1), (0, 1), (1, 1)];

/// Flat-index view of a grayscale image.
struct Grid<'a> {
    width: usize,
    height: usize,
    values: &'a [u8],
}

impl<'a> Grid<'a> {
    fn new(image: &'a GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            values: image.as_raw(),
        }
    }

    const fn len(&self) -> usize {
        self.width * self.height
    }

    const fn is_border(&self, idx: usize) -> bool {
        let x = idx % self.width;
        let y = idx / self.width;
        x == 0 || y == 0 || x + 1 == self.width || y + 1 == self.height
    }

    /// Flat index of the neighbour at `(dx, dy)`, if inside the image.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn neighbour(&self, idx: usize, (dx, dy): (i64, i64)) -> Option<usize> {
        let x = (idx % self.width) as i64 + dx;
        let y = (idx / self.width) as i64 + dy;
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    fn neighbours(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        NEIGHBOURS
            .iter()
            .filter_map(move |&offset| self.neighbour(idx, offset))
    }

    /// Whether no 8-neighbour is brighter than the pixel.
    fn is_local_max(&self, idx: usize) -> bool {
        let v = self.values[idx];
        self.neighbours(idx).all(|n| self.values[n] <= v)
    }
}

/// Mean intensity of an image, `0.0` for an empty image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_intensity(image: &GrayImage) -> f64 {
    let raw = image.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    let sum: u64 = raw.iter().map(|&v| u64::from(v)).sum();
    sum as f64 / raw.len() as f64
}

/// Find maxima that rise more than `tolerance` above any path to a
/// brighter region.
///
/// Only pixels brighter than `threshold` are considered. Candidates are
/// examined from brightest down; each one floods the area reachable
/// through pixels within `tolerance` of its value. The candidate is
/// rejected if that area contains a brighter pixel or touches the area
/// of an already-accepted maximum, and, when `exclude_edges` is set, if
/// it touches the image border. Pixels of a flat plateau are examined
/// once.
///
/// Returns accepted maxima sorted brightest first (ties in raster order).
#[must_use]
pub fn find_maxima(
    image: &GrayImage,
    tolerance: f64,
    threshold: f64,
    exclude_edges: bool,
) -> Vec<Maximum> {
    let grid = Grid::new(image);
    if grid.len() == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = (0..grid.len())
        .filter(|&i| f64::from(grid.values[i]) > threshold && grid.is_local_max(i))
        .collect();
    candidates.sort_by_key(|&i| (Reverse(grid.values[i]), i));

    // 0 = unclaimed; otherwise 1-based index of the accepted maximum.
    let mut owner = vec![0_u32; grid.len()];
    let mut plateau_done = vec![false; grid.len()];
    let mut visited = vec![false; grid.len()];
    let mut maxima = Vec::new();

    for start in candidates {
        if plateau_done[start] {
            continue;
        }
        let v = grid.values[start];
        let within = |val: u8| val >= v || f64::from(v) - f64::from(val) < tolerance;

        let mut area = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        let mut accepted = true;
        while let Some(idx) = queue.pop_front() {
            area.push(idx);
            let val = grid.values[idx];
            if val > v || owner[idx] != 0 || (exclude_edges && grid.is_border(idx)) {
                accepted = false;
            }
            for n in grid.neighbours(idx) {
                if !visited[n] && within(grid.values[n]) {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        let label = u32::try_from(maxima.len() + 1).unwrap_or(u32::MAX);
        for &idx in &area {
            visited[idx] = false;
            if grid.values[idx] == v {
                plateau_done[idx] = true;
            }
            if accepted {
                owner[idx] = label;
            }
        }

        if accepted {
            let (x, y) = (start % grid.width, start / grid.width);
            maxima.push(Maximum {
                x: u32::try_from(x).unwrap_or(u32::MAX),
                y: u32::try_from(y).unwrap_or(u32::MAX),
                value: v,
            });
        }
    }

    tracing::debug!(count = maxima.len(), tolerance, threshold, "maxima found");
    maxima
}

/// Pixel queued for flooding: brighter first, then first-queued first.
#[derive(PartialEq, Eq)]
struct FloodItem {
    value: u8,
    order: Reverse<usize>,
    idx: usize,
}

impl Ord for FloodItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.order.cmp(&other.order))
    }
}

impl PartialOrd for FloodItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Flood the foreground (pixels brighter than `threshold`) from `seeds`
/// and return a binary particle mask.
///
/// Each foreground pixel joins the basin of the brightest already-flooded
/// neighbour. Where two basins touch (8-connectivity), the earlier pixel
/// in raster order becomes a [`BACKGROUND`] separation line, so no two
/// particles are 8-connected in the output. Foreground not reachable
/// from any seed stays background.
#[must_use]
pub fn segment_watershed(image: &GrayImage, seeds: &[Maximum], threshold: f64) -> GrayImage {
    let grid = Grid::new(image);
    let mut labels = vec![0_u32; grid.len()];
    let mut heap = BinaryHeap::new();
    let mut order = 0_usize;

    for (i, seed) in seeds.iter().enumerate() {
        let idx = seed.y as usize * grid.width + seed.x as usize;
        if idx >= grid.len() || labels[idx] != 0 {
            continue;
        }
        labels[idx] = u32::try_from(i + 1).unwrap_or(u32::MAX);
        heap.push(FloodItem {
            value: grid.values[idx],
            order: Reverse(order),
            idx,
        });
        order += 1;
    }

    while let Some(FloodItem { idx, .. }) = heap.pop() {
        let label = labels[idx];
        for n in grid.neighbours(idx) {
            if labels[n] == 0 && f64::from(grid.values[n]) > threshold {
                labels[n] = label;
                heap.push(FloodItem {
                    value: grid.values[n],
                    order: Reverse(order),
                    idx: n,
                });
                order += 1;
            }
        }
    }

    let mut mask = vec![BACKGROUND; grid.len()];
    for (idx, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        let on_line = FORWARD_NEIGHBOURS.iter().any(|&offset| {
            grid.neighbour(idx, offset)
                .is_some_and(|n| labels[n] != 0 && labels[n] != label)
        });
        if !on_line {
            mask[idx] = FOREGROUND;
        }
    }

    GrayImage::from_raw(image.width(), image.height(), mask)
        .unwrap_or_else(|| GrayImage::new(image.width(), image.height()))
}
