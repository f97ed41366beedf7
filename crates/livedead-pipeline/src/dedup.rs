//! Double-count removal between the live and dead candidate sets.
//!
//! A cell that stains in both channels shows up once in each centroid
//! set. [`analyze`] drops every live candidate lying strictly closer than
//! the double-counting radius to any dead candidate; dead candidates are
//! never dropped. Because the rule is a pure threshold on the distance to
//! the nearest dead point, the outcome for each live point does not depend
//! on input order or on which dead point is nearest.
//!
//! Dead points are held in an R-tree so each live point needs a single
//! nearest-neighbour query instead of a scan over the whole dead set.

use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::types::{CentroidSet, Point};

type IndexedPoint = GeomWithData<[f64; 2], Point>;

/// Classification of one live candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// The live candidate's centroid.
    pub point: Point,
    /// `true` if the candidate counts as a live cell.
    pub retained: bool,
    /// Distance to the nearest dead candidate, `None` when there are no
    /// dead candidates.
    pub nearest_dead_distance: Option<f64>,
}

/// Final counts of one run, with the per-candidate audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedResult {
    /// Live candidates that are not double counts.
    pub validated_live_count: usize,
    /// All dead candidates.
    pub dead_count: usize,
    /// Every live candidate in extraction order.
    pub audit: Vec<AuditEntry>,
    /// The radius the classification used.
    pub double_counting_radius: f64,
}

impl ValidatedResult {
    /// Live candidates dropped as double counts.
    #[must_use]
    pub const fn discarded_count(&self) -> usize {
        self.audit.len() - self.validated_live_count
    }

    /// Centroids of the retained live candidates, in extraction order.
    pub fn retained_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.audit.iter().filter(|e| e.retained).map(|e| e.point)
    }

    /// Centroids of every live candidate, in extraction order.
    pub fn live_candidates(&self) -> impl Iterator<Item = Point> + '_ {
        self.audit.iter().map(|e| e.point)
    }
}

/// Classify live candidates against dead candidates.
///
/// A live point is discarded when its distance to some dead point is
/// strictly less than `radius`. A radius of zero, a negative radius, or
/// an empty dead set discards nothing.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn analyze(live: &CentroidSet, dead: &CentroidSet, radius: f64) -> ValidatedResult {
    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        dead.iter()
            .map(|&p| GeomWithData::new([f64::from(p.x), f64::from(p.y)], p))
            .collect(),
    );
    let radius_sq = if radius > 0.0 { radius * radius } else { 0.0 };

    let audit: Vec<AuditEntry> = live
        .iter()
        .map(|&p| {
            let nearest = tree
                .nearest_neighbor_iter(&[f64::from(p.x), f64::from(p.y)])
                .next()
                .map(|q| p.distance_squared(q.data));
            let retained = nearest.is_none_or(|d2| (d2 as f64) >= radius_sq);
            AuditEntry {
                point: p,
                retained,
                nearest_dead_distance: nearest.map(|d2| (d2 as f64).sqrt()),
            }
        })
        .collect();

    let validated_live_count = audit.iter().filter(|e| e.retained).count();
    tracing::debug!(
        live = live.len(),
        dead = dead.len(),
        retained = validated_live_count,
        radius,
        "double counts removed"
    );

    ValidatedResult {
        validated_live_count,
        dead_count: dead.len(),
        audit,
        double_counting_radius: radius,
    }
}
