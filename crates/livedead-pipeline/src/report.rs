//! Output contract of a finished run.
//!
//! [`LiveDeadReport`] exposes a [`ValidatedResult`] the way hosts consume
//! it: two named counts and one table listing every live candidate. The
//! table lists all candidates found in the live channel, retained or not;
//! the retain/discard decision only affects the live count.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::dedup::ValidatedResult;
use crate::types::Point;

/// Output name of the validated live count.
pub const NUMBER_LIVE: &str = "Number Live";
/// Output name of the dead count.
pub const NUMBER_DEAD: &str = "Number Dead";
/// Column holding candidate x coordinates.
pub const START_X: &str = "Start X";
/// Column holding candidate y coordinates.
pub const START_Y: &str = "Start Y";

/// A simple named-column table of integer cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column names, left to right.
    pub columns: Vec<String>,
    /// Rows, each as long as `columns`.
    pub rows: Vec<Vec<i64>>,
}

impl Table {
    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as CSV: one header line, then one line per row.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = self.columns.join(",");
        out.push('\n');
        for row in &self.rows {
            let mut first = true;
            for cell in row {
                if !first {
                    out.push(',');
                }
                first = false;
                // Writing to a String cannot fail.
                let _ = write!(out, "{cell}");
            }
            out.push('\n');
        }
        out
    }
}

/// Named counts and candidate table for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveDeadReport {
    /// Live cells after double-count removal.
    pub number_live: usize,
    /// Dead cells.
    pub number_dead: usize,
    /// Every live candidate, in extraction order.
    pub table: Table,
}

impl LiveDeadReport {
    /// The two scalar outputs as `(name, value)` pairs.
    #[must_use]
    pub fn scalars(&self) -> [(&'static str, usize); 2] {
        [
            (NUMBER_LIVE, self.number_live),
            (NUMBER_DEAD, self.number_dead),
        ]
    }

    /// Candidate coordinates from the table, in row order.
    pub fn candidates(&self) -> impl Iterator<Item = Point> + '_ {
        self.table.rows.iter().filter_map(|row| match row.as_slice() {
            [x, y] => Some(Point::new(
                i32::try_from(*x).ok()?,
                i32::try_from(*y).ok()?,
            )),
            _ => None,
        })
    }
}

impl From<&ValidatedResult> for LiveDeadReport {
    fn from(result: &ValidatedResult) -> Self {
        Self {
            number_live: result.validated_live_count,
            number_dead: result.dead_count,
            table: Table {
                columns: vec![START_X.to_owned(), START_Y.to_owned()],
                rows: result
                    .live_candidates()
                    .map(|p| vec![i64::from(p.x), i64::from(p.y)])
                    .collect(),
            },
        }
    }
}
