//! Pipeline stage identifiers and metadata.
//!
//! The five stages run in a fixed order. Each [`Stage`] knows its index,
//! its display title, the channel it operates on, and which parameters
//! it reads when it runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::params;
use crate::types::Channel;

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 5;

/// One step of the live/dead pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Stage 0: background-subtract and segment the live channel.
    PreprocessLive,
    /// Stage 1: extract live-cell centroids from the live mask.
    LocateLive,
    /// Stage 2: background-subtract and segment the dead channel.
    PreprocessDead,
    /// Stage 3: extract dead-cell centroids from the dead mask.
    LocateDead,
    /// Stage 4: remove double counts and produce the final counts.
    Analyze,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; STAGE_COUNT] = [
        Self::PreprocessLive,
        Self::LocateLive,
        Self::PreprocessDead,
        Self::LocateDead,
        Self::Analyze,
    ];

    /// The first stage of every run.
    pub const FIRST: Self = Self::PreprocessLive;

    /// The terminal stage.
    pub const LAST: Self = Self::Analyze;

    /// Zero-based position in [`Stage::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look up a stage by index. Returns `None` past the last stage.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::PreprocessLive),
            1 => Some(Self::LocateLive),
            2 => Some(Self::PreprocessDead),
            3 => Some(Self::LocateDead),
            4 => Some(Self::Analyze),
            _ => None,
        }
    }

    /// The following stage, saturating at [`Stage::Analyze`].
    #[must_use]
    pub const fn next(self) -> Self {
        match Self::from_index(self.index() + 1) {
            Some(s) => s,
            None => Self::LAST,
        }
    }

    /// The preceding stage, saturating at [`Stage::PreprocessLive`].
    #[must_use]
    pub const fn previous(self) -> Self {
        match self.index().checked_sub(1) {
            Some(i) => match Self::from_index(i) {
                Some(s) => s,
                None => Self::FIRST,
            },
            None => Self::FIRST,
        }
    }

    /// Step title shown to the user.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PreprocessLive => "LIVE - Preprocess image",
            Self::LocateLive => "LIVE - locate cells",
            Self::PreprocessDead => "DEAD - Preprocess image",
            Self::LocateDead => "DEAD - locate cells",
            Self::Analyze => "Analyze",
        }
    }

    /// Short machine-friendly name (e.g. for CLI flags and JSON keys).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreprocessLive => "preprocess-live",
            Self::LocateLive => "locate-live",
            Self::PreprocessDead => "preprocess-dead",
            Self::LocateDead => "locate-dead",
            Self::Analyze => "analyze",
        }
    }

    /// The channel this stage works on, or `None` for [`Stage::Analyze`].
    #[must_use]
    pub const fn channel(self) -> Option<Channel> {
        match self {
            Self::PreprocessLive | Self::LocateLive => Some(Channel::Live),
            Self::PreprocessDead | Self::LocateDead => Some(Channel::Dead),
            Self::Analyze => None,
        }
    }

    /// Whether this stage produces a segmented mask.
    #[must_use]
    pub const fn is_preprocess(self) -> bool {
        matches!(self, Self::PreprocessLive | Self::PreprocessDead)
    }

    /// Named parameters this stage reads.
    #[must_use]
    pub const fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::PreprocessLive => &[params::BINNING, params::ROLLING_BALL, params::LIVE_TOLERANCE],
            Self::LocateLive => &[params::LIVE_RADIUS],
            Self::PreprocessDead => &[params::BINNING, params::ROLLING_BALL, params::DEAD_TOLERANCE],
            Self::LocateDead => &[params::DEAD_RADIUS],
            Self::Analyze => &[params::DOUBLE_COUNTING],
        }
    }

    /// The preprocessing stage for `channel`.
    #[must_use]
    pub const fn preprocess(channel: Channel) -> Self {
        match channel {
            Channel::Live => Self::PreprocessLive,
            Channel::Dead => Self::PreprocessDead,
        }
    }

    /// The locating stage for `channel`.
    #[must_use]
    pub const fn locate(channel: Channel) -> Self {
        match channel {
            Channel::Live => Self::LocateLive,
            Channel::Dead => Self::LocateDead,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_every_variant_in_index_order() {
        assert_eq!(Stage::ALL.len(), STAGE_COUNT);
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::from_index(i), Some(*stage));
        }
    }

    #[test]
    fn from_index_out_of_range_is_none() {
        assert_eq!(Stage::from_index(STAGE_COUNT), None);
    }

    #[test]
    fn next_saturates_at_analyze() {
        assert_eq!(Stage::LocateDead.next(), Stage::Analyze);
        assert_eq!(Stage::Analyze.next(), Stage::Analyze);
    }

    #[test]
    fn previous_saturates_at_first() {
        assert_eq!(Stage::LocateLive.previous(), Stage::PreprocessLive);
        assert_eq!(Stage::PreprocessLive.previous(), Stage::PreprocessLive);
    }

    #[test]
    fn channel_stages_are_mirrored() {
        for channel in Channel::ALL {
            assert_eq!(Stage::preprocess(channel).channel(), Some(channel));
            assert_eq!(Stage::locate(channel).channel(), Some(channel));
            assert!(Stage::preprocess(channel).is_preprocess());
            assert!(!Stage::locate(channel).is_preprocess());
        }
        assert_eq!(Stage::Analyze.channel(), None);
    }

    #[test]
    fn analyze_reads_only_the_double_counting_radius() {
        assert_eq!(Stage::Analyze.parameter_names(), &[params::DOUBLE_COUNTING]);
    }

    #[test]
    fn display_uses_step_title() {
        assert_eq!(Stage::PreprocessDead.to_string(), "DEAD - Preprocess image");
    }
}
