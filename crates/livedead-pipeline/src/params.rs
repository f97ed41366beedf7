//! Pipeline parameters and their named-setting form.
//!
//! [`PipelineParameters`] is the typed snapshot every stage reads when it
//! runs. Hosts that store settings as named strings (the plugin form
//! names listed as constants below) build it with
//! [`PipelineParameters::from_settings`].

use serde::{Deserialize, Serialize};

use crate::types::{Channel, PipelineError};

/// Setting name: run all stages without pausing.
pub const AUTOMATIC: &str = "Automatic";
/// Setting name: binning factor.
pub const BINNING: &str = "Binning";
/// Setting name: rolling-ball radius.
pub const ROLLING_BALL: &str = "RollingBall";
/// Setting name: live-channel maxima tolerance.
pub const LIVE_TOLERANCE: &str = "Live tolerance";
/// Setting name: dead-channel maxima tolerance.
pub const DEAD_TOLERANCE: &str = "Dead tolerance";
/// Setting name: live-channel minimum particle size.
pub const LIVE_RADIUS: &str = "Live radius";
/// Setting name: dead-channel minimum particle size.
pub const DEAD_RADIUS: &str = "Dead radius";
/// Setting name: double-counting distance.
pub const DOUBLE_COUNTING: &str = "Double counting";

/// Every recognised setting name.
pub const ALL_NAMES: [&str; 8] = [
    AUTOMATIC,
    BINNING,
    ROLLING_BALL,
    LIVE_TOLERANCE,
    DEAD_TOLERANCE,
    LIVE_RADIUS,
    DEAD_RADIUS,
    DOUBLE_COUNTING,
];

/// Map a setting name to its `'static` constant.
#[must_use]
pub fn canonical_name(name: &str) -> Option<&'static str> {
    ALL_NAMES.into_iter().find(|n| *n == name)
}

/// Parameters for one pipeline run.
///
/// All numeric values are in pixels (radii, distances) or 8-bit
/// intensity levels (tolerances). Fields missing from a serialized form
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParameters {
    /// Run every stage in one call instead of pausing after each.
    pub automatic: bool,

    /// Integer shrink factor applied to both channel images before
    /// processing. Must be at least 1.
    pub binning: u32,

    /// Rolling-ball radius for background subtraction. `0` disables
    /// background subtraction.
    pub rolling_ball_radius: f64,

    /// Noise tolerance for live-channel maxima: a maximum must stand at
    /// least this far above the saddle to any brighter region.
    pub live_tolerance: f64,

    /// Noise tolerance for dead-channel maxima.
    pub dead_tolerance: f64,

    /// Minimum particle area (pixels) kept by the live extractor.
    pub live_radius: f64,

    /// Minimum particle area (pixels) kept by the dead extractor.
    pub dead_radius: f64,

    /// A live centroid closer than this to any dead centroid is treated
    /// as the same cell and not counted as live.
    pub double_counting_radius: f64,
}

impl PipelineParameters {
    /// Default for [`automatic`](Self::automatic).
    pub const DEFAULT_AUTOMATIC: bool = false;
    /// Default for [`binning`](Self::binning).
    pub const DEFAULT_BINNING: u32 = 1;
    /// Default for [`rolling_ball_radius`](Self::rolling_ball_radius).
    pub const DEFAULT_ROLLING_BALL_RADIUS: f64 = 50.0;
    /// Default for both channel tolerances.
    pub const DEFAULT_TOLERANCE: f64 = 8.0;
    /// Default for both channel minimum particle sizes.
    pub const DEFAULT_PARTICLE_RADIUS: f64 = 0.0;
    /// Default for [`double_counting_radius`](Self::double_counting_radius).
    pub const DEFAULT_DOUBLE_COUNTING_RADIUS: f64 = 20.0;

    /// Maxima tolerance for `channel`.
    #[must_use]
    pub const fn tolerance(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Live => self.live_tolerance,
            Channel::Dead => self.dead_tolerance,
        }
    }

    /// Minimum particle size for `channel`.
    #[must_use]
    pub const fn min_particle_size(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Live => self.live_radius,
            Channel::Dead => self.dead_radius,
        }
    }

    /// Check every numeric parameter is in range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] naming the first
    /// parameter that is negative or non-finite, or a binning factor
    /// below 1.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.binning < 1 {
            return Err(PipelineError::InvalidParameter {
                name: BINNING,
                value: f64::from(self.binning),
            });
        }
        let checks = [
            (ROLLING_BALL, self.rolling_ball_radius),
            (LIVE_TOLERANCE, self.live_tolerance),
            (DEAD_TOLERANCE, self.dead_tolerance),
            (LIVE_RADIUS, self.live_radius),
            (DEAD_RADIUS, self.dead_radius),
            (DOUBLE_COUNTING, self.double_counting_radius),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    /// Build parameters from named string settings.
    ///
    /// Numeric settings are parsed as decimals and truncated toward zero
    /// to whole pixels or levels. `Automatic` is `true` only for a
    /// case-insensitive `"true"`. Missing settings keep their defaults and
    /// unrecognised names are ignored. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSetting`] for a value that is not a
    /// number, and [`PipelineError::InvalidParameter`] if a parsed value
    /// is out of range.
    pub fn from_settings<I, K, V>(settings: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in settings {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                AUTOMATIC => params.automatic = value.trim().eq_ignore_ascii_case("true"),
                BINNING => params.binning = parse_binning(value)?,
                ROLLING_BALL => params.rolling_ball_radius = parse_whole(key, value)?,
                LIVE_TOLERANCE => params.live_tolerance = parse_whole(key, value)?,
                DEAD_TOLERANCE => params.dead_tolerance = parse_whole(key, value)?,
                LIVE_RADIUS => params.live_radius = parse_whole(key, value)?,
                DEAD_RADIUS => params.dead_radius = parse_whole(key, value)?,
                DOUBLE_COUNTING => params.double_counting_radius = parse_whole(key, value)?,
                _ => {}
            }
        }
        params.validate()?;
        Ok(params)
    }

    /// Render these parameters as named string settings, in
    /// [`ALL_NAMES`] order.
    #[must_use]
    pub fn to_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            (AUTOMATIC, self.automatic.to_string()),
            (BINNING, self.binning.to_string()),
            (ROLLING_BALL, self.rolling_ball_radius.to_string()),
            (LIVE_TOLERANCE, self.live_tolerance.to_string()),
            (DEAD_TOLERANCE, self.dead_tolerance.to_string()),
            (LIVE_RADIUS, self.live_radius.to_string()),
            (DEAD_RADIUS, self.dead_radius.to_string()),
            (DOUBLE_COUNTING, self.double_counting_radius.to_string()),
        ]
    }
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            automatic: Self::DEFAULT_AUTOMATIC,
            binning: Self::DEFAULT_BINNING,
            rolling_ball_radius: Self::DEFAULT_ROLLING_BALL_RADIUS,
            live_tolerance: Self::DEFAULT_TOLERANCE,
            dead_tolerance: Self::DEFAULT_TOLERANCE,
            live_radius: Self::DEFAULT_PARTICLE_RADIUS,
            dead_radius: Self::DEFAULT_PARTICLE_RADIUS,
            double_counting_radius: Self::DEFAULT_DOUBLE_COUNTING_RADIUS,
        }
    }
}

/// Parse a decimal setting and truncate it toward zero.
fn parse_whole(name: &str, value: &str) -> Result<f64, PipelineError> {
    value
        .trim()
        .parse::<f64>()
        .map(f64::trunc)
        .map_err(|_| PipelineError::InvalidSetting {
            name: name.to_owned(),
            value: value.to_owned(),
        })
}

/// Parse the binning setting into a whole factor of at least 1.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_binning(value: &str) -> Result<u32, PipelineError> {
    let factor = parse_whole(BINNING, value)?;
    if !(1.0..=f64::from(u32::MAX)).contains(&factor) {
        return Err(PipelineError::InvalidParameter {
            name: BINNING,
            value: factor,
        });
    }
    Ok(factor as u32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineParameters::default().validate().unwrap();
    }

    #[test]
    fn default_values_match_plugin_form() {
        let p = PipelineParameters::default();
        assert!(!p.automatic);
        assert_eq!(p.binning, 1);
        assert_eq!(p.rolling_ball_radius, 50.0);
        assert_eq!(p.live_tolerance, 8.0);
        assert_eq!(p.dead_tolerance, 8.0);
        assert_eq!(p.live_radius, 0.0);
        assert_eq!(p.dead_radius, 0.0);
        assert_eq!(p.double_counting_radius, 20.0);
    }

    #[test]
    fn negative_radius_is_rejected() {
        let p = PipelineParameters {
            double_counting_radius: -1.0,
            ..PipelineParameters::default()
        };
        assert!(matches!(
            p.validate(),
            Err(PipelineError::InvalidParameter { name: DOUBLE_COUNTING, .. })
        ));
    }

    #[test]
    fn nan_tolerance_is_rejected() {
        let p = PipelineParameters {
            dead_tolerance: f64::NAN,
            ..PipelineParameters::default()
        };
        assert!(matches!(
            p.validate(),
            Err(PipelineError::InvalidParameter { name: DEAD_TOLERANCE, .. })
        ));
    }

    #[test]
    fn zero_binning_is_rejected() {
        let p = PipelineParameters {
            binning: 0,
            ..PipelineParameters::default()
        };
        assert!(matches!(
            p.validate(),
            Err(PipelineError::InvalidParameter { name: BINNING, .. })
        ));
    }

    #[test]
    fn channel_accessors_pick_the_right_field() {
        let p = PipelineParameters {
            live_tolerance: 3.0,
            dead_tolerance: 9.0,
            live_radius: 4.0,
            dead_radius: 12.0,
            ..PipelineParameters::default()
        };
        assert_eq!(p.tolerance(Channel::Live), 3.0);
        assert_eq!(p.tolerance(Channel::Dead), 9.0);
        assert_eq!(p.min_particle_size(Channel::Live), 4.0);
        assert_eq!(p.min_particle_size(Channel::Dead), 12.0);
    }

    #[test]
    fn settings_are_parsed_and_truncated() {
        let p = PipelineParameters::from_settings([
            (AUTOMATIC, "TRUE"),
            (BINNING, "2.0"),
            (ROLLING_BALL, "30.9"),
            (LIVE_TOLERANCE, " 12.5 "),
            (DOUBLE_COUNTING, "15.99"),
        ])
        .unwrap();
        assert!(p.automatic);
        assert_eq!(p.binning, 2);
        assert_eq!(p.rolling_ball_radius, 30.0);
        assert_eq!(p.live_tolerance, 12.0);
        assert_eq!(p.double_counting_radius, 15.0);
        // Untouched settings keep their defaults.
        assert_eq!(p.dead_tolerance, PipelineParameters::DEFAULT_TOLERANCE);
    }

    #[test]
    fn automatic_is_false_for_anything_but_true() {
        let p = PipelineParameters::from_settings([(AUTOMATIC, "yes")]).unwrap();
        assert!(!p.automatic);
    }

    #[test]
    fn unknown_settings_are_ignored() {
        let p = PipelineParameters::from_settings([("Threshold", "40.0")]).unwrap();
        assert_eq!(p, PipelineParameters::default());
    }

    #[test]
    fn unparseable_setting_is_reported() {
        let err = PipelineParameters::from_settings([(LIVE_RADIUS, "big")]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidSetting { ref name, ref value } if name == LIVE_RADIUS && value == "big"
        ));
    }

    #[test]
    fn fractional_binning_below_one_is_rejected() {
        let err = PipelineParameters::from_settings([(BINNING, "0.5")]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { name: BINNING, .. }));
    }

    #[test]
    fn negative_setting_is_rejected() {
        let err = PipelineParameters::from_settings([(DEAD_RADIUS, "-3")]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { name: DEAD_RADIUS, .. }));
    }

    #[test]
    fn settings_round_trip() {
        let p = PipelineParameters {
            automatic: true,
            binning: 3,
            live_radius: 7.0,
            ..PipelineParameters::default()
        };
        let back = PipelineParameters::from_settings(p.to_settings()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn missing_json_fields_take_defaults() {
        let p: PipelineParameters =
            serde_json::from_str(r#"{"double_counting_radius": 5.0}"#).unwrap();
        assert_eq!(p.double_counting_radius, 5.0);
        assert_eq!(p.live_tolerance, PipelineParameters::DEFAULT_TOLERANCE);
    }

    #[test]
    fn canonical_name_finds_known_settings() {
        assert_eq!(canonical_name("Double counting"), Some(DOUBLE_COUNTING));
        assert_eq!(canonical_name("double counting"), None);
    }
}
