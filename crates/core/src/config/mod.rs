use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{BeatCutError, EncodeSettings, Grade, Result, Vignette};

/// Top-level configuration structure for a single edit run.
///
/// Built once (defaults, then an optional JSON file, then command line
/// overrides) and passed by reference into every stage afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    pub pacing: PacingConfig,
    pub effects: EffectConfig,
    pub detector: DetectorConfig,
    pub encode: EncodeSettings,
}

impl EditConfig {
    /// Reads a JSON config file. Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        tracing::debug!(?path, "loaded edit config");
        Ok(config)
    }

    /// Validates every section eagerly so that failures surface before any
    /// media is touched.
    pub fn validate(&self) -> Result<()> {
        self.pacing.validate()?;
        self.effects.validate()?;
        self.detector.validate()?;
        Ok(())
    }
}

/// Direction of the velocity ramp applied across the edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampDirection {
    /// Long cuts first, getting shorter towards the end.
    SlowToFast,
    /// Short cuts first, getting longer towards the end.
    FastToSlow,
    /// Cut lengths follow the music only.
    #[default]
    None,
}

impl fmt::Display for RampDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RampDirection::SlowToFast => "slow_to_fast",
            RampDirection::FastToSlow => "fast_to_slow",
            RampDirection::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for RampDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "slow_to_fast" => Ok(RampDirection::SlowToFast),
            "fast_to_slow" => Ok(RampDirection::FastToSlow),
            "none" => Ok(RampDirection::None),
            other => Err(format!(
                "unknown ramp direction `{other}` (expected slow_to_fast, fast_to_slow or none)"
            )),
        }
    }
}

/// Cut pacing and output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_segment_duration: f64,
    pub max_segment_duration: f64,
    pub ramp_direction: RampDirection,
    pub target_fps: u32,
    pub target_width: u32,
    pub target_height: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_segment_duration: 0.25,
            max_segment_duration: 1.25,
            ramp_direction: RampDirection::None,
            target_fps: 60,
            target_width: 1920,
            target_height: 1080,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_segment_duration, self.max_segment_duration);
        if !min.is_finite() || !max.is_finite() {
            return Err(BeatCutError::pacing(format!(
                "segment bounds must be finite (min {min}, max {max})"
            )));
        }
        if min <= 0.0 || max <= 0.0 {
            return Err(BeatCutError::pacing(format!(
                "segment bounds must be > 0 (min {min}, max {max})"
            )));
        }
        if min >= max {
            return Err(BeatCutError::pacing(format!(
                "min_segment_duration ({min}) must be < max_segment_duration ({max})"
            )));
        }
        if self.target_fps == 0 {
            return Err(BeatCutError::pacing("target_fps must be > 0"));
        }
        let frame = 1.0 / self.target_fps as f64;
        if min < frame {
            return Err(BeatCutError::pacing(format!(
                "min_segment_duration ({min}) is shorter than one frame at {} fps",
                self.target_fps
            )));
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(BeatCutError::pacing(format!(
                "target size must be non-zero, got {}x{}",
                self.target_width, self.target_height
            )));
        }
        Ok(())
    }

    /// Midpoint of the duration bounds, used to estimate the segment count.
    pub fn mean_segment_duration(&self) -> f64 {
        (self.min_segment_duration + self.max_segment_duration) * 0.5
    }
}

/// Global effect toggles and gains consumed by the [`crate::EffectAssigner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub enable_shake: bool,
    pub enable_letterbox: bool,
    /// A flash lands on every `flash_interval`-th cut.
    pub flash_interval: u32,
    /// Upper bound of the punch-in scale.
    pub max_zoom: f64,
    /// Seconds. Segments at or below this length get the full `max_zoom`;
    /// longer ones scale down with `zoom_gain / duration`.
    pub zoom_gain: f64,
    /// Pixels of jitter at full intensity.
    pub shake_amplitude: f64,
    pub shake_frequency: f64,
    /// Seconds. Same role as `zoom_gain`, for the shake amplitude.
    pub shake_gain: f64,
    pub flash_duration: f64,
    pub flash_opacity: f64,
    pub grade: Grade,
    pub vignette: Option<Vignette>,
    /// Height of each letterbox bar as a fraction of the frame height.
    pub letterbox_ratio: f64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            enable_shake: true,
            enable_letterbox: true,
            flash_interval: 4,
            max_zoom: 1.12,
            zoom_gain: 0.25,
            shake_amplitude: 6.0,
            shake_frequency: 18.0,
            shake_gain: 0.25,
            flash_duration: 0.06,
            flash_opacity: 0.8,
            grade: Grade::default(),
            vignette: Some(Vignette::default()),
            letterbox_ratio: 0.09,
        }
    }
}

impl EffectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.flash_interval == 0 {
            return Err(BeatCutError::effect("flash_interval must be > 0"));
        }
        if !self.max_zoom.is_finite() || self.max_zoom < 1.0 {
            return Err(BeatCutError::effect(format!(
                "max_zoom must be a finite value >= 1.0, got {}",
                self.max_zoom
            )));
        }
        for (name, value) in [
            ("zoom_gain", self.zoom_gain),
            ("shake_gain", self.shake_gain),
            ("shake_frequency", self.shake_frequency),
            ("flash_duration", self.flash_duration),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(BeatCutError::effect(format!(
                    "{name} must be > 0, got {value}"
                )));
            }
        }
        if !self.shake_amplitude.is_finite() || self.shake_amplitude < 0.0 {
            return Err(BeatCutError::effect(format!(
                "shake_amplitude must be >= 0, got {}",
                self.shake_amplitude
            )));
        }
        if !(0.0..=1.0).contains(&self.flash_opacity) {
            return Err(BeatCutError::effect(format!(
                "flash_opacity must lie in [0, 1], got {}",
                self.flash_opacity
            )));
        }
        if !(0.0..0.5).contains(&self.letterbox_ratio) {
            return Err(BeatCutError::effect(format!(
                "letterbox_ratio must lie in [0, 0.5), got {}",
                self.letterbox_ratio
            )));
        }
        self.grade.validate()?;
        if let Some(vignette) = &self.vignette {
            vignette.validate()?;
        }
        Ok(())
    }
}

/// Parameters of the onset detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    /// Two events closer than this are merged into the earlier one.
    pub min_gap_seconds: f64,
    /// Frames whose flux reaches this percentile count as strong hits.
    pub strong_percentile: f64,
    /// Multiplier over the local mean flux a peak must exceed.
    pub peak_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            frame_size: 2048,
            hop_size: 512,
            min_gap_seconds: 0.12,
            strong_percentile: 75.0,
            peak_threshold: 1.5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BeatCutError::msg("detector sample_rate must be > 0"));
        }
        if self.frame_size < 2 || self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(BeatCutError::msg(format!(
                "detector needs frame_size >= 2 and 0 < hop_size <= frame_size, got {}/{}",
                self.frame_size, self.hop_size
            )));
        }
        if !self.min_gap_seconds.is_finite() || self.min_gap_seconds < 0.0 {
            return Err(BeatCutError::msg("detector min_gap_seconds must be >= 0"));
        }
        if !(0.0..=100.0).contains(&self.strong_percentile) {
            return Err(BeatCutError::msg(
                "detector strong_percentile must lie in [0, 100]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EditConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_bounds() {
        let pacing = PacingConfig {
            min_segment_duration: 1.0,
            max_segment_duration: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            pacing.validate(),
            Err(BeatCutError::InvalidPacing(_))
        ));
    }

    #[test]
    fn rejects_equal_and_non_positive_bounds() {
        for (min, max) in [(0.5, 0.5), (0.0, 1.0), (-1.0, 1.0), (0.25, f64::NAN)] {
            let pacing = PacingConfig {
                min_segment_duration: min,
                max_segment_duration: max,
                ..Default::default()
            };
            assert!(pacing.validate().is_err(), "{min}/{max} should be rejected");
        }
    }

    #[test]
    fn rejects_minimum_shorter_than_a_frame() {
        let pacing = PacingConfig {
            min_segment_duration: 1e-300,
            max_segment_duration: 2e-300,
            ..Default::default()
        };
        assert!(matches!(
            pacing.validate(),
            Err(BeatCutError::InvalidPacing(_))
        ));

        let pacing = PacingConfig {
            min_segment_duration: 0.02,
            target_fps: 30,
            ..Default::default()
        };
        assert!(pacing.validate().is_err());
        assert!(PacingConfig { target_fps: 60, ..pacing }.validate().is_ok());
    }

    #[test]
    fn rejects_zero_flash_interval() {
        let effects = EffectConfig {
            flash_interval: 0,
            ..Default::default()
        };
        assert!(matches!(
            effects.validate(),
            Err(BeatCutError::InvalidEffectConfig(_))
        ));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EditConfig = serde_json::from_str(
            r#"{ "pacing": { "ramp_direction": "slow_to_fast", "target_fps": 30 } }"#,
        )
        .unwrap();
        assert_eq!(config.pacing.ramp_direction, RampDirection::SlowToFast);
        assert_eq!(config.pacing.target_fps, 30);
        assert_eq!(config.pacing.target_width, 1920);
        assert_eq!(config.effects, EffectConfig::default());
    }

    #[test]
    fn parses_ramp_direction_names() {
        assert_eq!("slow-to-fast".parse(), Ok(RampDirection::SlowToFast));
        assert_eq!("FAST_TO_SLOW".parse(), Ok(RampDirection::FastToSlow));
        assert_eq!("none".parse(), Ok(RampDirection::None));
        assert!("sideways".parse::<RampDirection>().is_err());
        assert_eq!(RampDirection::SlowToFast.to_string(), "slow_to_fast");
    }
}
