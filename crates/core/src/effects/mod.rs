use serde::{Deserialize, Serialize};

use crate::{BeatCutError, EffectConfig, Result, Segment};

/// Scale curve applied across a segment, from `start_scale` at its first frame
/// to `end_scale` at its last.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomCurve {
    pub start_scale: f64,
    pub end_scale: f64,
}

impl Default for ZoomCurve {
    fn default() -> Self {
        Self {
            start_scale: 1.0,
            end_scale: 1.0,
        }
    }
}

/// Handheld-style jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shake {
    /// Peak offset in output pixels.
    pub amplitude: f64,
    /// Position changes per second.
    pub frequency: f64,
}

/// Global colour look.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grade {
    pub contrast: f64,
    pub saturation: f64,
    pub brightness: f64,
    /// Positive values push towards red, negative towards blue.
    pub warmth: f64,
}

impl Default for Grade {
    fn default() -> Self {
        Self {
            contrast: 1.2,
            saturation: 1.05,
            brightness: 0.03,
            warmth: 0.05,
        }
    }
}

impl Grade {
    /// A grade that leaves frames untouched.
    pub fn neutral() -> Self {
        Self {
            contrast: 1.0,
            saturation: 1.0,
            brightness: 0.0,
            warmth: 0.0,
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("contrast", self.contrast, -1000.0, 1000.0),
            ("saturation", self.saturation, 0.0, 3.0),
            ("brightness", self.brightness, -1.0, 1.0),
            ("warmth", self.warmth, -1.0, 1.0),
        ];
        for (name, value, lo, hi) in checks {
            if !value.is_finite() || value < lo || value > hi {
                return Err(BeatCutError::effect(format!(
                    "grade {name} must lie in [{lo}, {hi}], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Radial darkening towards the frame corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vignette {
    /// 0 disables the effect, 1 fades the corners to black.
    pub strength: f64,
    /// Normalised radius where darkening starts; it reaches full strength
    /// at the frame edge.
    pub falloff: f64,
}

impl Default for Vignette {
    fn default() -> Self {
        Self {
            strength: 0.6,
            falloff: 0.55,
        }
    }
}

impl Vignette {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(BeatCutError::effect(format!(
                "vignette strength must lie in [0, 1], got {}",
                self.strength
            )));
        }
        if !(0.0..1.0).contains(&self.falloff) {
            return Err(BeatCutError::effect(format!(
                "vignette falloff must lie in [0, 1), got {}",
                self.falloff
            )));
        }
        Ok(())
    }
}

/// Effect directives attached to one segment. Written once by the
/// [`EffectAssigner`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSet {
    pub zoom: ZoomCurve,
    pub flash: bool,
    pub shake: Option<Shake>,
    pub grade: Grade,
    pub vignette: Option<Vignette>,
    pub letterbox: bool,
}

impl Default for EffectSet {
    fn default() -> Self {
        Self {
            zoom: ZoomCurve::default(),
            flash: false,
            shake: None,
            grade: Grade::neutral(),
            vignette: None,
            letterbox: false,
        }
    }
}

/// Decorates scheduled segments with their effects.
///
/// Every rule is a pure function of the segment index, its duration and the
/// configuration, so identical schedules always receive identical effects.
#[derive(Debug, Clone)]
pub struct EffectAssigner {
    config: EffectConfig,
}

impl EffectAssigner {
    pub fn new(config: EffectConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    pub fn assign(&self, segments: Vec<Segment>) -> Result<Vec<Segment>> {
        let decorated: Vec<Segment> = segments
            .into_iter()
            .map(|mut segment| {
                segment.effects = self.effects_for(segment.sequence_index, segment.duration());
                segment
            })
            .collect();

        let flashes = decorated.iter().filter(|s| s.effects.flash).count();
        tracing::info!(
            segments = decorated.len(),
            flashes,
            shake = self.config.enable_shake,
            letterbox = self.config.enable_letterbox,
            "effects assigned"
        );
        Ok(decorated)
    }

    /// Effects for the segment at `index` lasting `duration` seconds.
    pub fn effects_for(&self, index: usize, duration: f64) -> EffectSet {
        let config = &self.config;

        let zoom = ZoomCurve {
            start_scale: 1.0,
            end_scale: 1.0 + (config.max_zoom - 1.0) * intensity(config.zoom_gain, duration),
        };

        let interval = config.flash_interval as usize;
        let flash = index != 0 && index % interval == 0;

        let shake = config.enable_shake.then(|| Shake {
            amplitude: config.shake_amplitude * intensity(config.shake_gain, duration),
            frequency: config.shake_frequency,
        });

        EffectSet {
            zoom,
            flash,
            shake,
            grade: config.grade,
            vignette: config.vignette,
            letterbox: config.enable_letterbox,
        }
    }
}

/// `gain / duration`, capped at 1 so the shortest cuts hit the configured
/// maximum and longer ones fall off with their length.
fn intensity(gain: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 1.0;
    }
    (gain / duration).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CutKind, PacingConfig, Scheduler};

    fn segments(count: usize, duration: f64) -> Vec<Segment> {
        (0..count)
            .map(|i| Segment {
                sequence_index: i,
                start_time: i as f64 * duration,
                end_time: (i + 1) as f64 * duration,
                cut: CutKind::Event,
                effects: EffectSet::default(),
            })
            .collect()
    }

    fn assigner(config: EffectConfig) -> EffectAssigner {
        EffectAssigner::new(config).unwrap()
    }

    #[test]
    fn flashes_land_on_multiples_of_the_interval() {
        let config = EffectConfig {
            flash_interval: 3,
            ..Default::default()
        };
        let decorated = assigner(config).assign(segments(12, 0.5)).unwrap();
        let flashes: Vec<usize> = decorated
            .iter()
            .filter(|s| s.effects.flash)
            .map(|s| s.sequence_index)
            .collect();
        assert_eq!(flashes, vec![3, 6, 9]);
    }

    #[test]
    fn interval_of_one_still_skips_the_first_segment() {
        let config = EffectConfig {
            flash_interval: 1,
            ..Default::default()
        };
        let decorated = assigner(config).assign(segments(3, 0.5)).unwrap();
        assert!(!decorated[0].effects.flash);
        assert!(decorated[1].effects.flash && decorated[2].effects.flash);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = EffectConfig {
            flash_interval: 0,
            ..Default::default()
        };
        assert!(matches!(
            EffectAssigner::new(config),
            Err(BeatCutError::InvalidEffectConfig(_))
        ));
    }

    #[test]
    fn shorter_segments_zoom_and_shake_harder() {
        let assigner = assigner(EffectConfig::default());
        let short = assigner.effects_for(1, 0.25);
        let long = assigner.effects_for(1, 1.0);

        assert!((short.zoom.end_scale - 1.12).abs() < 1e-12);
        assert!(long.zoom.end_scale < short.zoom.end_scale);
        assert!(long.zoom.end_scale >= 1.0);
        assert_eq!(short.zoom.start_scale, 1.0);

        let (short_shake, long_shake) = (short.shake.unwrap(), long.shake.unwrap());
        assert!(long_shake.amplitude < short_shake.amplitude);
        assert_eq!(short_shake.frequency, 18.0);
    }

    #[test]
    fn zoom_never_exceeds_max() {
        let assigner = assigner(EffectConfig {
            max_zoom: 1.3,
            ..Default::default()
        });
        for duration in [0.01, 0.1, 0.25, 0.8, 5.0] {
            let zoom = assigner.effects_for(2, duration).zoom;
            assert!(zoom.end_scale >= 1.0 && zoom.end_scale <= 1.3);
        }
    }

    #[test]
    fn disabled_toggles_are_omitted() {
        let config = EffectConfig {
            enable_shake: false,
            enable_letterbox: false,
            ..Default::default()
        };
        let decorated = assigner(config).assign(segments(4, 0.5)).unwrap();
        assert!(decorated
            .iter()
            .all(|s| s.effects.shake.is_none() && !s.effects.letterbox));
    }

    #[test]
    fn vignette_falloff_must_stay_inside_the_frame() {
        assert!(Vignette::default().validate().is_ok());
        for falloff in [1.0, -0.1, f64::NAN] {
            let vignette = Vignette {
                falloff,
                ..Default::default()
            };
            assert!(matches!(
                vignette.validate(),
                Err(BeatCutError::InvalidEffectConfig(_))
            ));
        }
        let parsed: Vignette = serde_json::from_str(r#"{"strength": 0.3}"#).unwrap();
        assert_eq!(parsed.falloff, 0.55);
    }

    #[test]
    fn grade_and_letterbox_are_uniform() {
        let decorated = assigner(EffectConfig::default())
            .assign(segments(6, 0.4))
            .unwrap();
        assert!(decorated
            .iter()
            .all(|s| s.effects.grade == Grade::default() && s.effects.letterbox));
    }

    #[test]
    fn assignment_is_deterministic_end_to_end() {
        let events: Vec<f64> = (1..=40).map(|i| i as f64 * 0.3).collect();
        let run = || {
            let scheduler = Scheduler::new(PacingConfig::default()).unwrap();
            let segments = scheduler.schedule(&events, 12.0).unwrap();
            let decorated = assigner(EffectConfig::default()).assign(segments).unwrap();
            serde_json::to_vec(&decorated).unwrap()
        };
        assert_eq!(run(), run());
    }
}
