use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{BeatCutError, Result};

/// Default spacing below which two detected events are treated as one.
pub const DEFAULT_MIN_GAP: f64 = 0.12;

/// Ordered musical event times for one track, in seconds.
///
/// A track is immutable once built: times are finite, non-negative and
/// strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrack {
    events: Vec<f64>,
    duration_seconds: f64,
}

impl EventTrack {
    /// Wraps already ordered event times, rejecting anything that breaks the
    /// ordering or range requirements.
    pub fn new(events: Vec<f64>, duration_seconds: f64) -> Result<Self> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(BeatCutError::InvalidDuration(duration_seconds));
        }
        validate_events(&events)?;
        Ok(Self {
            events,
            duration_seconds,
        })
    }

    /// Builds a track from raw detector output: drops invalid times, sorts,
    /// rounds to the millisecond and keeps only the earlier of any two events
    /// closer than `min_gap`.
    pub fn from_unsorted(times: Vec<f64>, duration_seconds: f64, min_gap: f64) -> Result<Self> {
        let provided = times.len();
        let mut times: Vec<f64> = times
            .into_iter()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| (t * 1000.0).round() / 1000.0)
            .collect();
        times.sort_by(f64::total_cmp);

        let mut events: Vec<f64> = Vec::with_capacity(times.len());
        for time in times {
            match events.last() {
                Some(last) if time - last < min_gap.max(f64::EPSILON) => {}
                _ => events.push(time),
            }
        }

        if events.len() < provided {
            tracing::debug!(
                provided,
                kept = events.len(),
                min_gap,
                "collapsed close or invalid events"
            );
        }
        Self::new(events, duration_seconds)
    }

    /// Loads a track previously written with [`EventTrack::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let track: EventTrack = serde_json::from_str(&raw)?;
        // Re-run validation: the file may have been edited by hand.
        Self::new(track.events, track.duration_seconds)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn events(&self) -> &[f64] {
        &self.events
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Checks that event times are finite, non-negative and strictly increasing.
pub fn validate_events(events: &[f64]) -> Result<()> {
    if let Some((index, time)) = events
        .iter()
        .enumerate()
        .find(|(_, t)| !t.is_finite() || **t < 0.0)
    {
        return Err(BeatCutError::InvalidEvents(format!(
            "event {index} has invalid time {time}"
        )));
    }
    if let Some(index) = events.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(BeatCutError::InvalidEvents(format!(
            "events must be strictly increasing, but event {} ({}) follows {}",
            index + 1,
            events[index + 1],
            events[index]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_close_events_keeping_the_earlier() {
        let track =
            EventTrack::from_unsorted(vec![1.0, 0.5, 0.55, 1.05, 2.0, 1.0], 3.0, DEFAULT_MIN_GAP)
                .unwrap();
        assert_eq!(track.events(), &[0.5, 1.0, 2.0]);
    }

    #[test]
    fn drops_invalid_times_and_rounds() {
        let track =
            EventTrack::from_unsorted(vec![f64::NAN, -0.2, 0.3334, 0.9996], 2.0, 0.0).unwrap();
        assert_eq!(track.events(), &[0.333, 1.0]);
    }

    #[test]
    fn rejects_unordered_events() {
        let err = EventTrack::new(vec![0.5, 0.4], 1.0).unwrap_err();
        assert!(matches!(err, BeatCutError::InvalidEvents(_)));
        assert!(format!("{err}").contains("strictly increasing"));
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(matches!(
            EventTrack::new(vec![0.5], 0.0),
            Err(BeatCutError::InvalidDuration(_))
        ));
    }

    #[test]
    fn saves_and_loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let track = EventTrack::new(vec![0.5, 1.0, 1.6], 3.0).unwrap();
        track.save(&path).unwrap();

        let loaded = EventTrack::load(&path).unwrap();
        assert_eq!(loaded, track);
    }

    #[test]
    fn load_revalidates_hand_edited_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(&path, r#"{ "events": [1.0, 0.5], "duration_seconds": 3.0 }"#).unwrap();

        assert!(matches!(
            EventTrack::load(&path),
            Err(BeatCutError::InvalidEvents(_))
        ));
    }
}
