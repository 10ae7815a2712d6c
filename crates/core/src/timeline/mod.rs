use serde::{Deserialize, Serialize};

use crate::{events::validate_events, BeatCutError, EffectSet, PacingConfig, RampDirection, Result};

/// Slack used when comparing accumulated times against the end of the edit.
const TIME_EPSILON: f64 = 1e-9;

/// Share of the pacing span a ramp slot may stray from its envelope value
/// when snapping onto an event.
const RAMP_SLACK: f64 = 0.25;

/// How the end boundary of a segment was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutKind {
    /// Snapped onto a musical event.
    Event,
    /// The nearest event broke a duration bound; cut placed on that bound.
    Synthetic,
    /// Ends at the end of the edit.
    Terminal,
}

/// One contiguous span of source time in the output edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub sequence_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub cut: CutKind,
    pub effects: EffectSet,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Counters describing a finished schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub segments: usize,
    pub snapped: usize,
    pub synthetic: usize,
    pub mean_duration: f64,
}

impl ScheduleSummary {
    pub fn from_segments(segments: &[Segment]) -> Self {
        let count = |kind| segments.iter().filter(|s| s.cut == kind).count();
        let total: f64 = segments.iter().map(Segment::duration).sum();
        Self {
            segments: segments.len(),
            snapped: count(CutKind::Event),
            synthetic: count(CutKind::Synthetic),
            mean_duration: if segments.is_empty() {
                0.0
            } else {
                total / segments.len() as f64
            },
        }
    }
}

/// Turns event times into a gap-free sequence of segments.
///
/// Each step picks the unused event nearest to a target end time, preferring
/// the earlier event on ties. If that event would make the segment shorter
/// than the window `[start + lo, start + hi]` allows, the cut lands on
/// `start + lo`; if longer, on `start + hi`. Pacing bounds always win over
/// musical alignment.
///
/// Ramps take their targets from a linear envelope accumulated slot by slot.
/// Each slot's window stays within [`RAMP_SLACK`] of the envelope on the far
/// side and never crosses the previous duration on the near side, so
/// durations move monotonically without one early snap pinning the ramp.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pacing: PacingConfig,
}

impl Scheduler {
    pub fn new(pacing: PacingConfig) -> Result<Self> {
        pacing.validate()?;
        Ok(Self { pacing })
    }

    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    /// Partitions `[0, total_output_duration)` into segments. Every segment
    /// but the last lies within the pacing bounds; the last one ends exactly
    /// at `total_output_duration` and may be shorter than the minimum.
    pub fn schedule(&self, events: &[f64], total_output_duration: f64) -> Result<Vec<Segment>> {
        if !total_output_duration.is_finite() || total_output_duration <= 0.0 {
            return Err(BeatCutError::InvalidDuration(total_output_duration));
        }
        validate_events(events)?;

        let usable: Vec<f64> = events
            .iter()
            .copied()
            .filter(|t| *t > 0.0 && *t <= total_output_duration)
            .collect();
        if usable.is_empty() {
            return Err(BeatCutError::InsufficientEvents {
                provided: events.len(),
                window: total_output_duration,
            });
        }
        if usable.len() < events.len() {
            tracing::debug!(
                discarded = events.len() - usable.len(),
                total_output_duration,
                "ignoring events outside the output window"
            );
        }

        let envelope = Envelope::new(&self.pacing, total_output_duration);
        let min = self.pacing.min_segment_duration;
        let max = self.pacing.max_segment_duration;

        let mut segments = Vec::new();
        let mut cursor = 0usize;
        let mut start = 0.0f64;
        let mut previous: Option<f64> = None;
        let mut planned_end = 0.0f64;

        while start < total_output_duration - TIME_EPSILON {
            let index = segments.len();
            let (lo, hi) = envelope.window(index, previous);

            // Skip events that can no longer serve as an end boundary.
            while cursor < usable.len() && usable[cursor] <= start + TIME_EPSILON {
                cursor += 1;
            }

            let target = match self.pacing.ramp_direction {
                RampDirection::None => {
                    let gap = usable.get(cursor).map(|next| next - start).unwrap_or(max);
                    start + gap.clamp(lo, hi)
                }
                _ => {
                    planned_end += envelope.slot(index);
                    planned_end.clamp(start + lo, start + hi)
                }
            };

            let (mut end, mut cut) = match nearest_event(&usable[cursor..], target) {
                Some(offset) => {
                    let time = usable[cursor + offset];
                    if time < start + lo {
                        (start + lo, CutKind::Synthetic)
                    } else if time > start + hi {
                        (start + hi, CutKind::Synthetic)
                    } else {
                        cursor += offset + 1;
                        (time, CutKind::Event)
                    }
                }
                None => (target, CutKind::Synthetic),
            };

            let remaining = total_output_duration - start;
            if end >= total_output_duration - TIME_EPSILON
                || (total_output_duration - end < min && remaining <= hi)
            {
                end = total_output_duration;
                cut = CutKind::Terminal;
            }
            if end <= start {
                return Err(BeatCutError::pacing(format!(
                    "minimum segment duration {min} is too small to advance past {start}s"
                )));
            }

            tracing::trace!(index, start, end, ?cut, "scheduled segment");
            segments.push(Segment {
                sequence_index: index,
                start_time: start,
                end_time: end,
                cut,
                effects: EffectSet::default(),
            });
            previous = Some(end - start);
            start = end;
        }

        let summary = ScheduleSummary::from_segments(&segments);
        if summary.synthetic * 2 > summary.segments {
            tracing::warn!(
                synthetic = summary.synthetic,
                segments = summary.segments,
                "most cuts could not be aligned to events; check the pacing bounds"
            );
        }
        tracing::info!(
            segments = summary.segments,
            snapped = summary.snapped,
            synthetic = summary.synthetic,
            mean_duration = summary.mean_duration,
            ramp = %self.pacing.ramp_direction,
            "schedule complete"
        );

        Ok(segments)
    }
}

/// Index of the sorted candidate closest to `target`; the earlier one wins a
/// tie.
fn nearest_event(candidates: &[f64], target: f64) -> Option<usize> {
    let after = candidates.partition_point(|&time| time < target);
    match (after.checked_sub(1), candidates.get(after)) {
        (Some(before), Some(&next)) if target - candidates[before] <= next - target => Some(before),
        (_, Some(_)) => Some(after),
        (before, None) => before,
    }
}

/// Target duration per slot plus the window each slot may snap within.
struct Envelope {
    direction: RampDirection,
    min: f64,
    max: f64,
    slack: f64,
    slots: usize,
}

impl Envelope {
    fn new(pacing: &PacingConfig, total: f64) -> Self {
        let slots = (total / pacing.mean_segment_duration()).ceil().max(1.0) as usize;
        Self {
            direction: pacing.ramp_direction,
            min: pacing.min_segment_duration,
            max: pacing.max_segment_duration,
            slack: (pacing.max_segment_duration - pacing.min_segment_duration) * RAMP_SLACK,
            slots,
        }
    }

    /// Linear ramp between the bounds across the expected slot count; slots
    /// past the estimate hold the final value.
    fn slot(&self, index: usize) -> f64 {
        let progress = if self.slots <= 1 {
            1.0
        } else {
            (index as f64 / (self.slots - 1) as f64).min(1.0)
        };
        let span = self.max - self.min;
        match self.direction {
            RampDirection::SlowToFast => self.max - span * progress,
            RampDirection::FastToSlow => self.min + span * progress,
            RampDirection::None => self.max,
        }
    }

    /// Duration window for slot `index`. A ramp never lets a duration move
    /// against its direction, and never lets it fall more than the slack
    /// behind the envelope.
    fn window(&self, index: usize, previous: Option<f64>) -> (f64, f64) {
        let previous = previous.map(|prev| prev.clamp(self.min, self.max));
        match self.direction {
            RampDirection::SlowToFast => (
                (self.slot(index) - self.slack).max(self.min),
                previous.unwrap_or(self.max),
            ),
            RampDirection::FastToSlow => (
                previous.unwrap_or(self.min),
                (self.slot(index) + self.slack).min(self.max),
            ),
            RampDirection::None => (self.min, self.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn pacing(min: f64, max: f64, ramp: RampDirection) -> PacingConfig {
        PacingConfig {
            min_segment_duration: min,
            max_segment_duration: max,
            ramp_direction: ramp,
            ..Default::default()
        }
    }

    fn schedule(events: &[f64], total: f64, ramp: RampDirection) -> Vec<Segment> {
        Scheduler::new(pacing(0.25, 1.25, ramp))
            .unwrap()
            .schedule(events, total)
            .unwrap()
    }

    fn assert_partition(segments: &[Segment], total: f64, min: f64, max: f64) {
        assert!(!segments.is_empty());
        assert_eq!(segments[0].start_time, 0.0);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
        assert_eq!(segments.last().unwrap().end_time, total);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.sequence_index, i);
            assert!(segment.duration() > 0.0);
            if i + 1 < segments.len() {
                assert!(
                    segment.duration() >= min - TOLERANCE && segment.duration() <= max + TOLERANCE,
                    "segment {i} has duration {}",
                    segment.duration()
                );
            }
        }
    }

    fn beat_grid(step: f64, total: f64) -> Vec<f64> {
        (1..)
            .map(|i| i as f64 * step)
            .take_while(|t| *t <= total)
            .collect()
    }

    #[test]
    fn cuts_on_every_event_when_they_fit() {
        let segments = schedule(&[0.5, 1.0, 1.6, 2.0, 3.0], 3.0, RampDirection::None);
        let ends: Vec<f64> = segments.iter().map(|s| s.end_time).collect();
        assert_eq!(ends, vec![0.5, 1.0, 1.6, 2.0, 3.0]);
        assert_partition(&segments, 3.0, 0.25, 1.25);
        assert_eq!(segments.last().unwrap().cut, CutKind::Terminal);
    }

    #[test]
    fn empty_events_are_insufficient() {
        let err = Scheduler::new(PacingConfig::default())
            .unwrap()
            .schedule(&[], 5.0)
            .unwrap_err();
        assert!(matches!(err, BeatCutError::InsufficientEvents { .. }));
    }

    #[test]
    fn events_outside_window_are_insufficient() {
        let err = Scheduler::new(PacingConfig::default())
            .unwrap()
            .schedule(&[0.0, 6.0, 7.5], 5.0)
            .unwrap_err();
        assert!(matches!(err, BeatCutError::InsufficientEvents { provided: 3, .. }));
    }

    #[test]
    fn inverted_bounds_are_invalid_pacing() {
        let err = Scheduler::new(pacing(1.0, 0.5, RampDirection::None)).unwrap_err();
        assert!(matches!(err, BeatCutError::InvalidPacing(_)));
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        let scheduler = Scheduler::new(PacingConfig::default()).unwrap();
        for total in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                scheduler.schedule(&[0.5], total),
                Err(BeatCutError::InvalidDuration(_))
            ));
        }
    }

    #[test]
    fn unordered_events_are_rejected() {
        let scheduler = Scheduler::new(PacingConfig::default()).unwrap();
        assert!(matches!(
            scheduler.schedule(&[1.0, 0.5], 3.0),
            Err(BeatCutError::InvalidEvents(_))
        ));
    }

    #[test]
    fn out_of_bounds_events_become_cuts_on_the_bound() {
        // 0.1 is nearest the first target but too early, so the cut sits on
        // the minimum; 4.0 is far beyond the maximum.
        let segments = schedule(&[0.1, 0.6, 4.0], 4.0, RampDirection::None);
        assert_partition(&segments, 4.0, 0.25, 1.25);
        assert_eq!(segments[0].end_time, 0.25);
        assert_eq!(segments[0].cut, CutKind::Synthetic);
        assert_eq!(segments[1].end_time, 0.6);
        assert_eq!(segments[1].cut, CutKind::Event);
        assert_eq!(segments[2].cut, CutKind::Synthetic);
        assert!((segments[2].duration() - 1.25).abs() < TOLERANCE);
    }

    #[test]
    fn short_tail_is_absorbed_into_the_final_segment() {
        // Cutting on 2.9 would leave a 0.1 s sliver.
        let segments = schedule(&[1.0, 2.0, 2.9], 3.0, RampDirection::None);
        assert_partition(&segments, 3.0, 0.25, 1.25);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].start_time, 2.0);
        assert_eq!(segments[2].cut, CutKind::Terminal);
    }

    #[test]
    fn edit_shorter_than_minimum_is_one_segment() {
        let segments = schedule(&[0.1], 0.2, RampDirection::None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_time, 0.2);
    }

    #[test]
    fn slow_to_fast_durations_never_increase() {
        let events = beat_grid(0.125, 30.0);
        let segments = schedule(&events, 30.0, RampDirection::SlowToFast);
        assert_partition(&segments, 30.0, 0.25, 1.25);

        let body = &segments[..segments.len() - 1];
        for pair in body.windows(2) {
            assert!(pair[1].duration() <= pair[0].duration() + TOLERANCE);
        }
        assert!(body.first().unwrap().duration() > body.last().unwrap().duration());
    }

    #[test]
    fn fast_to_slow_durations_never_decrease() {
        let events = beat_grid(0.125, 30.0);
        let segments = schedule(&events, 30.0, RampDirection::FastToSlow);
        assert_partition(&segments, 30.0, 0.25, 1.25);

        let body = &segments[..segments.len() - 1];
        for pair in body.windows(2) {
            assert!(pair[1].duration() + TOLERANCE >= pair[0].duration());
        }
        assert!(body.first().unwrap().duration() < body.last().unwrap().duration());
    }

    #[test]
    fn ramp_snaps_onto_events_when_available() {
        let events = beat_grid(0.125, 20.0);
        let segments = schedule(&events, 20.0, RampDirection::SlowToFast);
        let summary = ScheduleSummary::from_segments(&segments);
        assert_eq!(summary.synthetic, 0);
        assert!(summary.snapped + 1 >= summary.segments);
    }

    #[test]
    fn ramp_on_sparse_events_still_respects_bounds() {
        let segments = schedule(&[3.3, 7.1, 12.0], 12.0, RampDirection::SlowToFast);
        assert_partition(&segments, 12.0, 0.25, 1.25);
    }

    #[test]
    fn early_short_snap_does_not_flatten_a_ramp() {
        let mut events = vec![0.3];
        events.extend(beat_grid(0.25, 30.0).into_iter().filter(|t| *t >= 1.5));
        let segments = schedule(&events, 30.0, RampDirection::SlowToFast);
        assert_partition(&segments, 30.0, 0.25, 1.25);

        // The first target is 1.25; 1.5 is nearest but too late.
        assert_eq!(segments[0].cut, CutKind::Synthetic);
        assert!((segments[0].duration() - 1.25).abs() < TOLERANCE);
        let longest = segments.iter().map(Segment::duration).fold(0.0, f64::max);
        assert!((longest - 1.25).abs() < TOLERANCE);
        assert!(segments.len() < 60, "ramp collapsed into {} cuts", segments.len());
    }

    #[test]
    fn ramp_on_irregular_events_follows_the_envelope() {
        let events = [
            0.05, 0.31, 0.4, 0.92, 1.13, 2.9, 3.01, 3.2, 5.5, 5.62, 5.75, 7.0, 9.99,
        ];
        let segments = schedule(&events, 10.0, RampDirection::SlowToFast);
        assert_partition(&segments, 10.0, 0.25, 1.25);
        assert!(segments[0].duration() >= 1.0 - TOLERANCE);

        let segments = schedule(&events, 10.0, RampDirection::FastToSlow);
        assert_partition(&segments, 10.0, 0.25, 1.25);
        assert!(segments[0].duration() <= 0.5 + TOLERANCE);
        let body = &segments[..segments.len() - 1];
        assert!((body.last().unwrap().duration() - 1.25).abs() < TOLERANCE);
    }

    #[test]
    fn sub_frame_minimum_is_rejected() {
        let err = Scheduler::new(pacing(1e-300, 2e-300, RampDirection::None)).unwrap_err();
        assert!(matches!(err, BeatCutError::InvalidPacing(_)));
    }

    #[test]
    fn irregular_events_respect_bounds() {
        let events = [
            0.05, 0.31, 0.4, 0.92, 1.13, 2.9, 3.01, 3.2, 5.5, 5.62, 5.75, 7.0, 9.99,
        ];
        for ramp in [
            RampDirection::None,
            RampDirection::SlowToFast,
            RampDirection::FastToSlow,
        ] {
            let segments = schedule(&events, 10.0, ramp);
            assert_partition(&segments, 10.0, 0.25, 1.25);
        }
    }

    #[test]
    fn ties_prefer_the_earlier_event() {
        assert_eq!(nearest_event(&[0.25, 0.75], 0.5), Some(0));
        assert_eq!(nearest_event(&[0.1, 2.0], 0.5), Some(0));
        assert_eq!(nearest_event(&[0.1, 0.8], 0.5), Some(1));
        assert_eq!(nearest_event(&[0.1, 0.2], 5.0), Some(1));
        assert_eq!(nearest_event(&[], 0.5), None);
    }

    #[test]
    fn schedules_are_deterministic() {
        let events = beat_grid(0.37, 15.0);
        let a = schedule(&events, 15.0, RampDirection::FastToSlow);
        let b = schedule(&events, 15.0, RampDirection::FastToSlow);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
