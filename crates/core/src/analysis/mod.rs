use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{BeatCutError, DetectorConfig, EventTrack, Result};

/// Half-width, in frames, of the neighbourhood a flux peak must dominate.
const PEAK_RADIUS: usize = 3;
/// Half-width, in frames, of the moving average used as the adaptive threshold.
const MEAN_RADIUS: usize = 10;
/// Frames below this fraction of the loudest flux never become events.
const RELATIVE_FLOOR: f32 = 0.1;

/// Summary of one analysed track.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AnalysisSummary {
    pub sample_rate: u32,
    pub tempo_bpm: Option<f32>,
    pub duration_seconds: f64,
    pub frames: usize,
    pub events: usize,
}

/// Features for one analysis hop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Centre of the analysis window, in seconds.
    pub time: f32,
    pub rms: f32,
    /// Half-wave rectified increase in spectral magnitude since the last hop.
    pub flux: f32,
}

/// Offline onset detector over mono samples.
///
/// Peaks of the spectral flux curve that rise above a local moving average
/// become onsets. Frames whose flux reaches the configured percentile are
/// added as strong hits, and the union is thinned to the minimum event gap.
pub struct OnsetDetector {
    config: DetectorConfig,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl OnsetDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs detection over a whole track sampled at `config.sample_rate`.
    pub fn detect(&mut self, samples: &[f32]) -> Result<(EventTrack, AnalysisSummary)> {
        if samples.len() < 2 {
            return Err(BeatCutError::media(
                "onset detection requires at least two samples",
            ));
        }

        let duration_seconds = samples.len() as f64 / self.config.sample_rate as f64;
        let frames = self.analyse(samples)?;
        let flux: Vec<f32> = frames.iter().map(|frame| frame.flux).collect();

        let peaks = pick_peaks(&flux, self.config.peak_threshold);
        let strong = strong_frames(&flux, self.config.strong_percentile);

        let peak_times: Vec<f64> = peaks.iter().map(|&i| frames[i].time as f64).collect();
        let tempo_bpm = estimate_tempo(&thin(&peak_times, self.config.min_gap_seconds));
        let times: Vec<f64> = peaks
            .iter()
            .chain(strong.iter())
            .map(|&i| frames[i].time as f64)
            .collect();

        let track =
            EventTrack::from_unsorted(times, duration_seconds, self.config.min_gap_seconds)?;
        let summary = AnalysisSummary {
            sample_rate: self.config.sample_rate,
            tempo_bpm,
            duration_seconds,
            frames: frames.len(),
            events: track.len(),
        };

        tracing::info!(
            events = summary.events,
            peaks = peaks.len(),
            strong = strong.len(),
            tempo_bpm = ?summary.tempo_bpm,
            duration_seconds,
            "onset detection complete"
        );
        Ok((track, summary))
    }

    /// Computes per-hop features. Windows are centred on `hop * k`, with the
    /// signal zero padded on both ends.
    pub fn analyse(&mut self, samples: &[f32]) -> Result<Vec<AnalysisFrame>> {
        let frame_size = self.config.frame_size;
        let hop = self.config.hop_size;
        let sample_rate = self.config.sample_rate as f32;
        let half = frame_size / 2;

        let fft = self.prepare_fft(frame_size);
        let mut previous = vec![0.0f32; fft.spectrum.len()];
        let mut frames = Vec::with_capacity(samples.len() / hop + 1);

        let mut centre = 0usize;
        while centre < samples.len() {
            for (j, slot) in fft.input.iter_mut().enumerate() {
                let value = (centre + j)
                    .checked_sub(half)
                    .and_then(|index| samples.get(index))
                    .copied()
                    .unwrap_or(0.0);
                *slot = value * hann_value(j, frame_size);
            }
            let rms = compute_rms(&fft.input);

            fft.plan
                .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
                .map_err(|err| BeatCutError::msg(format!("fft failed: {err}")))?;

            let mut flux = 0.0f32;
            for (bin, last) in fft.spectrum.iter().zip(previous.iter_mut()) {
                let magnitude = bin.norm();
                flux += (magnitude - *last).max(0.0);
                *last = magnitude;
            }

            frames.push(AnalysisFrame {
                time: centre as f32 / sample_rate,
                rms,
                flux,
            });
            centre += hop;
        }

        Ok(frames)
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(false, |fft| fft.size != size) {
            self.fft = None;
        }

        self.fft.get_or_insert_with(|| {
            let plan = self.fft_planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for OnsetDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnsetDetector")
            .field("config", &self.config)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

/// Frames that are the maximum of their neighbourhood and exceed the local
/// mean by `threshold`.
fn pick_peaks(flux: &[f32], threshold: f32) -> Vec<usize> {
    let floor = loudest(flux) * RELATIVE_FLOOR;
    if floor <= 0.0 {
        return Vec::new();
    }

    (0..flux.len())
        .filter(|&i| {
            let value = flux[i];
            if value < floor {
                return false;
            }
            let lo = i.saturating_sub(PEAK_RADIUS);
            let hi = (i + PEAK_RADIUS + 1).min(flux.len());
            let is_max = flux[lo..hi].iter().all(|&other| other <= value);

            let lo = i.saturating_sub(MEAN_RADIUS);
            let hi = (i + MEAN_RADIUS + 1).min(flux.len());
            let mean = flux[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;

            is_max && value > mean * threshold
        })
        .collect()
}

/// Frames whose flux reaches the given percentile of the whole curve.
fn strong_frames(flux: &[f32], percentile_rank: f64) -> Vec<usize> {
    let floor = loudest(flux) * RELATIVE_FLOOR;
    if floor <= 0.0 {
        return Vec::new();
    }
    let cutoff = percentile(flux, percentile_rank).max(floor);
    (0..flux.len()).filter(|&i| flux[i] >= cutoff).collect()
}

fn loudest(values: &[f32]) -> f32 {
    values.iter().copied().fold(0.0, f32::max)
}

/// Linear-interpolated percentile, `rank` in `[0, 100]`.
fn percentile(values: &[f32], rank: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let position = (rank / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = (position - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Drops times closer than `min_gap` to the previously kept one.
fn thin(times: &[f64], min_gap: f64) -> Vec<f64> {
    let mut kept: Vec<f64> = Vec::with_capacity(times.len());
    for &time in times {
        if kept.last().map_or(true, |last| time - last >= min_gap) {
            kept.push(time);
        }
    }
    kept
}

fn estimate_tempo(onsets: &[f64]) -> Option<f32> {
    let intervals: Vec<f64> = onsets
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|interval| *interval > f64::EPSILON)
        .collect();
    if intervals.is_empty() {
        return None;
    }
    let average = intervals.iter().sum::<f64>() / intervals.len() as f64;
    Some((60.0 / average) as f32)
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
