//! Thin wrappers around the `ffprobe` and `ffmpeg` binaries for reading
//! source media. Nothing here is decoded in-process.

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::{BeatCutError, Result};

/// Locations of the external tools. Defaults to whatever is on `PATH`.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(binary_name("ffmpeg")),
            ffprobe: PathBuf::from(binary_name("ffprobe")),
        }
    }
}

impl MediaTools {
    /// Container duration of `path` in seconds.
    pub fn probe_duration(&self, path: &Path) -> Result<f64> {
        ensure_exists(path)?;
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                BeatCutError::media(format!(
                    "failed to run {}: {err}",
                    self.ffprobe.display()
                ))
            })?;

        if !output.status.success() {
            return Err(BeatCutError::media(format!(
                "ffprobe could not read {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let duration = parse_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            BeatCutError::media(format!("no usable duration reported for {}", path.display()))
        })?;
        tracing::debug!(?path, duration, "probed media duration");
        Ok(duration)
    }

    /// Decodes the first audio stream of `path` to mono `f32` samples at
    /// `sample_rate`.
    pub fn decode_mono(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>> {
        ensure_exists(path)?;
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-vn", "-ac", "1", "-ar"])
            .arg(sample_rate.to_string())
            .args(["-f", "f32le", "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                BeatCutError::media(format!("failed to run {}: {err}", self.ffmpeg.display()))
            })?;

        if !output.status.success() {
            return Err(BeatCutError::media(format!(
                "ffmpeg could not decode {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let samples = samples_from_le_bytes(&output.stdout);
        if samples.is_empty() {
            return Err(BeatCutError::media(format!(
                "{} has no decodable audio",
                path.display()
            )));
        }
        tracing::info!(?path, samples = samples.len(), sample_rate, "decoded audio");
        Ok(samples)
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BeatCutError::media(format!(
            "media file not found: {}",
            path.display()
        )))
    }
}

fn binary_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

fn parse_duration(raw: &str) -> Option<f64> {
    raw.lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .find(|value| value.is_finite() && *value > 0.0)
}

/// Reinterprets raw little-endian `f32` PCM. A trailing partial sample is
/// dropped.
fn samples_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
