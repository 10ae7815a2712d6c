use std::{
    ffi::OsString,
    path::PathBuf,
    process::{Command, Stdio},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::{BeatCutError, Result};

/// Encoder options for the final file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub bitrate: String,
    pub audio_codec: String,
    pub pixel_format: String,
    pub threads: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            bitrate: "8M".to_string(),
            audio_codec: "aac".to_string(),
            pixel_format: "yuv420p".to_string(),
            threads: 4,
        }
    }
}

impl EncodeSettings {
    /// Output-side ffmpeg arguments for these settings.
    pub fn output_args(&self, fps: u32) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-b:v".to_string(),
            self.bitrate.clone(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-r".to_string(),
            fps.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
        ];
        if self.threads > 0 {
            args.push("-threads".to_string());
            args.push(self.threads.to_string());
        }
        args
    }
}

/// Runs one ffmpeg encode to completion.
#[derive(Debug)]
pub struct Recorder {
    ffmpeg: PathBuf,
    args: Vec<OsString>,
}

impl Recorder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Blocks until ffmpeg exits. A non-zero exit becomes a render error
    /// carrying the tail of ffmpeg's stderr.
    pub fn run(&self) -> Result<()> {
        tracing::debug!(ffmpeg = ?self.ffmpeg, args = ?self.args, "running ffmpeg");
        let started = Instant::now();
        let output = Command::new(&self.ffmpeg)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                BeatCutError::render(format!("failed to start {}: {err}", self.ffmpeg.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BeatCutError::render(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&stderr, 20)
            )));
        }

        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "ffmpeg finished");
        Ok(())
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let collected: Vec<&str> = stderr.lines().collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join("\n")
}
