mod filters;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub use filters::{build_filter_graph, effect_filters, segment_chain, FilterStyle};

use crate::{
    record::Recorder, BeatCutError, EditConfig, EncodeSettings, Result, ScheduleSummary, Segment,
};

/// Sink for a finished, decorated schedule.
///
/// Implementations may render segments in any internal order, but the
/// output must concatenate them by `sequence_index`.
pub trait RenderPipeline {
    fn render(&self, segments: &[Segment]) -> Result<PathBuf>;
}

/// Rejects segment lists that are empty, out of `sequence_index` order or
/// not contiguous.
pub fn ensure_ordered(segments: &[Segment]) -> Result<()> {
    if segments.is_empty() {
        return Err(BeatCutError::render("no segments to render"));
    }
    for (position, segment) in segments.iter().enumerate() {
        if segment.sequence_index != position {
            return Err(BeatCutError::render(format!(
                "segment at position {position} has sequence_index {}",
                segment.sequence_index
            )));
        }
    }
    if let Some(pair) = segments
        .windows(2)
        .find(|pair| pair[0].end_time != pair[1].start_time)
    {
        return Err(BeatCutError::render(format!(
            "gap between segment {} (ends {}) and segment {} (starts {})",
            pair[0].sequence_index, pair[0].end_time, pair[1].sequence_index, pair[1].start_time
        )));
    }
    Ok(())
}

/// Renders through a single ffmpeg invocation: video from `video`, music
/// from `audio`, encoded to `output`.
#[derive(Debug, Clone)]
pub struct FfmpegPipeline {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub ffmpeg: PathBuf,
    style: FilterStyle,
    encode: EncodeSettings,
}

impl FfmpegPipeline {
    pub fn new(
        video: impl Into<PathBuf>,
        audio: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config: &EditConfig,
    ) -> Self {
        Self {
            video: video.into(),
            audio: audio.into(),
            output: output.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            style: FilterStyle::new(&config.pacing, &config.effects),
            encode: config.encode.clone(),
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// The ffmpeg invocation for `segments`, reading its graph from
    /// `graph_script`.
    pub fn recorder(&self, graph_script: &Path) -> Recorder {
        Recorder::new(&self.ffmpeg)
            .args(["-y", "-nostdin", "-v", "error", "-i"])
            .arg(&self.video)
            .arg("-i")
            .arg(&self.audio)
            .arg("-filter_complex_script")
            .arg(graph_script)
            .args(["-map", "[vout]", "-map", "[aout]"])
            .args(self.encode.output_args(self.style.fps))
            .args(["-movflags", "+faststart"])
            .arg(&self.output)
    }
}

impl RenderPipeline for FfmpegPipeline {
    fn render(&self, segments: &[Segment]) -> Result<PathBuf> {
        ensure_ordered(segments)?;
        let graph = build_filter_graph(segments, &self.style);

        let mut script = tempfile::Builder::new()
            .prefix("beatcut-graph-")
            .suffix(".txt")
            .tempfile()?;
        script.write_all(graph.as_bytes())?;
        script.flush()?;

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(
            segments = segments.len(),
            graph_bytes = graph.len(),
            output = ?self.output,
            "rendering edit"
        );
        self.recorder(script.path()).run()?;
        Ok(self.output.clone())
    }
}

/// Serialised form of a decorated schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub total_duration: f64,
    pub summary: ScheduleSummary,
    pub segments: Vec<Segment>,
}

impl RenderPlan {
    pub fn new(segments: &[Segment]) -> Self {
        Self {
            total_duration: segments.last().map(|s| s.end_time).unwrap_or(0.0),
            summary: ScheduleSummary::from_segments(segments),
            segments: segments.to_vec(),
        }
    }
}

/// Dry-run sink that writes the plan as JSON instead of encoding.
#[derive(Debug, Clone)]
pub struct PlanExporter {
    path: PathBuf,
}

impl PlanExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RenderPipeline for PlanExporter {
    fn render(&self, segments: &[Segment]) -> Result<PathBuf> {
        ensure_ordered(segments)?;
        let plan = RenderPlan::new(segments);
        fs::write(&self.path, serde_json::to_string_pretty(&plan)?)?;
        tracing::info!(path = ?self.path, segments = segments.len(), "wrote render plan");
        Ok(self.path.clone())
    }
}
