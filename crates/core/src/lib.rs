//! Core library for beatcut.
//!
//! The crate turns a music track and a source video into a plan for a
//! beat-synchronised edit. Each module owns one stage of that flow:
//! detecting musical events, scheduling cut segments around them,
//! decorating segments with effects and handing the result to a render
//! pipeline.

pub mod analysis;
pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod media;
pub mod record;
pub mod render;
pub mod timeline;

pub use analysis::{AnalysisFrame, AnalysisSummary, OnsetDetector};
pub use config::{DetectorConfig, EditConfig, EffectConfig, PacingConfig, RampDirection};
pub use effects::{EffectAssigner, EffectSet, Grade, Shake, Vignette, ZoomCurve};
pub use error::{BeatCutError, Result};
pub use events::EventTrack;
pub use media::MediaTools;
pub use record::{EncodeSettings, Recorder};
pub use render::{FfmpegPipeline, PlanExporter, RenderPipeline, RenderPlan};
pub use timeline::{CutKind, ScheduleSummary, Scheduler, Segment};

/// Schedules and decorates an edit in one pass.
///
/// The whole configuration is validated before any scheduling starts, so a
/// bad effect setting is reported even when the events would also fail.
pub fn plan_edit(
    events: &[f64],
    total_output_duration: f64,
    config: &EditConfig,
) -> Result<Vec<Segment>> {
    let scheduler = Scheduler::new(config.pacing.clone())?;
    let assigner = EffectAssigner::new(config.effects.clone())?;

    let segments = scheduler.schedule(events, total_output_duration)?;
    assigner.assign(segments)
}
