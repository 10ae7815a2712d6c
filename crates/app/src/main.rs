use std::path::{Path, PathBuf};

use beatcut_core::{
    plan_edit, EditConfig, EventTrack, FfmpegPipeline, MediaTools, OnsetDetector,
    PlanExporter, RampDirection, RenderPipeline, RenderPlan,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> beatcut_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Edit(args) => run_edit(args, cli.config.as_deref()),
        Commands::Detect { audio, output } => run_detect(&audio, &output, cli.config.as_deref()),
        Commands::Plan {
            events,
            duration,
            overrides,
        } => run_plan(&events, duration, cli.config.as_deref(), &overrides),
    }
    .inspect_err(|err| tracing::error!("{err}"))
}

fn run_edit(args: EditArgs, config: Option<&Path>) -> beatcut_core::Result<()> {
    let config = load_config(config, &args.overrides)?;
    let tools = MediaTools::default();

    let video_duration = tools.probe_duration(&args.video)?;
    let audio_duration = tools.probe_duration(&args.audio)?;
    let total = video_duration.min(audio_duration);
    tracing::info!(video_duration, audio_duration, total, "edit length resolved");

    let track = match &args.events {
        Some(path) => EventTrack::load(path)?,
        None => detect_events(&tools, &args.audio, &config)?,
    };

    let segments = plan_edit(track.events(), total, &config)?;

    let written = if args.dry_run {
        PlanExporter::new(args.out.with_extension("plan.json")).render(&segments)?
    } else {
        FfmpegPipeline::new(&args.video, &args.audio, &args.out, &config).render(&segments)?
    };

    println!("{}", written.display());
    Ok(())
}

fn run_detect(audio: &Path, output: &Path, config: Option<&Path>) -> beatcut_core::Result<()> {
    let config = load_config(config, &Overrides::default())?;
    let track = detect_events(&MediaTools::default(), audio, &config)?;
    track.save(output)?;
    tracing::info!(?output, events = track.len(), "saved event track");
    println!("{}", output.display());
    Ok(())
}

fn run_plan(
    events: &Path,
    duration: Option<f64>,
    config: Option<&Path>,
    overrides: &Overrides,
) -> beatcut_core::Result<()> {
    let config = load_config(config, overrides)?;
    let track = EventTrack::load(events)?;
    let total = duration.unwrap_or(track.duration_seconds());

    let segments = plan_edit(track.events(), total, &config)?;
    println!("{}", serde_json::to_string_pretty(&RenderPlan::new(&segments))?);
    Ok(())
}

fn detect_events(
    tools: &MediaTools,
    audio: &Path,
    config: &EditConfig,
) -> beatcut_core::Result<EventTrack> {
    let samples = tools.decode_mono(audio, config.detector.sample_rate)?;
    let mut detector = OnsetDetector::new(config.detector.clone())?;
    let (track, summary) = detector.detect(&samples)?;
    tracing::info!(
        events = track.len(),
        tempo_bpm = ?summary.tempo_bpm,
        "detected musical events"
    );
    Ok(track)
}

fn load_config(path: Option<&Path>, overrides: &Overrides) -> beatcut_core::Result<EditConfig> {
    let mut config = match path {
        Some(path) => EditConfig::load(path)?,
        None => EditConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-synced video edits from a song and a clip", long_about = None)]
struct Cli {
    /// JSON config file; flags override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cut the video on the music and encode the result.
    Edit(EditArgs),
    /// Detect musical events in an audio file and save them as JSON.
    Detect {
        /// Music file to analyse.
        audio: PathBuf,
        /// Where to write the event track.
        output: PathBuf,
    },
    /// Print the decorated schedule for a saved event track.
    Plan {
        /// Event track written by `detect`.
        #[arg(long)]
        events: PathBuf,
        /// Edit length in seconds; defaults to the track duration.
        #[arg(long)]
        duration: Option<f64>,
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args, Debug)]
struct EditArgs {
    /// Input video file.
    #[arg(long)]
    video: PathBuf,
    /// Music file (mp3/wav/m4a).
    #[arg(long)]
    audio: PathBuf,
    /// Output video path.
    #[arg(long, default_value = "beatcut_output.mp4")]
    out: PathBuf,
    /// Use a saved event track instead of running detection.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Write the render plan as JSON next to `--out` instead of encoding.
    #[arg(long)]
    dry_run: bool,
    #[command(flatten)]
    overrides: Overrides,
}

/// Command line overrides layered on top of the config file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,
    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,
    /// Minimum segment length in seconds.
    #[arg(long)]
    minseg: Option<f64>,
    /// Maximum segment length in seconds.
    #[arg(long)]
    maxseg: Option<f64>,
    /// Velocity ramp: slow_to_fast, fast_to_slow or none.
    #[arg(long)]
    ramp: Option<RampDirection>,
    /// Flash on every Nth cut.
    #[arg(long)]
    flash_every: Option<u32>,
    /// Strongest punch-in scale.
    #[arg(long)]
    max_zoom: Option<f64>,
    /// Disable micro shake.
    #[arg(long)]
    no_shake: bool,
    /// Disable letterbox bars.
    #[arg(long)]
    no_letterbox: bool,
}

impl Overrides {
    fn apply(&self, config: &mut EditConfig) {
        let pacing = &mut config.pacing;
        if let Some(fps) = self.fps {
            pacing.target_fps = fps;
        }
        if let Some(width) = self.width {
            pacing.target_width = width;
        }
        if let Some(height) = self.height {
            pacing.target_height = height;
        }
        if let Some(min) = self.minseg {
            pacing.min_segment_duration = min;
        }
        if let Some(max) = self.maxseg {
            pacing.max_segment_duration = max;
        }
        if let Some(ramp) = self.ramp {
            pacing.ramp_direction = ramp;
        }

        let effects = &mut config.effects;
        if let Some(interval) = self.flash_every {
            effects.flash_interval = interval;
        }
        if let Some(zoom) = self.max_zoom {
            effects.max_zoom = zoom;
        }
        if self.no_shake {
            effects.enable_shake = false;
        }
        if self.no_letterbox {
            effects.enable_letterbox = false;
        }
    }
}
