use std::fmt::Write as _;

use crate::{EffectConfig, EffectSet, Grade, PacingConfig, Segment, Shake, Vignette, ZoomCurve};

/// Frame-level settings shared by every segment chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStyle {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub flash_duration: f64,
    pub flash_opacity: f64,
    pub letterbox_ratio: f64,
}

impl FilterStyle {
    pub fn new(pacing: &PacingConfig, effects: &EffectConfig) -> Self {
        Self {
            width: pacing.target_width,
            height: pacing.target_height,
            fps: pacing.target_fps,
            flash_duration: effects.flash_duration,
            flash_opacity: effects.flash_opacity,
            letterbox_ratio: effects.letterbox_ratio,
        }
    }

    fn letterbox_bar(&self) -> u32 {
        (self.letterbox_ratio * self.height as f64).round() as u32
    }
}

/// Full `filter_complex` graph: input 0 is decoded once and split into one
/// branch per segment, the chains are concatenated in order into `[vout]`,
/// and input 1 is trimmed into `[aout]`.
pub fn build_filter_graph(segments: &[Segment], style: &FilterStyle) -> String {
    let mut graph = format!("[0:v]split={}", segments.len());
    for segment in segments {
        let _ = write!(graph, "[s{}]", segment.sequence_index);
    }
    graph.push_str(";\n");

    for segment in segments {
        let _ = writeln!(graph, "{};", segment_chain(segment, style));
    }

    for segment in segments {
        let _ = write!(graph, "[v{}]", segment.sequence_index);
    }
    let _ = writeln!(graph, "concat=n={}:v=1:a=0[vout];", segments.len());

    let end = segments.last().map(|s| s.end_time).unwrap_or(0.0);
    let _ = write!(
        graph,
        "[1:a]atrim=start=0:end={},asetpts=PTS-STARTPTS[aout]",
        num(end)
    );
    graph
}

/// Filter chain for a single segment, reading the split branch `[s<index>]`
/// and labelled `[v<index>]`.
pub fn segment_chain(segment: &Segment, style: &FilterStyle) -> String {
    let mut filters = vec![
        format!(
            "trim=start={}:end={}",
            num(segment.start_time),
            num(segment.end_time)
        ),
        "setpts=PTS-STARTPTS".to_string(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
            w = style.width,
            h = style.height
        ),
        format!("fps={}", style.fps),
    ];
    filters.extend(effect_filters(&segment.effects, segment.duration(), style));

    format!(
        "[s{index}]{}[v{index}]",
        filters.join(","),
        index = segment.sequence_index
    )
}

/// Filters for one effect set, in application order.
pub fn effect_filters(effects: &EffectSet, duration: f64, style: &FilterStyle) -> Vec<String> {
    let mut filters = Vec::new();
    filters.extend(zoom_filter(&effects.zoom, duration, style));
    filters.extend(effects.shake.as_ref().and_then(|shake| shake_filter(shake, style)));
    filters.extend(grade_filters(&effects.grade));
    filters.extend(effects.vignette.as_ref().and_then(vignette_filter));
    if effects.flash {
        filters.push(format!(
            "drawbox=x=0:y=0:w=iw:h=ih:color=white@{}:t=fill:enable='lt(t,{})'",
            num(style.flash_opacity),
            num(style.flash_duration)
        ));
    }
    if effects.letterbox {
        let bar = style.letterbox_bar();
        if bar > 0 {
            filters.push(format!(
                "drawbox=x=0:y=0:w=iw:h={bar}:color=black:t=fill,\
                 drawbox=x=0:y=ih-{bar}:w=iw:h={bar}:color=black:t=fill"
            ));
        }
    }
    filters
}

fn zoom_filter(zoom: &ZoomCurve, duration: f64, style: &FilterStyle) -> Option<String> {
    if (zoom.end_scale - zoom.start_scale).abs() < 1e-6 && (zoom.start_scale - 1.0).abs() < 1e-6 {
        return None;
    }
    Some(format!(
        "zoompan=z='{start}+({end}-{start})*min(it/{duration},1)':\
         x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={w}x{h}:fps={fps}",
        start = num(zoom.start_scale),
        end = num(zoom.end_scale),
        duration = num(duration.max(1e-3)),
        w = style.width,
        h = style.height,
        fps = style.fps,
    ))
}

/// Stepped jitter: the offset changes `frequency` times per second and is a
/// fixed function of time, so renders are repeatable.
fn shake_filter(shake: &Shake, style: &FilterStyle) -> Option<String> {
    let amplitude = shake.amplitude.round() as u32;
    if amplitude == 0 {
        return None;
    }
    let frequency = num(shake.frequency);
    Some(format!(
        "crop=w=iw-{span}:h=ih-{span}:\
         x='{a}+{a}*sin(floor(t*{frequency})*12.9898)':\
         y='{a}+{a}*sin(floor(t*{frequency})*78.233)',\
         scale={w}:{h}",
        span = amplitude * 2,
        a = amplitude,
        w = style.width,
        h = style.height,
    ))
}

fn grade_filters(grade: &Grade) -> Vec<String> {
    if grade.is_neutral() {
        return Vec::new();
    }
    let mut filters = vec![format!(
        "eq=contrast={}:saturation={}:brightness={}",
        num(grade.contrast),
        num(grade.saturation),
        num(grade.brightness)
    )];
    if grade.warmth.abs() > 1e-6 {
        filters.push(format!(
            "colorbalance=rm={}:bm={}",
            num(grade.warmth),
            num(-grade.warmth)
        ));
    }
    filters
}

/// Linear radial mask: full brightness inside `falloff`, darkening by up to
/// `strength` towards the edge of the unit frame.
fn vignette_filter(vignette: &Vignette) -> Option<String> {
    if vignette.strength <= 0.0 {
        return None;
    }
    let mask = format!(
        "(1-clip((hypot(2*X/W-1,2*Y/H-1)-{falloff})/{span},0,1)*{strength})",
        falloff = num(vignette.falloff),
        span = num(1.0 - vignette.falloff),
        strength = num(vignette.strength),
    );
    Some(format!(
        "format=gbrp,geq=r='r(X,Y)*{mask}':g='g(X,Y)*{mask}':b='b(X,Y)*{mask}'"
    ))
}

/// Compact decimal rendering: at most six fractional digits, no trailing
/// zeros.
fn num(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
