//! Gap-adjustment tier: keep the whole synthesized track in one piece and
//! position it inside the original speech window, stretching gently when the
//! speaking rate is too far off. When the track cannot be made to fit, each
//! original segment is re-synthesized independently and time-fit on its own,
//! which needs no word-level alignment at all.

use std::path::{Path, PathBuf};

use crate::transcript::speech_window;
use crate::ui::prelude::emit_debug;

use super::segments::{
    CROSSFADE_SECONDS, ClipAudio, ComposeResult, FitPolicy, PlannedClip, compose_timed_clips,
};
use super::verify::FINAL_TOLERANCE_MS;
use super::{AlignmentStrategy, StageError, StrategyContext, StrategyOutcome};

/// Speaking-rate band within which the raw track is placed without any
/// whole-track stretching.
const SPEED_RATIO_MIN: f64 = 0.7;
const SPEED_RATIO_MAX: f64 = 1.4;

pub struct GapAdjustment;

impl AlignmentStrategy for GapAdjustment {
    fn name(&self) -> &'static str {
        "gap_adjustment"
    }

    fn attempt(&self, ctx: &StrategyContext) -> Result<StrategyOutcome, StageError> {
        let Some((window_start, window_end)) = speech_window(ctx.segments) else {
            return Ok(StrategyOutcome::Unsuitable(
                "no transcript segments".to_string(),
            ));
        };
        let window = window_end - window_start;
        if window <= 0.0 {
            return Ok(StrategyOutcome::Unsuitable(
                "degenerate speech window".to_string(),
            ));
        }

        let speed_ratio = ctx.synth_duration / window;

        if (SPEED_RATIO_MIN..=SPEED_RATIO_MAX).contains(&speed_ratio) {
            if let Some(track) = place_whole_track(
                ctx,
                ctx.synth_audio,
                ctx.synth_duration,
                window_start,
                "gap-raw",
            )? {
                return Ok(StrategyOutcome::Completed(track));
            }
        } else {
            emit_debug(
                "pipeline.gaps.speed_ratio",
                &format!("speed ratio {speed_ratio:.2} outside [{SPEED_RATIO_MIN}, {SPEED_RATIO_MAX}]"),
            );
        }

        // Combine whole-track gentle stretching with gap placement.
        let stretch_target = window.min(ctx.video_duration - window_start);
        if stretch_target > 0.0 {
            let stretched = ctx.workspace.path("gap-stretched.wav");
            let achieved =
                ctx.engine
                    .time_stretch_gently(ctx.synth_audio, &stretched, stretch_target)?;
            if let Some(track) =
                place_whole_track(ctx, &stretched, achieved, window_start, "gap-stretched")?
            {
                return Ok(StrategyOutcome::Completed(track));
            }
        }

        resynthesize_per_segment(ctx)
    }
}

/// Lead silence up to the speech window, the track, then trailing silence to
/// the video's end. Returns None when the track overruns the video.
fn place_whole_track(
    ctx: &StrategyContext,
    track: &Path,
    track_duration: f64,
    window_start: f64,
    label: &str,
) -> Result<Option<PathBuf>, StageError> {
    let end = window_start + track_duration;
    if end > ctx.video_duration + FINAL_TOLERANCE_MS / 1000.0 {
        return Ok(None);
    }

    let mut parts: Vec<PathBuf> = Vec::new();
    if window_start > 0.0 {
        let lead = ctx.workspace.path(&format!("{label}-lead.wav"));
        ctx.engine.generate_silence(&lead, window_start)?;
        parts.push(lead);
    }
    parts.push(track.to_path_buf());
    let trailing = ctx.video_duration - end;
    if trailing > 0.0 {
        let tail = ctx.workspace.path(&format!("{label}-tail.wav"));
        ctx.engine.generate_silence(&tail, trailing)?;
        parts.push(tail);
    }

    let joined = ctx.workspace.path(&format!("{label}-joined.wav"));
    ctx.engine
        .concatenate_with_fades(&parts, CROSSFADE_SECONDS, &joined)?;
    Ok(Some(joined))
}

/// Escape hatch: one synthesis call per original segment. Each clip is then
/// trivially fit into its own window by the per-clip compositor rules.
fn resynthesize_per_segment(ctx: &StrategyContext) -> Result<StrategyOutcome, StageError> {
    let mut clips = Vec::new();
    for (i, segment) in ctx.segments.iter().enumerate() {
        if segment.text.trim().is_empty() {
            continue;
        }
        let raw = ctx.workspace.path(&format!("resynth-{i}.wav"));
        ctx.tts.synthesize(&segment.text, ctx.voice, &raw)?;
        let mono = ctx.workspace.path(&format!("resynth-{i}-mono.wav"));
        ctx.engine.convert_to_wav(&raw, &mono)?;
        clips.push(PlannedClip {
            audio: ClipAudio::File(mono),
            target_start: segment.start,
            target_end: segment.end,
        });
    }
    if clips.is_empty() {
        return Ok(StrategyOutcome::Unsuitable(
            "no segments with text to re-synthesize".to_string(),
        ));
    }

    match compose_timed_clips(
        ctx.engine,
        ctx.workspace,
        None,
        &clips,
        ctx.video_duration,
        FitPolicy::PerClip,
        "resynth",
    )? {
        ComposeResult::Composed(track) => Ok(StrategyOutcome::Completed(track)),
        ComposeResult::Aborted(reason) => Ok(StrategyOutcome::Unsuitable(reason)),
    }
}
