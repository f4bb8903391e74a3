//! Sequential gap/segment composition: place each speech span into its
//! original time window, fill the space between with silence, and keep a
//! running account of where the output timeline actually is.

use std::path::{Path, PathBuf};

use crate::align::align_words_with_coverage;
use crate::media::AudioEngine;
use crate::media::primitives::GENTLE_RATIO_MIN;
use crate::transcript::{TranscriptSegment, WordTiming, segment_word_spans};
use crate::ui::prelude::emit_debug;

use super::workspace::JobWorkspace;
use super::{AlignmentStrategy, StageError, StrategyContext, StrategyOutcome};

/// Per-boundary scheduling tolerance; the circuit breaker trips at 5x.
pub const TOLERANCE_MS: f64 = 40.0;
const MAX_GAP_CORRECTION_MS: f64 = 5.0 * TOLERANCE_MS;

/// A segment never gets squeezed below this window, no matter how far
/// behind the schedule already is.
const MIN_SEGMENT_WINDOW_SECONDS: f64 = 0.2;

/// Headroom left inside each window for the trailing gap-insertion step.
const WINDOW_HEADROOM: f64 = 0.95;

const STRETCH_TRIGGER_RATIO: f64 = 1.02;
const MAX_STRETCH_RATIO: f64 = 3.0;
const SLOW_DOWN_MIN_RATIO: f64 = 0.4;

pub(crate) const CROSSFADE_SECONDS: f64 = 0.010;

/// Fraction of segments that must map confidently before the per-segment
/// strategy is allowed to run.
const MIN_MAPPED_FRACTION: f64 = 0.8;

#[derive(Debug, Clone)]
pub enum ClipAudio {
    /// Sub-span of the whole-transcript synthesis track.
    Span { start: f64, end: f64 },
    /// Independently synthesized clip (per-segment fallback path).
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PlannedClip {
    pub audio: ClipAudio,
    pub target_start: f64,
    pub target_end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPolicy {
    /// Stretch or trim each clip into its window.
    PerClip,
    /// Splice clips untouched; duration correctness comes from verification.
    AsIs,
}

pub enum ComposeResult {
    Composed(PathBuf),
    Aborted(String),
}

pub fn compose_timed_clips(
    engine: &dyn AudioEngine,
    workspace: &JobWorkspace,
    source_track: Option<&Path>,
    clips: &[PlannedClip],
    video_duration: f64,
    fit: FitPolicy,
    label: &str,
) -> Result<ComposeResult, StageError> {
    if clips.is_empty() {
        return Ok(ComposeResult::Aborted("no clips to compose".to_string()));
    }

    let mut parts: Vec<PathBuf> = Vec::new();
    let mut cumulative_actual = 0.0f64;
    let mut max_correction_ms = 0.0f64;

    let leading = clips[0].target_start;
    if leading > 0.0 {
        let silence = workspace.path(&format!("{label}-lead.wav"));
        engine.generate_silence(&silence, leading)?;
        parts.push(silence);
        cumulative_actual += leading;
    }

    for (i, clip) in clips.iter().enumerate() {
        let raw = match &clip.audio {
            ClipAudio::Span { start, end } => {
                let source = source_track.expect("span clips require a source track");
                let path = workspace.path(&format!("{label}-clip{i}.wav"));
                engine.extract_segment(source, &path, *start, end - start)?;
                path
            }
            ClipAudio::File(path) => path.clone(),
        };
        let clip_duration = engine.duration_seconds(&raw)?;

        let booked = match fit {
            FitPolicy::AsIs => {
                parts.push(raw);
                clip_duration
            }
            FitPolicy::PerClip => {
                let time_available =
                    (clip.target_end - cumulative_actual).max(MIN_SEGMENT_WINDOW_SECONDS);
                let original_duration = clip.target_end - clip.target_start;
                let target = (WINDOW_HEADROOM * time_available).min(original_duration);
                let ratio = clip_duration / target;

                if ratio > STRETCH_TRIGGER_RATIO {
                    let mut current = raw;
                    let mut current_duration = clip_duration;
                    if ratio <= MAX_STRETCH_RATIO {
                        let stretched = workspace.path(&format!("{label}-clip{i}-stretch.wav"));
                        current_duration =
                            engine.time_stretch_gently(&current, &stretched, target)?;
                        current = stretched;
                    }
                    if current_duration > target + 1e-6 {
                        let trimmed = workspace.path(&format!("{label}-clip{i}-trim.wav"));
                        engine.hard_trim(&current, &trimmed, target)?;
                        parts.push(trimmed);
                        // Bookkeeping is forced to the target so downstream
                        // gap math never inherits trim granularity error.
                        target
                    } else {
                        parts.push(current);
                        current_duration
                    }
                } else if (SLOW_DOWN_MIN_RATIO..GENTLE_RATIO_MIN).contains(&ratio) {
                    let stretched = workspace.path(&format!("{label}-clip{i}-fill.wav"));
                    let achieved = engine.time_stretch_gently(&raw, &stretched, target)?;
                    parts.push(stretched);
                    achieved
                } else {
                    parts.push(raw);
                    clip_duration
                }
            }
        };
        cumulative_actual += booked;

        if let Some(next) = clips.get(i + 1) {
            let gap = next.target_start - cumulative_actual;
            if gap > 0.0 {
                let silence = workspace.path(&format!("{label}-gap{i}.wav"));
                engine.generate_silence(&silence, gap)?;
                parts.push(silence);
                cumulative_actual += gap;
            } else if gap < 0.0 {
                // Behind schedule: accept the overrun instead of compounding
                // it with negative silence. The dropped interval is the
                // gap-correction the circuit breaker watches.
                let correction_ms = -gap * 1000.0;
                emit_debug(
                    "pipeline.compose.overrun",
                    &format!(
                        "{label}: clip {i} ends {correction_ms:.0}ms past the next window start"
                    ),
                );
                max_correction_ms = max_correction_ms.max(correction_ms);
                if fit == FitPolicy::PerClip && max_correction_ms > MAX_GAP_CORRECTION_MS {
                    return Ok(ComposeResult::Aborted(format!(
                        "gap correction reached {max_correction_ms:.0}ms at clip {i}"
                    )));
                }
            }
        }
    }

    let trailing = video_duration - cumulative_actual;
    if trailing > 0.0 {
        let silence = workspace.path(&format!("{label}-tail.wav"));
        engine.generate_silence(&silence, trailing)?;
        parts.push(silence);
    }

    let joined = workspace.path(&format!("{label}-joined.wav"));
    engine.concatenate_with_fades(&parts, CROSSFADE_SECONDS, &joined)?;
    Ok(ComposeResult::Composed(joined))
}

/// Synthesized-audio spans per transcript segment, via the word alignment.
/// Returns the planned clips plus how many segments mapped confidently.
pub fn plan_segment_spans(
    segments: &[TranscriptSegment],
    timings: &[WordTiming],
) -> (Vec<PlannedClip>, usize) {
    let (words, spans) = segment_word_spans(segments);
    let alignment = align_words_with_coverage(&words, timings);
    if alignment.is_empty() {
        return (Vec::new(), 0);
    }

    let mut planned = Vec::new();
    let mut confident = 0usize;
    for (segment, (w0, w1)) in segments.iter().zip(spans) {
        if w1 >= alignment.len() {
            continue;
        }
        let a0 = alignment[w0].synth_idx;
        let a1 = alignment[w1].synth_idx;
        if a0 >= a1 {
            continue;
        }
        confident += 1;

        let tts_start = timings[a0].start;
        let tts_end = timings[a1].end;
        if tts_end <= tts_start {
            continue;
        }
        planned.push(PlannedClip {
            audio: ClipAudio::Span {
                start: tts_start,
                end: tts_end,
            },
            target_start: segment.start,
            target_end: segment.end,
        });
    }
    (planned, confident)
}

/// Primary strategy: splice each aligned synthesized span into the original
/// segment's window, locally stretching or trimming to fit.
pub struct PerSegmentAlignment;

impl AlignmentStrategy for PerSegmentAlignment {
    fn name(&self) -> &'static str {
        "per_segment_alignment"
    }

    fn attempt(&self, ctx: &StrategyContext) -> Result<StrategyOutcome, StageError> {
        if ctx.segments.is_empty() {
            return Ok(StrategyOutcome::Unsuitable(
                "no transcript segments".to_string(),
            ));
        }
        if ctx.word_timings.is_empty() {
            return Ok(StrategyOutcome::Unsuitable("no word timings".to_string()));
        }

        let (planned, confident) = plan_segment_spans(ctx.segments, ctx.word_timings);
        let required = (MIN_MAPPED_FRACTION * ctx.segments.len() as f64).ceil() as usize;
        if confident < required {
            return Ok(StrategyOutcome::Unsuitable(format!(
                "only {confident}/{} segments confidently mapped",
                ctx.segments.len()
            )));
        }

        match compose_timed_clips(
            ctx.engine,
            ctx.workspace,
            Some(ctx.synth_audio),
            &planned,
            ctx.video_duration,
            FitPolicy::PerClip,
            "seg",
        )? {
            ComposeResult::Composed(track) => Ok(StrategyOutcome::Completed(track)),
            ComposeResult::Aborted(reason) => Ok(StrategyOutcome::Unsuitable(reason)),
        }
    }
}
