//! Synthetic segmentation: when the original video has no transcript
//! segments, sentence-ending punctuation in the word timings stands in for
//! utterance boundaries, scaled proportionally onto the video timeline.

use crate::transcript::WordTiming;

use super::segments::{ClipAudio, ComposeResult, FitPolicy, PlannedClip, compose_timed_clips};
use super::verify::{FINAL_TOLERANCE_MS, verify_duration};
use super::{AlignmentStrategy, StageError, StrategyContext, StrategyOutcome};

#[derive(Debug, Clone)]
pub struct SyntheticSegment {
    pub text: String,
    /// Target position on the video timeline (proportional scaling).
    pub start: f64,
    pub end: f64,
    /// Span on the synthesized-audio timeline. Spans are contiguous so the
    /// full track is preserved across the split.
    pub tts_start: f64,
    pub tts_end: f64,
    pub word_indices: (usize, usize),
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end()
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '…'))
}

pub fn split_synthetic_segments(
    timings: &[WordTiming],
    video_duration: f64,
    synth_duration: f64,
) -> Vec<SyntheticSegment> {
    if timings.is_empty() || synth_duration <= 0.0 {
        return Vec::new();
    }

    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut group_start = 0usize;
    for (i, timing) in timings.iter().enumerate() {
        if ends_sentence(&timing.word) {
            groups.push((group_start, i));
            group_start = i + 1;
        }
    }
    if group_start < timings.len() {
        groups.push((group_start, timings.len() - 1));
    }

    let scale = video_duration / synth_duration;
    let mut segments = Vec::with_capacity(groups.len());
    let mut cursor = 0.0f64;
    for (gi, &(first, last)) in groups.iter().enumerate() {
        let tts_start = cursor;
        let tts_end = if gi + 1 == groups.len() {
            synth_duration
        } else {
            timings[last].end
        };
        cursor = tts_end;

        segments.push(SyntheticSegment {
            text: timings[first..=last]
                .iter()
                .map(|t| t.word.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            start: tts_start * scale,
            end: tts_end * scale,
            tts_start,
            tts_end,
            word_indices: (first, last),
        });
    }
    segments
}

/// Third tier: distribute the spare time evenly across N+1 gap slots around
/// sentence-derived spans. Rejects itself if the verified result still
/// misses the final tolerance.
pub struct SyntheticSegmentDistribution;

impl AlignmentStrategy for SyntheticSegmentDistribution {
    fn name(&self) -> &'static str {
        "synthetic_segment_distribution"
    }

    fn attempt(&self, ctx: &StrategyContext) -> Result<StrategyOutcome, StageError> {
        if ctx.word_timings.is_empty() {
            return Ok(StrategyOutcome::Unsuitable("no word timings".to_string()));
        }

        if ctx.synth_duration > ctx.video_duration {
            // Nothing to distribute: fit the whole track instead.
            let stretched = ctx.workspace.path("syn-fit.wav");
            ctx.engine
                .time_stretch_gently(ctx.synth_audio, &stretched, ctx.video_duration)?;
            let (track, drift_ms) = verify_duration(
                ctx.engine,
                ctx.workspace,
                stretched,
                ctx.video_duration,
                "syn",
            )?;
            if drift_ms.abs() > FINAL_TOLERANCE_MS {
                return Ok(StrategyOutcome::Unsuitable(format!(
                    "whole-track fit left {drift_ms:.0}ms drift"
                )));
            }
            return Ok(StrategyOutcome::Completed(track));
        }

        let sentences =
            split_synthetic_segments(ctx.word_timings, ctx.video_duration, ctx.synth_duration);
        if sentences.is_empty() {
            return Ok(StrategyOutcome::Unsuitable(
                "no sentence boundaries".to_string(),
            ));
        }

        let gap = (ctx.video_duration - ctx.synth_duration) / (sentences.len() + 1) as f64;
        let mut clips = Vec::with_capacity(sentences.len());
        let mut cursor = gap;
        for sentence in &sentences {
            let span = sentence.tts_end - sentence.tts_start;
            clips.push(PlannedClip {
                audio: ClipAudio::Span {
                    start: sentence.tts_start,
                    end: sentence.tts_end,
                },
                target_start: cursor,
                target_end: cursor + span,
            });
            cursor += span + gap;
        }

        let composed = compose_timed_clips(
            ctx.engine,
            ctx.workspace,
            Some(ctx.synth_audio),
            &clips,
            ctx.video_duration,
            FitPolicy::AsIs,
            "syn",
        )?;
        let track = match composed {
            ComposeResult::Composed(track) => track,
            ComposeResult::Aborted(reason) => return Ok(StrategyOutcome::Unsuitable(reason)),
        };

        let (track, drift_ms) =
            verify_duration(ctx.engine, ctx.workspace, track, ctx.video_duration, "syn")?;
        if drift_ms.abs() > FINAL_TOLERANCE_MS {
            return Ok(StrategyOutcome::Unsuitable(format!(
                "gap distribution left {drift_ms:.0}ms drift"
            )));
        }
        Ok(StrategyOutcome::Completed(track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(word: &str, start: f64, end: f64) -> WordTiming {
        WordTiming {
            word: word.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn splits_at_sentence_ending_punctuation() {
        let timings = vec![
            timing("Hello", 0.0, 0.4),
            timing("there.", 0.5, 0.9),
            timing("How", 1.1, 1.4),
            timing("are", 1.5, 1.7),
            timing("you?", 1.8, 2.2),
            timing("Bye", 2.5, 2.9),
        ];
        let segments = split_synthetic_segments(&timings, 6.0, 3.0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text, "Hello there.");
        assert_eq!(segments[0].word_indices, (0, 1));
        assert_eq!(segments[2].text, "Bye");

        // Spans are contiguous and cover the whole synthesized track.
        assert_eq!(segments[0].tts_start, 0.0);
        assert!((segments[0].tts_end - 0.9).abs() < 1e-9);
        assert!((segments[1].tts_start - 0.9).abs() < 1e-9);
        assert!((segments[2].tts_end - 3.0).abs() < 1e-9);

        // Video-timeline targets are proportionally scaled (factor 2.0).
        assert!((segments[1].start - 1.8).abs() < 1e-9);
        assert!((segments[1].end - 4.4).abs() < 1e-9);
    }

    #[test]
    fn text_without_punctuation_becomes_one_segment() {
        let timings = vec![timing("just", 0.0, 0.3), timing("words", 0.4, 0.8)];
        let segments = split_synthetic_segments(&timings, 4.0, 1.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].word_indices, (0, 1));
        assert!((segments[0].tts_end - 1.0).abs() < 1e-9);
    }

    mod strategy {
        use super::*;
        use crate::media::engine::testing::FakeEngine;
        use crate::media::engine::AudioEngine;
        use crate::pipeline::testing::FakeTts;
        use crate::pipeline::workspace::JobWorkspace;
        use crate::pipeline::{StrategyContext, StrategyOutcome};
        use std::path::PathBuf;

        fn attempt(
            synth_duration: f64,
            video_duration: f64,
            words: Vec<WordTiming>,
        ) -> (FakeEngine, StrategyOutcome) {
            let engine = FakeEngine::new();
            let root = tempfile::tempdir().unwrap();
            let workspace = JobWorkspace::create(root.path()).unwrap();
            let synth = PathBuf::from("/synth.wav");
            engine.add_file(&synth, synth_duration);
            let tts = FakeTts {
                engine: &engine,
                duration: synth_duration,
                words: words.clone(),
                per_segment_duration: 1.0,
            };
            let ctx = StrategyContext {
                engine: &engine,
                tts: &tts,
                workspace: &workspace,
                video_duration,
                voice: "clone",
                segments: &[],
                synth_audio: &synth,
                synth_duration,
                word_timings: &words,
            };
            let outcome = SyntheticSegmentDistribution.attempt(&ctx).unwrap();
            (engine, outcome)
        }

        #[test]
        fn spare_time_spreads_evenly_across_gap_slots() {
            let words = vec![
                timing("Hello", 0.0, 0.5),
                timing("there.", 0.6, 2.9),
                timing("How", 3.1, 3.4),
                timing("are", 3.5, 4.2),
                timing("you?", 4.3, 6.0),
            ];
            let (engine, outcome) = attempt(6.0, 10.0, words);
            let StrategyOutcome::Completed(track) = outcome else {
                panic!("expected completion");
            };
            assert!((engine.duration_seconds(&track).unwrap() - 10.0).abs() < 1e-6);
            // Two sentences: leading, middle and trailing gaps of 4/3 s.
            assert_eq!(engine.count_ops("generate_silence 1.333"), 3);
            assert_eq!(engine.count_ops("extract_segment"), 2);
        }

        #[test]
        fn longer_than_video_fits_the_whole_track_instead() {
            let words = vec![timing("One.", 0.0, 5.0), timing("Two.", 5.5, 11.0)];
            let (engine, outcome) = attempt(11.0, 10.0, words);
            let StrategyOutcome::Completed(track) = outcome else {
                panic!("expected completion");
            };
            assert_eq!(engine.count_ops("time_stretch_gently"), 1);
            assert_eq!(engine.count_ops("extract_segment"), 0);
            assert!((engine.duration_seconds(&track).unwrap() - 10.0).abs() < 1e-6);
        }

        #[test]
        fn no_word_timings_is_unsuitable() {
            let (_engine, outcome) = attempt(6.0, 10.0, Vec::new());
            assert!(matches!(outcome, StrategyOutcome::Unsuitable(_)));
        }
    }
}
