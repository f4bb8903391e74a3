//! Terminal tier: no timing data needed, no failure mode. The track is
//! gently stretched toward the video duration or padded with silence; the
//! drift verifier squares away whatever remains.

use crate::media::primitives::GENTLE_RATIO_MIN;

use super::{AlignmentStrategy, StageError, StrategyContext, StrategyOutcome};

pub struct SimplePadOrStretch;

impl AlignmentStrategy for SimplePadOrStretch {
    fn name(&self) -> &'static str {
        "simple_pad_or_stretch"
    }

    fn attempt(&self, ctx: &StrategyContext) -> Result<StrategyOutcome, StageError> {
        let ratio = ctx.synth_duration / ctx.video_duration;

        if ratio >= GENTLE_RATIO_MIN {
            // Too long, or close enough that a gentle stretch can fill the
            // video exactly. An over-long track may not reach the target
            // inside the gentle clamp; the verifier hard-trims the residue.
            let stretched = ctx.workspace.path("simple-stretched.wav");
            ctx.engine
                .time_stretch_gently(ctx.synth_audio, &stretched, ctx.video_duration)?;
            return Ok(StrategyOutcome::Completed(stretched));
        }

        // Far too short for stretching to sound natural: pad the tail.
        let silence = ctx.workspace.path("simple-pad-silence.wav");
        ctx.engine
            .generate_silence(&silence, ctx.video_duration - ctx.synth_duration)?;
        let padded = ctx.workspace.path("simple-padded.wav");
        ctx.engine
            .concatenate(&[ctx.synth_audio.to_path_buf(), silence], &padded)?;
        Ok(StrategyOutcome::Completed(padded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::engine::testing::FakeEngine;
    use crate::media::engine::AudioEngine;
    use crate::pipeline::testing::FakeTts;
    use crate::pipeline::workspace::JobWorkspace;
    use std::path::PathBuf;

    fn run(synth_duration: f64, video_duration: f64) -> (FakeEngine, f64) {
        let engine = FakeEngine::new();
        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path()).unwrap();
        let synth = PathBuf::from("/synth.wav");
        engine.add_file(&synth, synth_duration);
        let tts = FakeTts {
            engine: &engine,
            duration: synth_duration,
            words: Vec::new(),
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
            word_timings: &[],
        };
        let outcome = SimplePadOrStretch.attempt(&ctx).unwrap();
        let StrategyOutcome::Completed(track) = outcome else {
            panic!("the terminal tier must always complete");
        };
        let duration = engine.duration_seconds(&track).unwrap();
        (engine, duration)
    }

    #[test]
    fn near_ratio_tracks_are_stretched_to_the_video() {
        let (engine, duration) = run(9.0, 10.0);
        assert_eq!(engine.count_ops("time_stretch_gently"), 1);
        assert!((duration - 10.0).abs() < 1e-9);
    }

    #[test]
    fn overlong_tracks_stop_at_the_gentle_clamp() {
        let (engine, duration) = run(12.0, 10.0);
        assert_eq!(engine.count_ops("time_stretch_gently"), 1);
        assert_eq!(engine.count_ops("hard_trim"), 0);
        // 12/1.15 leaves ~10.43s; trimming to exactly 10.0 is the
        // verifier's job, not this tier's.
        assert!((duration - 12.0 / 1.15).abs() < 1e-9);
    }

    #[test]
    fn very_short_tracks_are_padded_with_silence() {
        let (engine, duration) = run(5.0, 10.0);
        assert_eq!(engine.count_ops("generate_silence"), 1);
        assert_eq!(engine.count_ops("concatenate"), 1);
        assert!((duration - 10.0).abs() < 1e-9);
    }
}
