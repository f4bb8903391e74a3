//! Strategy orchestration for the voice-replacement pipeline.
//!
//! Tiers run in a fixed order and the first success wins. A tier signals
//! "could not meet tolerance" by returning [`StrategyOutcome::Unsuitable`],
//! which is not an error; hard errors abort the tier, and only fatal error
//! classes (probe, configuration) abort the whole job.

pub mod gaps;
pub mod mix;
pub mod segments;
pub mod simple;
pub mod synthetic;
pub mod verify;
pub mod workspace;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::media::{AudioEngine, MediaError};
use crate::providers::{ProviderError, TtsProvider};
use crate::transcript::{TranscriptSegment, Transcription, WordTiming};
use crate::ui::prelude::{Level, emit, emit_debug};

use gaps::GapAdjustment;
use segments::PerSegmentAlignment;
use simple::SimplePadOrStretch;
use synthetic::SyntheticSegmentDistribution;
use verify::verify_duration;
use workspace::JobWorkspace;

const PERCENT_STARTING: u8 = 0;
const PERCENT_TTS: u8 = 30;
const PERCENT_ALIGNING: u8 = 55;
const PERCENT_DONE: u8 = 100;

/// Discrete progress milestones reported to the job-state collaborator.
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Starting,
    Transcribing,
    TranscriptReady { segment_count: usize },
    TtsSynthesis,
    PipelineSpawn { strategy: &'static str },
    Completed { output: PathBuf },
    Failed { message: String },
}

impl PipelineStage {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineStage::Starting => "starting",
            PipelineStage::Transcribing => "transcribing",
            PipelineStage::TranscriptReady { .. } => "transcript_ready",
            PipelineStage::TtsSynthesis => "tts_synthesis",
            PipelineStage::PipelineSpawn { .. } => "pipeline_spawn",
            PipelineStage::Completed { .. } => "completed",
            PipelineStage::Failed { .. } => "failed",
        }
    }

    fn describe(&self) -> String {
        match self {
            PipelineStage::Starting => "Starting pipeline".to_string(),
            PipelineStage::Transcribing => "Transcribing original audio".to_string(),
            PipelineStage::TranscriptReady { segment_count } => {
                format!("Transcript ready ({segment_count} segments)")
            }
            PipelineStage::TtsSynthesis => "Synthesizing replacement voice".to_string(),
            PipelineStage::PipelineSpawn { strategy } => {
                format!("Aligning audio ({strategy})")
            }
            PipelineStage::Completed { output } => {
                format!("Completed: {}", output.display())
            }
            PipelineStage::Failed { message } => format!("Failed: {message}"),
        }
    }
}

/// Where progress milestones go. The CLI renders them; a service would
/// persist them.
pub trait ProgressSink {
    fn report(&self, percentage: u8, stage: &PipelineStage);
}

pub struct EmitProgressSink;

impl ProgressSink for EmitProgressSink {
    fn report(&self, percentage: u8, stage: &PipelineStage) {
        let level = match stage {
            PipelineStage::Failed { .. } => Level::Error,
            PipelineStage::Completed { .. } => Level::Success,
            _ => Level::Info,
        };
        emit(
            level,
            "pipeline.progress",
            &format!("[{percentage:3}%] {}", stage.describe()),
            Some(serde_json::json!({
                "percentage": percentage,
                "stage": stage.code(),
            })),
        );
    }
}

/// Error from inside one strategy tier.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl StageError {
    /// Fatal errors abort the job instead of falling through to the next
    /// tier: nothing downstream can recover from an unreadable input or a
    /// missing collaborator.
    pub fn is_fatal(&self) -> bool {
        match self {
            StageError::Media(err) => !err.is_encoding(),
            StageError::Provider(err) => matches!(
                err,
                ProviderError::Configuration(_) | ProviderError::Io { .. }
            ),
        }
    }
}

pub enum StrategyOutcome {
    Completed(PathBuf),
    Unsuitable(String),
}

pub struct StrategyContext<'a> {
    pub engine: &'a dyn AudioEngine,
    pub tts: &'a dyn TtsProvider,
    pub workspace: &'a JobWorkspace,
    pub video_duration: f64,
    pub voice: &'a str,
    pub segments: &'a [TranscriptSegment],
    pub synth_audio: &'a Path,
    pub synth_duration: f64,
    pub word_timings: &'a [WordTiming],
}

pub trait AlignmentStrategy {
    fn name(&self) -> &'static str;
    fn attempt(&self, ctx: &StrategyContext) -> Result<StrategyOutcome, StageError>;
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub voice: String,
    pub output: PathBuf,
    pub keep_background: bool,
    pub duck_level_db: f64,
    pub timeout: Duration,
}

pub struct VoicePipeline<'a> {
    engine: &'a dyn AudioEngine,
    tts: &'a dyn TtsProvider,
    sink: &'a dyn ProgressSink,
    options: PipelineOptions,
}

impl<'a> VoicePipeline<'a> {
    pub fn new(
        engine: &'a dyn AudioEngine,
        tts: &'a dyn TtsProvider,
        sink: &'a dyn ProgressSink,
        options: PipelineOptions,
    ) -> Self {
        Self {
            engine,
            tts,
            sink,
            options,
        }
    }

    pub fn run(
        &self,
        video: &Path,
        transcription: &Transcription,
        scratch_root: &Path,
    ) -> Result<PathBuf> {
        let result = self.run_inner(video, transcription, scratch_root);
        match &result {
            Ok(output) => self.sink.report(
                PERCENT_DONE,
                &PipelineStage::Completed {
                    output: output.clone(),
                },
            ),
            Err(err) => self.sink.report(
                PERCENT_DONE,
                &PipelineStage::Failed {
                    message: format!("{err:#}"),
                },
            ),
        }
        result
    }

    fn run_inner(
        &self,
        video: &Path,
        transcription: &Transcription,
        scratch_root: &Path,
    ) -> Result<PathBuf> {
        let started = Instant::now();
        self.sink.report(PERCENT_STARTING, &PipelineStage::Starting);

        let video_duration = self
            .engine
            .duration_seconds(video)
            .context("Failed to probe video duration")?;

        let workspace = JobWorkspace::create(scratch_root)?;
        emit_debug(
            "pipeline.workspace",
            &format!("job {} at {}", workspace.job_id(), workspace.dir().display()),
        );

        self.check_deadline(started)?;
        self.sink.report(PERCENT_TTS, &PipelineStage::TtsSynthesis);
        let synthesis = self
            .tts
            .synthesize_with_timestamps(
                &transcription.full_text,
                &self.options.voice,
                workspace.dir(),
            )
            .context("Voice synthesis failed")?;

        let synth_audio = workspace.path("synth-mono.wav");
        self.engine
            .convert_to_wav(&synthesis.audio_path, &synth_audio)
            .context("Failed to normalize synthesized audio")?;
        let synth_duration = self
            .engine
            .duration_seconds(&synth_audio)
            .context("Failed to measure synthesized audio")?;
        emit_debug(
            "pipeline.synthesis",
            &format!(
                "synthesized {synth_duration:.2}s (provider reported {:.2}s)",
                synthesis.total_duration
            ),
        );

        let ctx = StrategyContext {
            engine: self.engine,
            tts: self.tts,
            workspace: &workspace,
            video_duration,
            voice: &self.options.voice,
            segments: &transcription.segments,
            synth_audio: &synth_audio,
            synth_duration,
            word_timings: &synthesis.word_timings,
        };

        let strategies: [&dyn AlignmentStrategy; 4] = [
            &PerSegmentAlignment,
            &GapAdjustment,
            &SyntheticSegmentDistribution,
            &SimplePadOrStretch,
        ];

        let mut chosen: Option<(PathBuf, &'static str)> = None;
        let mut last_error: Option<StageError> = None;
        for strategy in strategies {
            self.check_deadline(started)?;
            self.sink.report(
                PERCENT_ALIGNING,
                &PipelineStage::PipelineSpawn {
                    strategy: strategy.name(),
                },
            );
            match strategy.attempt(&ctx) {
                Ok(StrategyOutcome::Completed(track)) => {
                    chosen = Some((track, strategy.name()));
                    break;
                }
                Ok(StrategyOutcome::Unsuitable(reason)) => {
                    emit_debug(
                        "pipeline.strategy.unsuitable",
                        &format!("{}: {reason}", strategy.name()),
                    );
                }
                Err(err) if err.is_fatal() => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("Strategy {} hit a fatal error", strategy.name())));
                }
                Err(err) => {
                    emit(
                        Level::Warn,
                        "pipeline.strategy.failed",
                        &format!("Strategy {} failed: {err}", strategy.name()),
                        None,
                    );
                    last_error = Some(err);
                }
            }
        }

        let Some((track, strategy_name)) = chosen else {
            return Err(match last_error {
                Some(err) => {
                    anyhow::Error::new(err).context("Every alignment strategy failed")
                }
                None => anyhow::anyhow!("Every alignment strategy was unsuitable"),
            });
        };
        emit(
            Level::Info,
            "pipeline.strategy.selected",
            &format!("Aligned with {strategy_name}"),
            None,
        );

        self.check_deadline(started)?;
        let (mut track, _) =
            verify_duration(self.engine, &workspace, track, video_duration, "final")
                .context("Drift correction failed")?;

        if self.options.keep_background && !transcription.segments.is_empty() {
            track = mix::mix_background(
                self.engine,
                &workspace,
                video,
                &track,
                &transcription.segments,
                self.options.duck_level_db,
            )
            .context("Background mix failed")?;
        }

        self.check_deadline(started)?;
        self.engine
            .mux(video, &track, &self.options.output)
            .context("Failed to mux replacement audio")?;
        Ok(self.options.output.clone())
    }

    fn check_deadline(&self, started: Instant) -> Result<()> {
        if started.elapsed() > self.options.timeout {
            anyhow::bail!(
                "Pipeline exceeded its {}s wall-clock budget",
                self.options.timeout.as_secs()
            );
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::media::engine::testing::FakeEngine;

    struct Scenario {
        engine: FakeEngine,
        scratch: tempfile::TempDir,
        video: PathBuf,
        output: PathBuf,
    }

    impl Scenario {
        fn new(video_duration: f64) -> Self {
            let engine = FakeEngine::new();
            let scratch = tempfile::tempdir().unwrap();
            let video = PathBuf::from("/input/video.mp4");
            engine.add_file(&video, video_duration);
            let output = scratch.path().join("out.mp4");
            Self {
                engine,
                scratch,
                video,
                output,
            }
        }
    }

    /// Scenario A: both segments carry proportional word timings; the
    /// per-segment strategy must win and land within 100ms of the video.
    #[test]
    fn per_segment_strategy_handles_segmented_transcripts() {
        let s = Scenario::new(10.0);
        let tts = FakeTts {
            engine: &s.engine,
            duration: 7.0,
            words: vec![
                timing("Hello", 0.0, 0.8),
                timing("there", 0.9, 1.7),
                timing("How", 3.0, 3.8),
                timing("are", 3.9, 4.7),
                timing("you", 4.8, 5.6),
                timing("today", 5.7, 6.9),
            ],
            per_segment_duration: 1.0,
        };
        let transcription = Transcription {
            full_text: "Hello there How are you today".to_string(),
            segments: vec![
                segment(0.5, 3.0, "Hello there"),
                segment(4.0, 9.5, "How are you today"),
            ],
            duration: 10.0,
        };
        let sink = RecordingSink::default();
        let pipeline = VoicePipeline::new(&s.engine, &tts, &sink, options(s.output.clone()));

        let output = pipeline
            .run(&s.video, &transcription, s.scratch.path())
            .unwrap();

        assert_eq!(output, s.output);
        let final_duration = s.engine.duration_seconds(&output).unwrap();
        assert!((final_duration - 10.0).abs() <= 0.1, "got {final_duration}");
        assert!(
            sink.last_spawned_strategy()
                .unwrap()
                .contains("per_segment_alignment")
        );
        // Speech onset: the composed track leads with the first segment's
        // original start as silence.
        assert!(
            s.engine
                .ops()
                .iter()
                .any(|op| op.as_str() == "generate_silence 0.500")
        );
    }

    /// Scenario B: no segments, no word timings, 12s of synthesis against a
    /// 10s video. Only the terminal tier applies; the gentle stretch stops
    /// at the 1.15 clamp and the verifier hard-trims the residue.
    #[test]
    fn bare_synthesis_falls_through_to_simple_pad_or_stretch() {
        let s = Scenario::new(10.0);
        let tts = FakeTts {
            engine: &s.engine,
            duration: 12.0,
            words: Vec::new(),
            per_segment_duration: 1.0,
        };
        let transcription = Transcription {
            full_text: "some narration".to_string(),
            segments: Vec::new(),
            duration: 10.0,
        };
        let sink = RecordingSink::default();
        let pipeline = VoicePipeline::new(&s.engine, &tts, &sink, options(s.output.clone()));

        let output = pipeline
            .run(&s.video, &transcription, s.scratch.path())
            .unwrap();

        assert!(
            sink.last_spawned_strategy()
                .unwrap()
                .contains("simple_pad_or_stretch")
        );
        // The clamp leaves ~10.43s; stretch alone must not force 10.0.
        assert!(
            s.engine
                .ops()
                .iter()
                .any(|op| op.starts_with("time_stretch_gently 10.43"))
        );
        assert_eq!(s.engine.count_ops("hard_trim"), 1);
        let final_duration = s.engine.duration_seconds(&output).unwrap();
        assert!((final_duration - 10.0).abs() <= 0.1);
    }

    /// Scenario C: five segments but only three map confidently (<80%), so
    /// the per-segment tier aborts and gap adjustment takes over.
    #[test]
    fn weak_alignment_falls_through_to_gap_adjustment() {
        let s = Scenario::new(10.0);
        let tts = FakeTts {
            engine: &s.engine,
            duration: 8.0,
            words: vec![
                timing("alpha", 0.0, 0.9),
                timing("bravo", 1.0, 1.9),
                timing("charlie", 2.0, 2.9),
                timing("delta", 3.0, 3.9),
                timing("echo", 4.0, 4.9),
                timing("foxtrot", 5.0, 7.9),
            ],
            per_segment_duration: 1.0,
        };
        let transcription = Transcription {
            full_text:
                "alpha bravo charlie delta echo foxtrot golf hotel india juliet".to_string(),
            segments: vec![
                segment(0.5, 2.0, "alpha bravo"),
                segment(2.5, 4.0, "charlie delta"),
                segment(4.5, 6.0, "echo foxtrot"),
                segment(6.5, 8.0, "golf hotel"),
                segment(8.5, 9.5, "india juliet"),
            ],
            duration: 10.0,
        };
        let sink = RecordingSink::default();
        let pipeline = VoicePipeline::new(&s.engine, &tts, &sink, options(s.output.clone()));

        let output = pipeline
            .run(&s.video, &transcription, s.scratch.path())
            .unwrap();

        assert!(
            sink.last_spawned_strategy()
                .unwrap()
                .contains("gap_adjustment")
        );
        let final_duration = s.engine.duration_seconds(&output).unwrap();
        assert!((final_duration - 10.0).abs() <= 0.1);
    }

    #[test]
    fn unreadable_video_fails_the_job_with_a_failed_milestone() {
        let engine = FakeEngine::new();
        let scratch = tempfile::tempdir().unwrap();
        let tts = FakeTts {
            engine: &engine,
            duration: 5.0,
            words: Vec::new(),
            per_segment_duration: 1.0,
        };
        let transcription = Transcription {
            full_text: "text".to_string(),
            segments: Vec::new(),
            duration: 5.0,
        };
        let sink = RecordingSink::default();
        let pipeline = VoicePipeline::new(
            &engine,
            &tts,
            &sink,
            options(scratch.path().join("out.mp4")),
        );

        let err = pipeline
            .run(Path::new("/missing.mp4"), &transcription, scratch.path())
            .unwrap_err();
        assert!(err.to_string().contains("probe video duration"));
        let stages = sink.stages();
        assert!(stages.last().unwrap().contains("Failed"));
    }

    #[test]
    fn background_mix_runs_after_duration_correction() {
        let s = Scenario::new(10.0);
        let tts = FakeTts {
            engine: &s.engine,
            duration: 9.5,
            words: Vec::new(),
            per_segment_duration: 1.0,
        };
        let transcription = Transcription {
            full_text: "one two".to_string(),
            segments: vec![segment(0.5, 4.0, "one"), segment(5.0, 9.0, "two")],
            duration: 10.0,
        };
        let sink = RecordingSink::default();
        let mut opts = options(s.output.clone());
        opts.keep_background = true;
        let pipeline = VoicePipeline::new(&s.engine, &tts, &sink, opts);

        let output = pipeline
            .run(&s.video, &transcription, s.scratch.path())
            .unwrap();

        assert_eq!(s.engine.count_ops("duck_and_mix"), 1);
        assert_eq!(s.engine.count_ops("extract_audio"), 1);
        let final_duration = s.engine.duration_seconds(&output).unwrap();
        assert!((final_duration - 10.0).abs() <= 0.1);
    }

    #[test]
    fn exhausted_deadline_aborts_between_stages() {
        let s = Scenario::new(10.0);
        let tts = FakeTts {
            engine: &s.engine,
            duration: 9.6,
            words: Vec::new(),
            per_segment_duration: 1.0,
        };
        let transcription = Transcription {
            full_text: "text".to_string(),
            segments: Vec::new(),
            duration: 10.0,
        };
        let sink = RecordingSink::default();
        let mut opts = options(s.output.clone());
        opts.timeout = Duration::from_secs(0);
        let pipeline = VoicePipeline::new(&s.engine, &tts, &sink, opts);

        let err = pipeline
            .run(&s.video, &transcription, s.scratch.path())
            .unwrap_err();
        assert!(err.to_string().contains("wall-clock budget"));
    }
}
