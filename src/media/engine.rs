use std::path::{Path, PathBuf};

use crate::ui::prelude::{Level, emit};

use super::error::MediaError;
use super::primitives::{self, GENTLE_RATIO_MAX, GENTLE_RATIO_MIN};
use super::probe::{DurationProbe, FfprobeDurationProbe};
use super::runner::{FfmpegRunner, SystemFfmpegRunner};

/// Everything the alignment pipeline needs from the media layer, behind one
/// seam so strategies and the verifier can run against a double in tests.
pub trait AudioEngine {
    fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError>;

    fn extract_audio(&self, video: &Path, out: &Path) -> Result<(), MediaError>;

    fn convert_to_wav(&self, input: &Path, out: &Path) -> Result<(), MediaError>;

    /// Stretch to the target duration using a bounded atempo chain.
    fn time_stretch(&self, input: &Path, out: &Path, target_duration: f64)
    -> Result<(), MediaError>;

    /// Stretch with the effective ratio clamped to [0.85, 1.15]. Returns the
    /// duration actually achieved; callers must book-keep with that value.
    fn time_stretch_gently(
        &self,
        input: &Path,
        out: &Path,
        target_duration: f64,
    ) -> Result<f64, MediaError>;

    fn generate_silence(&self, out: &Path, duration: f64) -> Result<(), MediaError>;

    fn concatenate(&self, inputs: &[PathBuf], out: &Path) -> Result<(), MediaError>;

    fn concatenate_with_fades(
        &self,
        inputs: &[PathBuf],
        fade_duration: f64,
        out: &Path,
    ) -> Result<(), MediaError>;

    fn extract_segment(
        &self,
        input: &Path,
        out: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), MediaError>;

    fn hard_trim(&self, input: &Path, out: &Path, max_duration: f64) -> Result<(), MediaError>;

    fn mux(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), MediaError>;

    fn duck_and_mix(
        &self,
        original: &Path,
        voice: &Path,
        windows: &[(f64, f64)],
        duck_level_db: f64,
        out: &Path,
    ) -> Result<(), MediaError>;
}

pub struct FfmpegEngine {
    runner: Box<dyn FfmpegRunner>,
    probe: Box<dyn DurationProbe>,
}

impl FfmpegEngine {
    pub fn new(runner: Box<dyn FfmpegRunner>, probe: Box<dyn DurationProbe>) -> Self {
        Self { runner, probe }
    }

    pub fn system() -> Self {
        Self::new(
            Box::new(SystemFfmpegRunner),
            Box::new(FfprobeDurationProbe),
        )
    }
}

impl AudioEngine for FfmpegEngine {
    fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError> {
        self.probe.duration_seconds(path)
    }

    fn extract_audio(&self, video: &Path, out: &Path) -> Result<(), MediaError> {
        primitives::extract_audio(self.runner.as_ref(), video, out)
    }

    fn convert_to_wav(&self, input: &Path, out: &Path) -> Result<(), MediaError> {
        primitives::convert_to_wav(self.runner.as_ref(), input, out)
    }

    fn time_stretch(
        &self,
        input: &Path,
        out: &Path,
        target_duration: f64,
    ) -> Result<(), MediaError> {
        let current = self.probe.duration_seconds(input)?;
        primitives::time_stretch(self.runner.as_ref(), input, out, current / target_duration)
    }

    fn time_stretch_gently(
        &self,
        input: &Path,
        out: &Path,
        target_duration: f64,
    ) -> Result<f64, MediaError> {
        let current = self.probe.duration_seconds(input)?;
        let ratio = (current / target_duration).clamp(GENTLE_RATIO_MIN, GENTLE_RATIO_MAX);
        primitives::time_stretch(self.runner.as_ref(), input, out, ratio)?;
        self.probe.duration_seconds(out)
    }

    fn generate_silence(&self, out: &Path, duration: f64) -> Result<(), MediaError> {
        primitives::generate_silence(self.runner.as_ref(), out, duration)
    }

    fn concatenate(&self, inputs: &[PathBuf], out: &Path) -> Result<(), MediaError> {
        let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
        primitives::concatenate(self.runner.as_ref(), &refs, out)
    }

    fn concatenate_with_fades(
        &self,
        inputs: &[PathBuf],
        fade_duration: f64,
        out: &Path,
    ) -> Result<(), MediaError> {
        let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
        let mut durations = Vec::with_capacity(inputs.len());
        for input in inputs {
            durations.push(self.probe.duration_seconds(input)?);
        }
        let args = primitives::concatenate_with_fades_args(&refs, &durations, fade_duration, out);
        match self.runner.run(&args) {
            Ok(()) => Ok(()),
            Err(err) if err.is_encoding() => {
                emit(
                    Level::Warn,
                    "media.concat.fade_fallback",
                    &format!("Crossfade concat failed, joining without fades: {err}"),
                    None,
                );
                primitives::concatenate(self.runner.as_ref(), &refs, out)
            }
            Err(err) => Err(err),
        }
    }

    fn extract_segment(
        &self,
        input: &Path,
        out: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), MediaError> {
        primitives::extract_segment(self.runner.as_ref(), input, out, start, duration)
    }

    fn hard_trim(&self, input: &Path, out: &Path, max_duration: f64) -> Result<(), MediaError> {
        primitives::hard_trim(self.runner.as_ref(), input, out, max_duration)
    }

    fn mux(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), MediaError> {
        primitives::mux(self.runner.as_ref(), video, audio, out)
    }

    fn duck_and_mix(
        &self,
        original: &Path,
        voice: &Path,
        windows: &[(f64, f64)],
        duck_level_db: f64,
        out: &Path,
    ) -> Result<(), MediaError> {
        primitives::duck_and_mix(
            self.runner.as_ref(),
            original,
            voice,
            windows,
            duck_level_db,
            out,
        )
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory engine tracking only durations. Lets compositor, verifier
    /// and strategy tests assert on op sequences without ffmpeg installed.
    #[derive(Default)]
    pub struct FakeEngine {
        files: RefCell<HashMap<PathBuf, f64>>,
        ops: RefCell<Vec<String>>,
    }

    impl FakeEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_file(&self, path: impl Into<PathBuf>, duration: f64) {
            self.files.borrow_mut().insert(path.into(), duration);
        }

        pub fn ops(&self) -> Vec<String> {
            self.ops.borrow().clone()
        }

        pub fn count_ops(&self, prefix: &str) -> usize {
            self.ops
                .borrow()
                .iter()
                .filter(|op| op.starts_with(prefix))
                .count()
        }

        fn record(&self, op: String) {
            self.ops.borrow_mut().push(op);
        }

        fn lookup(&self, path: &Path) -> Result<f64, MediaError> {
            self.files
                .borrow()
                .get(path)
                .copied()
                .ok_or_else(|| MediaError::Probe {
                    path: path.to_path_buf(),
                    message: "unknown fake file".to_string(),
                })
        }
    }

    impl AudioEngine for FakeEngine {
        fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError> {
            self.lookup(path)
        }

        fn extract_audio(&self, video: &Path, out: &Path) -> Result<(), MediaError> {
            let duration = self.lookup(video)?;
            self.add_file(out, duration);
            self.record(format!("extract_audio {duration:.3}"));
            Ok(())
        }

        fn convert_to_wav(&self, input: &Path, out: &Path) -> Result<(), MediaError> {
            let duration = self.lookup(input)?;
            self.add_file(out, duration);
            self.record("convert_to_wav".to_string());
            Ok(())
        }

        fn time_stretch(
            &self,
            input: &Path,
            out: &Path,
            target_duration: f64,
        ) -> Result<(), MediaError> {
            self.lookup(input)?;
            self.add_file(out, target_duration);
            self.record(format!("time_stretch {target_duration:.3}"));
            Ok(())
        }

        fn time_stretch_gently(
            &self,
            input: &Path,
            out: &Path,
            target_duration: f64,
        ) -> Result<f64, MediaError> {
            let current = self.lookup(input)?;
            let ratio = (current / target_duration).clamp(GENTLE_RATIO_MIN, GENTLE_RATIO_MAX);
            let achieved = current / ratio;
            self.add_file(out, achieved);
            self.record(format!("time_stretch_gently {achieved:.3}"));
            Ok(achieved)
        }

        fn generate_silence(&self, out: &Path, duration: f64) -> Result<(), MediaError> {
            self.add_file(out, duration);
            self.record(format!("generate_silence {duration:.3}"));
            Ok(())
        }

        fn concatenate(&self, inputs: &[PathBuf], out: &Path) -> Result<(), MediaError> {
            let mut total = 0.0;
            for input in inputs {
                total += self.lookup(input)?;
            }
            self.add_file(out, total);
            self.record(format!("concatenate {}", inputs.len()));
            Ok(())
        }

        fn concatenate_with_fades(
            &self,
            inputs: &[PathBuf],
            _fade_duration: f64,
            out: &Path,
        ) -> Result<(), MediaError> {
            let mut total = 0.0;
            for input in inputs {
                total += self.lookup(input)?;
            }
            self.add_file(out, total);
            self.record(format!("concatenate_with_fades {}", inputs.len()));
            Ok(())
        }

        fn extract_segment(
            &self,
            input: &Path,
            out: &Path,
            start: f64,
            duration: f64,
        ) -> Result<(), MediaError> {
            let available = self.lookup(input)?;
            let actual = duration.min((available - start).max(0.0));
            self.add_file(out, actual);
            self.record(format!("extract_segment {start:.3}+{actual:.3}"));
            Ok(())
        }

        fn hard_trim(&self, input: &Path, out: &Path, max_duration: f64) -> Result<(), MediaError> {
            let current = self.lookup(input)?;
            self.add_file(out, current.min(max_duration));
            self.record(format!("hard_trim {max_duration:.3}"));
            Ok(())
        }

        fn mux(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), MediaError> {
            self.lookup(video)?;
            let duration = self.lookup(audio)?;
            self.add_file(out, duration);
            self.record("mux".to_string());
            Ok(())
        }

        fn duck_and_mix(
            &self,
            original: &Path,
            voice: &Path,
            windows: &[(f64, f64)],
            _duck_level_db: f64,
            out: &Path,
        ) -> Result<(), MediaError> {
            let a = self.lookup(original)?;
            let b = self.lookup(voice)?;
            self.add_file(out, a.max(b));
            self.record(format!("duck_and_mix {}", windows.len()));
            Ok(())
        }
    }

    #[test]
    fn gentle_stretch_clamps_the_effective_ratio() {
        let engine = FakeEngine::new();
        engine.add_file("/in.wav", 12.0);
        let achieved = engine
            .time_stretch_gently(Path::new("/in.wav"), Path::new("/out.wav"), 10.0)
            .unwrap();
        // 12/10 = 1.2 exceeds the 1.15 clamp, so the target is not reached.
        assert!((achieved - 12.0 / 1.15).abs() < 1e-9);
        assert!(achieved > 10.0);
    }
}
