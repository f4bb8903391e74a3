pub mod http;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::transcript::{Transcription, WordTiming};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    Configuration(String),

    #[error("provider request failed ({status}): {body}")]
    Api { status: String, body: String },

    #[error("unusable provider response: {0}")]
    InvalidResponse(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of one whole-text synthesis call.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub audio_path: PathBuf,
    /// Empty when the provider has no alignment data; that is not an error.
    pub word_timings: Vec<WordTiming>,
    pub total_duration: f64,
}

/// Speech synthesis collaborator. Injected into the orchestrator so tests
/// can substitute doubles.
pub trait TtsProvider {
    fn synthesize_with_timestamps(
        &self,
        text: &str,
        voice: &str,
        out_dir: &Path,
    ) -> Result<Synthesis, ProviderError>;

    /// Timing-free synthesis, used only by the per-segment fallback path.
    fn synthesize(&self, text: &str, voice: &str, out: &Path) -> Result<(), ProviderError>;
}

/// Transcription collaborator.
pub trait TranscriptionProvider {
    fn transcribe(&self, video: &Path) -> Result<Transcription, ProviderError>;
}
