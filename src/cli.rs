use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Replace a video's narration with a synthesized voice clone
    Process(ProcessArgs),
    /// Generate and cache a transcript for a video
    Transcribe(TranscribeArgs),
    /// Print the duration of a media file
    Probe(ProbeArgs),
    /// Configure collaborator endpoints and credentials
    Setup(SetupArgs),
    /// Verify external tools and collaborator configuration
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Source video file
    #[arg(value_hint = ValueHint::FilePath)]
    pub video: PathBuf,

    /// Voice reference handed to the TTS provider
    #[arg(short = 'v', long = "voice")]
    pub voice: String,

    /// Transcript override: a cached transcript JSON or a plain text file
    #[arg(short = 't', long = "transcript", value_hint = ValueHint::FilePath)]
    pub transcript: Option<PathBuf>,

    /// Output file path; defaults to <videoname>.revoiced.mp4 next to the video
    #[arg(short = 'o', long = "out-file", value_hint = ValueHint::FilePath)]
    pub out_file: Option<PathBuf>,

    /// Keep the original audio ducked underneath the new voice
    #[arg(long)]
    pub keep_background: bool,

    /// Duck level in dB applied to the background during speech
    #[arg(long)]
    pub duck_level: Option<f64>,

    /// Wall-clock budget for the whole pipeline, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Re-transcribe even when a cached transcript exists
    #[arg(long)]
    pub force_transcribe: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TranscribeArgs {
    /// Source video or audio file to transcribe
    #[arg(value_hint = ValueHint::FilePath)]
    pub video: PathBuf,

    /// Regenerate even when a cached transcript exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Media file to inspect
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// TTS collaborator base URL
    #[arg(long)]
    pub tts_endpoint: Option<String>,

    /// TTS collaborator API key
    #[arg(long)]
    pub tts_api_key: Option<String>,

    /// Transcription collaborator base URL
    #[arg(long)]
    pub transcription_endpoint: Option<String>,

    /// Transcription collaborator API key
    #[arg(long)]
    pub transcription_api_key: Option<String>,

    /// Default duck level in dB for background mixing
    #[arg(long)]
    pub duck_level: Option<f64>,

    /// Default pipeline timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}
