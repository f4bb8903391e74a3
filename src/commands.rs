use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{ProbeArgs, ProcessArgs, SetupArgs, TranscribeArgs};
use crate::common::progress::{create_spinner, finish_spinner_quiet, finish_spinner_with_success};
use crate::config::{VoiceConfig, VoiceDirectories, VoiceProjectPaths};
use crate::media::{DurationProbe, FfmpegEngine, FfprobeDurationProbe};
use crate::pipeline::{EmitProgressSink, PipelineOptions, PipelineStage, ProgressSink, VoicePipeline};
use crate::providers::http::{HttpTranscriptionProvider, HttpTtsProvider};
use crate::providers::TranscriptionProvider;
use crate::transcript::Transcription;
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format};
use crate::utils::{canonicalize_existing, compute_file_hash};

pub fn handle_process(args: ProcessArgs) -> Result<()> {
    ensure_tools()?;
    let video_path = canonicalize_existing(&args.video)?;
    let config = VoiceConfig::load()?;
    let directories = VoiceDirectories::new()?;
    let sink = EmitProgressSink;

    // Collaborator misconfiguration must surface before any media work.
    let tts = HttpTtsProvider::from_config(&config.tts)
        .context("TTS collaborator is not usable")?;

    let transcription = obtain_transcription(
        &video_path,
        args.transcript.as_deref(),
        args.force_transcribe,
        &config,
        &directories,
        &sink,
    )?;

    let engine = FfmpegEngine::system();

    let output = args.out_file.unwrap_or_else(|| default_output_path(&video_path));
    let options = PipelineOptions {
        voice: args.voice,
        output,
        keep_background: args.keep_background,
        duck_level_db: args.duck_level.unwrap_or(config.pipeline.duck_level_db),
        timeout: Duration::from_secs(args.timeout.unwrap_or(config.pipeline.timeout_secs)),
    };

    let pipeline = VoicePipeline::new(&engine, &tts, &sink, options);
    let output = pipeline.run(&video_path, &transcription, directories.scratch_root())?;

    emit(
        Level::Success,
        "process.success",
        &format!("Wrote {}", output.display()),
        None,
    );
    Ok(())
}

pub fn handle_transcribe(args: TranscribeArgs) -> Result<()> {
    let video_path = canonicalize_existing(&args.video)?;
    let config = VoiceConfig::load()?;
    let directories = VoiceDirectories::new()?;

    let video_hash = compute_file_hash(&video_path)?;
    let project_paths = directories.project_paths(&video_hash);
    project_paths.ensure_directories()?;

    let cache_path = project_paths.transcript_cache_path();
    if cache_path.exists() && !args.force {
        emit(
            Level::Info,
            "transcribe.cached",
            &format!(
                "Transcript already cached at {} (use --force to regenerate)",
                cache_path.display()
            ),
            None,
        );
        return Ok(());
    }

    let transcription = run_transcription(&video_path, &config)?;
    transcription.save(cache_path)?;
    write_project_metadata(&project_paths, &video_hash, &video_path)?;

    emit(
        Level::Success,
        "transcribe.success",
        &format!(
            "Cached {} segments at {}",
            transcription.segments.len(),
            cache_path.display()
        ),
        None,
    );
    Ok(())
}

pub fn handle_probe(args: ProbeArgs) -> Result<()> {
    let path = canonicalize_existing(&args.file)?;
    let duration = FfprobeDurationProbe
        .duration_seconds(&path)
        .with_context(|| format!("Failed to probe {}", path.display()))?;
    emit(
        Level::Info,
        "probe.duration",
        &format!("{duration:.3}"),
        Some(serde_json::json!({ "seconds": duration })),
    );
    Ok(())
}

pub fn handle_setup(args: SetupArgs) -> Result<()> {
    let mut config = VoiceConfig::load()?;

    if let Some(endpoint) = args.tts_endpoint {
        config.tts.endpoint = Some(endpoint);
    }
    if let Some(key) = args.tts_api_key {
        config.tts.api_key = Some(key);
    }
    if let Some(endpoint) = args.transcription_endpoint {
        config.transcription.endpoint = Some(endpoint);
    }
    if let Some(key) = args.transcription_api_key {
        config.transcription.api_key = Some(key);
    }
    if let Some(duck_level) = args.duck_level {
        config.pipeline.duck_level_db = duck_level;
    }
    if let Some(timeout) = args.timeout {
        config.pipeline.timeout_secs = timeout;
    }

    let path = config.save()?;
    emit(
        Level::Success,
        "setup.saved",
        &format!("Configuration written to {}", path.display()),
        None,
    );
    Ok(())
}

pub fn handle_check() -> Result<()> {
    let mut healthy = true;

    for tool in ["ffmpeg", "ffprobe"] {
        match which::which(tool) {
            Ok(path) => emit(
                Level::Success,
                "check.tool",
                &format!("{tool}: {}", path.display()),
                None,
            ),
            Err(_) => {
                healthy = false;
                emit(
                    Level::Error,
                    "check.tool_missing",
                    &format!("{tool} not found on PATH"),
                    None,
                );
            }
        }
    }

    let config = VoiceConfig::load()?;
    for (name, collaborator) in [("tts", &config.tts), ("transcription", &config.transcription)] {
        let configured = collaborator.endpoint.as_deref().is_some_and(|e| !e.is_empty())
            && collaborator.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if configured {
            emit(
                Level::Success,
                "check.collaborator",
                &format!("{name}: configured"),
                None,
            );
        } else {
            healthy = false;
            emit(
                Level::Warn,
                "check.collaborator_missing",
                &format!("{name}: endpoint or API key missing (run `revoice setup`)"),
                None,
            );
        }
    }

    if !healthy {
        anyhow::bail!("Environment is not ready; fix the findings above");
    }
    Ok(())
}

fn ensure_tools() -> Result<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        which::which(tool)
            .map_err(|_| anyhow::anyhow!("{tool} not found on PATH; install ffmpeg first"))?;
    }
    Ok(())
}

fn default_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{stem}.revoiced.mp4"))
}

/// Transcript resolution order: explicit override file, then the per-video
/// cache, then the transcription collaborator (whose result is cached for
/// later jobs on the same source).
fn obtain_transcription(
    video_path: &Path,
    override_path: Option<&Path>,
    force: bool,
    config: &VoiceConfig,
    directories: &VoiceDirectories,
    sink: &dyn ProgressSink,
) -> Result<Transcription> {
    if let Some(path) = override_path {
        let path = canonicalize_existing(path)?;
        let transcription = load_transcript_override(&path)?;
        sink.report(
            15,
            &PipelineStage::TranscriptReady {
                segment_count: transcription.segments.len(),
            },
        );
        return Ok(transcription);
    }

    let video_hash = compute_file_hash(video_path)?;
    let project_paths = directories.project_paths(&video_hash);
    project_paths.ensure_directories()?;
    let cache_path = project_paths.transcript_cache_path();

    if cache_path.exists() && !force {
        let transcription = Transcription::load(cache_path)?;
        sink.report(
            15,
            &PipelineStage::TranscriptReady {
                segment_count: transcription.segments.len(),
            },
        );
        return Ok(transcription);
    }

    sink.report(10, &PipelineStage::Transcribing);
    let transcription = run_transcription(video_path, config)?;
    transcription.save(cache_path)?;
    write_project_metadata(&project_paths, &video_hash, video_path)?;
    sink.report(
        15,
        &PipelineStage::TranscriptReady {
            segment_count: transcription.segments.len(),
        },
    );
    Ok(transcription)
}

fn run_transcription(video_path: &Path, config: &VoiceConfig) -> Result<Transcription> {
    let provider = HttpTranscriptionProvider::from_config(&config.transcription)
        .context("Transcription collaborator is not usable")?;

    // Spinners would corrupt the event stream in JSON mode.
    let spinner = match get_output_format() {
        OutputFormat::Text => Some(create_spinner(format!(
            "Transcribing {}...",
            video_path.display()
        ))),
        OutputFormat::Json => None,
    };
    match provider.transcribe(video_path) {
        Ok(transcription) => {
            if let Some(spinner) = spinner {
                finish_spinner_with_success(
                    spinner,
                    format!("Transcribed {} segments", transcription.segments.len()),
                );
            }
            transcription.validate()?;
            Ok(transcription)
        }
        Err(err) => {
            if let Some(spinner) = spinner {
                finish_spinner_quiet(spinner);
            }
            Err(err).with_context(|| format!("Failed to transcribe {}", video_path.display()))
        }
    }
}

/// A `.json` override must be a cached transcript; anything else is read as
/// plain transcript text with no segment timing.
fn load_transcript_override(path: &Path) -> Result<Transcription> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        return Transcription::load(path);
    }
    let full_text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript text at {}", path.display()))?;
    if full_text.trim().is_empty() {
        anyhow::bail!("Transcript override {} is empty", path.display());
    }
    Ok(Transcription {
        full_text: full_text.trim().to_string(),
        segments: Vec::new(),
        duration: 0.0,
    })
}

#[derive(Serialize)]
struct ProjectMetadata<'a> {
    video_hash: &'a str,
    video_source: String,
    updated_at: String,
}

fn write_project_metadata(
    project_paths: &VoiceProjectPaths,
    video_hash: &str,
    video_path: &Path,
) -> Result<()> {
    let metadata = ProjectMetadata {
        video_hash,
        video_source: video_path.display().to_string(),
        updated_at: chrono::Utc::now().to_rfc3339(),
    };
    let contents = toml::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    fs::write(project_paths.metadata_path(), contents).with_context(|| {
        format!(
            "Failed to write metadata file to {}",
            project_paths.metadata_path().display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_the_video() {
        let out = default_output_path(Path::new("/videos/intro.mp4"));
        assert_eq!(out, PathBuf::from("/videos/intro.revoiced.mp4"));
    }

    #[test]
    fn plain_text_override_has_no_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.txt");
        fs::write(&path, "Hello there.\n").unwrap();
        let transcription = load_transcript_override(&path).unwrap();
        assert_eq!(transcription.full_text, "Hello there.");
        assert!(transcription.segments.is_empty());
    }

    #[test]
    fn empty_text_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.txt");
        fs::write(&path, "  \n").unwrap();
        assert!(load_transcript_override(&path).is_err());
    }
}
