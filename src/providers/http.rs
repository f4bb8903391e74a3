//! Blocking HTTP clients for the synthesis and transcription collaborators.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use reqwest::blocking::multipart::Form;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::CollaboratorConfig;
use crate::transcript::{TranscriptSegment, Transcription, WordTiming};

use super::{ProviderError, Synthesis, TranscriptionProvider, TtsProvider};

const REQUEST_TIMEOUT_SECS: u64 = 300;

fn build_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("reqwest client")
}

fn require(config: &CollaboratorConfig, what: &str) -> Result<(String, String), ProviderError> {
    let endpoint = config.endpoint.clone().filter(|e| !e.is_empty()).ok_or_else(|| {
        ProviderError::Configuration(format!("{what} endpoint missing; run `revoice setup`"))
    })?;
    let api_key = config.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
        ProviderError::Configuration(format!("{what} API key missing; run `revoice setup`"))
    })?;
    Ok((endpoint, api_key))
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio_base64: String,
    duration: f64,
    #[serde(default)]
    words: Vec<SpeechWord>,
}

#[derive(Debug, Deserialize)]
struct SpeechWord {
    word: String,
    start: f64,
    end: f64,
}

#[derive(Debug)]
pub struct HttpTtsProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTtsProvider {
    pub fn from_config(config: &CollaboratorConfig) -> Result<Self, ProviderError> {
        let (endpoint, api_key) = require(config, "TTS")?;
        Ok(Self {
            client: build_client(),
            endpoint,
            api_key,
        })
    }

    fn request_speech(
        &self,
        text: &str,
        voice: &str,
        timestamps: bool,
    ) -> Result<SpeechResponse, ProviderError> {
        let url = format!("{}/v1/speech", self.endpoint.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&json!({
                "text": text,
                "voice": voice,
                "format": "wav",
                "timestamps": timestamps,
            }))
            .send()
            .map_err(|err| ProviderError::Api {
                status: "connect".to_string(),
                body: err.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().to_string();
            let body = resp.text().unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        resp.json()
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
    }

    fn write_audio(&self, response: &SpeechResponse, out: &Path) -> Result<(), ProviderError> {
        let bytes = BASE64
            .decode(&response.audio_base64)
            .map_err(|err| ProviderError::InvalidResponse(format!("bad audio payload: {err}")))?;
        fs::write(out, bytes).map_err(|source| ProviderError::Io {
            path: out.to_path_buf(),
            source,
        })
    }
}

impl TtsProvider for HttpTtsProvider {
    fn synthesize_with_timestamps(
        &self,
        text: &str,
        voice: &str,
        out_dir: &Path,
    ) -> Result<Synthesis, ProviderError> {
        let response = self.request_speech(text, voice, true)?;
        let audio_path = out_dir.join("synthesis.wav");
        self.write_audio(&response, &audio_path)?;

        let word_timings = response
            .words
            .iter()
            .map(|w| WordTiming {
                word: w.word.clone(),
                start: w.start,
                end: w.end,
            })
            .collect();

        Ok(Synthesis {
            audio_path,
            word_timings,
            total_duration: response.duration,
        })
    }

    fn synthesize(&self, text: &str, voice: &str, out: &Path) -> Result<(), ProviderError> {
        let response = self.request_speech(text, voice, false)?;
        self.write_audio(&response, out)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    duration: f64,
    #[serde(default)]
    segments: Vec<TranscriptionSegmentPayload>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionSegmentPayload {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug)]
pub struct HttpTranscriptionProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTranscriptionProvider {
    pub fn from_config(config: &CollaboratorConfig) -> Result<Self, ProviderError> {
        let (endpoint, api_key) = require(config, "transcription")?;
        Ok(Self {
            client: build_client(),
            endpoint,
            api_key,
        })
    }
}

impl TranscriptionProvider for HttpTranscriptionProvider {
    fn transcribe(&self, video: &Path) -> Result<Transcription, ProviderError> {
        let url = format!("{}/v1/transcriptions", self.endpoint.trim_end_matches('/'));
        let form = Form::new()
            .file("file", video)
            .map_err(|source| ProviderError::Io {
                path: video.to_path_buf(),
                source,
            })?;

        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .map_err(|err| ProviderError::Api {
                status: "connect".to_string(),
                body: err.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().to_string();
            let body = resp.text().unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let payload: TranscriptionResponse = resp
            .json()
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

        Ok(Transcription {
            full_text: payload.text,
            segments: payload
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text,
                })
                .collect(),
            duration: payload.duration,
        })
    }
}
