use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One contiguous utterance on the original video's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Word-level timing on the synthesized audio's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub full_text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    pub duration: f64,
}

impl Transcription {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript at {}", path.display()))?;
        let transcription: Transcription = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse transcript at {}", path.display()))?;
        transcription.validate()?;
        Ok(transcription)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create transcript directory {}", parent.display())
            })?;
        }
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize transcript")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        Ok(())
    }

    /// Segments must be well-formed and increasing; gaps between them are fine.
    pub fn validate(&self) -> Result<()> {
        let mut previous_end = 0.0f64;
        for segment in &self.segments {
            if segment.start >= segment.end {
                anyhow::bail!(
                    "Transcript segment `{}` ends before it starts ({} >= {})",
                    segment.text,
                    segment.start,
                    segment.end
                );
            }
            if segment.start < previous_end {
                anyhow::bail!(
                    "Transcript segments overlap near {:.3}s (`{}`)",
                    segment.start,
                    segment.text
                );
            }
            previous_end = segment.end;
        }
        Ok(())
    }
}

/// First-start to last-end window covered by speech, if any segments exist.
pub fn speech_window(segments: &[TranscriptSegment]) -> Option<(f64, f64)> {
    let first = segments.first()?;
    let last = segments.last()?;
    Some((first.start, last.end))
}

/// Flattened word list across all segments, plus each segment's
/// (first, last) index into that list. Segments without words are skipped
/// by callers via an empty range check.
pub fn segment_word_spans(segments: &[TranscriptSegment]) -> (Vec<String>, Vec<(usize, usize)>) {
    let mut words = Vec::new();
    let mut spans = Vec::with_capacity(segments.len());
    for segment in segments {
        let start = words.len();
        words.extend(segment.text.split_whitespace().map(str::to_string));
        if words.len() == start {
            // Empty segment text: the span points past the last real word and
            // callers must treat it as unmappable.
            spans.push((start, start));
        } else {
            spans.push((start, words.len() - 1));
        }
    }
    (words, spans)
}
