use std::path::{Path, PathBuf};

use crate::media::{AudioEngine, MediaError};
use crate::transcript::TranscriptSegment;

use super::workspace::JobWorkspace;

/// Duck the original background audio under the finished voice track.
/// Only the original transcript segments count as speech windows; synthetic
/// segments never drive ducking.
pub fn mix_background(
    engine: &dyn AudioEngine,
    workspace: &JobWorkspace,
    video: &Path,
    voice_track: &Path,
    segments: &[TranscriptSegment],
    duck_level_db: f64,
) -> Result<PathBuf, MediaError> {
    let background = workspace.path("background.wav");
    engine.extract_audio(video, &background)?;

    let windows: Vec<(f64, f64)> = segments.iter().map(|s| (s.start, s.end)).collect();
    let mixed = workspace.path("voice-over-background.wav");
    engine.duck_and_mix(&background, voice_track, &windows, duck_level_db, &mixed)?;
    Ok(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::engine::testing::FakeEngine;

    #[test]
    fn mix_runs_over_the_longer_of_the_two_tracks() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(root.path()).unwrap();
        let engine = FakeEngine::new();
        engine.add_file("/video.mp4", 10.0);
        let voice = ws.path("voice.wav");
        engine.add_file(&voice, 9.95);

        let segments = vec![TranscriptSegment {
            start: 0.5,
            end: 3.0,
            text: "hello".to_string(),
        }];
        let mixed =
            mix_background(&engine, &ws, Path::new("/video.mp4"), &voice, &segments, -12.0)
                .unwrap();
        assert!((engine.duration_seconds(&mixed).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(engine.count_ops("duck_and_mix"), 1);
    }
}
