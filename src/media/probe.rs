use std::path::Path;
use std::process::Command;

use super::error::MediaError;

/// Duration lookup seam; the compositor and verifier only ever need this
/// one fact about a media file.
pub trait DurationProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeDurationProbe;

impl DurationProbe for FfprobeDurationProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .map_err(|source| MediaError::Spawn {
                tool: "ffprobe",
                source,
            })?;

        if !output.status.success() {
            return Err(MediaError::Probe {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str
            .trim()
            .parse()
            .map_err(|_| MediaError::Probe {
                path: path.to_path_buf(),
                message: format!("unparseable duration `{}`", duration_str.trim()),
            })
    }
}
