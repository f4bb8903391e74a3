use std::process::Command;

use super::error::MediaError;

/// Keep the tail end of stderr; that is where ffmpeg reports the actual
/// failure, and full filter-graph dumps can run to many kilobytes.
const STDERR_TAIL_CHARS: usize = 500;

/// Single subprocess seam shared by every media primitive. Implementations
/// run the transcoding tool with the given arguments and report non-zero
/// exits as typed errors carrying a bounded stderr tail.
pub trait FfmpegRunner {
    fn run(&self, args: &[String]) -> Result<(), MediaError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFfmpegRunner;

impl FfmpegRunner for SystemFfmpegRunner {
    fn run(&self, args: &[String]) -> Result<(), MediaError> {
        let output = Command::new("ffmpeg")
            .arg("-hide_banner")
            .args(args)
            .output()
            .map_err(|source| MediaError::Spawn {
                tool: "ffmpeg",
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::Encoding {
                tool: "ffmpeg",
                status: output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "killed".to_string()),
                stderr_tail: stderr_tail(&stderr),
            });
        }

        Ok(())
    }
}

pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let char_count = trimmed.chars().count();
    if char_count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .skip(char_count - STDERR_TAIL_CHARS)
        .collect()
}
