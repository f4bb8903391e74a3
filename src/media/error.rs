use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("ffprobe could not read {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("{tool} exited with status {status}: {stderr_tail}")]
    Encoding {
        tool: &'static str,
        status: String,
        stderr_tail: String,
    },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl MediaError {
    pub fn is_encoding(&self) -> bool {
        matches!(self, MediaError::Encoding { .. })
    }
}
