use anyhow::{Context, Result};
use dirs::{cache_dir, config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DUCK_LEVEL_DB: f64 = -12.0;
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 600;

/// Environment override for all revoice directories, used by tests and
/// sandboxed installs.
pub const HOME_OVERRIDE_ENV: &str = "REVOICE_HOME";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub tts: CollaboratorConfig,
    #[serde(default)]
    pub transcription: CollaboratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_duck_level")]
    pub duck_level_db: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_duck_level() -> f64 {
    DEFAULT_DUCK_LEVEL_DB
}

fn default_timeout_secs() -> u64 {
    DEFAULT_PIPELINE_TIMEOUT_SECS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            duck_level_db: DEFAULT_DUCK_LEVEL_DB,
            timeout_secs: DEFAULT_PIPELINE_TIMEOUT_SECS,
        }
    }
}

impl VoiceConfig {
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(home) = env::var(HOME_OVERRIDE_ENV) {
            return Ok(PathBuf::from(home).join("config").join("config.toml"));
        }
        let root = config_dir().context("Unable to determine config directory")?;
        Ok(root.join("revoice").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(path)
    }
}

pub struct VoiceDirectories {
    data_root: PathBuf,
    cache_root: PathBuf,
}

impl VoiceDirectories {
    pub fn new() -> Result<Self> {
        let (data_root, cache_root) = if let Ok(home) = env::var(HOME_OVERRIDE_ENV) {
            let home = PathBuf::from(home);
            (home.join("data"), home.join("cache"))
        } else {
            let data_root = data_dir()
                .context("Unable to determine data directory for voice projects")?
                .join("revoice");
            let cache_root = cache_dir()
                .context("Unable to determine cache directory for voice projects")?
                .join("revoice");
            (data_root, cache_root)
        };

        fs::create_dir_all(&data_root).with_context(|| {
            format!("Failed to create data directory at {}", data_root.display())
        })?;
        fs::create_dir_all(&cache_root).with_context(|| {
            format!("Failed to create cache directory at {}", cache_root.display())
        })?;

        Ok(Self {
            data_root,
            cache_root,
        })
    }

    /// Scratch root for per-job temp namespaces.
    pub fn scratch_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn project_paths(&self, video_hash: &str) -> VoiceProjectPaths {
        VoiceProjectPaths {
            project_dir: self.data_root.join(video_hash),
            transcript_file: self
                .cache_root
                .join(video_hash)
                .join(format!("{video_hash}.transcript.json")),
            metadata_file: self.data_root.join(video_hash).join("metadata.toml"),
        }
    }
}

pub struct VoiceProjectPaths {
    project_dir: PathBuf,
    transcript_file: PathBuf,
    metadata_file: PathBuf,
}

impl VoiceProjectPaths {
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.project_dir).with_context(|| {
            format!(
                "Failed to create project directory {}",
                self.project_dir.display()
            )
        })?;
        if let Some(parent) = self.transcript_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create transcript cache directory {}",
                    parent.display()
                )
            })?;
        }
        Ok(())
    }

    pub fn transcript_cache_path(&self) -> &Path {
        &self.transcript_file
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn pipeline_defaults_apply_to_empty_config() {
        let config: VoiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.duck_level_db, DEFAULT_DUCK_LEVEL_DB);
        assert_eq!(config.pipeline.timeout_secs, DEFAULT_PIPELINE_TIMEOUT_SECS);
        assert!(config.tts.endpoint.is_none());
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let config: VoiceConfig = toml::from_str(
            "[tts]\nendpoint = \"https://tts.example.com\"\n[pipeline]\ntimeout_secs = 120\n",
        )
        .unwrap();
        assert_eq!(config.tts.endpoint.as_deref(), Some("https://tts.example.com"));
        assert_eq!(config.pipeline.timeout_secs, 120);
        assert_eq!(config.pipeline.duck_level_db, DEFAULT_DUCK_LEVEL_DB);
    }

    #[test]
    #[serial]
    fn directories_and_config_respect_home_override() {
        let dir = tempfile::tempdir().unwrap();
        unsafe { env::set_var(HOME_OVERRIDE_ENV, dir.path()) };

        let directories = VoiceDirectories::new().unwrap();
        let paths = directories.project_paths("abc123");
        paths.ensure_directories().unwrap();
        assert!(paths.transcript_cache_path().starts_with(dir.path()));

        let config = VoiceConfig::default();
        let written = config.save().unwrap();
        assert!(written.starts_with(dir.path()));
        assert!(VoiceConfig::load().is_ok());

        unsafe { env::remove_var(HOME_OVERRIDE_ENV) };
    }
}
