//! Typed, explicitly-threaded configuration.
//!
//! Construction layers, in priority order: an optional TOML config file
//! (`$NAS_INDEXER_CONFIG_PATH`, falling back to `nas-indexer.toml` in the
//! working directory), then individual environment-variable overrides, then
//! built-in defaults. There is no process-wide singleton: callers build a
//! `Config` once at startup and pass it into every constructor that needs it.

use std::{env, fs, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::volume::Volume;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redis_url: String,
    pub solr_url: String,
    pub thumbnail_dir: PathBuf,
    pub thumbnail_quality: u8,
    pub volumes: Vec<Volume>,

    pub debounce_window: Duration,
    pub staleness_multiple: u32,
    pub recency_window: Duration,
    pub global_lock_ttl: Duration,
    pub queue_lock_ttl: Duration,
    pub processed_marker_ttl: Duration,
    pub file_hash_ttl: Duration,
    pub thumbnail_hash_ttl: Duration,
    pub rescan_interval: Duration,
    pub operation_timeout: Duration,

    pub extractor_workers: usize,
    pub thumbnail_workers: usize,

    pub query_api_bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://redis:6379".to_string(),
            solr_url: "http://localhost:8983/solr/nas_content".to_string(),
            thumbnail_dir: PathBuf::from("/app/thumbnails"),
            thumbnail_quality: 85,
            volumes: Vec::new(),

            debounce_window: Duration::from_secs(5),
            staleness_multiple: 2,
            recency_window: Duration::from_secs(7200),
            global_lock_ttl: Duration::from_secs(1800),
            queue_lock_ttl: Duration::from_secs(60),
            processed_marker_ttl: Duration::from_secs(24 * 3600),
            file_hash_ttl: Duration::from_secs(24 * 3600),
            thumbnail_hash_ttl: Duration::from_secs(30 * 24 * 3600),
            rescan_interval: Duration::from_secs(30 * 60),
            operation_timeout: Duration::from_secs(30),

            extractor_workers: 4,
            thumbnail_workers: 2,

            query_api_bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Loads overrides in priority order: config file, then environment,
    /// then defaults. This mirrors the three-tier precedence used for the
    /// scanner subsystem's own configuration.
    pub fn load() -> Result<Self> {
        let mut config = if let Some(path) = Self::config_file_path() {
            Self::load_from_file(&path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = env::var("NAS_INDEXER_CONFIG_PATH") {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        let default = PathBuf::from("nas-indexer.toml");
        default.exists().then_some(default)
    }

    fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| Error::io(path.clone(), e))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config at {}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("REDIS_URL") {
            self.redis_url = v;
        }
        if let Ok(v) = env::var("SOLR_URL") {
            self.solr_url = v;
        }
        if let Ok(v) = env::var("THUMBNAIL_DIR") {
            self.thumbnail_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("THUMBNAIL_QUALITY") {
            if let Ok(q) = v.parse() {
                self.thumbnail_quality = q;
            }
        }
        if let Ok(v) = env::var("MOUNT_PATHS") {
            let parsed = Volume::parse_mount_paths(&v);
            if !parsed.is_empty() {
                self.volumes = parsed;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.volumes.is_empty() {
            return Err(Error::Config(
                "at least one volume must be configured via MOUNT_PATHS or the config file"
                    .to_string(),
            ));
        }
        for volume in &self.volumes {
            if !volume.container_root.is_dir() {
                return Err(Error::Config(format!(
                    "configured volume {:?} root {} does not exist or is not a directory",
                    volume.name,
                    volume.container_root.display()
                )));
            }
        }
        if self.thumbnail_quality == 0 || self.thumbnail_quality > 100 {
            return Err(Error::Config(format!(
                "thumbnail_quality must be in 1..=100, got {}",
                self.thumbnail_quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_field_the_distilled_env_surface_leaves_unstated() {
        let config = Config::default();
        assert_eq!(config.debounce_window, Duration::from_secs(5));
        assert_eq!(config.recency_window, Duration::from_secs(7200));
        assert_eq!(config.global_lock_ttl, Duration::from_secs(1800));
        assert_eq!(config.queue_lock_ttl, Duration::from_secs(60));
        assert_eq!(config.rescan_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_take_precedence_over_whatever_was_already_set() {
        let mut config = Config::default();
        unsafe {
            std::env::set_var("REDIS_URL", "redis://test-override:6379");
            std::env::set_var("THUMBNAIL_QUALITY", "42");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("REDIS_URL");
            std::env::remove_var("THUMBNAIL_QUALITY");
        }
        assert_eq!(config.redis_url, "redis://test-override:6379");
        assert_eq!(config.thumbnail_quality, 42);
    }

    #[test]
    fn malformed_thumbnail_quality_env_var_is_ignored_not_fatal() {
        let mut config = Config::default();
        let before = config.thumbnail_quality;
        unsafe { std::env::set_var("THUMBNAIL_QUALITY", "not-a-number") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("THUMBNAIL_QUALITY") };
        assert_eq!(config.thumbnail_quality, before);
    }

    #[test]
    fn validate_rejects_a_config_with_no_volumes() {
        let config = Config::default();
        assert!(config.volumes.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_a_volume_whose_root_is_not_a_directory() {
        let mut config = Config::default();
        config.volumes.push(Volume::new("ghost", "/does/not/exist/anywhere"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_thumbnail_quality() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.volumes.push(Volume::new("v", temp.path()));
        config.thumbnail_quality = 0;
        assert!(config.validate().is_err());
        config.thumbnail_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_a_well_formed_config() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.volumes.push(Volume::new("v", temp.path()));
        assert!(config.validate().is_ok());
    }
}
