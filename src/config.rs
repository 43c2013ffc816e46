// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_CONFIG_PATH: &str = "QUIZSYNC_CONFIG_PATH";
const ENV_DATA_DIR: &str = "QUIZSYNC_DATA_DIR";
const ENV_THRESHOLD: &str = "CONFIDENCE_THRESHOLD";
const DEFAULT_CONFIG_PATH: &str = "config/quizsync.toml";

/// A monitored source-specific container (chat group or feed page) with an
/// associated default city.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Publish-vs-flag cutoff applied to extraction confidence.
    pub confidence_threshold: f32,
    /// Drain quiescence window; the absolute drain cap is 3x this.
    pub quiet_period_secs: u64,
    /// Max seconds to wait for the session to reach the open state.
    pub connect_timeout_secs: u64,
    /// Pairing window for consecutive image+text merging.
    pub merge_window_secs: i64,
    /// Name similarity cutoff for fuzzy dedup.
    pub similarity_threshold: f32,
    /// Bound on silent restarts after a restart-required disconnect.
    pub max_restart_attempts: u32,
    pub data_dir: PathBuf,
    /// Monitored chat groups.
    pub channels: Vec<ChannelConfig>,
    /// Monitored feed pages.
    pub feed_pages: Vec<ChannelConfig>,
    /// Out-of-process feed scraper invocation; feed source is skipped when
    /// unset.
    pub scraper_command: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            quiet_period_secs: 15,
            connect_timeout_secs: 60,
            merge_window_secs: 120,
            similarity_threshold: 0.75,
            max_restart_attempts: 3,
            data_dir: PathBuf::from("data"),
            channels: Vec::new(),
            feed_pages: Vec::new(),
            scraper_command: None,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $QUIZSYNC_CONFIG_PATH
    /// 2) config/quizsync.toml
    /// 3) built-in defaults
    /// then apply env overrides for the hot knobs.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::from_toml_file(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::from_toml_file(&default)?
            } else {
                Self::default()
            }
        };

        if let Ok(v) = std::env::var(ENV_THRESHOLD) {
            cfg.confidence_threshold = v
                .parse()
                .with_context(|| format!("{ENV_THRESHOLD} must be a float, got {v:?}"))?;
        }
        if let Ok(v) = std::env::var(ENV_DATA_DIR) {
            cfg.data_dir = PathBuf::from(v);
        }
        Ok(cfg)
    }

    pub fn quiet_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.quiet_period_secs)
    }

    /// Hard cap on draining, per the bounded-wait policy.
    pub fn drain_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.quiet_period_secs * 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn toml_with_channels_parses() {
        let toml = r#"
            confidence_threshold = 0.6
            quiet_period_secs = 12

            [[channels]]
            id = "group-a"
            city = "Delhi"

            [[channels]]
            id = "group-b"

            [[feed_pages]]
            id = "delhiquizzes"
            city = "Delhi"
        "#;
        let cfg: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.confidence_threshold, 0.6);
        assert_eq!(cfg.quiet_period_secs, 12);
        assert_eq!(cfg.channels.len(), 2);
        assert_eq!(cfg.channels[0].city.as_deref(), Some("Delhi"));
        assert!(cfg.channels[1].city.is_none());
        assert_eq!(cfg.feed_pages[0].id, "delhiquizzes");
        // Untouched knobs keep defaults.
        assert_eq!(cfg.max_restart_attempts, 3);
    }

    #[serial_test::serial]
    #[test]
    fn env_threshold_overrides_file_value() {
        env::remove_var(ENV_CONFIG_PATH);
        env::set_var(ENV_THRESHOLD, "0.55");
        let cfg = SyncConfig::load().unwrap();
        assert_eq!(cfg.confidence_threshold, 0.55);
        env::remove_var(ENV_THRESHOLD);
    }

    #[serial_test::serial]
    #[test]
    fn missing_env_path_is_an_error() {
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        assert!(SyncConfig::load().is_err());
        env::remove_var(ENV_CONFIG_PATH);
    }

    #[test]
    fn drain_deadline_is_three_quiet_periods() {
        let cfg = SyncConfig {
            quiet_period_secs: 10,
            ..SyncConfig::default()
        };
        assert_eq!(cfg.drain_deadline().as_secs(), 30);
    }
}
