use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::events::FrameId;

pub const DEFAULT_MAX_RETRIES: u32 = 4;
const DEFAULT_SCRIPT_ID: &str = "show_total_lesson_count";
const DEFAULT_SCRIPT_NAME: &str = "Show Total Lesson Count";
const DEFAULT_LOCATIONS: &[&str] = &["https://www.wanikani.com/", "https://www.wanikani.com/dashboard"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read coordinator config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse location URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    script_id: String,
    script_name: String,
    max_retries: u32,
    settings_retry_delay_ms: u64,
    check_delay_ms: u64,
    target_frame: String,
    tracked_frames: Vec<String>,
    locations: Vec<String>,
    debug_log_capacity: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            script_id: DEFAULT_SCRIPT_ID.to_string(),
            script_name: DEFAULT_SCRIPT_NAME.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            settings_retry_delay_ms: 50,
            check_delay_ms: 0,
            target_frame: FrameId::TODAYS_LESSONS.to_string(),
            tracked_frames: vec![
                FrameId::TODAYS_LESSONS.to_string(),
                FrameId::LESSON_AND_REVIEW_COUNT.to_string(),
            ],
            locations: DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect(),
            debug_log_capacity: 256,
        }
    }
}

/// Tunables for the initialization coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub script_id: String,
    pub script_name: String,
    pub max_retries: u32,
    /// Spacing between deferred starts while settings are still loading.
    pub settings_retry_delay: Duration,
    /// Pause between alternate-verification checks. Zero yields to the
    /// scheduler without sleeping.
    pub check_delay: Duration,
    /// Frame that contains the render target.
    pub target_frame: FrameId,
    pub tracked_frames: Vec<FrameId>,
    /// Pages whose lifecycle events the coordinator subscribes to.
    pub locations: Vec<Url>,
    pub debug_log_capacity: usize,
}

impl CoordinatorConfig {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let raw = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str::<RawConfig>(&contents)?
            }
            _ => RawConfig::default(),
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let locations = raw
            .locations
            .iter()
            .map(|url| Url::parse(url))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            script_id: raw.script_id,
            script_name: raw.script_name,
            max_retries: raw.max_retries,
            settings_retry_delay: Duration::from_millis(raw.settings_retry_delay_ms),
            check_delay: Duration::from_millis(raw.check_delay_ms),
            target_frame: FrameId::new(raw.target_frame),
            tracked_frames: raw.tracked_frames.into_iter().map(FrameId::new).collect(),
            locations,
            debug_log_capacity: raw.debug_log_capacity.max(1),
        })
    }

    pub fn is_tracked(&self, frame: &FrameId) -> bool {
        self.tracked_frames.iter().any(|tracked| tracked == frame)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default()).expect("default locations are valid URLs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_default() {
        let config = CoordinatorConfig::load(None).unwrap();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.settings_retry_delay, Duration::from_millis(50));
        assert_eq!(config.target_frame.as_str(), "todays-lessons-frame");
        assert!(config.is_tracked(&FrameId::new("lesson-and-review-count-frame")));
        assert!(!config.is_tracked(&FrameId::new("reviews-frame")));
    }

    #[test]
    fn loads_from_file_with_partial_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(
            file,
            "max_retries: 2\ncheck_delay_ms: 5\nlocations:\n  - https://example.test/dashboard"
        )
        .unwrap();
        let config = CoordinatorConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.check_delay, Duration::from_millis(5));
        assert_eq!(config.locations.len(), 1);
        assert_eq!(config.script_id, "show_total_lesson_count");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            CoordinatorConfig::load(Some(PathBuf::from("/nonexistent/lesson-tally.yaml"))).unwrap();
        assert_eq!(config.tracked_frames.len(), 2);
    }

    #[test]
    fn rejects_invalid_location() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "locations:\n  - not a url").unwrap();
        assert!(CoordinatorConfig::load(Some(file.path().to_path_buf())).is_err());
    }
}
