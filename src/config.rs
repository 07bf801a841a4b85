//! # Plotter Configuration
//!
//! Per-deployment calibration lives here rather than in code: where the
//! drawing surface sits relative to the arm, which way the axes run, how
//! the applicator is wired, and how hard to push the controller's queue.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [controller]
//! port = "/dev/ttyUSB0"
//! chunk_size = 25
//! buffer_capacity = 32
//!
//! [translate]
//! offset = [107.0, -25.0, 35.0]
//! swap_xy = true
//!
//! [homing]
//! stable_polls = 15
//!
//! [[prime.ops]]
//! op = "set_digital_output"
//! port = 17
//! level = true
//! ```
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.

// src/config.rs - Single configuration file
use crate::operation::{MoveMode, Operation, Pose};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the controller link, translation, homing and job routines.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub translate: TranslateConfig,
    #[serde(default)]
    pub homing: HomingConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub prime: RoutineConfig,
    #[serde(default)]
    pub finish: RoutineConfig,
}

/// Controller link and queue pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Commands the controller can hold in its onboard queue.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Operations submitted per batch; must stay below `buffer_capacity`.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_drain_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default)]
    pub move_mode: MoveMode,
    /// Output level that turns the applicator on. Flip for reversed plumbing.
    #[serde(default = "default_tool_on_level")]
    pub tool_on_level: bool,
    /// Feed rate treated as 100% velocity.
    #[serde(default = "default_max_feed_rate")]
    pub max_feed_rate: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            buffer_capacity: default_buffer_capacity(),
            chunk_size: default_chunk_size(),
            poll_interval_ms: default_drain_poll_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
            response_timeout_ms: default_response_timeout_ms(),
            move_mode: MoveMode::default(),
            tool_on_level: default_tool_on_level(),
            max_feed_rate: default_max_feed_rate(),
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Coordinate mapping from G-code space to arm space.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslateConfig {
    /// Added to every move after the optional axis swap.
    #[serde(default)]
    pub offset: [f64; 3],
    #[serde(default)]
    pub swap_xy: bool,
    #[serde(default = "default_tool_on_marker")]
    pub tool_on_marker: String,
    #[serde(default = "default_tool_off_marker")]
    pub tool_off_marker: String,
    /// Lines containing any of these are dropped before parsing.
    #[serde(default = "default_skip_markers")]
    pub skip_markers: Vec<String>,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            offset: [0.0; 3],
            swap_xy: false,
            tool_on_marker: default_tool_on_marker(),
            tool_off_marker: default_tool_off_marker(),
            skip_markers: default_skip_markers(),
        }
    }
}

/// Homing completion heuristic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HomingConfig {
    #[serde(default = "default_homing_poll_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive identical pose readings that count as settled.
    #[serde(default = "default_stable_polls")]
    pub stable_polls: u32,
    #[serde(default = "default_homing_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub home_pose: Option<Pose>,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_homing_poll_ms(),
            stable_polls: default_stable_polls(),
            timeout_secs: default_homing_timeout_secs(),
            home_pose: None,
        }
    }
}

impl HomingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// What happens after the plot itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    /// Where to move the arm once the plot is done, clear of the surface.
    #[serde(default)]
    pub park: Option<[f64; 3]>,
    #[serde(default)]
    pub cook_secs: u64,
    #[serde(default = "default_cook_report_secs")]
    pub cook_report_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            park: None,
            cook_secs: 0,
            cook_report_secs: default_cook_report_secs(),
        }
    }
}

/// A fixed operation list run outside the main plot.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutineConfig {
    #[serde(default)]
    pub ops: Vec<Operation>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        if c.chunk_size == 0 {
            return Err(ConfigError::Invalid("controller.chunk_size must be > 0".to_string()));
        }
        if c.chunk_size >= c.buffer_capacity {
            return Err(ConfigError::Invalid(format!(
                "controller.chunk_size ({}) must be smaller than controller.buffer_capacity ({})",
                c.chunk_size, c.buffer_capacity
            )));
        }
        if c.poll_interval_ms == 0 || self.homing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be > 0".to_string()));
        }
        if c.drain_timeout_secs == 0 || self.homing.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".to_string()));
        }
        if self.homing.stable_polls == 0 {
            return Err(ConfigError::Invalid("homing.stable_polls must be > 0".to_string()));
        }
        if c.max_feed_rate <= 0.0 {
            return Err(ConfigError::Invalid("controller.max_feed_rate must be > 0".to_string()));
        }
        if self.translate.tool_on_marker.is_empty() || self.translate.tool_off_marker.is_empty() {
            return Err(ConfigError::Invalid("tool markers must not be empty".to_string()));
        }
        Ok(())
    }
}

// Default value functions
fn default_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_buffer_capacity() -> usize { 32 }
fn default_chunk_size() -> usize { 25 }
fn default_drain_poll_ms() -> u64 { 200 }
fn default_drain_timeout_secs() -> u64 { 600 }
fn default_response_timeout_ms() -> u64 { 1000 }
fn default_tool_on_level() -> bool { false }
fn default_max_feed_rate() -> f64 { 6000.0 }
fn default_tool_on_marker() -> String { "M106".to_string() }
fn default_tool_off_marker() -> String { "M107".to_string() }
fn default_skip_markers() -> Vec<String> { vec!["Help homing".to_string()] }
fn default_homing_poll_ms() -> u64 { 100 }
fn default_stable_polls() -> u32 { 15 }
fn default_homing_timeout_secs() -> u64 { 120 }
fn default_cook_report_secs() -> u64 { 15 }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.controller.baud, 115200);
        assert_eq!(config.controller.chunk_size, 25);
        assert_eq!(config.controller.buffer_capacity, 32);
        assert_eq!(config.controller.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.translate.offset, [0.0; 3]);
        assert!(!config.translate.swap_xy);
        assert_eq!(config.translate.tool_on_marker, "M106");
        assert_eq!(config.homing.stable_polls, 15);
        assert_eq!(config.homing.poll_interval(), Duration::from_millis(100));
        assert!(config.prime.ops.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[controller]\nport = 'COM4'\nmove_mode = 'joint'\n\n[translate]\noffset = [107.0, -25.0, 35.0]\nswap_xy = true"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(&file_path).unwrap();
        assert_eq!(config.controller.port, "COM4");
        assert_eq!(config.controller.move_mode, MoveMode::Joint);
        assert_eq!(config.translate.offset, [107.0, -25.0, 35.0]);
        assert!(config.translate.swap_xy);
        // Defaults for missing fields
        assert_eq!(config.controller.chunk_size, 25);
        assert_eq!(config.translate.tool_off_marker, "M107");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("nonexistent_file.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(&file_path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("griddle.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.translate.offset, [107.0, -25.0, 35.0]);
        assert_eq!(config.job.park, Some([50.0, -200.0, 100.0]));
        assert_eq!(config.prime.ops.len(), 5);
        assert_eq!(config.finish.ops.len(), 6);
        assert_eq!(config.finish.ops[3], Operation::Wait { duration_ms: 1000 });
        assert_eq!(config.job.cook_secs, 105);
    }

    #[test]
    fn test_chunk_must_fit_buffer() {
        let mut config = Config::default();
        config.controller.chunk_size = 32;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.controller.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.controller.chunk_size = 31;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_routines_and_home_pose() {
        let toml = r#"
        [homing]
        home_pose = { x = 200.0, y = 0.0, z = 0.0 }

        [job]
        park = [-100.0, -175.0, 100.0]
        cook_secs = 105

        [[prime.ops]]
        op = "set_digital_output"
        port = 17
        level = true

        [[prime.ops]]
        op = "wait"
        duration_ms = 300

        [[finish.ops]]
        op = "home"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.homing.home_pose, Some(Pose::new(200.0, 0.0, 0.0, 0.0)));
        assert_eq!(config.job.park, Some([-100.0, -175.0, 100.0]));
        assert_eq!(config.job.cook_secs, 105);
        assert_eq!(config.prime.ops.len(), 2);
        assert_eq!(config.finish.ops, vec![Operation::Home]);
        assert!(config.validate().is_ok());
    }
}
