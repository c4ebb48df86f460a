//! Configuration and settings management for plotkit
//!
//! Configuration is organized into sections:
//! - Connection settings (controller address, reconnect, streaming window)
//! - Plot settings (target area, feeds, pen heights)
//! - Optimizer tolerances and stage toggles
//! - Backlash compensation
//! - Dip (tool service) scheduling
//!
//! Files are TOML or JSON, chosen by extension. Every section has defaults,
//! so a file only needs the values it changes.

use crate::error::{SettingsError, SettingsResult};
use plotkit_camtools::{
    BacklashOptions, DipOptions, EmitterOptions, OptimizerOptions, Point,
};
use plotkit_communication::communication::normalize_address;
use plotkit_communication::{LinkConfig, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "plotkit";
const CONFIG_FILE: &str = "config.toml";

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Controller WebSocket address (`ws://host:port` or `host:port`)
    pub address: String,
    /// Reconnect after an unexpected close
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
    /// Unacknowledged lines allowed in flight while streaming
    pub max_pending: usize,
    /// Progress tick period while streaming
    pub tick_interval_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: "ws://192.168.0.1:81".to_string(),
            auto_reconnect: true,
            reconnect_interval_ms: 5000,
            max_pending: 4,
            tick_interval_ms: 1000,
        }
    }
}

/// Output area and motion settings, in millimeters and mm/min
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    pub fit_to_target: bool,
    pub target_width: f64,
    pub target_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub flip_y: bool,
    pub feed_rate: f64,
    pub rapid_rate: f64,
    pub pen_up_z: f64,
    pub pen_down_z: f64,
    pub return_home: bool,
}

impl Default for PlotSettings {
    fn default() -> Self {
        let defaults = EmitterOptions::default();
        Self {
            fit_to_target: defaults.fit_to_target,
            target_width: defaults.target_width,
            target_height: defaults.target_height,
            offset_x: defaults.offset.x,
            offset_y: defaults.offset.y,
            flip_y: defaults.flip_y,
            feed_rate: defaults.feed_rate,
            rapid_rate: defaults.rapid_rate,
            pen_up_z: defaults.pen_up_z,
            pen_down_z: defaults.pen_down_z,
            return_home: defaults.return_home,
        }
    }
}

/// Optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub line_tolerance: f64,
    pub point_tolerance: f64,
    pub simplify_tolerance: f64,
    /// Artefact filter threshold; 0 keeps every path
    pub min_path_length: f64,
    pub remove_artefacts: bool,
    pub remove_duplicates: bool,
    pub simplify: bool,
    pub merge: bool,
    pub reorder: bool,
    pub start_x: f64,
    pub start_y: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        let defaults = OptimizerOptions::default();
        Self {
            line_tolerance: defaults.line_tolerance,
            point_tolerance: defaults.point_tolerance,
            simplify_tolerance: defaults.simplify_tolerance,
            min_path_length: defaults.min_path_length,
            remove_artefacts: defaults.remove_artefacts,
            remove_duplicates: defaults.remove_duplicates,
            simplify: defaults.simplify,
            merge: defaults.merge,
            reorder: defaults.reorder,
            start_x: defaults.start_point.x,
            start_y: defaults.start_point.y,
        }
    }
}

impl OptimizerSettings {
    pub fn to_options(&self) -> OptimizerOptions {
        OptimizerOptions {
            line_tolerance: self.line_tolerance,
            point_tolerance: self.point_tolerance,
            simplify_tolerance: self.simplify_tolerance,
            min_path_length: self.min_path_length,
            remove_artefacts: self.remove_artefacts,
            remove_duplicates: self.remove_duplicates,
            simplify: self.simplify,
            merge: self.merge,
            reorder: self.reorder,
            start_point: Point::new(self.start_x, self.start_y),
        }
    }
}

/// Backlash settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklashSettings {
    pub x: f64,
    pub y: f64,
    pub threshold: f64,
}

impl Default for BacklashSettings {
    fn default() -> Self {
        let defaults = BacklashOptions::default();
        Self {
            x: defaults.x,
            y: defaults.y,
            threshold: defaults.threshold,
        }
    }
}

/// Dip (tool service) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DipSettings {
    pub enabled: bool,
    /// Pen-down distance between services
    pub interval: f64,
    pub station_x: f64,
    pub station_y: f64,
    pub depth_z: f64,
    /// Seconds at the station
    pub dwell: f64,
    /// Custom service sequence; replaces the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Continuous plotting never services the tool
    pub continuous: bool,
}

impl Default for DipSettings {
    fn default() -> Self {
        let defaults = DipOptions::default();
        Self {
            enabled: defaults.enabled,
            interval: defaults.interval,
            station_x: defaults.station.x,
            station_y: defaults.station.y,
            depth_z: defaults.depth_z,
            dwell: defaults.dwell,
            template: defaults.template,
            continuous: defaults.continuous,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub plot: PlotSettings,
    pub optimizer: OptimizerSettings,
    pub backlash: BacklashSettings,
    pub dip: DipSettings,
}

enum Format {
    Toml,
    Json,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Format::Toml),
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Format::Json),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("(none)").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `<platform config dir>/plotkit/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load and validate a config file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            Format::Toml => toml::from_str(&content)?,
            Format::Json => serde_json::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Ok(default) if default.exists() => Self::load_from_file(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Validate and save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Toml => toml::to_string_pretty(self)?,
            Format::Json => serde_json::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::ConfigDirectory(e.to_string()))?;
        }
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        normalize_address(&self.connection.address)
            .map_err(|e| SettingsError::invalid("connection.address", e.to_string()))?;

        if self.connection.reconnect_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.reconnect_interval_ms",
                "must be > 0",
            ));
        }
        if self.connection.max_pending == 0 {
            return Err(SettingsError::invalid(
                "connection.max_pending",
                "must be at least 1",
            ));
        }
        if self.connection.tick_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.tick_interval_ms",
                "must be > 0",
            ));
        }

        self.emitter_options()
            .validate()
            .map_err(|e| SettingsError::invalid("plot", e.to_string()))
    }

    pub fn emitter_options(&self) -> EmitterOptions {
        let plot = &self.plot;
        EmitterOptions {
            fit_to_target: plot.fit_to_target,
            target_width: plot.target_width,
            target_height: plot.target_height,
            offset: Point::new(plot.offset_x, plot.offset_y),
            flip_y: plot.flip_y,
            feed_rate: plot.feed_rate,
            rapid_rate: plot.rapid_rate,
            pen_up_z: plot.pen_up_z,
            pen_down_z: plot.pen_down_z,
            return_home: plot.return_home,
            optimizer: self.optimizer.to_options(),
            backlash: BacklashOptions {
                x: self.backlash.x,
                y: self.backlash.y,
                threshold: self.backlash.threshold,
            },
            dip: DipOptions {
                enabled: self.dip.enabled,
                interval: self.dip.interval,
                station: Point::new(self.dip.station_x, self.dip.station_y),
                depth_z: self.dip.depth_z,
                dwell: self.dip.dwell,
                template: self.dip.template.clone(),
                continuous: self.dip.continuous,
            },
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            address: self.connection.address.clone(),
            auto_reconnect: self.connection.auto_reconnect,
            reconnect_interval: Duration::from_millis(self.connection.reconnect_interval_ms),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_pending: self.connection.max_pending,
            tick_interval: Duration::from_millis(self.connection.tick_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.emitter_options(), EmitterOptions::default());
        assert_eq!(config.stream_config(), StreamConfig::default());
        assert_eq!(config.link_config(), LinkConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("plotkit.toml");

        let mut config = Config::default();
        config.connection.address = "plotter.local:81".to_string();
        config.backlash.x = 0.4;
        config.dip.enabled = true;
        config.dip.template = Some("G0 X10 Y10\nG1 Z-1 F300".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plotkit.json");

        let mut config = Config::default();
        config.plot.feed_rate = 2400.0;
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[connection]\naddress = \"ws://10.0.0.5:81\"\n\n[dip]\nenabled = true\ninterval = 150.0\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.connection.address, "ws://10.0.0.5:81");
        assert_eq!(config.connection.max_pending, 4);
        assert!(config.dip.enabled);
        assert_eq!(config.emitter_options().dip.interval, 150.0);
        assert_eq!(config.plot, PlotSettings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plotkit.yaml");
        assert!(matches!(
            Config::default().save_to_file(&path),
            Err(SettingsError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SettingsError::LoadError { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.connection.max_pending = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "connection.max_pending"
        ));

        let mut config = Config::default();
        config.plot.feed_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.optimizer.point_tolerance = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.address = "http://plotter".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_not_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        let mut config = Config::default();
        config.plot.pen_up_z = -5.0;
        assert!(config.save_to_file(&path).is_err());
        assert!(!path.exists());
    }
}
