//! Plotkit Settings Crate
//!
//! Loads, validates and saves the plotkit configuration file and converts
//! its sections into the option types of the toolpath and streaming crates.

pub mod config;
pub mod error;

pub use config::{
    BacklashSettings, Config, ConnectionSettings, DipSettings, OptimizerSettings, PlotSettings,
};
pub use error::{SettingsError, SettingsResult};
