//! Configuration merge system
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in engine defaults
//! 2. Engine config file (TOML)
//! 3. CLI overrides
//!
//! The merged value deserializes into [`EngineSettings`], held behind a
//! reloadable [`SettingsHandle`].

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    EngineSettings, ExclusiveSettings, ExpireThresholds, LoggingSettings, ReconcilerSettings, SettingsHandle,
    SettingsSources, StateSettings,
};
