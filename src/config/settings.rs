//! Typed engine settings and the reloadable handle.

use flow_exclusive::ExclusivityMatrix;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::effective::{ConfigError, EffectiveConfig};
use crate::observability::LogFormat;

/// Reconciler timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    pub interval_seconds: u64,
    pub expire_interval_seconds: u64,
    pub expire_batch: usize,
}

impl ReconcilerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn expire_interval(&self) -> Duration {
        Duration::from_secs(self.expire_interval_seconds)
    }
}

/// State snapshot access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSettings {
    pub lock_timeout_seconds: u64,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self { lock_timeout_seconds: 30 }
    }
}

impl StateSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

/// Expiry thresholds in days; a negative value disables the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_failed_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_days: Option<i64>,
}

impl ExpireThresholds {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: ExpireThresholds) -> ExpireThresholds {
        ExpireThresholds {
            approval_days: self.approval_days.or(fallback.approval_days),
            execution_failed_days: self.execution_failed_days.or(fallback.execution_failed_days),
            todo_days: self.todo_days.or(fallback.todo_days),
        }
    }
}

/// Exclusivity matrix source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExclusiveSettings {
    #[serde(default)]
    pub matrix: ExclusivityMatrix,
    /// TOML file replacing the inline matrix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
}

/// Immutable engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub skip_human_stages: bool,
    pub system_operator: String,
    pub callback_url: String,
    pub reconciler: ReconcilerSettings,
    /// `default` plus per-ticket-type overrides
    pub expire: BTreeMap<String, ExpireThresholds>,
    /// DBA operators per DB group
    #[serde(default)]
    pub administrators: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub exclusive: ExclusiveSettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// Deserialize from a merged config, loading the matrix file if named.
    pub fn from_effective(config: &EffectiveConfig) -> Result<Self, ConfigError> {
        let mut settings: EngineSettings = serde_json::from_value(config.config.clone())
            .map_err(|e| ConfigError::ParseError(format!("settings: {}", e)))?;
        if let Some(path) = &settings.exclusive.matrix_path {
            settings.exclusive.matrix = ExclusivityMatrix::load(path)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        }
        Ok(settings)
    }

    /// Settings from built-in defaults only.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_effective(&EffectiveConfig::build(None, None)?)
    }

    /// Thresholds for a ticket type, falling back to `default`.
    pub fn thresholds_for(&self, ticket_type: &str) -> ExpireThresholds {
        let fallback = self.expire.get("default").copied().unwrap_or_default();
        match self.expire.get(ticket_type) {
            Some(specific) => specific.or(fallback),
            None => fallback,
        }
    }

    /// Administrators of a DB group.
    pub fn administrators_of(&self, group: &str) -> Vec<String> {
        self.administrators.get(group).cloned().unwrap_or_default()
    }

    /// Callback URL for a ticket.
    pub fn callback_url_for(&self, ticket_id: u64) -> String {
        self.callback_url.replace("{ticket_id}", &ticket_id.to_string())
    }
}

/// Where settings are loaded from, kept for reloads.
#[derive(Debug, Clone, Default)]
pub struct SettingsSources {
    pub config_path: Option<PathBuf>,
    pub cli_overrides: Option<Value>,
}

/// Shared, reloadable settings.
///
/// Readers take an `Arc` snapshot; a reload swaps the whole snapshot.
#[derive(Debug)]
pub struct SettingsHandle {
    sources: SettingsSources,
    current: RwLock<Arc<EngineSettings>>,
}

impl SettingsHandle {
    pub fn load(sources: SettingsSources) -> Result<Self, ConfigError> {
        let settings = Self::build(&sources)?;
        Ok(Self {
            sources,
            current: RwLock::new(Arc::new(settings)),
        })
    }

    /// Handle over fixed settings; `reload` rebuilds from defaults.
    pub fn fixed(settings: EngineSettings) -> Self {
        Self {
            sources: SettingsSources::default(),
            current: RwLock::new(Arc::new(settings)),
        }
    }

    fn build(sources: &SettingsSources) -> Result<EngineSettings, ConfigError> {
        let effective = EffectiveConfig::build(sources.config_path.as_deref(), sources.cli_overrides.clone())?;
        EngineSettings::from_effective(&effective)
    }

    pub fn current(&self) -> Arc<EngineSettings> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Rebuild from the original sources. On error the old settings stay.
    pub fn reload(&self) -> Result<Arc<EngineSettings>, ConfigError> {
        let settings = Arc::new(Self::build(&self.sources)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        tracing::info!("settings reloaded");
        Ok(settings)
    }
}
