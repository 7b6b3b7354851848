use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;
use ward_runtime::{
    AllowancePolicy, CalendarConfig, CalendarError, CycleCalendar, IdeologyTuning, OddsTuning,
    PayoutTuning, PowerTuning,
};
use ward_schema::ResourceBundle;

use crate::retry::RetryPolicy;

pub const BUILTIN_ENGINE_CONFIG: &str = include_str!("data/engine_config.json");

/// Every tunable the engine reads, grouped by the component that owns it.
#[derive(Resource, Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    allowances: AllowancePolicy,
    odds: OddsTuning,
    ideology: IdeologyTuning,
    joint: JointConfig,
    payout: PayoutTuning,
    economy: EconomyConfig,
    control: ControlConfig,
    calendar: CalendarConfig,
    retry: RetryPolicy,
    server: ServerConfig,
}

impl EngineConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_ENGINE_CONFIG)
                .expect("builtin engine config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.calendar()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| EngineConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        EngineConfig::from_json_str(&contents)
    }

    pub fn allowances(&self) -> &AllowancePolicy {
        &self.allowances
    }

    pub fn odds(&self) -> &OddsTuning {
        &self.odds
    }

    pub fn ideology(&self) -> &IdeologyTuning {
        &self.ideology
    }

    pub fn joint(&self) -> &JointConfig {
        &self.joint
    }

    pub fn payout(&self) -> &PayoutTuning {
        &self.payout
    }

    pub fn economy(&self) -> &EconomyConfig {
        &self.economy
    }

    pub fn control(&self) -> &ControlConfig {
        &self.control
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn calendar(&self) -> Result<CycleCalendar, CalendarError> {
        CycleCalendar::new(&self.calendar)
    }

    pub fn calendar_config(&self) -> &CalendarConfig {
        &self.calendar
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_economy(mut self, economy: EconomyConfig) -> Self {
        self.economy = economy;
        self
    }

    pub fn with_joint(mut self, joint: JointConfig) -> Self {
        self.joint = joint;
        self
    }
}

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read engine config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid cycle calendar: {0}")]
    Calendar(#[from] CalendarError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JointConfig {
    pub power: PowerTuning,
    pub ttl_minutes: i64,
    pub min_participants: u8,
    pub min_units: u32,
    pub retention_hours: i64,
    pub defense_cap_pct: u8,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            power: PowerTuning::default(),
            ttl_minutes: 120,
            min_participants: 2,
            min_units: 1,
            retention_hours: 24,
            defense_cap_pct: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub starting_wallet: ResourceBundle,
    pub exchange_ratio: u32,
    pub min_main_units: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_wallet: ResourceBundle::uniform(5),
            exchange_ratio: 2,
            min_main_units: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub decay_per_cycle: u8,
    pub defense_success_pct: u8,
    pub defense_partial_pct: u8,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            decay_per_cycle: 5,
            defense_success_pct: 50,
            defense_partial_pct: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command_bind: SocketAddr,
    pub submission_workers: usize,
    pub snapshot_path: Option<PathBuf>,
    pub timer_poll_ms: u64,
    pub seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 41100),
            submission_workers: 4,
            snapshot_path: None,
            timer_poll_ms: 1_000,
            seed: 0x5eed,
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct EngineConfigMetadata {
    path: Option<PathBuf>,
}

impl EngineConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_engine_config_from_env() -> (Arc<EngineConfig>, EngineConfigMetadata) {
    let override_path = env::var("WARD_CONFIG_PATH").ok().map(PathBuf::from);

    if let Some(path) = override_path {
        match EngineConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "ward::config",
                    path = %path.display(),
                    "engine_config.loaded=file"
                );
                return (Arc::new(config), EngineConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "ward::config",
                    path = %path.display(),
                    error = %err,
                    "engine_config.load_failed"
                );
            }
        }
    }

    let config = EngineConfig::builtin();
    tracing::info!(target: "ward::config", "engine_config.loaded=builtin");
    (config, EngineConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        let config = EngineConfig::builtin();
        assert_eq!(config.allowances().main_per_window, 1);
        assert_eq!(config.allowances().quick_per_window, 2);
        assert_eq!(config.allowances().refresh_minutes, 180);
        assert_eq!(config.payout().participation_floor, 10);
        assert_eq!(config.control().decay_per_cycle, 5);
        assert_eq!(config.economy().exchange_ratio, 2);
        assert_eq!(config.joint().min_participants, 2);
        assert!(config.calendar().is_ok());
    }

    #[test]
    fn partial_json_keeps_section_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "control": { "decay_per_cycle": 3 } }"#).unwrap();
        assert_eq!(config.control().decay_per_cycle, 3);
        assert_eq!(config.control().defense_success_pct, 50);
        assert_eq!(config.odds().success_cut, 70);
    }

    #[test]
    fn invalid_calendar_is_rejected() {
        let json = r#"{ "calendar": { "first": { "deadline": "14:00:00", "results": "13:00:00" } } }"#;
        assert!(matches!(
            EngineConfig::from_json_str(json),
            Err(EngineConfigError::Calendar(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/ward.json")).unwrap_err();
        assert!(matches!(err, EngineConfigError::ReadFailed { .. }));
    }
}
