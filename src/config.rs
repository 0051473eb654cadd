use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::{AgentConfig, CliVariant, SessionMode, DEFAULT_TIMEOUT_SECS};
use crate::{dlog_debug, Error, Result};

/// One `[[agents]]` entry in drover.toml.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEntry {
    pub id: String,
    pub name: String,
    pub cli: CliVariant,
    pub working_dir: String,
    #[serde(default)]
    pub session: SessionMode,
    pub timeout_secs: Option<u64>,
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FleetConfig {
    pub default_timeout_secs: Option<u64>,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

impl FleetConfig {
    pub fn drover_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".drover"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::drover_dir()?.join("drover.toml"))
    }

    pub fn effective_default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Load ~/.drover/drover.toml, or an empty fleet if it does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            dlog_debug!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        dlog_debug!("FleetConfig::load_from path={}", path.display());
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        dlog_debug!("Config loaded: {} agents", config.agents.len());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::drover_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        dlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == Some(0) {
            return Err(Error::Validation(
                "default_timeout_secs must be positive".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for agent in self.agent_configs()? {
            agent.validate()?;
            if !seen.insert(agent.id.clone()) {
                return Err(Error::Validation(format!("duplicate agent id: {}", agent.id)));
            }
        }
        Ok(())
    }

    /// Resolve entries into registration-ready configs.
    pub fn agent_configs(&self) -> Result<Vec<AgentConfig>> {
        let default_timeout = self.effective_default_timeout();
        self.agents
            .iter()
            .map(|entry| {
                let timeout = match entry.timeout_secs {
                    Some(0) => {
                        return Err(Error::Validation(format!(
                            "agent {}: timeout_secs must be positive",
                            entry.id
                        )))
                    }
                    Some(secs) => Duration::from_secs(secs),
                    None => default_timeout,
                };
                Ok(AgentConfig {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    variant: entry.cli,
                    working_dir: expand_tilde(&entry.working_dir),
                    env: entry.env.clone(),
                    session_mode: entry.session,
                    timeout,
                    command: entry.command.clone(),
                })
            })
            .collect()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
