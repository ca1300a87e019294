// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FleetImg.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "fleetimg.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub roles: RoleSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// Element roles images may be released for
#[derive(Debug, Clone, Deserialize)]
pub struct RoleSettings {
    #[serde(default = "default_roles")]
    pub known: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/fleetimg.db")
}

fn default_roles() -> Vec<String> {
    ["SPINE", "LEAF", "BORDER", "MANAGEMENT"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_log_filter() -> String {
    "info".to_owned()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            known: default_roles(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            bail!("database.path must be set");
        }
        if self.roles.known.iter().any(|role| role.trim().is_empty()) {
            bail!("roles.known must not contain blank entries");
        }
        Ok(())
    }
}
