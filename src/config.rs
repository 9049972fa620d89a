//! Process configuration, read once at start-up.
//!
//! Required values fail fast instead of falling back to defaults. Settings that
//! only matter to one integration (Strava, the LLM coach) are loaded by that
//! integration when it is used.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::periodization::{self, ProgramMeta};

pub const PLAN_START_DATE_VAR: &str = "PLAN_START_DATE";
pub const RACE_DATE_VAR: &str = "RACE_DATE";
pub const DATABASE_PATH_VAR: &str = "TRAINING_LOG_DB";

const DATABASE_FILE: &str = "training-log.db";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("Missing configuration: {0}")]
  Missing(String),

  #[error("Invalid date in {var}: {value:?} (expected YYYY-MM-DD)")]
  InvalidDate { var: String, value: String },
}

/// The two dates every plan computation is anchored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
  pub start_date: NaiveDate,
  pub race_date: NaiveDate,
}

impl ProgramConfig {
  pub fn new(start_date: NaiveDate, race_date: NaiveDate) -> Self {
    Self {
      start_date,
      race_date,
    }
  }

  pub fn from_env() -> Result<Self, ConfigError> {
    Ok(Self {
      start_date: required_date(PLAN_START_DATE_VAR)?,
      race_date: required_date(RACE_DATE_VAR)?,
    })
  }

  pub fn meta_for(&self, date: NaiveDate) -> ProgramMeta {
    periodization::program_meta(date, self.start_date, self.race_date)
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub program: ProgramConfig,
  pub database_path: PathBuf,
}

impl AppConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let program = ProgramConfig::from_env()?;
    let database_path = env::var(DATABASE_PATH_VAR)
      .ok()
      .filter(|v| !v.trim().is_empty())
      .map(PathBuf::from)
      .unwrap_or_else(default_database_path);

    Ok(Self {
      program,
      database_path,
    })
  }
}

/// Platform data directory, e.g. ~/.local/share/training-log/training-log.db
pub fn default_database_path() -> PathBuf {
  directories::ProjectDirs::from("com", "traininglog", "training-log")
    .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
    .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
}

pub fn parse_iso_date(var: &str, value: &str) -> Result<NaiveDate, ConfigError> {
  NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
    var: var.to_string(),
    value: value.to_string(),
  })
}

fn required_date(var: &str) -> Result<NaiveDate, ConfigError> {
  let value = env::var(var).map_err(|_| ConfigError::Missing(var.to_string()))?;
  if value.trim().is_empty() {
    return Err(ConfigError::Missing(var.to_string()));
  }
  parse_iso_date(var, &value)
}
