use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WorkoutType;

/// One day of the plan, either generated or taken from an override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
  #[serde(rename = "type")]
  pub plan_type: WorkoutType,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_minutes: Option<i32>,
  /// Effort range, e.g. "6-7"
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rpe: Option<String>,
  pub details: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub coach_note: Option<String>,
  #[serde(default)]
  pub is_override: bool,
}

/// A stored replacement for the generated plan on one date.
///
/// Overrides are written whole; a new override for the same date replaces the
/// previous one. Content is not validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOverride {
  #[serde(rename = "type")]
  pub plan_type: WorkoutType,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_minutes: Option<i32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rpe: Option<String>,
  #[serde(default)]
  pub details: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub coach_note: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl PlanOverride {
  pub fn to_plan_item(&self) -> PlanItem {
    PlanItem {
      plan_type: self.plan_type,
      title: self.title.clone(),
      target_minutes: self.target_minutes,
      rpe: self.rpe.clone(),
      details: self.details.clone(),
      coach_note: self.coach_note.clone(),
      is_override: true,
    }
  }
}

/// Who wrote an override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAuthor {
  Manual,
  Coach,
}

impl std::fmt::Display for OverrideAuthor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Manual => write!(f, "manual"),
      Self::Coach => write!(f, "coach"),
    }
  }
}

impl std::str::FromStr for OverrideAuthor {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "manual" => Ok(Self::Manual),
      "coach" => Ok(Self::Coach),
      _ => Err(format!("Unknown override author: {}", s)),
    }
  }
}
