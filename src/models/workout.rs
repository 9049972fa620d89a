use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of session, shared by logged workouts and plan items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutType {
  Run,
  Gym,
  Rest,
}

impl WorkoutType {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkoutType::Run => "run",
      WorkoutType::Gym => "gym",
      WorkoutType::Rest => "rest",
    }
  }
}

impl std::fmt::Display for WorkoutType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for WorkoutType {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "run" => Ok(Self::Run),
      "gym" => Ok(Self::Gym),
      "rest" => Ok(Self::Rest),
      other => Err(format!("Unknown workout type: {}", other)),
    }
  }
}

/// Where a log entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutSource {
  #[default]
  Manual,
  Strava,
}

impl WorkoutSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkoutSource::Manual => "manual",
      WorkoutSource::Strava => "strava",
    }
  }
}

impl std::fmt::Display for WorkoutSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for WorkoutSource {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "manual" => Ok(Self::Manual),
      "strava" => Ok(Self::Strava),
      other => Err(format!("Unknown workout source: {}", other)),
    }
  }
}

/// A logged workout. At most one per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
  pub date: NaiveDate,
  #[serde(rename = "type")]
  pub workout_type: WorkoutType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub minutes: Option<u32>,
  /// Perceived effort, 1-10
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rpe: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(default)]
  pub source: WorkoutSource,
}

impl Workout {
  /// Manual entry with no optional fields set
  pub fn manual(date: NaiveDate, workout_type: WorkoutType) -> Self {
    Self {
      date,
      workout_type,
      minutes: None,
      rpe: None,
      notes: None,
      source: WorkoutSource::Manual,
    }
  }

  pub fn with_minutes(mut self, minutes: u32) -> Self {
    self.minutes = Some(minutes);
    self
  }

  pub fn with_rpe(mut self, rpe: f64) -> Self {
    self.rpe = Some(rpe);
    self
  }
}
