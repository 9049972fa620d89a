//! Actual-vs-planned export rows, rendered as CSV or JSON.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::ProgramConfig;
use crate::models::{Workout, WorkoutType};
use crate::plan::plan_for_date;

const CSV_HEADER: [&str; 9] = [
  "date",
  "actual_type",
  "actual_minutes",
  "actual_rpe",
  "actual_notes",
  "planned_type",
  "planned_title",
  "planned_minutes",
  "planned_rpe",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
  Csv,
  Json,
}

impl std::str::FromStr for ExportFormat {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "csv" => Ok(Self::Csv),
      "json" => Ok(Self::Json),
      other => Err(format!("Unknown export format: {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
  pub date: NaiveDate,
  pub actual_type: WorkoutType,
  pub actual_minutes: Option<u32>,
  pub actual_rpe: Option<f64>,
  pub actual_notes: Option<String>,
  pub planned_type: WorkoutType,
  pub planned_title: String,
  pub planned_minutes: Option<i32>,
  pub planned_rpe: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonExport<'a> {
  rows: &'a [ExportRow],
}

/// Logged workouts within the inclusive `[from, to]` window, oldest first,
/// each paired with the generated plan for its date
pub fn export_rows(
  workouts: &[Workout],
  from: Option<NaiveDate>,
  to: Option<NaiveDate>,
  program: &ProgramConfig,
) -> Vec<ExportRow> {
  let mut selected: Vec<&Workout> = workouts
    .iter()
    .filter(|w| from.map_or(true, |f| w.date >= f))
    .filter(|w| to.map_or(true, |t| w.date <= t))
    .collect();
  selected.sort_by_key(|w| w.date);

  selected
    .into_iter()
    .map(|w| {
      let planned = plan_for_date(w.date, program);
      ExportRow {
        date: w.date,
        actual_type: w.workout_type,
        actual_minutes: w.minutes,
        actual_rpe: w.rpe,
        actual_notes: w.notes.clone(),
        planned_type: planned.plan_type,
        planned_title: planned.title,
        planned_minutes: planned.target_minutes,
        planned_rpe: planned.rpe,
      }
    })
    .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("CSV output is not UTF-8: {0}")]
  Utf8(#[from] std::string::FromUtf8Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Header line always present, even with no rows
pub fn to_csv(rows: &[ExportRow]) -> Result<String, ExportError> {
  let mut writer = csv::WriterBuilder::new()
    .has_headers(false)
    .from_writer(Vec::new());
  writer.write_record(CSV_HEADER)?;
  for row in rows {
    writer.serialize(row)?;
  }

  let bytes = writer
    .into_inner()
    .map_err(|e| csv::Error::from(e.into_error()))?;
  Ok(String::from_utf8(bytes)?)
}

pub fn to_json(rows: &[ExportRow]) -> Result<String, ExportError> {
  Ok(serde_json::to_string_pretty(&JsonExport { rows })?)
}

pub fn render(rows: &[ExportRow], format: ExportFormat) -> Result<String, ExportError> {
  match format {
    ExportFormat::Csv => to_csv(rows),
    ExportFormat::Json => to_json(rows),
  }
}
