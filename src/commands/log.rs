use crate::config::ProgramConfig;
use crate::db::AppState;
use crate::models::{Workout, WorkoutSource, WorkoutType};
use crate::overrides::load_overrides;
use crate::plan::plan_with_overrides;
use crate::workouts::upsert_workout;
use chrono::NaiveDate;

use super::CommandError;

#[derive(Debug, Clone)]
pub struct LogInput {
  pub date: NaiveDate,
  pub workout_type: WorkoutType,
  pub minutes: Option<u32>,
  pub rpe: Option<f64>,
  pub notes: Option<String>,
}

/// One calendar day
pub const MAX_MINUTES: u32 = 24 * 60;

fn validate_minutes(minutes: Option<u32>) -> Result<Option<u32>, CommandError> {
  match minutes {
    Some(value) if value > MAX_MINUTES => Err(CommandError::InvalidInput(format!(
      "minutes must be at most {}, got {}",
      MAX_MINUTES, value
    ))),
    other => Ok(other),
  }
}

fn validate_rpe(rpe: Option<f64>) -> Result<Option<f64>, CommandError> {
  match rpe {
    Some(value) if !(1.0..=10.0).contains(&value) => Err(CommandError::InvalidInput(format!(
      "RPE must be between 1 and 10, got {}",
      value
    ))),
    other => Ok(other),
  }
}

/// Manual entry for a date, replacing whatever was logged there
pub async fn log_workout(state: &AppState, input: LogInput) -> Result<Workout, CommandError> {
  let workout = Workout {
    date: input.date,
    workout_type: input.workout_type,
    minutes: validate_minutes(input.minutes)?,
    rpe: validate_rpe(input.rpe)?,
    notes: input
      .notes
      .map(|n| n.trim().to_string())
      .filter(|n| !n.is_empty()),
    source: WorkoutSource::Manual,
  };

  upsert_workout(&state.db, &workout).await?;
  tracing::info!(date = %workout.date, workout_type = %workout.workout_type, "Workout logged");
  Ok(workout)
}

/// Log the (merged) plan for `date` as done: its type and target minutes
pub async fn mark_done(
  state: &AppState,
  program: &ProgramConfig,
  date: NaiveDate,
  rpe: Option<f64>,
) -> Result<Workout, CommandError> {
  let overrides = load_overrides(&state.db).await?;
  let planned = plan_with_overrides(date, program, &overrides);

  log_workout(
    state,
    LogInput {
      date,
      workout_type: planned.plan_type,
      minutes: planned
        .target_minutes
        .and_then(|m| u32::try_from(m).ok())
        .filter(|m| *m <= MAX_MINUTES),
      rpe,
      notes: Some(planned.title),
    },
  )
  .await
}
