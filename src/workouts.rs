//! Workout log store. One row per calendar date, last write wins.

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::StoreError;
use crate::models::{Workout, WorkoutSource, WorkoutType};
use crate::plan::iso_date_key;

const SELECT_WORKOUTS: &str =
  "SELECT date, workout_type, minutes, rpe, notes, source FROM workouts";

/// A row that could not be turned into a Workout
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RowError {
  #[error("bad date {0:?}")]
  Date(String),
  #[error("{0}")]
  Field(String),
}

fn workout_from_row(row: &SqliteRow) -> Result<Workout, RowError> {
  let field = |e: sqlx::Error| RowError::Field(e.to_string());

  let date: String = row.try_get("date").map_err(field)?;
  let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| RowError::Date(date))?;

  let workout_type: String = row.try_get("workout_type").map_err(field)?;
  let workout_type: WorkoutType = workout_type.parse().map_err(RowError::Field)?;

  let minutes: Option<i64> = row.try_get("minutes").map_err(field)?;
  let minutes = minutes
    .map(u32::try_from)
    .transpose()
    .map_err(|_| RowError::Field("minutes out of range".to_string()))?;

  let source: String = row.try_get("source").map_err(field)?;
  let source: WorkoutSource = source.parse().map_err(RowError::Field)?;

  Ok(Workout {
    date,
    workout_type,
    minutes,
    rpe: row.try_get("rpe").map_err(field)?,
    notes: row.try_get("notes").map_err(field)?,
    source,
  })
}

/// All logged workouts, newest first. Rows that fail to parse are skipped.
pub async fn read_workouts(pool: &SqlitePool) -> Result<Vec<Workout>, StoreError> {
  let rows = sqlx::query(&format!("{} ORDER BY date DESC", SELECT_WORKOUTS))
    .fetch_all(pool)
    .await?;

  let mut workouts = Vec::with_capacity(rows.len());
  for row in &rows {
    match workout_from_row(row) {
      Ok(workout) => workouts.push(workout),
      Err(e) => {
        let key: Option<String> = row.try_get("date").ok();
        tracing::warn!(date = ?key, error = %e, "Skipping malformed workout row");
      }
    }
  }

  Ok(workouts)
}

pub async fn workout_on(pool: &SqlitePool, date: NaiveDate) -> Result<Option<Workout>, StoreError> {
  let row = sqlx::query(&format!("{} WHERE date = ?1", SELECT_WORKOUTS))
    .bind(iso_date_key(date))
    .fetch_optional(pool)
    .await?;

  Ok(row.and_then(|row| match workout_from_row(&row) {
    Ok(workout) => Some(workout),
    Err(e) => {
      tracing::warn!(%date, error = %e, "Stored workout is malformed");
      None
    }
  }))
}

/// Insert or replace the entry for `workout.date`
pub async fn upsert_workout(pool: &SqlitePool, workout: &Workout) -> Result<(), StoreError> {
  sqlx::query(
    r#"
    INSERT INTO workouts (date, workout_type, minutes, rpe, notes, source, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
    ON CONFLICT(date) DO UPDATE SET
      workout_type = excluded.workout_type,
      minutes = excluded.minutes,
      rpe = excluded.rpe,
      notes = excluded.notes,
      source = excluded.source,
      updated_at = excluded.updated_at
    "#,
  )
  .bind(iso_date_key(workout.date))
  .bind(workout.workout_type.as_str())
  .bind(workout.minutes.map(i64::from))
  .bind(workout.rpe)
  .bind(workout.notes.as_deref())
  .bind(workout.source.as_str())
  .execute(pool)
  .await?;

  tracing::debug!(date = %workout.date, source = %workout.source, "Workout saved");
  Ok(())
}
