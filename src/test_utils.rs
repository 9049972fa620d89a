//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories
//! - Helper assertions

use crate::config::ProgramConfig;
use crate::models::{PlanOverride, Workout, WorkoutSource, WorkoutType};
use crate::strava::StravaActivity;
use crate::workouts::upsert_workout;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Seed one manual run per day, ending at `last` and going back `count` days
pub async fn seed_test_workouts(pool: &SqlitePool, last: NaiveDate, count: usize) -> Vec<Workout> {
  let mut seeded = Vec::new();

  for i in 0..count {
    let w = workout(
      last - chrono::Duration::days(i as i64),
      if i % 2 == 0 { WorkoutType::Run } else { WorkoutType::Gym },
      Some(30 + i as u32),
      Some(5.0),
    );
    upsert_workout(pool, &w).await.expect("Failed to insert test workout");
    seeded.push(w);
  }

  seeded
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

/// Program starting 2026-02-05 with the race on 2026-09-13
pub fn mock_program() -> ProgramConfig {
  ProgramConfig::new(date(2026, 2, 5), date(2026, 9, 13))
}

pub fn workout(
  date: NaiveDate,
  workout_type: WorkoutType,
  minutes: Option<u32>,
  rpe: Option<f64>,
) -> Workout {
  Workout {
    date,
    workout_type,
    minutes,
    rpe,
    notes: None,
    source: WorkoutSource::Manual,
  }
}

pub fn mock_override(plan_type: WorkoutType, title: &str) -> PlanOverride {
  PlanOverride {
    plan_type,
    title: title.to_string(),
    target_minutes: None,
    rpe: None,
    details: vec![],
    coach_note: None,
    created_at: Utc::now(),
  }
}

/// Create a mock Strava activity for testing
pub fn mock_strava_activity() -> StravaActivity {
  StravaActivity {
    id: 123456,
    name: "Morning Run".to_string(),
    activity_type: "Run".to_string(),
    sport_type: Some("Run".to_string()),
    start_date_local: "2026-03-10T07:15:00Z".to_string(),
    moving_time: 3125,
    distance: Some(10240.0),
    total_elevation_gain: Some(84.0),
    average_heartrate: Some(146.4),
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('workouts', 'plan_overrides', 'plan_override_history', 'sync_state')"
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 4, "Expected 4 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_seed_workouts_returns_correct_count() {
    let pool = setup_test_db().await;

    let seeded = seed_test_workouts(&pool, date(2026, 3, 10), 5).await;
    assert_eq!(seeded.len(), 5);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workouts")
      .fetch_one(&pool)
      .await
      .expect("Failed to count workouts");

    assert_eq!(count, 5);

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    let activity = mock_strava_activity();
    assert_eq!(activity.activity_type, "Run");
    assert_eq!(activity.distance, Some(10240.0));

    let program = mock_program();
    assert!(program.start_date < program.race_date);
  }
}
