use crate::config::ProgramConfig;
use crate::db::AppState;
use crate::export::{export_rows, render, ExportFormat};
use crate::workouts::read_workouts;
use chrono::NaiveDate;

use super::CommandError;

/// Rendered export of logged workouts within the inclusive window
pub async fn export_workouts(
  state: &AppState,
  program: &ProgramConfig,
  from: Option<NaiveDate>,
  to: Option<NaiveDate>,
  format: ExportFormat,
) -> Result<String, CommandError> {
  if let (Some(f), Some(t)) = (from, to) {
    if f > t {
      return Err(CommandError::InvalidInput(format!(
        "export start {} is after end {}",
        f, t
      )));
    }
  }

  let workouts = read_workouts(&state.db).await?;
  let rows = export_rows(&workouts, from, to, program);
  tracing::info!(rows = rows.len(), ?format, "Exporting workouts");
  Ok(render(&rows, format)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::*;

  #[tokio::test]
  async fn test_export_csv_from_store() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    let program = mock_program();
    seed_test_workouts(&pool, date(2026, 3, 12), 5).await;

    let csv = export_workouts(
      &state,
      &program,
      Some(date(2026, 3, 10)),
      None,
      ExportFormat::Csv,
    )
    .await
    .unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    // Header + 10th, 11th, 12th
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("2026-03-10,run,32,5.0,"));
    assert!(lines[3].starts_with("2026-03-12,run,30,5.0,"));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_export_rejects_inverted_window() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };

    let result = export_workouts(
      &state,
      &mock_program(),
      Some(date(2026, 3, 12)),
      Some(date(2026, 3, 1)),
      ExportFormat::Json,
    )
    .await;
    assert!(matches!(result, Err(CommandError::InvalidInput(_))));

    teardown_test_db(pool).await;
  }
}
