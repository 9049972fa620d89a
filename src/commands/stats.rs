use crate::config::ProgramConfig;
use crate::db::AppState;
use crate::insights::generate_insights;
use crate::stats::{
  compute_kpis, compute_trend, personal_records, DateRange, Kpis, PersonalRecord, TrendWeek,
  MAX_DAYS,
};
use crate::workouts::read_workouts;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::CommandError;

pub const MAX_TREND_WEEKS: u32 = 52;

/// Which window a KPI request covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiWindow {
  /// Monday-start week containing `today`
  Week,
  /// Trailing N days ending with `today`
  Last(u32),
  /// Inclusive calendar dates
  Between(NaiveDate, NaiveDate),
}

impl KpiWindow {
  pub fn resolve(self, today: NaiveDate) -> Result<DateRange, CommandError> {
    match self {
      KpiWindow::Week => Ok(DateRange::week_of(today)),
      KpiWindow::Last(days) if days == 0 || days as i64 > MAX_DAYS => Err(
        CommandError::InvalidInput(format!("days must be between 1 and {}", MAX_DAYS)),
      ),
      KpiWindow::Last(days) => Ok(DateRange::trailing(today, days as i64)),
      KpiWindow::Between(from, to) if from > to => Err(CommandError::InvalidInput(format!(
        "range start {} is after end {}",
        from, to
      ))),
      KpiWindow::Between(from, to) => Ok(DateRange::new(from, to + Duration::days(1))),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct KpiReport {
  pub range: DateRange,
  #[serde(flatten)]
  pub kpis: Kpis,
}

pub async fn get_kpis(
  state: &AppState,
  program: &ProgramConfig,
  window: KpiWindow,
  today: NaiveDate,
) -> Result<KpiReport, CommandError> {
  let range = window.resolve(today)?;
  let workouts = read_workouts(&state.db).await?;
  Ok(KpiReport {
    range,
    kpis: compute_kpis(&workouts, range, &workouts, program, today),
  })
}

pub async fn get_insights(
  state: &AppState,
  program: &ProgramConfig,
  window: KpiWindow,
  today: NaiveDate,
) -> Result<Vec<String>, CommandError> {
  let range = window.resolve(today)?;
  let workouts = read_workouts(&state.db).await?;
  Ok(generate_insights(&workouts, range, program, today))
}

pub async fn get_trend(
  state: &AppState,
  weeks: u32,
  today: NaiveDate,
) -> Result<Vec<TrendWeek>, CommandError> {
  if weeks == 0 || weeks > MAX_TREND_WEEKS {
    return Err(CommandError::InvalidInput(format!(
      "weeks must be between 1 and {}",
      MAX_TREND_WEEKS
    )));
  }
  let workouts = read_workouts(&state.db).await?;
  Ok(compute_trend(&workouts, weeks, today))
}

pub async fn get_records(
  state: &AppState,
  today: NaiveDate,
) -> Result<Vec<PersonalRecord>, CommandError> {
  let workouts = read_workouts(&state.db).await?;
  Ok(personal_records(&workouts, today))
}
