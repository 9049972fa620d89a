//! KPI aggregation over the workout log
//!
//! Pure functions: callers pass the log, the range and `today`, so results are
//! reproducible in tests and never depend on the wall clock.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ProgramConfig;
use crate::models::{Workout, WorkoutType};
use crate::plan::plan_for_date;

/// Upper bound on planned days and streak length
pub const MAX_DAYS: i64 = 365;

/// ---------------------------------------------------------------------------
/// Date Range
/// ---------------------------------------------------------------------------

/// Half-open calendar range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl DateRange {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
    Self { start, end }
  }

  /// Monday-start week containing `date`
  pub fn week_of(date: NaiveDate) -> Self {
    let start = week_start(date);
    Self::new(start, start + Duration::days(7))
  }

  /// The `days` days ending with (and including) `today`
  pub fn trailing(today: NaiveDate, days: i64) -> Self {
    let end = today + Duration::days(1);
    Self::new(end - Duration::days(days.max(0)), end)
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    date >= self.start && date < self.end
  }

  /// Calendar days in the range, capped at MAX_DAYS. Empty when end <= start.
  pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
    let count = (self.end - self.start).num_days().clamp(0, MAX_DAYS);
    let start = self.start;
    (0..count).map(move |i| start + Duration::days(i))
  }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
  date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// ---------------------------------------------------------------------------
/// KPIs
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
  pub completion_pct: u32,
  pub done_count: u32,
  pub planned_count: u32,
  pub done_minutes: u64,
  pub planned_minutes: i64,
  pub avg_rpe: Option<f64>,
  pub streak: u32,
}

/// Adherence for `range`, with the streak counted over `full_log`
pub fn compute_kpis(
  workouts: &[Workout],
  range: DateRange,
  full_log: &[Workout],
  program: &ProgramConfig,
  today: NaiveDate,
) -> Kpis {
  let planned: Vec<_> = range
    .days()
    .map(|d| plan_for_date(d, program))
    .filter(|p| p.plan_type != WorkoutType::Rest)
    .collect();

  let planned_count = planned.len() as u32;
  let planned_minutes = planned
    .iter()
    .map(|p| p.target_minutes.unwrap_or(0) as i64)
    .sum();

  let in_range: Vec<&Workout> = workouts.iter().filter(|w| range.contains(w.date)).collect();

  let done_count = in_range
    .iter()
    .filter(|w| w.workout_type != WorkoutType::Rest)
    .count() as u32;
  let done_minutes = total_minutes(in_range.iter().copied());

  let rpes: Vec<f64> = in_range
    .iter()
    .filter_map(|w| w.rpe)
    .filter(|r| r.is_finite())
    .collect();
  let avg_rpe = if rpes.is_empty() {
    None
  } else {
    let mean = rpes.iter().sum::<f64>() / rpes.len() as f64;
    Some((mean * 10.0).round() / 10.0)
  };

  Kpis {
    completion_pct: completion_pct(done_count, planned_count),
    done_count,
    planned_count,
    done_minutes,
    planned_minutes,
    avg_rpe,
    streak: current_streak(full_log, today),
  }
}

/// round(100 * done / planned), 0 when nothing was planned, never above 100
pub fn completion_pct(done: u32, planned: u32) -> u32 {
  if planned == 0 {
    return 0;
  }
  let pct = (done as f64 / planned as f64 * 100.0).round() as u32;
  pct.min(100)
}

/// Consecutive logged days walking back from `today`
pub fn current_streak(log: &[Workout], today: NaiveDate) -> u32 {
  let dates: BTreeSet<NaiveDate> = log.iter().map(|w| w.date).collect();
  (0..MAX_DAYS)
    .take_while(|i| dates.contains(&(today - Duration::days(*i))))
    .count() as u32
}

/// ---------------------------------------------------------------------------
/// Volume Trend
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendWeek {
  pub week_start: NaiveDate,
  pub minutes: u64,
}

/// Sum of logged minutes, saturating instead of overflowing
pub fn total_minutes<'a>(workouts: impl IntoIterator<Item = &'a Workout>) -> u64 {
  workouts
    .into_iter()
    .fold(0u64, |acc, w| acc.saturating_add(u64::from(w.minutes.unwrap_or(0))))
}

fn minutes_in(workouts: &[Workout], range: DateRange) -> u64 {
  total_minutes(workouts.iter().filter(|w| range.contains(w.date)))
}

/// Weekly minutes for the last `weeks` Monday-start weeks, oldest first
pub fn compute_trend(workouts: &[Workout], weeks: u32, today: NaiveDate) -> Vec<TrendWeek> {
  let current = week_start(today);
  (0..weeks as i64)
    .rev()
    .map(|back| {
      let range = DateRange::week_of(current - Duration::weeks(back));
      TrendWeek {
        week_start: range.start,
        minutes: minutes_in(workouts, range),
      }
    })
    .collect()
}

/// ---------------------------------------------------------------------------
/// Personal Records
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalRecord {
  pub label: String,
  pub value: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date: Option<NaiveDate>,
}

pub fn personal_records(workouts: &[Workout], today: NaiveDate) -> Vec<PersonalRecord> {
  let mut records = Vec::new();

  // Ties go to the earliest date
  let longest = workouts
    .iter()
    .filter(|w| w.workout_type == WorkoutType::Run)
    .filter_map(|w| w.minutes.filter(|m| *m > 0).map(|m| (m, w.date)))
    .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
  if let Some((minutes, date)) = longest {
    records.push(PersonalRecord {
      label: "Longest run".to_string(),
      value: format!("{} min", minutes),
      date: Some(date),
    });
  }

  let biggest_week = compute_trend(workouts, 52, today)
    .into_iter()
    .filter(|w| w.minutes > 0)
    .fold(None::<TrendWeek>, |best, week| match best {
      Some(b) if b.minutes >= week.minutes => Some(b),
      _ => Some(week),
    });
  if let Some(week) = biggest_week {
    records.push(PersonalRecord {
      label: "Biggest week".to_string(),
      value: format!("{} min", week.minutes),
      date: Some(week.week_start),
    });
  }

  let best = best_streak(workouts);
  if best > 1 {
    records.push(PersonalRecord {
      label: "Best streak".to_string(),
      value: format!("{} days", best),
      date: None,
    });
  }

  records
}

/// Longest run of consecutive logged dates anywhere in the log
pub fn best_streak(workouts: &[Workout]) -> u32 {
  let dates: BTreeSet<NaiveDate> = workouts.iter().map(|w| w.date).collect();
  let mut best = 0;
  let mut current = 0;
  let mut prev: Option<NaiveDate> = None;

  for date in dates {
    current = match prev {
      Some(p) if date - p == Duration::days(1) => current + 1,
      _ => 1,
    };
    best = best.max(current);
    prev = Some(date);
  }

  best
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
