//! Command-line surface: argument definitions and dispatch to `commands`.
//!
//! Every command prints pretty JSON to stdout, except `export`, which prints
//! (or writes) CSV or JSON as requested.

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::coach::{CancelToken, CoachOptions, CoachProgress, DEFAULT_MAX_ITERATIONS};
use crate::commands::log::LogInput;
use crate::commands::overrides::OverrideInput;
use crate::commands::stats::KpiWindow;
use crate::commands::strava::{SyncOptions, CALLBACK_TIMEOUT_SECONDS};
use crate::commands::{self, CommandError};
use crate::config::{AppConfig, ConfigError};
use crate::db::{AppState, StoreError};
use crate::export::ExportFormat;
use crate::llm::{ClaudeClient, LlmError, Message};
use crate::models::WorkoutType;
use crate::strava::{StravaConfig, StravaError};

/// ---------------------------------------------------------------------------
/// Arguments
/// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "training-log")]
#[command(author, version, about = "Periodized running plan, workout log, Strava sync and coach")]
pub struct Cli {
  #[command(subcommand)]
  pub command: Command,

  /// Treat this date as today (YYYY-MM-DD)
  #[arg(long, global = true)]
  pub today: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Program position (week, phase, deload) for a date
  Meta {
    #[arg(long)]
    date: Option<NaiveDate>,
  },

  /// Merged plan for a run of days
  Plan {
    /// First day (default: today)
    #[arg(long)]
    from: Option<NaiveDate>,

    #[arg(long, default_value_t = 7)]
    days: u32,
  },

  /// Log a workout (replaces any entry for that date)
  Log {
    date: NaiveDate,

    /// run, gym or rest
    #[arg(value_name = "TYPE")]
    workout_type: WorkoutType,

    #[arg(long)]
    minutes: Option<u32>,

    /// Perceived effort, 1-10
    #[arg(long)]
    rpe: Option<f64>,

    #[arg(long)]
    notes: Option<String>,
  },

  /// Log the planned session as done
  Done {
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    rpe: Option<f64>,
  },

  /// Logged workouts, newest first
  Workouts {
    #[arg(long, default_value_t = 50)]
    limit: usize,
  },

  /// Manage plan overrides
  #[command(subcommand)]
  Override(OverrideCommand),

  /// Adherence KPIs
  Kpis(RangeArgs),

  /// Short observations on the selected range
  Insights(RangeArgs),

  /// Weekly minutes, oldest first
  Trend {
    #[arg(long, default_value_t = 8)]
    weeks: u32,
  },

  /// Personal records
  Records,

  /// Actual vs planned rows
  Export {
    #[arg(long, default_value = "csv")]
    format: ExportFormat,

    #[arg(long)]
    from: Option<NaiveDate>,

    #[arg(long)]
    to: Option<NaiveDate>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Strava connection and sync
  #[command(subcommand)]
  Strava(StravaCommand),

  /// Ask the coach (tools can read the log and modify the plan)
  Coach {
    question: String,

    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: u32,

    /// JSON file with the conversation so far; updated after the reply
    #[arg(long)]
    history: Option<PathBuf>,
  },
}

#[derive(Subcommand, Debug)]
pub enum OverrideCommand {
  /// Replace the plan for one date
  Set {
    date: NaiveDate,

    #[arg(value_name = "TYPE")]
    plan_type: WorkoutType,

    title: String,

    #[arg(long)]
    minutes: Option<i32>,

    /// Target effort range, e.g. 6-7
    #[arg(long)]
    rpe: Option<String>,

    /// Repeat for each detail line
    #[arg(long = "detail")]
    details: Vec<String>,

    #[arg(long)]
    note: Option<String>,
  },
  /// Remove the override for one date
  Clear { date: NaiveDate },
  /// Current overrides
  List,
  /// Every recorded write for one date
  History { date: NaiveDate },
}

#[derive(Subcommand, Debug)]
pub enum StravaCommand {
  /// Print the authorization URL
  AuthUrl,
  /// Exchange an authorization code (or wait for the redirect) and store tokens
  Connect {
    #[arg(long)]
    code: Option<String>,

    #[arg(long, default_value_t = CALLBACK_TIMEOUT_SECONDS)]
    timeout: u64,
  },
  Status,
  /// Stored sync state rows (tokens omitted)
  State,
  Refresh,
  Disconnect,
  /// Import recent activities
  Sync {
    #[arg(long, default_value_t = 7)]
    days: u32,

    /// Import every activity type, not just runs
    #[arg(long)]
    all_types: bool,

    /// Skip when the last sync was less than an hour ago
    #[arg(long)]
    respect_cooldown: bool,
  },
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct RangeArgs {
  /// Trailing days ending today
  #[arg(long, conflicts_with_all = ["from", "to"])]
  pub days: Option<u32>,

  /// Inclusive start (requires --to)
  #[arg(long, requires = "to")]
  pub from: Option<NaiveDate>,

  /// Inclusive end (requires --from)
  #[arg(long, requires = "from")]
  pub to: Option<NaiveDate>,
}

impl RangeArgs {
  /// Current Monday-start week unless days or an explicit window is given
  pub fn window(&self) -> KpiWindow {
    match (self.days, self.from, self.to) {
      (_, Some(from), Some(to)) => KpiWindow::Between(from, to),
      (Some(days), _, _) => KpiWindow::Last(days),
      _ => KpiWindow::Week,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CliError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Command(#[from] CommandError),

  #[error(transparent)]
  Strava(#[from] StravaError),

  #[error(transparent)]
  Llm(#[from] LlmError),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// ---------------------------------------------------------------------------
/// Dispatch
/// ---------------------------------------------------------------------------

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

pub async fn run(
  cli: Cli,
  config: &AppConfig,
  state: &AppState,
  cancel: CancelToken,
) -> Result<(), CliError> {
  let today = cli.today.unwrap_or_else(|| Local::now().date_naive());
  let program = &config.program;

  match cli.command {
    Command::Meta { date } => print_json(&commands::plan::get_meta(program, date.unwrap_or(today))),

    Command::Plan { from, days } => print_json(
      &commands::plan::get_plan_range(state, program, from.unwrap_or(today), days).await?,
    ),

    Command::Log {
      date,
      workout_type,
      minutes,
      rpe,
      notes,
    } => {
      let input = LogInput {
        date,
        workout_type,
        minutes,
        rpe,
        notes,
      };
      print_json(&commands::log::log_workout(state, input).await?)
    }

    Command::Done { date, rpe } => print_json(
      &commands::log::mark_done(state, program, date.unwrap_or(today), rpe).await?,
    ),

    Command::Workouts { limit } => print_json(&commands::get_workouts(state, limit).await?),

    Command::Override(cmd) => run_override(cmd, state).await,

    Command::Kpis(range) => print_json(
      &commands::stats::get_kpis(state, program, range.window(), today).await?,
    ),

    Command::Insights(range) => print_json(
      &commands::stats::get_insights(state, program, range.window(), today).await?,
    ),

    Command::Trend { weeks } => print_json(&commands::stats::get_trend(state, weeks, today).await?),

    Command::Records => print_json(&commands::stats::get_records(state, today).await?),

    Command::Export {
      format,
      from,
      to,
      output,
    } => {
      let rendered = commands::export::export_workouts(state, program, from, to, format).await?;
      match output {
        Some(path) => {
          tokio::fs::write(&path, rendered).await?;
          tracing::info!(path = %path.display(), "Export written");
        }
        None => print!("{}", rendered),
      }
      Ok(())
    }

    Command::Strava(cmd) => run_strava(cmd, state).await,

    Command::Coach {
      question,
      max_iterations,
      history,
    } => run_coach_command(state, config, &question, max_iterations, history, cancel, today).await,
  }
}

async fn run_override(cmd: OverrideCommand, state: &AppState) -> Result<(), CliError> {
  use crate::commands::overrides::{clear_override, get_override_history, list_overrides, set_override};

  match cmd {
    OverrideCommand::Set {
      date,
      plan_type,
      title,
      minutes,
      rpe,
      details,
      note,
    } => {
      let input = OverrideInput {
        plan_type,
        title,
        target_minutes: minutes,
        rpe,
        details,
        coach_note: note,
      };
      print_json(&set_override(state, date, input).await?)
    }
    OverrideCommand::Clear { date } => {
      print_json(&serde_json::json!({ "date": date, "cleared": clear_override(state, date).await? }))
    }
    OverrideCommand::List => print_json(&list_overrides(state).await?),
    OverrideCommand::History { date } => print_json(&get_override_history(state, date).await?),
  }
}

async fn run_strava(cmd: StravaCommand, state: &AppState) -> Result<(), CliError> {
  use crate::commands::strava::*;

  match cmd {
    StravaCommand::AuthUrl => {
      println!("{}", strava_auth_url(&StravaConfig::from_env()?)?);
      Ok(())
    }
    StravaCommand::Connect { code, timeout } => {
      let config = StravaConfig::from_env()?;
      if code.is_none() {
        eprintln!("Open this URL to authorize:\n{}", strava_auth_url(&config)?);
      }
      strava_connect(state, &config, code, timeout).await?;
      print_json(&strava_auth_status(state).await?)
    }
    StravaCommand::Status => print_json(&strava_auth_status(state).await?),
    StravaCommand::State => print_json(&commands::get_sync_state(state).await?),
    StravaCommand::Refresh => {
      strava_refresh(state, &StravaConfig::from_env()?).await?;
      print_json(&strava_auth_status(state).await?)
    }
    StravaCommand::Disconnect => {
      strava_disconnect(state).await?;
      print_json(&strava_auth_status(state).await?)
    }
    StravaCommand::Sync {
      days,
      all_types,
      respect_cooldown,
    } => {
      let options = SyncOptions {
        days_back: days,
        runs_only: !all_types,
        respect_cooldown,
      };
      let result = strava_sync(state, &StravaConfig::from_env()?, options, chrono::Utc::now()).await?;
      print_json(&result)
    }
  }
}

async fn read_history(path: &Path) -> Result<Vec<Message>, CliError> {
  match tokio::fs::read_to_string(path).await {
    Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
    Ok(raw) => Ok(serde_json::from_str(&raw)?),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
    Err(e) => Err(e.into()),
  }
}

async fn run_coach_command(
  state: &AppState,
  config: &AppConfig,
  question: &str,
  max_iterations: u32,
  history_path: Option<PathBuf>,
  cancel: CancelToken,
  today: NaiveDate,
) -> Result<(), CliError> {
  let client = ClaudeClient::from_env()?;
  let history = match &history_path {
    Some(path) => read_history(path).await?,
    None => Vec::new(),
  };

  let (tx, mut rx) = mpsc::unbounded_channel();
  let reporter = tokio::spawn(async move {
    while let Some(event) = rx.recv().await {
      match event {
        CoachProgress::ModelCall { iteration } => tracing::info!(iteration, "Asking coach"),
        CoachProgress::ToolStarted { name } => tracing::info!(tool = %name, "Running tool"),
        CoachProgress::ToolFinished { name, is_error } => {
          tracing::debug!(tool = %name, is_error, "Tool finished")
        }
        CoachProgress::Cancelled => tracing::warn!("Coach cancelled"),
      }
    }
  });

  let options = CoachOptions {
    max_iterations,
    cancel,
    progress: Some(tx),
  };

  let outcome = commands::coach::ask_coach(
    state,
    &config.program,
    &client,
    history.clone(),
    question,
    &options,
    today,
  )
  .await;
  drop(options);
  let _ = reporter.await;
  let outcome = outcome?;

  if let Some(path) = history_path {
    let mut conversation = history;
    conversation.push(Message::user_text(question.trim()));
    if !outcome.reply.is_empty() {
      conversation.push(Message::assistant_text(outcome.reply.clone()));
    }
    tokio::fs::write(&path, serde_json::to_string_pretty(&conversation)?).await?;
  }

  print_json(&outcome)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::date;

  #[test]
  fn test_parse_log_command() {
    let cli = Cli::try_parse_from([
      "training-log", "log", "2026-03-10", "run", "--minutes", "45", "--rpe", "6",
    ])
    .unwrap();
    match cli.command {
      Command::Log { date: d, workout_type, minutes, rpe, .. } => {
        assert_eq!(d, date(2026, 3, 10));
        assert_eq!(workout_type, WorkoutType::Run);
        assert_eq!(minutes, Some(45));
        assert_eq!(rpe, Some(6.0));
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_rejects_bad_values() {
    assert!(Cli::try_parse_from(["training-log", "log", "2026-13-10", "run"]).is_err());
    assert!(Cli::try_parse_from(["training-log", "log", "2026-03-10", "swim"]).is_err());
    assert!(Cli::try_parse_from(["training-log", "export", "--format", "xml"]).is_err());
  }

  #[test]
  fn test_range_args_to_window() {
    let cli = Cli::try_parse_from(["training-log", "kpis"]).unwrap();
    assert!(matches!(cli.command, Command::Kpis(r) if r.window() == KpiWindow::Week));

    let cli = Cli::try_parse_from(["training-log", "kpis", "--days", "28"]).unwrap();
    assert!(matches!(cli.command, Command::Kpis(r) if r.window() == KpiWindow::Last(28)));

    let cli = Cli::try_parse_from([
      "training-log", "insights", "--from", "2026-03-01", "--to", "2026-03-31",
    ])
    .unwrap();
    assert!(matches!(
      cli.command,
      Command::Insights(r) if r.window() == KpiWindow::Between(date(2026, 3, 1), date(2026, 3, 31))
    ));

    assert!(Cli::try_parse_from(["training-log", "kpis", "--from", "2026-03-01"]).is_err());
  }

  #[test]
  fn test_parse_override_set_and_global_today() {
    let cli = Cli::try_parse_from([
      "training-log", "override", "set", "2026-03-10", "rest", "Injury rest",
      "--detail", "Foam roll", "--detail", "Walk", "--today", "2026-03-09",
    ])
    .unwrap();
    assert_eq!(cli.today, Some(date(2026, 3, 9)));
    match cli.command {
      Command::Override(OverrideCommand::Set { plan_type, title, details, .. }) => {
        assert_eq!(plan_type, WorkoutType::Rest);
        assert_eq!(title, "Injury rest");
        assert_eq!(details, vec!["Foam roll".to_string(), "Walk".to_string()]);
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_strava_sync_flags() {
    let cli = Cli::try_parse_from(["training-log", "strava", "sync", "--all-types"]).unwrap();
    match cli.command {
      Command::Strava(StravaCommand::Sync { days, all_types, respect_cooldown }) => {
        assert_eq!(days, 7);
        assert!(all_types);
        assert!(!respect_cooldown);
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_missing_history_file_is_empty() {
    let path = std::env::temp_dir().join(format!("training-log-missing-{}.json", std::process::id()));
    assert!(read_history(&path).await.unwrap().is_empty());
  }
}
