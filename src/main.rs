use clap::Parser;
use training_log_lib::cli::{self, Cli, CliError, Command};
use training_log_lib::coach::CancelToken;
use training_log_lib::config::AppConfig;
use training_log_lib::db::{initialize_db, AppState};
use training_log_lib::logging;

#[tokio::main]
async fn main() {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();

  let args = Cli::parse();
  logging::init("info");

  if let Err(e) = run(args).await {
    eprintln!("Error: {}", e);
    std::process::exit(1);
  }
}

async fn run(args: Cli) -> Result<(), CliError> {
  let config = AppConfig::from_env()?;
  let state = AppState {
    db: initialize_db(&config.database_path).await?,
  };

  // Only the coach loop is cancellable; other commands keep the default SIGINT.
  let cancel = CancelToken::new();
  if matches!(args.command, Command::Coach { .. }) {
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupt received, stopping coach after the current step");
        on_interrupt.cancel();
      }
    });
  }

  let result = cli::run(args, &config, &state, cancel).await;
  state.db.close().await;
  result
}
