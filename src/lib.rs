pub mod cli;
pub mod coach;
pub mod commands;
pub mod config;
pub mod db;
pub mod export;
pub mod insights;
pub mod llm;
pub mod logging;
pub mod models;
pub mod overrides;
pub mod periodization;
pub mod plan;
pub mod stats;
pub mod strava;
pub mod workouts;

#[cfg(test)]
pub mod test_utils;
