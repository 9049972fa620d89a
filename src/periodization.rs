//! Periodization Calculator
//!
//! Maps a calendar date to where it sits in the training program:
//! - week index since the program start (1-based)
//! - weeks remaining to the race
//! - macro phase (base -> build -> specific -> taper)
//! - week within the current phase
//!
//! Stateless: every call recomputes from (date, start, race).

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Last week of the base phase
pub const BASE_LAST_WEEK: u32 = 4;
/// Last week of the build phase
pub const BUILD_LAST_WEEK: u32 = 12;
/// Calendar weeks before (and including) race week that are taper
pub const TAPER_WEEKS: u32 = 3;

// ---------------------------------------------------------------------------
/// Phase: macro training period, ordered by rank
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Base,
    Build,
    Specific,
    Taper,
}

impl Phase {
    /// base < build < specific < taper
    pub fn rank(&self) -> u8 {
        match self {
            Self::Base => 0,
            Self::Build => 1,
            Self::Specific => 2,
            Self::Taper => 3,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Build => write!(f, "build"),
            Self::Specific => write!(f, "specific"),
            Self::Taper => write!(f, "taper"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "build" => Ok(Self::Build),
            "specific" => Ok(Self::Specific),
            "taper" => Ok(Self::Taper),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
/// Program Meta: derived position in the program
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMeta {
    pub week_index: u32,
    pub weeks_to_race: u32,
    pub phase: Phase,
    pub phase_week: u32,
}

impl ProgramMeta {
    /// Every 4th program week is a recovery week
    pub fn is_deload_week(&self) -> bool {
        is_deload_week(self.week_index)
    }
}

pub fn is_deload_week(week_index: u32) -> bool {
    week_index % 4 == 0
}

/// 1-based program week containing `date`, clamped to >= 1 before the start
pub fn week_index(date: NaiveDate, start: NaiveDate) -> u32 {
    let days = (date - start).num_days();
    let week = days.div_euclid(7) + 1;
    week.max(1) as u32
}

/// Program week of the Monday opening `date`'s calendar week
pub fn calendar_week_index(date: NaiveDate, start: NaiveDate) -> u32 {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    week_index(monday, start)
}

/// First program week of the taper
pub fn taper_start_week(start: NaiveDate, race: NaiveDate) -> u32 {
    week_index(race, start)
        .saturating_sub(TAPER_WEEKS - 1)
        .max(1)
}

/// Week index at which `phase` begins for this program
pub fn phase_start_week(phase: Phase, taper_start: u32) -> u32 {
    match phase {
        Phase::Base => 1,
        Phase::Build => BASE_LAST_WEEK + 1,
        Phase::Specific => BUILD_LAST_WEEK + 1,
        // The first four weeks are always base, so taper can't begin earlier.
        Phase::Taper => taper_start.max(BASE_LAST_WEEK + 1),
    }
}

pub fn program_meta(date: NaiveDate, start: NaiveDate, race: NaiveDate) -> ProgramMeta {
    let week_index = week_index(date, start);

    let days_to_race = (race - date).num_days().max(0);
    let weeks_to_race = ((days_to_race + 6) / 7) as u32;

    let taper_start = taper_start_week(start, race);

    // Taper is checked before build: a race within 14 weeks of the start
    // tapers before week 13 instead of staying in build through week 12.
    // This keeps the phase sequence non-decreasing even for short programs.
    let phase = if week_index <= BASE_LAST_WEEK {
        Phase::Base
    } else if week_index >= taper_start {
        Phase::Taper
    } else if week_index <= BUILD_LAST_WEEK {
        Phase::Build
    } else {
        Phase::Specific
    };

    let start_week = phase_start_week(phase, taper_start);
    let phase_week = week_index.saturating_sub(start_week) + 1;

    ProgramMeta {
        week_index,
        weeks_to_race,
        phase,
        phase_week: phase_week.max(1),
    }
}

// ---------------------------------------------------------------------------
/// Tests
// ---------------------------------------------------------------------------
