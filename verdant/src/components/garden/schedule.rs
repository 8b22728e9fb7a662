use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use std::collections::HashSet;
use strum_macros::{Display, EnumString, IntoStaticStr};
use tracing::info;

/// Month abbreviations used as keys for the per-valve runtimes. Parsing is
/// case insensitive because the config loader is free to lowercase map keys.
#[derive(EnumString, IntoStaticStr, Display, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[strum(ascii_case_insensitive)]
pub enum MonthKey {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl MonthKey {
    /// Calendar order, January first.
    pub const ALL: [MonthKey; 12] = [
        MonthKey::Jan,
        MonthKey::Feb,
        MonthKey::Mar,
        MonthKey::Apr,
        MonthKey::May,
        MonthKey::Jun,
        MonthKey::Jul,
        MonthKey::Aug,
        MonthKey::Sep,
        MonthKey::Oct,
        MonthKey::Nov,
        MonthKey::Dec,
    ];

    /// Month of the given date.
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self::ALL[date.month0() as usize]
    }
}

/// When watering is permitted. Built from the validated irrigation config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Local hour of day the run starts, 0 - 23.
    pub start_hour: u32,
    /// Days of the week on which the run is allowed.
    pub weekdays: HashSet<Weekday>,
}

impl ScheduleConfig {
    /// Schedule configuration.
    ///
    /// * `start_hour`: hour of day [0 - 23]
    /// * `weekdays`: days a run is permitted on.
    pub fn new<I: IntoIterator<Item = Weekday>>(start_hour: u32, weekdays: I) -> Self {
        Self {
            start_hour,
            weekdays: weekdays.into_iter().collect(),
        }
    }
}

/// Outcome of one invocation of the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunDecision {
    /// Wrong weekday or hour.
    SkipNotScheduled,
    /// Scheduled, but vetoed by the weather gate.
    SkipRain,
    /// Scheduled run.
    Run,
    /// Run requested manually, schedule ignored.
    RunForced,
}

impl RunDecision {
    /// True when the valves should be sequenced, pending the weather gate.
    pub fn wants_water(&self) -> bool {
        matches!(self, RunDecision::Run | RunDecision::RunForced)
    }
}

/// Decide whether this invocation should water. A forced run only skips
/// the weekday/hour check, the weather gate is applied by the caller for
/// both `Run` and `RunForced`.
///
/// * `now`: current local time.
/// * `schedule`: configured start hour and weekdays.
/// * `force_now`: manual override from the command line.
pub fn decide<Tz: TimeZone>(
    now: &DateTime<Tz>,
    schedule: &ScheduleConfig,
    force_now: bool,
) -> RunDecision {
    let weekday = now.weekday();
    let hour = now.hour();

    if force_now {
        info!("Forced run requested on {weekday:?} at hour {hour}");
        RunDecision::RunForced
    } else if hour == schedule.start_hour && schedule.weekdays.contains(&weekday) {
        info!("Today is a watering day");
        RunDecision::Run
    } else {
        info!("null run");
        RunDecision::SkipNotScheduled
    }
}
