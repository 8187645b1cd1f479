//! crates/study_tracker_core/src/stats.rs
//!
//! Dashboard numbers derived from a user's study logs.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

use crate::domain::StudyLog;

pub const DEFAULT_DAILY_GOAL: f64 = 4.0;
pub const DEFAULT_SERIES_DAYS: u32 = 7;
/// Chart ranges the home page offers.
pub const SERIES_DAY_CHOICES: [u32; 2] = [7, 14];

#[derive(Debug, Clone, PartialEq)]
pub struct DayHours {
    pub date: NaiveDate,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthHours {
    /// `YYYY-MM`.
    pub month: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyStats {
    pub daily_goal: f64,
    pub today_hours: f64,
    /// Share of today's goal reached, capped at 1.0.
    pub goal_progress: f64,
    pub hours_remaining: f64,
    /// One entry per day ending today, zero where nothing was logged.
    pub recent: Vec<DayHours>,
    /// Totals per month, oldest first.
    pub monthly: Vec<MonthHours>,
}

impl StudyStats {
    pub fn goal_reached(&self) -> bool {
        self.goal_progress >= 1.0
    }

    pub fn compute(logs: &[StudyLog], today: NaiveDate, days: u32, daily_goal: f64) -> Self {
        let by_date: BTreeMap<&str, f64> = logs
            .iter()
            .map(|log| (log.date.as_str(), log.hours))
            .collect();
        let hours_on = |date: NaiveDate| {
            by_date
                .get(date.format("%Y-%m-%d").to_string().as_str())
                .copied()
                .unwrap_or(0.0)
        };

        let today_hours = hours_on(today);
        let goal_progress = if daily_goal > 0.0 {
            (today_hours / daily_goal).min(1.0)
        } else {
            1.0
        };

        let recent = (0..days)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
            .map(|date| DayHours {
                date,
                hours: hours_on(date),
            })
            .collect();

        let mut months: BTreeMap<String, f64> = BTreeMap::new();
        for log in logs {
            if let Some(month) = log.date.get(..7) {
                *months.entry(month.to_string()).or_default() += log.hours;
            }
        }
        let monthly = months
            .into_iter()
            .map(|(month, hours)| MonthHours { month, hours })
            .collect();

        Self {
            daily_goal,
            today_hours,
            goal_progress,
            hours_remaining: (daily_goal - today_hours).max(0.0),
            recent,
            monthly,
        }
    }
}

/// Sum of every logged hour; shown on the admin user detail card.
pub fn total_hours(logs: &[StudyLog]) -> f64 {
    logs.iter().map(|log| log.hours).sum()
}
