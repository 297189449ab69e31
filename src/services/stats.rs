//! Streak statistics
//!
//! Derives streak and total statistics from a habit's completion history.
//! Computation is total: empty or malformed input yields zeroed stats,
//! never an error.
//!
//! Completions are normalized to calendar days in local time and deduped
//! by day before either streak is computed, so recording twice on one day
//! counts once for streaks while `total_completions` keeps the raw count.

use crate::models::{HabitCompletion, HabitStats};
use chrono::{DateTime, Local, NaiveDate, Utc};

/// Compute statistics for one habit's completion history
pub fn compute_stats(completions: &[HabitCompletion]) -> HabitStats {
    compute_stats_at(completions, Local::now().date_naive())
}

/// Calendar day of an instant, in local time
pub(crate) fn local_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

pub(crate) fn compute_stats_at(completions: &[HabitCompletion], today: NaiveDate) -> HabitStats {
    if completions.is_empty() {
        return HabitStats::default();
    }

    let mut days: Vec<NaiveDate> = completions
        .iter()
        .map(|c| local_day(c.completed_at))
        .collect();
    days.sort_unstable();
    days.dedup();

    HabitStats {
        current_streak: current_streak(&days, today),
        longest_streak: longest_streak(&days),
        total_completions: completions.len() as u32,
        completion_rate: 0.0,
        last_completed: completions.iter().map(|c| c.completed_at).max(),
    }
}

/// Consecutive-day run ending at the most recent completion day.
///
/// A most recent completion yesterday still anchors a live streak; a gap
/// of more than one day breaks it. `days` must be sorted and deduped.
fn current_streak(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let Some(&most_recent) = days.last() else {
        return 0;
    };

    if (today - most_recent).num_days() > 1 {
        return 0;
    }

    let mut streak = 0;
    let mut expected = most_recent;

    for &day in days.iter().rev() {
        if day != expected {
            break;
        }
        streak += 1;
        expected = match expected.pred_opt() {
            Some(prev) => prev,
            None => break,
        };
    }

    streak
}

/// Longest consecutive-day run anywhere in the history.
/// `days` must be sorted and deduped.
fn longest_streak(days: &[NaiveDate]) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;

    for &day in days {
        run = match prev {
            Some(prev) if (day - prev).num_days() == 1 => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(day);
    }

    longest
}
