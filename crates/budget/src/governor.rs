//! Thread-safe call-budget governor — counts expensive calls per user and
//! decides whether another one may be spent.

use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use waymark_core::UserId;

/// A rolling calendar window over which expensive-call counts are capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Resets at UTC midnight
    Daily,
    /// Resets at ISO week start (Monday, UTC)
    Weekly,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a spend check. `Deny` is a normal branch, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendDecision {
    Allow,
    /// Denied, naming the window whose ceiling tripped.
    Deny { window: Window },
}

impl SpendDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Per-user counters keyed by the calendar window they were recorded in.
///
/// The stored keys say *which* day/week the counts belong to; a count under a
/// stale key reads as zero, so rollover needs no background timer.
#[derive(Debug, Default, Clone)]
struct WindowCounters {
    /// (year, ordinal day) the daily count belongs to.
    day_key: (i32, u32),
    daily_count: u32,
    /// (ISO year, ISO week) the weekly count belongs to.
    week_key: (i32, u32),
    weekly_count: u32,
}

fn day_key(now: DateTime<Utc>) -> (i32, u32) {
    (now.year(), now.ordinal())
}

fn week_key(now: DateTime<Utc>) -> (i32, u32) {
    let iso = now.iso_week();
    (iso.year(), iso.week())
}

/// The call-budget governor.
///
/// Thread-safe via `RwLock`; increments for one user are atomic with respect
/// to concurrent readers and writers. Inject one instance wherever spend
/// decisions are made — counters are owned here, never ambient.
pub struct CallGovernor {
    daily_ceiling: u32,
    weekly_ceiling: u32,
    counters: RwLock<HashMap<UserId, WindowCounters>>,
}

impl CallGovernor {
    /// Create a governor with hard ceilings.
    pub fn new(daily_ceiling: u32, weekly_ceiling: u32) -> Self {
        Self {
            daily_ceiling,
            weekly_ceiling,
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Create a governor whose ceilings are advisory minimums: zeroed
    /// ceilings are raised to 1 so test environments still exercise one
    /// semantic pass. Used in cost-optimized mode.
    pub fn advisory(daily_ceiling: u32, weekly_ceiling: u32) -> Self {
        Self::new(daily_ceiling.max(1), weekly_ceiling.max(1))
    }

    pub fn daily_ceiling(&self) -> u32 {
        self.daily_ceiling
    }

    pub fn weekly_ceiling(&self) -> u32 {
        self.weekly_ceiling
    }

    /// May this user spend one more expensive call right now?
    ///
    /// Allowed iff the counter is below ceiling for both windows. The daily
    /// ceiling is stricter and checked first, so a denial names the daily
    /// window when both are exhausted.
    pub fn may_spend(&self, user_id: &UserId) -> SpendDecision {
        self.decide_at(user_id, Utc::now())
    }

    /// Record one spend, incrementing both window counters atomically.
    ///
    /// Never silently drops an increment — callers are expected to gate on
    /// `may_spend`, and a bypassing caller still gets counted.
    pub fn record_spend(&self, user_id: &UserId) {
        self.record_at(user_id, Utc::now());
    }

    /// Calls left before the window's ceiling, for observability.
    pub fn remaining(&self, user_id: &UserId, window: Window) -> u32 {
        self.remaining_at(user_id, window, Utc::now())
    }

    fn decide_at(&self, user_id: &UserId, now: DateTime<Utc>) -> SpendDecision {
        let counters = self.counters.read().unwrap();
        let c = counters.get(user_id);

        // A missing or stale-window entry counts as zero spent, which still
        // denies when the ceiling itself is zero.
        let daily_count = c
            .filter(|c| c.day_key == day_key(now))
            .map_or(0, |c| c.daily_count);
        if daily_count >= self.daily_ceiling {
            tracing::debug!(user_id = %user_id, count = daily_count, "daily call ceiling reached");
            return SpendDecision::Deny {
                window: Window::Daily,
            };
        }

        let weekly_count = c
            .filter(|c| c.week_key == week_key(now))
            .map_or(0, |c| c.weekly_count);
        if weekly_count >= self.weekly_ceiling {
            tracing::debug!(user_id = %user_id, count = weekly_count, "weekly call ceiling reached");
            return SpendDecision::Deny {
                window: Window::Weekly,
            };
        }

        SpendDecision::Allow
    }

    fn record_at(&self, user_id: &UserId, now: DateTime<Utc>) {
        let mut counters = self.counters.write().unwrap();
        let c = counters.entry(user_id.clone()).or_default();

        // Roll stale windows over before counting
        if c.day_key != day_key(now) {
            c.day_key = day_key(now);
            c.daily_count = 0;
        }
        if c.week_key != week_key(now) {
            c.week_key = week_key(now);
            c.weekly_count = 0;
        }

        c.daily_count += 1;
        c.weekly_count += 1;
    }

    fn remaining_at(&self, user_id: &UserId, window: Window, now: DateTime<Utc>) -> u32 {
        let counters = self.counters.read().unwrap();
        let spent = counters
            .get(user_id)
            .map(|c| match window {
                Window::Daily if c.day_key == day_key(now) => c.daily_count,
                Window::Weekly if c.week_key == week_key(now) => c.weekly_count,
                _ => 0,
            })
            .unwrap_or(0);

        let ceiling = match window {
            Window::Daily => self.daily_ceiling,
            Window::Weekly => self.weekly_ceiling,
        };
        ceiling.saturating_sub(spent)
    }
}

/// Build a governor from configuration. Cost-optimized mode makes the
/// ceilings advisory (floored at 1); otherwise they are hard.
pub fn build_from_config(
    budget: &waymark_config::BudgetSection,
    memory: &waymark_config::MemorySection,
) -> CallGovernor {
    if memory.cost_optimized_mode {
        CallGovernor::advisory(budget.daily_call_ceiling, budget.weekly_call_ceiling)
    } else {
        CallGovernor::new(budget.daily_call_ceiling, budget.weekly_call_ceiling)
    }
}
