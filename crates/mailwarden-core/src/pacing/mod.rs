//! Sender warm-up and pacing
//!
//! New sending accounts ramp their daily volume over six weeks. Every
//! function here is a pure function of account age and the current time.

mod quota;

pub use quota::DailyQuota;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Warm-up schedule: (account age in days below which the cap applies, cap)
const WARMUP_SCHEDULE: &[(i64, u32)] = &[
    (3, 50),
    (7, 200),
    (14, 500),
    (21, 1000),
    (28, 2000),
    (42, 5000),
];

/// Daily limit after applying the warm-up cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLimit {
    pub limit: u32,
    /// True when the warm-up cap is below the configured limit
    pub is_warmup_restricted: bool,
    /// 1-based day of the account's life
    pub warmup_day: u32,
}

/// Batch pacing for an account of a given age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingPace {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub per_email_delay_ms: u64,
}

impl SendingPace {
    pub fn per_email_delay(&self) -> Duration {
        Duration::from_millis(self.per_email_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_days().max(0)
}

/// Warm-up cap for an account, `None` once fully warmed
pub fn warmup_cap(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u32> {
    let age = age_in_days(created_at, now);
    WARMUP_SCHEDULE
        .iter()
        .find(|(max_age, _)| age < *max_age)
        .map(|(_, cap)| *cap)
}

/// Configured limit clamped by the warm-up cap
pub fn effective_daily_limit(
    configured: u32,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> EffectiveLimit {
    let warmup_day = age_in_days(created_at, now) as u32 + 1;

    match warmup_cap(created_at, now) {
        Some(cap) if cap < configured => EffectiveLimit {
            limit: cap,
            is_warmup_restricted: true,
            warmup_day,
        },
        _ => EffectiveLimit {
            limit: configured,
            is_warmup_restricted: false,
            warmup_day,
        },
    }
}

/// Delay between two consecutive sends
pub fn send_delay(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let millis = match age_in_days(created_at, now) {
        age if age < 7 => 200,
        age if age < 14 => 150,
        age if age < 28 => 100,
        _ => 50,
    };
    Duration::from_millis(millis)
}

/// Batch size and delays for an account
pub fn sending_pace(created_at: DateTime<Utc>, now: DateTime<Utc>) -> SendingPace {
    let (batch_size, batch_delay_ms) = match age_in_days(created_at, now) {
        age if age < 7 => (10, 5000),
        age if age < 14 => (25, 3000),
        age if age < 28 => (50, 2000),
        _ => (100, 1000),
    };

    SendingPace {
        batch_size,
        batch_delay_ms,
        per_email_delay_ms: send_delay(created_at, now).as_millis() as u64,
    }
}
