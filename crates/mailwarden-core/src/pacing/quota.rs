//! Rolling 24-hour send quota

use super::EffectiveLimit;
use chrono::{DateTime, Duration, Utc};
use mailwarden_storage::EmailAccount;
use serde::{Deserialize, Serialize};

/// What an account may still send in its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuota {
    pub limit: u32,
    /// Sends counted against the current window
    pub used: u32,
    pub remaining: u32,
    /// When the current window ends, if one is open
    pub resets_at: Option<DateTime<Utc>>,
}

impl DailyQuota {
    /// Quota for `account`, treating a window older than 24h as reset
    pub fn for_account(account: &EmailAccount, limit: EffectiveLimit, now: DateTime<Utc>) -> Self {
        let window = Duration::hours(24);
        let open_window = account
            .last_reset_at
            .filter(|reset| *reset > now - window);

        let used = match open_window {
            Some(_) => account.sent_today.max(0) as u32,
            None => 0,
        };

        Self {
            limit: limit.limit,
            used,
            remaining: limit.limit.saturating_sub(used),
            resets_at: open_window.map(|reset| reset + window),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailwarden_storage::SmtpSecurity;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn account(sent_today: i32, last_reset_at: Option<DateTime<Utc>>) -> EmailAccount {
        let now = Utc::now();
        EmailAccount {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            email: "sender@example.com".to_string(),
            from_name: None,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_security: SmtpSecurity::StartTls,
            daily_limit: 1000,
            sent_today,
            last_reset_at,
            created_at: now - Duration::days(90),
        }
    }

    fn limit(limit: u32) -> EffectiveLimit {
        EffectiveLimit {
            limit,
            is_warmup_restricted: false,
            warmup_day: 91,
        }
    }

    #[test]
    fn test_open_window_counts() {
        let now = Utc::now();
        let quota = DailyQuota::for_account(&account(40, Some(now - Duration::hours(3))), limit(100), now);
        assert_eq!(quota.used, 40);
        assert_eq!(quota.remaining, 60);
        assert_eq!(quota.resets_at, Some(now - Duration::hours(3) + Duration::hours(24)));
    }

    #[test]
    fn test_expired_window_is_reset() {
        let now = Utc::now();
        let quota = DailyQuota::for_account(&account(100, Some(now - Duration::hours(25))), limit(100), now);
        assert_eq!(quota.used, 0);
        assert_eq!(quota.remaining, 100);
        assert_eq!(quota.resets_at, None);
    }

    #[test]
    fn test_exhausted() {
        let now = Utc::now();
        let quota = DailyQuota::for_account(&account(150, Some(now)), limit(100), now);
        assert_eq!(quota.remaining, 0);
        assert!(quota.is_exhausted());
    }
}
