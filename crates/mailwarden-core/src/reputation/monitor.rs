//! Bounce and complaint rate monitor
//!
//! Looks at an account's recent completed campaigns and decides whether a
//! new campaign may start. Mailbox providers throttle or block senders well
//! before rates look alarming, so the tiers are strict.

use mailwarden_storage::CampaignDeliveryStats;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BOUNCE_CRITICAL: f64 = 0.05;
const BOUNCE_PAUSE: f64 = 0.02;
const BOUNCE_WARN: f64 = 0.005;

const COMPLAINT_CRITICAL: f64 = 0.003;
const COMPLAINT_PAUSE: f64 = 0.001;
const COMPLAINT_WARN: f64 = 0.0005;

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthAction {
    Allow,
    Warn,
    Pause,
}

impl std::fmt::Display for HealthAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAction::Allow => write!(f, "allow"),
            HealthAction::Warn => write!(f, "warn"),
            HealthAction::Pause => write!(f, "pause"),
        }
    }
}

/// Account health over recent campaigns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub can_send: bool,
    pub warnings: Vec<String>,
    /// Fraction in [0, 1]
    pub bounce_rate: f64,
    /// Fraction in [0, 1]
    pub complaint_rate: f64,
    pub action: HealthAction,
    pub total_sent: i64,
}

impl HealthReport {
    /// Reasons joined for a policy rejection
    pub fn reason(&self) -> String {
        if self.warnings.is_empty() {
            "Account health check failed".to_string()
        } else {
            self.warnings.join("; ")
        }
    }
}

/// Reputation gate
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor;

impl HealthMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate bounce and complaint rates across `recent` campaigns
    pub fn check_health(&self, recent: &[CampaignDeliveryStats]) -> HealthReport {
        let total_sent: i64 = recent.iter().map(|s| s.total_sent.max(0) as i64).sum();
        let total_bounced: i64 = recent.iter().map(|s| s.total_bounced.max(0) as i64).sum();
        let total_complaints: i64 = recent
            .iter()
            .map(|s| s.total_complaints.max(0) as i64)
            .sum();

        if total_sent == 0 {
            return HealthReport {
                can_send: true,
                warnings: Vec::new(),
                bounce_rate: 0.0,
                complaint_rate: 0.0,
                action: HealthAction::Allow,
                total_sent: 0,
            };
        }

        let bounce_rate = total_bounced as f64 / total_sent as f64;
        let complaint_rate = total_complaints as f64 / total_sent as f64;

        let mut warnings = Vec::new();
        let mut action = HealthAction::Allow;

        if bounce_rate > BOUNCE_CRITICAL {
            warnings.push(format!(
                "Critical bounce rate of {:.1}%; sending paused to protect your reputation",
                bounce_rate * 100.0
            ));
            action = action.max(HealthAction::Pause);
        } else if bounce_rate > BOUNCE_PAUSE {
            warnings.push(format!(
                "Bounce rate of {:.1}% exceeds 2%; clean your list before sending",
                bounce_rate * 100.0
            ));
            action = action.max(HealthAction::Pause);
        } else if bounce_rate > BOUNCE_WARN {
            warnings.push(format!("Elevated bounce rate of {:.2}%", bounce_rate * 100.0));
            action = action.max(HealthAction::Warn);
        }

        if complaint_rate > COMPLAINT_CRITICAL {
            warnings.push(format!(
                "Critical complaint rate of {:.2}%; sending paused",
                complaint_rate * 100.0
            ));
            action = action.max(HealthAction::Pause);
        } else if complaint_rate > COMPLAINT_PAUSE {
            warnings.push(format!(
                "Complaint rate of {:.2}% exceeds 0.1%; review your content and consent",
                complaint_rate * 100.0
            ));
            action = action.max(HealthAction::Pause);
        } else if complaint_rate > COMPLAINT_WARN {
            warnings.push(format!(
                "Elevated complaint rate of {:.3}%",
                complaint_rate * 100.0
            ));
            action = action.max(HealthAction::Warn);
        }

        debug!(
            total_sent,
            bounce_rate,
            complaint_rate,
            action = %action,
            "Account health evaluated"
        );

        HealthReport {
            can_send: action != HealthAction::Pause,
            warnings,
            bounce_rate,
            complaint_rate,
            action,
            total_sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(sent: i32, bounced: i32, complaints: i32) -> CampaignDeliveryStats {
        CampaignDeliveryStats {
            total_sent: sent,
            total_bounced: bounced,
            total_complaints: complaints,
        }
    }

    #[test]
    fn test_no_history_allows() {
        let report = HealthMonitor::new().check_health(&[]);
        assert!(report.can_send);
        assert_eq!(report.action, HealthAction::Allow);
        assert_eq!(report.bounce_rate, 0.0);
        assert_eq!(report.total_sent, 0);
    }

    #[test]
    fn test_clean_history_allows() {
        let report = HealthMonitor::new().check_health(&[stats(1000, 2, 0), stats(1000, 1, 0)]);
        assert_eq!(report.action, HealthAction::Allow);
        assert!(report.warnings.is_empty());
        assert_eq!(report.total_sent, 2000);
    }

    #[test]
    fn test_high_bounce_rate_pauses() {
        // 6% bounces, no complaints
        let report = HealthMonitor::new().check_health(&[stats(100, 6, 0)]);
        assert!(!report.can_send);
        assert_eq!(report.action, HealthAction::Pause);
        assert!(report.warnings[0].contains("Critical bounce rate"));

        // Same result alongside a clean campaign that had no sends
        let report = HealthMonitor::new().check_health(&[stats(100, 6, 0), stats(0, 0, 0)]);
        assert!(!report.can_send);

        // 0%, 0.2% and 1% complaints
        for complaints in [0, 2, 10] {
            let report = HealthMonitor::new().check_health(&[stats(1000, 60, complaints)]);
            assert!(!report.can_send, "complaints = {}", complaints);
            assert_eq!(report.action, HealthAction::Pause);
            assert!(report.warnings[0].contains("Critical bounce rate"));
        }
    }

    #[test]
    fn test_bounce_tiers() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.check_health(&[stats(1000, 30, 0)]).action, HealthAction::Pause);
        assert_eq!(monitor.check_health(&[stats(1000, 10, 0)]).action, HealthAction::Warn);
        assert_eq!(monitor.check_health(&[stats(1000, 5, 0)]).action, HealthAction::Allow);
    }

    #[test]
    fn test_complaint_tiers() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.check_health(&[stats(10000, 0, 40)]).action, HealthAction::Pause);
        assert_eq!(monitor.check_health(&[stats(10000, 0, 20)]).action, HealthAction::Pause);
        assert_eq!(monitor.check_health(&[stats(10000, 0, 8)]).action, HealthAction::Warn);
        assert_eq!(monitor.check_health(&[stats(10000, 0, 5)]).action, HealthAction::Allow);
    }

    #[test]
    fn test_warn_keeps_sending() {
        let report = HealthMonitor::new().check_health(&[stats(1000, 10, 0)]);
        assert!(report.can_send);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.reason(), report.warnings[0]);
    }
}
