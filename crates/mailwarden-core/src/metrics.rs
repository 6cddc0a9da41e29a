//! Prometheus counters for sends, webhooks and contact lifecycle

use mailwarden_common::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Engine metrics. Cloning shares the underlying counters.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Send attempts by outcome (`sent`, `failed`)
    pub sends: IntCounterVec,
    /// Campaigns finished by terminal status
    pub campaigns: IntCounterVec,
    /// Campaign starts refused by a gate (`health`, `daily_limit`, `spam`)
    pub policy_rejections: IntCounterVec,
    /// Normalized webhook events by provider and type
    pub webhook_events: IntCounterVec,
    /// Contact and send mutations driven by feedback
    pub lifecycle: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("mailwarden".to_string()), None).map_err(metrics_error)?;

        let sends = counter(&registry, "sends_total", "Send attempts", &["outcome"])?;
        let campaigns = counter(&registry, "campaigns_completed_total", "Completed campaigns", &["status"])?;
        let policy_rejections = counter(
            &registry,
            "policy_rejections_total",
            "Campaign starts refused by a gate",
            &["gate"],
        )?;
        let webhook_events = counter(
            &registry,
            "webhook_events_total",
            "Normalized webhook events",
            &["provider", "event_type"],
        )?;
        let lifecycle = counter(
            &registry,
            "lifecycle_transitions_total",
            "Feedback-driven contact transitions",
            &["transition"],
        )?;

        Ok(Self {
            registry,
            sends,
            campaigns,
            policy_rejections,
            webhook_events,
            lifecycle,
        })
    }

    /// Prometheus text exposition of every counter
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).map_err(metrics_error)?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(metrics_error)?;
    Ok(counter)
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.sends.with_label_values(&["sent"]).inc_by(3);
        metrics
            .webhook_events
            .with_label_values(&["sendgrid", "bounce"])
            .inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("mailwarden_sends_total{outcome=\"sent\"} 3"));
        assert!(text.contains("mailwarden_webhook_events_total"));
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new().unwrap();
        let clone = metrics.clone();
        clone.lifecycle.with_label_values(&["bounced"]).inc();
        assert_eq!(metrics.lifecycle.with_label_values(&["bounced"]).get(), 1);
    }
}
