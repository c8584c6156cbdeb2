//! Alert sink seam: the orchestrator raises alerts on kill-switch trips,
//! risk-gate rejections and component failures; where those alerts are
//! delivered (Slack, PagerDuty, email) is out of scope, so the only
//! shipped implementation logs through `tracing` at the matching level.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Destination for operational alerts. Transport-agnostic on purpose: a
/// production deployment can compose this with whatever notification
/// system it already has without the orchestrator knowing about it.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: Alert);
}

/// Default sink: logs every alert through `tracing` at the level it
/// carries. Always available, never needs configuration.
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => {
                tracing::info!(component = %alert.component, "{}", alert.message)
            }
            AlertLevel::Warning => {
                warn!(component = %alert.component, "{}", alert.message)
            }
            AlertLevel::Critical => {
                error!(component = %alert.component, "{}", alert.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracing_sink_accepts_all_levels() {
        let sink = TracingAlertSink;
        sink.send(Alert::new(AlertLevel::Info, "watchdog", "ok")).await;
        sink.send(Alert::new(AlertLevel::Warning, "risk_gate", "near cap")).await;
        sink.send(Alert::new(AlertLevel::Critical, "kill_switch", "tripped")).await;
    }

    #[test]
    fn alert_levels_order_by_severity() {
        assert!(AlertLevel::Info < AlertLevel::Warning);
        assert!(AlertLevel::Warning < AlertLevel::Critical);
    }
}
