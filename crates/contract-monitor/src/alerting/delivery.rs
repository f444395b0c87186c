//! Multi-channel alert delivery.
//!
//! Delivery is best-effort: every channel is attempted concurrently and a
//! failure on one channel is logged and reported without affecting the
//! others.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::MonitorResult;

use super::types::{Alert, AlertSeverity};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Email,
    Webhook,
    Log,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Slack => write!(f, "slack"),
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Webhook => write!(f, "webhook"),
            ChannelKind::Log => write!(f, "log"),
        }
    }
}

/// A configured notification destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertChannel {
    pub name: String,
    pub kind: ChannelKind,
    /// Severities this channel receives.
    pub severities: Vec<AlertSeverity>,
    pub enabled: bool,
    /// Webhook URL, mail address or similar; unused by `log` channels.
    #[serde(default)]
    pub target: String,
}

impl AlertChannel {
    pub fn accepts(&self, severity: AlertSeverity) -> bool {
        self.enabled && self.severities.contains(&severity)
    }
}

/// Sends one alert to one channel.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, channel: &AlertChannel, alert: &Alert) -> MonitorResult<()>;
}

/// Notifier that records dispatches as log events.
#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, channel: &AlertChannel, alert: &Alert) -> MonitorResult<()> {
        info!(
            channel = %channel.name,
            kind = %channel.kind,
            alert_id = %alert.id,
            metric = %alert.metric_name,
            severity = %alert.severity,
            value = alert.value,
            threshold = alert.threshold,
            escalated = alert.escalated,
            "alert dispatched"
        );
        Ok(())
    }
}

/// An alert copied out of session state together with its destinations.
#[derive(Clone, Debug)]
pub struct PendingDelivery {
    pub alert: Alert,
    pub channels: Vec<AlertChannel>,
    /// Escalation level that triggered this delivery; `None` for the
    /// initial notification.
    pub escalation_level: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub alert_id: Uuid,
    pub channel: String,
    pub reason: String,
}

/// Outcome of one dispatch round.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub escalations: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.escalations += other.escalations;
        self.failures.extend(other.failures);
    }
}

/// Channels that should receive `alert` by severity.
pub fn select_channels(alert: &Alert, channels: &[AlertChannel]) -> Vec<AlertChannel> {
    channels
        .iter()
        .filter(|c| c.accepts(alert.severity))
        .cloned()
        .collect()
}

/// Send `alert` to every given channel concurrently.
pub async fn send(
    notifier: &dyn AlertNotifier,
    alert: &Alert,
    channels: &[AlertChannel],
) -> DispatchReport {
    let results = join_all(channels.iter().map(|c| notifier.notify(c, alert))).await;

    let mut report = DispatchReport {
        attempted: channels.len(),
        ..DispatchReport::default()
    };
    for (channel, result) in channels.iter().zip(results) {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(
                    channel = %channel.name,
                    alert_id = %alert.id,
                    error = %e,
                    "alert delivery failed"
                );
                report.failures.push(DeliveryFailure {
                    alert_id: alert.id,
                    channel: channel.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Deliver to every enabled channel whose severity list contains the
/// alert's severity.
pub async fn deliver(
    notifier: &dyn AlertNotifier,
    alert: &Alert,
    channels: &[AlertChannel],
) -> DispatchReport {
    send(notifier, alert, &select_channels(alert, channels)).await
}

/// Deliver a batch copied out of session state.
pub async fn dispatch(notifier: &dyn AlertNotifier, pending: &[PendingDelivery]) -> DispatchReport {
    let reports = join_all(
        pending
            .iter()
            .map(|p| send(notifier, &p.alert, &p.channels)),
    )
    .await;

    let mut total = DispatchReport::default();
    for (p, report) in pending.iter().zip(reports) {
        if p.escalation_level.is_some() {
            total.escalations += 1;
        }
        total.merge(report);
    }
    total
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::error::MonitorError;

    /// Records every notification; fails for channels named in `failing`.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, Uuid)>>,
        pub failing: Vec<String>,
    }

    impl RecordingNotifier {
        pub fn failing_on(channels: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: channels.iter().map(|c| c.to_string()).collect(),
            }
        }

        pub fn sent_channels(&self) -> Vec<String> {
            let mut names: Vec<String> = self
                .sent
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect();
            names.sort();
            names
        }
    }

    #[async_trait]
    impl AlertNotifier for RecordingNotifier {
        async fn notify(&self, channel: &AlertChannel, alert: &Alert) -> MonitorResult<()> {
            if self.failing.contains(&channel.name) {
                return Err(MonitorError::Delivery {
                    channel: channel.name.clone(),
                    reason: "connection refused".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.name.clone(), alert.id));
            Ok(())
        }
    }
}
