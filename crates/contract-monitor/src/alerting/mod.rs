//! Threshold alerting with escalation, suppression and multi-channel delivery.
//!
//! ```text
//!   PerformanceSnapshot ──► AlertManager::evaluate ──► Alert (firing)
//!                                 │                        │
//!                                 ├── SuppressionRule      ├── EscalationRule (typed predicate)
//!                                 └── resolution policy    ▼
//!                                                  take_pending ──► dispatch ──► AlertNotifier
//! ```

pub mod delivery;
pub mod manager;
pub mod rules;
pub mod types;

pub use delivery::{
    deliver, dispatch, select_channels, AlertChannel, AlertNotifier, ChannelKind,
    DeliveryFailure, DispatchReport, PendingDelivery, TracingNotifier,
};
pub use manager::{AlertManager, AlertingConfig, Evaluation};
pub use rules::{AlertPredicate, EscalationRule, SuppressionRule};
pub use types::{Alert, AlertSeverity, AlertStatus, ComparisonOperator, ThresholdConfig};
