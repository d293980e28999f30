//! Monitoring for the Tally election ledger.
//!
//! Everything here is derived from ledger, pool and contract state; nothing
//! feeds back into block production.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐
//! │  BlockProducer   │   │    RuleEngine    │
//! │ (ledger + pool)  │   │ (contract table) │
//! └────────┬─────────┘   └────────┬─────────┘
//!          └──────────┬───────────┘
//!                     ▼
//!           ┌───────────────────┐      ┌─────────────────┐
//!           │      Monitor      │─────▶│ metrics_history │
//!           │ sample / classify │      │ (bounded, FIFO) │
//!           └───────────────────┘      └─────────────────┘
//!                     │
//!       ┌─────────────┼──────────────┐
//!       ▼             ▼              ▼
//!   metrics       health +       analytics
//!                 anomalies
//! ```

pub mod analytics;
pub mod health;
pub mod metrics;
mod monitor;

pub use analytics::{
    BlockStatistics, NetworkTopology, NodeSummary, TransactionAnalytics, ValidatorPerformance,
};
pub use health::{Anomaly, AnomalyKind, HealthReport, HealthStatus, Severity};
pub use metrics::RealtimeMetrics;
pub use monitor::{Monitor, MonitorConfig};
