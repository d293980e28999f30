//! Health classification and anomaly detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_chain::NetworkHealth;

use crate::metrics::RealtimeMetrics;
use crate::monitor::MonitorConfig;

/// Overall status, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Health verdict with reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub metrics: RealtimeMetrics,
}

/// Classify a metrics sample.
pub fn assess(metrics: RealtimeMetrics, config: &MonitorConfig) -> HealthReport {
    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let mut flag = |level: HealthStatus, issue: String, advice: &str| {
        status = status.max(level);
        issues.push(issue);
        recommendations.push(advice.to_string());
    };

    if !metrics.chain_valid {
        flag(
            HealthStatus::Critical,
            "blockchain integrity check failed".into(),
            "Stop block production and audit the chain for tampering",
        );
    }
    if metrics.consensus_health == NetworkHealth::Critical {
        flag(
            HealthStatus::Critical,
            "consensus is critical".into(),
            "Bring at least two validators back online",
        );
    }

    let block_time = metrics.average_block_time_ms;
    if block_time > config.block_time_critical_ms as f64 {
        flag(
            HealthStatus::Critical,
            format!("average block time {block_time:.0} ms exceeds {} ms", config.block_time_critical_ms),
            "Check validator availability and producer scheduling",
        );
    } else if block_time > config.block_time_warning_ms as f64 {
        flag(
            HealthStatus::Warning,
            format!("average block time {block_time:.0} ms exceeds {} ms", config.block_time_warning_ms),
            "Monitor validator performance",
        );
    }

    let pending = metrics.pending_transactions;
    if pending > config.pending_critical {
        flag(
            HealthStatus::Critical,
            format!("{pending} pending transactions (limit {})", config.pending_critical),
            "Increase batch throughput or shed load",
        );
    } else if pending > config.pending_warning {
        flag(
            HealthStatus::Warning,
            format!("{pending} pending transactions (threshold {})", config.pending_warning),
            "Watch the transaction backlog",
        );
    }

    if metrics.active_nodes < config.min_active_nodes {
        flag(
            HealthStatus::Warning,
            format!(
                "only {} active nodes (minimum {})",
                metrics.active_nodes, config.min_active_nodes
            ),
            "Add or reactivate nodes",
        );
    }

    HealthReport {
        status,
        issues,
        recommendations,
        metrics,
    }
}

/// Anomaly category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Performance,
    Security,
    Consensus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A classified finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub detected_at: DateTime<Utc>,
}

/// Findings for a metrics sample, in a fixed order.
pub fn detect(metrics: &RealtimeMetrics, config: &MonitorConfig) -> Vec<Anomaly> {
    let at = metrics.timestamp;
    let mut found = Vec::new();
    let mut push = |kind, severity, message: String| {
        found.push(Anomaly {
            kind,
            severity,
            message,
            detected_at: at,
        })
    };

    if !metrics.chain_valid {
        push(
            AnomalyKind::Security,
            Severity::High,
            "blockchain integrity compromised".into(),
        );
    }
    if metrics.consensus_health == NetworkHealth::Critical {
        push(
            AnomalyKind::Consensus,
            Severity::High,
            "consensus health is critical".into(),
        );
    }
    if metrics.pending_transactions > config.pending_critical {
        push(
            AnomalyKind::Performance,
            Severity::High,
            format!("{} transactions pending", metrics.pending_transactions),
        );
    }
    if metrics.average_block_time_ms > config.block_time_critical_ms as f64 {
        push(
            AnomalyKind::Performance,
            Severity::Medium,
            format!("average block time {:.0} ms", metrics.average_block_time_ms),
        );
    }

    found
}
