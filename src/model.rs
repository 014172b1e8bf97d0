//! Wire data model for the analytics and alerts endpoints.
//!
//! Field names follow the server's camelCase JSON. Every field is defaulted
//! so a partial push payload (a snapshot replacement carrying only the
//! fields that changed server-side) still deserializes; counts and amounts
//! are native numbers because payloads are normalized before they reach
//! these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current fraud-detection KPI state for a tenant/time range.
///
/// Replaced wholesale on every fetch or push — never merged field-by-field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSnapshot {
    pub total_transactions: u64,
    pub total_amount: f64,
    pub risk_distribution: RiskDistribution,
    pub status_distribution: Vec<StatusCount>,
    pub recent_transactions: Vec<RecentTransaction>,
    pub total_alerts: u64,
    pub high_risk_alerts: u64,
    pub detection_rate: f64,
    pub response_time: f64,
    pub blocked_amount: f64,
    pub false_positives: u64,
    pub recent_fraud_alerts: Vec<FraudAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// Transaction counts bucketed by risk level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskDistribution {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

/// One `{status, count}` pair of the status distribution. The server emits
/// the count under a Prisma-style `_count` key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusCount {
    pub status: String,
    #[serde(rename = "_count")]
    pub count: u64,
}

/// A recently observed transaction, bounded server-side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentTransaction {
    pub id: String,
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub risk_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// An individual flagged event.
///
/// Never mutated by the sync layer — alert lists are replaced as a whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FraudAlert {
    pub id: String,
    pub severity: String,
    pub risk_score: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Raw metadata blob as stored; see [`crate::metadata`] for the codec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// The time window a snapshot covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    #[test]
    fn snapshot_deserializes_from_normalized_wire_payload() {
        let wire = json!({
            "totalTransactions": "128",
            "totalAmount": "45210.75",
            "riskDistribution": { "high": "4", "medium": "19", "low": "105" },
            "statusDistribution": [
                { "status": "PENDING", "_count": "12" },
                { "status": "CLEARED", "_count": "116" },
            ],
            "recentTransactions": [{
                "id": "t1",
                "transactionId": "TXN-0001",
                "amount": "99.99",
                "currency": "NGN",
                "status": "PENDING",
                "riskScore": "0.82",
                "createdAt": "2026-08-20T10:15:00Z",
            }],
            "totalAlerts": "9",
            "highRiskAlerts": "4",
            "detectionRate": "0.93",
            "responseTime": "1.4",
            "blockedAmount": "1200",
            "falsePositives": "2",
            "recentFraudAlerts": [],
            "timeRange": { "from": "2026-08-01T00:00:00Z", "to": "2026-08-20T00:00:00Z" },
        });

        let snapshot: AnalyticsSnapshot = serde_json::from_value(normalize(wire)).unwrap();
        assert_eq!(snapshot.total_transactions, 128);
        assert_eq!(snapshot.risk_distribution.high, 4);
        assert_eq!(snapshot.status_distribution[0].count, 12);
        assert_eq!(snapshot.recent_transactions[0].amount, 99.99);
        assert_eq!(snapshot.false_positives, 2);
        assert!(snapshot.time_range.is_some());
    }

    #[test]
    fn partial_payload_fills_defaults() {
        let snapshot: AnalyticsSnapshot =
            serde_json::from_value(json!({ "totalTransactions": 10 })).unwrap();
        assert_eq!(snapshot.total_transactions, 10);
        assert_eq!(snapshot.total_amount, 0.0);
        assert!(snapshot.recent_transactions.is_empty());
        assert!(snapshot.time_range.is_none());
    }

    #[test]
    fn alert_list_deserializes() {
        let wire = json!([
            { "id": "a1", "severity": "HIGH", "riskScore": "0.97", "status": "OPEN" },
            { "id": "a2", "severity": "LOW", "riskScore": 0.12, "status": "DISMISSED" },
        ]);
        let alerts: Vec<FraudAlert> = serde_json::from_value(normalize(wire)).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].risk_score, 0.97);
    }
}
