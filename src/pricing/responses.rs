//! Response DTOs for the pricing API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::model::{PriceRuleRow, PricingHistoryRow};

/// Stored rule as returned by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct RuleResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule_kind: String,
    pub condition: serde_json::Value,
    pub modifier_kind: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub modifier_value: Decimal,
    pub priority: i32,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub service_scope: serde_json::Value,
    pub resource_scope: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<PriceRuleRow> for RuleResponse {
    fn from(row: PriceRuleRow) -> Self {
        RuleResponse {
            id: row.id,
            name: row.name,
            description: row.description,
            rule_kind: row.rule_kind,
            condition: parse_or_raw(&row.condition),
            modifier_kind: row.modifier_kind,
            modifier_value: row.modifier_value,
            priority: row.priority,
            active: row.active,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            service_scope: scope_value(row.service_scope.as_deref()),
            resource_scope: scope_value(row.resource_scope.as_deref()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Stored text columns are echoed as parsed JSON when possible so clients
/// never have to double-decode; unparseable legacy data comes back verbatim.
fn parse_or_raw(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn scope_value(raw: Option<&str>) -> serde_json::Value {
    match raw {
        None => serde_json::Value::Null,
        Some(s) => parse_or_raw(s),
    }
}

/// One audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    #[serde(with = "rust_decimal::serde::str")]
    pub base_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub final_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_discount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_surcharge: Decimal,
    pub applications: serde_json::Value,
    pub computed_at: DateTime<Utc>,
}

impl From<PricingHistoryRow> for HistoryEntryResponse {
    fn from(row: PricingHistoryRow) -> Self {
        HistoryEntryResponse {
            id: row.id,
            booking_id: row.booking_id,
            service_id: row.service_id,
            resource_id: row.resource_id,
            base_price: row.base_price,
            final_price: row.final_price,
            total_discount: row.total_discount,
            total_surcharge: row.total_surcharge,
            applications: row.applications,
            computed_at: row.computed_at,
        }
    }
}

/// Simple acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// One day of the week what-if simulation. A day that fails to price carries
/// the error message instead of figures; other days are unaffected.
#[derive(Debug, Clone, Serialize)]
pub struct DaySimulationResponse {
    pub weekday: String,
    pub date: chrono::NaiveDate,
    #[serde(with = "rust_decimal::serde::str_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_discount: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_surcharge: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_applied: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Week what-if simulation: the same service priced at the same time of day
/// for seven consecutive days.
#[derive(Debug, Clone, Serialize)]
pub struct WeekSimulationResponse {
    pub service_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    pub start_date: chrono::NaiveDate,
    pub days: Vec<DaySimulationResponse>,
}

/// Aggregate counts over the stored rule set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleStatsResponse {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub by_kind: std::collections::BTreeMap<String, u64>,
    pub by_modifier: std::collections::BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_round_trips_as_json() {
        let v = parse_or_raw(r#"{"days": [5, 6]}"#);
        assert_eq!(v["days"][0], 5);
    }

    #[test]
    fn unparseable_condition_comes_back_verbatim() {
        let v = parse_or_raw("{broken");
        assert_eq!(v, serde_json::Value::String("{broken".to_string()));
    }

    #[test]
    fn missing_scope_is_null() {
        assert_eq!(scope_value(None), serde_json::Value::Null);
    }
}
