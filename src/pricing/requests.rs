//! Request DTOs for the pricing API.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use super::model::PricingContext;

/// Distinguishes an absent field (leave unchanged) from an explicit `null`
/// (clear the stored value) in partial updates.
fn double_option<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(d).map(Some)
}

fn default_participants() -> i32 {
    1
}

fn default_segment() -> String {
    "regular".to_string()
}

fn default_active() -> bool {
    true
}

/// Request to price a prospective booking
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default)]
    pub resource_id: Option<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_participants")]
    pub participants: i32,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default = "default_segment")]
    pub client_segment: String,
    /// Links the audit history entry to a booking when quoting for one
    #[serde(default)]
    pub booking_id: Option<Uuid>,
}

impl QuoteRequest {
    pub fn to_context(&self) -> PricingContext {
        PricingContext {
            service_id: self.service_id,
            resource_id: self.resource_id,
            start: self.start,
            end: self.end,
            participants: self.participants,
            client_id: self.client_id,
            client_segment: self.client_segment.clone(),
        }
    }
}

/// Request to create a pricing rule
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule_kind: String,
    /// Per-kind JSON payload; validated against `rule_kind` before writing
    pub condition: serde_json::Value,
    pub modifier_kind: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub modifier_value: Decimal,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub service_scope: Option<Vec<Uuid>>,
    #[serde(default)]
    pub resource_scope: Option<Vec<Uuid>>,
}

/// Partial update of a pricing rule. An absent field leaves the stored value
/// unchanged. `description`, `valid_from` and `valid_to` accept an explicit
/// `null` to clear the stored value; for the scope lists an empty list clears
/// the restriction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub rule_kind: Option<String>,
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
    #[serde(default)]
    pub modifier_kind: Option<String>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub modifier_value: Option<Decimal>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub valid_from: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub valid_to: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub service_scope: Option<Vec<Uuid>>,
    #[serde(default)]
    pub resource_scope: Option<Vec<Uuid>>,
}

/// Preset rule shapes the admin UI offers as one-click templates
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "preset", rename_all = "snake_case")]
pub enum PresetRuleRequest {
    /// Percentage surcharge inside a daily time window
    PeakHours {
        name: String,
        /// "HH:MM"
        start: String,
        /// "HH:MM"
        end: String,
        #[serde(with = "rust_decimal::serde::str")]
        surcharge_percent: Decimal,
        #[serde(default)]
        days: Option<Vec<u8>>,
    },
    /// Percentage discount for bookings spanning at least `min_days`
    EarlyBooking {
        name: String,
        min_days: u32,
        #[serde(with = "rust_decimal::serde::str")]
        discount_percent: Decimal,
    },
    /// Percentage surcharge on a weekday set (defaults to Sat/Sun)
    Weekend {
        name: String,
        #[serde(with = "rust_decimal::serde::str")]
        surcharge_percent: Decimal,
        #[serde(default)]
        priority: Option<i32>,
        #[serde(default)]
        days: Option<Vec<u8>>,
    },
    /// Percentage surcharge inside a calendar date range
    HighSeason {
        name: String,
        /// "YYYY-MM-DD"
        start_date: String,
        /// "YYYY-MM-DD"
        end_date: String,
        #[serde(with = "rust_decimal::serde::str")]
        surcharge_percent: Decimal,
    },
}

/// Query parameters for the GET quote variant (browser-friendly)
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteQuery {
    #[serde(default)]
    pub resource_id: Option<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_participants")]
    pub participants: i32,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default = "default_segment")]
    pub client_segment: String,
}

impl QuoteQuery {
    pub fn into_request(self, service_id: Uuid) -> QuoteRequest {
        QuoteRequest {
            service_id: Some(service_id),
            resource_id: self.resource_id,
            start: self.start,
            end: self.end,
            participants: self.participants,
            client_id: self.client_id,
            client_segment: self.client_segment,
            booking_id: None,
        }
    }
}

/// Query parameters for the week what-if simulator
#[derive(Debug, Clone, Deserialize)]
pub struct SimulateQuery {
    /// First day of the simulated week
    pub start_date: NaiveDate,
    #[serde(default)]
    pub resource_id: Option<Uuid>,
    /// Time of day the service starts, "HH:MM"
    #[serde(default = "default_simulation_time")]
    pub time: String,
    #[serde(default = "default_duration_hours")]
    pub duration_hours: i64,
    #[serde(default = "default_participants")]
    pub participants: i32,
    #[serde(default = "default_segment")]
    pub client_segment: String,
}

fn default_simulation_time() -> String {
    "10:00".to_string()
}

fn default_duration_hours() -> i64 {
    1
}

/// Query parameters for rule listing
#[derive(Debug, Clone, Deserialize)]
pub struct RuleListQuery {
    #[serde(default)]
    pub active_only: bool,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_list_limit() -> i64 {
    100
}

/// Query parameters for the history listing
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_distinguishes_absent_from_null() {
        let absent: UpdateRuleRequest = serde_json::from_str(r#"{"name": "renamed"}"#).unwrap();
        assert_eq!(absent.description, None);
        assert_eq!(absent.valid_to, None);

        let cleared: UpdateRuleRequest =
            serde_json::from_str(r#"{"description": null, "valid_to": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));
        assert_eq!(cleared.valid_to, Some(None));

        let set: UpdateRuleRequest =
            serde_json::from_str(r#"{"description": "seasonal"}"#).unwrap();
        assert_eq!(set.description, Some(Some("seasonal".to_string())));
    }

    #[test]
    fn quote_query_builds_service_request() {
        let query: QuoteQuery = serde_json::from_str(
            r#"{"start": "2026-03-02T10:00:00Z", "end": "2026-03-02T11:00:00Z"}"#,
        )
        .unwrap();
        let service_id = Uuid::new_v4();
        let req = query.into_request(service_id);
        assert_eq!(req.service_id, Some(service_id));
        assert_eq!(req.participants, 1);
        assert_eq!(req.client_segment, "regular");
        assert_eq!(req.booking_id, None);
    }

    #[test]
    fn simulate_query_defaults() {
        let query: SimulateQuery =
            serde_json::from_str(r#"{"start_date": "2026-03-02"}"#).unwrap();
        assert_eq!(query.time, "10:00");
        assert_eq!(query.duration_hours, 1);
        assert_eq!(query.participants, 1);
    }
}
