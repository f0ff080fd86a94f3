//! Domain model for the pricing rule engine.
//!
//! Stored rules carry their condition as a JSON text column; decoding happens
//! once per snapshot load (`PriceRuleRow::decode`), so the engine itself only
//! ever sees strongly typed conditions.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

/// Kind of condition a rule evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Weekday,
    TimeWindow,
    Season,
    Holiday,
    /// Historically "book N days in advance"; as built it tests booking
    /// duration in days. See `Condition::MinBookingDays`.
    Anticipation,
    Duration,
    Resource,
    Participants,
    ClientSegment,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Weekday => "weekday",
            RuleKind::TimeWindow => "time_window",
            RuleKind::Season => "season",
            RuleKind::Holiday => "holiday",
            RuleKind::Anticipation => "anticipation",
            RuleKind::Duration => "duration",
            RuleKind::Resource => "resource",
            RuleKind::Participants => "participants",
            RuleKind::ClientSegment => "client_segment",
        }
    }

    pub fn parse(s: &str) -> Option<RuleKind> {
        match s {
            "weekday" => Some(RuleKind::Weekday),
            "time_window" => Some(RuleKind::TimeWindow),
            "season" => Some(RuleKind::Season),
            "holiday" => Some(RuleKind::Holiday),
            "anticipation" => Some(RuleKind::Anticipation),
            "duration" => Some(RuleKind::Duration),
            "resource" => Some(RuleKind::Resource),
            "participants" => Some(RuleKind::Participants),
            "client_segment" => Some(RuleKind::ClientSegment),
            _ => None,
        }
    }
}

/// How a matching rule transforms the running price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    /// `price * (1 + value/100)`
    Percentage,
    /// `price + value`
    FixedDelta,
    /// `value`, discarding the running price entirely
    FixedAbsolute,
}

impl ModifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModifierKind::Percentage => "percentage",
            ModifierKind::FixedDelta => "fixed_delta",
            ModifierKind::FixedAbsolute => "fixed_absolute",
        }
    }

    pub fn parse(s: &str) -> Option<ModifierKind> {
        match s {
            "percentage" => Some(ModifierKind::Percentage),
            "fixed_delta" => Some(ModifierKind::FixedDelta),
            "fixed_absolute" => Some(ModifierKind::FixedAbsolute),
            _ => None,
        }
    }
}

fn default_window_start() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap()
}

fn default_window_end() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap()
}

fn default_party_min() -> i32 {
    1
}

/// Serde shapes for the per-kind JSON condition payloads. These are the wire
/// format stored in `pricing_rule.condition` and accepted by the admin API.
pub mod payload {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Weekdays {
        /// 0 = Monday .. 6 = Sunday
        #[serde(default)]
        pub days: Vec<u8>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TimeWindow {
        #[serde(default = "super::default_window_start", with = "hhmm")]
        pub start: NaiveTime,
        #[serde(default = "super::default_window_end", with = "hhmm")]
        pub end: NaiveTime,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Season {
        pub start: NaiveDate,
        pub end: NaiveDate,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MinBookingDays {
        #[serde(default)]
        pub min_days: Decimal,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DurationRange {
        #[serde(default)]
        pub min_minutes: Decimal,
        #[serde(default)]
        pub max_minutes: Option<Decimal>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartyRange {
        #[serde(default = "super::default_party_min")]
        pub min: i32,
        #[serde(default)]
        pub max: Option<i32>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientSegments {
        #[serde(default)]
        pub segments: Vec<String>,
    }

    /// `"HH:MM"` serde codec for time-of-day window bounds.
    pub mod hhmm {
        use chrono::NaiveTime;
        use serde::{self, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&t.format("%H:%M").to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
            let raw = String::deserialize(d)?;
            NaiveTime::parse_from_str(&raw, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
                .map_err(serde::de::Error::custom)
        }
    }
}

/// Typed condition, one variant per rule kind.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Weekday of the booking start is in the set (0 = Monday .. 6 = Sunday).
    Weekdays { days: Vec<u8> },
    /// Time of day of the booking start falls in [start, end], inclusive.
    TimeWindow { start: NaiveTime, end: NaiveTime },
    /// Calendar date of the booking start falls in [start, end], inclusive.
    Season { start: NaiveDate, end: NaiveDate },
    /// Booking start date is in the fixed holiday table.
    Holiday,
    /// Booking duration in days is at least `min_days`. Despite the stored
    /// kind name ("anticipation"), this measures how long the booking runs,
    /// not how far in advance it was made.
    MinBookingDays { min_days: Decimal },
    /// Booking duration in minutes falls in [min, max], inclusive.
    DurationRange {
        min_minutes: Decimal,
        max_minutes: Option<Decimal>,
    },
    /// Stored kind with no evaluation semantics; never matches.
    ResourceKind,
    /// Participant count falls in [min, max], inclusive.
    PartyRange { min: i32, max: Option<i32> },
    /// Client segment label is in the allow-list.
    ClientSegments { segments: Vec<String> },
}

impl Condition {
    pub fn kind(&self) -> RuleKind {
        match self {
            Condition::Weekdays { .. } => RuleKind::Weekday,
            Condition::TimeWindow { .. } => RuleKind::TimeWindow,
            Condition::Season { .. } => RuleKind::Season,
            Condition::Holiday => RuleKind::Holiday,
            Condition::MinBookingDays { .. } => RuleKind::Anticipation,
            Condition::DurationRange { .. } => RuleKind::Duration,
            Condition::ResourceKind => RuleKind::Resource,
            Condition::PartyRange { .. } => RuleKind::Participants,
            Condition::ClientSegments { .. } => RuleKind::ClientSegment,
        }
    }

    /// Decode a JSON payload into the typed condition for `kind`.
    pub fn decode(kind: RuleKind, raw: &str) -> Result<Condition, RuleDecodeError> {
        let bad = |e: serde_json::Error| RuleDecodeError::Condition {
            kind,
            source: e,
        };
        let condition = match kind {
            RuleKind::Weekday => {
                let p: payload::Weekdays = serde_json::from_str(raw).map_err(bad)?;
                Condition::Weekdays { days: p.days }
            }
            RuleKind::TimeWindow => {
                let p: payload::TimeWindow = serde_json::from_str(raw).map_err(bad)?;
                Condition::TimeWindow {
                    start: p.start,
                    end: p.end,
                }
            }
            RuleKind::Season => {
                let p: payload::Season = serde_json::from_str(raw).map_err(bad)?;
                Condition::Season {
                    start: p.start,
                    end: p.end,
                }
            }
            RuleKind::Holiday => {
                // No payload fields, but it must still be well-formed JSON.
                let _: serde_json::Value = serde_json::from_str(raw).map_err(bad)?;
                Condition::Holiday
            }
            RuleKind::Anticipation => {
                let p: payload::MinBookingDays = serde_json::from_str(raw).map_err(bad)?;
                Condition::MinBookingDays { min_days: p.min_days }
            }
            RuleKind::Duration => {
                let p: payload::DurationRange = serde_json::from_str(raw).map_err(bad)?;
                Condition::DurationRange {
                    min_minutes: p.min_minutes,
                    max_minutes: p.max_minutes,
                }
            }
            RuleKind::Resource => {
                let _: serde_json::Value = serde_json::from_str(raw).map_err(bad)?;
                Condition::ResourceKind
            }
            RuleKind::Participants => {
                let p: payload::PartyRange = serde_json::from_str(raw).map_err(bad)?;
                Condition::PartyRange {
                    min: p.min,
                    max: p.max,
                }
            }
            RuleKind::ClientSegment => {
                let p: payload::ClientSegments = serde_json::from_str(raw).map_err(bad)?;
                Condition::ClientSegments {
                    segments: p.segments,
                }
            }
        };
        Ok(condition)
    }
}

/// A decoded, evaluatable pricing rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub condition: Condition,
    pub modifier: ModifierKind,
    pub modifier_value: Decimal,
    pub priority: i32,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    /// `None` means unrestricted. An empty stored list also decodes to `None`.
    pub service_scope: Option<Vec<Uuid>>,
    pub resource_scope: Option<Vec<Uuid>>,
}

impl Rule {
    /// Check whether the rule's validity window contains `at`. Unset bounds
    /// are unbounded on that side.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if from > at {
                return false;
            }
        }
        match self.valid_to {
            Some(to) => at <= to,
            None => true,
        }
    }
}

/// The facts about one prospective booking that rules are evaluated against.
#[derive(Debug, Clone)]
pub struct PricingContext {
    pub service_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub participants: i32,
    pub client_id: Option<Uuid>,
    pub client_segment: String,
}

impl PricingContext {
    pub fn duration_minutes(&self) -> Decimal {
        Decimal::from((self.end - self.start).num_seconds()) / Decimal::from(60)
    }

    pub fn duration_days(&self) -> Decimal {
        Decimal::from((self.end - self.start).num_seconds()) / Decimal::from(86_400)
    }

    pub fn duration_hours(&self) -> Decimal {
        Decimal::from((self.end - self.start).num_seconds()) / Decimal::from(3_600)
    }
}

/// One step of the audit trail: a rule that matched and its price effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleApplication {
    pub rule_id: Uuid,
    pub name: String,
    pub rule_kind: RuleKind,
    pub modifier: ModifierKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub modifier_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub surcharge: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_after: Decimal,
}

/// Outcome of one pricing computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingResult {
    #[serde(with = "rust_decimal::serde::str")]
    pub base_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub final_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_discount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_surcharge: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_savings: Decimal,
    pub applications: Vec<RuleApplication>,
    /// Display-only details (service/resource names, duration, timestamps).
    /// Empty as returned by the pure engine; filled by the service layer.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Why a stored rule row could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum RuleDecodeError {
    #[error("unknown rule kind '{0}'")]
    UnknownKind(String),
    #[error("unknown modifier kind '{0}'")]
    UnknownModifier(String),
    #[error("malformed condition payload for {kind:?}: {source}")]
    Condition {
        kind: RuleKind,
        source: serde_json::Error,
    },
}

/// Raw row from `pricing_rule`.
#[derive(Debug, Clone, FromRow)]
pub struct PriceRuleRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule_kind: String,
    pub condition: String,
    pub modifier_kind: String,
    pub modifier_value: Decimal,
    pub priority: i32,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub service_scope: Option<String>,
    pub resource_scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PriceRuleRow {
    /// Decode the raw row into an evaluatable `Rule`.
    ///
    /// Failure policies differ on purpose and must stay distinct:
    /// a malformed condition payload fails the whole rule (the caller skips
    /// it), while a malformed scope allow-list decodes to "unrestricted".
    pub fn decode(&self) -> Result<Rule, RuleDecodeError> {
        let kind = RuleKind::parse(&self.rule_kind)
            .ok_or_else(|| RuleDecodeError::UnknownKind(self.rule_kind.clone()))?;
        let modifier = ModifierKind::parse(&self.modifier_kind)
            .ok_or_else(|| RuleDecodeError::UnknownModifier(self.modifier_kind.clone()))?;
        let condition = Condition::decode(kind, &self.condition)?;

        Ok(Rule {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            condition,
            modifier,
            modifier_value: self.modifier_value,
            priority: self.priority,
            active: self.active,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            service_scope: decode_scope(self.id, "service_scope", self.service_scope.as_deref()),
            resource_scope: decode_scope(self.id, "resource_scope", self.resource_scope.as_deref()),
        })
    }
}

/// Lenient scope decoding: a scope column that fails to parse as a JSON array
/// of ids leaves the rule unrestricted rather than dropping it. An empty
/// array is also unrestricted.
fn decode_scope(rule_id: Uuid, column: &str, raw: Option<&str>) -> Option<Vec<Uuid>> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<Uuid>>(raw) {
        Ok(ids) if ids.is_empty() => None,
        Ok(ids) => Some(ids),
        Err(e) => {
            warn!(%rule_id, column, error = %e, "malformed scope list, treating rule as unrestricted");
            None
        }
    }
}

/// Fixed holiday table: Jan 1, Dec 25, Dec 31.
pub const HOLIDAYS: &[(u32, u32)] = &[(1, 1), (12, 25), (12, 31)];

/// Bookable service with a fixed price (duration baked in).
#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub id: Uuid,
    pub name: String,
    pub base_price: Decimal,
    pub duration_minutes: i32,
    pub active: bool,
}

/// Bookable resource billed by the hour.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    pub id: Uuid,
    pub name: String,
    pub hourly_rate: Decimal,
    pub active: bool,
}

/// Persisted audit record of one pricing computation.
#[derive(Debug, Clone, FromRow)]
pub struct PricingHistoryRow {
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    pub base_price: Decimal,
    pub final_price: Decimal,
    pub total_discount: Decimal,
    pub total_surcharge: Decimal,
    pub applications: serde_json::Value,
    pub computed_at: DateTime<Utc>,
}
