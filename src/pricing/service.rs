//! Pricing orchestration with database and cache access.
//!
//! `quote` resolves the base price from the catalogs, loads an immutable rule
//! snapshot, and hands both to the pure engine. Rule administration validates
//! condition payloads at write time so malformed data is rejected before it
//! is stored; the decode-time skip in `model` stays as a fallback for rows
//! that predate validation.

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::cache::AppCache;
use crate::error::AppError;

use super::engine;
use super::model::{
    Condition, ModifierKind, PriceRuleRow, PricingContext, PricingResult, ResourceRow, Rule,
    RuleKind, ServiceRow,
};
use super::queries::{self, HistoryWrite, RuleWrite};
use super::requests::{
    CreateRuleRequest, PresetRuleRequest, QuoteRequest, SimulateQuery, UpdateRuleRequest,
};
use super::responses::{DaySimulationResponse, RuleStatsResponse, WeekSimulationResponse};

/// Decode raw rule rows into the evaluatable snapshot, skipping rows whose
/// condition payload does not decode. One bad rule never poisons the set.
pub fn decode_snapshot(rows: &[PriceRuleRow]) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        match row.decode() {
            Ok(rule) => rules.push(rule),
            Err(e) => warn!(rule_id = %row.id, rule_name = %row.name, error = %e, "skipping undecodable pricing rule"),
        }
    }
    rules
}

/// Fetch the active-rule snapshot, serving from cache when warm.
pub async fn load_snapshot(pool: &PgPool, cache: &AppCache) -> Result<Arc<Vec<Rule>>, AppError> {
    if let Some(snapshot) = cache.get_rules().await {
        return Ok(snapshot);
    }
    let rows = queries::load_active_rule_rows(pool).await?;
    let snapshot = Arc::new(decode_snapshot(&rows));
    cache.put_rules(snapshot.clone()).await;
    Ok(snapshot)
}

async fn get_service_cached(
    pool: &PgPool,
    cache: &AppCache,
    id: Uuid,
) -> Result<Option<Arc<ServiceRow>>, AppError> {
    if let Some(row) = cache.services.get(&id).await {
        return Ok(Some(row));
    }
    match queries::get_service(pool, id).await? {
        Some(row) => {
            let row = Arc::new(row);
            cache.services.insert(id, row.clone()).await;
            Ok(Some(row))
        }
        None => Ok(None),
    }
}

async fn get_resource_cached(
    pool: &PgPool,
    cache: &AppCache,
    id: Uuid,
) -> Result<Option<Arc<ResourceRow>>, AppError> {
    if let Some(row) = cache.resources.get(&id).await {
        return Ok(Some(row));
    }
    match queries::get_resource(pool, id).await? {
        Some(row) => {
            let row = Arc::new(row);
            cache.resources.insert(id, row.clone()).await;
            Ok(Some(row))
        }
        None => Ok(None),
    }
}

struct BasePrice {
    amount: Decimal,
    service_name: Option<String>,
    resource_name: Option<String>,
}

/// Resolve the base price for the context. A service id wins when both are
/// present: services carry a fixed price with the duration baked in, while a
/// resource is billed hourly for the booked span.
async fn resolve_base_price(
    pool: &PgPool,
    cache: &AppCache,
    ctx: &PricingContext,
) -> Result<BasePrice, AppError> {
    if let Some(service_id) = ctx.service_id {
        let service = get_service_cached(pool, cache, service_id)
            .await?
            .ok_or(AppError::NotFound("service"))?;
        return Ok(BasePrice {
            amount: service.base_price,
            service_name: Some(service.name.clone()),
            resource_name: None,
        });
    }
    if let Some(resource_id) = ctx.resource_id {
        let resource = get_resource_cached(pool, cache, resource_id)
            .await?
            .ok_or(AppError::NotFound("resource"))?;
        return Ok(BasePrice {
            amount: resource.hourly_rate * ctx.duration_hours(),
            service_name: None,
            resource_name: Some(resource.name.clone()),
        });
    }
    Err(AppError::NotFound("price source"))
}

fn validate_context(req: &QuoteRequest) -> Result<(), AppError> {
    if req.end <= req.start {
        return Err(AppError::Validation(
            "booking end must be after start".to_string(),
        ));
    }
    if req.participants < 1 {
        return Err(AppError::Validation(
            "participants must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Price a prospective booking.
pub async fn quote(
    pool: &PgPool,
    cache: &AppCache,
    req: &QuoteRequest,
) -> Result<PricingResult, AppError> {
    validate_context(req)?;
    let ctx = req.to_context();

    let base = resolve_base_price(pool, cache, &ctx).await?;
    let snapshot = load_snapshot(pool, cache).await?;

    let mut result = engine::calculate(base.amount, &ctx, &snapshot);

    // Display-only details; the priced figures above never depend on these.
    let meta = &mut result.metadata;
    if let Some(name) = base.service_name {
        meta.insert("service_name".to_string(), name.into());
    }
    if let Some(name) = base.resource_name {
        meta.insert("resource_name".to_string(), name.into());
    }
    meta.insert(
        "duration_minutes".to_string(),
        ctx.duration_minutes().to_string().into(),
    );
    meta.insert("participants".to_string(), ctx.participants.into());
    meta.insert(
        "computed_at".to_string(),
        Utc::now().to_rfc3339().into(),
    );

    Ok(result)
}

/// Persist the audit record for a computed quote. Callers treat this as
/// fire-and-forget; a failed write is logged and never fails the quote.
pub async fn record_history(pool: &PgPool, req: &QuoteRequest, result: &PricingResult) {
    let applications = match serde_json::to_value(&result.applications) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to serialize rule applications for history: {}", e);
            return;
        }
    };
    let write = HistoryWrite {
        booking_id: req.booking_id,
        service_id: req.service_id,
        resource_id: req.resource_id,
        base_price: result.base_price,
        final_price: result.final_price,
        total_discount: result.total_discount,
        total_surcharge: result.total_surcharge,
        applications,
    };
    if let Err(e) = queries::insert_history(pool, &write).await {
        warn!("failed to record pricing history: {}", e);
    }
}

fn parse_kind(kind: &str) -> Result<RuleKind, AppError> {
    RuleKind::parse(kind)
        .ok_or_else(|| AppError::Validation(format!("unknown rule kind '{}'", kind)))
}

fn parse_modifier(kind: &str) -> Result<ModifierKind, AppError> {
    ModifierKind::parse(kind)
        .ok_or_else(|| AppError::Validation(format!("unknown modifier kind '{}'", kind)))
}

/// Write-time condition validation: the payload must decode into the typed
/// condition for the declared kind.
fn validate_condition(kind: RuleKind, condition: &serde_json::Value) -> Result<String, AppError> {
    let raw = condition.to_string();
    Condition::decode(kind, &raw)
        .map_err(|e| AppError::Validation(format!("invalid condition payload: {}", e)))?;
    Ok(raw)
}

fn encode_scope(scope: &Option<Vec<Uuid>>) -> Result<Option<String>, AppError> {
    match scope {
        None => Ok(None),
        Some(ids) => serde_json::to_string(ids)
            .map(Some)
            .map_err(|e| AppError::Internal(format!("failed to encode scope list: {}", e))),
    }
}

fn write_from_create(req: &CreateRuleRequest) -> Result<RuleWrite, AppError> {
    let kind = parse_kind(&req.rule_kind)?;
    parse_modifier(&req.modifier_kind)?;
    let condition = validate_condition(kind, &req.condition)?;

    Ok(RuleWrite {
        name: req.name.clone(),
        description: req.description.clone(),
        rule_kind: kind.as_str().to_string(),
        condition,
        modifier_kind: req.modifier_kind.clone(),
        modifier_value: req.modifier_value,
        priority: req.priority,
        active: req.active,
        valid_from: req.valid_from,
        valid_to: req.valid_to,
        service_scope: encode_scope(&req.service_scope)?,
        resource_scope: encode_scope(&req.resource_scope)?,
    })
}

pub async fn create_rule(
    pool: &PgPool,
    cache: &AppCache,
    req: &CreateRuleRequest,
) -> Result<PriceRuleRow, AppError> {
    let write = write_from_create(req)?;
    let row = queries::insert_rule_row(pool, &write).await?;
    cache.invalidate_rules();
    Ok(row)
}

pub async fn get_rule(pool: &PgPool, id: Uuid) -> Result<PriceRuleRow, AppError> {
    queries::get_rule_row(pool, id)
        .await?
        .ok_or(AppError::NotFound("rule"))
}

pub async fn list_rules(
    pool: &PgPool,
    active_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<PriceRuleRow>, AppError> {
    queries::list_rule_rows(pool, active_only, limit.clamp(1, 1000), offset.max(0)).await
}

/// Merge a partial update onto the stored row. Absent fields keep the stored
/// value; `description`, `valid_from` and `valid_to` accept an explicit null
/// to clear it.
fn merge_rule_update(
    existing: PriceRuleRow,
    req: &UpdateRuleRequest,
) -> Result<RuleWrite, AppError> {
    let kind_str = req.rule_kind.clone().unwrap_or(existing.rule_kind);
    let kind = parse_kind(&kind_str)?;

    let modifier_kind = req.modifier_kind.clone().unwrap_or(existing.modifier_kind);
    parse_modifier(&modifier_kind)?;

    // The merged condition must decode against the merged kind, so changing
    // the kind without a compatible payload is rejected here.
    let condition = match &req.condition {
        Some(value) => validate_condition(kind, value)?,
        None => {
            Condition::decode(kind, &existing.condition).map_err(|e| {
                AppError::Validation(format!(
                    "existing condition is not valid for kind '{}': {}",
                    kind_str, e
                ))
            })?;
            existing.condition
        }
    };

    let service_scope = match &req.service_scope {
        Some(ids) => encode_scope(&Some(ids.clone()))?,
        None => existing.service_scope,
    };
    let resource_scope = match &req.resource_scope {
        Some(ids) => encode_scope(&Some(ids.clone()))?,
        None => existing.resource_scope,
    };

    Ok(RuleWrite {
        name: req.name.clone().unwrap_or(existing.name),
        description: req.description.clone().unwrap_or(existing.description),
        rule_kind: kind.as_str().to_string(),
        condition,
        modifier_kind,
        modifier_value: req.modifier_value.unwrap_or(existing.modifier_value),
        priority: req.priority.unwrap_or(existing.priority),
        active: req.active.unwrap_or(existing.active),
        valid_from: req.valid_from.unwrap_or(existing.valid_from),
        valid_to: req.valid_to.unwrap_or(existing.valid_to),
        service_scope,
        resource_scope,
    })
}

pub async fn update_rule(
    pool: &PgPool,
    cache: &AppCache,
    id: Uuid,
    req: &UpdateRuleRequest,
) -> Result<PriceRuleRow, AppError> {
    let existing = get_rule(pool, id).await?;
    let write = merge_rule_update(existing, req)?;

    let row = queries::update_rule_row(pool, id, &write)
        .await?
        .ok_or(AppError::NotFound("rule"))?;
    cache.invalidate_rules();
    Ok(row)
}

pub async fn delete_rule(pool: &PgPool, cache: &AppCache, id: Uuid) -> Result<(), AppError> {
    if !queries::delete_rule_row(pool, id).await? {
        return Err(AppError::NotFound("rule"));
    }
    cache.invalidate_rules();
    Ok(())
}

const WEEKDAY_NAMES: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Price the same service at the same time of day for seven consecutive
/// days, starting at `query.start_date`. A day that fails to price reports
/// its error inline; the remaining days still get figures.
pub async fn simulate_week(
    pool: &PgPool,
    cache: &AppCache,
    service_id: Uuid,
    query: &SimulateQuery,
) -> Result<WeekSimulationResponse, AppError> {
    if query.duration_hours < 1 {
        return Err(AppError::Validation(
            "duration_hours must be at least 1".to_string(),
        ));
    }
    let time = parse_hhmm(&query.time)?;

    let mut days = Vec::with_capacity(7);
    for offset in 0..7 {
        let date = query.start_date + chrono::Duration::days(offset);
        let start = date.and_time(time).and_utc();
        let end = start + chrono::Duration::hours(query.duration_hours);
        let req = QuoteRequest {
            service_id: Some(service_id),
            resource_id: query.resource_id,
            start,
            end,
            participants: query.participants,
            client_id: None,
            client_segment: query.client_segment.clone(),
            booking_id: None,
        };
        let weekday = WEEKDAY_NAMES[start.weekday().num_days_from_monday() as usize].to_string();
        let entry = match quote(pool, cache, &req).await {
            Ok(result) => DaySimulationResponse {
                weekday,
                date,
                base_price: Some(result.base_price),
                final_price: Some(result.final_price),
                total_discount: Some(result.total_discount),
                total_surcharge: Some(result.total_surcharge),
                savings: Some(result.total_savings),
                rules_applied: Some(result.applications.len()),
                error: None,
            },
            Err(e) => DaySimulationResponse {
                weekday,
                date,
                base_price: None,
                final_price: None,
                total_discount: None,
                total_surcharge: None,
                savings: None,
                rules_applied: None,
                error: Some(e.to_string()),
            },
        };
        days.push(entry);
    }

    Ok(WeekSimulationResponse {
        service_id,
        resource_id: query.resource_id,
        start_date: query.start_date,
        days,
    })
}

/// Aggregate rule counts: totals plus per-kind and per-modifier breakdowns.
pub fn stats_from_rows(rows: &[PriceRuleRow]) -> RuleStatsResponse {
    let mut stats = RuleStatsResponse {
        total: rows.len() as u64,
        ..Default::default()
    };
    for row in rows {
        if row.active {
            stats.active += 1;
        } else {
            stats.inactive += 1;
        }
        *stats.by_kind.entry(row.rule_kind.clone()).or_insert(0) += 1;
        *stats
            .by_modifier
            .entry(row.modifier_kind.clone())
            .or_insert(0) += 1;
    }
    stats
}

pub async fn rule_stats(pool: &PgPool) -> Result<RuleStatsResponse, AppError> {
    let rows = queries::list_rule_rows(pool, false, 1000, 0).await?;
    Ok(stats_from_rows(&rows))
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| AppError::Validation(format!("invalid time '{}', expected HH:MM", raw)))
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// Expand a preset into a regular create request. Presets go through the same
/// validated write path as hand-built rules.
pub fn expand_preset(preset: &PresetRuleRequest) -> Result<CreateRuleRequest, AppError> {
    let (name, description, rule_kind, condition, modifier_value, priority) = match preset {
        PresetRuleRequest::PeakHours {
            name,
            start,
            end,
            surcharge_percent,
            days,
        } => {
            parse_hhmm(start)?;
            parse_hhmm(end)?;
            let mut condition = serde_json::json!({ "start": start, "end": end });
            if let Some(days) = days {
                condition["days"] = serde_json::json!(days);
            }
            (
                name.clone(),
                format!("{}% surcharge during peak hours", surcharge_percent),
                RuleKind::TimeWindow,
                condition,
                *surcharge_percent,
                10,
            )
        }
        PresetRuleRequest::EarlyBooking {
            name,
            min_days,
            discount_percent,
        } => (
            name.clone(),
            format!(
                "{}% discount for bookings of {}+ days",
                discount_percent, min_days
            ),
            RuleKind::Anticipation,
            serde_json::json!({ "min_days": min_days }),
            -*discount_percent,
            5,
        ),
        PresetRuleRequest::Weekend {
            name,
            surcharge_percent,
            priority,
            days,
        } => (
            name.clone(),
            format!("{}% weekend surcharge", surcharge_percent),
            RuleKind::Weekday,
            serde_json::json!({ "days": days.clone().unwrap_or_else(|| vec![5, 6]) }),
            *surcharge_percent,
            priority.unwrap_or(15),
        ),
        PresetRuleRequest::HighSeason {
            name,
            start_date,
            end_date,
            surcharge_percent,
        } => {
            parse_date(start_date)?;
            parse_date(end_date)?;
            (
                name.clone(),
                format!("{}% high season surcharge", surcharge_percent),
                RuleKind::Season,
                serde_json::json!({ "start": start_date, "end": end_date }),
                *surcharge_percent,
                15,
            )
        }
    };

    Ok(CreateRuleRequest {
        name,
        description: Some(description),
        rule_kind: rule_kind.as_str().to_string(),
        condition,
        modifier_kind: ModifierKind::Percentage.as_str().to_string(),
        modifier_value,
        priority,
        active: true,
        valid_from: None,
        valid_to: None,
        service_scope: None,
        resource_scope: None,
    })
}
