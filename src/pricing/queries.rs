//! Database queries for the pricing engine.
//!
//! Runtime sqlx queries with explicit binds; row types live in `model`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

use super::model::{PriceRuleRow, PricingHistoryRow, ResourceRow, ServiceRow};

const RULE_COLUMNS: &str = r#"
    id, name, description, rule_kind, condition,
    modifier_kind, modifier_value, priority, active,
    valid_from, valid_to, service_scope, resource_scope,
    created_at, updated_at
"#;

/// Load the snapshot of active rules, highest priority first.
pub async fn load_active_rule_rows(pool: &PgPool) -> Result<Vec<PriceRuleRow>, AppError> {
    let rows = sqlx::query_as::<_, PriceRuleRow>(&format!(
        r#"
        SELECT {RULE_COLUMNS}
        FROM pricing_rule
        WHERE active = true
        ORDER BY priority DESC, created_at DESC
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List rules for the admin API.
pub async fn list_rule_rows(
    pool: &PgPool,
    active_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<PriceRuleRow>, AppError> {
    let rows = sqlx::query_as::<_, PriceRuleRow>(&format!(
        r#"
        SELECT {RULE_COLUMNS}
        FROM pricing_rule
        WHERE ($1 = false OR active = true)
        ORDER BY priority DESC, created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(active_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_rule_row(pool: &PgPool, id: Uuid) -> Result<Option<PriceRuleRow>, AppError> {
    let row = sqlx::query_as::<_, PriceRuleRow>(&format!(
        r#"
        SELECT {RULE_COLUMNS}
        FROM pricing_rule
        WHERE id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Column values for an insert or full update of a rule.
#[derive(Debug, Clone)]
pub struct RuleWrite {
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
}

pub async fn insert_rule_row(pool: &PgPool, write: &RuleWrite) -> Result<PriceRuleRow, AppError> {
    let row = sqlx::query_as::<_, PriceRuleRow>(&format!(
        r#"
        INSERT INTO pricing_rule (
            id, name, description, rule_kind, condition,
            modifier_kind, modifier_value, priority, active,
            valid_from, valid_to, service_scope, resource_scope, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
        RETURNING {RULE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&write.name)
    .bind(&write.description)
    .bind(&write.rule_kind)
    .bind(&write.condition)
    .bind(&write.modifier_kind)
    .bind(write.modifier_value)
    .bind(write.priority)
    .bind(write.active)
    .bind(write.valid_from)
    .bind(write.valid_to)
    .bind(&write.service_scope)
    .bind(&write.resource_scope)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn update_rule_row(
    pool: &PgPool,
    id: Uuid,
    write: &RuleWrite,
) -> Result<Option<PriceRuleRow>, AppError> {
    let row = sqlx::query_as::<_, PriceRuleRow>(&format!(
        r#"
        UPDATE pricing_rule SET
            name = $2, description = $3, rule_kind = $4, condition = $5,
            modifier_kind = $6, modifier_value = $7, priority = $8, active = $9,
            valid_from = $10, valid_to = $11,
            service_scope = $12, resource_scope = $13,
            updated_at = now()
        WHERE id = $1
        RETURNING {RULE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&write.name)
    .bind(&write.description)
    .bind(&write.rule_kind)
    .bind(&write.condition)
    .bind(&write.modifier_kind)
    .bind(write.modifier_value)
    .bind(write.priority)
    .bind(write.active)
    .bind(write.valid_from)
    .bind(write.valid_to)
    .bind(&write.service_scope)
    .bind(&write.resource_scope)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn delete_rule_row(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM pricing_rule WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Service catalog lookup.
pub async fn get_service(pool: &PgPool, id: Uuid) -> Result<Option<ServiceRow>, AppError> {
    let row = sqlx::query_as::<_, ServiceRow>(
        r#"
        SELECT id, name, base_price, duration_minutes, active
        FROM service
        WHERE id = $1 AND active = true
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Resource catalog lookup.
pub async fn get_resource(pool: &PgPool, id: Uuid) -> Result<Option<ResourceRow>, AppError> {
    let row = sqlx::query_as::<_, ResourceRow>(
        r#"
        SELECT id, name, hourly_rate, active
        FROM resource
        WHERE id = $1 AND active = true
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Values persisted to the pricing history audit log.
#[derive(Debug, Clone)]
pub struct HistoryWrite {
    pub booking_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    pub base_price: Decimal,
    pub final_price: Decimal,
    pub total_discount: Decimal,
    pub total_surcharge: Decimal,
    pub applications: serde_json::Value,
}

pub async fn insert_history(pool: &PgPool, write: &HistoryWrite) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO pricing_history (
            id, booking_id, service_id, resource_id,
            base_price, final_price, total_discount, total_surcharge,
            applications, computed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(write.booking_id)
    .bind(write.service_id)
    .bind(write.resource_id)
    .bind(write.base_price)
    .bind(write.final_price)
    .bind(write.total_discount)
    .bind(write.total_surcharge)
    .bind(&write.applications)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_history(pool: &PgPool, limit: i64) -> Result<Vec<PricingHistoryRow>, AppError> {
    let rows = sqlx::query_as::<_, PricingHistoryRow>(
        r#"
        SELECT
            id, booking_id, service_id, resource_id,
            base_price, final_price, total_discount, total_surcharge,
            applications, computed_at
        FROM pricing_history
        ORDER BY computed_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
