//! HTTP handlers for quoting and rule administration.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::Result;
use crate::AppState;

use super::model::PricingResult;
use super::requests::{
    CreateRuleRequest, HistoryQuery, PresetRuleRequest, QuoteQuery, QuoteRequest, RuleListQuery,
    SimulateQuery, UpdateRuleRequest,
};
use super::responses::{
    HistoryEntryResponse, MessageResponse, RuleResponse, RuleStatsResponse, WeekSimulationResponse,
};
use super::service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quote", post(quote))
        .route("/quote/:service_id", get(quote_service))
        .route("/simulate/:service_id", get(simulate_week))
        .route("/rules", post(create_rule).get(list_rules))
        .route(
            "/rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/rules/presets", post(create_preset_rule))
        .route("/rules/stats", get(rule_stats))
        .route("/history", get(list_history))
        .route("/cache/stats", get(cache_stats))
}

/// Price a prospective booking and record the audit trail.
async fn quote(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<PricingResult>> {
    let result = service::quote(&state.db, &state.cache, &req).await?;

    // Audit sink is fire-and-forget; the quote never waits on it.
    let db = state.db.clone();
    let audit_req = req.clone();
    let audit_result = result.clone();
    tokio::spawn(async move {
        service::record_history(&db, &audit_req, &audit_result).await;
    });

    Ok(Json(result))
}

/// Read-only quote for a single service, parameters in the query string.
/// Unlike POST /quote this never writes to the pricing history.
async fn quote_service(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<PricingResult>> {
    let req = query.into_request(service_id);
    let result = service::quote(&state.db, &state.cache, &req).await?;
    Ok(Json(result))
}

/// Price the same booking slot for seven consecutive days.
async fn simulate_week(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Query(query): Query<SimulateQuery>,
) -> Result<Json<WeekSimulationResponse>> {
    let response = service::simulate_week(&state.db, &state.cache, service_id, &query).await?;
    Ok(Json(response))
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<RuleResponse>> {
    let row = service::create_rule(&state.db, &state.cache, &req).await?;
    Ok(Json(row.into()))
}

async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RuleListQuery>,
) -> Result<Json<Vec<RuleResponse>>> {
    let rows = service::list_rules(&state.db, query.active_only, query.limit, query.offset).await?;
    Ok(Json(rows.into_iter().map(RuleResponse::from).collect()))
}

async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RuleResponse>> {
    let row = service::get_rule(&state.db, id).await?;
    Ok(Json(row.into()))
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<RuleResponse>> {
    let row = service::update_rule(&state.db, &state.cache, id, &req).await?;
    Ok(Json(row.into()))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    service::delete_rule(&state.db, &state.cache, id).await?;
    Ok(Json(MessageResponse {
        message: "rule deleted".to_string(),
    }))
}

/// Create a rule from one of the predefined templates.
async fn create_preset_rule(
    State(state): State<AppState>,
    Json(preset): Json<PresetRuleRequest>,
) -> Result<Json<RuleResponse>> {
    let req = service::expand_preset(&preset)?;
    let row = service::create_rule(&state.db, &state.cache, &req).await?;
    Ok(Json(row.into()))
}

/// Aggregate counts over the stored rules, grouped by kind and modifier.
async fn rule_stats(State(state): State<AppState>) -> Result<Json<RuleStatsResponse>> {
    let stats = service::rule_stats(&state.db).await?;
    Ok(Json(stats))
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntryResponse>>> {
    let rows = super::queries::list_history(&state.db, query.limit.clamp(1, 500)).await?;
    Ok(Json(rows.into_iter().map(HistoryEntryResponse::from).collect()))
}

async fn cache_stats(State(state): State<AppState>) -> Json<crate::cache::CacheStats> {
    Json(state.cache.stats())
}
