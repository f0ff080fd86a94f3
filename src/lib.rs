//! Dynamic pricing rule engine for the Reserva booking platform.
//!
//! The engine itself (`pricing::engine`) is a pure, synchronous fold over an
//! immutable rule snapshot; everything around it is the axum/sqlx plumbing
//! that feeds it catalogs, rules, and requests.

pub mod cache;
pub mod error;
pub mod pricing;

use cache::AppCache;
use sqlx::PgPool;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub cache: AppCache,
}
