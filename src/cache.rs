//! In-memory caching using moka
//!
//! Caches the decoded rule snapshot and catalog lookups. Rules change through
//! the admin API only, so mutations invalidate the snapshot explicitly and a
//! short TTL covers out-of-band edits.

use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pricing::model::{ResourceRow, Rule, ServiceRow};
use crate::pricing::{queries, service};

const RULES_KEY: &str = "active";

/// Application cache holding the rule snapshot and catalog entries
#[derive(Clone)]
pub struct AppCache {
    /// Decoded active-rule snapshot (single entry under `RULES_KEY`)
    pub rules: Cache<String, Arc<Vec<Rule>>>,
    /// Service catalog entries (id -> row)
    pub services: Cache<Uuid, Arc<ServiceRow>>,
    /// Resource catalog entries (id -> row)
    pub resources: Cache<Uuid, Arc<ResourceRow>>,
}

impl AppCache {
    /// Create a new cache instance with configured TTLs
    pub fn new() -> Self {
        Self {
            // Rule snapshot: 1 entry, 5 min TTL
            rules: Cache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(5 * 60))
                .build(),

            // Services: 500 entries, 15 min TTL
            services: Cache::builder()
                .max_capacity(500)
                .time_to_live(Duration::from_secs(15 * 60))
                .time_to_idle(Duration::from_secs(5 * 60))
                .build(),

            // Resources: 500 entries, 15 min TTL
            resources: Cache::builder()
                .max_capacity(500)
                .time_to_live(Duration::from_secs(15 * 60))
                .time_to_idle(Duration::from_secs(5 * 60))
                .build(),
        }
    }

    pub async fn get_rules(&self) -> Option<Arc<Vec<Rule>>> {
        self.rules.get(RULES_KEY).await
    }

    pub async fn put_rules(&self, snapshot: Arc<Vec<Rule>>) {
        self.rules.insert(RULES_KEY.to_string(), snapshot).await;
    }

    /// Invalidate the rule snapshot after a rule mutation
    pub fn invalidate_rules(&self) {
        self.rules.invalidate_all();
        info!("Rule snapshot cache invalidated");
    }

    /// Invalidate all caches
    pub fn invalidate_all(&self) {
        self.rules.invalidate_all();
        self.services.invalidate_all();
        self.resources.invalidate_all();
        info!("All caches invalidated");
    }

    /// Get cache statistics for monitoring
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            rules_cached: self.rules.entry_count() > 0,
            services_size: self.services.entry_count(),
            resources_size: self.resources.entry_count(),
        }
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics for monitoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub rules_cached: bool,
    pub services_size: u64,
    pub resources_size: u64,
}

/// Start background cache warmer
///
/// Warms the rule snapshot on startup and refreshes every 5 minutes.
pub async fn start_cache_warmer(cache: AppCache, db: PgPool) {
    warm_cache(&cache, &db).await;

    let mut interval = interval(Duration::from_secs(5 * 60));
    loop {
        interval.tick().await;
        warm_cache(&cache, &db).await;
    }
}

async fn warm_cache(cache: &AppCache, db: &PgPool) {
    match queries::load_active_rule_rows(db).await {
        Ok(rows) => {
            let snapshot = service::decode_snapshot(&rows);
            cache.put_rules(Arc::new(snapshot)).await;
            info!("Rule snapshot warmed. Stats: {:?}", cache.stats());
        }
        Err(e) => warn!("Failed to warm rule snapshot: {}", e),
    }
}
