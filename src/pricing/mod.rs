//! Dynamic pricing rule engine.
//!
//! Stored rules are decoded once into typed conditions, selected and folded
//! over a base price by the pure engine, and exposed over JSON for quoting
//! and administration.

pub mod engine;
pub mod model;
pub mod queries;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod service;

// Re-export commonly used items
pub use engine::calculate;
pub use model::{Condition, ModifierKind, PricingContext, PricingResult, Rule, RuleKind};
pub use routes::router;
