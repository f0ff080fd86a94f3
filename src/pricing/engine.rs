//! Pure pricing computation. No database access, no clocks, no I/O.
//!
//! `calculate` folds an ordered candidate list over the base price. Callers
//! resolve the base price and hand in an immutable rule snapshot; the engine
//! never mutates or re-reads anything, so identical inputs always produce
//! identical results.

use chrono::Datelike;
use rust_decimal::Decimal;

use super::model::{
    Condition, ModifierKind, PricingContext, PricingResult, Rule, RuleApplication, HOLIDAYS,
};

/// Filter the rule set down to ordered candidates: active, valid at the
/// booking start, and scope-compatible with the context. Condition matching
/// happens later, in the fold.
///
/// Sorting is stable, priority descending: ties keep the order rules were
/// supplied in, which makes evaluation order reproducible.
pub fn select<'a>(rules: &'a [Rule], ctx: &PricingContext) -> Vec<&'a Rule> {
    let mut candidates: Vec<&Rule> = rules
        .iter()
        .filter(|r| r.active)
        .filter(|r| r.is_valid_at(ctx.start))
        .filter(|r| scope_allows(r.service_scope.as_deref(), ctx.service_id))
        .filter(|r| scope_allows(r.resource_scope.as_deref(), ctx.resource_id))
        .collect();
    candidates.sort_by_key(|r| std::cmp::Reverse(r.priority));
    candidates
}

/// A present allow-list requires a member id; an absent list allows anything.
fn scope_allows(scope: Option<&[uuid::Uuid]>, id: Option<uuid::Uuid>) -> bool {
    match scope {
        None => true,
        Some(allowed) => match id {
            Some(id) => allowed.contains(&id),
            None => false,
        },
    }
}

/// Evaluate one rule's condition against the context.
pub fn matches(rule: &Rule, ctx: &PricingContext) -> bool {
    match &rule.condition {
        Condition::Weekdays { days } => {
            let weekday = ctx.start.weekday().num_days_from_monday() as u8;
            days.contains(&weekday)
        }
        Condition::TimeWindow { start, end } => {
            let t = ctx.start.time();
            *start <= t && t <= *end
        }
        Condition::Season { start, end } => {
            let d = ctx.start.date_naive();
            *start <= d && d <= *end
        }
        Condition::Holiday => {
            let d = ctx.start.date_naive();
            HOLIDAYS.contains(&(d.month(), d.day()))
        }
        Condition::MinBookingDays { min_days } => ctx.duration_days() >= *min_days,
        Condition::DurationRange {
            min_minutes,
            max_minutes,
        } => {
            let minutes = ctx.duration_minutes();
            minutes >= *min_minutes && max_minutes.map_or(true, |max| minutes <= max)
        }
        Condition::ResourceKind => false,
        Condition::PartyRange { min, max } => {
            ctx.participants >= *min && max.map_or(true, |max| ctx.participants <= max)
        }
        Condition::ClientSegments { segments } => segments.contains(&ctx.client_segment),
    }
}

/// Apply one modifier to the running price.
pub fn apply_modifier(current: Decimal, kind: ModifierKind, value: Decimal) -> Decimal {
    match kind {
        ModifierKind::Percentage => current * (Decimal::ONE + value / Decimal::ONE_HUNDRED),
        ModifierKind::FixedDelta => current + value,
        ModifierKind::FixedAbsolute => value,
    }
}

/// Fold the rule set over the base price.
///
/// Matching rules are applied in candidate order and each one is recorded in
/// the audit trail with its per-step discount or surcharge. Non-matching
/// rules contribute nothing. The final price is clamped at zero.
pub fn calculate(base_price: Decimal, ctx: &PricingContext, rules: &[Rule]) -> PricingResult {
    let mut price = base_price;
    let mut applications = Vec::new();
    let mut total_discount = Decimal::ZERO;
    let mut total_surcharge = Decimal::ZERO;

    for rule in select(rules, ctx) {
        if !matches(rule, ctx) {
            continue;
        }
        let new_price = apply_modifier(price, rule.modifier, rule.modifier_value);
        let delta = new_price - price;
        let (discount, surcharge) = if delta < Decimal::ZERO {
            (-delta, Decimal::ZERO)
        } else {
            (Decimal::ZERO, delta)
        };
        total_discount += discount;
        total_surcharge += surcharge;
        applications.push(RuleApplication {
            rule_id: rule.id,
            name: rule.name.clone(),
            rule_kind: rule.condition.kind(),
            modifier: rule.modifier,
            modifier_value: rule.modifier_value,
            discount,
            surcharge,
            price_after: new_price,
        });
        price = new_price;
    }

    let final_price = price.max(Decimal::ZERO);
    let total_savings = (base_price - final_price).max(Decimal::ZERO);

    PricingResult {
        base_price,
        final_price,
        total_discount,
        total_surcharge,
        total_savings,
        applications,
        metadata: serde_json::Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::model::RuleKind;
    use chrono::{DateTime, NaiveTime, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn ctx(start: DateTime<Utc>, end: DateTime<Utc>) -> PricingContext {
        PricingContext {
            service_id: None,
            resource_id: None,
            start,
            end,
            participants: 2,
            client_id: None,
            client_segment: "regular".to_string(),
        }
    }

    fn rule(name: &str, priority: i32, condition: Condition, value: Decimal) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            condition,
            modifier: ModifierKind::Percentage,
            modifier_value: value,
            priority,
            active: true,
            valid_from: None,
            valid_to: None,
            service_scope: None,
            resource_scope: None,
        }
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2026-03-02 is a Monday.
    fn monday_morning() -> PricingContext {
        ctx(
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap(),
        )
    }

    #[test]
    fn morning_peak_surcharge() {
        // Base 80, TimeWindow 08:00-12:00 with +20% on a Monday 10:00 start.
        let rules = vec![rule(
            "Morning Peak",
            10,
            Condition::TimeWindow {
                start: hm(8, 0),
                end: hm(12, 0),
            },
            dec!(20),
        )];
        let result = calculate(dec!(80), &monday_morning(), &rules);

        assert_eq!(result.final_price, dec!(96.0));
        assert_eq!(result.applications.len(), 1);
        assert_eq!(result.applications[0].surcharge, dec!(16.0));
        assert_eq!(result.applications[0].discount, dec!(0));
        assert_eq!(result.total_surcharge, dec!(16.0));
        assert_eq!(result.total_savings, dec!(0));
    }

    #[test]
    fn weekend_then_early_bird_in_priority_order() {
        // Saturday booking: +30% (priority 15) applies before -15% (priority 5).
        // 80 * 1.3 = 104, 104 * 0.85 = 88.40
        let start = Utc.with_ymd_and_hms(2026, 3, 7, 9, 0, 0).unwrap(); // Saturday
        let end = Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap();
        let rules = vec![
            rule(
                "Early-Bird Discount",
                5,
                Condition::MinBookingDays { min_days: dec!(0) },
                dec!(-15),
            ),
            rule(
                "Weekend Surcharge",
                15,
                Condition::Weekdays { days: vec![5, 6] },
                dec!(30),
            ),
        ];
        let result = calculate(dec!(80), &ctx(start, end), &rules);

        assert_eq!(result.applications.len(), 2);
        assert_eq!(result.applications[0].name, "Weekend Surcharge");
        assert_eq!(result.applications[0].price_after, dec!(104.0));
        assert_eq!(result.applications[1].name, "Early-Bird Discount");
        assert_eq!(result.final_price, dec!(88.40));
        assert_eq!(result.total_surcharge, dec!(24.0));
        assert_eq!(result.total_discount, dec!(15.60));
    }

    #[test]
    fn anticipation_measures_booking_duration_not_lead_time() {
        // Booking made for tomorrow (1 day of real lead time) but spanning
        // 8 days: a min_days=7 rule matches because duration counts.
        let start = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap();
        let rules = vec![rule(
            "Long Stay Discount",
            5,
            Condition::MinBookingDays { min_days: dec!(7) },
            dec!(-10),
        )];
        let result = calculate(dec!(100), &ctx(start, end), &rules);

        assert_eq!(result.applications.len(), 1);
        assert_eq!(result.final_price, dec!(90.0));
    }

    #[test]
    fn anticipation_short_booking_does_not_match() {
        let start = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        let rules = vec![rule(
            "Long Stay Discount",
            5,
            Condition::MinBookingDays { min_days: dec!(7) },
            dec!(-10),
        )];
        let result = calculate(dec!(100), &ctx(start, end), &rules);
        assert!(result.applications.is_empty());
        assert_eq!(result.final_price, dec!(100));
    }

    #[test]
    fn empty_rule_set_keeps_base() {
        let result = calculate(dec!(80), &monday_morning(), &[]);
        assert_eq!(result.final_price, dec!(80));
        assert!(result.applications.is_empty());
        assert_eq!(result.total_discount, dec!(0));
        assert_eq!(result.total_surcharge, dec!(0));
        assert_eq!(result.total_savings, dec!(0));
    }

    #[test]
    fn non_matching_rules_keep_base() {
        let rules = vec![rule(
            "Sunday Only",
            10,
            Condition::Weekdays { days: vec![6] },
            dec!(50),
        )];
        let result = calculate(dec!(80), &monday_morning(), &rules);
        assert_eq!(result.final_price, dec!(80));
        assert!(result.applications.is_empty());
    }

    #[test]
    fn zero_percent_is_a_recorded_noop() {
        let rules = vec![rule(
            "Nothing Burger",
            1,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(0),
        )];
        let result = calculate(dec!(80), &monday_morning(), &rules);
        assert_eq!(result.applications.len(), 1);
        assert_eq!(result.applications[0].price_after, dec!(80));
        assert_eq!(result.applications[0].discount, dec!(0));
        assert_eq!(result.applications[0].surcharge, dec!(0));
        assert_eq!(result.final_price, dec!(80));
    }

    #[test]
    fn fixed_absolute_discards_prior_surcharge() {
        let mut surcharge = rule(
            "Peak",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(25),
        );
        surcharge.modifier = ModifierKind::Percentage;
        let mut flat = rule(
            "Flat Promo",
            5,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(60),
        );
        flat.modifier = ModifierKind::FixedAbsolute;

        let result = calculate(dec!(80), &monday_morning(), &[surcharge, flat]);
        // 80 * 1.25 = 100, then absolute 60 regardless of the 100.
        assert_eq!(result.applications[0].price_after, dec!(100.00));
        assert_eq!(result.applications[1].price_after, dec!(60));
        assert_eq!(result.applications[1].discount, dec!(40.00));
        assert_eq!(result.final_price, dec!(60));
    }

    #[test]
    fn fixed_delta_applies_to_running_price() {
        let mut delta = rule(
            "Cleaning Fee",
            1,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(12.50),
        );
        delta.modifier = ModifierKind::FixedDelta;
        let result = calculate(dec!(80), &monday_morning(), &[delta]);
        assert_eq!(result.final_price, dec!(92.50));
        assert_eq!(result.applications[0].surcharge, dec!(12.50));
    }

    #[test]
    fn final_price_clamped_at_zero() {
        let mut big_discount = rule(
            "Everything Off",
            1,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(-500),
        );
        big_discount.modifier = ModifierKind::FixedDelta;
        let result = calculate(dec!(80), &monday_morning(), &[big_discount]);
        assert_eq!(result.final_price, dec!(0));
        // Savings are measured against the clamped final price.
        assert_eq!(result.total_savings, dec!(80));
        assert_eq!(result.total_discount, dec!(500));
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut r = rule(
            "Dormant",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(50),
        );
        r.active = false;
        let result = calculate(dec!(80), &monday_morning(), &[r]);
        assert!(result.applications.is_empty());
    }

    #[test]
    fn expired_rules_are_skipped() {
        let mut r = rule(
            "Last Year",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(50),
        );
        r.valid_to = Some(Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap());
        let result = calculate(dec!(80), &monday_morning(), &[r]);
        assert!(result.applications.is_empty());
    }

    #[test]
    fn service_scope_filters_by_membership() {
        let allowed = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut scoped = rule(
            "Scoped",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(10),
        );
        scoped.service_scope = Some(vec![allowed]);

        let mut in_scope = monday_morning();
        in_scope.service_id = Some(allowed);
        assert_eq!(select(std::slice::from_ref(&scoped), &in_scope).len(), 1);

        let mut out_of_scope = monday_morning();
        out_of_scope.service_id = Some(other);
        assert!(select(std::slice::from_ref(&scoped), &out_of_scope).is_empty());
    }

    #[test]
    fn scoped_rule_drops_when_context_has_no_id() {
        let mut scoped = rule(
            "Scoped",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(10),
        );
        scoped.resource_scope = Some(vec![Uuid::new_v4()]);
        // resource_id is None in the context, so a resource allow-list fails.
        assert!(select(std::slice::from_ref(&scoped), &monday_morning()).is_empty());
    }

    #[test]
    fn priority_ties_preserve_supplied_order() {
        let a = rule(
            "A",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(5),
        );
        let b = rule(
            "B",
            10,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(5),
        );
        let c = rule(
            "C",
            20,
            Condition::MinBookingDays { min_days: dec!(0) },
            dec!(5),
        );
        let result = calculate(dec!(100), &monday_morning(), &[a, b, c]);
        let names: Vec<&str> = result.applications.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn identical_inputs_yield_identical_results() {
        let start = Utc.with_ymd_and_hms(2026, 3, 7, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap();
        let rules = vec![
            rule(
                "Weekend Surcharge",
                15,
                Condition::Weekdays { days: vec![5, 6] },
                dec!(30),
            ),
            rule(
                "Early-Bird Discount",
                5,
                Condition::MinBookingDays { min_days: dec!(0) },
                dec!(-15),
            ),
        ];
        let context = ctx(start, end);
        let first = calculate(dec!(80), &context, &rules);
        let second = calculate(dec!(80), &context, &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn holiday_table_matches_christmas() {
        let start = Utc.with_ymd_and_hms(2026, 12, 25, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 12, 25, 12, 0, 0).unwrap();
        let rules = vec![rule("Holiday Rate", 10, Condition::Holiday, dec!(40))];
        let result = calculate(dec!(100), &ctx(start, end), &rules);
        assert_eq!(result.final_price, dec!(140.0));
    }

    #[test]
    fn holiday_table_rejects_ordinary_days() {
        let rules = vec![rule("Holiday Rate", 10, Condition::Holiday, dec!(40))];
        let result = calculate(dec!(100), &monday_morning(), &rules);
        assert!(result.applications.is_empty());
    }

    #[test]
    fn resource_kind_never_matches() {
        let rules = vec![rule("Orphan", 10, Condition::ResourceKind, dec!(40))];
        let result = calculate(dec!(100), &monday_morning(), &rules);
        assert!(result.applications.is_empty());
    }

    #[test]
    fn duration_range_bounds_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(); // 120 min
        let hit = rule(
            "Two Hours",
            1,
            Condition::DurationRange {
                min_minutes: dec!(120),
                max_minutes: Some(dec!(120)),
            },
            dec!(10),
        );
        let miss = rule(
            "Longer",
            1,
            Condition::DurationRange {
                min_minutes: dec!(121),
                max_minutes: None,
            },
            dec!(10),
        );
        let result = calculate(dec!(100), &ctx(start, end), &[hit, miss]);
        assert_eq!(result.applications.len(), 1);
        assert_eq!(result.applications[0].name, "Two Hours");
    }

    #[test]
    fn party_range_and_client_segment() {
        let mut context = monday_morning();
        context.participants = 6;
        context.client_segment = "vip".to_string();

        let group = rule(
            "Group Rate",
            10,
            Condition::PartyRange {
                min: 5,
                max: Some(10),
            },
            dec!(-10),
        );
        let vip = rule(
            "VIP",
            5,
            Condition::ClientSegments {
                segments: vec!["vip".to_string()],
            },
            dec!(-5),
        );
        let not_vip = rule(
            "Students",
            1,
            Condition::ClientSegments {
                segments: vec!["student".to_string()],
            },
            dec!(-50),
        );
        let result = calculate(dec!(100), &context, &[group, vip, not_vip]);
        assert_eq!(result.applications.len(), 2);
        // 100 * 0.9 = 90, 90 * 0.95 = 85.50
        assert_eq!(result.final_price, dec!(85.500));
    }

    #[test]
    fn time_window_is_inclusive_at_both_edges() {
        let at_start = ctx(
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        );
        let at_end = ctx(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap(),
        );
        let after = ctx(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 1, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap(),
        );
        let window = rule(
            "Morning",
            1,
            Condition::TimeWindow {
                start: hm(8, 0),
                end: hm(12, 0),
            },
            dec!(10),
        );
        let rules = std::slice::from_ref(&window);
        assert_eq!(calculate(dec!(100), &at_start, rules).applications.len(), 1);
        assert_eq!(calculate(dec!(100), &at_end, rules).applications.len(), 1);
        assert!(calculate(dec!(100), &after, rules).applications.is_empty());
    }

    #[test]
    fn audit_entries_carry_rule_identity() {
        let r = rule(
            "Morning Peak",
            10,
            Condition::TimeWindow {
                start: hm(8, 0),
                end: hm(12, 0),
            },
            dec!(20),
        );
        let id = r.id;
        let result = calculate(dec!(80), &monday_morning(), &[r]);
        let app = &result.applications[0];
        assert_eq!(app.rule_id, id);
        assert_eq!(app.rule_kind, RuleKind::TimeWindow);
        assert_eq!(app.modifier, ModifierKind::Percentage);
        assert_eq!(app.modifier_value, dec!(20));
    }
}
