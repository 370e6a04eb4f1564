//! Condition matching against a context.
//!
//! Matching never fails: a field missing from the context, or a value of
//! a different kind than the threshold, makes the condition false and the
//! owning rule non-matching. Type mismatches are rejected earlier by
//! [`RuleSet::check_context`](super::RuleSet::check_context).
//!
//! `lte`/`gte` include the boundary, so a reading exactly at a rule's limit
//! triggers it. `lt`/`gt` are strict.

use crate::models::{Condition, Context, Operator, Rule, Threshold, Value};
use std::cmp::Ordering;

/// All conditions hold (logical AND).
pub fn matches(rule: &Rule, ctx: &Context) -> bool {
    rule.conditions.iter().all(|c| condition_holds(c, ctx))
}

pub fn condition_holds(condition: &Condition, ctx: &Context) -> bool {
    let Some(actual) = ctx.get(&condition.field) else {
        return false;
    };

    match (&condition.op, &condition.threshold) {
        (Operator::Eq, Threshold::Scalar(expected)) => equals(actual, expected),
        (Operator::InSet, Threshold::Set(members)) => {
            members.iter().any(|member| equals(actual, member))
        }
        (op, Threshold::Scalar(expected)) if op.is_ordering() => {
            match (compare(actual, expected), op) {
                (Some(Ordering::Less), Operator::Lt | Operator::Lte) => true,
                (Some(Ordering::Equal), Operator::Lte | Operator::Gte) => true,
                (Some(Ordering::Greater), Operator::Gt | Operator::Gte) => true,
                _ => false,
            }
        }
        // Shapes the loader never produces.
        _ => false,
    }
}

fn equals(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Text(a), Value::Text(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Date(a), Value::Date(b)) => a == b,
        _ => false,
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, IrrigationAdvice, RuleOutputs};
    use chrono::NaiveDate;

    fn cond(field: &str, op: Operator, value: impl Into<Value>) -> Condition {
        Condition::new(field, op, Threshold::Scalar(value.into()))
    }

    fn rule(conditions: Vec<Condition>) -> Rule {
        Rule {
            id: "R".into(),
            category: Category::Irrigation,
            conditions,
            confidence: 0.8,
            outputs: RuleOutputs::Irrigation(IrrigationAdvice::no_action()),
            reasoning_template: "r".into(),
        }
    }

    #[test]
    fn inclusive_operators_trigger_exactly_at_the_boundary() {
        let ctx = Context::new().with("soil_moisture_%", 30.0);
        assert!(condition_holds(&cond("soil_moisture_%", Operator::Lte, 30.0), &ctx));
        assert!(condition_holds(&cond("soil_moisture_%", Operator::Gte, 30.0), &ctx));
    }

    #[test]
    fn strict_operators_exclude_the_boundary() {
        let ctx = Context::new().with("soil_moisture_%", 30.0);
        assert!(!condition_holds(&cond("soil_moisture_%", Operator::Lt, 30.0), &ctx));
        assert!(!condition_holds(&cond("soil_moisture_%", Operator::Gt, 30.0), &ctx));
        assert!(condition_holds(&cond("soil_moisture_%", Operator::Lt, 30.5), &ctx));
        assert!(condition_holds(&cond("soil_moisture_%", Operator::Gt, 29.5), &ctx));
    }

    #[test]
    fn missing_field_fails_closed() {
        let r = rule(vec![
            cond("soil_moisture_%", Operator::Lte, 30.0),
            cond("temperature_c", Operator::Gte, 30.0),
        ]);
        let ctx = Context::new().with("soil_moisture_%", 10.0);
        assert!(!matches(&r, &ctx));
    }

    #[test]
    fn all_conditions_must_hold() {
        let r = rule(vec![
            cond("soil_moisture_%", Operator::Lte, 30.0),
            cond("temperature_c", Operator::Gte, 30.0),
        ]);
        assert!(matches(
            &r,
            &Context::new()
                .with("soil_moisture_%", 30.0)
                .with("temperature_c", 32.0)
        ));
        assert!(!matches(
            &r,
            &Context::new()
                .with("soil_moisture_%", 30.0)
                .with("temperature_c", 29.9)
        ));
    }

    #[test]
    fn in_set_is_case_insensitive_membership() {
        let c = Condition::new(
            "soil_type",
            Operator::InSet,
            Threshold::Set(vec![Value::Text("sandy".into()), Value::Text("sandy_loam".into())]),
        );
        assert!(condition_holds(&c, &Context::new().with("soil_type", "Sandy")));
        assert!(!condition_holds(&c, &Context::new().with("soil_type", "clay")));
    }

    #[test]
    fn numeric_in_set() {
        let c = Condition::new(
            "growth_stage_code",
            Operator::InSet,
            Threshold::Set(vec![Value::Number(3.0), Value::Number(4.0)]),
        );
        assert!(condition_holds(&c, &Context::new().with("growth_stage_code", 4)));
        assert!(!condition_holds(&c, &Context::new().with("growth_stage_code", 5)));
    }

    #[test]
    fn kind_mismatch_never_matches() {
        let ctx = Context::new().with("temperature_c", "hot");
        assert!(!condition_holds(&cond("temperature_c", Operator::Gte, 30.0), &ctx));
        assert!(!condition_holds(&cond("temperature_c", Operator::Eq, 30.0), &ctx));
    }

    #[test]
    fn dates_compare_chronologically() {
        let ctx = Context::new().with(
            "planting_date",
            NaiveDate::from_ymd_opt(2024, 4, 15).unwrap(),
        );
        assert!(condition_holds(
            &cond("planting_date", Operator::Lte, "2024-04-15"),
            &ctx
        ));
        assert!(condition_holds(
            &cond("planting_date", Operator::Gt, "2024-03-31"),
            &ctx
        ));
    }

    #[test]
    fn nan_never_matches() {
        let ctx = Context::new().with("temperature_c", f64::NAN);
        assert!(!condition_holds(&cond("temperature_c", Operator::Lte, 30.0), &ctx));
        assert!(!condition_holds(&cond("temperature_c", Operator::Gte, 30.0), &ctx));
    }

    #[test]
    fn boolean_equality() {
        let ctx = Context::new().with("farmer.owns_land", true);
        assert!(condition_holds(&cond("farmer.owns_land", Operator::Eq, true), &ctx));
        assert!(!condition_holds(&cond("farmer.owns_land", Operator::Eq, false), &ctx));
    }
}
