use super::predicate::matches;
use crate::models::{Context, Policy, Rule};

/// Highest-confidence matching rule.
///
/// Equal confidence resolves to the rule declared first: a later rule only
/// replaces the current winner when it is strictly more confident.
pub fn best_match<'a>(rules: &'a [Rule], ctx: &Context) -> Option<&'a Rule> {
    let mut best: Option<&Rule> = None;
    for rule in rules.iter().filter(|rule| matches(rule, ctx)) {
        match best {
            Some(current) if rule.confidence <= current.confidence => {}
            _ => best = Some(rule),
        }
    }
    best
}

/// Every matching rule, in declared order.
pub fn aggregate_all<'a>(rules: &'a [Rule], ctx: &Context) -> Vec<&'a Rule> {
    rules.iter().filter(|rule| matches(rule, ctx)).collect()
}

/// Reduce a category's rules with its policy. BestMatch yields at most one rule.
pub fn select<'a>(policy: Policy, rules: &'a [Rule], ctx: &Context) -> Vec<&'a Rule> {
    match policy {
        Policy::BestMatch => best_match(rules, ctx).into_iter().collect(),
        Policy::AggregateAll => aggregate_all(rules, ctx),
    }
}
