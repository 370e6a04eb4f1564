//! AggregateAll reduction for subsidy programs.
//!
//! Every matching program contributes. Programs stack: two rules granting
//! money for overlapping reasons are both paid, and the total is their sum.

use super::rules::template;
use crate::error::{EngineError, Result};
use crate::models::{
    Category, Context, Output, ProgramAward, Rule, RuleOutputs, SubsidyGrant, SubsidySummary,
    Trace,
};

/// Payment one grant yields for this context.
///
/// A `per` grant scales by the named context field; the loader only accepts
/// such a rule when it also constrains that field numerically, so a matching
/// rule always has the multiplier. A negative multiplier is rejected.
pub fn award_amount(grant: &SubsidyGrant, ctx: &Context) -> Result<f64> {
    let units = match &grant.per {
        Some(field) => {
            let units = ctx.get(field).and_then(|v| v.as_number()).unwrap_or(0.0);
            if units < 0.0 {
                return Err(EngineError::InvalidRequest(format!(
                    "{} must not be negative, got {}",
                    field, units
                )));
            }
            units
        }
        None => 1.0,
    };
    let amount = grant.amount * units;
    Ok(match grant.max_amount {
        Some(cap) => amount.min(cap),
        None => amount,
    })
}

/// Sum every matching program. Conditions are merged without duplicates,
/// keeping first-seen order.
pub fn summarize(matches: &[&Rule], ctx: &Context) -> Result<SubsidySummary> {
    let mut summary = SubsidySummary::default();
    for rule in matches {
        let RuleOutputs::Subsidy(grant) = &rule.outputs else {
            continue;
        };
        let amount = award_amount(grant, ctx)?;
        summary.total_amount += amount;
        summary.eligible_programs.push(ProgramAward {
            rule_id: rule.id.clone(),
            program: grant.program.clone(),
            amount,
        });
        for condition in &grant.conditions {
            if !summary.conditions.contains(condition) {
                summary.conditions.push(condition.clone());
            }
        }
    }
    Ok(summary)
}

/// Trace for one or more matching subsidy rules. Confidence is the weakest
/// contributing rule's.
pub fn aggregate_trace(matches: &[&Rule], ctx: &Context, version: &str) -> Result<Trace> {
    let confidence = matches
        .iter()
        .map(|r| r.confidence)
        .fold(f64::INFINITY, f64::min);
    let reasoning = matches
        .iter()
        .map(|r| template::render(&r.reasoning_template, ctx))
        .collect::<Vec<_>>()
        .join(" ");

    let summary = summarize(matches, ctx)?;
    Ok(Trace {
        matched: !matches.is_empty(),
        category: Category::Subsidy,
        confidence: if confidence.is_finite() { confidence } else { 0.0 },
        rule_ids: matches.iter().map(|r| r.id.clone()).collect(),
        output: Output::Subsidy(summary),
        reasoning,
        ruleset_version: version.to_string(),
    })
}
