//! Harvest date projection from accumulated growing degree days.
//!
//! The projection itself is a formula over the crop table. The
//! `harvest_prediction` rules then gate on the projected stage to supply
//! recommended checks.

use super::calculations;
use super::rules::{selection, template, RuleSet};
use crate::config::HarvestSettings;
use crate::error::{EngineError, Result};
use crate::models::{
    format_number, Category, Context, CropProfiles, HarvestForecast, Output, RuleOutputs, Trace,
    Value,
};
use chrono::NaiveDate;
use serde::Serialize;

pub const CROP_TYPE: &str = "crop_type";
pub const PLANTING_DATE: &str = "planting_date";
pub const ACCUMULATED_GDD: &str = "accumulated_gdd";
pub const CURRENT_DATE: &str = "current_date";

/// Derived keys layered onto the context before gating rules run.
pub const DERIVED_GDD_REMAINING: &str = "harvest.gdd_remaining";
pub const DERIVED_DAYS_REMAINING: &str = "harvest.days_remaining";
pub const DERIVED_PROGRESS_PCT: &str = "harvest.progress_pct";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestProjection {
    pub crop_type: String,
    pub predicted_date: NaiveDate,
    pub days_remaining: f64,
    pub gdd_to_maturity: f64,
    pub gdd_remaining: f64,
    pub progress_pct: f64,
    pub confidence: f64,
}

/// Project the harvest date for a crop.
///
/// `as_of` anchors the projection when given; otherwise the planting date
/// does. An unknown crop is a caller error, never a default.
pub fn predict_harvest(
    profiles: &CropProfiles,
    settings: &HarvestSettings,
    crop_type: &str,
    planting_date: NaiveDate,
    accumulated_gdd: f64,
    as_of: Option<NaiveDate>,
) -> Result<HarvestProjection> {
    let profile = profiles
        .get(crop_type)
        .ok_or_else(|| EngineError::UnknownCrop(crop_type.to_string()))?;

    if !accumulated_gdd.is_finite() || accumulated_gdd < 0.0 {
        return Err(EngineError::InvalidRequest(format!(
            "{} must be a non-negative number, got {}",
            ACCUMULATED_GDD, accumulated_gdd
        )));
    }

    let anchor = match as_of {
        Some(date) if date < planting_date => {
            return Err(EngineError::InvalidRequest(format!(
                "{} {} is before {} {}",
                CURRENT_DATE, date, PLANTING_DATE, planting_date
            )));
        }
        Some(date) => date,
        None => planting_date,
    };

    let days_remaining = calculations::days_remaining(profile, accumulated_gdd);
    let predicted_date = calculations::project_date(anchor, days_remaining).ok_or_else(|| {
        EngineError::InvalidRequest(format!(
            "projected harvest date is out of range ({} days after {})",
            format_number(days_remaining),
            anchor
        ))
    })?;

    Ok(HarvestProjection {
        crop_type: crop_type.trim().to_lowercase(),
        predicted_date,
        days_remaining,
        gdd_to_maturity: profile.gdd_to_maturity,
        gdd_remaining: calculations::gdd_remaining(profile, accumulated_gdd),
        progress_pct: calculations::progress_pct(profile, accumulated_gdd),
        confidence: calculations::projection_confidence(settings, accumulated_gdd),
    })
}

/// Full `predict_harvest` operation: projection plus stage gating.
pub fn predict(rules: &RuleSet, settings: &HarvestSettings, ctx: &Context) -> Result<Trace> {
    let crop_type = ctx.require_text(CROP_TYPE)?;
    let planting_date = ctx.require_date(PLANTING_DATE)?;
    let accumulated_gdd = ctx.require_number(ACCUMULATED_GDD)?;
    let as_of = ctx.optional_date(CURRENT_DATE)?;

    let projection = predict_harvest(
        rules.crop_profiles(),
        settings,
        crop_type,
        planting_date,
        accumulated_gdd,
        as_of,
    )?;

    let staged = ctx.extended([
        (DERIVED_GDD_REMAINING, Value::Number(projection.gdd_remaining)),
        (DERIVED_DAYS_REMAINING, Value::Number(projection.days_remaining)),
        (DERIVED_PROGRESS_PCT, Value::Number(projection.progress_pct)),
    ]);
    rules.check_context(Category::HarvestPrediction, &staged)?;

    let gate = selection::best_match(rules.rules(Category::HarvestPrediction), &staged);

    let summary = format!(
        "{} has accumulated {} of {} GDD ({}%); about {} days remain, projecting harvest on {}.",
        projection.crop_type,
        format_number(accumulated_gdd),
        format_number(projection.gdd_to_maturity),
        format_number(projection.progress_pct),
        format_number(projection.days_remaining),
        projection.predicted_date.format("%Y-%m-%d"),
    );

    let (rule_id, checks, stage_reasoning) = match gate {
        Some(rule) => {
            let checks = match &rule.outputs {
                RuleOutputs::HarvestPrediction(stage) => stage.recommended_checks.clone(),
                _ => Vec::new(),
            };
            (
                rule.id.clone(),
                checks,
                template::render(&rule.reasoning_template, &staged),
            )
        }
        None => (
            Category::HarvestPrediction.default_rule_id().to_string(),
            Vec::new(),
            Category::HarvestPrediction.no_action_reasoning().to_string(),
        ),
    };

    tracing::debug!(
        crop = %projection.crop_type,
        days_remaining = projection.days_remaining,
        gate = %rule_id,
        "Projected harvest"
    );

    Ok(Trace {
        matched: gate.is_some(),
        category: Category::HarvestPrediction,
        confidence: projection.confidence,
        rule_ids: vec![rule_id],
        output: Output::Harvest(HarvestForecast {
            crop_type: projection.crop_type,
            predicted_date: projection.predicted_date,
            days_remaining: projection.days_remaining,
            gdd_remaining: projection.gdd_remaining,
            recommended_checks: checks,
        }),
        reasoning: format!("{} {}", summary, stage_reasoning),
        ruleset_version: rules.version().to_string(),
    })
}
