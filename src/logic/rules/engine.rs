use super::loader::{self, RuleSource};
use super::ruleset::RuleSet;
use super::{selection, template};
use crate::config::EngineSettings;
use crate::error::Result;
use crate::logic::{harvest, subsidy};
use crate::models::{
    Category, Context, FertilizationAdvice, HarvestGate, IrrigationAdvice, Operation, Output,
    PestAdvice, Policy, Rule, RuleOutputs, SubsidySummary, Trace,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Receives every trace the engine produces. Sinks observe only; they
/// cannot change or fail an evaluation.
pub trait TraceSink: Send + Sync {
    fn record(&self, operation: Operation, trace: &Trace);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReloadReport {
    pub previous_version: String,
    pub version: String,
    pub rules: usize,
    pub crops: usize,
}

/// Evaluates contexts against the active rule set.
///
/// The active set is an immutable snapshot behind an `Arc`. Each call clones
/// the `Arc` once and evaluates against that snapshot, so a concurrent
/// reload never shows a caller a mix of two versions.
pub struct DecisionEngine {
    active: RwLock<Arc<RuleSet>>,
    settings: EngineSettings,
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl DecisionEngine {
    pub fn new(rules: RuleSet, settings: EngineSettings) -> Self {
        Self {
            active: RwLock::new(Arc::new(rules)),
            settings,
            sinks: Vec::new(),
        }
    }

    pub fn from_source(source: &RuleSource, settings: EngineSettings) -> Result<Self> {
        Ok(Self::new(loader::load(source)?, settings))
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Current rule set snapshot.
    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(&*self.active.read())
    }

    pub fn version(&self) -> String {
        self.rules().version().to_string()
    }

    pub fn evaluate_irrigation(&self, ctx: &Context) -> Result<Trace> {
        self.run(Operation::EvaluateIrrigation, ctx)
    }

    pub fn evaluate_fertilization(&self, ctx: &Context) -> Result<Trace> {
        self.run(Operation::EvaluateFertilization, ctx)
    }

    pub fn evaluate_pest_control(&self, ctx: &Context) -> Result<Trace> {
        self.run(Operation::EvaluatePestControl, ctx)
    }

    pub fn calculate_subsidy(&self, ctx: &Context) -> Result<Trace> {
        self.run(Operation::CalculateSubsidy, ctx)
    }

    pub fn predict_harvest(&self, ctx: &Context) -> Result<Trace> {
        self.run(Operation::PredictHarvest, ctx)
    }

    /// Run one operation and hand the trace to every sink.
    pub fn run(&self, operation: Operation, ctx: &Context) -> Result<Trace> {
        let snapshot = self.rules();
        let trace = match operation {
            Operation::PredictHarvest => harvest::predict(&snapshot, &self.settings.harvest, ctx)?,
            other => self.evaluate_in(&snapshot, other.category(), ctx)?,
        };
        for sink in &self.sinks {
            sink.record(operation, &trace);
        }
        Ok(trace)
    }

    /// Policy evaluation of one category against the current snapshot.
    ///
    /// For `harvest_prediction` this is stage gating only; the date
    /// projection lives in [`DecisionEngine::predict_harvest`].
    pub fn evaluate(&self, category: Category, ctx: &Context) -> Result<Trace> {
        self.evaluate_in(&self.rules(), category, ctx)
    }

    fn evaluate_in(&self, set: &RuleSet, category: Category, ctx: &Context) -> Result<Trace> {
        set.check_context(category, ctx)?;

        let policy = set.policy(category);
        let selected = selection::select(policy, set.rules(category), ctx);
        tracing::debug!(
            %category,
            candidates = selected.len(),
            winner = selected.first().map(|r| r.id.as_str()).unwrap_or("none"),
            "Evaluated category"
        );

        let trace = match (policy, selected.as_slice()) {
            (_, []) => self.no_match(category, set.version()),
            (Policy::BestMatch, [winner, ..]) => best_match_trace(winner, ctx, set.version())?,
            (Policy::AggregateAll, matches) => {
                subsidy::aggregate_trace(matches, ctx, set.version())?
            }
        };
        Ok(trace)
    }

    /// Explicit no-action result. Never empty: it names the category's
    /// reserved default id.
    fn no_match(&self, category: Category, version: &str) -> Trace {
        let output = match category {
            Category::Irrigation => Output::Irrigation(IrrigationAdvice::no_action()),
            Category::Fertilization => Output::Fertilization(FertilizationAdvice::no_action()),
            Category::PestControl => Output::PestControl(PestAdvice::no_action()),
            Category::Subsidy => Output::Subsidy(SubsidySummary::default()),
            Category::HarvestPrediction => Output::HarvestStage(HarvestGate::default()),
        };
        Trace {
            matched: false,
            category,
            confidence: self.settings.no_match_confidence,
            rule_ids: vec![category.default_rule_id().to_string()],
            output,
            reasoning: category.no_action_reasoning().to_string(),
            ruleset_version: version.to_string(),
        }
    }

    /// Load `source` off to the side and publish it if valid.
    ///
    /// On failure the previous rule set keeps serving and the error is
    /// returned; nothing partial is ever activated.
    pub fn reload_rules(&self, source: &RuleSource) -> Result<ReloadReport> {
        let next = match loader::load(source) {
            Ok(set) => Arc::new(set),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    active_version = %self.version(),
                    "Rejected rule reload; keeping active rule set"
                );
                return Err(e.into());
            }
        };

        let previous = {
            let mut active = self.active.write();
            std::mem::replace(&mut *active, Arc::clone(&next))
        };

        let report = ReloadReport {
            previous_version: previous.version().to_string(),
            version: next.version().to_string(),
            rules: next.rule_count(),
            crops: next.crop_profiles().len(),
        };
        tracing::info!(
            from = %report.previous_version,
            to = %report.version,
            rules = report.rules,
            "Activated rule set"
        );
        Ok(report)
    }
}

fn best_match_trace(rule: &Rule, ctx: &Context, version: &str) -> Result<Trace> {
    let output = match &rule.outputs {
        RuleOutputs::Irrigation(advice) => Output::Irrigation(advice.clone()),
        RuleOutputs::Fertilization(advice) => Output::Fertilization(advice.clone()),
        RuleOutputs::PestControl(advice) => Output::PestControl(advice.clone()),
        RuleOutputs::Subsidy(_) => Output::Subsidy(subsidy::summarize(&[rule], ctx)?),
        RuleOutputs::HarvestPrediction(gate) => Output::HarvestStage(gate.clone()),
    };
    Ok(Trace {
        matched: true,
        category: rule.category,
        confidence: rule.confidence,
        rule_ids: vec![rule.id.clone()],
        output,
        reasoning: template::render(&rule.reasoning_template, ctx),
        ruleset_version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorClass};
    use crate::models::PestAction;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    fn shipped() -> RuleSource {
        RuleSource::new()
            .with_document("irrigation.yaml", include_str!("../../../rules/irrigation.yaml"))
            .with_document(
                "fertilization.yaml",
                include_str!("../../../rules/fertilization.yaml"),
            )
            .with_document(
                "pest_control.yaml",
                include_str!("../../../rules/pest_control.yaml"),
            )
            .with_document("subsidy.yaml", include_str!("../../../rules/subsidy.yaml"))
            .with_document(
                "harvest_prediction.yaml",
                include_str!("../../../rules/harvest_prediction.yaml"),
            )
            .with_document(
                "crop_profiles.yaml",
                include_str!("../../../rules/crop_profiles.yaml"),
            )
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::from_source(&shipped(), EngineSettings::default()).unwrap()
    }

    fn tie_source(version: &str) -> RuleSource {
        RuleSource::from_yaml(
            "tie.yaml",
            format!(
                r#"
version: "{version}"
category: irrigation
rules:
  - id: TIE_FIRST
    conditions: [{{ field: "soil_moisture_%", op: lte, value: 40 }}]
    confidence: 0.8
    outputs: {{ should_irrigate: true, water_mm: 25 }}
    reasoning: "first"
  - id: TIE_SECOND
    conditions: [{{ field: "soil_moisture_%", op: lte, value: 40 }}]
    confidence: 0.8
    outputs: {{ should_irrigate: true, water_mm: 35 }}
    reasoning: "second"
"#
            ),
        )
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Operation, String)>>);

    impl TraceSink for Recorder {
        fn record(&self, operation: Operation, trace: &Trace) {
            self.0
                .lock()
                .push((operation, trace.primary_rule_id().to_string()));
        }
    }

    #[test]
    fn shipped_rules_load() {
        let set = engine().rules();
        for category in Category::ALL {
            assert!(
                !set.rules(category).is_empty(),
                "no shipped rules for {}",
                category
            );
        }
        assert!(set.crop_profiles().get("cotton").is_some());
    }

    #[test]
    fn cotton_heat_scenario_picks_rule_irr_003() {
        let ctx = Context::new()
            .with("crop_type", "cotton")
            .with("soil_moisture_%", 30)
            .with("temperature_c", 32)
            .with("rainfall_mm_7d", 0);
        let trace = engine().evaluate_irrigation(&ctx).unwrap();
        let advice = trace.irrigation().unwrap();
        assert!(trace.matched);
        assert!(advice.should_irrigate);
        assert_eq!(advice.water_mm, 30.0);
        assert_eq!(trace.rule_ids, vec!["RULE_IRR_003"]);
        assert_eq!(trace.confidence, 0.85);
    }

    #[test]
    fn durian_harvest_is_an_invalid_request() {
        let ctx = Context::new()
            .with("crop_type", "durian")
            .with("planting_date", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .with("accumulated_gdd", 900.0);
        let err = engine().predict_harvest(&ctx).unwrap_err();
        assert!(matches!(err, EngineError::UnknownCrop(_)));
        assert_eq!(err.class(), ErrorClass::InvalidRequest);
    }

    #[test]
    fn cotton_harvest_projection() {
        let ctx = Context::new()
            .with("crop_type", "cotton")
            .with("planting_date", NaiveDate::from_ymd_opt(2024, 4, 15).unwrap())
            .with("accumulated_gdd", 1000.0);
        let trace = engine().predict_harvest(&ctx).unwrap();
        let forecast = trace.harvest().unwrap();
        assert_eq!(
            forecast.predicted_date,
            NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()
        );
        assert_eq!(trace.confidence, 0.85);
        assert!(!trace.rule_ids.is_empty());
    }

    #[test]
    fn identical_calls_serialize_identically() {
        let engine = engine();
        let ctx = Context::new()
            .with("crop_type", "cotton")
            .with("hectares", 3.0)
            .with("farmer.category", "smallholder")
            .with("farmer.owns_land", true)
            .with("soil_moisture_%", 22.0)
            .with("temperature_c", 34.0);
        for operation in [
            Operation::EvaluateIrrigation,
            Operation::EvaluateFertilization,
            Operation::EvaluatePestControl,
            Operation::CalculateSubsidy,
        ] {
            let first = engine.run(operation, &ctx).unwrap().to_json().unwrap();
            for _ in 0..20 {
                assert_eq!(engine.run(operation, &ctx).unwrap().to_json().unwrap(), first);
            }
        }
    }

    #[test]
    fn missing_fields_yield_the_default_never_an_error() {
        let engine = engine();
        let empty = Context::new();
        for category in [
            Category::Irrigation,
            Category::Fertilization,
            Category::PestControl,
            Category::Subsidy,
        ] {
            let trace = engine.evaluate(category, &empty).unwrap();
            assert!(!trace.matched);
            assert_eq!(trace.rule_ids, vec![category.default_rule_id()]);
            assert_eq!(trace.confidence, 0.5);
            assert!(!trace.reasoning.is_empty());
        }
        let subsidy = engine.calculate_subsidy(&empty).unwrap();
        assert_eq!(subsidy.subsidy().unwrap().total_amount, 0.0);
        let pest = engine.evaluate_pest_control(&empty).unwrap();
        assert_eq!(pest.pest_control().unwrap().action, PestAction::NoAction);
    }

    #[test]
    fn wrong_context_type_is_an_invalid_request() {
        let ctx = Context::new().with("soil_moisture_%", "dry");
        let err = engine().evaluate_irrigation(&ctx).unwrap_err();
        assert!(matches!(err, EngineError::ContextType { .. }));
        assert_eq!(err.class(), ErrorClass::InvalidRequest);
    }

    #[test]
    fn subsidy_totals_add_up() {
        let engine = engine();
        let ctx = Context::new()
            .with("crop_type", "rice")
            .with("hectares", 1.5)
            .with("farmer.category", "smallholder")
            .with("farmer.owns_land", true)
            .with("farmer.organic_certified", true);
        let trace = engine.calculate_subsidy(&ctx).unwrap();
        let summary = trace.subsidy().unwrap();
        assert!(trace.matched);
        assert!(trace.rule_ids.len() >= 2);
        assert_eq!(trace.rule_ids.len(), summary.eligible_programs.len());
        let sum: f64 = summary.eligible_programs.iter().map(|p| p.amount).sum();
        assert!((summary.total_amount - sum).abs() < 1e-9);
    }

    #[test]
    fn negative_hectares_are_an_invalid_request() {
        let ctx = Context::new()
            .with("hectares", -4.0)
            .with("farmer.category", "smallholder");
        let err = engine().calculate_subsidy(&ctx).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert_eq!(err.class(), ErrorClass::InvalidRequest);
    }

    #[test]
    fn fertilization_limits_include_the_boundary() {
        let engine = engine();
        let at_limit = Context::new()
            .with("soil.nitrogen_ppm", 20.0)
            .with("growth_stage", "vegetative");
        let trace = engine.evaluate_fertilization(&at_limit).unwrap();
        assert!(trace.matched);
        assert_eq!(trace.rule_ids, vec!["RULE_FERT_001"]);

        let above = Context::new()
            .with("soil.nitrogen_ppm", 20.1)
            .with("growth_stage", "vegetative");
        let trace = engine.evaluate_fertilization(&above).unwrap();
        assert_eq!(trace.rule_ids, vec!["DEFAULT_FERTILIZATION"]);

        let potassium = Context::new().with("soil.potassium_ppm", 100.0);
        let trace = engine.evaluate_fertilization(&potassium).unwrap();
        assert_eq!(trace.rule_ids, vec!["RULE_FERT_003"]);
    }

    #[test]
    fn tie_break_survives_reloads() {
        let engine = DecisionEngine::from_source(&tie_source("a"), EngineSettings::default())
            .unwrap();
        let ctx = Context::new().with("soil_moisture_%", 20.0);
        for round in 0..5 {
            let trace = engine.evaluate_irrigation(&ctx).unwrap();
            assert_eq!(trace.rule_ids, vec!["TIE_FIRST"]);
            assert_eq!(trace.irrigation().unwrap().water_mm, 25.0);
            engine
                .reload_rules(&tie_source(&format!("r{}", round)))
                .unwrap();
        }
    }

    #[test]
    fn failed_reload_keeps_the_active_set() {
        let engine = DecisionEngine::from_source(&tie_source("good"), EngineSettings::default())
            .unwrap();
        let broken = RuleSource::from_yaml(
            "broken.yaml",
            "version: bad\ncategory: irrigation\nrules:\n  - id: X\n    conditions: []\n    confidence: 2\n",
        );
        let err = engine.reload_rules(&broken).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert_eq!(engine.version(), "good");

        let report = engine.reload_rules(&tie_source("next")).unwrap();
        assert_eq!(report.previous_version, "good");
        assert_eq!(report.version, "next");
        assert_eq!(report.rules, 2);
    }

    #[test]
    fn readers_see_whole_versions_during_swaps() {
        let engine = DecisionEngine::from_source(&tie_source("v0"), EngineSettings::default())
            .unwrap();
        let ctx = Context::new().with("soil_moisture_%", 20.0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let trace = engine.evaluate_irrigation(&ctx).unwrap();
                        assert_eq!(trace.rule_ids, vec!["TIE_FIRST"]);
                        assert!(trace.ruleset_version.starts_with('v'));
                    }
                });
            }
            scope.spawn(|| {
                for i in 1..50 {
                    engine.reload_rules(&tie_source(&format!("v{}", i))).unwrap();
                }
            });
        });
        assert_eq!(engine.version(), "v49");
    }

    #[test]
    fn sinks_see_every_trace() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine().with_sink(recorder.clone());
        let ctx = Context::new().with("soil_moisture_%", 30).with("temperature_c", 32);
        engine.evaluate_irrigation(&ctx).unwrap();
        engine.calculate_subsidy(&Context::new()).unwrap();

        let seen = recorder.0.lock();
        assert_eq!(
            *seen,
            vec![
                (Operation::EvaluateIrrigation, "RULE_IRR_003".to_string()),
                (Operation::CalculateSubsidy, "DEFAULT_SUBSIDY".to_string()),
            ]
        );
    }
}
