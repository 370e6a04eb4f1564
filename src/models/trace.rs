use super::advice::{
    FertilizationAdvice, HarvestForecast, HarvestGate, IrrigationAdvice, PestAdvice,
    SubsidySummary,
};
use super::rule::Category;
use serde::{Deserialize, Serialize};

/// The public operations of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    EvaluateIrrigation,
    EvaluateFertilization,
    EvaluatePestControl,
    CalculateSubsidy,
    PredictHarvest,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::EvaluateIrrigation,
        Operation::EvaluateFertilization,
        Operation::EvaluatePestControl,
        Operation::CalculateSubsidy,
        Operation::PredictHarvest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::EvaluateIrrigation => "evaluate_irrigation",
            Operation::EvaluateFertilization => "evaluate_fertilization",
            Operation::EvaluatePestControl => "evaluate_pest_control",
            Operation::CalculateSubsidy => "calculate_subsidy",
            Operation::PredictHarvest => "predict_harvest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "evaluate_irrigation" | "irrigation" => Some(Operation::EvaluateIrrigation),
            "evaluate_fertilization" | "fertilization" => Some(Operation::EvaluateFertilization),
            "evaluate_pest_control" | "pest_control" | "pest" => {
                Some(Operation::EvaluatePestControl)
            }
            "calculate_subsidy" | "subsidy" => Some(Operation::CalculateSubsidy),
            "predict_harvest" | "harvest" => Some(Operation::PredictHarvest),
            _ => None,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Operation::EvaluateIrrigation => Category::Irrigation,
            Operation::EvaluateFertilization => Category::Fertilization,
            Operation::EvaluatePestControl => Category::PestControl,
            Operation::CalculateSubsidy => Category::Subsidy,
            Operation::PredictHarvest => Category::HarvestPrediction,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category-specific result payload carried by a [`Trace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Irrigation(IrrigationAdvice),
    Fertilization(FertilizationAdvice),
    PestControl(PestAdvice),
    Subsidy(SubsidySummary),
    /// Stage gating alone, without a date projection.
    HarvestStage(HarvestGate),
    Harvest(HarvestForecast),
}

/// Explainability record returned by every operation.
///
/// Contains no timestamps or other ambient state: the same rule set version
/// and context always serialize to the same bytes. `rule_ids` is never
/// empty; the no-match path reports the category's reserved default id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub matched: bool,
    pub category: Category,
    pub confidence: f64,
    pub rule_ids: Vec<String>,
    pub output: Output,
    pub reasoning: String,
    pub ruleset_version: String,
}

impl Trace {
    pub fn primary_rule_id(&self) -> &str {
        self.rule_ids.first().map(String::as_str).unwrap_or("")
    }

    pub fn irrigation(&self) -> Option<&IrrigationAdvice> {
        match &self.output {
            Output::Irrigation(advice) => Some(advice),
            _ => None,
        }
    }

    pub fn fertilization(&self) -> Option<&FertilizationAdvice> {
        match &self.output {
            Output::Fertilization(advice) => Some(advice),
            _ => None,
        }
    }

    pub fn pest_control(&self) -> Option<&PestAdvice> {
        match &self.output {
            Output::PestControl(advice) => Some(advice),
            _ => None,
        }
    }

    pub fn subsidy(&self) -> Option<&SubsidySummary> {
        match &self.output {
            Output::Subsidy(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn harvest(&self) -> Option<&HarvestForecast> {
        match &self.output {
            Output::Harvest(forecast) => Some(forecast),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
