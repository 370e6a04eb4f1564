use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Advisory,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Advisory => "Advisory",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PestAction {
    NoAction,
    Monitor,
    Scout,
    Treat,
}

impl PestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PestAction::NoAction => "No Action",
            PestAction::Monitor => "Monitor",
            PestAction::Scout => "Scout",
            PestAction::Treat => "Treat",
        }
    }
}

impl std::fmt::Display for PestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IrrigationAdvice {
    pub should_irrigate: bool,
    #[serde(default)]
    pub water_mm: f64,
    #[serde(default)]
    pub timing: Option<String>,
}

impl IrrigationAdvice {
    pub fn no_action() -> Self {
        Self {
            should_irrigate: false,
            water_mm: 0.0,
            timing: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FertilizationAdvice {
    pub fertilize: bool,
    #[serde(default)]
    pub nitrogen_kg_ha: f64,
    #[serde(default)]
    pub phosphorus_kg_ha: f64,
    #[serde(default)]
    pub potassium_kg_ha: f64,
    #[serde(default)]
    pub timing: Option<String>,
}

impl FertilizationAdvice {
    pub fn no_action() -> Self {
        Self {
            fertilize: false,
            nitrogen_kg_ha: 0.0,
            phosphorus_kg_ha: 0.0,
            potassium_kg_ha: 0.0,
            timing: None,
        }
    }

    pub fn total_kg_ha(&self) -> f64 {
        self.nitrogen_kg_ha + self.phosphorus_kg_ha + self.potassium_kg_ha
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PestAdvice {
    pub action: PestAction,
    #[serde(default)]
    pub pesticide: Option<String>,
    #[serde(default)]
    pub organic_alternative: Option<String>,
    pub severity: Severity,
}

impl PestAdvice {
    pub fn no_action() -> Self {
        Self {
            action: PestAction::NoAction,
            pesticide: None,
            organic_alternative: None,
            severity: Severity::Info,
        }
    }
}

/// Payment a single subsidy rule grants when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubsidyGrant {
    pub program: String,
    pub amount: f64,
    /// Context field the amount is multiplied by (e.g. `hectares`).
    #[serde(default)]
    pub per: Option<String>,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<String>,
}

/// Harvest-stage gating payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestGate {
    #[serde(default)]
    pub recommended_checks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramAward {
    pub rule_id: String,
    pub program: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsidySummary {
    pub eligible_programs: Vec<ProgramAward>,
    pub total_amount: f64,
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestForecast {
    pub crop_type: String,
    pub predicted_date: NaiveDate,
    pub days_remaining: f64,
    pub gdd_remaining: f64,
    pub recommended_checks: Vec<String>,
}
