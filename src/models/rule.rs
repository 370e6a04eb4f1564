use super::advice::{
    FertilizationAdvice, HarvestGate, IrrigationAdvice, PestAdvice, SubsidyGrant,
};
use super::context::{Value, ValueKind};
use serde::{Deserialize, Serialize};

/// The closed set of decision categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Irrigation,
    Fertilization,
    PestControl,
    Subsidy,
    HarvestPrediction,
}

/// How a category reduces its matching rules to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Highest confidence wins; ties go to the earliest declared rule.
    BestMatch,
    /// Every match contributes; quantitative outputs are summed.
    AggregateAll,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Irrigation,
        Category::Fertilization,
        Category::PestControl,
        Category::Subsidy,
        Category::HarvestPrediction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Irrigation => "irrigation",
            Category::Fertilization => "fertilization",
            Category::PestControl => "pest_control",
            Category::Subsidy => "subsidy",
            Category::HarvestPrediction => "harvest_prediction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "irrigation" => Some(Category::Irrigation),
            "fertilization" | "fertilisation" => Some(Category::Fertilization),
            "pest_control" | "pest" => Some(Category::PestControl),
            "subsidy" => Some(Category::Subsidy),
            "harvest_prediction" | "harvest" => Some(Category::HarvestPrediction),
            _ => None,
        }
    }

    /// Selection policy for this category. Adding a category means choosing here.
    pub fn policy(&self) -> Policy {
        match self {
            Category::Irrigation
            | Category::Fertilization
            | Category::PestControl
            | Category::HarvestPrediction => Policy::BestMatch,
            Category::Subsidy => Policy::AggregateAll,
        }
    }

    /// Reserved rule id reported when no authored rule matched.
    pub fn default_rule_id(&self) -> &'static str {
        match self {
            Category::Irrigation => "DEFAULT_IRRIGATION",
            Category::Fertilization => "DEFAULT_FERTILIZATION",
            Category::PestControl => "DEFAULT_PEST_CONTROL",
            Category::Subsidy => "DEFAULT_SUBSIDY",
            Category::HarvestPrediction => "DEFAULT_HARVEST_PREDICTION",
        }
    }

    pub fn no_action_reasoning(&self) -> &'static str {
        match self {
            Category::Irrigation => {
                "No irrigation rule matched the observed conditions; no irrigation is recommended. \
                 Re-evaluate when soil moisture or weather readings change."
            }
            Category::Fertilization => {
                "No fertilization rule matched the observed soil and crop stage; no application \
                 is recommended. A soil test will sharpen this advice."
            }
            Category::PestControl => {
                "No pest rule matched the observations; no treatment is recommended. \
                 Continue routine scouting."
            }
            Category::Subsidy => {
                "No subsidy program matched the farm profile; no payments are expected."
            }
            Category::HarvestPrediction => {
                "No harvest-stage rule matched; follow routine crop monitoring."
            }
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    InSet,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::InSet => "in_set",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Threshold {
    Scalar(Value),
    Set(Vec<Value>),
}

impl Threshold {
    pub fn kind(&self) -> ValueKind {
        match self {
            Threshold::Scalar(v) => v.kind(),
            // Loader guarantees sets are non-empty and homogeneous.
            Threshold::Set(values) => values.first().map_or(ValueKind::Text, Value::kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub threshold: Threshold,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Operator, threshold: Threshold) -> Self {
        Self {
            field: field.into(),
            op,
            threshold,
        }
    }
}

/// Category-specific payload, checked against the category at load time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleOutputs {
    Irrigation(IrrigationAdvice),
    Fertilization(FertilizationAdvice),
    PestControl(PestAdvice),
    Subsidy(SubsidyGrant),
    HarvestPrediction(HarvestGate),
}

/// A validated rule. Only the loader constructs these from source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: String,
    pub category: Category,
    pub conditions: Vec<Condition>,
    pub confidence: f64,
    pub outputs: RuleOutputs,
    pub reasoning_template: String,
}
