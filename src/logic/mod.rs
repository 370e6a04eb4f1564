pub mod calculations;
pub mod harvest;
pub mod rules;
pub mod subsidy;

pub use harvest::{predict_harvest, HarvestProjection};
pub use rules::{DecisionEngine, ReloadReport, RuleSet, RuleSource, TraceSink};
