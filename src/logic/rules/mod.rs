//! Declarative rules: loading, matching, selection and the engine that
//! ties them together.

pub mod engine;
pub mod loader;
pub mod predicate;
pub mod ruleset;
pub mod selection;
pub mod template;

pub use engine::{DecisionEngine, ReloadReport, TraceSink};
pub use loader::{load, RuleSource};
pub use ruleset::RuleSet;
