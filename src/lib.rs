//! Deterministic, versioned agronomy decision engine.
//!
//! Rules are loaded from YAML into an immutable [`RuleSet`], evaluated
//! against a flat [`Context`] and explained by a [`Trace`].

pub mod audit;
pub mod config;
pub mod error;
pub mod logic;
pub mod models;
pub mod tool;

pub use config::Config;
pub use error::{EngineError, ErrorClass, LoadError, Result};
pub use logic::{DecisionEngine, ReloadReport, RuleSet, RuleSource, TraceSink};
pub use models::{Category, Context, Operation, Trace, Value};
