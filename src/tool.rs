//! JSON request/response envelope for exposing the engine as a callable tool.
//!
//! One request per line in, one response per line out. Errors are reported
//! in-band with their class so the caller can tell its own mistakes apart
//! from rule configuration problems.

use crate::error::{EngineError, ErrorClass};
use crate::logic::rules::{DecisionEngine, ReloadReport, RuleSource};
use crate::models::{Context, Operation, Trace};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ToolRequest {
    EvaluateIrrigation {
        #[serde(default)]
        context: Context,
    },
    EvaluateFertilization {
        #[serde(default)]
        context: Context,
    },
    EvaluatePestControl {
        #[serde(default)]
        context: Context,
    },
    CalculateSubsidy {
        #[serde(default)]
        context: Context,
    },
    PredictHarvest {
        #[serde(default)]
        context: Context,
    },
    /// Reload from `path`, or from the configured rule path when omitted.
    ReloadRules {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl ToolRequest {
    pub fn parse(line: &str) -> Result<Self, EngineError> {
        serde_json::from_str(line).map_err(|e| EngineError::InvalidRequest(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolError {
    pub class: ErrorClass,
    pub message: String,
}

impl From<&EngineError> for ToolError {
    fn from(e: &EngineError) -> Self {
        Self {
            class: e.class(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload: Option<ReloadReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    pub fn trace(trace: Trace) -> Self {
        Self {
            ok: true,
            trace: Some(trace),
            reload: None,
            error: None,
        }
    }

    pub fn reloaded(report: ReloadReport) -> Self {
        Self {
            ok: true,
            trace: None,
            reload: Some(report),
            error: None,
        }
    }

    pub fn error(e: &EngineError) -> Self {
        Self {
            ok: false,
            trace: None,
            reload: None,
            error: Some(e.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"ok":false,"error":{{"class":"internal","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

pub fn dispatch(engine: &DecisionEngine, request: ToolRequest, rules_path: &Path) -> ToolResponse {
    let (operation, context) = match request {
        ToolRequest::EvaluateIrrigation { context } => (Operation::EvaluateIrrigation, context),
        ToolRequest::EvaluateFertilization { context } => {
            (Operation::EvaluateFertilization, context)
        }
        ToolRequest::EvaluatePestControl { context } => (Operation::EvaluatePestControl, context),
        ToolRequest::CalculateSubsidy { context } => (Operation::CalculateSubsidy, context),
        ToolRequest::PredictHarvest { context } => (Operation::PredictHarvest, context),
        ToolRequest::ReloadRules { path } => {
            let path = path.as_deref().unwrap_or(rules_path);
            return match RuleSource::from_path(path)
                .map_err(EngineError::from)
                .and_then(|source| engine.reload_rules(&source))
            {
                Ok(report) => ToolResponse::reloaded(report),
                Err(e) => ToolResponse::error(&e),
            };
        }
    };

    match engine.run(operation, &context) {
        Ok(trace) => ToolResponse::trace(trace),
        Err(e) => ToolResponse::error(&e),
    }
}

/// Parse and dispatch one line of input.
pub fn handle_line(engine: &DecisionEngine, line: &str, rules_path: &Path) -> ToolResponse {
    match ToolRequest::parse(line) {
        Ok(request) => dispatch(engine, request, rules_path),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected tool request");
            ToolResponse::error(&e)
        }
    }
}
