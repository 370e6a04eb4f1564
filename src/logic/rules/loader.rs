//! Declarative rule source → validated [`RuleSet`].
//!
//! A source is one or more YAML documents. A rule document declares a
//! `category` and its `rules`; a reference document declares
//! `crop_profiles`. Any violation aborts the whole load.

use super::ruleset::RuleSet;
use super::template;
use crate::error::LoadError;
use crate::models::{
    Category, Condition, CropProfile, CropProfiles, FertilizationAdvice, HarvestGate,
    IrrigationAdvice, Operator, PestAction, PestAdvice, Rule, RuleOutputs, SubsidyGrant,
    Threshold, Value, ValueKind,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const UNVERSIONED: &str = "unversioned";

/// Prefix reserved for the engine's no-match defaults.
const RESERVED_ID_PREFIX: &str = "DEFAULT_";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub origin: String,
    pub text: String,
}

/// Raw YAML text to be loaded, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSource {
    documents: Vec<SourceDocument>,
}

impl RuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source from a YAML string; `---` separated documents are allowed.
    pub fn from_yaml(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new().with_document(origin, text)
    }

    pub fn with_document(mut self, origin: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.push(SourceDocument {
            origin: origin.into(),
            text: text.into(),
        });
        self
    }

    /// Read a single file, or every `*.yaml`/`*.yml` file of a directory in
    /// file-name order.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let read_err = |source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut source = RuleSource::new();
        for file in yaml_files(path).map_err(read_err)? {
            let text = std::fs::read_to_string(&file).map_err(|source| LoadError::Read {
                path: file.clone(),
                source,
            })?;
            source = source.with_document(file.display().to_string(), text);
        }

        if source.documents.is_empty() {
            return Err(LoadError::InvalidDocument {
                origin: path.display().to_string(),
                message: "no .yaml rule files found".into(),
            });
        }
        Ok(source)
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }
}

fn yaml_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        // Surface a missing file as an IO error.
        std::fs::metadata(path)?;
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Rule files under a path with their modification times, for change
/// polling. Adding, removing or touching a file changes the result.
pub fn fingerprint(path: &Path) -> Option<Vec<(PathBuf, SystemTime)>> {
    let files = yaml_files(path).ok()?;
    Some(
        files
            .into_iter()
            .filter_map(|f| {
                let modified = std::fs::metadata(&f).and_then(|m| m.modified()).ok()?;
                Some((f, modified))
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    category: Option<Category>,
    #[serde(default)]
    rules: Option<Vec<RawRule>>,
    #[serde(default)]
    crop_profiles: Option<BTreeMap<String, CropProfile>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    conditions: Vec<RawCondition>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    outputs: Option<serde_yaml::Value>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCondition {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    value: Option<serde_yaml::Value>,
}

struct Loaded {
    version: Option<String>,
    rules: BTreeMap<Category, Vec<Rule>>,
    rule_origins: BTreeMap<Category, String>,
    crops: CropProfiles,
    crop_origins: BTreeMap<String, String>,
}

/// Parse and validate a complete rule source.
pub fn load(source: &RuleSource) -> Result<RuleSet, LoadError> {
    let mut loaded = Loaded {
        version: None,
        rules: BTreeMap::new(),
        rule_origins: BTreeMap::new(),
        crops: CropProfiles::new(),
        crop_origins: BTreeMap::new(),
    };
    let mut document_count = 0usize;

    for document in source.documents() {
        for (index, de) in serde_yaml::Deserializer::from_str(&document.text).enumerate() {
            let origin = if index == 0 {
                document.origin.clone()
            } else {
                format!("{}#{}", document.origin, index + 1)
            };
            let raw = RawDocument::deserialize(de).map_err(|source| LoadError::Malformed {
                origin: origin.clone(),
                source,
            })?;
            absorb_document(&mut loaded, &origin, raw)?;
            document_count += 1;
        }
    }

    if document_count == 0 {
        return Err(LoadError::InvalidDocument {
            origin: "<source>".into(),
            message: "rule source contains no documents".into(),
        });
    }

    let version = loaded
        .version
        .unwrap_or_else(|| UNVERSIONED.to_string());

    if loaded.crops.is_empty() {
        tracing::warn!("Rule source has no crop profiles; harvest prediction will reject every crop");
    }

    let set = RuleSet::build(version, loaded.rules, loaded.crops)?;
    tracing::info!(
        version = %set.version(),
        rules = set.rule_count(),
        crops = set.crop_profiles().len(),
        "Loaded rule set"
    );
    Ok(set)
}

fn absorb_document(loaded: &mut Loaded, origin: &str, raw: RawDocument) -> Result<(), LoadError> {
    if let Some(version) = raw.version {
        let version = scalar_to_string(&version).ok_or_else(|| LoadError::InvalidDocument {
            origin: origin.to_string(),
            message: "version must be a string or number".into(),
        })?;
        match &loaded.version {
            Some(existing) if *existing != version => {
                return Err(LoadError::VersionMismatch {
                    first: existing.clone(),
                    second: version,
                });
            }
            Some(_) => {}
            None => loaded.version = Some(version),
        }
    }

    match (raw.category, raw.rules, raw.crop_profiles) {
        (Some(category), rules, None) => {
            if let Some(first) = loaded.rule_origins.get(&category) {
                return Err(LoadError::DuplicateCategory {
                    category,
                    first: first.clone(),
                    second: origin.to_string(),
                });
            }
            let rules = rules
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(position, raw_rule)| build_rule(category, position, raw_rule))
                .collect::<Result<Vec<_>, _>>()?;
            loaded.rule_origins.insert(category, origin.to_string());
            loaded.rules.insert(category, rules);
            Ok(())
        }
        (None, None, Some(profiles)) => {
            for (crop, profile) in profiles {
                validate_crop(&crop, &profile)?;
                if let Some(first) = loaded.crop_origins.get(&crop.trim().to_lowercase()) {
                    return Err(LoadError::InvalidCropProfile {
                        crop,
                        message: format!("declared in both {} and {}", first, origin),
                    });
                }
                loaded
                    .crop_origins
                    .insert(crop.trim().to_lowercase(), origin.to_string());
                loaded.crops.insert(&crop, profile);
            }
            Ok(())
        }
        (None, Some(_), _) => Err(LoadError::InvalidDocument {
            origin: origin.to_string(),
            message: "rules listed without a category".into(),
        }),
        (Some(_), _, Some(_)) => Err(LoadError::InvalidDocument {
            origin: origin.to_string(),
            message: "a document holds either category rules or crop_profiles, not both".into(),
        }),
        (None, None, None) => Err(LoadError::InvalidDocument {
            origin: origin.to_string(),
            message: "document declares neither a category nor crop_profiles".into(),
        }),
    }
}

fn validate_crop(crop: &str, profile: &CropProfile) -> Result<(), LoadError> {
    let invalid = |message: String| LoadError::InvalidCropProfile {
        crop: crop.to_string(),
        message,
    };
    if crop.trim().is_empty() {
        return Err(invalid("crop name is empty".into()));
    }
    if !profile.gdd_to_maturity.is_finite() || profile.gdd_to_maturity <= 0.0 {
        return Err(invalid(format!(
            "gdd_to_maturity must be positive, got {}",
            profile.gdd_to_maturity
        )));
    }
    if !profile.daily_gdd_rate_assumption.is_finite() || profile.daily_gdd_rate_assumption <= 0.0
    {
        return Err(invalid(format!(
            "daily_gdd_rate_assumption must be positive, got {}",
            profile.daily_gdd_rate_assumption
        )));
    }
    Ok(())
}

fn build_rule(category: Category, position: usize, raw: RawRule) -> Result<Rule, LoadError> {
    let id = raw
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LoadError::InvalidRule {
            category,
            rule_id: format!("#{}", position + 1),
            message: "missing id".into(),
        })?;

    let invalid = |message: String| LoadError::InvalidRule {
        category,
        rule_id: id.clone(),
        message,
    };

    if id.chars().any(char::is_whitespace) {
        return Err(invalid("id must not contain whitespace".into()));
    }
    if id.starts_with(RESERVED_ID_PREFIX) {
        return Err(invalid(format!(
            "ids starting with {} are reserved for no-match defaults",
            RESERVED_ID_PREFIX
        )));
    }

    let confidence = raw
        .confidence
        .ok_or_else(|| invalid("missing confidence".into()))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(invalid(format!(
            "confidence must be within [0, 1], got {}",
            confidence
        )));
    }

    if raw.conditions.is_empty() {
        return Err(invalid("a rule needs at least one condition".into()));
    }
    let conditions = raw
        .conditions
        .into_iter()
        .map(build_condition)
        .collect::<Result<Vec<_>, String>>()
        .map_err(&invalid)?;

    let reasoning_template = raw
        .reasoning
        .ok_or_else(|| invalid("missing reasoning".into()))?;
    template::validate(&reasoning_template).map_err(&invalid)?;

    let raw_outputs = raw
        .outputs
        .ok_or_else(|| invalid("missing outputs".into()))?;
    let outputs = build_outputs(category, raw_outputs).map_err(&invalid)?;
    validate_outputs(&outputs, &conditions).map_err(&invalid)?;

    Ok(Rule {
        id,
        category,
        conditions,
        confidence,
        outputs,
        reasoning_template,
    })
}

fn build_condition(raw: RawCondition) -> Result<Condition, String> {
    let field = raw
        .field
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or("condition is missing field")?;
    let op_name = raw
        .op
        .ok_or_else(|| format!("condition on {} is missing op", field))?;
    let op: Operator = serde_yaml::from_value(serde_yaml::Value::String(op_name.clone()))
        .map_err(|_| {
            format!(
                "condition on {} has unknown operator {:?} (expected eq, lt, lte, gt, gte or in_set)",
                field, op_name
            )
        })?;
    let value = raw
        .value
        .ok_or_else(|| format!("condition on {} is missing value", field))?;

    let threshold = match op {
        Operator::Eq => Threshold::Scalar(scalar(&value).ok_or_else(|| {
            format!("eq on {} requires a single scalar value", field)
        })?),
        Operator::InSet => {
            let items = value
                .as_sequence()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| format!("in_set on {} requires a non-empty list", field))?;
            let members = items
                .iter()
                .map(scalar)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| format!("in_set on {} accepts only scalar members", field))?;
            let kind = members[0].kind();
            if members.iter().any(|m| m.kind() != kind) {
                return Err(format!("in_set on {} mixes value types", field));
            }
            Threshold::Set(members)
        }
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let threshold = scalar(&value)
                .filter(|v| v.kind().is_ordered())
                .ok_or_else(|| {
                    format!("{} on {} requires a numeric or date threshold", op, field)
                })?;
            Threshold::Scalar(threshold)
        }
    };

    Ok(Condition {
        field,
        op,
        threshold,
    })
}

fn scalar(value: &serde_yaml::Value) -> Option<Value> {
    match value {
        serde_yaml::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Value::Number),
        serde_yaml::Value::String(s) => Some(Value::from_text(s)),
        _ => None,
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn build_outputs(category: Category, raw: serde_yaml::Value) -> Result<RuleOutputs, String> {
    let schema_err =
        |e: serde_yaml::Error| format!("outputs do not match the {} schema: {}", category, e);
    match category {
        Category::Irrigation => serde_yaml::from_value::<IrrigationAdvice>(raw)
            .map(RuleOutputs::Irrigation)
            .map_err(schema_err),
        Category::Fertilization => serde_yaml::from_value::<FertilizationAdvice>(raw)
            .map(RuleOutputs::Fertilization)
            .map_err(schema_err),
        Category::PestControl => serde_yaml::from_value::<PestAdvice>(raw)
            .map(RuleOutputs::PestControl)
            .map_err(schema_err),
        Category::Subsidy => serde_yaml::from_value::<SubsidyGrant>(raw)
            .map(RuleOutputs::Subsidy)
            .map_err(schema_err),
        Category::HarvestPrediction => serde_yaml::from_value::<HarvestGate>(raw)
            .map(RuleOutputs::HarvestPrediction)
            .map_err(schema_err),
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number, got {}", name, value));
    }
    Ok(())
}

fn validate_outputs(outputs: &RuleOutputs, conditions: &[Condition]) -> Result<(), String> {
    match outputs {
        RuleOutputs::Irrigation(advice) => {
            non_negative("water_mm", advice.water_mm)?;
            if advice.should_irrigate && advice.water_mm <= 0.0 {
                return Err("should_irrigate requires a positive water_mm".into());
            }
            if !advice.should_irrigate && advice.water_mm > 0.0 {
                return Err("water_mm must be 0 when should_irrigate is false".into());
            }
        }
        RuleOutputs::Fertilization(advice) => {
            non_negative("nitrogen_kg_ha", advice.nitrogen_kg_ha)?;
            non_negative("phosphorus_kg_ha", advice.phosphorus_kg_ha)?;
            non_negative("potassium_kg_ha", advice.potassium_kg_ha)?;
            if advice.fertilize && advice.total_kg_ha() <= 0.0 {
                return Err("fertilize requires at least one positive N/P/K dose".into());
            }
            if !advice.fertilize && advice.total_kg_ha() > 0.0 {
                return Err("doses must be 0 when fertilize is false".into());
            }
        }
        RuleOutputs::PestControl(advice) => {
            if advice.action == PestAction::Treat
                && advice.pesticide.is_none()
                && advice.organic_alternative.is_none()
            {
                return Err("treat requires a pesticide or an organic_alternative".into());
            }
        }
        RuleOutputs::Subsidy(grant) => {
            if grant.program.trim().is_empty() {
                return Err("subsidy program name is empty".into());
            }
            non_negative("amount", grant.amount)?;
            if let Some(max) = grant.max_amount {
                non_negative("max_amount", max)?;
            }
            if let Some(per) = &grant.per {
                let numeric_guard = conditions
                    .iter()
                    .any(|c| c.field == *per && c.threshold.kind() == ValueKind::Number);
                if !numeric_guard {
                    return Err(format!(
                        "amount is scaled per {} but no numeric condition constrains {}",
                        per, per
                    ));
                }
            }
        }
        RuleOutputs::HarvestPrediction(gate) => {
            if gate.recommended_checks.iter().any(|c| c.trim().is_empty()) {
                return Err("recommended_checks contains an empty entry".into());
            }
        }
    }
    Ok(())
}
