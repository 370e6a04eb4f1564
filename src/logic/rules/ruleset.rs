use crate::error::{EngineError, LoadError, Result};
use crate::models::{Category, Context, CropProfiles, Policy, Rule, ValueKind};
use std::collections::{BTreeMap, HashSet};

/// Immutable, versioned collection of validated rules plus crop reference data.
///
/// Rules keep their declared order within each category; that order is the
/// tie-break for equal confidence. Nothing mutates a `RuleSet` after
/// [`RuleSet::build`], so shared references are safe across threads.
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: String,
    rules: BTreeMap<Category, Vec<Rule>>,
    policies: BTreeMap<Category, Policy>,
    schemas: BTreeMap<Category, BTreeMap<String, ValueKind>>,
    crops: CropProfiles,
}

impl RuleSet {
    /// Assemble a rule set, enforcing id uniqueness and per-category field types.
    pub fn build(
        version: impl Into<String>,
        rules: BTreeMap<Category, Vec<Rule>>,
        crops: CropProfiles,
    ) -> std::result::Result<Self, LoadError> {
        let mut schemas = BTreeMap::new();

        for (category, list) in &rules {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut schema: BTreeMap<String, (ValueKind, &str)> = BTreeMap::new();

            for rule in list {
                if !seen.insert(rule.id.as_str()) {
                    return Err(LoadError::DuplicateRule {
                        category: *category,
                        rule_id: rule.id.clone(),
                    });
                }

                for condition in &rule.conditions {
                    let kind = condition.threshold.kind();
                    match schema.get(&condition.field) {
                        Some((existing, owner)) if *existing != kind => {
                            return Err(LoadError::ConflictingFieldType {
                                category: *category,
                                field: condition.field.clone(),
                                first: *existing,
                                first_rule: owner.to_string(),
                                second: kind,
                                second_rule: rule.id.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            schema.insert(condition.field.clone(), (kind, rule.id.as_str()));
                        }
                    }
                }
            }

            schemas.insert(
                *category,
                schema
                    .into_iter()
                    .map(|(field, (kind, _))| (field, kind))
                    .collect(),
            );
        }

        let policies = Category::ALL.iter().map(|c| (*c, c.policy())).collect();

        Ok(Self {
            version: version.into(),
            rules,
            policies,
            schemas,
            crops,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rules of a category in declared order; empty when none were loaded.
    pub fn rules(&self, category: Category) -> &[Rule] {
        self.rules.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn policy(&self, category: Category) -> Policy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.policy())
    }

    pub fn crop_profiles(&self) -> &CropProfiles {
        &self.crops
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Reject context values whose type disagrees with how the category's
    /// rules compare that field. Absent fields are fine.
    pub fn check_context(&self, category: Category, ctx: &Context) -> Result<()> {
        let Some(schema) = self.schemas.get(&category) else {
            return Ok(());
        };
        for (field, expected) in schema {
            if let Some(value) = ctx.get(field) {
                if value.kind() != *expected {
                    return Err(EngineError::ContextType {
                        field: field.clone(),
                        expected: *expected,
                        found: value.kind(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Condition, IrrigationAdvice, Operator, RuleOutputs, Threshold, Value,
    };

    fn rule(id: &str, field: &str, threshold: Value) -> Rule {
        Rule {
            id: id.into(),
            category: Category::Irrigation,
            conditions: vec![Condition::new(field, Operator::Eq, Threshold::Scalar(threshold))],
            confidence: 0.7,
            outputs: RuleOutputs::Irrigation(IrrigationAdvice::no_action()),
            reasoning_template: "test".into(),
        }
    }

    #[test]
    fn duplicate_ids_within_a_category_are_fatal() {
        let mut rules = BTreeMap::new();
        rules.insert(
            Category::Irrigation,
            vec![
                rule("R1", "crop_type", Value::Text("rice".into())),
                rule("R1", "crop_type", Value::Text("maize".into())),
            ],
        );
        let err = RuleSet::build("v1", rules, CropProfiles::new()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateRule { ref rule_id, .. } if rule_id == "R1"));
    }

    #[test]
    fn conflicting_field_types_are_fatal() {
        let mut rules = BTreeMap::new();
        rules.insert(
            Category::Irrigation,
            vec![
                rule("R1", "soil_type", Value::Text("clay".into())),
                rule("R2", "soil_type", Value::Number(3.0)),
            ],
        );
        let err = RuleSet::build("v1", rules, CropProfiles::new()).unwrap_err();
        assert!(err.to_string().contains("soil_type"));
        assert!(err.to_string().contains("R2"));
    }

    #[test]
    fn check_context_flags_wrong_types_only() {
        let mut rules = BTreeMap::new();
        rules.insert(
            Category::Irrigation,
            vec![rule("R1", "temperature_c", Value::Number(30.0))],
        );
        let set = RuleSet::build("v1", rules, CropProfiles::new()).unwrap();

        assert!(set
            .check_context(Category::Irrigation, &Context::new())
            .is_ok());
        assert!(set
            .check_context(Category::Irrigation, &Context::new().with("temperature_c", 31.0))
            .is_ok());
        let err = set
            .check_context(Category::Irrigation, &Context::new().with("temperature_c", "hot"))
            .unwrap_err();
        assert!(matches!(err, EngineError::ContextType { .. }));
        assert_eq!(
            set.schemas[&Category::Irrigation].get("temperature_c"),
            Some(&ValueKind::Number)
        );
    }

    #[test]
    fn unknown_category_has_no_rules_but_a_policy() {
        let set = RuleSet::build("v1", BTreeMap::new(), CropProfiles::new()).unwrap();
        assert!(set.rules(Category::Subsidy).is_empty());
        assert_eq!(set.policy(Category::Subsidy), Policy::AggregateAll);
        assert_eq!(set.rule_count(), 0);
    }
}
