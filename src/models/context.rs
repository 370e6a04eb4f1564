use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed observation value.
///
/// Strings that parse as ISO dates (`YYYY-MM-DD`) are always dates, both in
/// contexts and in rule thresholds, so the two sides never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Number,
    Date,
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "boolean",
            ValueKind::Number => "number",
            ValueKind::Date => "date",
            ValueKind::Text => "text",
        }
    }

    /// Kinds that support `lt`/`lte`/`gt`/`gte`.
    pub fn is_ordered(&self) -> bool {
        matches!(self, ValueKind::Number | ValueKind::Date)
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::Date(_) => ValueKind::Date,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// Classify a string: ISO dates become `Date`, everything else `Text`.
    pub fn from_text(s: &str) -> Self {
        match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => Value::Date(date),
            Err(_) => Value::Text(s.to_string()),
        }
    }

    /// Parse a command-line literal: bool, then number, then date, then text.
    pub fn parse_literal(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return Value::Number(n);
            }
        }
        Value::from_text(trimmed)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Human-readable rendering used in reasoning strings.
    pub fn display(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from_text(&s)
    }
}

/// Render a number with at most two decimals and no trailing zeros.
pub fn format_number(n: f64) -> String {
    let s = format!("{:.2}", n);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Flat, namespaced observations for a single evaluation call.
///
/// Unknown keys are carried but never inspected. The engine only reads a
/// context; derived values go into a fresh copy via [`Context::extended`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Copy of this context with `extra` layered on top.
    pub fn extended<I, K>(&self, extra: I) -> Context
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut values = self.values.clone();
        for (key, value) in extra {
            values.insert(key.into(), value);
        }
        Context { values }
    }

    /// Build a context from JSON, flattening nested objects into dotted keys.
    ///
    /// `null` leaves the key absent. Arrays have no place in a flat context
    /// and are rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            EngineError::InvalidRequest("context must be a JSON object".into())
        })?;
        let mut values = BTreeMap::new();
        flatten_into(&mut values, None, object)?;
        Ok(Context { values })
    }

    /// Parse `key=value` pairs as given on the command line.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ctx = Context::new();
        for pair in pairs {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                EngineError::InvalidRequest(format!("expected key=value, got '{}'", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(EngineError::InvalidRequest(format!(
                    "empty key in '{}'",
                    pair
                )));
            }
            ctx = ctx.with(key, Value::parse_literal(value));
        }
        Ok(ctx)
    }

    pub fn require(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| EngineError::MissingField(key.to_string()))
    }

    pub fn require_number(&self, key: &str) -> Result<f64> {
        match self.require(key)? {
            Value::Number(n) => Ok(*n),
            other => Err(type_error(key, ValueKind::Number, other)),
        }
    }

    pub fn require_text(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            Value::Text(s) => Ok(s.as_str()),
            other => Err(type_error(key, ValueKind::Text, other)),
        }
    }

    pub fn require_date(&self, key: &str) -> Result<NaiveDate> {
        match self.require(key)? {
            Value::Date(d) => Ok(*d),
            other => Err(type_error(key, ValueKind::Date, other)),
        }
    }

    pub fn optional_date(&self, key: &str) -> Result<Option<NaiveDate>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Date(d)) => Ok(Some(*d)),
            Some(other) => Err(type_error(key, ValueKind::Date, other)),
        }
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let json = serde_json::Value::deserialize(deserializer)?;
        Context::from_json(&json).map_err(D::Error::custom)
    }
}

fn type_error(key: &str, expected: ValueKind, found: &Value) -> EngineError {
    EngineError::ContextType {
        field: key.to_string(),
        expected,
        found: found.kind(),
    }
}

fn flatten_into(
    out: &mut BTreeMap<String, Value>,
    prefix: Option<&str>,
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in object {
        let full_key = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Bool(b) => {
                out.insert(full_key, Value::Bool(*b));
            }
            serde_json::Value::Number(n) => {
                let n = n.as_f64().ok_or_else(|| {
                    EngineError::InvalidRequest(format!("{} is not a finite number", full_key))
                })?;
                out.insert(full_key, Value::Number(n));
            }
            serde_json::Value::String(s) => {
                out.insert(full_key, Value::from_text(s));
            }
            serde_json::Value::Object(nested) => {
                flatten_into(out, Some(&full_key), nested)?;
            }
            serde_json::Value::Array(_) => {
                return Err(EngineError::InvalidRequest(format!(
                    "{} is a list; context values must be scalars",
                    full_key
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_flattens_nested_objects() {
        let ctx = Context::from_json(&json!({
            "crop_type": "cotton",
            "soil": { "nitrogen_ppm": 12, "type": "loam" },
            "weather": { "temperature_c": 31.5, "frost": false },
            "planting_date": "2024-04-15",
            "sensor": null
        }))
        .unwrap();

        assert_eq!(ctx.get("crop_type"), Some(&Value::Text("cotton".into())));
        assert_eq!(ctx.get("soil.nitrogen_ppm"), Some(&Value::Number(12.0)));
        assert_eq!(ctx.get("soil.type"), Some(&Value::Text("loam".into())));
        assert_eq!(ctx.get("weather.frost"), Some(&Value::Bool(false)));
        assert_eq!(
            ctx.get("planting_date"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 4, 15).unwrap()))
        );
        assert!(!ctx.contains("sensor"));
    }

    #[test]
    fn from_json_rejects_lists_and_non_objects() {
        let err = Context::from_json(&json!({ "pests": ["aphid"] })).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert!(Context::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn parse_literal_precedence() {
        assert_eq!(Value::parse_literal("TRUE"), Value::Bool(true));
        assert_eq!(Value::parse_literal("30"), Value::Number(30.0));
        assert_eq!(Value::parse_literal("-2.5"), Value::Number(-2.5));
        assert_eq!(
            Value::parse_literal("2024-06-01"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        );
        assert_eq!(Value::parse_literal("sandy loam"), Value::Text("sandy loam".into()));
        assert_eq!(Value::parse_literal("NaN"), Value::Text("NaN".into()));
    }

    #[test]
    fn from_pairs_parses_cli_assignments() {
        let ctx = Context::from_pairs(["crop_type=cotton", "soil_moisture_%=30"]).unwrap();
        assert_eq!(ctx.get("soil_moisture_%"), Some(&Value::Number(30.0)));
        assert!(Context::from_pairs(["novalue"]).is_err());
        assert!(Context::from_pairs(["=3"]).is_err());
    }

    #[test]
    fn typed_accessors_distinguish_missing_from_malformed() {
        let ctx = Context::new().with("accumulated_gdd", "lots");
        assert!(matches!(
            ctx.require_number("accumulated_gdd"),
            Err(EngineError::ContextType { .. })
        ));
        assert!(matches!(
            ctx.require_number("planting_date"),
            Err(EngineError::MissingField(_))
        ));
        assert_eq!(ctx.optional_date("current_date").unwrap(), None);
    }

    #[test]
    fn extended_leaves_original_untouched() {
        let base = Context::new().with("a", 1);
        let derived = base.extended([("b", Value::Number(2.0))]);
        assert!(!base.contains("b"));
        assert_eq!(derived.len(), 2);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(30.0), "30");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(46.666), "46.67");
        assert_eq!(format_number(-0.001), "0");
    }

    #[test]
    fn deserializes_from_nested_json() {
        let ctx: Context =
            serde_json::from_str(r#"{"farm": {"hectares": 4}, "crop_type": "rice"}"#).unwrap();
        assert_eq!(ctx.get("farm.hectares"), Some(&Value::Number(4.0)));
    }
}
