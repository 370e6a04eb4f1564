//! `{field}` placeholder handling for rule reasoning strings.

use crate::models::{Context, Value};
use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}\s]+)\}").expect("placeholder pattern is valid"));

/// Rendered in place of a field the context does not carry.
pub const MISSING_VALUE: &str = "unknown";

/// Check a template at load time: non-empty, and every brace belongs to a
/// well-formed `{field}` placeholder.
pub fn validate(template: &str) -> Result<(), String> {
    if template.trim().is_empty() {
        return Err("reasoning template is empty".into());
    }
    let stripped = PLACEHOLDER.replace_all(template, "");
    if stripped.contains('{') || stripped.contains('}') {
        return Err(format!(
            "reasoning template has unbalanced or empty braces: {:?}",
            template
        ));
    }
    Ok(())
}

pub fn render(template: &str, ctx: &Context) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            ctx.get(&caps[1])
                .map(Value::display)
                .unwrap_or_else(|| MISSING_VALUE.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_context_values() {
        let ctx = Context::new()
            .with("soil_moisture_%", 30.0)
            .with("crop_type", "cotton");
        assert_eq!(
            render("{crop_type} at {soil_moisture_%}% moisture", &ctx),
            "cotton at 30% moisture"
        );
    }

    #[test]
    fn missing_fields_render_as_unknown() {
        assert_eq!(
            render("rainfall {rainfall_mm_7d} mm", &Context::new()),
            "rainfall unknown mm"
        );
    }

    #[test]
    fn validate_catches_malformed_braces() {
        assert!(validate("Moisture {soil.moisture} is low").is_ok());
        assert!(validate("No placeholders at all").is_ok());
        assert!(validate("Broken {soil.moisture").is_err());
        assert!(validate("Empty {} braces").is_err());
        assert!(validate("Nested {{x}}").is_err());
        assert!(validate("   ").is_err());
    }
}
