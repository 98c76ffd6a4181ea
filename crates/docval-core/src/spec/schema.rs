//! JSON Schema validation for specification files.
//!
//! Spec files are checked against `schema/spec-file.schema.json` before they
//! are deserialized, so authors see every problem at once, each with its
//! location in the file.

use std::sync::OnceLock;

/// Embedded spec-file schema (loaded at compile time).
const SPEC_FILE_SCHEMA_JSON: &str = include_str!("../../schema/spec-file.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(SPEC_FILE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a parsed spec file against the schema.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_spec_file_schema(value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_file_passes() {
        let value = json!([
            { "name": "Has Title", "description": "Needs a title", "category": "metadata", "score": 2.0 },
            { "name": "Short", "description": "Under ten pages" }
        ]);
        assert!(validate_spec_file_schema(&value).is_ok());
    }

    #[test]
    fn test_empty_array_passes() {
        assert!(validate_spec_file_schema(&json!([])).is_ok());
    }

    #[test]
    fn test_top_level_object_fails() {
        let value = json!({ "name": "A", "description": "B" });
        assert!(validate_spec_file_schema(&value).is_err());
    }

    #[test]
    fn test_reports_every_violation_with_path() {
        let value = json!([
            { "name": "A" },
            { "name": "B", "description": "ok", "score": -1 },
            { "name": "C", "description": "ok", "unknown": true }
        ]);
        let errors = validate_spec_file_schema(&value).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].ends_with("at /0"));
        assert!(errors[1].contains("/1/score"));
        assert!(errors[2].ends_with("at /2"));
    }

    #[test]
    fn test_blank_name_fails() {
        let value = json!([{ "name": "   ", "description": "x" }]);
        assert!(validate_spec_file_schema(&value).is_err());
    }
}
