//! Loading and writing specification files.

use std::fs;
use std::path::Path;

use super::schema::validate_spec_file_schema;
use super::{validate_specs, SpecError, ValidationSpec};

/// Load specifications from a JSON or YAML file.
///
/// `.yaml` / `.yml` files are read as YAML; anything else as JSON.
pub fn load_spec_file(path: impl AsRef<Path>) -> Result<Vec<ValidationSpec>, SpecError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let specs = if is_yaml {
        from_yaml_str(&contents)?
    } else {
        from_json_str(&contents)?
    };

    tracing::debug!(path = %path.display(), count = specs.len(), "Loaded specification file");
    Ok(specs)
}

/// Parse a JSON array of specifications.
pub fn from_json_str(json: &str) -> Result<Vec<ValidationSpec>, SpecError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    from_value(value)
}

/// Parse a YAML sequence of specifications.
pub fn from_yaml_str(yaml: &str) -> Result<Vec<ValidationSpec>, SpecError> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)?;
    from_value(value)
}

fn from_value(value: serde_json::Value) -> Result<Vec<ValidationSpec>, SpecError> {
    validate_spec_file_schema(&value).map_err(SpecError::Schema)?;
    let specs: Vec<ValidationSpec> = serde_json::from_value(value)?;
    validate_specs(&specs)?;
    Ok(specs)
}

/// Write specifications as a pretty-printed JSON array.
pub fn write_spec_file(path: impl AsRef<Path>, specs: &[ValidationSpec]) -> Result<(), SpecError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(specs)?;
    fs::write(path, json + "\n").map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })
}
