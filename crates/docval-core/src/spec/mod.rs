//! Validation specifications.
//!
//! A specification is a named, natural-language requirement. Specs come from
//! JSON or YAML files (checked against an embedded JSON Schema) or from
//! `NAME:DESCRIPTION` strings on the command line.

mod loader;
mod model;
mod schema;

pub use loader::{from_json_str, from_yaml_str, load_spec_file, write_spec_file};
pub use model::{template_specs, validate_specs, ValidationSpec, DEFAULT_WEIGHT};
pub use schema::validate_spec_file_schema;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or checking specifications.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to access specification file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Specification file does not match schema:\n  {}", .0.join("\n  "))]
    Schema(Vec<String>),

    #[error("Specification #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Specification '{name}' has invalid score {weight}: must be a finite number >= 0")]
    InvalidWeight { name: String, weight: f64 },

    #[error("Duplicate specification name: {0}")]
    DuplicateName(String),

    #[error("Invalid inline requirement '{0}': expected NAME:DESCRIPTION")]
    InvalidInline(String),
}
