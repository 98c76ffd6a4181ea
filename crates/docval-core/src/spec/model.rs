//! The validation specification model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::SpecError;

/// Weight given to a specification that does not declare one.
pub const DEFAULT_WEIGHT: f64 = 1.0;

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

/// A single natural-language requirement a document is checked against.
///
/// Fields are private: a spec is immutable once built. On disk the weight is
/// called `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSpec {
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(rename = "score", default = "default_weight")]
    weight: f64,
}

impl ValidationSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: None,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Parse a `NAME:DESCRIPTION` requirement given on the command line.
    ///
    /// Splits at the first colon and trims both halves.
    pub fn from_inline(raw: &str) -> Result<Self, SpecError> {
        let (name, description) = raw
            .split_once(':')
            .ok_or_else(|| SpecError::InvalidInline(raw.to_string()))?;

        let (name, description) = (name.trim(), description.trim());
        if name.is_empty() || description.is_empty() {
            return Err(SpecError::InvalidInline(raw.to_string()));
        }

        Ok(Self::new(name, description))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Weight in the weighted score.
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// Check a run's specifications before any of them is sent to a backend.
///
/// Names and descriptions must be non-blank, weights finite and non-negative,
/// and names unique.
pub fn validate_specs(specs: &[ValidationSpec]) -> Result<(), SpecError> {
    let mut seen = HashSet::new();

    for (index, spec) in specs.iter().enumerate() {
        if spec.name.trim().is_empty() {
            return Err(SpecError::MissingField {
                index,
                field: "name",
            });
        }

        if spec.description.trim().is_empty() {
            return Err(SpecError::MissingField {
                index,
                field: "description",
            });
        }

        if !spec.weight.is_finite() || spec.weight < 0.0 {
            return Err(SpecError::InvalidWeight {
                name: spec.name.clone(),
                weight: spec.weight,
            });
        }

        if !seen.insert(spec.name.as_str()) {
            return Err(SpecError::DuplicateName(spec.name.clone()));
        }
    }

    Ok(())
}

/// The sample specifications written by `docval init-spec`.
pub fn template_specs() -> Vec<ValidationSpec> {
    vec![
        ValidationSpec::new("Has Title", "Document must contain a title in the metadata")
            .with_category("metadata")
            .with_weight(2.0),
        ValidationSpec::new(
            "Has Author",
            "Document must have an author specified in metadata",
        )
        .with_category("metadata")
        .with_weight(1.0),
        ValidationSpec::new(
            "Has Headings",
            "Document must use heading styles (Heading 1, Heading 2, etc.)",
        )
        .with_category("structure")
        .with_weight(1.5),
        ValidationSpec::new(
            "Has Table of Contents",
            "Document should include a table of contents",
        )
        .with_category("structure")
        .with_weight(0.5),
    ]
}
