//! Report assembly: aggregates per-spec results into a validation report.
//!
//! Aggregation is pure arithmetic over the results:
//! - `score` is `passed / total`, or 0 when there are no results
//! - `weighted_score` is `achieved / available` over spec weights, or 0 when
//!   no weight is available
//!
//! Only the base counting fields are required when a report is read back, so
//! reports from older runs still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::spec::{ValidationSpec, DEFAULT_WEIGHT};
use crate::verdict::{Verdict, VerdictError};

/// Errors from writing or reading a report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to access report file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of checking one specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub spec_name: String,
    pub passed: bool,
    /// Within `[0.0, 1.0]`
    pub confidence: f64,
    pub reasoning: String,
}

impl ValidationResult {
    pub fn from_verdict(spec_name: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            spec_name: spec_name.into(),
            passed: verdict.passed,
            confidence: verdict.confidence,
            reasoning: verdict.reasoning,
        }
    }

    /// A failed result recording a response that could not be parsed.
    pub fn unparseable(spec_name: impl Into<String>, error: &VerdictError, raw: &str) -> Self {
        Self {
            spec_name: spec_name.into(),
            passed: false,
            confidence: 0.0,
            reasoning: format!("Could not parse backend response: {}\n\n{}", error, raw.trim()),
        }
    }
}

/// Token usage attached to a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUsage {
    pub requests: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
}

impl ReportUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The outcome of validating one document against a list of specifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub file_path: String,

    /// One result per specification, in specification order
    pub results: Vec<ValidationResult>,

    pub total_specs: usize,
    pub passed_count: usize,
    pub failed_count: usize,

    /// `passed_count / total_specs`
    pub score: f64,

    /// Sum of all spec weights
    #[serde(default)]
    pub total_score_available: f64,

    /// Sum of the weights of passed specs
    #[serde(default)]
    pub achieved_score: f64,

    #[serde(default)]
    pub weighted_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ReportUsage>,
}

impl ValidationReport {
    /// Aggregate `results` (in spec order) into a report.
    ///
    /// Weights are looked up by spec name; a result whose spec is not in
    /// `specs` counts with the default weight.
    pub fn assemble(
        file_path: impl Into<String>,
        specs: &[ValidationSpec],
        results: Vec<ValidationResult>,
    ) -> Self {
        let weights: HashMap<&str, f64> = specs.iter().map(|s| (s.name(), s.weight())).collect();
        let weight_of = |r: &ValidationResult| {
            weights
                .get(r.spec_name.as_str())
                .copied()
                .unwrap_or(DEFAULT_WEIGHT)
        };

        let total_specs = results.len();
        let passed_count = results.iter().filter(|r| r.passed).count();
        let total_score_available: f64 = results.iter().map(weight_of).sum();
        let achieved_score: f64 = results.iter().filter(|r| r.passed).map(weight_of).sum();

        Self {
            file_path: file_path.into(),
            total_specs,
            passed_count,
            failed_count: total_specs - passed_count,
            score: ratio(passed_count as f64, total_specs as f64),
            total_score_available,
            achieved_score,
            weighted_score: ratio(achieved_score, total_score_available),
            backend: None,
            model: None,
            validated_at: Some(Utc::now()),
            usage: None,
            results,
        }
    }

    /// Record which backend and model produced the verdicts.
    pub fn with_backend(mut self, backend: impl Into<String>, model: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: ReportUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// True when every specification passed (vacuously true for none).
    pub fn all_passed(&self) -> bool {
        self.failed_count == 0
    }

    pub fn failed(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn to_json_string(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let json = self.to_json_string()?;
        fs::write(path, json + "\n").map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn result(name: &str, passed: bool) -> ValidationResult {
        ValidationResult {
            spec_name: name.to_string(),
            passed,
            confidence: 0.9,
            reasoning: "because".to_string(),
        }
    }

    #[test]
    fn test_counts_and_score() {
        let specs = vec![
            ValidationSpec::new("a", "x"),
            ValidationSpec::new("b", "x"),
            ValidationSpec::new("c", "x"),
        ];
        let report = ValidationReport::assemble(
            "doc.docx",
            &specs,
            vec![result("a", true), result("b", false), result("c", true)],
        );

        assert_eq!(report.total_specs, 3);
        assert_eq!(report.passed_count, 2);
        assert_eq!(report.failed_count, 1);
        assert!((report.score - 2.0 / 3.0).abs() < 1e-12);
        assert!(!report.all_passed());
        assert_eq!(report.failed().next().unwrap().spec_name, "b");
    }

    #[test]
    fn test_empty_report_scores_zero() {
        let report = ValidationReport::assemble("doc.html", &[], vec![]);
        assert_eq!(report.total_specs, 0);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.weighted_score, 0.0);
        assert!(report.all_passed());
    }

    #[test]
    fn test_weighted_score() {
        let specs = vec![
            ValidationSpec::new("title", "x").with_weight(2.0),
            ValidationSpec::new("author", "x").with_weight(1.0),
            ValidationSpec::new("toc", "x").with_weight(0.5),
        ];
        let report = ValidationReport::assemble(
            "doc.docx",
            &specs,
            vec![result("title", true), result("author", false), result("toc", true)],
        );

        assert_eq!(report.total_score_available, 3.5);
        assert_eq!(report.achieved_score, 2.5);
        assert!((report.weighted_score - 2.5 / 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights_score_zero() {
        let specs = vec![ValidationSpec::new("a", "x").with_weight(0.0)];
        let report = ValidationReport::assemble("d", &specs, vec![result("a", true)]);
        assert_eq!(report.score, 1.0);
        assert_eq!(report.weighted_score, 0.0);
    }

    #[test]
    fn test_unparseable_result() {
        let r = ValidationResult::unparseable(
            "Has Title",
            &VerdictError::MissingResult,
            "  I am not sure.  ",
        );
        assert!(!r.passed);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(
            r.reasoning,
            "Could not parse backend response: no Result line found\n\nI am not sure."
        );
    }

    #[test]
    fn test_json_round_trip() {
        let specs = vec![ValidationSpec::new("a", "x")];
        let report = ValidationReport::assemble("doc.tex", &specs, vec![result("a", true)])
            .with_backend("openai", "gpt-4o-mini")
            .with_usage(ReportUsage {
                requests: 1,
                prompt_tokens: 100,
                completion_tokens: 20,
                ..Default::default()
            });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let loaded = ValidationReport::read_json(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.usage.unwrap().total_tokens(), 120);
    }

    #[test]
    fn test_reads_report_with_base_fields_only() {
        let json = r#"{
            "file_path": "doc.docx",
            "results": [
                {"spec_name": "a", "passed": true, "confidence": 0.9, "reasoning": "ok"}
            ],
            "total_specs": 1,
            "passed_count": 1,
            "failed_count": 0,
            "score": 1.0
        }"#;
        let report = ValidationReport::from_json_str(json).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.backend, None);
        assert_eq!(report.validated_at, None);
    }

    #[test]
    fn test_read_missing_file() {
        let err = ValidationReport::read_json("/nonexistent/report.json").unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }

    proptest! {
        #[test]
        fn prop_counts_add_up(outcomes in proptest::collection::vec(any::<bool>(), 0..50)) {
            let results: Vec<_> = outcomes
                .iter()
                .enumerate()
                .map(|(i, passed)| result(&format!("spec-{}", i), *passed))
                .collect();
            let report = ValidationReport::assemble("doc", &[], results);

            prop_assert_eq!(report.passed_count + report.failed_count, report.total_specs);
            prop_assert!((0.0..=1.0).contains(&report.score));
            prop_assert_eq!(report.score, report.weighted_score);
        }

        #[test]
        fn prop_weighted_score_in_unit_interval(
            entries in proptest::collection::vec((0.0f64..100.0, any::<bool>()), 1..30)
        ) {
            let specs: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (w, _))| ValidationSpec::new(format!("s{}", i), "d").with_weight(*w))
                .collect();
            let results = entries
                .iter()
                .enumerate()
                .map(|(i, (_, passed))| result(&format!("s{}", i), *passed))
                .collect();
            let report = ValidationReport::assemble("doc", &specs, results);

            prop_assert!(report.weighted_score >= 0.0);
            prop_assert!(report.weighted_score <= 1.0 + 1e-12);
            prop_assert!(report.achieved_score <= report.total_score_available + 1e-9);
        }

        #[test]
        fn prop_json_round_trip_is_exact(
            entries in proptest::collection::vec((0.0f64..=1.0, 0.0f64..50.0, any::<bool>()), 1..20)
        ) {
            let specs: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (_, w, _))| ValidationSpec::new(format!("s{}", i), "d").with_weight(*w))
                .collect();
            let results = entries
                .iter()
                .enumerate()
                .map(|(i, (confidence, _, passed))| ValidationResult {
                    spec_name: format!("s{}", i),
                    passed: *passed,
                    confidence: *confidence,
                    reasoning: "r".to_string(),
                })
                .collect();
            let report = ValidationReport::assemble("doc.tex", &specs, results);

            let json = report.to_json_string().unwrap();
            let loaded = ValidationReport::from_json_str(&json).unwrap();
            for (a, b) in loaded.results.iter().zip(&report.results) {
                prop_assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
            }
            prop_assert_eq!(loaded.weighted_score.to_bits(), report.weighted_score.to_bits());
            prop_assert_eq!(loaded.score.to_bits(), report.score.to_bits());
            prop_assert_eq!(loaded, report);
        }
    }
}
