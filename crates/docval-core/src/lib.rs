//! # docval-core
//!
//! Deterministic building blocks of document validation.
//!
//! This crate answers everything about a validation run that does not need a
//! language model:
//! - What does the document look like? ([`document`])
//! - What must it satisfy? ([`spec`])
//! - What did the backend say? ([`verdict`])
//! - How did the document do overall? ([`report`])
//!
//! ## Key Guarantees
//!
//! 1. **No network**: nothing here talks to an LLM
//! 2. **Read-only**: parsers never modify the documents they read
//! 3. **Typed failures**: unsupported, missing and corrupt files are distinct errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use docval_core::{select_parser, load_spec_file, parse_verdict};
//!
//! let parser = select_parser(Path::new("report.docx"), None)?;
//! let structure = parser.parse(Path::new("report.docx"))?;
//! let specs = load_spec_file("specs.json")?;
//!
//! let verdict = parse_verdict("Result: PASS\nConfidence: 0.9\nReasoning: ok")?;
//! assert!(verdict.passed);
//! ```

pub mod document;
pub mod report;
pub mod spec;
pub mod verdict;

// Re-export main types at crate root
pub use document::{
    detect_format, parser_for, select_parser, supported_extensions, DocumentFormat,
    DocumentParser, DocumentStructure, DocxParser, FormatDetails, Heading, HtmlParser,
    LatexParser, Metadata, ParseError, Paragraph, Table,
};
pub use report::{ReportError, ReportUsage, ValidationReport, ValidationResult};
pub use spec::{
    load_spec_file, template_specs, validate_specs, write_spec_file, SpecError, ValidationSpec,
};
pub use verdict::{parse_verdict, Verdict, VerdictError, DEFAULT_CONFIDENCE};
