//! Document structure extraction.
//!
//! Each supported format maps its native object model onto a common
//! [`DocumentStructure`]: metadata, headings, paragraphs and tables, plus a
//! format-specific [`FormatDetails`] block. The structure serializes to the
//! JSON that validation prompts embed.
//!
//! | Format | Extensions | Parser |
//! |--------|------------|--------|
//! | DOCX   | `.docx` | [`DocxParser`] |
//! | HTML   | `.html`, `.htm` | [`HtmlParser`] |
//! | LaTeX  | `.tex`, `.latex` | [`LatexParser`] |

mod docx;
mod html;
mod latex;
mod selector;

pub use docx::DocxParser;
pub use html::HtmlParser;
pub use latex::LatexParser;
pub use selector::{detect_format, parser_for, select_parser, supported_extensions};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while selecting a parser or extracting a document's structure.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported format: no parser for extension '{extension}' (supported: {supported})")]
    UnsupportedFormat { extension: String, supported: String },

    #[error("Unknown parser '{name}' (available: {available})")]
    UnknownParser { name: String, available: String },

    #[error("Failed to parse {format} file {}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        format: DocumentFormat,
        reason: String,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub(crate) fn corrupt(path: &Path, format: DocumentFormat, reason: impl fmt::Display) -> Self {
        ParseError::Corrupt {
            path: path.to_path_buf(),
            format,
            reason: reason.to_string(),
        }
    }
}

/// The document formats docval can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Docx,
    Html,
    Latex,
}

impl DocumentFormat {
    /// Every supported format, in selection order.
    pub const ALL: [DocumentFormat; 3] = [
        DocumentFormat::Docx,
        DocumentFormat::Html,
        DocumentFormat::Latex,
    ];

    /// Registry name, as accepted by `--parser`.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentFormat::Docx => "docx",
            DocumentFormat::Html => "html",
            DocumentFormat::Latex => "latex",
        }
    }

    /// File extensions (without the dot) handled by this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            DocumentFormat::Docx => &["docx"],
            DocumentFormat::Html => &["html", "htm"],
            DocumentFormat::Latex => &["tex", "latex"],
        }
    }

    /// Whether `extension` (with or without a leading dot) belongs to this format.
    pub fn matches_extension(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.');
        self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocumentFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(DocumentFormat::Docx),
            "html" | "htm" => Ok(DocumentFormat::Html),
            "latex" | "tex" => Ok(DocumentFormat::Latex),
            _ => Err(ParseError::UnknownParser {
                name: s.to_string(),
                available: DocumentFormat::ALL
                    .iter()
                    .map(|f| f.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// A parser for one document format.
///
/// Parsing is read-only: implementations open the source file for reading and
/// never write to it. A failed parse is never partially recovered.
pub trait DocumentParser: Send + Sync {
    /// The format this parser reads.
    fn format(&self) -> DocumentFormat;

    /// Whether this parser handles files with the given extension.
    fn supports_extension(&self, extension: &str) -> bool {
        self.format().matches_extension(extension)
    }

    /// Extract the structural description of the document at `path`.
    fn parse(&self, path: &Path) -> Result<DocumentStructure, ParseError>;
}

/// Normalized structural description of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentStructure {
    /// Path the document was read from
    pub file_path: String,

    /// Source format
    pub document_type: DocumentFormat,

    /// Title, author and friends; absent fields serialize as `null`
    pub metadata: Metadata,

    /// Headings in document order
    pub headings: Vec<Heading>,

    /// Body paragraphs in document order
    pub paragraphs: Vec<Paragraph>,

    /// Tables in document order
    pub tables: Vec<Table>,

    /// Fields only some formats carry
    pub details: FormatDetails,
}

impl DocumentStructure {
    /// Render the structure as pretty JSON for prompt embedding.
    pub fn to_prompt_json(&self) -> String {
        // Serializing plain data into a String cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// The document title, if one was found.
    pub fn title(&self) -> Option<&str> {
        self.metadata.title.as_deref()
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// A heading or sectioning command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heading {
    /// 0 for titles/chapters, 1 for top-level sections, and so on
    pub level: u8,

    pub text: String,

    /// Where the heading came from: an HTML tag, a DOCX style name or a LaTeX command
    pub kind: String,
}

/// A paragraph of body text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paragraph {
    pub text: String,

    /// Paragraph style name (DOCX only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Paragraph {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
        }
    }
}

/// A table, with cell text when the format exposes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub rows: usize,
    pub columns: usize,
    pub cells: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Table {
    /// Build a table from row-major cell text; `columns` is the widest row.
    pub fn from_cells(cells: Vec<Vec<String>>) -> Self {
        Self {
            rows: cells.len(),
            columns: cells.iter().map(Vec::len).max().unwrap_or(0),
            cells,
            caption: None,
            label: None,
        }
    }
}

/// Format-specific extraction results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FormatDetails {
    Docx(DocxDetails),
    Html(HtmlDetails),
    Latex(LatexDetails),
}

/// Extra DOCX structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocxDetails {
    /// Distinct paragraph style names, sorted
    pub styles: Vec<String>,
    pub sections: Vec<PageSection>,
    pub has_header: bool,
    pub has_footer: bool,
    /// Raw `word/document.xml`, for checks on fields, captions and cross-references
    pub xml_content: Option<String>,
}

/// Page geometry of one DOCX section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageSection {
    pub page_width_inches: Option<f64>,
    pub page_height_inches: Option<f64>,
    pub orientation: Option<String>,
}

/// Extra HTML structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HtmlDetails {
    pub lists: Vec<HtmlList>,
    pub has_title: bool,
    pub raw_content: String,
}

/// An HTML `ul` or `ol` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HtmlList {
    /// `"ul"` or `"ol"`
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<String>,
}

/// Extra LaTeX structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatexDetails {
    pub document_class: Option<String>,
    pub figures: Vec<Figure>,
    pub equations: Vec<Equation>,
    pub packages: Vec<String>,
    pub has_bibliography: bool,
    pub citation_count: usize,
    pub raw_content: String,
}

/// A LaTeX `figure` environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Figure {
    pub caption: String,
    pub label: String,
}

/// A LaTeX `equation` environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Equation {
    pub content: String,
    pub label: String,
}

/// Fail with [`ParseError::NotFound`] unless `path` is an existing file.
pub(crate) fn ensure_exists(path: &Path) -> Result<(), ParseError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ParseError::NotFound(path.to_path_buf()))
    }
}

/// Read a text file, replacing invalid UTF-8 sequences.
pub(crate) fn read_lossy(path: &Path) -> Result<String, ParseError> {
    ensure_exists(path)?;
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reject text sources containing NUL bytes: binary files under a text extension.
pub(crate) fn reject_binary(
    path: &Path,
    format: DocumentFormat,
    content: &str,
) -> Result<(), ParseError> {
    if content.contains('\0') {
        return Err(ParseError::corrupt(path, format, "file contains binary data"));
    }
    Ok(())
}

/// Treat empty or whitespace-only strings as missing.
pub(crate) fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
