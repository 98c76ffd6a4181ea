//! Parser selection by explicit hint or file extension.

use std::path::Path;

use super::{DocumentFormat, DocumentParser, DocxParser, HtmlParser, LatexParser, ParseError};

/// Every extension the registry knows, dotted, in registry order.
pub fn supported_extensions() -> Vec<String> {
    DocumentFormat::ALL
        .iter()
        .flat_map(|f| f.extensions().iter().map(|e| format!(".{}", e)))
        .collect()
}

/// Infer the format of `path` from its extension (case-insensitive).
pub fn detect_format(path: &Path) -> Result<DocumentFormat, ParseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    DocumentFormat::ALL
        .into_iter()
        .find(|f| f.matches_extension(extension))
        .ok_or_else(|| ParseError::UnsupportedFormat {
            extension: if extension.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", extension)
            },
            supported: supported_extensions().join(", "),
        })
}

/// The parser registered for `format`.
pub fn parser_for(format: DocumentFormat) -> Box<dyn DocumentParser> {
    match format {
        DocumentFormat::Docx => Box::new(DocxParser::new()),
        DocumentFormat::Html => Box::new(HtmlParser::new()),
        DocumentFormat::Latex => Box::new(LatexParser::new()),
    }
}

/// Choose a parser for `path`.
///
/// An explicit `hint` (a parser name such as `"html"`) always wins; otherwise
/// the format is inferred from the file extension.
pub fn select_parser(
    path: &Path,
    hint: Option<&str>,
) -> Result<Box<dyn DocumentParser>, ParseError> {
    let format = match hint {
        Some(name) => name.parse::<DocumentFormat>()?,
        None => detect_format(path)?,
    };

    tracing::debug!(
        path = %path.display(),
        parser = %format,
        explicit = hint.is_some(),
        "Selected document parser"
    );

    Ok(parser_for(format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_extension() {
        let cases = [
            ("report.docx", DocumentFormat::Docx),
            ("page.html", DocumentFormat::Html),
            ("page.HTM", DocumentFormat::Html),
            ("paper.tex", DocumentFormat::Latex),
            ("paper.latex", DocumentFormat::Latex),
        ];

        for (file, expected) in cases {
            let parser = select_parser(Path::new(file), None).unwrap();
            assert_eq!(parser.format(), expected, "wrong parser for {}", file);
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let result = select_parser(Path::new("file.xyz"), None);
        match result {
            Err(ParseError::UnsupportedFormat {
                extension,
                supported,
            }) => {
                assert_eq!(extension, ".xyz");
                assert!(supported.contains(".docx"));
                assert!(supported.contains(".tex"));
            }
            _ => panic!("Expected UnsupportedFormat error"),
        }
    }

    #[test]
    fn test_no_extension() {
        let err = detect_format(Path::new("README")).unwrap_err();
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_hint_overrides_extension() {
        let parser = select_parser(Path::new("notes.txt"), Some("html")).unwrap();
        assert_eq!(parser.format(), DocumentFormat::Html);

        let parser = select_parser(Path::new("report.docx"), Some("LaTeX")).unwrap();
        assert_eq!(parser.format(), DocumentFormat::Latex);
    }

    #[test]
    fn test_unknown_hint() {
        let result = select_parser(Path::new("report.docx"), Some("pdf"));
        assert!(matches!(result, Err(ParseError::UnknownParser { .. })));
    }

    #[test]
    fn test_supported_extensions_listing() {
        assert_eq!(
            supported_extensions(),
            vec![".docx", ".html", ".htm", ".tex", ".latex"]
        );
    }
}
