//! HTML parser.
//!
//! Uses `scraper` (html5ever), which recovers from malformed markup the way
//! browsers do, so an HTML document only fails to parse when it cannot be read.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;

use super::{
    non_empty, read_lossy, reject_binary, DocumentFormat, DocumentParser, DocumentStructure,
    FormatDetails, Heading, HtmlDetails, HtmlList, Metadata, ParseError, Paragraph, Table,
};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref META_AUTHOR: Selector = Selector::parse(r#"meta[name="author"]"#).unwrap();
    static ref META_DESCRIPTION: Selector =
        Selector::parse(r#"meta[name="description"]"#).unwrap();
    static ref HEADINGS: Selector = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    static ref PARAGRAPHS: Selector = Selector::parse("p").unwrap();
    static ref TABLES: Selector = Selector::parse("table").unwrap();
    static ref ROWS: Selector = Selector::parse("tr").unwrap();
    static ref CELLS: Selector = Selector::parse("td, th").unwrap();
    static ref LISTS: Selector = Selector::parse("ul, ol").unwrap();
    static ref ITEMS: Selector = Selector::parse("li").unwrap();
}

/// Parser for `.html` / `.htm` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract structure from HTML source already in memory.
    pub fn parse_str(&self, file_path: &str, content: &str) -> DocumentStructure {
        let document = Html::parse_document(content);

        let metadata = Metadata {
            title: document.select(&TITLE).next().and_then(|t| non_empty(text_of(&t))),
            author: meta_content(&document, &META_AUTHOR),
            description: meta_content(&document, &META_DESCRIPTION),
            ..Default::default()
        };

        let headings = document
            .select(&HEADINGS)
            .map(|h| {
                let tag = h.value().name().to_string();
                Heading {
                    level: tag[1..].parse().unwrap_or(1),
                    text: text_of(&h),
                    kind: tag,
                }
            })
            .collect();

        let paragraphs = document
            .select(&PARAGRAPHS)
            .map(|p| text_of(&p))
            .filter(|t| !t.is_empty())
            .map(Paragraph::text)
            .collect();

        let tables = document
            .select(&TABLES)
            .map(|table| {
                let cells = table
                    .select(&ROWS)
                    .map(|row| row.select(&CELLS).map(|c| text_of(&c)).collect())
                    .collect();
                Table::from_cells(cells)
            })
            .collect();

        let lists = document
            .select(&LISTS)
            .map(|list| HtmlList {
                kind: list.value().name().to_string(),
                items: list.select(&ITEMS).map(|li| text_of(&li)).collect(),
            })
            .collect();

        let has_title = metadata.title.is_some();

        DocumentStructure {
            file_path: file_path.to_string(),
            document_type: DocumentFormat::Html,
            metadata,
            headings,
            paragraphs,
            tables,
            details: FormatDetails::Html(HtmlDetails {
                lists,
                has_title,
                raw_content: content.to_string(),
            }),
        }
    }
}

impl DocumentParser for HtmlParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Html
    }

    fn parse(&self, path: &Path) -> Result<DocumentStructure, ParseError> {
        let content = read_lossy(path)?;
        reject_binary(path, DocumentFormat::Html, &content)?;
        let structure = self.parse_str(&path.display().to_string(), &content);

        tracing::debug!(
            path = %path.display(),
            headings = structure.headings.len(),
            tables = structure.tables.len(),
            "Parsed HTML document"
        );

        Ok(structure)
    }
}

/// Element text with whitespace runs collapsed.
fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|m| m.value().attr("content"))
        .and_then(non_empty)
}
