//! DOCX parser.
//!
//! A `.docx` file is a ZIP package of WordprocessingML parts. Three parts are
//! read: `word/document.xml` (body), `word/styles.xml` (style ids to display
//! names) and `docProps/core.xml` (title, author, dates). Only the body is
//! mandatory.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

use super::{
    ensure_exists, non_empty, DocumentFormat, DocumentParser, DocumentStructure, DocxDetails,
    FormatDetails, Heading, Metadata, PageSection, ParseError, Paragraph, Table,
};

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const CORE_PART: &str = "docProps/core.xml";

/// Page dimensions are stored in twentieths of a point.
const TWIPS_PER_INCH: f64 = 1440.0;

/// Parser for `.docx` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for DocxParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn parse(&self, path: &Path) -> Result<DocumentStructure, ParseError> {
        ensure_exists(path)?;
        let corrupt = |reason: String| ParseError::corrupt(path, DocumentFormat::Docx, reason);

        let file = File::open(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| corrupt(format!("not a ZIP package ({})", e)))?;

        let document_xml = read_part(&mut archive, DOCUMENT_PART)
            .map_err(&corrupt)?
            .ok_or_else(|| corrupt(format!("missing {}", DOCUMENT_PART)))?;

        let styles = match read_part(&mut archive, STYLES_PART).map_err(&corrupt)? {
            Some(xml) => parse_styles(&xml).map_err(&corrupt)?,
            None => StyleTable::default(),
        };

        let metadata = match read_part(&mut archive, CORE_PART).map_err(&corrupt)? {
            Some(xml) => parse_core_properties(&xml).map_err(&corrupt)?,
            None => Metadata::default(),
        };

        let body = parse_body(&document_xml, &styles).map_err(&corrupt)?;
        let structure = body.into_structure(path, metadata, document_xml);

        tracing::debug!(
            path = %path.display(),
            paragraphs = structure.paragraphs.len(),
            headings = structure.headings.len(),
            tables = structure.tables.len(),
            "Parsed DOCX document"
        );

        Ok(structure)
    }
}

/// Read a package part as (lossy) UTF-8, or `None` when the part is absent.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, String> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("cannot open {}: {}", name, e)),
    };

    let mut bytes = Vec::new();
    part.read_to_end(&mut bytes)
        .map_err(|e| format!("cannot read {}: {}", name, e))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Value of the attribute with the given local name (`w:val` matches `val`).
fn attr(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[derive(Debug, Default)]
struct StyleTable {
    names: HashMap<String, String>,
    default_paragraph: Option<String>,
}

impl StyleTable {
    /// Display name for a style id; unknown ids are reported as-is.
    fn resolve(&self, id: Option<&str>) -> Option<String> {
        match id {
            Some(id) => Some(self.names.get(id).cloned().unwrap_or_else(|| id.to_string())),
            None => self.default_paragraph.clone(),
        }
    }
}

fn parse_styles(xml: &str) -> Result<StyleTable, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut table = StyleTable::default();

    let mut current_id: Option<String> = None;
    let mut current_is_default_paragraph = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"style" => {
                    current_id = attr(e, b"styleId");
                    current_is_default_paragraph = attr(e, b"type").as_deref()
                        == Some("paragraph")
                        && matches!(attr(e, b"default").as_deref(), Some("1") | Some("true"));
                }
                b"name" => {
                    if let (Some(id), Some(name)) = (current_id.as_ref(), attr(e, b"val")) {
                        if current_is_default_paragraph {
                            table.default_paragraph = Some(name.clone());
                        }
                        table.names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"style" => {
                current_id = None;
                current_is_default_paragraph = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed {}: {}", STYLES_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(table)
}

fn parse_core_properties(xml: &str) -> Result<Metadata, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut metadata = Metadata::default();
    let mut current: Option<Vec<u8>> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                current = Some(e.local_name().as_ref().to_vec());
                text.clear();
            }
            Ok(Event::Text(ref e)) if current.is_some() => {
                text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(_)) => {
                if let Some(field) = current.take() {
                    let value = non_empty(text.as_str());
                    match field.as_slice() {
                        b"title" => metadata.title = value,
                        b"creator" => metadata.author = value,
                        b"subject" => metadata.subject = value,
                        b"description" => metadata.description = value,
                        b"created" => metadata.created = value,
                        b"modified" => metadata.modified = value,
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed {}: {}", CORE_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(metadata)
}

/// A `w:p` still being read. Text boxes nest paragraphs inside paragraphs.
#[derive(Debug, Default)]
struct OpenParagraph {
    text: String,
    style_id: Option<String>,
}

#[derive(Debug, Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

#[derive(Debug, Default)]
struct Body {
    paragraphs: Vec<Paragraph>,
    headings: Vec<Heading>,
    tables: Vec<Table>,
    styles: BTreeSet<String>,
    sections: Vec<PageSection>,
    has_header: bool,
    has_footer: bool,
}

impl Body {
    fn into_structure(self, path: &Path, metadata: Metadata, xml: String) -> DocumentStructure {
        DocumentStructure {
            file_path: path.display().to_string(),
            document_type: DocumentFormat::Docx,
            metadata,
            headings: self.headings,
            paragraphs: self.paragraphs,
            tables: self.tables,
            details: FormatDetails::Docx(DocxDetails {
                styles: self.styles.into_iter().collect(),
                sections: self.sections,
                has_header: self.has_header,
                has_footer: self.has_footer,
                xml_content: Some(xml),
            }),
        }
    }
}

/// Heading level implied by a paragraph style name.
fn heading_level(style: &str) -> Option<u8> {
    let lower = style.trim().to_ascii_lowercase();
    if lower == "title" {
        return Some(0);
    }
    lower
        .strip_prefix("heading")
        .and_then(|rest| rest.trim().parse::<u8>().ok())
}

fn parse_body(xml: &str, styles: &StyleTable) -> Result<Body, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut body = Body::default();

    let mut tables: Vec<TableBuilder> = Vec::new();
    let mut section: Option<PageSection> = None;
    let mut paragraphs: Vec<OpenParagraph> = Vec::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("malformed {}: {}", DOCUMENT_PART, e))?;

        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(OpenParagraph::default()),
                b"t" if !paragraphs.is_empty() => in_text = true,
                b"tbl" => tables.push(TableBuilder::default()),
                b"tr" => {
                    if let Some(table) = tables.last_mut() {
                        table.row.clear();
                    }
                }
                b"tc" => {
                    if let Some(table) = tables.last_mut() {
                        table.cell.clear();
                    }
                }
                b"sectPr" => section = Some(PageSection::default()),
                _ => on_property(e, paragraphs.last_mut(), &mut section, &mut body),
            },
            Event::Empty(ref e) => match (e.local_name().as_ref(), paragraphs.last_mut()) {
                (b"tab", Some(open)) => open.text.push('\t'),
                (b"br" | b"cr", Some(open)) => open.text.push('\n'),
                // A self-closing paragraph is an empty one.
                (b"p", _) => {
                    let style = styles.resolve(None);
                    finish_paragraph(String::new(), style, &mut tables, &mut body);
                }
                (b"sectPr", _) => body.sections.push(PageSection::default()),
                (_, open) => on_property(e, open, &mut section, &mut body),
            },
            Event::Text(ref e) if in_text => {
                if let Some(open) = paragraphs.last_mut() {
                    open.text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(done) = paragraphs.pop() {
                        let style = styles.resolve(done.style_id.as_deref());
                        finish_paragraph(done.text, style, &mut tables, &mut body);
                    }
                }
                b"tc" => {
                    if let Some(table) = tables.last_mut() {
                        let cell = std::mem::take(&mut table.cell);
                        table.row.push(cell);
                    }
                }
                b"tr" => {
                    if let Some(table) = tables.last_mut() {
                        let row = std::mem::take(&mut table.row);
                        table.rows.push(row);
                    }
                }
                b"tbl" => {
                    // Nested tables stay inside their parent cell's text.
                    if let Some(table) = tables.pop() {
                        if tables.is_empty() {
                            body.tables.push(Table::from_cells(table.rows));
                        }
                    }
                }
                b"sectPr" => {
                    if let Some(done) = section.take() {
                        body.sections.push(done);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(body)
}

/// Property elements, which carry everything in attributes and may or may not
/// be written self-closing.
fn on_property(
    e: &BytesStart<'_>,
    paragraph: Option<&mut OpenParagraph>,
    section: &mut Option<PageSection>,
    body: &mut Body,
) {
    match e.local_name().as_ref() {
        b"pStyle" => {
            if let Some(paragraph) = paragraph {
                paragraph.style_id = attr(e, b"val");
            }
        }
        b"pgSz" => {
            if let Some(section) = section.as_mut() {
                let inches = |name: &[u8]| {
                    attr(e, name)
                        .and_then(|v| v.parse::<f64>().ok())
                        .map(|twips| twips / TWIPS_PER_INCH)
                };
                section.page_width_inches = inches(b"w");
                section.page_height_inches = inches(b"h");
                section.orientation = Some(attr(e, b"orient").unwrap_or_else(|| {
                    match (section.page_width_inches, section.page_height_inches) {
                        (Some(w), Some(h)) if w > h => "landscape".to_string(),
                        _ => "portrait".to_string(),
                    }
                }));
            }
        }
        b"headerReference" => body.has_header = true,
        b"footerReference" => body.has_footer = true,
        _ => {}
    }
}

fn finish_paragraph(
    text: String,
    style: Option<String>,
    tables: &mut [TableBuilder],
    body: &mut Body,
) {
    if let Some(table) = tables.last_mut() {
        if !table.cell.is_empty() && !text.is_empty() {
            table.cell.push('\n');
        }
        table.cell.push_str(&text);
        return;
    }

    if let Some(style) = style.as_deref() {
        body.styles.insert(style.to_string());
        if let Some(level) = heading_level(style) {
            if !text.trim().is_empty() {
                body.headings.push(Heading {
                    level,
                    text: text.trim().to_string(),
                    kind: style.to_string(),
                });
            }
        }
    }

    body.paragraphs.push(Paragraph { text, style });
}
