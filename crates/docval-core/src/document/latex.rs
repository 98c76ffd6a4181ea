//! LaTeX parser.
//!
//! LaTeX has no object model short of running TeX, so extraction is pattern
//! based: sectioning commands, the figure/table/equation environments, package
//! and citation commands. Command arguments are read with brace matching so
//! nested markup such as `\section{The \emph{Big} Picture}` survives.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use super::{
    non_empty, read_lossy, reject_binary, DocumentFormat, DocumentParser, DocumentStructure,
    Equation, Figure, FormatDetails, Heading, LatexDetails, Metadata, ParseError, Paragraph,
    Table,
};

lazy_static! {
    static ref COMMENT: Regex = Regex::new(r"(?m)(^|[^\\])%.*$").unwrap();
    static ref DOCUMENT_CLASS: Regex =
        Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}").unwrap();
    static ref DOCUMENT_BODY: Regex =
        Regex::new(r"(?s)\\begin\{document\}(.*?)(?:\\end\{document\}|\z)").unwrap();
    static ref TITLE: Regex = Regex::new(r"\\title\s*(?:\[[^\]]*\])?\s*\{").unwrap();
    static ref AUTHOR: Regex = Regex::new(r"\\author\s*(?:\[[^\]]*\])?\s*\{").unwrap();
    static ref DATE: Regex = Regex::new(r"\\date\s*\{").unwrap();
    static ref AND: Regex = Regex::new(r"\s*\\and\b\s*").unwrap();
    static ref HEADING: Regex =
        Regex::new(r"\\(chapter|section|subsection|subsubsection)\*?\s*(?:\[[^\]]*\])?\s*\{")
            .unwrap();
    static ref FIGURE: Regex =
        Regex::new(r"(?s)\\begin\{figure\*?\}(.*?)\\end\{figure\*?\}").unwrap();
    static ref TABLE: Regex = Regex::new(r"(?s)\\begin\{table\*?\}(.*?)\\end\{table\*?\}").unwrap();
    static ref EQUATION: Regex =
        Regex::new(r"(?s)\\begin\{equation\*?\}(.*?)\\end\{equation\*?\}").unwrap();
    static ref CAPTION: Regex = Regex::new(r"\\caption\s*(?:\[[^\]]*\])?\s*\{").unwrap();
    static ref LABEL: Regex = Regex::new(r"\\label\s*\{([^}]*)\}").unwrap();
    static ref TABULAR: Regex = Regex::new(r"\\begin\{tabular\}\s*(?:\[[^\]]*\])?\s*\{").unwrap();
    static ref TABULAR_END: Regex = Regex::new(r"\\end\{tabular\}").unwrap();
    static ref TABLE_RULE: Regex = Regex::new(
        r"\\(?:hline|toprule|midrule|bottomrule|cline\s*\{[^}]*\}|cmidrule(?:\([^)]*\))?\s*\{[^}]*\})"
    )
    .unwrap();
    static ref PACKAGE: Regex =
        Regex::new(r"\\usepackage\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}").unwrap();
    static ref BIBLIOGRAPHY: Regex =
        Regex::new(r"\\bibliography\s*\{|\\begin\{thebibliography\}|\\printbibliography")
            .unwrap();
    static ref CITATION: Regex = Regex::new(
        r"\\(?:cite|citep|citet|parencite|textcite|autocite)\*?\s*(?:\[[^\]]*\]\s*)*\{[^}]*\}"
    )
    .unwrap();
    static ref BLOCK: Regex = Regex::new(
        r"(?s)\\begin\{(?:figure|table|equation|align|tabular|thebibliography)\*?\}.*?\\end\{(?:figure|table|equation|align|tabular|thebibliography)\*?\}"
    )
    .unwrap();
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n\s*\n").unwrap();
    static ref WRAPPING_GROUP: Regex = Regex::new(r"\{[^{}]*\}").unwrap();

    // Cleaner passes, applied in order.
    static ref DROPPED: Regex = Regex::new(
        r"~?\\(?:label|begin|end|ref|eqref|cite\w*|includegraphics|bibliography\w*|usepackage|documentclass)\*?\s*(?:\[[^\]]*\])?\s*\{[^}]*\}"
    )
    .unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"\\\\(?:\[[^\]]*\])?").unwrap();
    static ref WRAPPING_COMMAND: Regex =
        Regex::new(r"\\[a-zA-Z]+\*?(?:\[[^\]]*\])?\{([^{}]*)\}").unwrap();
    static ref BARE_COMMAND: Regex = Regex::new(r"\\[a-zA-Z]+\*?").unwrap();
    static ref ESCAPED: Regex = Regex::new(r"\\([&%$#_])").unwrap();
}

/// Parser for `.tex` / `.latex` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatexParser;

impl LatexParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract structure from LaTeX source already in memory.
    ///
    /// Fails only on an unterminated `document` environment.
    pub fn parse_str(&self, file_path: &str, content: &str) -> Result<DocumentStructure, String> {
        let source = COMMENT.replace_all(content, "${1}");

        if source.contains(r"\begin{document}") && !source.contains(r"\end{document}") {
            return Err("unterminated document environment".to_string());
        }

        let author = command_arg(&source, &AUTHOR)
            .map(|a| AND.replace_all(&a, ", ").into_owned())
            .and_then(|a| non_empty(clean_latex(&a)));

        let metadata = Metadata {
            title: command_arg(&source, &TITLE).and_then(|t| non_empty(clean_latex(&t))),
            author,
            date: command_arg(&source, &DATE).and_then(|d| non_empty(clean_latex(&d))),
            ..Default::default()
        };

        let headings = HEADING
            .captures_iter(&source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let command = caps.get(1)?.as_str();
                let (text, _) = braced_group(&source, whole.end() - 1)?;
                Some(Heading {
                    level: heading_level(command),
                    text: clean_latex(text),
                    kind: command.to_string(),
                })
            })
            .collect();

        let figures = FIGURE
            .captures_iter(&source)
            .filter_map(|caps| caps.get(1))
            .map(|body| Figure {
                caption: caption_of(body.as_str()).unwrap_or_default(),
                label: label_of(body.as_str()).unwrap_or_default(),
            })
            .collect();

        let tables = TABLE
            .captures_iter(&source)
            .filter_map(|caps| caps.get(1))
            .map(|body| {
                let mut table = parse_tabular(body.as_str()).unwrap_or_default();
                table.caption = caption_of(body.as_str());
                table.label = label_of(body.as_str());
                table
            })
            .collect();

        let equations = EQUATION
            .captures_iter(&source)
            .filter_map(|caps| caps.get(1))
            .map(|body| Equation {
                content: LABEL.replace_all(body.as_str(), "").trim().to_string(),
                label: label_of(body.as_str()).unwrap_or_default(),
            })
            .collect();

        let packages = PACKAGE
            .captures_iter(&source)
            .filter_map(|caps| caps.get(1))
            .flat_map(|list| list.as_str().split(','))
            .filter_map(non_empty)
            .collect();

        let body = DOCUMENT_BODY
            .captures(&source)
            .and_then(|caps| caps.get(1))
            .map_or(&*source, |m| m.as_str());

        Ok(DocumentStructure {
            file_path: file_path.to_string(),
            document_type: DocumentFormat::Latex,
            metadata,
            headings,
            paragraphs: paragraphs_of(body),
            tables,
            details: FormatDetails::Latex(LatexDetails {
                document_class: DOCUMENT_CLASS
                    .captures(&source)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| non_empty(m.as_str())),
                figures,
                equations,
                packages,
                has_bibliography: BIBLIOGRAPHY.is_match(&source),
                citation_count: CITATION.find_iter(&source).count(),
                raw_content: content.to_string(),
            }),
        })
    }
}

impl DocumentParser for LatexParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Latex
    }

    fn parse(&self, path: &Path) -> Result<DocumentStructure, ParseError> {
        let content = read_lossy(path)?;
        reject_binary(path, DocumentFormat::Latex, &content)?;

        let structure = self
            .parse_str(&path.display().to_string(), &content)
            .map_err(|reason| ParseError::corrupt(path, DocumentFormat::Latex, reason))?;

        tracing::debug!(
            path = %path.display(),
            headings = structure.headings.len(),
            tables = structure.tables.len(),
            "Parsed LaTeX document"
        );

        Ok(structure)
    }
}

fn heading_level(command: &str) -> u8 {
    match command {
        "chapter" => 0,
        "section" => 1,
        "subsection" => 2,
        _ => 3,
    }
}

/// The brace-delimited group opening at byte `open`, and the index just past it.
///
/// Escaped braces (`\{`, `\}`) do not count towards nesting.
fn braced_group(text: &str, open: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[open + 1..i], i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Argument of the first match of `command`, whose pattern ends at the opening brace.
fn command_arg(text: &str, command: &Regex) -> Option<String> {
    let found = command.find(text)?;
    braced_group(text, found.end() - 1).map(|(arg, _)| arg.to_string())
}

/// Remove every match of `command` together with its braced argument.
fn remove_commands(text: &str, command: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for found in command.find_iter(text) {
        if found.start() < cursor {
            continue;
        }
        out.push_str(&text[cursor..found.start()]);
        cursor = braced_group(text, found.end() - 1).map_or(found.end(), |(_, end)| end);
    }
    out.push_str(&text[cursor..]);
    out
}

fn caption_of(environment: &str) -> Option<String> {
    command_arg(environment, &CAPTION).and_then(|c| non_empty(clean_latex(&c)))
}

fn label_of(environment: &str) -> Option<String> {
    LABEL
        .captures(environment)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(m.as_str()))
}

/// Cell text of the first `tabular` in a table environment.
fn parse_tabular(environment: &str) -> Option<Table> {
    let start = TABULAR.find(environment)?;
    let (column_spec, body_start) = braced_group(environment, start.end() - 1)?;
    let body_end = TABULAR_END
        .find_at(environment, body_start)
        .map_or(environment.len(), |m| m.start());
    let body = &environment[body_start..body_end];

    let cells: Vec<Vec<String>> = body
        .split(r"\\")
        .map(|row| TABLE_RULE.replace_all(row, "").trim().to_string())
        .filter(|row| !row.is_empty())
        .map(|row| {
            row.replace(r"\&", "\u{1}")
                .split('&')
                .map(|cell| clean_latex(&cell.replace('\u{1}', r"\&")))
                .collect()
        })
        .collect();

    let mut table = Table::from_cells(cells);
    let declared = column_count(column_spec);
    if declared > 0 {
        table.columns = declared;
    }
    Some(table)
}

/// Number of columns a tabular column spec declares, e.g. `|l|p{3cm}|r|` → 3.
fn column_count(spec: &str) -> usize {
    let mut stripped = spec.to_string();
    loop {
        let next = WRAPPING_GROUP.replace_all(&stripped, "").into_owned();
        if next == stripped {
            break;
        }
        stripped = next;
    }
    stripped
        .chars()
        .filter(|c| matches!(c, 'l' | 'c' | 'r' | 'p' | 'm' | 'b' | 'X'))
        .count()
}

fn paragraphs_of(body: &str) -> Vec<Paragraph> {
    let mut text = BLOCK.replace_all(body, "\n\n").into_owned();
    for command in [&*HEADING, &*TITLE, &*AUTHOR, &*DATE, &*CAPTION] {
        text = remove_commands(&text, command);
    }

    PARAGRAPH_BREAK
        .split(&text)
        .map(clean_latex)
        .filter(|p| !p.is_empty())
        .map(Paragraph::text)
        .collect()
}

/// Strip LaTeX markup from a fragment, keeping the text it wraps.
///
/// `\textbf{x}` and other one-argument commands become `x`, argument-free
/// commands disappear, and cross-reference commands are dropped along with
/// their keys.
fn clean_latex(text: &str) -> String {
    let mut text = DROPPED.replace_all(text, "").into_owned();
    text = LINE_BREAK.replace_all(&text, " ").into_owned();

    // Innermost groups first, until nothing wraps anything.
    loop {
        let next = WRAPPING_COMMAND.replace_all(&text, "${1}").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    let text = BARE_COMMAND.replace_all(&text, "");
    let text = ESCAPED.replace_all(&text, "${1}");
    text.replace(['{', '}', '\\'], "")
        .replace('~', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
