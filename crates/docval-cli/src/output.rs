use std::io::Write;
use std::path::Path;

use docval_core::{ValidationReport, ValidationResult};
use owo_colors::OwoColorize;

const RULE_WIDTH: usize = 70;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print what is about to be validated, and with what.
pub fn print_header(
    w: &mut dyn Write,
    document: &Path,
    backend: &str,
    model: &str,
    parser: Option<&str>,
    spec_count: usize,
) -> std::io::Result<()> {
    writeln!(w, "Validating: {}", document.display())?;
    writeln!(w, "Using backend: {}", backend)?;
    writeln!(w, "Using model: {}", model)?;
    match parser {
        Some(parser) => writeln!(w, "Using parser: {}", parser)?,
        None => writeln!(w, "Parser: auto-detect from file extension")?,
    }
    writeln!(w, "Specifications: {}", spec_count)?;
    writeln!(w)?;
    Ok(())
}

/// Print the summary and one line per specification.
pub fn print_report(
    w: &mut dyn Write,
    report: &ValidationReport,
    verbose: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(w, "{}", rule)?;
    if color.enabled() {
        writeln!(w, "{}", "VALIDATION RESULTS".bold())?;
    } else {
        writeln!(w, "VALIDATION RESULTS")?;
    }
    writeln!(w, "{}", rule)?;
    writeln!(w)?;

    writeln!(w, "File: {}", report.file_path)?;
    writeln!(w, "Total Specifications: {}", report.total_specs)?;
    writeln!(w, "Passed: {}", report.passed_count)?;
    writeln!(w, "Failed: {}", report.failed_count)?;
    writeln!(
        w,
        "Score: {:.2}% ({}/{})",
        report.score * 100.0,
        report.passed_count,
        report.total_specs
    )?;
    if report.total_score_available != report.total_specs as f64 {
        writeln!(
            w,
            "Weighted Score: {:.2}% ({:.2}/{:.2})",
            report.weighted_score * 100.0,
            report.achieved_score,
            report.total_score_available
        )?;
    }
    if verbose {
        if let Some(usage) = &report.usage {
            writeln!(
                w,
                "Tokens: {} prompt, {} completion over {} requests",
                usage.prompt_tokens, usage.completion_tokens, usage.requests
            )?;
        }
    }
    writeln!(w)?;

    for result in &report.results {
        print_result(w, result, verbose, color)?;
    }
    Ok(())
}

fn print_result(
    w: &mut dyn Write,
    result: &ValidationResult,
    verbose: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let label = if result.passed { "✓ PASS" } else { "✗ FAIL" };
    let line = format!("{}: {}", label, result.spec_name);

    match (color.enabled(), result.passed) {
        (true, true) => writeln!(w, "{}", line.green().bold())?,
        (true, false) => writeln!(w, "{}", line.red().bold())?,
        (false, _) => writeln!(w, "{}", line)?,
    }

    if verbose && !result.reasoning.is_empty() {
        writeln!(w, "  Confidence: {:.2}", result.confidence)?;
        writeln!(w, "  Reasoning: {}", result.reasoning)?;
    }
    writeln!(w)?;
    Ok(())
}

pub fn print_saved(w: &mut dyn Write, path: &Path) -> std::io::Result<()> {
    writeln!(w, "Results saved to: {}", path.display())
}
