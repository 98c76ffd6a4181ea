use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docval_core::{load_spec_file, template_specs, write_spec_file, ValidationSpec};
use docval_runtime::{
    providers::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL},
    BackendConfig, PromptMode, ProviderRegistry, RuntimeError, Validator,
};

mod output;

use output::ColorMode;

/// docval - Validate DOCX, HTML and LaTeX documents against natural-language
/// specifications using an LLM backend
#[derive(Parser, Debug)]
#[command(name = "docval", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter (e.g. "debug", "docval_runtime=trace"); overrides DOCVAL_LOG and RUST_LOG
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a document against specifications
    Validate(ValidateArgs),

    /// Write a sample specification file
    InitSpec {
        /// Where to write the specification file
        output_file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Document to validate (.docx, .html, .htm, .tex, .latex)
    document: PathBuf,

    /// JSON or YAML file of specifications
    #[arg(short = 's', long)]
    spec_file: Option<PathBuf>,

    /// Inline specification, repeatable
    #[arg(
        short = 'r',
        long = "requirement",
        visible_alias = "spec",
        value_name = "NAME:DESC",
        value_parser = parse_requirement
    )]
    requirements: Vec<ValidationSpec>,

    /// Write the report as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show confidence and reasoning for every specification
    #[arg(short, long)]
    verbose: bool,

    /// Model name [default: the backend's default, gpt-4o-mini for openai]
    #[arg(short, long)]
    model: Option<String>,

    /// Backend: openai, github, nebulaone or anthropic
    #[arg(short, long, default_value = "openai")]
    backend: String,

    /// Parser: docx, html or latex [default: from the file extension]
    #[arg(short, long)]
    parser: Option<String>,

    /// API key; otherwise read from the backend's environment variables
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// API base URL; otherwise read from the backend's environment variable or default
    #[arg(short = 'u', long)]
    base_url: Option<String>,

    /// Per-request timeout (e.g. "30s", "2m")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    timeout: Duration,

    /// How the document is sent: per-spec or shared-context
    #[arg(long, default_value_t = PromptMode::SharedContext)]
    prompt_mode: PromptMode,

    /// Maximum tokens per backend response
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,
}

fn parse_requirement(raw: &str) -> Result<ValidationSpec, String> {
    ValidationSpec::from_inline(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Command::Validate(args) if args.verbose);
    if let Err(err) = init_logging(cli.log_level.as_deref(), verbose, cli.no_color) {
        eprintln!("Error: {:#}", err);
        return ExitCode::from(2);
    }

    let color = ColorMode(
        !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
    );

    let result = match cli.command {
        Command::Validate(args) => validate(args, color).await,
        Command::InitSpec { output_file } => init_spec(&output_file),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if err
                .downcast_ref::<RuntimeError>()
                .is_some_and(RuntimeError::is_transient)
            {
                eprintln!("The backend may be temporarily unavailable; try again later.");
            }
            ExitCode::from(2)
        }
    }
}

/// Log filter: `--log-level`, then `DOCVAL_LOG`, then `RUST_LOG`, else a default.
fn log_directive(
    flag: Option<&str>,
    verbose: bool,
    env: impl Fn(&str) -> Option<String>,
) -> String {
    flag.map(str::to_string)
        .or_else(|| env("DOCVAL_LOG"))
        .or_else(|| env("RUST_LOG"))
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| if verbose { "info" } else { "warn" }.to_string())
}

fn init_logging(flag: Option<&str>, verbose: bool, no_color: bool) -> anyhow::Result<()> {
    let directive = log_directive(flag, verbose, |var| std::env::var(var).ok());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{}'", directive))?;

    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!no_color && std::io::stderr().is_terminal())
        .init();
    Ok(())
}

/// Specifications from the file (if any) followed by the inline ones.
fn load_specs(
    spec_file: Option<&Path>,
    inline: Vec<ValidationSpec>,
) -> anyhow::Result<Vec<ValidationSpec>> {
    let mut specs = match spec_file {
        Some(path) => load_spec_file(path).with_context(|| {
            format!("Failed to load specification file {}", path.display())
        })?,
        None => Vec::new(),
    };
    specs.extend(inline);

    if specs.is_empty() {
        anyhow::bail!("No specifications provided. Use --spec-file or --requirement.");
    }
    Ok(specs)
}

async fn validate(args: ValidateArgs, color: ColorMode) -> anyhow::Result<ExitCode> {
    let specs = load_specs(args.spec_file.as_deref(), args.requirements)?;

    let registry = ProviderRegistry::with_defaults();
    let model = args
        .model
        .or_else(|| registry.default_model(&args.backend).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let mut config = BackendConfig::new(&model)
        .with_timeout(args.timeout)
        .with_max_tokens(args.max_tokens)
        .with_temperature(args.temperature);
    if let Some(key) = args.api_key {
        config = config.with_api_key(key);
    }
    if let Some(url) = args.base_url {
        config = config.with_base_url(url);
    }

    tracing::debug!(backend = %args.backend, ?config, "Backend configuration");

    let validator = Validator::from_backend(&registry, &args.backend, &config)
        .context("Failed to initialize backend")?
        .with_prompt_mode(args.prompt_mode);

    let mut stdout = std::io::stdout().lock();
    output::print_header(
        &mut stdout,
        &args.document,
        validator.backend_name(),
        validator.model(),
        args.parser.as_deref(),
        specs.len(),
    )?;
    drop(stdout);

    let report = validator
        .validate(&args.document, &specs, args.parser.as_deref())
        .await
        .with_context(|| format!("Validation of {} failed", args.document.display()))?;

    let mut stdout = std::io::stdout().lock();
    output::print_report(&mut stdout, &report, args.verbose, color)?;

    if let Some(path) = &args.output {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        output::print_saved(&mut stdout, path)?;
    }

    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn init_spec(output_file: &Path) -> anyhow::Result<ExitCode> {
    write_spec_file(output_file, &template_specs()).with_context(|| {
        format!(
            "Failed to create specification file {}",
            output_file.display()
        )
    })?;
    println!("Sample specification file created: {}", output_file.display());
    Ok(ExitCode::SUCCESS)
}
