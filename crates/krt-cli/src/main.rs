//! KRT CLI - Command-line interface
//!
//! Usage:
//!   krt build <article.xml> [--llm] [-o out.json]
//!   krt batch <dir|files...> --out-dir <dir> [--llm] [--workers N] [--fallback]
//!   krt check <krt.json>
//!   krt evaluate --gold <path> --predicted <path>
//!   krt rules

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use krt_core::{AppConfig, LlmProvider, LoggingConfig};

#[derive(Parser)]
#[command(name = "krt")]
#[command(about = "Key Resources Table extraction from scientific articles")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rules table replacing the built-in one
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// LLM provider: openai, ollama or anthropic
    #[arg(long, global = true)]
    provider: Option<LlmProvider>,

    /// LLM model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// LLM API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the KRT of a single article
    Build(BuildArgs),
    /// Extract KRTs for many articles
    Batch(BatchArgs),
    /// Check a KRT document against the guidelines
    Check {
        /// KRT document (JSON)
        path: PathBuf,
    },
    /// Compare predicted KRTs with gold KRTs
    Evaluate {
        /// Gold document, or a directory of them
        #[arg(long)]
        gold: PathBuf,
        /// Predicted document, or a directory of them
        #[arg(long)]
        predicted: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the loaded pattern rules
    Rules,
}

#[derive(Args)]
struct BuildArgs {
    /// JATS XML article
    path: PathBuf,

    /// Use the configured LLM instead of the pattern engine
    #[arg(long)]
    llm: bool,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra instructions for the LLM
    #[arg(long)]
    extra: Option<String>,
}

#[derive(Args)]
struct BatchArgs {
    /// Article files or directories of articles
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory receiving `<id>_krt.json` files and the batch report
    #[arg(long)]
    out_dir: PathBuf,

    /// Use the configured LLM instead of the pattern engine
    #[arg(long)]
    llm: bool,

    /// Worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Cancel unfinished articles after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Fall back to the pattern engine when the LLM gives up
    #[arg(long)]
    fallback: bool,

    /// Extra instructions for the LLM
    #[arg(long)]
    extra: Option<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(rules) = &cli.rules {
        config.extraction.rules_file = Some(rules.clone());
    }
    if let Some(provider) = cli.provider {
        config.llm.provider = provider;
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if cli.base_url.is_some() {
        config.llm.base_url = cli.base_url.clone();
    }
    if cli.api_key.is_some() {
        config.llm.api_key = cli.api_key.clone();
    }
    Ok(config)
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging);
    config.validate()?;

    match cli.command {
        Commands::Build(args) => {
            commands::build(
                &config,
                &args.path,
                args.llm,
                args.output.as_deref(),
                args.extra,
            )
            .await
        }
        Commands::Batch(args) => {
            let mut config = config;
            if let Some(workers) = args.workers {
                config.batch.max_workers = workers;
            }
            if args.deadline_secs.is_some() {
                config.batch.deadline_secs = args.deadline_secs;
            }
            if args.fallback {
                config.batch.fallback_to_patterns = true;
            }
            if args.extra.is_some() {
                config.llm.extra_instructions = args.extra;
            }
            commands::batch(&config, &args.inputs, &args.out_dir, args.llm).await
        }
        Commands::Check { path } => commands::check(&path),
        Commands::Evaluate {
            gold,
            predicted,
            json,
        } => commands::evaluate(&gold, &predicted, json),
        Commands::Rules => commands::rules(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("krt.toml");
        std::fs::write(&path, "[llm]\nprovider = \"anthropic\"\nmodel = \"from-file\"\n").unwrap();

        let cli = Cli::parse_from([
            "krt",
            "--config",
            path.to_str().unwrap(),
            "--provider",
            "openai_compatible",
            "--base-url",
            "http://localhost:11434/v1",
            "rules",
            "--model",
            "llama3",
            "--api-key",
            "local",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.llm.provider, LlmProvider::OpenAI);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(config.llm.api_key.as_deref(), Some("local"));
        assert!(config.llm.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let parsed = Cli::try_parse_from(["krt", "--provider", "gemini", "rules"]);
        assert!(parsed.is_err());
    }
}
