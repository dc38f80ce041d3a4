//! Subcommand implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};

use krt_batch::{ArticleInput, BatchOrchestrator, DirectorySink};
use krt_core::{AppConfig, CandidateExtractor, KrtDocument};
use krt_extractor::{
    assess, build_document, evaluate as evaluate_rows, ArticleMeta, EvaluationReport,
    PatternExtractor, RuleRegistry,
};
use krt_llm::LlmExtractor;
use krt_parser::{parse_article, ArticleFormat};

const BATCH_REPORT_FILE: &str = "batch_report.json";

/// Pattern engine, or the configured LLM when `llm` is set
fn make_extractor(
    config: &AppConfig,
    llm: bool,
    extra: Option<String>,
) -> anyhow::Result<Arc<dyn CandidateExtractor>> {
    if llm {
        config.llm.validate()?;
        let extractor = LlmExtractor::from_config(&config.llm)?;
        let extractor = match extra {
            Some(extra) => extractor.with_extra_instructions(Some(extra)),
            None => extractor,
        };
        info!(provider = %config.llm.provider, model = %config.llm.model, "Using LLM extractor");
        return Ok(Arc::new(extractor));
    }

    let registry = RuleRegistry::load(config.extraction.rules_file.as_deref())?;
    info!(rules = registry.len(), "Using pattern extractor");
    Ok(Arc::new(PatternExtractor::new(registry)))
}

// ============================================================================
// build
// ============================================================================

pub async fn build(
    config: &AppConfig,
    path: &Path,
    llm: bool,
    output: Option<&Path>,
    extra: Option<String>,
) -> anyhow::Result<()> {
    let extractor = make_extractor(config, llm, extra)?;
    let article = parse_article(path)?;
    let meta = ArticleMeta::new(article.title(), article.abstract_text(), article.source.as_str());

    let timeout = Duration::from_secs(config.batch.call_timeout_secs);
    let document = tokio::time::timeout(
        timeout,
        build_document(extractor.as_ref(), &article.sections, meta),
    )
    .await
    .with_context(|| format!("extraction timed out after {}s", timeout.as_secs()))??;

    let json = document.to_json_pretty()?;
    match output {
        Some(out) => {
            std::fs::write(out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), rows = document.rows.len(), "Wrote KRT document");
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ============================================================================
// batch
// ============================================================================

/// Expand directories into their article files, sorted for stable ids
fn collect_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<ArticleInput>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("failed to list {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && ArticleFormat::from_path(p) == ArticleFormat::Jats)
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files.into_iter().map(ArticleInput::File).collect())
}

pub async fn batch(
    config: &AppConfig,
    inputs: &[PathBuf],
    out_dir: &Path,
    llm: bool,
) -> anyhow::Result<()> {
    let articles = collect_inputs(inputs)?;
    if articles.is_empty() {
        bail!("no article files found");
    }

    let extractor = make_extractor(config, llm, None)?;
    let mut orchestrator = BatchOrchestrator::new(extractor, &config.batch)?;
    if config.batch.fallback_to_patterns {
        let registry = RuleRegistry::load(config.extraction.rules_file.as_deref())?;
        orchestrator = orchestrator.with_fallback(Arc::new(PatternExtractor::new(registry)));
    }

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling unfinished articles");
            token.cancel();
        }
    });

    let sink = Arc::new(DirectorySink::create(out_dir).await?);
    let report = orchestrator.run(articles, sink).await?;

    let report_path = out_dir.join(BATCH_REPORT_FILE);
    std::fs::write(&report_path, report.to_json_pretty()?)
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    print!("{}", report.summary());
    println!("Report: {}", report_path.display());
    Ok(())
}

// ============================================================================
// check
// ============================================================================

fn read_document(path: &Path) -> anyhow::Result<KrtDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a KRT document", path.display()))
}

pub fn check(path: &Path) -> anyhow::Result<()> {
    let document = read_document(path)?;
    let report = assess(&document.rows);

    println!("KRT check: {} ({} rows)", path.display(), document.rows.len());
    println!(
        "\nQuality score: {}/{}",
        report.score.score, report.score.max_score
    );
    for note in &report.score.notes {
        println!("  - {note}");
    }

    if !report.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }

    if !report.suggestions.is_empty() {
        println!("\nSuggestions:");
        for suggestion in &report.suggestions {
            println!("  - {suggestion}");
        }
    }
    Ok(())
}

// ============================================================================
// evaluate
// ============================================================================

/// Gold/predicted document pairs. Directories are paired by file name.
fn document_pairs(gold: &Path, predicted: &Path) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
    if !gold.is_dir() {
        return Ok(vec![(gold.to_path_buf(), predicted.to_path_buf())]);
    }
    if !predicted.is_dir() {
        bail!("--gold is a directory, so --predicted must be one too");
    }

    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(gold).with_context(|| format!("failed to list {}", gold.display()))? {
        let gold_path = entry?.path();
        if gold_path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = gold_path.file_name() else { continue };
        pairs.push((gold_path.clone(), predicted.join(name)));
    }
    pairs.sort();
    Ok(pairs)
}

pub fn evaluate(gold: &Path, predicted: &Path, json: bool) -> anyhow::Result<()> {
    let mut report = EvaluationReport::default();

    for (gold_path, predicted_path) in document_pairs(gold, predicted)? {
        let gold_doc = read_document(&gold_path)?;
        let predicted_rows = if predicted_path.exists() {
            read_document(&predicted_path)?.rows
        } else {
            warn!(path = %predicted_path.display(), "No prediction, counting every gold row as missed");
            Vec::new()
        };
        report.merge(&evaluate_rows(&gold_doc.rows, &predicted_rows));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.report());
    }
    Ok(())
}

// ============================================================================
// rules
// ============================================================================

pub fn rules(config: &AppConfig) -> anyhow::Result<()> {
    let registry = RuleRegistry::load(config.extraction.rules_file.as_deref())?;
    let source = config
        .extraction
        .rules_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in".to_string());

    println!("{} rules ({source})", registry.len());
    for rule in registry.rules() {
        println!(
            "  {:>4}  {:<32} {}",
            rule.priority,
            rule.name,
            rule.resource_type.as_str()
        );
    }
    Ok(())
}
