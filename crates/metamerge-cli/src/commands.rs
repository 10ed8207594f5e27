use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use metamerge_engine::{MergeConfig, MergeEngine, MergeError, MergeResult, ResolverKind};
use metamerge_types::MetadataDocument;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Merge(args) => cmd_merge(args, &cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

fn cmd_merge(args: MergeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if args.inputs.len() < 2 {
        anyhow::bail!("need at least two input documents, got {}", args.inputs.len());
    }

    ensure_writable(&args.output, args.overwrite)?;
    if let Some(path) = &args.decisions {
        ensure_writable(path, args.overwrite)?;
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(resolver) = args.resolver {
        config.resolver = resolver.into();
    }
    if let Some(secs) = args.tolerance_secs {
        config.timestamp_tolerance_secs = secs;
    }
    let engine = MergeEngine::new(config.into_context()?);
    debug!(context = ?engine.context(), "merge engine ready");

    let docs = args
        .inputs
        .iter()
        .map(|path| read_document(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let sources: Vec<String> = args.inputs.iter().map(|path| source_name(path)).collect();

    let result = match engine.merge_many(&docs, &sources) {
        Ok(result) => result,
        Err(err) => {
            report_conflict(&err);
            return Err(err.into());
        }
    };

    write_output(&args.output, result.document.to_json_pretty()?)?;
    if let Some(path) = &args.decisions {
        write_output(path, serde_json::to_string_pretty(&result.decisions)?)?;
    }

    print_summary(&result, &sources, &args.output, format)
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    // Validate before printing so a broken file fails here too.
    config.clone().into_context()?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MergeConfig> {
    let Some(path) = path else {
        return Ok(MergeConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    MergeConfig::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
}

fn read_document(path: &Path) -> anyhow::Result<MetadataDocument> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    MetadataDocument::from_json_str(&text)
        .with_context(|| format!("failed to decode {}", path.display()))
}

fn ensure_writable(path: &Path, overwrite: bool) -> anyhow::Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "output file {} already exists, use --overwrite to replace it",
            path.display()
        );
    }
    Ok(())
}

fn write_output(path: &Path, json: String) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(path, json + "\n").with_context(|| format!("failed to write {}", path.display()))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_summary(
    result: &MergeResult,
    sources: &[String],
    output: &Path,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let choices = result.resolver_choices().count();
    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "output": output.display().to_string(),
                "sources": sources,
                "fields": result.document.len(),
                "decisions": result.decisions.len(),
                "resolver_choices": choices,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!(
                "{} Merged {} documents into {}",
                "✓".green().bold(),
                sources.len(),
                output.display().to_string().bold()
            );
            println!("  Sources: {}", sources.join(", ").cyan());
            println!("  Fields: {}", result.document.len());
            println!("  Decisions: {} ({} by resolver)", result.decisions.len(), choices);
            for decision in result.resolver_choices() {
                println!("    {} {}", "~".yellow(), decision);
            }
        }
    }
    Ok(())
}

fn report_conflict(err: &MergeError) {
    let (path, source1, value1, source2, value2) = match err {
        MergeError::TypeMismatchConflict { path, source1, value1, source2, value2 }
        | MergeError::UnresolvedConflict { path, source1, value1, source2, value2, .. } => {
            (path, source1, value1.to_string(), source2, value2.to_string())
        }
        MergeError::ToleranceExceeded { path, source1, value1, source2, value2, .. } => {
            (path, source1, value1.clone(), source2, value2.clone())
        }
        _ => return,
    };
    eprintln!("{} Conflict at {}", "✗".red().bold(), path.yellow().bold());
    eprintln!("  {}: {}", source1.cyan(), value1);
    eprintln!("  {}: {}", source2.cyan(), value2);
}

impl From<ResolverArg> for ResolverKind {
    fn from(arg: ResolverArg) -> Self {
        match arg {
            ResolverArg::Strict => ResolverKind::Strict,
            ResolverArg::Interactive => ResolverKind::Interactive,
            ResolverArg::PreferFirst => ResolverKind::PreferFirst,
            ResolverArg::PreferSecond => ResolverKind::PreferSecond,
            ResolverArg::Join => ResolverKind::Join,
        }
    }
}
