//! Buckos flag editor CLI
//!
//! Enables, disables, masks and resets per-package flags in the
//! `package.*` configuration files.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{split_arg_sets, Cli, Requests};
use config::{ConfigLoader, EditReport, FlagEditor, FlagSettings, QueryMatch};
use console::style;
use serde::Serialize;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every request succeeded
fn run(cli: &Cli) -> Result<bool> {
    let settings = load_settings(cli)?;
    let sets = split_arg_sets(&cli.args)?;
    let requests = Requests::build(&sets);

    for e in &requests.errors {
        error!("{}", e);
    }

    let editor = FlagEditor::new(settings).pretend(cli.pretend);

    let mut matches = Vec::new();
    for query in &requests.queries {
        matches.extend(editor.lookup(query)?);
    }

    let report = if requests.operations.is_empty() {
        None
    } else {
        Some(editor.edit(&requests.operations)?)
    };

    if cli.json {
        print_json(&matches, report.as_ref(), &requests.errors)?;
    } else {
        print_matches(&matches);
        if let Some(ref report) = report {
            print_report(report, cli.quiet);
        }
    }

    let written = report.as_ref().map(EditReport::is_success).unwrap_or(true);
    Ok(requests.errors.is_empty() && written)
}

fn load_settings(cli: &Cli) -> Result<FlagSettings> {
    let mut settings = match cli.config {
        Some(ref path) => ConfigLoader::new(path)
            .use_defaults(false)
            .load()
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => ConfigLoader::system()
            .load()
            .context("Failed to load settings")?,
    };

    if let Some(ref root) = cli.config_root {
        settings.config_root = root.clone();
    }
    settings.drop_ineffective |= cli.drop_ineffective;
    settings.sort_flags |= cli.sort_flags;
    Ok(settings)
}

fn print_matches(matches: &[QueryMatch]) {
    for m in matches {
        let location = match (&m.path, m.line) {
            (Some(path), Some(line)) => format!("{}:{}", path.display(), line),
            _ => String::new(),
        };
        println!(
            "{} {}{}::{}  {}",
            style(&m.atom).green(),
            style(m.sign.op_marker()).bold(),
            m.kind.namespace(),
            style(&m.name).cyan(),
            style(location).dim()
        );
    }
}

fn print_report(report: &EditReport, quiet: bool) {
    let totals = report.totals();

    for change in &report.write.changed {
        let verb = match (report.pretend, change.created) {
            (true, true) => "Would create",
            (true, false) => "Would update",
            (false, true) => "Created",
            (false, false) => "Updated",
        };
        println!(
            "{} {} {}",
            style(">>>").green().bold(),
            verb,
            style(change.path.display()).bold()
        );
        if report.pretend || !quiet {
            for line in &change.removed {
                println!("  {}", style(format!("- {}", line)).red());
            }
            for line in &change.added {
                println!("  {}", style(format!("+ {}", line)).green());
            }
        }
    }

    for failure in &report.write.failed {
        println!("{} {}", style(">>>").red().bold(), failure);
    }

    if quiet {
        return;
    }

    if report.write.changed.is_empty() && report.write.failed.is_empty() {
        println!("{}", style(">>> Nothing to change").yellow().bold());
    }

    println!(
        "{} {} added, {} updated, {} removed, {} duplicate(s) dropped",
        style(">>>").blue().bold(),
        style(totals.added).bold(),
        style(totals.updated).bold(),
        style(totals.removed).bold(),
        style(totals.deduplicated).bold()
    );
    if !report.warnings.is_empty() {
        println!(
            "{} {} malformed line(s) kept as-is",
            style(">>>").yellow().bold(),
            report.warnings.len()
        );
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    pretend: bool,
    queries: &'a [QueryMatch],
    kinds: Vec<&'a config::KindReport>,
    changed: Vec<&'a config::FileChange>,
    unchanged: Vec<&'a std::path::Path>,
    warnings: Vec<&'a config::ReadWarning>,
    errors: Vec<String>,
}

fn print_json(
    matches: &[QueryMatch],
    report: Option<&EditReport>,
    errors: &[config::ConfigError],
) -> Result<()> {
    let mut out = JsonReport {
        pretend: report.map(|r| r.pretend).unwrap_or(false),
        queries: matches,
        kinds: Vec::new(),
        changed: Vec::new(),
        unchanged: Vec::new(),
        warnings: Vec::new(),
        errors: errors.iter().map(|e| e.to_string()).collect(),
    };

    if let Some(report) = report {
        out.kinds = report.kinds.iter().collect();
        out.changed = report.write.changed.iter().collect();
        out.unchanged = report.write.unchanged.iter().map(|p| p.as_path()).collect();
        out.warnings = report.warnings.iter().collect();
        out.errors.extend(report.write.failed.iter().map(|e| e.to_string()));
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
