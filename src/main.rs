//! `strata` command line: chunk a manual, inspect its structure, validate output.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata::{
    assemble_chunks, detect_boundaries, document_manifest, filter_boundaries, load_chunks,
    run_validation_suite, save_chunks, validate_boundaries, BoundaryStats, Profile, Severity,
};

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Structure-aware chunking of technical manuals"
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk a document and write `{manual_id}_chunks.jsonl`
    Process {
        #[command(flatten)]
        input: Input,

        /// Directory for output files
        #[arg(long, env = "STRATA_OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,

        /// Also write the annotated manifest as `{manual_id}_manifest.json`
        #[arg(long)]
        manifest: bool,
    },
    /// Log boundary diagnostics without writing anything
    Inspect {
        #[command(flatten)]
        input: Input,
    },
    /// Run the QA suite over a chunk file; exits 1 on errors
    ValidateChunks {
        /// Profile YAML
        #[arg(long)]
        profile: PathBuf,

        /// Chunk JSONL file
        #[arg(long)]
        chunks: PathBuf,
    },
}

#[derive(Args, Debug)]
struct Input {
    /// Profile YAML
    #[arg(long)]
    profile: PathBuf,

    /// Extracted pages: form-feed separated text, or a JSON array of strings (.json)
    #[arg(long)]
    pages: PathBuf,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Read pages from a form-feed separated text file or a JSON array.
fn read_pages(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pages from {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of strings", path.display()));
    }
    Ok(raw.split('\u{c}').map(str::to_string).collect())
}

fn load_profile(path: &Path) -> Result<Profile> {
    Profile::load(path).with_context(|| format!("failed to load profile {}", path.display()))
}

fn process(input: &Input, output_dir: &Path, write_manifest: bool) -> Result<()> {
    let profile = load_profile(&input.profile)?;
    let pages = read_pages(&input.pages)?;

    let mut manifest = document_manifest(&pages, &profile);
    let chunks = assemble_chunks(&pages, &manifest, &profile);
    if chunks.is_empty() {
        tracing::warn!("no chunks produced; check the profile's hierarchy patterns");
    }

    let id = profile.document_id();
    let chunks_path = output_dir.join(format!("{id}_chunks.jsonl"));
    save_chunks(&chunks, &chunks_path)
        .with_context(|| format!("failed to write {}", chunks_path.display()))?;

    if write_manifest {
        manifest.annotate(&pages, &profile);
        let manifest_path = output_dir.join(format!("{id}_manifest.json"));
        manifest
            .save(&manifest_path)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;
    }

    tracing::info!(
        pages = pages.len(),
        entries = manifest.len(),
        chunks = chunks.len(),
        "processed {id}"
    );
    Ok(())
}

fn inspect(input: &Input) -> Result<()> {
    let profile = load_profile(&input.profile)?;
    let pages = read_pages(&input.pages)?;

    let detected = detect_boundaries(&pages, &profile);
    let boundaries = filter_boundaries(&detected, &profile, &pages);
    let stats = BoundaryStats::compute(&boundaries, &pages);
    tracing::info!(
        total = stats.total,
        per_page = stats.per_page,
        min_words = stats.min_words,
        median_words = stats.median_words,
        max_words = stats.max_words,
        "boundary statistics"
    );
    for (level, count) in &stats.by_level {
        tracing::info!(level, count, "boundaries at level");
    }
    for &i in &stats.suspected_false_positives {
        let b = &boundaries[i];
        tracing::warn!(
            line = b.line,
            page = b.page,
            id = b.id.as_deref().unwrap_or(""),
            "suspected false positive"
        );
    }
    for warning in validate_boundaries(&boundaries, &profile) {
        tracing::warn!("{warning}");
    }
    Ok(())
}

fn validate_chunks(profile: &Path, chunks: &Path) -> Result<bool> {
    let profile = load_profile(profile)?;
    let chunks =
        load_chunks(chunks).with_context(|| format!("failed to read chunks from {}", chunks.display()))?;

    let report = run_validation_suite(&chunks, &profile);
    for issue in &report.issues {
        match issue.severity {
            Severity::Error => {
                tracing::error!(check = issue.check, chunk = %issue.chunk_id, "{}", issue.message);
            }
            Severity::Warning => {
                tracing::warn!(check = issue.check, chunk = %issue.chunk_id, "{}", issue.message);
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::info!(
        chunks = report.total_chunks,
        errors = report.error_count(),
        warnings = report.warning_count(),
        passed = report.passed,
        "validation finished"
    );
    Ok(report.passed)
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Process {
            input,
            output_dir,
            manifest,
        } => process(&input, &output_dir, manifest)?,
        Command::Inspect { input } => inspect(&input)?,
        Command::ValidateChunks { profile, chunks } => {
            if !validate_chunks(&profile, &chunks)? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
