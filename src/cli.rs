//
// cli.rs
// dicom-ai-randomize
//
// Defines the CLI surface with Clap and wires the study folder layout to the randomizer.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{AnonymizerConfig, UidRoot};
use crate::models::RunSummary;
use crate::randomize::{self, RandomizedStudy};
use crate::storage::{self, LoadReport};

/// Study images live here, both in the source folder and in the randomized copy.
pub const STUDY_DIR: &str = "input";
/// AI results live here, grouped in sub-folders.
pub const RESULTS_DIR: &str = "output";

#[derive(Parser)]
#[command(name = "dicom-ai-randomize")]
#[command(about = "Anonymize a DICOM study together with the AI results derived from it", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// Root prepended to every generated UID
    #[arg(long, default_value_t = UidRoot::default())]
    pub uid_root: UidRoot,
    /// Use this PatientName instead of a generated one
    #[arg(long)]
    pub patient_name: Option<String>,
    /// Seed for reproducible identities and UIDs
    #[arg(long)]
    pub seed: Option<u64>,
    /// Write the run summary as JSON to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Randomize a study folder (`input/` images plus `output/<group>/` AI results)
    Randomize {
        input: PathBuf,
        /// Defaults to `<input>-randomized`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replace annotation text and detection summaries with a scan failure
        #[arg(long)]
        fail: bool,
        #[command(flatten)]
        identity: IdentityArgs,
    },
    /// Anonymize the study images of a folder, without any AI results
    Anonymize {
        input: PathBuf,
        /// Defaults to `<input>-randomized`
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        identity: IdentityArgs,
    },
}

impl IdentityArgs {
    fn config(&self, redact_results: bool) -> AnonymizerConfig {
        let mut config = AnonymizerConfig::default()
            .with_redaction(redact_results)
            .with_uid_root(self.uid_root.clone());
        if let Some(name) = &self.patient_name {
            config = config.with_patient_name(name.clone());
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let (summary, summary_path) = match cli.command {
        Commands::Randomize {
            input,
            output,
            fail,
            identity,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input));
            let summary = randomize_folder(&input, &output, identity.config(fail))?;
            println!("Randomized study written to {:?}", output);
            (summary, identity.summary)
        }
        Commands::Anonymize {
            input,
            output,
            identity,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input));
            let summary = anonymize_folder(&input, &output, identity.config(false))?;
            println!("Anonymized study written to {:?}", output);
            (summary, identity.summary)
        }
    };

    print_summary(&summary);
    if let Some(path) = summary_path {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Summary saved to {:?}", path);
    }
    Ok(())
}

/// Randomize `<input>/input` and `<input>/output/**` into the same layout under `output`.
pub fn randomize_folder(input: &Path, output: &Path, config: AnonymizerConfig) -> Result<RunSummary> {
    let study = storage::load_directory(&input.join(STUDY_DIR), true)
        .with_context(|| format!("Failed to read study images from {}", input.display()))?;
    let results_dir = input.join(RESULTS_DIR);
    let results = if results_dir.is_dir() {
        storage::load_directory(&results_dir, true)?
    } else {
        LoadReport::default()
    };

    ensure_output_free(output)?;
    let run = randomize::randomize(config, &study.objects(), results.objects())
        .context("Failed to anonymize study")?;

    write_study(&output.join(STUDY_DIR), &run, &study)?;
    for (modality, rewritten) in &run.results {
        let records = rewritten.iter().map(|r| {
            let source = &results.records[r.index];
            (&r.record, source.transfer_syntax.as_str())
        });
        storage::write_records(
            &output.join(RESULTS_DIR).join(storage::file_prefix(modality)),
            records,
        )?;
    }

    let mut summary = run.summary;
    summary.attach_sources(|i| {
        results
            .records
            .get(i)
            .map(|r| r.path.display().to_string())
    });
    merge_skipped(&mut summary, &study);
    merge_skipped(&mut summary, &results);
    Ok(summary)
}

/// Anonymize every DICOM file under `input` into `output`.
pub fn anonymize_folder(input: &Path, output: &Path, config: AnonymizerConfig) -> Result<RunSummary> {
    let study = storage::load_directory(input, true)?;
    ensure_output_free(output)?;
    let run = randomize::anonymize_only(config, &study.objects())
        .context("Failed to anonymize study")?;

    write_study(output, &run, &study)?;
    let mut summary = run.summary;
    merge_skipped(&mut summary, &study);
    Ok(summary)
}

fn write_study(dir: &Path, run: &RandomizedStudy, loaded: &LoadReport) -> Result<()> {
    let records = run
        .study
        .records
        .iter()
        .zip(&loaded.records)
        .map(|(record, source)| (record, source.transfer_syntax.as_str()));
    storage::write_records(dir, records)?;
    Ok(())
}

fn merge_skipped(summary: &mut RunSummary, report: &LoadReport) {
    for (path, reason) in &report.skipped {
        summary.skip_input(path.display().to_string(), reason.clone());
    }
}

fn default_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "study".to_string());
    input.with_file_name(format!("{name}-randomized"))
}

/// Refuse to mix outputs of two runs. Nothing is created here: folders appear only once a run
/// succeeded and its records are written.
fn ensure_output_free(output: &Path) -> Result<()> {
    if output.exists() {
        let occupied = fs::read_dir(output)
            .with_context(|| format!("Failed to read {}", output.display()))?
            .next()
            .is_some();
        if occupied {
            bail!("Output folder {:?} already exists and is not empty", output);
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Study records: {}", summary.study_records);
    if summary.prior_records > 0 {
        println!(
            "  Prior: {} | Current: {}",
            summary.prior_records, summary.current_records
        );
    }
    println!("AI results received: {}", summary.results_received);
    println!("  Fully anonymized: {}", summary.fully_anonymized);
    for (modality, count) in &summary.results_by_modality {
        println!("    {}: {}", modality, count);
    }
    println!(
        "  Partially anonymized (withheld): {}",
        summary.partially_anonymized.len()
    );
    for issue in &summary.partially_anonymized {
        println!("    {}", describe(issue.source.as_deref(), &issue.reason));
    }
    println!("Skipped: {}", summary.skipped.len());
    for issue in &summary.skipped {
        println!("    {}", describe(issue.source.as_deref(), &issue.reason));
    }
    println!("Mapping entries: {}", summary.mapping_entries);
}

fn describe(source: Option<&str>, reason: &str) -> String {
    match source {
        Some(source) => format!("{source}: {reason}"),
        None => reason.to_string(),
    }
}
