use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use catalog_quality::{
    new_run_id, read_labeled_csv, summarize, telemetry_from_config, CatalogTable, LabelPalette,
    PipelineConfig, QualityPipeline, QualityScorer,
};
use chrono::{DateTime, Datelike, Local, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

const DEFAULT_MANIFEST: &str = "logs/runs/index.jsonl";

#[derive(Parser, Debug)]
#[command(name = "qc", version, about = "Catalog quality labeling and baseline training")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Labels the catalog, trains the baseline and commits all outputs.
    Run(RunArgs),
    /// Engineers weak labels only and writes the labeled dataset.
    Label {
        #[arg(long, default_value = "train.csv")]
        input: PathBuf,
        #[arg(long, default_value = "train_with_quality_label.csv")]
        output: PathBuf,
    },
    /// Prints per-label counts and mean price of a labeled dataset.
    Summary {
        #[arg(long, default_value = "train_with_quality_label.csv")]
        dataset: PathBuf,
    },
    /// Writes a synthetic catalog for smoke runs.
    Synth {
        #[arg(long, default_value = "train.csv")]
        output: PathBuf,
        #[arg(long, default_value_t = 200)]
        count: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Scores one catalog entry with committed artifacts.
    Score {
        #[arg(long, default_value = ".")]
        artifacts: PathBuf,
        #[arg(long)]
        text: String,
        #[arg(long)]
        price: f64,
    },
    /// Lists most recent runs.
    List {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Shows the manifest entry of one run.
    Status {
        run_id: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// TOML run configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    manifest: PathBuf,
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Mirror log records to stderr.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct RunManifestEntry {
    run_id: String,
    submitted_at: DateTime<Utc>,
    config: Option<PathBuf>,
    input: PathBuf,
    output_dir: PathBuf,
    log_path: Option<PathBuf>,
    status: RunStatus,
    #[serde(default)]
    macro_f1: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl RunManifestEntry {
    fn new(run_id: String, config_path: Option<PathBuf>, config: &PipelineConfig) -> Self {
        Self {
            run_id,
            submitted_at: Utc::now(),
            config: config_path,
            input: config.input.clone(),
            output_dir: config.output_dir.clone(),
            log_path: config.logging.log_path.clone(),
            status: RunStatus::Queued,
            macro_f1: None,
            error: None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(args),
        Commands::Label { input, output } => {
            let config = PipelineConfig {
                input,
                ..PipelineConfig::default()
            };
            let labeled = QualityPipeline::new().label(&config)?;
            labeled.write_csv(&output)?;
            println!("Quality Label Distribution:\n{}", labeled.distribution().render());
            println!("Saved labeled dataset to {}", output.display());
            Ok(())
        }
        Commands::Summary { dataset } => handle_summary(&dataset),
        Commands::Synth {
            output,
            count,
            seed,
        } => {
            CatalogTable::synthetic(count, seed).write_csv(&output)?;
            println!("wrote {count} synthetic entries to {}", output.display());
            Ok(())
        }
        Commands::Score {
            artifacts,
            text,
            price,
        } => {
            let scorer = QualityScorer::load(&artifacts)
                .with_context(|| format!("loading artifacts from {}", artifacts.display()))?;
            let label = scorer.predict(&text, price);
            let proba: serde_json::Map<String, serde_json::Value> = scorer
                .predict_proba(&text, price)
                .into_iter()
                .map(|(label, p)| (label.name().to_string(), json!(p)))
                .collect();
            let result = json!({
                "quality_label": label.index(),
                "name": label.name(),
                "probabilities": proba,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::List { limit, manifest } => {
            let entries = read_manifest(&manifest)?;
            for entry in entries.into_iter().rev().take(limit) {
                let f1 = entry
                    .macro_f1
                    .map_or_else(|| "-".to_string(), |f1| format!("{f1:.4}"));
                println!(
                    "{} | {:?} | {} | macro_f1={} | {}",
                    entry.run_id,
                    entry.status,
                    entry.submitted_at,
                    f1,
                    entry.input.display()
                );
            }
            Ok(())
        }
        Commands::Status { run_id, manifest } => {
            let entries = read_manifest(&manifest)?;
            if let Some(entry) = entries.into_iter().find(|e| e.run_id == run_id) {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("run {run_id} not found");
            }
            Ok(())
        }
    }
}

fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(input) = &args.input {
        config.input.clone_from(input);
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir.clone_from(output_dir);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.event_log.is_some() {
        config.logging.event_log.clone_from(&args.event_log);
    }
    config.logging.echo |= args.verbose;
    Ok(config)
}

fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = resolve_config(&args)?;
    let run_id = new_run_id();
    if config.logging.log_path.is_none() {
        config.logging.log_path = Some(compute_log_path(&args.log_dir, &run_id)?);
    }

    let mut entry = RunManifestEntry::new(run_id.clone(), args.config.clone(), &config);
    append_manifest(&args.manifest, &entry)?;
    let telemetry = telemetry_from_config(&config, &run_id)?;
    let submitted = json!({
        "event": "run_submitted",
        "run_id": entry.run_id,
        "input": entry.input,
        "output_dir": entry.output_dir,
        "log_path": entry.log_path,
        "submitted_at": entry.submitted_at,
    });
    println!("{}", serde_json::to_string_pretty(&submitted)?);
    telemetry.log(LogLevel::Info, "run queued", json!({ "input": entry.input }))?;
    telemetry.event("quality.run.submitted", json!({ "input": entry.input }))?;

    entry.status = RunStatus::Running;
    update_entry(&args.manifest, &entry)?;
    telemetry.log(LogLevel::Info, "run started", json!({}))?;

    match QualityPipeline::new()
        .with_telemetry(telemetry)
        .run(&config)
    {
        Ok(report) => {
            entry.status = RunStatus::Completed;
            entry.macro_f1 = Some(report.metrics.report.macro_f1());
            update_entry(&args.manifest, &entry)?;
            println!("{}", report.render());
            Ok(())
        }
        Err(err) => {
            entry.status = RunStatus::Failed;
            entry.error = Some(err.to_string());
            update_entry(&args.manifest, &entry)?;
            Err(err).with_context(|| format!("run {run_id} failed"))
        }
    }
}

fn handle_summary(dataset: &Path) -> Result<()> {
    let rows = read_labeled_csv(dataset)
        .with_context(|| format!("reading labeled dataset {}", dataset.display()))?;
    let palette = LabelPalette::default();
    println!("{} labeled entries", rows.len());
    for summary in summarize(
        rows.iter()
            .map(|row| (row.quality_label, row.price, row.final_score)),
    ) {
        let entry = palette.entry(summary.label);
        println!(
            "{:<15} {:>6} ({:>5.1}%)  mean_price={:>9.2}  mean_score={:.3}  {}",
            entry.name,
            summary.count,
            summary.share * 100.0,
            summary.mean_price,
            summary.mean_final_score,
            entry.color
        );
    }
    Ok(())
}

fn append_manifest(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

fn update_entry(path: &Path, updated: &RunManifestEntry) -> Result<()> {
    let mut entries = read_manifest(path)?;
    let Some(slot) = entries.iter_mut().find(|e| e.run_id == updated.run_id) else {
        return Ok(());
    };
    *slot = updated.clone();
    let tmp = manifest_tmp_path(path);
    let mut file = File::create(&tmp).with_context(|| format!("rewriting manifest {}", tmp.display()))?;
    for entry in entries {
        serde_json::to_writer(&mut file, &entry)?;
        file.write_all(b"\n")?;
    }
    file.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("replacing manifest {}", path.display()))?;
    Ok(())
}

fn manifest_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn compute_log_path(base: &Path, run_id: &str) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!("{run_id}.log.jsonl")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args_for(dir: &Path) -> RunArgs {
        RunArgs {
            config: None,
            input: Some(dir.join("train.csv")),
            output_dir: Some(dir.join("out")),
            seed: None,
            log_dir: dir.join("logs"),
            manifest: dir.join("logs/runs/index.jsonl"),
            event_log: Some(dir.join("logs/events.jsonl")),
            verbose: false,
        }
    }

    #[test]
    fn manifest_tracks_completed_run() {
        let dir = tempdir().unwrap();
        CatalogTable::synthetic(100, 42)
            .write_csv(dir.path().join("train.csv"))
            .unwrap();
        let args = args_for(dir.path());
        let manifest = args.manifest.clone();
        handle_run(args).unwrap();

        let entries = read_manifest(&manifest).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, RunStatus::Completed);
        assert!(entries[0].macro_f1.is_some());
        assert!(entries[0].log_path.as_ref().unwrap().exists());
        assert!(dir.path().join("out/price_scaler.bin").exists());
    }

    #[test]
    fn failed_run_is_recorded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("train.csv"), "sample_id,price\n1,2.0\n").unwrap();
        let args = args_for(dir.path());
        let manifest = args.manifest.clone();
        assert!(handle_run(args).is_err());

        let entries = read_manifest(&manifest).unwrap();
        assert_eq!(entries[0].status, RunStatus::Failed);
        assert!(entries[0].error.as_ref().unwrap().contains("catalog_content"));
    }

    #[test]
    fn status_rewrite_keeps_other_runs() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("runs/index.jsonl");
        let config = PipelineConfig::default();
        let first = RunManifestEntry::new("run-a".into(), None, &config);
        let mut second = RunManifestEntry::new("run-b".into(), None, &config);
        append_manifest(&manifest, &first).unwrap();
        append_manifest(&manifest, &second).unwrap();

        second.status = RunStatus::Running;
        update_entry(&manifest, &second).unwrap();

        let entries = read_manifest(&manifest).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, RunStatus::Queued);
        assert_eq!(entries[1].status, RunStatus::Running);
        assert!(!manifest_tmp_path(&manifest).exists());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("quality.toml");
        fs::write(&config_path, "input = \"a.csv\"\nseed = 3\n").unwrap();
        let mut args = args_for(dir.path());
        args.config = Some(config_path);
        args.input = None;
        args.seed = Some(9);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.input, dir.path().join("a.csv"));
        assert_eq!(config.seed, 9);
        assert_eq!(config.output_dir, dir.path().join("out"));
    }
}
