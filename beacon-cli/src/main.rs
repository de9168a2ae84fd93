mod controls;
mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use beacon_core::bulk::{load_targets, ChannelProgressSink, Run, RunEvent, StateStore};
use beacon_core::colors::CatppuccinExt;
use beacon_core::output::{
    get_formatter, CsvExporter, JsonLinesExporter, ListExporter, OutputFormat, OutputFormatter,
};
use beacon_core::{BulkExecutor, ProbeConfig, ResultSink, RunSummary};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

use controls::KeyListener;
use display::{LoadingSpinner, ProgressWriterFactory, RunProgress};

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Bulk domain liveness checker - DNS, TLS and HTTP in parallel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human or json)
    #[arg(short, long, default_value = "human", global = true)]
    format: OutputFormat,

    /// TOML file with probe settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of parallel workers (overrides the config file)
    #[arg(short, long, env = "BEACON_WORKERS", global = true)]
    workers: Option<usize>,

    /// Check repeated lines again instead of skipping duplicates
    #[arg(long, global = true)]
    keep_duplicates: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every domain in a file
    Check {
        /// File with one domain or URL per line; # starts a comment
        file: PathBuf,
        /// Directory that receives the run_<timestamp> folder
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Continue a paused, cancelled or interrupted run from its state file
    Resume {
        /// state.json written by an earlier run
        state: PathBuf,
    },
    /// Show how each line would be normalized, without touching the network
    Normalize {
        /// File with one domain or URL per line
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(ProgressWriterFactory::new())
        .init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = load_config(cli.config.as_deref(), cli.workers, cli.keep_duplicates)?;

    match cli.command {
        Commands::Check { file, output_dir } => check(config, cli.format, &file, &output_dir).await,
        Commands::Resume { state } => resume(config, cli.format, &state).await,
        Commands::Normalize { file } => normalize(config, cli.format, &file),
    }
}

fn load_config(
    path: Option<&Path>,
    workers: Option<usize>,
    keep_duplicates: bool,
) -> anyhow::Result<ProbeConfig> {
    let mut config = match path {
        Some(path) => ProbeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ProbeConfig::default(),
    };
    if let Some(workers) = workers {
        config = config.with_worker_count(workers);
    }
    if keep_duplicates {
        config = config.with_dedupe(false);
    }
    config.validate()?;
    Ok(config)
}

/// Output files for one run, all inside `dir`.
fn build_sink(
    config: &ProbeConfig,
    dir: &Path,
) -> anyhow::Result<(ResultSink, UnboundedReceiver<RunEvent>)> {
    let (progress, events) = ChannelProgressSink::channel();
    let sink = ResultSink::new()
        .with_exporter(JsonLinesExporter::create(dir.join("results.jsonl"))?)
        .with_exporter(CsvExporter::create(dir.join("results.csv"))?)
        .with_exporter(ListExporter::in_dir(dir)?)
        .with_progress(Arc::new(progress))
        .with_state_store(StateStore::new(dir.join("state.json")))
        .with_checkpoint_every(config.checkpoint_every);
    Ok((sink, events))
}

async fn check(
    config: ProbeConfig,
    format: OutputFormat,
    file: &Path,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let executor = BulkExecutor::new(config)?;

    let spinner = LoadingSpinner::start(file);
    let list = load_targets(file, executor.normalizer(), executor.config().dedupe)?;
    drop(spinner);

    if list.targets.is_empty() {
        bail!("no targets found in {}", file.display());
    }

    let run_dir = output_dir.join(format!(
        "run_{}",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory {}", run_dir.display()))?;

    if format == OutputFormat::Human {
        let duplicates = if list.duplicates > 0 {
            format!(" ({} duplicates skipped)", list.duplicates)
        } else {
            String::new()
        };
        println!(
            "Checking {} targets{} with {} workers",
            list.targets.len().to_string().ctp_green(),
            duplicates,
            executor.config().worker_count.to_string().ctp_yellow()
        );
        println!("Results: {}", run_dir.display().to_string().lavender());
    }

    let (sink, events) = build_sink(executor.config(), &run_dir)?;
    let run = executor.start(list.targets, sink);
    info!(dir = %run_dir.display(), "Run started");
    drive(run, events, format, &run_dir).await
}

async fn resume(config: ProbeConfig, format: OutputFormat, state: &Path) -> anyhow::Result<()> {
    let Some(snapshot) = StateStore::new(state).load()? else {
        bail!("no state file at {}", state.display());
    };
    if snapshot.remaining_targets.is_empty() {
        println!("Nothing left to check in {}", state.display());
        return Ok(());
    }

    let run_dir = state
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if format == OutputFormat::Human {
        println!(
            "Resuming {} run: {} of {} done, {} remaining",
            snapshot.reason.to_string().ctp_yellow(),
            snapshot.completed,
            snapshot.total,
            snapshot.remaining_targets.len().to_string().ctp_green()
        );
    }

    let executor = BulkExecutor::new(config)?;
    let (sink, events) = build_sink(executor.config(), &run_dir)?;
    let sink = sink.with_state_store(StateStore::new(state));
    let run = executor
        .resume(snapshot, sink)
        .with_context(|| format!("restoring {}", state.display()))?;
    drive(run, events, format, &run_dir).await
}

async fn drive(
    run: Run,
    events: UnboundedReceiver<RunEvent>,
    format: OutputFormat,
    run_dir: &Path,
) -> anyhow::Result<()> {
    let formatter = get_formatter(format);
    let counters = run.sink().counters();
    let control = run.control();

    let mut progress = RunProgress::new(&counters);
    let keys = KeyListener::spawn(control.clone(), progress.bar());
    progress.set_raw_mode(keys.raw_mode());
    let progress = Arc::new(progress);

    if format == OutputFormat::Human {
        if keys.raw_mode() {
            progress.println(&format!(
                "Keys: {} pause  {} resume  {} cancel  {} force exit",
                "p".ctp_yellow(),
                "r".ctp_yellow(),
                "c/Esc".ctp_yellow(),
                "Ctrl+C".ctp_yellow()
            ));
        }
        if let Some(header) = formatter.format_header() {
            for line in header.lines() {
                progress.println(line);
            }
        }
    }

    let printer = tokio::spawn(print_events(events, formatter, progress.clone()));

    let summary = run.wait().await;
    keys.stop().await;
    drop(control);
    let _ = printer.await;
    progress.finish();

    report(&summary, format, run_dir);
    Ok(())
}

async fn print_events(
    mut events: UnboundedReceiver<RunEvent>,
    formatter: Box<dyn OutputFormatter>,
    progress: Arc<RunProgress>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RunEvent::Outcome { record, counters } => {
                progress.println(&formatter.format_outcome(&record));
                progress.update(&counters);
            }
            RunEvent::Snapshot(snapshot) => {
                info!(reason = %snapshot.reason, completed = snapshot.completed, "Snapshot saved");
            }
            RunEvent::Completed(counters) => progress.update(&counters),
        }
    }
}

fn report(summary: &RunSummary, format: OutputFormat, run_dir: &Path) {
    let formatter = get_formatter(format);
    println!();
    println!("{}", formatter.format_summary(summary));

    if format == OutputFormat::Human {
        println!("Output: {}", run_dir.display().to_string().lavender());
        if summary.cancelled {
            let state = run_dir.join("state.json");
            println!(
                "Resume with: {}",
                format!("beacon resume {}", state.display()).ctp_yellow()
            );
        }
    }
}

fn normalize(config: ProbeConfig, format: OutputFormat, file: &Path) -> anyhow::Result<()> {
    let normalizer = beacon_core::Normalizer::from_config(&config);
    let list = load_targets(file, &normalizer, config.dedupe)?;
    let formatter = get_formatter(format);

    let mut plausible = 0;
    for raw in &list.targets {
        let target = normalizer.normalize(raw);
        if target.is_plausible {
            plausible += 1;
        }
        println!("{}", formatter.format_normalized(&target));
    }

    if format == OutputFormat::Human {
        println!();
        println!(
            "{} plausible, {} rejected, {} duplicates skipped",
            plausible.to_string().ctp_green(),
            (list.targets.len() - plausible).to_string().ctp_red(),
            list.duplicates
        );
    }
    Ok(())
}
