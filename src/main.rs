//! Contract Sentry - smart-contract security analysis client
//!
//! A CLI tool that submits contracts to a remote analysis backend,
//! follows the audit's progress, and renders vulnerability reports.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no --fail-on set)
//!   1 - Runtime error, or the audit failed, errored or was cancelled
//!   2 - Findings at or above the --fail-on threshold

mod analysis;
mod api;
mod cli;
mod config;
mod contract;
mod error;
mod job;
mod models;
mod report;

use anyhow::{bail, Context, Result};
use api::{fetch_results_in_order, AnalysisApi, HttpAnalysisApi};
use cli::{AnalyzeArgs, Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use contract::{AnalyzerSet, ContractAddress, ContractRef, SourceBundle};
use indicatif::{ProgressBar, ProgressStyle};
use job::{stage_message, AnalysisJobClient, JobEvent, JobSnapshot, JobState};
use models::{AnalysisResult, AuditId, ExportFormat, ResultId, Severity};
use report::{ReportFilter, ReportStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let file_config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    let mut config = file_config.clone();
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("Contract Sentry v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config, file_config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .contract-sentry.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to set the API URL, polling, network and analyzers.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from `--config`, then the working directory, then defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    Ok(Config::load_default()?.unwrap_or_default())
}

fn build_api(config: &Config) -> Result<Arc<dyn AnalysisApi>> {
    let api = HttpAnalysisApi::new(&config.api).context("Failed to create API client")?;
    debug!("Using analysis API at {}", api.base_url());
    Ok(Arc::new(api))
}

/// Dispatch a subcommand. Returns the process exit code.
async fn run(args: Args, config: Config, file_config: Config) -> Result<i32> {
    let Some(command) = args.command.clone() else {
        bail!("No command given");
    };

    match command {
        Command::Analyze(analyze) => run_analyze(&args, &analyze, &config, file_config).await,
        Command::Status { audit_id } => run_status(&config, audit_id).await,
        Command::Results {
            audit_ids,
            format,
            output,
        } => {
            let format = OutputFormat::resolve(format, &config.report.format);
            run_results(&config, &audit_ids, format, output_path(output, &config)).await
        }
        Command::Cancel { audit_id } => run_cancel(&config, audit_id).await,
        Command::Reports {
            page,
            limit,
            critical_only,
            high_only,
            medium_low_only,
            show,
        } => {
            let filter = ReportFilter {
                critical_only,
                high_only,
                medium_low_only,
            };
            run_reports(&config, page, limit, filter, show).await
        }
        Command::Export {
            format,
            output,
            skip,
            limit,
        } => run_export(&config, format, &output, skip, limit).await,
        Command::Stats { limit, top } => run_stats(&config, limit, top).await,
    }
}

fn output_path(cli: Option<PathBuf>, config: &Config) -> Option<PathBuf> {
    cli.or_else(|| config.report.output.as_ref().map(PathBuf::from))
}

/// Submit, poll and report on one contract.
async fn run_analyze(
    args: &Args,
    analyze: &AnalyzeArgs,
    config: &Config,
    mut file_config: Config,
) -> Result<i32> {
    let start_time = Instant::now();

    let contract = resolve_contract(analyze, config)?;
    let network = analyze.network.unwrap_or(config.analysis.network);
    let analyzers = match analyze.analyzers {
        Some(ref list) => AnalyzerSet::new(list.iter().copied())?,
        None => config.analysis.analyzers.clone(),
    };

    if analyze.remember {
        let address = match contract {
            ContractRef::Address(ref address) => Some(address),
            ContractRef::Source(_) => None,
        };
        file_config.remember(address, network, &analyzers);
        let path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        file_config.save(&path)?;
        info!("Saved analysis choices to {}", path.display());
    }

    let mut polling = config.polling.clone();
    if let Some(interval_ms) = analyze.interval_ms {
        polling.interval_ms = interval_ms;
    }

    let api = build_api(config)?;
    let client = AnalysisJobClient::from_config(api, &polling).with_priority(analyze.priority);

    println!("🔬 Submitting {} for analysis...", contract.label());
    println!("   Network: {}", network);
    println!("   Analyzers: {}", analyzers);

    let audit_id = client.submit_and_start(&contract, network, &analyzers).await?;
    if let Some(job) = client.job() {
        info!(
            "Audit {} queued: contract {} ({}) on {} with [{}]",
            job.id, job.contract_id, job.contract, job.network, job.analyzers
        );
    }
    let logger = tokio::spawn(log_events(client.events()));
    client.start_polling_default(audit_id)?;
    println!("   Audit ID: {}\n", audit_id);

    let bar = progress_bar(args.quiet, &contract);
    let follower = tokio::spawn(follow_progress(client.subscribe(), bar.clone()));

    let snapshot = tokio::select! {
        snapshot = client.wait_for_terminal() => snapshot,
        () = until_interrupted(tokio::signal::ctrl_c()) => {
            warn!("Interrupted, cancelling audit {}", audit_id);
            client.cancel(audit_id).await;
            client.snapshot()
        }
    };
    follower.abort();
    logger.abort();
    bar.finish_with_message(snapshot.state.describe());

    if snapshot.state != JobState::Completed {
        return Ok(report_unfinished(audit_id, &snapshot));
    }

    let result = client.fetch_results(audit_id).await?;

    let format = OutputFormat::resolve(analyze.format, &config.report.format);
    let output = output_path(analyze.output.clone(), config);
    let content = render(&[result.clone()], format)?;
    write_output(output.as_deref(), &content)?;

    print_summary(&result);
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    if let Some(fail_level) = analyze.fail_on {
        let threshold: Severity = fail_level.into();
        if result.has_issues_at_or_above(threshold) {
            eprintln!(
                "\n⛔ Findings at or above {} severity. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Turn CLI args, falling back to the remembered address, into a contract reference.
fn resolve_contract(analyze: &AnalyzeArgs, config: &Config) -> Result<ContractRef> {
    if let Some(ref source) = analyze.source {
        let contents = std::fs::read(source)
            .with_context(|| format!("Failed to read source file: {}", source.display()))?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        return Ok(ContractRef::Source(SourceBundle::new(file_name, contents)?));
    }

    let raw = analyze
        .address
        .as_deref()
        .or(config.analysis.contract_address.as_deref())
        .context("Provide --address or --source (no contract address remembered in config)")?;

    // Padding from the shell or the config file is dropped here, not in the parser.
    Ok(ContractRef::Address(ContractAddress::parse(raw.trim())?))
}

/// Resolve once `signal` reports an interrupt. If the handler cannot be
/// installed this never resolves, so the audit runs to completion.
async fn until_interrupted<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Ctrl-C handler unavailable, cancellation disabled: {}", e);
        std::future::pending::<()>().await;
    }
}

fn progress_bar(hidden: bool, contract: &ContractRef) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_prefix(match contract {
        ContractRef::Address(address) => address.short(),
        ContractRef::Source(bundle) => bundle.file_name.clone(),
    });
    pb.set_message(stage_message(0));
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

/// Mirror job snapshots onto the progress bar until the job finishes.
async fn follow_progress(mut rx: watch::Receiver<JobSnapshot>, bar: ProgressBar) {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        bar.set_position(u64::from(snapshot.progress));
        bar.set_message(stage_message(snapshot.progress));
        if snapshot.state.is_terminal() || rx.changed().await.is_err() {
            break;
        }
    }
}

/// Log lifecycle notifications as they arrive.
async fn log_events(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(JobEvent::Progress { job_id, progress }) => {
                debug!("Audit {}: {}% ({})", job_id, progress, stage_message(progress));
            }
            Ok(JobEvent::Completed { job_id }) => info!("Audit {} completed", job_id),
            Ok(JobEvent::Failed { job_id, reason }) => {
                warn!("Audit {} failed: {}", job_id, reason)
            }
            Ok(JobEvent::Errored { job_id, reason }) => {
                warn!("Audit {} errored: {}", job_id, reason)
            }
            Ok(JobEvent::Cancelled { job_id }) => info!("Audit {} cancelled", job_id),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Skipped {} job event(s)", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report_unfinished(audit_id: AuditId, snapshot: &JobSnapshot) -> i32 {
    match snapshot.last_error {
        Some(ref reason) => {
            error!("Audit {} ended as {}: {}", audit_id, snapshot.state, reason);
            eprintln!("\n❌ {}: {}", snapshot.state.describe(), reason);
        }
        None => {
            eprintln!("\n❌ {}", snapshot.state.describe());
        }
    }
    1
}

fn render(results: &[AnalysisResult], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json if results.len() == 1 => report::generate_json_report(&results[0]),
        OutputFormat::Json => report::generate_json_reports(results),
        OutputFormat::Markdown => Ok(results
            .iter()
            .map(report::generate_markdown_report)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("\n✅ Report saved to: {}", path.display());
        }
        None => println!("\n{}", content),
    }
    Ok(())
}

fn print_summary(result: &AnalysisResult) {
    let issues = &result.issues;
    println!("\n📊 Analysis Summary:");
    println!("   Contract: {}", result.display_name());
    println!("   Total issues: {}", result.total_issues());
    println!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {} | 🔵 Info: {}",
        issues.critical.count,
        issues.high.count,
        issues.medium.count,
        issues.low.count,
        issues.info.count
    );
}

async fn run_status(config: &Config, audit_id: AuditId) -> Result<i32> {
    let api = build_api(config)?;
    let status = api
        .audit_status(audit_id)
        .await
        .with_context(|| format!("Failed to get status of audit {}", audit_id))?;

    let progress = status.clamped_progress();
    println!("Audit {}: {} ({}%)", audit_id, status.status, progress);
    println!("   {}", stage_message(progress));
    if let Some(reason) = status.error {
        println!("   Error: {}", reason);
    }
    Ok(0)
}

/// Fetch several results concurrently, bounded by `general.concurrency`.
async fn run_results(
    config: &Config,
    audit_ids: &[AuditId],
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<i32> {
    let api = build_api(config)?;
    let concurrency = config.general.concurrency.max(1);
    info!(
        "Fetching {} result(s) with concurrency {}",
        audit_ids.len(),
        concurrency
    );

    let fetched = fetch_results_in_order(api.as_ref(), audit_ids, concurrency).await;

    let mut results = Vec::with_capacity(fetched.len());
    let mut failures = 0;
    for (audit_id, outcome) in fetched {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                failures += 1;
                error!("Failed to fetch results for audit {}: {}", audit_id, e);
                eprintln!("❌ Audit {}: {}", audit_id, e);
            }
        }
    }

    if !results.is_empty() {
        write_output(output.as_deref(), &render(&results, format)?)?;
    }

    Ok(if failures > 0 { 1 } else { 0 })
}

async fn run_cancel(config: &Config, audit_id: AuditId) -> Result<i32> {
    let api = build_api(config)?;
    api.cancel_audit(audit_id)
        .await
        .with_context(|| format!("Failed to cancel audit {}", audit_id))?;
    println!("✅ Cancellation requested for audit {}", audit_id);
    Ok(0)
}

async fn run_reports(
    config: &Config,
    page: usize,
    limit: usize,
    filter: ReportFilter,
    show: Option<ResultId>,
) -> Result<i32> {
    let api = build_api(config)?;
    let reports = api
        .list_reports(api::page_to_skip(page, limit), limit)
        .await
        .context("Failed to list reports")?;

    let mut store = ReportStore::new();
    // Keep the backend's order: adding oldest last puts it at the back.
    for report in reports.into_iter().rev() {
        store.add(report);
    }

    if let Some(id) = show {
        let result = store
            .get(id)
            .with_context(|| format!("Report {} is not on page {}", id, page))?;
        print!("{}", report::generate_markdown_report(result));
        return Ok(0);
    }

    store.set_filter(filter);
    let shown = store.filtered();

    println!(
        "Reports (page {}, {} per page, showing {} of {}):\n",
        page,
        limit,
        shown.len(),
        store.len()
    );
    print!("{}", report::generate_report_list(&shown));
    Ok(0)
}

async fn run_export(
    config: &Config,
    format: ExportFormat,
    output: &Path,
    skip: usize,
    limit: usize,
) -> Result<i32> {
    let api = build_api(config)?;
    let bytes = api
        .export_reports(format, skip, limit)
        .await
        .with_context(|| format!("Failed to export reports as {}", format.as_str()))?;

    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write export to {}", output.display()))?;
    println!(
        "✅ Exported {} bytes of {} to {}",
        bytes.len(),
        format.as_str().to_uppercase(),
        output.display()
    );
    Ok(0)
}

async fn run_stats(config: &Config, limit: usize, top: usize) -> Result<i32> {
    let api = build_api(config)?;
    let results = api
        .list_reports(0, limit)
        .await
        .context("Failed to list reports")?;

    let mut store = ReportStore::new();
    store.extend(results);

    let stats = analysis::Statistics::from_results(store.list(), top);
    println!("📊 Statistics over {} report(s)\n", store.len());
    println!("{}", analysis::generate_statistics_text(&stats));
    Ok(0)
}
