//! RankAudit - uniformity auditor for randomized search results
//!
//! A CLI tool that repeatedly queries a search endpoint which claims to
//! shuffle its results, records the rank at which every identifier shows
//! up, and runs a chi-square test on each rank.
//!
//! Exit codes:
//!   0 - Success (or no --fail-on-bias set)
//!   1 - Runtime error (network, database, config, etc.)
//!   2 - Some rank rejected uniformity and --fail-on-bias was set

mod analysis;
mod cli;
mod config;
mod fetcher;
mod models;
mod report;
mod sampler;
mod store;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use fetcher::Fetcher;
use models::{Report, ReportMetadata, SamplePlan};
use sampler::{BarProgress, LogProgress, NullProgress, Progress, Sampler};
use std::time::Instant;
use store::RankStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("RankAudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .rankaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit [query] to point at the endpoint and pattern you want to audit.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run sampling and analysis. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;
    let table = config.store.table.clone();

    if args.dry_run {
        return handle_dry_run(&config).await;
    }

    let store = RankStore::open(&config.store.path)
        .await
        .with_context(|| format!("Failed to open database {}", config.store.path.display()))?;
    info!("Using database {} (table '{}')", config.store.path.display(), table);

    let mut plan: Option<SamplePlan> = None;
    let mut rounds_this_run = 0;

    if !args.analyze_only {
        let mut fetcher = Fetcher::new(config.fetcher_config())?;

        // Step 1: learn how many results a round holds
        println!("🔎 Probing {}", config.query.url);
        let num_results = Sampler::discover_ranks(&mut fetcher).await?;
        let sampler = Sampler::new(&store, table.clone());

        // Step 2: plan (--plan leaves the database untouched)
        let sample_plan = if args.plan {
            sampler
                .preview_plan(num_results, config.sampling.rank_to_check)
                .await?
        } else {
            store.ensure_schema(&table, num_results).await?;
            sampler
                .plan(num_results, config.sampling.rank_to_check)
                .await?
        };

        println!("\n📐 Sample plan (rank {}):", config.sampling.rank_to_check);
        println!("   Results per round: {}", sample_plan.num_results);
        println!("   Target rounds: {}", sample_plan.target);
        println!("   Already stored: {}", sample_plan.current);
        println!("   Additional rounds: {}", sample_plan.additional_rounds);

        if args.plan {
            return Ok(0);
        }
        plan = Some(sample_plan);

        // Step 3: collect
        let rounds = args.rounds.unwrap_or(sample_plan.additional_rounds);
        if rounds > 0 {
            println!(
                "\n📥 Collecting {} rounds ({} ms between requests)...",
                rounds, config.sampling.wait_ms
            );

            let mut progress: Box<dyn Progress> = if args.quiet {
                Box::new(NullProgress)
            } else if args.verbose {
                Box::new(LogProgress::new(config.sampling.progress_every))
            } else {
                Box::new(BarProgress::new())
            };

            let summary = sampler
                .collect(&mut fetcher, rounds, config.wait(), progress.as_mut())
                .await?;

            if summary.rounds_empty > 0 {
                warn!(
                    "{} of {} rounds matched no identifiers and were not recorded",
                    summary.rounds_empty, rounds
                );
            }
            rounds_this_run = summary.rounds_recorded;
        } else {
            println!("\n✅ Enough rounds stored; skipping collection.");
        }
    }

    // Step 4: analyze every rank
    let num_results = store
        .num_ranks(&table)
        .await?
        .ok_or_else(|| anyhow!("Table '{}' has no data yet; run a collection first", table))?;

    println!("\n🔬 Testing {} ranks for uniformity...", num_results);

    let identifiers = store.rows(&table).await?.len();
    let rounds_recorded = store.rounds_recorded(&table).await?;
    let tests = analysis::test_all_ranks(&store, &table, config.analysis.alpha)
        .await
        .context("Uniformity test failed")?;

    let report = Report {
        metadata: ReportMetadata {
            endpoint: config.query.url.clone(),
            table: table.clone(),
            num_results,
            identifiers,
            rounds_recorded,
            rounds_this_run,
            analysis_date: Utc::now(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        plan,
        tests,
    };

    if let Some(ref output_path) = args.output {
        let output = match args.format {
            OutputFormat::Json => report::generate_json_report(&report)?,
            OutputFormat::Markdown => report::generate_markdown_report(&report),
        };

        std::fs::write(output_path, &output)
            .with_context(|| format!("Failed to write report to {}", output_path.display()))?;
        info!("Report saved to {}", output_path.display());
    }

    // Print summary
    let biased = report.biased_ranks();
    println!("\n📊 Uniformity Summary:");
    println!("   Rounds recorded: {}", rounds_recorded);
    println!("   Identifiers seen: {}", identifiers);
    println!("   Significance level: {}", config.analysis.alpha);
    for test in &report.tests {
        let verdict = test.verdict();
        debug!(
            "rank {} chi2={:.3} df={} p={:.4}",
            test.rank, test.statistic, test.degrees_of_freedom, test.p_value
        );
        if test.rejects_uniformity() {
            println!(
                "   {} rank {}: chi2 = {:.2}, p = {:.4} ({})",
                verdict.emoji(),
                test.rank,
                test.statistic,
                test.p_value,
                verdict
            );
        }
    }
    println!(
        "   {} of {} ranks reject uniformity",
        biased.len(),
        report.tests.len()
    );
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    if args.fail_on_bias && !biased.is_empty() {
        eprintln!("\n⛔ Bias detected at {} ranks. Failing (exit code 2).", biased.len());
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: fetch one round and print it.
async fn handle_dry_run(config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: one request to {} (no database writes)...\n", config.query.url);

    let fetcher = Fetcher::new(config.fetcher_config())?;
    let ids = fetcher.fetch().await?;

    if ids.is_empty() {
        println!("   Pattern matched nothing. Check [query] pattern in the config.");
    } else {
        println!("   {} identifiers in server order:\n", ids.len());
        for (rank, id) in ids.iter().enumerate() {
            println!("     {:>4}  {}", rank, id);
        }
    }

    println!("\n✅ Dry run complete.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e.context(format!("{} exists but could not be loaded", CONFIG_FILE))),
    }
}
