//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadscout_core::pipeline::{
    ProgressReporter, RunOptions, RunOutcome, Services, open_storage,
};
use leadscout_discovery::{build_search_provider, build_trials_provider};
use leadscout_llm::{LlmClient, Prompt};
use leadscout_shared::{
    AppConfig, ResearchMode, ReviewState, init_config, load_config, load_config_from,
    validate_api_keys, validate_settings,
};
use leadscout_storage::ResponseCache;
use tracing::info;

use crate::prompt::TerminalOperator;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadScout: find biotech partnering leads and draft outreach.
#[derive(Parser)]
#[command(
    name = "leadscout",
    version,
    about = "Find biotech companies with stalled programs, score them and draft outreach emails.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.leadscout/leadscout.toml).
    #[arg(long, global = true, env = "LEADSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Research mode flag.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ResearchArg {
    Off,
    Manual,
    Auto,
}

impl From<ResearchArg> for ResearchMode {
    fn from(arg: ResearchArg) -> Self {
        match arg {
            ResearchArg::Off => ResearchMode::Off,
            ResearchArg::Manual => ResearchMode::Manual,
            ResearchArg::Auto => ResearchMode::Auto,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for a therapeutic-area query.
    Run {
        /// Therapeutic-area query, e.g. "diabetes phase 2 failures".
        query: String,

        /// Maximum number of companies to keep.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output directory for exports.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// How research notes are gathered.
        #[arg(long, value_enum)]
        research: Option<ResearchArg>,

        /// Leave drafts pending instead of reviewing them now.
        #[arg(long)]
        no_review: bool,

        /// Approve every draft without review.
        #[arg(long)]
        auto_approve: bool,

        /// Bypass the response cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// Validate configuration and exercise every provider.
    ConfigCheck,

    /// Review pending drafts of an earlier run and rewrite its exports.
    Review {
        /// Path to a `<stem>_report.json` file.
        report: PathBuf,

        /// Output directory (defaults to the report's directory).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Response cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Remove every cached provider response.
    Clear,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so prompts stay readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadscout=info",
        1 => "leadscout=debug",
        _ => "leadscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            query,
            limit,
            out,
            research,
            no_review,
            auto_approve,
            no_cache,
        } => {
            let config = load(config_path)?;
            let mut opts = RunOptions::from_config(&config, query);
            if let Some(limit) = limit {
                opts.limit = limit;
            }
            if let Some(out) = out {
                opts.output_dir = out;
            }
            if let Some(research) = research {
                opts.research = research.into();
            }
            if no_review || auto_approve {
                opts.review = false;
            }
            opts.auto_approve |= auto_approve;
            cmd_run(&config, opts, !no_cache).await
        }
        Command::ConfigCheck => cmd_config_check(&load(config_path)?).await,
        Command::Review { report, out } => cmd_review(&load(config_path)?, &report, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&load(config_path)?).await,
        },
        Command::Cache { action } => match action {
            CacheAction::Clear => cmd_cache_clear(&load(config_path)?).await,
        },
    }
}

/// Load the config file and reject unusable settings.
fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    validate_settings(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, opts: RunOptions, use_cache: bool) -> Result<()> {
    if opts.query.trim().is_empty() {
        return Err(eyre!("query must not be empty"));
    }
    if opts.limit == 0 {
        return Err(eyre!("--limit must be at least 1"));
    }
    // Report every missing key before doing anything
    validate_api_keys(config)?;

    info!(
        query = %opts.query,
        limit = opts.limit,
        research = ?opts.research,
        review = opts.review,
        "starting run"
    );

    let services = Services::from_config(config, use_cache).await?;
    let reporter = CliProgress::new();
    let mut operator = TerminalOperator::new(reporter.spinner.clone())?;

    let outcome =
        leadscout_core::pipeline::run_pipeline(&services, config, &opts, &mut operator, &reporter).await;
    reporter.spinner.finish_and_clear();
    let outcome = outcome?;

    print_outcome("Run complete", &outcome);
    Ok(())
}

async fn cmd_review(config: &AppConfig, report: &Path, out: Option<&Path>) -> Result<()> {
    if !report.is_file() {
        return Err(eyre!("report '{}' not found", report.display()));
    }

    let reporter = CliProgress::new();
    let mut operator = TerminalOperator::new(reporter.spinner.clone())?;

    // The model is only needed if the operator asks for a regeneration.
    let outcome = leadscout_core::pipeline::resume_review(
        None,
        config,
        report,
        out,
        &mut operator,
        &reporter,
    )
    .await;
    reporter.spinner.finish_and_clear();
    let outcome = outcome?;

    print_outcome("Review complete", &outcome);
    Ok(())
}

/// One small uncached call per provider.
async fn cmd_config_check(config: &AppConfig) -> Result<()> {
    let mut failed = 0;

    failed += check_line("api keys", api_keys_status(config));

    let cache = ResponseCache::disabled();

    let llm = match LlmClient::from_config(config, cache.clone()) {
        Ok(llm) => llm
            .complete(&Prompt::new("Reply with the single word OK.", "ping").uncached())
            .await
            .map(|_| format!("{} / {}", llm.provider(), llm.model_name())),
        Err(e) => Err(e),
    };
    failed += check_line("llm", llm);

    let search = match build_search_provider(config, cache.clone()) {
        Ok(provider) => provider
            .search("biotech licensing", 1)
            .await
            .map(|hits| format!("{} ({} result)", config.search.provider.as_str(), hits.len())),
        Err(e) => Err(e),
    };
    failed += check_line("search", search);

    let trials = match build_trials_provider(config, cache) {
        Ok(provider) => provider
            .search("diabetes", 1)
            .await
            .map(|found| format!("clinicaltrials.gov ({} record)", found.len())),
        Err(e) => Err(e),
    };
    failed += check_line("trials", trials);

    match config.cache.resolved_path() {
        Ok(path) if open_storage(config).await.is_some() => {
            println!("  cache      ok ({})", path.display())
        }
        Ok(path) => println!("  cache      unavailable at {}, runs will not cache", path.display()),
        Err(e) => println!("  cache      {e}"),
    }

    if failed > 0 {
        return Err(eyre!("{failed} check(s) failed"));
    }
    Ok(())
}

fn api_keys_status(config: &AppConfig) -> leadscout_shared::Result<String> {
    validate_api_keys(config).map(|()| "all set".to_string())
}

fn check_line(name: &str, result: leadscout_shared::Result<String>) -> usize {
    match result {
        Ok(detail) => {
            println!("  {name:<10} ok     {detail}");
            0
        }
        Err(e) => {
            println!("  {name:<10} FAILED {e}");
            1
        }
    }
}

async fn cmd_cache_clear(config: &AppConfig) -> Result<()> {
    let path = config.cache.resolved_path()?;
    let Some(store) = open_storage(config).await else {
        return Err(eyre!("cannot open cache at {}", path.display()));
    };
    let removed = store.cache_clear().await?;
    println!("Removed {removed} cached response(s) from {}", path.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_outcome(title: &str, outcome: &RunOutcome) {
    let report = &outcome.report;
    let count = |state: ReviewState| report.drafts.iter().filter(|d| d.state == state).count();
    let exported = report.drafts.iter().filter(|d| d.state.is_exportable()).count();

    println!();
    println!("  {title}!");
    println!("  Query:     {}", report.query);
    println!("  Companies: {}", report.companies.len());
    println!(
        "  Drafts:    {} ({exported} exported, {} pending, {} skipped)",
        report.drafts.len(),
        count(ReviewState::Pending),
        count(ReviewState::Skipped)
    );
    println!("  Time:      {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
    println!("  {:<16} {:>9} {:>8} {:>9}", "stage", "processed", "skipped", "failures");
    for stage in &report.summary.stages {
        println!(
            "  {:<16} {:>9} {:>8} {:>9}",
            stage.stage.as_str(),
            stage.processed,
            stage.skipped,
            stage.failures.len()
        );
    }
    let failures: Vec<_> = report
        .summary
        .stages
        .iter()
        .flat_map(|s| s.failures.iter().map(move |f| (s.stage, f)))
        .collect();
    if !failures.is_empty() {
        println!();
        println!("  Failures:");
        for (stage, message) in failures {
            println!("    [{stage}] {message}");
        }
    }
    println!();
    for path in outcome.paths.all() {
        println!("  Wrote {}", path.display());
    }
    if count(ReviewState::Pending) > 0 {
        println!();
        println!(
            "  Review pending drafts with: leadscout review {}",
            outcome.paths.report.display()
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, detail: &str, current: usize, total: usize) {
        if total > 0 {
            self.spinner.set_message(format!("[{current}/{total}] {detail}"));
        } else {
            self.spinner.set_message(detail.to_string());
        }
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}
