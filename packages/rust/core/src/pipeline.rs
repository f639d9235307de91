//! End-to-end lead pipeline: query → discovery → extraction → dedupe → scoring
//! → research → drafting → review → export.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use leadscout_discovery::{
    SearchProvider, TrialsProvider, build_search_provider, build_trials_provider,
    find_decision_makers,
};
use leadscout_llm::LlmClient;
use leadscout_shared::{
    AppConfig, Company, CompanyType, LeadReport, LeadScoutError, ResearchMode, Result, Stage,
};
use leadscout_storage::{ResearchNotes, ResponseCache, Storage};

use crate::dedupe;
use crate::drafting::{self, DraftSettings};
use crate::export::{self, ExportPaths};
use crate::extraction::{self, DiscoveryBatch};
use crate::operator::Operator;
use crate::query;
use crate::research::{self, ResearchContext};
use crate::review::{self, Regenerator, ReviewContext};
use crate::scoring;

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Provider clients and local state shared by every stage.
pub struct Services {
    pub llm: LlmClient,
    pub search: Box<dyn SearchProvider>,
    pub trials: Box<dyn TrialsProvider>,
    pub notes: ResearchNotes,
}

/// Open the local database, degrading to `None` when it cannot be opened.
pub async fn open_storage(config: &AppConfig) -> Option<Arc<Storage>> {
    let path = match config.cache.resolved_path() {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "cannot resolve cache path, running without local storage");
            return None;
        }
    };
    match Storage::open(&path).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "cannot open local storage, running without it");
            None
        }
    }
}

/// Response cache over `store`, honoring `cache.enabled` and the caller's opt-out.
pub async fn build_cache(config: &AppConfig, store: Option<Arc<Storage>>, use_cache: bool) -> ResponseCache {
    match store {
        Some(store) if use_cache && config.cache.enabled => {
            let cache = ResponseCache::new(Some(store), config.cache.ttl());
            let purged = cache.purge_expired().await;
            if purged > 0 {
                info!(purged, "purged expired cache entries");
            }
            cache
        }
        _ => ResponseCache::disabled(),
    }
}

impl Services {
    /// Build every provider from configuration. Missing API keys are errors.
    pub async fn from_config(config: &AppConfig, use_cache: bool) -> Result<Self> {
        let store = open_storage(config).await;
        let cache = build_cache(config, store.clone(), use_cache).await;
        Ok(Self {
            llm: LlmClient::from_config(config, cache.clone())?,
            search: build_search_provider(config, cache.clone())?,
            trials: build_trials_provider(config, cache)?,
            notes: ResearchNotes::new(store),
        })
    }
}

// ---------------------------------------------------------------------------
// Options, outcome, progress
// ---------------------------------------------------------------------------

/// Per-run settings; CLI flags layered over the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query: String,
    pub limit: usize,
    pub output_dir: PathBuf,
    pub research: ResearchMode,
    pub review: bool,
    pub auto_approve: bool,
    pub tool_version: String,
}

impl RunOptions {
    /// Options for `query` taken entirely from `config`.
    pub fn from_config(config: &AppConfig, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: config.defaults.result_limit,
            output_dir: PathBuf::from(&config.defaults.output_dir),
            research: config.pipeline.research,
            review: config.pipeline.review,
            auto_approve: config.pipeline.auto_approve,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Result of a run or a review session.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: LeadReport,
    pub paths: ExportPaths,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called per unit of work inside a stage.
    fn item(&self, detail: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _detail: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run the full pipeline and export the results.
///
/// Per-record and per-provider failures are recorded in the report summary
/// and never abort the run. Only an export failure is returned as an error.
#[instrument(skip_all, fields(query = %opts.query, limit = opts.limit))]
pub async fn run_pipeline(
    services: &Services,
    config: &AppConfig,
    opts: &RunOptions,
    operator: &mut dyn Operator,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    let start = Instant::now();
    let mut report = LeadReport::new(opts.query.trim(), &opts.tool_version);
    let pipeline = &config.pipeline;

    info!(query = %report.query, "starting lead pipeline");

    // --- Query expansion ---
    progress.phase("Expanding query");
    let expansion = query::propose_subqueries(&services.llm, &report.query, pipeline.max_subqueries).await;
    let proposed = match expansion {
        Ok(proposed) => proposed,
        Err(e) => {
            warn!(error = %e, "query expansion failed, using fallback angles");
            report.summary.failure(Stage::QueryExpansion, e.to_string());
            query::fallback_queries(&report.query, pipeline.max_subqueries)
        }
    };
    let queries = query::assemble(&report.query, proposed, pipeline.max_subqueries);
    report.summary.processed(Stage::QueryExpansion, queries.len());

    // --- Discovery ---
    progress.phase("Searching");
    let mut batches: Vec<(CompanyType, DiscoveryBatch)> = Vec::with_capacity(queries.len());
    for (i, q) in queries.iter().enumerate() {
        progress.item(q, i + 1, queries.len());
        let batch = discover(services, config, q, &mut report).await;
        record_batch(&mut report, &mut batches, CompanyType::Biotech, batch);
    }
    if pipeline.discover_vc_firms {
        progress.phase("Searching venture firms");
        for q in query::vc_queries(&report.query) {
            progress.item(&q, 0, 0);
            let batch = discover_vc(services, config, &q, &mut report).await;
            record_batch(&mut report, &mut batches, CompanyType::VcFirm, batch);
        }
    }

    // --- Extraction ---
    progress.phase("Extracting companies");
    let exclusions = &pipeline.exclude_companies;
    let mut extracted: Vec<Company> = Vec::new();
    for (i, (kind, batch)) in batches.iter().enumerate() {
        progress.item(&batch.query, i + 1, batches.len());
        match extraction::extract_batch(&services.llm, batch, exclusions, *kind).await {
            Ok(found) => {
                report.summary.processed(Stage::Extraction, found.companies.len());
                report.summary.skipped(Stage::Extraction, found.rejected.len());
                extracted.extend(found.companies);
            }
            Err(e) => {
                warn!(query = %batch.query, error = %e, "extraction failed for batch");
                report.summary.skipped(Stage::Extraction, 1);
                report.summary.failure(Stage::Extraction, format!("{}: {e}", batch.query));
            }
        }
    }

    // --- Deduplication ---
    progress.phase("Deduplicating");
    let before = extracted.len();
    let mut companies = dedupe::dedupe(extracted);
    report.summary.processed(Stage::Deduplication, companies.len());
    report.summary.skipped(Stage::Deduplication, before - companies.len());

    // Contact lookup for companies the model found no people for.
    let max_people = pipeline.max_decision_makers_per_company;
    for company in &mut companies {
        company.decision_makers.truncate(max_people);
        if !company.decision_makers.is_empty() {
            continue;
        }
        progress.item(&format!("contacts: {}", company.name), 0, 0);
        let lookup = find_decision_makers(
            services.search.as_ref(),
            &company.name,
            &company.key,
            company.company_type,
            max_people,
        );
        match lookup.await {
            Ok(people) => company.decision_makers = people,
            Err(e) => report
                .summary
                .failure(Stage::Extraction, format!("contact lookup for {}: {e}", company.name)),
        }
    }

    // --- Scoring ---
    progress.phase("Scoring");
    let total = companies.len();
    for (i, company) in companies.iter_mut().enumerate() {
        progress.item(&company.name, i + 1, total);
        let (score, reason) = match scoring::score_company(&services.llm, company, &report.query).await {
            Ok(scored) => scored,
            Err(e) => {
                report
                    .summary
                    .failure(Stage::Scoring, format!("{}: {e}; used rule score", company.name));
                scoring::rule_score(company, &report.query)
            }
        };
        company.set_score(score, reason);
        report.summary.processed(Stage::Scoring, 1);
    }
    let mut companies = scoring::rank(companies, opts.limit);
    report
        .summary
        .skipped(Stage::Scoring, total.saturating_sub(companies.len()));

    // --- Research ---
    if opts.research != ResearchMode::Off {
        progress.phase("Researching contacts");
        let ctx = ResearchContext {
            llm: &services.llm,
            search: services.search.as_ref(),
            notes: &services.notes,
        };
        research::research_companies(&ctx, &mut companies, opts.research, operator, &mut report.summary)
            .await;
    }

    // --- Drafting ---
    progress.phase("Drafting emails");
    let settings = DraftSettings {
        word_budget: pipeline.email_word_budget,
        sender: &config.sender,
    };
    let mut drafts =
        drafting::draft_all(&services.llm, &companies, &report.query, settings, &mut report.summary).await;

    // --- Review ---
    if opts.review {
        progress.phase("Reviewing drafts");
        let ctx = ReviewContext {
            llm: Regenerator::Client(&services.llm),
            query: &report.query,
            settings,
            max_regenerations: pipeline.max_regenerations,
        };
        review::review_drafts(&ctx, &companies, &mut drafts, operator, &mut report.summary).await;
    } else if opts.auto_approve {
        let approved = review::auto_approve(&mut drafts);
        report.summary.processed(Stage::Review, approved);
    } else {
        info!(pending = drafts.len(), "review disabled, drafts left pending");
    }

    report.companies = companies;
    report.drafts = drafts;

    // --- Export ---
    progress.phase("Exporting");
    let outcome = finish(report, &opts.output_dir, start)?;
    progress.done(&outcome);
    Ok(outcome)
}

fn record_batch(
    report: &mut LeadReport,
    batches: &mut Vec<(CompanyType, DiscoveryBatch)>,
    kind: CompanyType,
    batch: DiscoveryBatch,
) {
    if batch.is_empty() {
        report.summary.skipped(Stage::Discovery, 1);
    } else {
        report.summary.processed(Stage::Discovery, batch.len());
        batches.push((kind, batch));
    }
}

/// Web search only; venture firms have no trials of their own.
async fn discover_vc(services: &Services, config: &AppConfig, q: &str, report: &mut LeadReport) -> DiscoveryBatch {
    let hits = match services.search.search(q, config.search.results_per_query).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(query = q, provider = services.search.name(), error = %e, "venture search failed");
            report
                .summary
                .failure(Stage::Discovery, format!("{} search for `{q}`: {e}", services.search.name()));
            Vec::new()
        }
    };
    DiscoveryBatch {
        query: q.to_string(),
        hits,
        trials: Vec::new(),
    }
}

/// Web search then trials lookup for one query. Provider failures yield no records.
async fn discover(services: &Services, config: &AppConfig, q: &str, report: &mut LeadReport) -> DiscoveryBatch {
    let hits = match services.search.search(q, config.search.results_per_query).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(query = q, provider = services.search.name(), error = %e, "search failed");
            report
                .summary
                .failure(Stage::Discovery, format!("{} search for `{q}`: {e}", services.search.name()));
            Vec::new()
        }
    };
    let trials = match services.trials.search(q, config.trials.max_results).await {
        Ok(trials) => trials,
        Err(e) => {
            warn!(query = q, provider = services.trials.name(), error = %e, "trials lookup failed");
            report
                .summary
                .failure(Stage::Discovery, format!("{} lookup for `{q}`: {e}", services.trials.name()));
            Vec::new()
        }
    };
    DiscoveryBatch {
        query: q.to_string(),
        hits,
        trials,
    }
}

fn finish(mut report: LeadReport, dest: &Path, start: Instant) -> Result<RunOutcome> {
    report.updated_at = chrono::Utc::now();
    let paths = export::write_report(&report, dest)?;
    report.summary.processed(Stage::Export, paths.all().len());
    let elapsed = start.elapsed();
    info!(
        companies = report.companies.len(),
        drafts = report.drafts.len(),
        failures = report.summary.total_failures(),
        elapsed_ms = elapsed.as_millis() as u64,
        "pipeline complete"
    );
    Ok(RunOutcome {
        report,
        paths,
        elapsed,
    })
}

// ---------------------------------------------------------------------------
// review
// ---------------------------------------------------------------------------

/// Load a report written by an earlier run.
pub fn load_report(path: &Path) -> Result<LeadReport> {
    let json = std::fs::read_to_string(path).map_err(|e| LeadScoutError::io(path, e))?;
    LeadReport::from_json(&json)
}

/// Review the pending drafts of a saved report and rewrite its exports.
///
/// Exports go to `output_dir`, or next to the report when `None`. Without
/// `llm`, the model is built from `config` only if a draft is regenerated.
#[instrument(skip_all, fields(report = %report_path.display()))]
pub async fn resume_review(
    llm: Option<&LlmClient>,
    config: &AppConfig,
    report_path: &Path,
    output_dir: Option<&Path>,
    operator: &mut dyn Operator,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    let start = Instant::now();
    let mut report = load_report(report_path)?;
    let pending = report.pending_drafts();
    info!(pending, "resuming review");

    if pending > 0 {
        progress.phase("Reviewing drafts");
        let ctx = ReviewContext {
            llm: llm.map_or_else(|| Regenerator::deferred(config), Regenerator::Client),
            query: &report.query,
            settings: DraftSettings {
                word_budget: config.pipeline.email_word_budget,
                sender: &config.sender,
            },
            max_regenerations: config.pipeline.max_regenerations,
        };
        review::review_drafts(&ctx, &report.companies, &mut report.drafts, operator, &mut report.summary)
            .await;
    }

    let dest = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => report_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    };
    progress.phase("Exporting");
    let outcome = finish(report, &dest, start)?;
    progress.done(&outcome);
    Ok(outcome)
}
