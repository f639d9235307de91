//! Application configuration for LeadScout.
//!
//! User config lives at `~/.leadscout/leadscout.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the environment variables
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadscout";

/// Default cache database file name inside the config directory.
const CACHE_FILE_NAME: &str = "cache.db";

// ---------------------------------------------------------------------------
// Config structs (matching leadscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Language-model provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Clinical-trials registry settings.
    #[serde(default)]
    pub trials: TrialsConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy for outbound calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Outbound call pacing.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Who the outreach emails are signed by.
    #[serde(default)]
    pub sender: SenderConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory export files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Maximum number of companies a run keeps.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            result_limit: default_result_limit(),
        }
    }
}

fn default_output_dir() -> String {
    "./leadscout-output".into()
}
fn default_result_limit() -> usize {
    10
}

/// Supported language-model vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Anthropic,
    OpenAi,
    OpenRouter,
    Gemini,
}

impl LlmProviderKind {
    /// Env var conventionally holding this vendor's key.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }

    /// Model used when the config does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o-mini",
            Self::OpenRouter => "moonshotai/kimi-k2.5",
            Self::Gemini => "gemini-1.5-flash",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Gemini => "gemini",
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which vendor to talk to.
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProviderKind,

    /// Model id. Falls back to the vendor default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Name of the env var holding the API key. Falls back to the vendor default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Override of the vendor endpoint (proxies, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum tokens the model may generate per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            api_key_env: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// Resolved model id.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Resolved env var name for the API key.
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

fn default_llm_provider() -> LlmProviderKind {
    LlmProviderKind::Anthropic
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.4
}

/// Supported web search vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    SerpApi,
    Brave,
}

impl SearchProviderKind {
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::SerpApi => "SERPAPI_KEY",
            Self::Brave => "BRAVE_SEARCH_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SerpApi => "serpapi",
            Self::Brave => "brave",
        }
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: SearchProviderKind,

    /// Name of the env var holding the API key. Falls back to the vendor default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Results requested per search call.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key_env: None,
            base_url: None,
            results_per_query: default_results_per_query(),
        }
    }
}

impl SearchConfig {
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

fn default_search_provider() -> SearchProviderKind {
    SearchProviderKind::SerpApi
}
fn default_results_per_query() -> usize {
    10
}

/// `[trials]` section. ClinicalTrials.gov needs no key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialsConfig {
    #[serde(default = "default_trials_base_url")]
    pub base_url: String,

    /// Registry `overallStatus` filter; empty disables filtering.
    #[serde(default = "default_status_filter")]
    pub status_filter: String,

    #[serde(default = "default_trials_max_results")]
    pub max_results: usize,
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self {
            base_url: default_trials_base_url(),
            status_filter: default_status_filter(),
            max_results: default_trials_max_results(),
        }
    }
}

fn default_trials_base_url() -> String {
    "https://clinicaltrials.gov/api/v2/studies".into()
}
fn default_status_filter() -> String {
    "TERMINATED,SUSPENDED,WITHDRAWN".into()
}
fn default_trials_max_results() -> usize {
    20
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database path. Defaults to `~/.leadscout/cache.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Entry time-to-live in hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheConfig {
    /// Resolved database path.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(expand_home(p)),
            None => Ok(config_dir()?.join(CACHE_FILE_NAME)),
        }
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

fn default_true() -> bool {
    true
}
fn default_ttl_hours() -> u64 {
    24
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum calls per minute to a single provider. `0` disables pacing.
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
        }
    }
}

fn default_calls_per_minute() -> u32 {
    30
}

/// How the research stage gathers notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    /// Skip research entirely.
    Off,
    /// Prompt the operator for notes.
    Manual,
    /// Synthesize notes from a news search and the model.
    Auto,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_subqueries")]
    pub max_subqueries: usize,

    #[serde(default = "default_max_decision_makers")]
    pub max_decision_makers_per_company: usize,

    /// Drafts longer than this many words are flagged.
    #[serde(default = "default_word_budget")]
    pub email_word_budget: usize,

    /// How many times one contact's draft may be regenerated.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,

    #[serde(default = "default_research_mode")]
    pub research: ResearchMode,

    /// Whether drafts go through interactive review.
    #[serde(default = "default_true")]
    pub review: bool,

    /// Approve every draft when review is disabled.
    #[serde(default)]
    pub auto_approve: bool,

    /// Company names (whole-word, case-insensitive) never kept as leads.
    #[serde(default = "default_exclusions")]
    pub exclude_companies: Vec<String>,

    /// Also look for biotech-focused venture firms.
    #[serde(default = "default_true")]
    pub discover_vc_firms: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_subqueries: default_max_subqueries(),
            max_decision_makers_per_company: default_max_decision_makers(),
            email_word_budget: default_word_budget(),
            max_regenerations: default_max_regenerations(),
            research: default_research_mode(),
            review: true,
            auto_approve: false,
            exclude_companies: default_exclusions(),
            discover_vc_firms: true,
        }
    }
}

fn default_max_subqueries() -> usize {
    3
}
fn default_max_decision_makers() -> usize {
    3
}
fn default_word_budget() -> usize {
    100
}
fn default_max_regenerations() -> u32 {
    2
}
fn default_research_mode() -> ResearchMode {
    ResearchMode::Manual
}
fn default_exclusions() -> Vec<String> {
    [
        "pfizer",
        "novartis",
        "roche",
        "sanofi",
        "glaxosmithkline",
        "astrazeneca",
        "merck",
        "eli lilly",
        "bristol myers",
        "johnson & johnson",
        "bayer",
        "boehringer",
        "takeda",
        "abbvie",
        "regeneron",
        "gilead",
        "amgen",
        "biogen",
        "moderna",
        "novo nordisk",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[sender]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_sender_name")]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub email: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            name: default_sender_name(),
            title: String::new(),
            company: String::new(),
            email: String::new(),
        }
    }
}

fn default_sender_name() -> String {
    "Business Development".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadscout/leadscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Env vars the configured providers need, as `(purpose, var_name)` pairs.
pub fn required_api_keys(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("language model", config.llm.api_key_env().to_string()),
        ("web search", config.search.api_key_env().to_string()),
    ]
}

/// Check that every required API key env var is set and non-empty.
///
/// Reports all missing variables in one error rather than stopping at the first.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    let missing: Vec<String> = required_api_keys(config)
        .into_iter()
        .filter(|(_, var)| !matches!(std::env::var(var), Ok(v) if !v.is_empty()))
        .map(|(purpose, var)| format!("{var} ({purpose})"))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(LeadScoutError::config(format!(
        "missing required environment variables: {}",
        missing.join(", ")
    )))
}

/// Check numeric settings that would make the pipeline misbehave.
pub fn validate_settings(config: &AppConfig) -> Result<()> {
    let mut problems = Vec::new();
    if config.retry.max_attempts == 0 {
        problems.push("retry.max_attempts must be at least 1");
    }
    if config.defaults.result_limit == 0 {
        problems.push("defaults.result_limit must be at least 1");
    }
    if config.search.results_per_query == 0 {
        problems.push("search.results_per_query must be at least 1");
    }
    if config.pipeline.email_word_budget == 0 {
        problems.push("pipeline.email_word_budget must be at least 1");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(LeadScoutError::config(problems.join("; ")))
    }
}

/// Read an API key from the env var `var_name`.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LeadScoutError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
