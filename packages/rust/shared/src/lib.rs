//! Shared types, error model, and configuration for LeadScout.
//!
//! This crate is the foundation depended on by all other LeadScout crates.
//! It provides:
//! - [`LeadScoutError`]: the unified error type
//! - Domain types ([`Company`], [`DecisionMaker`], [`TrialRecord`], [`EmailDraft`], [`LeadReport`])
//! - Configuration ([`AppConfig`], config loading, API key validation)
//! - Outbound call plumbing ([`RetryPolicy`], [`RateLimiter`], [`http`] helpers)

pub mod config;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, DefaultsConfig, LlmConfig, LlmProviderKind, PipelineConfig,
    RateLimitConfig, ResearchMode, RetryConfig, SearchConfig, SearchProviderKind, SenderConfig,
    TrialsConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, required_api_keys, resolve_api_key, validate_api_keys, validate_settings,
};
pub use error::{LeadScoutError, Result};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use types::{
    CURRENT_SCHEMA_VERSION, Company, CompanyType, ContactHandle, DecisionMaker, DraftId, DraftTarget,
    EmailDraft, LeadReport, MAX_FIT_SCORE, ReviewState, RunSummary, SearchHit, Stage,
    StageSummary, TrialRecord, TrialStatus, clamp_score, parse_website,
};
