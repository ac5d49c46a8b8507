use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::score::dimensions;
use super::stage;

/// Main configuration structure for gatekeep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transform fidelity scoring
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Regression runner
    #[serde(default)]
    pub regression: RegressionConfig,

    /// Improvement cycle guardrails and signal mapping
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Drift detection
    #[serde(default)]
    pub drift: DriftConfig,

    /// Capture ingestion and retention
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Notification sink
    #[serde(default)]
    pub notify: NotifyConfig,

    /// External transform, pipeline and proposer
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".gatekeep/gatekeep.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Transform fidelity scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    /// Overall score at or above which a fixture passes
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Hard delivery limit in characters
    #[serde(default = "default_delivery_limit")]
    pub delivery_limit: usize,

    /// Length of the input tail that counts as an echo when repeated
    #[serde(default = "default_echo_min_chars")]
    pub echo_min_chars: usize,

    /// Low-level markers that must never reach the user
    #[serde(default = "default_forbidden_markers")]
    pub forbidden_markers: Vec<String>,

    /// Regexes for filler phrases; each match costs 0.1
    #[serde(default = "default_noise_patterns")]
    pub noise_patterns: Vec<String>,
}

const fn default_pass_threshold() -> f64 {
    0.90
}

const fn default_delivery_limit() -> usize {
    2000
}

const fn default_echo_min_chars() -> usize {
    16
}

fn default_forbidden_markers() -> Vec<String> {
    [
        "<|im_start|>",
        "<|im_end|>",
        "<|endoftext|>",
        "</s>",
        "<think>",
        "</think>",
        "<tool_call>",
        "</tool_call>",
        "[TOOL_CALL]",
        "[/TOOL_CALL]",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_noise_patterns() -> Vec<String> {
    [
        r"(?i)\bas an ai\b",
        r"(?i)\bi hope this helps\b",
        r"(?i)\blet me know if you have any (other )?questions\b",
        r"(?i)\bfeel free to ask\b",
        r"\[object Object\]",
        r"\bundefined\b",
        r"\bNaN\b",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            delivery_limit: default_delivery_limit(),
            echo_min_chars: default_echo_min_chars(),
            forbidden_markers: default_forbidden_markers(),
            noise_patterns: default_noise_patterns(),
        }
    }
}

/// Regression runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegressionConfig {
    /// Fixtures transformed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-fixture transform timeout
    #[serde(default = "default_transform_timeout_secs")]
    pub transform_timeout_secs: u64,

    /// Number of failing fixtures listed in a report
    #[serde(default = "default_top_failing")]
    pub top_failing: usize,
}

const fn default_concurrency() -> usize {
    8
}

const fn default_transform_timeout_secs() -> u64 {
    30
}

const fn default_top_failing() -> usize {
    10
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            transform_timeout_secs: default_transform_timeout_secs(),
            top_failing: default_top_failing(),
        }
    }
}

/// Improvement cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CycleConfig {
    /// Maximum changed lines per cycle
    #[serde(default = "default_max_diff_lines")]
    pub max_diff_lines: usize,

    /// Budget for Implement + Validate
    #[serde(default = "default_wall_clock_budget_secs")]
    pub wall_clock_budget_secs: u64,

    /// Commits allowed before a human checkpoint is required
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Minimum overall score gain that counts as an improvement
    #[serde(default = "default_min_score_delta")]
    pub min_score_delta: f64,

    /// Lifetime of the single-writer lease
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// How far back Review looks for drift records
    #[serde(default = "default_drift_lookback_hours")]
    pub drift_lookback_hours: i64,

    /// Lines matching this regex are treated as stage signatures
    #[serde(default = "default_signature_pattern")]
    pub signature_pattern: String,

    /// Lines matching this regex are treated as dependency declarations
    #[serde(default = "default_dependency_pattern")]
    pub dependency_pattern: String,

    /// Fixture dimension -> stage responsible for it
    #[serde(default = "default_dimension_stages")]
    pub dimension_stages: BTreeMap<String, String>,

    /// Drift recommended action -> stage that can act on it
    #[serde(default = "default_drift_action_stages")]
    pub drift_action_stages: BTreeMap<String, String>,
}

const fn default_max_diff_lines() -> usize {
    100
}

const fn default_wall_clock_budget_secs() -> u64 {
    600
}

const fn default_checkpoint_interval() -> u32 {
    5
}

const fn default_min_score_delta() -> f64 {
    0.005
}

const fn default_lease_ttl_secs() -> u64 {
    900
}

const fn default_drift_lookback_hours() -> i64 {
    24
}

fn default_signature_pattern() -> String {
    r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(fn|def|function)\s+\w+".to_string()
}

fn default_dependency_pattern() -> String {
    r"^\s*(extern\s+crate|import|from\s+\S+\s+import|require\s*\()".to_string()
}

fn default_dimension_stages() -> BTreeMap<String, String> {
    [
        (dimensions::CONTENT_PRESERVATION, stage::CONTENT_EXTRACTION),
        (dimensions::ARTIFACT_CLEANLINESS, stage::ARTIFACT_STRIPPING),
        (dimensions::ECHO_REMOVAL, stage::ECHO_REMOVAL),
        (dimensions::STRUCTURAL_INTEGRITY, stage::STRUCTURE_REPAIR),
        (dimensions::LENGTH_COMPLIANCE, stage::LENGTH_LIMITING),
        (dimensions::NOISE_REMOVAL, stage::NOISE_FILTERING),
    ]
    .iter()
    .map(|(d, s)| ((*d).to_string(), (*s).to_string()))
    .collect()
}

fn default_drift_action_stages() -> BTreeMap<String, String> {
    [
        ("reinforce_section", stage::PROMPT_INSTRUCTIONS),
        ("reinforce_formatting", stage::STRUCTURE_REPAIR),
        ("review_empty_data_handling", stage::LENGTH_LIMITING),
    ]
    .iter()
    .map(|(a, s)| ((*a).to_string(), (*s).to_string()))
    .collect()
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_diff_lines: default_max_diff_lines(),
            wall_clock_budget_secs: default_wall_clock_budget_secs(),
            checkpoint_interval: default_checkpoint_interval(),
            min_score_delta: default_min_score_delta(),
            lease_ttl_secs: default_lease_ttl_secs(),
            drift_lookback_hours: default_drift_lookback_hours(),
            signature_pattern: default_signature_pattern(),
            dependency_pattern: default_dependency_pattern(),
            dimension_stages: default_dimension_stages(),
            drift_action_stages: default_drift_action_stages(),
        }
    }
}

/// Drift detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriftConfig {
    /// Sweep window over recent captures
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,

    /// Evaluations run concurrently during a sweep
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

const fn default_window_hours() -> i64 {
    24
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            concurrency: default_concurrency(),
        }
    }
}

/// Capture ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureConfig {
    /// Bounded retry queue capacity; oldest entries are dropped when full
    #[serde(default = "default_retry_capacity")]
    pub retry_capacity: usize,

    /// Interval between retry queue drains
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// Attempts before a capture is dropped
    #[serde(default = "default_capture_max_retries")]
    pub max_retries: u32,

    /// Retention for captures with no quality flag
    #[serde(default = "default_clean_retention_days")]
    pub clean_retention_days: i64,

    /// Retention for flagged captures
    #[serde(default = "default_flagged_retention_days")]
    pub flagged_retention_days: i64,
}

const fn default_retry_capacity() -> usize {
    1000
}

const fn default_retry_interval_secs() -> u64 {
    30
}

const fn default_capture_max_retries() -> u32 {
    5
}

const fn default_clean_retention_days() -> i64 {
    14
}

const fn default_flagged_retention_days() -> i64 {
    90
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            retry_capacity: default_retry_capacity(),
            retry_interval_secs: default_retry_interval_secs(),
            max_retries: default_capture_max_retries(),
            clean_retention_days: default_clean_retention_days(),
            flagged_retention_days: default_flagged_retention_days(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotifyConfig {
    /// Webhook receiving JSON events; events are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Request timeout
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,

    /// Give up retrying after this long
    #[serde(default = "default_notify_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

const fn default_notify_timeout_secs() -> u64 {
    10
}

const fn default_notify_max_elapsed_secs() -> u64 {
    60
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notify_timeout_secs(),
            max_elapsed_secs: default_notify_max_elapsed_secs(),
        }
    }
}

/// External collaborators configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Command that reads an input on stdin and writes the transformed output
    #[serde(default)]
    pub transform_command: Option<String>,

    #[serde(default)]
    pub transform_args: Vec<String>,

    /// Directory holding one file per stage plus the `stages` manifest
    #[serde(default = "default_stages_dir")]
    pub stages_dir: String,

    /// Command that reads a plan on stdin and writes a change proposal
    #[serde(default)]
    pub proposer_command: Option<String>,

    #[serde(default)]
    pub proposer_args: Vec<String>,

    /// Timeout for one proposer invocation
    #[serde(default = "default_proposer_timeout_secs")]
    pub proposer_timeout_secs: u64,
}

fn default_stages_dir() -> String {
    ".gatekeep/pipeline".to_string()
}

const fn default_proposer_timeout_secs() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transform_command: None,
            transform_args: Vec::new(),
            stages_dir: default_stages_dir(),
            proposer_command: None,
            proposer_args: Vec::new(),
            proposer_timeout_secs: default_proposer_timeout_secs(),
        }
    }
}
