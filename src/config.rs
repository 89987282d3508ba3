//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Conference provider (Zoom) connectivity settings.
///
/// The account id and Basic credential are loaded at runtime from
/// environment variables, not from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ZoomConfig {
    /// REST API base, overridable for tests.
    #[serde(default = "default_zoom_api_base")]
    pub api_base: String,
    /// OAuth token endpoint base, overridable for tests.
    #[serde(default = "default_zoom_oauth_base")]
    pub oauth_base: String,
    /// Account id for the `account_credentials` grant (populated at runtime).
    #[serde(skip)]
    pub account_id: String,
    /// Base64 `client_id:client_secret` Basic credential (populated at runtime).
    #[serde(skip)]
    pub client_credential: String,
    /// Recurring member-meeting id (populated at runtime).
    #[serde(skip)]
    pub member_meeting_id: String,
    /// Filter expression selecting members eligible for meeting registration.
    #[serde(default = "default_member_filter")]
    pub member_filter: String,
}

fn default_zoom_api_base() -> String {
    "https://api.zoom.us/v2".into()
}

fn default_zoom_oauth_base() -> String {
    "https://zoom.us".into()
}

fn default_member_filter() -> String {
    "expiration > '{now}' OR member_group = 'founder'".into()
}

/// SMS provider (OpenPhone) connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SmsConfig {
    /// REST API base, overridable for tests.
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
    /// API key sent in the `Authorization` header (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

fn default_sms_api_base() -> String {
    "https://api.openphone.com/v1".into()
}

/// Email provider (Brevo) connectivity and sender identity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EmailConfig {
    /// REST API base, overridable for tests.
    #[serde(default = "default_email_api_base")]
    pub api_base: String,
    /// API key sent in the `api-key` header (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
    /// Sender display name (populated at runtime).
    #[serde(skip)]
    pub sender_name: String,
    /// Sender address (populated at runtime).
    #[serde(skip)]
    pub sender_email: String,
    /// Reply-to display name (populated at runtime).
    #[serde(skip)]
    pub reply_name: String,
    /// Reply-to address (populated at runtime).
    #[serde(skip)]
    pub reply_email: String,
}

fn default_email_api_base() -> String {
    "https://api.brevo.com".into()
}

/// Per-pool worker tuning. Rates are requests per second with burst 1.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PoolTuning {
    /// Zoom pool rate (requests per second).
    #[serde(default = "default_zoom_rate")]
    pub zoom_rate_per_sec: f64,
    /// Zoom pool queue capacity.
    #[serde(default = "default_zoom_queue")]
    pub zoom_queue_capacity: usize,
    /// SMS pool rate (requests per second).
    #[serde(default = "default_sms_rate")]
    pub sms_rate_per_sec: f64,
    /// SMS pool queue capacity.
    #[serde(default = "default_sms_queue")]
    pub sms_queue_capacity: usize,
    /// Per-job execution timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
}

fn default_zoom_rate() -> f64 {
    20.0
}

fn default_zoom_queue() -> usize {
    10_000
}

fn default_sms_rate() -> f64 {
    3.0
}

fn default_sms_queue() -> usize {
    500
}

fn default_job_timeout() -> u64 {
    30
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            zoom_rate_per_sec: default_zoom_rate(),
            zoom_queue_capacity: default_zoom_queue(),
            sms_rate_per_sec: default_sms_rate(),
            sms_queue_capacity: default_sms_queue(),
            job_timeout_seconds: default_job_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_flush_interval() -> u64 {
    2
}

fn default_engine_window() -> u64 {
    30
}

/// Global configuration parsed from `config.toml` plus runtime environment.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the embedded record store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Conference provider settings.
    #[serde(default = "zoom_default")]
    pub zoom: ZoomConfig,
    /// SMS provider settings.
    #[serde(default = "sms_default")]
    pub sms: SmsConfig,
    /// Email provider settings.
    #[serde(default = "email_default")]
    pub email: EmailConfig,
    /// Worker-pool tuning.
    #[serde(default)]
    pub pools: PoolTuning,
    /// Status-aggregator flush interval in seconds.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
    /// Engine look-ahead window in minutes (also the tick period).
    #[serde(default = "default_engine_window")]
    pub engine_window_minutes: u64,
    /// Whether this deployment is production (populated at runtime).
    #[serde(skip)]
    pub is_prod: bool,
}

fn zoom_default() -> ZoomConfig {
    ZoomConfig {
        api_base: default_zoom_api_base(),
        oauth_base: default_zoom_oauth_base(),
        account_id: String::new(),
        client_credential: String::new(),
        member_meeting_id: String::new(),
        member_filter: default_member_filter(),
    }
}

fn sms_default() -> SmsConfig {
    SmsConfig {
        api_base: default_sms_api_base(),
        api_key: String::new(),
    }
}

fn email_default() -> EmailConfig {
    EmailConfig {
        api_base: default_email_api_base(),
        api_key: String::new(),
        sender_name: String::new(),
        sender_email: String::new(),
        reply_name: String::new(),
        reply_email: String::new(),
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            zoom: zoom_default(),
            sms: sms_default(),
            email: email_default(),
            pools: PoolTuning::default(),
            flush_interval_seconds: default_flush_interval(),
            engine_window_minutes: default_engine_window(),
            is_prod: false,
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Every tunable has a default, so an empty document is valid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load provider credentials and deployment identity from the environment.
    ///
    /// Required: `ZOOM_ID`, `ZOOM_CLIENT`, `MemberMeeting`,
    /// `OPENPHONE_API_KEY`, `BREVO_API_KEY`, `SENDER_NAME`, `SENDER_EMAIL`,
    /// `REPLY_NAME`, `REPLY_EMAIL`. Optional: `is_prod`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing variable.
    pub fn load_credentials(&mut self) -> Result<()> {
        self.zoom.account_id = required_env("ZOOM_ID")?;
        self.zoom.client_credential = required_env("ZOOM_CLIENT")?;
        self.zoom.member_meeting_id = required_env("MemberMeeting")?;
        self.sms.api_key = required_env("OPENPHONE_API_KEY")?;
        self.email.api_key = required_env("BREVO_API_KEY")?;
        self.email.sender_name = required_env("SENDER_NAME")?;
        self.email.sender_email = required_env("SENDER_EMAIL")?;
        self.email.reply_name = required_env("REPLY_NAME")?;
        self.email.reply_email = required_env("REPLY_EMAIL")?;
        self.is_prod = matches!(
            env::var("is_prod").as_deref(),
            Ok("true") | Ok("1") | Ok("yes")
        );
        Ok(())
    }

    /// Derived path for persisted record-store data.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    fn validate(&self) -> Result<()> {
        if self.pools.zoom_rate_per_sec <= 0.0 || self.pools.sms_rate_per_sec <= 0.0 {
            return Err(AppError::Config(
                "pool rates must be greater than zero".into(),
            ));
        }
        if self.pools.zoom_queue_capacity == 0 || self.pools.sms_queue_capacity == 0 {
            return Err(AppError::Config(
                "pool queue capacities must be greater than zero".into(),
            ));
        }
        if self.engine_window_minutes == 0 {
            return Err(AppError::Config(
                "engine_window_minutes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Read a required environment variable, rejecting empty values.
fn required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        Ok(_) => {
            warn!(key, "environment variable is set but empty");
            Err(AppError::Config(format!("env var {key} is empty")))
        }
        Err(_) => Err(AppError::Config(format!("env var {key} is not set"))),
    }
}
