//! Configuration management for the ward service

use crate::constants::*;
use crate::error::{Result, WardError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ward_types::Role;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardConfig {
    #[serde(default)]
    pub ward: WardInfoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Letterhead details printed on every generated document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardInfoConfig {
    #[serde(default = "default_office_name")]
    pub office_name: String,
    #[serde(default = "default_contact_line")]
    pub contact_line: String,
    /// Prefix for links placed in notification emails
    #[serde(default)]
    pub public_base_url: String,
}

impl Default for WardInfoConfig {
    fn default() -> Self {
        Self {
            office_name: default_office_name(),
            contact_line: default_contact_line(),
            public_base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file copied by the backup command
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Uploaded media copied by the backup command
    #[serde(default)]
    pub media_root: Option<PathBuf>,
    #[serde(default = "default_retention_days")]
    pub backup_retention_days: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            media_root: None,
            backup_retention_days: default_retention_days(),
        }
    }
}

/// Where rate-limit counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    #[default]
    Memory,
    Redis,
}

/// What the limiter does when the counter cache is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request and log a warning
    #[default]
    FailOpen,
    /// Refuse the request with a dependency failure
    FailClosed,
}

/// Limit for a single named limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub limit: u64,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub backend: CounterBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Roles that bypass every limiter, in addition to staff accounts
    #[serde(default)]
    pub exempt_roles: Vec<Role>,
    #[serde(default = "default_policies")]
    pub policies: HashMap<String, RateLimitPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackend::default(),
            redis_url: None,
            failure_policy: FailurePolicy::default(),
            exempt_roles: Vec::new(),
            policies: default_policies(),
        }
    }
}

impl RateLimitConfig {
    /// Policy for a limiter, falling back to the built-in defaults
    pub fn policy(&self, limiter: &str) -> Option<RateLimitPolicy> {
        self.policies
            .get(limiter)
            .copied()
            .or_else(|| default_policies().get(limiter).copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP mail relay endpoint. Without it notifications are skipped.
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Recipients of system alerts
    #[serde(default)]
    pub admins: Vec<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            api_key: None,
            from_address: default_from_address(),
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_document_timeout")]
    pub document_timeout_seconds: u64,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            document_timeout_seconds: default_document_timeout(),
            notification_timeout_seconds: default_notification_timeout(),
        }
    }
}

impl WorkflowConfig {
    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_timeout_seconds)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_seconds)
    }
}

// Default functions
fn default_office_name() -> String {
    "WARD ADMINISTRATION OFFICE".to_string()
}

fn default_contact_line() -> String {
    "Tel: +255 763 587 710 | Email: sarangakata@info.go.tz".to_string()
}

fn default_retention_days() -> u64 {
    DEFAULT_BACKUP_RETENTION_DAYS
}

fn default_from_address() -> String {
    "noreply@ward-system.go.tz".to_string()
}

fn default_document_timeout() -> u64 {
    DEFAULT_DOCUMENT_TIMEOUT_SECS
}

fn default_notification_timeout() -> u64 {
    DEFAULT_NOTIFICATION_TIMEOUT_SECS
}

fn default_policies() -> HashMap<String, RateLimitPolicy> {
    HashMap::from([
        (
            LETTER_REQUEST_LIMITER.to_string(),
            RateLimitPolicy {
                limit: LETTER_REQUEST_LIMIT,
                window_seconds: DEFAULT_WINDOW_SECONDS,
            },
        ),
        (
            LETTER_PDF_LIMITER.to_string(),
            RateLimitPolicy {
                limit: LETTER_PDF_LIMIT,
                window_seconds: DEFAULT_WINDOW_SECONDS,
            },
        ),
    ])
}

impl WardConfig {
    /// Load configuration from a JSON file, overridden by `WARD__*` environment variables
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WardError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix("WARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: WardConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()?;

        let config: WardConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ward.office_name.trim().is_empty() {
            return Err(WardError::Config("Ward office name is required".to_string()));
        }

        if self.rate_limit.backend == CounterBackend::Redis
            && self.rate_limit.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(WardError::Config(
                "Redis URL is required when the redis counter backend is selected".to_string(),
            ));
        }

        for (name, policy) in &self.rate_limit.policies {
            if policy.limit == 0 || policy.window_seconds == 0 {
                return Err(WardError::Config(format!(
                    "Rate limit policy {} requires a positive limit and window",
                    name
                )));
            }
        }

        if self.storage.backup_retention_days == 0 {
            return Err(WardError::Config(
                "Backup retention must be at least one day".to_string(),
            ));
        }

        if self.workflow.document_timeout_seconds == 0
            || self.workflow.notification_timeout_seconds == 0
        {
            return Err(WardError::Config(
                "Workflow timeouts must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
