//! Ward Core Library
//!
//! Business logic of the ward office letter service: rate limiting,
//! authorization, the letter request workflow, document rendering,
//! notifications and backups.

pub mod authz;
pub mod backup;
pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod letters;
pub mod notify;
pub mod paths;
pub mod ratelimit;
pub mod validators;

// Re-export main types for easy access
pub use config::WardConfig;
pub use error::{Result, WardError};

pub use authz::{Action, AuthorizationPolicy, RolePolicy};
pub use backup::{BackupReport, BackupRunner};
pub use letters::{
    ApprovalOutcome, FileLetterStore, GeneratedDocument, LetterStore, LetterWorkflow,
    MemoryLetterStore, NotificationOutcome, StaticDirectory, SubjectDirectory,
};
pub use notify::{notifier_from_config, Notifier};
pub use ratelimit::{
    CounterCache, Decision, MemoryCounterCache, RateLimiter, RedisCounterCache,
    RequesterIdentity,
};
