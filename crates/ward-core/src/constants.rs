/// Service-wide constants

/// Limiter guarding letter request submission
pub const LETTER_REQUEST_LIMITER: &str = "letter_request";

/// Limiter guarding PDF generation
pub const LETTER_PDF_LIMITER: &str = "letter_pdf";

/// Submissions allowed per requester per window
pub const LETTER_REQUEST_LIMIT: u64 = 10;

/// PDF downloads allowed per requester per window
pub const LETTER_PDF_LIMIT: u64 = 20;

/// One hour windows for both default limiters
pub const DEFAULT_WINDOW_SECONDS: u64 = 3600;

/// Prefix of printed reference numbers, e.g. `WRD/000042/2024`
pub const REFERENCE_PREFIX: &str = "WRD";

/// Zero padding width of the sequence part of a reference number
pub const REFERENCE_SEQUENCE_WIDTH: usize = 6;

pub const DEFAULT_DOCUMENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 10;

/// Backups older than this are pruned
pub const DEFAULT_BACKUP_RETENTION_DAYS: u64 = 30;

/// National identity numbers are exactly this many digits
pub const NIDA_NUMBER_LENGTH: usize = 20;
