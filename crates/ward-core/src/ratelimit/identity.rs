//! Requester identity used to key rate-limit counters

use std::fmt;
use ward_types::UserId;

/// Sentinel used when no network origin is known
pub const UNKNOWN_ADDRESS: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequesterIdentity {
    /// Authenticated caller
    User(UserId),
    /// Anonymous caller, keyed by best-effort network origin
    Address(String),
}

impl RequesterIdentity {
    /// Authenticated callers are keyed by user id, anonymous ones by origin address
    pub fn resolve(
        user_id: Option<UserId>,
        forwarded_for: Option<&str>,
        remote_addr: Option<&str>,
    ) -> Self {
        match user_id {
            Some(id) => Self::User(id),
            None => Self::Address(client_ip(forwarded_for, remote_addr)),
        }
    }
}

impl fmt::Display for RequesterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Address(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// First `X-Forwarded-For` entry, else the direct peer address, else `unknown`
pub fn client_ip(forwarded_for: Option<&str>, remote_addr: Option<&str>) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| remote_addr.map(str::trim).filter(|ip| !ip.is_empty()))
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string()
}
