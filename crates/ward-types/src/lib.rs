//! Shared types for the ward letter service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strongly typed UserId (account of the actor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed LetterRequestId. Positive, allocated in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LetterRequestId(u64);

impl LetterRequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LetterRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed ResidentId (subject profile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResidentId(i64);

impl ResidentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ResidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed LetterTypeId
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LetterTypeId(i64);

impl LetterTypeId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LetterTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a wire string does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Local leader, approves and rejects letter requests
    Admin,
    Resident,
    /// Data entry clerk
    Clerk,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Resident => "resident",
            Self::Clerk => "clerk",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "resident" => Ok(Self::Resident),
            "clerk" => Ok(Self::Clerk),
            other => Err(ParseError::new("role", other)),
        }
    }
}

/// The authenticated caller of an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub email: Option<String>,
}

impl Actor {
    pub fn new(user_id: i64, username: &str, role: Role) -> Self {
        Self {
            user_id: UserId::new(user_id),
            username: username.to_string(),
            role,
            is_staff: false,
            email: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }
}

/// Letter request priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ParseError::new("priority", other)),
        }
    }
}

/// Letter request status. `Rejected` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl LetterStatus {
    pub const ALL: [LetterStatus; 4] = [
        LetterStatus::Pending,
        LetterStatus::Approved,
        LetterStatus::Rejected,
        LetterStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    /// Get directory name for file storage
    pub fn directory_name(&self) -> &'static str {
        self.as_str()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

impl fmt::Display for LetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LetterStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            other => Err(ParseError::new("letter status", other)),
        }
    }
}

/// Household a resident belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub household_number: String,
    pub street_name: String,
    pub house_number: String,
    pub ward: String,
}

/// Resident record a letter is issued about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub id: ResidentId,
    /// Account linked to this resident, if registered online
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub last_name: String,
    pub nida_number: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub household: Household,
}

impl SubjectProfile {
    pub fn full_name(&self) -> String {
        if self.middle_name.trim().is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            format!("{} {} {}", self.first_name, self.middle_name, self.last_name)
        }
    }
}

/// Kind of letter residents can request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterType {
    pub id: LetterTypeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Submission input for a new letter request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLetterRequest {
    pub letter_type_id: LetterTypeId,
    pub purpose: String,
    #[serde(default)]
    pub additional_info: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Record of the document produced for a completed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedLetter {
    pub reference_number: String,
    pub content: String,
    pub pdf_file: String,
    pub generated_at: DateTime<Utc>,
    pub generated_by: UserId,
}

/// Persistent letter request record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterRequest {
    pub id: LetterRequestId,
    pub requested_by: UserId,
    /// Where the approval notice goes
    #[serde(default)]
    pub requester_email: Option<String>,
    pub resident_id: ResidentId,
    pub letter_type_id: LetterTypeId,
    pub purpose: String,
    #[serde(default)]
    pub additional_info: String,
    pub priority: Priority,
    pub status: LetterStatus,
    pub approved_by: Option<UserId>,
    pub request_date: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub admin_notes: String,
    pub rejection_reason: Option<String>,
    pub generated_letter: Option<GeneratedLetter>,
}

impl LetterRequest {
    /// Build a fresh pending request for the given submission
    pub fn pending(
        id: LetterRequestId,
        requested_by: UserId,
        resident_id: ResidentId,
        submission: NewLetterRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requested_by,
            requester_email: None,
            resident_id,
            letter_type_id: submission.letter_type_id,
            purpose: submission.purpose.trim().to_string(),
            additional_info: submission.additional_info.trim().to_string(),
            priority: submission.priority,
            status: LetterStatus::Pending,
            approved_by: None,
            request_date: now,
            approval_date: None,
            completion_date: None,
            admin_notes: String::new(),
            rejection_reason: None,
            generated_letter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(middle: &str) -> SubjectProfile {
        SubjectProfile {
            id: ResidentId::new(1),
            user_id: Some(UserId::new(7)),
            first_name: "Amina".to_string(),
            middle_name: middle.to_string(),
            last_name: "Mushi".to_string(),
            nida_number: "19900101123450000123".to_string(),
            phone_number: None,
            email: None,
            household: Household {
                household_number: "HH001".to_string(),
                street_name: "Main Street".to_string(),
                house_number: "123".to_string(),
                ward: "Saranga".to_string(),
            },
        }
    }

    #[test]
    fn test_full_name_skips_empty_middle_name() {
        assert_eq!(profile("").full_name(), "Amina Mushi");
        assert_eq!(profile("Juma").full_name(), "Amina Juma Mushi");
    }

    #[test]
    fn test_status_wire_names() {
        for status in LetterStatus::ALL {
            assert_eq!(status.as_str().parse::<LetterStatus>().unwrap(), status);
        }
        let json = serde_json::to_string(&LetterStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert!(LetterStatus::Rejected.is_terminal());
        assert!(!LetterStatus::Approved.is_terminal());
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        let err = "mayor".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "unknown role: mayor");
    }

    #[test]
    fn test_pending_request_trims_input() {
        let submission = NewLetterRequest {
            letter_type_id: LetterTypeId::new(1),
            purpose: "  bank account opening ".to_string(),
            additional_info: String::new(),
            priority: Priority::default(),
        };
        let request = LetterRequest::pending(
            LetterRequestId::new(3),
            UserId::new(7),
            ResidentId::new(1),
            submission,
            Utc::now(),
        );
        assert_eq!(request.status, LetterStatus::Pending);
        assert_eq!(request.priority, Priority::Medium);
        assert_eq!(request.purpose, "bank account opening");
        assert!(request.approved_by.is_none());
    }
}
