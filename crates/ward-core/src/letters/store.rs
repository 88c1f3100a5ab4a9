//! Letter request persistence: store trait, guarded transitions, in-memory store

use crate::error::{Result, WardError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use ward_types::{GeneratedLetter, LetterRequest, LetterRequestId, LetterStatus, UserId};

/// A single status change together with the fields it sets
#[derive(Debug, Clone)]
pub enum Transition {
    Approve {
        by: UserId,
        at: DateTime<Utc>,
        notes: String,
    },
    Reject {
        by: UserId,
        at: DateTime<Utc>,
        reason: String,
    },
    Complete {
        at: DateTime<Utc>,
        letter: GeneratedLetter,
    },
}

impl Transition {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Complete { .. } => "generate a document for",
        }
    }

    /// Status the record must be in for this transition to apply
    pub fn required_status(&self) -> LetterStatus {
        match self {
            Self::Approve { .. } | Self::Reject { .. } => LetterStatus::Pending,
            Self::Complete { .. } => LetterStatus::Approved,
        }
    }

    pub fn target_status(&self) -> LetterStatus {
        match self {
            Self::Approve { .. } => LetterStatus::Approved,
            Self::Reject { .. } => LetterStatus::Rejected,
            Self::Complete { .. } => LetterStatus::Completed,
        }
    }

    /// Error for a record found in `current` instead of the required status
    pub fn conflict(&self, current: LetterStatus) -> WardError {
        WardError::InvalidStateTransition {
            action: self.action(),
            from: current,
        }
    }

    /// Write the transition into `record`. Callers check the precondition first.
    pub fn apply(self, record: &mut LetterRequest) {
        record.status = self.target_status();
        match self {
            Self::Approve { by, at, notes } => {
                record.approved_by = Some(by);
                record.approval_date = Some(at);
                record.admin_notes = notes;
            }
            Self::Reject { by, at, reason } => {
                record.approved_by = Some(by);
                record.approval_date = Some(at);
                record.rejection_reason = Some(reason);
            }
            Self::Complete { at, letter } => {
                record.completion_date = Some(at);
                record.generated_letter = Some(letter);
            }
        }
    }
}

/// Persistent store of letter requests
///
/// `transition` is the only way a stored record changes. Implementations
/// make the status check and the write a single atomic step, so that of two
/// racing transitions from the same status exactly one succeeds.
#[async_trait]
pub trait LetterStore: Send + Sync {
    /// Persist a new request. The draft id is replaced by the next sequence number.
    async fn create(&self, draft: LetterRequest) -> Result<LetterRequest>;

    async fn get(&self, id: LetterRequestId) -> Result<Option<LetterRequest>>;

    /// Apply `transition` if the record is in its required status
    async fn transition(&self, id: LetterRequestId, transition: Transition) -> Result<LetterRequest>;

    async fn list_by_status(&self, status: LetterStatus) -> Result<Vec<LetterRequest>>;

    async fn list_all(&self) -> Result<Vec<LetterRequest>>;

    async fn list_by_requester(&self, user: UserId) -> Result<Vec<LetterRequest>> {
        let mut requests = self.list_all().await?;
        requests.retain(|r| r.requested_by == user);
        Ok(requests)
    }
}

/// Newest request first, ties broken by id
pub fn sort_newest_first(requests: &mut [LetterRequest]) {
    requests.sort_by(|a, b| {
        b.request_date
            .cmp(&a.request_date)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[derive(Default)]
struct MemoryInner {
    last_id: u64,
    records: BTreeMap<LetterRequestId, LetterRequest>,
}

/// In-process store for tests and single-node deployments
#[derive(Default)]
pub struct MemoryLetterStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LetterStore for MemoryLetterStore {
    async fn create(&self, mut draft: LetterRequest) -> Result<LetterRequest> {
        let mut inner = self.inner.lock().await;
        inner.last_id += 1;
        draft.id = LetterRequestId::new(inner.last_id);
        inner.records.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn get(&self, id: LetterRequestId) -> Result<Option<LetterRequest>> {
        Ok(self.inner.lock().await.records.get(&id).cloned())
    }

    async fn transition(&self, id: LetterRequestId, transition: Transition) -> Result<LetterRequest> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| WardError::NotFound(format!("letter request {}", id)))?;

        if record.status != transition.required_status() {
            return Err(transition.conflict(record.status));
        }

        transition.apply(record);
        Ok(record.clone())
    }

    async fn list_by_status(&self, status: LetterStatus) -> Result<Vec<LetterRequest>> {
        let inner = self.inner.lock().await;
        let mut requests: Vec<LetterRequest> = inner
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn list_all(&self) -> Result<Vec<LetterRequest>> {
        let inner = self.inner.lock().await;
        let mut requests: Vec<LetterRequest> = inner.records.values().cloned().collect();
        sort_newest_first(&mut requests);
        Ok(requests)
    }
}
