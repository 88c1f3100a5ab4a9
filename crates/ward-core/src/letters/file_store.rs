//! File-backed letter request store
//! One JSON file per request inside a directory per status; transitions move files with atomic renames

use super::store::{sort_newest_first, LetterStore, Transition};
use crate::error::{Result, WardError};
use crate::paths;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ward_types::{LetterRequest, LetterRequestId, LetterStatus, UserId};

/// Attempts to read a record whose move between status directories is still in flight
const SETTLE_ATTEMPTS: u32 = 5;
const SETTLE_DELAY: Duration = Duration::from_millis(5);

const RECORD_PREFIX: &str = "letter_";
const CLAIM_PREFIX: &str = ".claim_";

/// Where a record currently lives
#[derive(Debug, Clone)]
enum Located {
    /// Settled record file inside the directory of its status
    Filed(PathBuf, LetterStatus),
    /// Claimed by a transition that has not finished, still in its previous status
    Claimed(PathBuf, LetterStatus),
}

impl Located {
    fn path(&self) -> &Path {
        match self {
            Located::Filed(path, _) | Located::Claimed(path, _) => path,
        }
    }

    fn status(&self) -> LetterStatus {
        match self {
            Located::Filed(_, status) | Located::Claimed(_, status) => *status,
        }
    }
}

/// Progress along the lifecycle, used to pick the newer of two copies
fn stage(status: LetterStatus) -> u8 {
    match status {
        LetterStatus::Pending => 0,
        LetterStatus::Approved | LetterStatus::Rejected => 1,
        LetterStatus::Completed => 2,
    }
}

/// Letter request store safe across processes sharing one data directory
///
/// A transition first renames the record to a claim file inside its current
/// directory. Only one caller can win that rename. The updated record is then
/// written into the target directory and the claim removed. Any failure before
/// the write completes puts the claim back, leaving the record untouched.
pub struct FileLetterStore {
    root_path: PathBuf,
}

impl FileLetterStore {
    /// Create new store with specified root path
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        for status in LetterStatus::ALL {
            fs::create_dir_all(root_path.join(status.directory_name()))?;
        }
        fs::create_dir_all(root_path.join(paths::SEQUENCE_DIR_NAME))?;

        let store = Self { root_path };
        store.recover_claims()?;
        Ok(store)
    }

    fn file_name(id: LetterRequestId) -> String {
        format!("{}{}.json", RECORD_PREFIX, id)
    }

    fn record_path(&self, status: LetterStatus, id: LetterRequestId) -> PathBuf {
        self.root_path
            .join(status.directory_name())
            .join(Self::file_name(id))
    }

    fn claim_path(&self, status: LetterStatus, id: LetterRequestId) -> PathBuf {
        self.root_path
            .join(status.directory_name())
            .join(format!("{}{}", CLAIM_PREFIX, Self::file_name(id)))
    }

    /// Find a request in any status directory, settled copies first
    fn locate(&self, id: LetterRequestId) -> Option<Located> {
        let filed = LetterStatus::ALL
            .iter()
            .rev()
            .map(|status| (self.record_path(*status, id), *status))
            .find(|(path, _)| path.exists())
            .map(|(path, status)| Located::Filed(path, status));

        filed.or_else(|| {
            LetterStatus::ALL
                .iter()
                .map(|status| (self.claim_path(*status, id), *status))
                .find(|(path, _)| path.exists())
                .map(|(path, status)| Located::Claimed(path, status))
        })
    }

    /// Settle claims left behind by a process that stopped mid-transition
    ///
    /// A claim whose record already reached another directory is stale and
    /// removed. Otherwise the transition never committed and the claim is
    /// renamed back into place.
    fn recover_claims(&self) -> Result<()> {
        for status in LetterStatus::ALL {
            let dir = self.root_path.join(status.directory_name());
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                let Some(record_name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(CLAIM_PREFIX))
                    .map(str::to_string)
                else {
                    continue;
                };

                let committed = LetterStatus::ALL
                    .iter()
                    .filter(|other| **other != status)
                    .any(|other| self.root_path.join(other.directory_name()).join(&record_name).exists());

                if committed {
                    log::warn!("Removing stale claim {}", path.display());
                    fs::remove_file(&path)?;
                } else {
                    log::warn!("Restoring unfinished transition of {}", record_name);
                    fs::rename(&path, dir.join(&record_name))?;
                }
            }
        }
        Ok(())
    }

    /// Write record data through a temporary file and rename it into place
    fn write_record(&self, path: &Path, record: &LetterRequest) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| WardError::Storage(format!("Failed to serialize letter request: {}", e)))?;

        let dir = path
            .parent()
            .ok_or_else(|| WardError::Storage(format!("No parent directory for {}", path.display())))?;
        let tmp = dir.join(format!(".tmp_{}", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, json) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(())
    }

    fn read_record(&self, path: &Path) -> Result<LetterRequest> {
        let json = fs::read_to_string(path)?;

        serde_json::from_str(&json)
            .map_err(|e| WardError::Storage(format!("Failed to deserialize letter request: {}", e)))
    }

    /// Read a record, retrying while a concurrent transition moves it
    async fn read_settled(&self, id: LetterRequestId) -> Result<Option<LetterRequest>> {
        for attempt in 0..SETTLE_ATTEMPTS {
            let Some(located) = self.locate(id) else {
                return Ok(None);
            };

            let record = match self.read_record(located.path()) {
                Ok(record) => record,
                // moved by a concurrent transition between lookup and read
                Err(WardError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    tokio::time::sleep(SETTLE_DELAY).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if record.status == located.status() || attempt + 1 == SETTLE_ATTEMPTS {
                if record.status != located.status() {
                    log::warn!(
                        "Letter request {} content says {} but is filed under {}",
                        id,
                        record.status,
                        located.status()
                    );
                }
                return Ok(Some(record));
            }
            tokio::time::sleep(SETTLE_DELAY).await;
        }

        Ok(None)
    }

    /// Status of a record some other caller is transitioning, once it settles
    async fn settled_status(&self, id: LetterRequestId) -> Option<LetterStatus> {
        for _ in 0..SETTLE_ATTEMPTS {
            match self.locate(id)? {
                Located::Filed(_, status) => return Some(status),
                Located::Claimed(..) => tokio::time::sleep(SETTLE_DELAY).await,
            }
        }
        self.locate(id).map(|located| located.status())
    }

    /// Reserve the next id by exclusively creating its sequence marker
    fn allocate_id(&self) -> Result<LetterRequestId> {
        let sequence_dir = self.root_path.join(paths::SEQUENCE_DIR_NAME);
        let mut candidate = fs::read_dir(&sequence_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0)
            + 1;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(sequence_dir.join(candidate.to_string()))
            {
                Ok(_) => return Ok(LetterRequestId::new(candidate)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => candidate += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Records filed or claimed in one status directory
    fn list_dir(&self, status: LetterStatus) -> Result<Vec<LetterRequest>> {
        let state_dir = self.root_path.join(status.directory_name());

        if !state_dir.exists() {
            return Ok(Vec::new());
        }

        let mut requests = Vec::new();
        for entry in fs::read_dir(&state_dir)? {
            let entry = entry?;

            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.strip_prefix(CLAIM_PREFIX).unwrap_or(n))
                .map_or(false, |n| n.starts_with(RECORD_PREFIX) && n.ends_with(".json"));
            if !is_record {
                continue;
            }

            match self.read_record(&path) {
                Ok(record) if record.status == status => requests.push(record),
                Ok(record) => log::debug!(
                    "Skipping letter request {} filed under {} while its content says {}",
                    record.id,
                    status,
                    record.status
                ),
                // NotFound here means a transition moved it after the directory scan
                Err(e) => log::debug!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        Ok(requests)
    }

    /// Finish a claimed transition. The claim is left for the caller to resolve.
    fn commit(&self, claim: &Path, to: &Path, transition: Transition) -> Result<LetterRequest> {
        let mut record = self.read_record(claim)?;
        transition.apply(&mut record);
        self.write_record(to, &record)?;
        Ok(record)
    }
}

#[async_trait]
impl LetterStore for FileLetterStore {
    async fn create(&self, mut draft: LetterRequest) -> Result<LetterRequest> {
        draft.id = self.allocate_id()?;
        draft.status = LetterStatus::Pending;

        let path = self.record_path(LetterStatus::Pending, draft.id);
        self.write_record(&path, &draft)?;

        log::info!("Stored letter request {} at {}", draft.id, path.display());
        Ok(draft)
    }

    async fn get(&self, id: LetterRequestId) -> Result<Option<LetterRequest>> {
        self.read_settled(id).await
    }

    async fn transition(&self, id: LetterRequestId, transition: Transition) -> Result<LetterRequest> {
        let required = transition.required_status();
        let from = self.record_path(required, id);
        let claim = self.claim_path(required, id);
        let to = self.record_path(transition.target_status(), id);

        // Claim the record: the rename out of its settled name succeeds for one caller only
        if let Err(e) = fs::rename(&from, &claim) {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
            return match self.settled_status(id).await {
                Some(current) => Err(transition.conflict(current)),
                None => Err(WardError::NotFound(format!("letter request {}", id))),
            };
        }

        let record = match self.commit(&claim, &to, transition) {
            Ok(record) => record,
            Err(e) => {
                if let Err(restore) = fs::rename(&claim, &from) {
                    log::error!(
                        "Failed to restore letter request {} after failed transition: {}",
                        id,
                        restore
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = fs::remove_file(&claim) {
            log::warn!("Failed to remove claim {}: {}", claim.display(), e);
        }

        log::debug!("Moved letter request {} to {}", id, record.status);
        Ok(record)
    }

    async fn list_by_status(&self, status: LetterStatus) -> Result<Vec<LetterRequest>> {
        let mut requests = self.list_dir(status)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn list_all(&self) -> Result<Vec<LetterRequest>> {
        // A record moving between directories during the scan can be seen twice
        let mut by_id: BTreeMap<LetterRequestId, LetterRequest> = BTreeMap::new();
        for status in LetterStatus::ALL {
            for record in self.list_dir(status)? {
                match by_id.get(&record.id) {
                    Some(seen) if stage(seen.status) >= stage(record.status) => {}
                    _ => {
                        by_id.insert(record.id, record);
                    }
                }
            }
        }

        let mut requests: Vec<LetterRequest> = by_id.into_values().collect();
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn list_by_requester(&self, user: UserId) -> Result<Vec<LetterRequest>> {
        let mut requests = self.list_all().await?;
        requests.retain(|r| r.requested_by == user);
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;
    use ward_types::{GeneratedLetter, LetterTypeId, NewLetterRequest, Priority, ResidentId};

    fn draft(user: i64) -> LetterRequest {
        LetterRequest::pending(
            LetterRequestId::new(0),
            UserId::new(user),
            ResidentId::new(user),
            NewLetterRequest {
                letter_type_id: LetterTypeId::new(1),
                purpose: "passport application".to_string(),
                additional_info: String::new(),
                priority: Priority::Urgent,
            },
            Utc::now(),
        )
    }

    fn approve() -> Transition {
        Transition::Approve {
            by: UserId::new(1),
            at: Utc::now(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_writes_into_pending_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLetterStore::new(temp_dir.path()).unwrap();

        let created = store.create(draft(5)).await.unwrap();
        assert_eq!(created.id.value(), 1);

        let path = temp_dir.path().join("pending").join("letter_1.json");
        assert!(path.exists());
        let parsed: LetterRequest = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.requested_by, UserId::new(5));
        assert_eq!(parsed.status, LetterStatus::Pending);
    }

    #[tokio::test]
    async fn test_transition_moves_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLetterStore::new(temp_dir.path()).unwrap();
        let created = store.create(draft(5)).await.unwrap();

        let approved = store.transition(created.id, approve()).await.unwrap();
        assert_eq!(approved.status, LetterStatus::Approved);
        assert!(!temp_dir.path().join("pending").join("letter_1.json").exists());
        assert!(temp_dir.path().join("approved").join("letter_1.json").exists());

        let reread = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(reread.status, LetterStatus::Approved);
        assert_eq!(reread.approved_by, Some(UserId::new(1)));
    }

    #[tokio::test]
    async fn test_second_approval_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileLetterStore::new(temp_dir.path()).unwrap());
        let created = store.create(draft(5)).await.unwrap();

        let (a, b) = tokio::join!(
            store.transition(created.id, approve()),
            store.transition(created.id, approve())
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let err = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(
            err,
            WardError::InvalidStateTransition { from: LetterStatus::Approved, .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLetterStore::new(temp_dir.path()).unwrap();
        assert!(store.get(LetterRequestId::new(3)).await.unwrap().is_none());
        let err = store
            .transition(LetterRequestId::new(3), approve())
            .await
            .unwrap_err();
        assert!(matches!(err, WardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_records_and_sequence_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().to_path_buf();

        {
            let store = FileLetterStore::new(&temp_path).unwrap();
            store.create(draft(1)).await.unwrap();
            store.create(draft(2)).await.unwrap();
        }

        let store = FileLetterStore::new(&temp_path).unwrap();
        let third = store.create(draft(3)).await.unwrap();
        assert_eq!(third.id.value(), 3);
        assert_eq!(store.list_by_status(LetterStatus::Pending).await.unwrap().len(), 3);
        assert_eq!(store.list_by_requester(UserId::new(2)).await.unwrap().len(), 1);
    }

    fn complete() -> Transition {
        Transition::Complete {
            at: Utc::now(),
            letter: GeneratedLetter {
                reference_number: "WRD/000001/2024".to_string(),
                content: "letter".to_string(),
                pdf_file: "letter_000001_a.pdf".to_string(),
                generated_at: Utc::now(),
                generated_by: UserId::new(1),
            },
        }
    }

    /// Replace a status directory with a plain file so writes into it fail
    fn break_directory(root: &Path, status: LetterStatus) {
        let dir = root.join(status.directory_name());
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"not a directory").unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_leaves_record_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLetterStore::new(temp_dir.path()).unwrap();
        let created = store.create(draft(5)).await.unwrap();
        store.transition(created.id, approve()).await.unwrap();

        break_directory(temp_dir.path(), LetterStatus::Completed);
        assert!(store.transition(created.id, complete()).await.is_err());

        let reread = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(reread.status, LetterStatus::Approved);
        assert!(reread.generated_letter.is_none());
        assert!(temp_dir.path().join("approved").join("letter_1.json").exists());
        assert!(!temp_dir.path().join("approved").join(".claim_letter_1.json").exists());
    }

    #[tokio::test]
    async fn test_unfinished_claim_restored_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let created = {
            let store = FileLetterStore::new(temp_dir.path()).unwrap();
            store.create(draft(5)).await.unwrap()
        };

        let pending = temp_dir.path().join("pending");
        fs::rename(pending.join("letter_1.json"), pending.join(".claim_letter_1.json")).unwrap();

        let store = FileLetterStore::new(temp_dir.path()).unwrap();
        assert!(pending.join("letter_1.json").exists());
        let approved = store.transition(created.id, approve()).await.unwrap();
        assert_eq!(approved.status, LetterStatus::Approved);
    }

    #[tokio::test]
    async fn test_stale_claim_removed_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let created = {
            let store = FileLetterStore::new(temp_dir.path()).unwrap();
            let created = store.create(draft(5)).await.unwrap();
            store.transition(created.id, approve()).await.unwrap();
            created
        };

        // crashed after writing the approved copy, before dropping the claim
        let claim = temp_dir.path().join("pending").join(".claim_letter_1.json");
        fs::write(&claim, serde_json::to_string(&draft(5)).unwrap()).unwrap();

        let store = FileLetterStore::new(temp_dir.path()).unwrap();
        assert!(!claim.exists());
        let reread = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(reread.status, LetterStatus::Approved);
    }

    #[tokio::test]
    async fn test_list_all_reports_each_request_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLetterStore::new(temp_dir.path()).unwrap();
        let created = store.create(draft(5)).await.unwrap();
        let approved = store.transition(created.id, approve()).await.unwrap();

        // copy left in pending as seen by a scan racing the move
        let mut old = approved.clone();
        old.status = LetterStatus::Pending;
        fs::write(
            temp_dir.path().join("pending").join(".claim_letter_1.json"),
            serde_json::to_string(&old).unwrap(),
        )
        .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, LetterStatus::Approved);
    }
}
