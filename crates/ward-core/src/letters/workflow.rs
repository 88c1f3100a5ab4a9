//! Letter request workflow: submit, approve, reject, generate document

use super::directory::SubjectDirectory;
use super::store::{LetterStore, Transition};
use crate::authz::{Action, AuthorizationPolicy, RolePolicy};
use crate::config::WardConfig;
use crate::document::{
    archive_filename, attachment_filename, reference_number, render_pdf, validate_pdf,
    DocumentArchive, IntroductionLetter, Letterhead,
};
use crate::error::{Result, WardError};
use crate::notify::{approval_message, Notifier};
use crate::validators::validate_purpose;
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use ward_types::{
    Actor, GeneratedLetter, LetterRequest, LetterRequestId, LetterStatus, LetterType,
    NewLetterRequest, SubjectProfile,
};

/// What happened to the requester notification after an approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum NotificationOutcome {
    Sent,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub request: LetterRequest,
    pub notification: NotificationOutcome,
}

/// A rendered letter ready to be handed to the caller
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub request: LetterRequest,
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct LetterWorkflow {
    store: Arc<dyn LetterStore>,
    directory: Arc<dyn SubjectDirectory>,
    notifier: Arc<dyn Notifier>,
    archive: Arc<dyn DocumentArchive>,
    policy: Arc<dyn AuthorizationPolicy>,
    letterhead: Letterhead,
    public_base_url: String,
    document_timeout: Duration,
    notification_timeout: Duration,
}

impl LetterWorkflow {
    pub fn new(
        store: Arc<dyn LetterStore>,
        directory: Arc<dyn SubjectDirectory>,
        notifier: Arc<dyn Notifier>,
        archive: Arc<dyn DocumentArchive>,
        config: &WardConfig,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            archive,
            policy: Arc::new(RolePolicy),
            letterhead: Letterhead {
                office_name: config.ward.office_name.clone(),
                contact_line: config.ward.contact_line.clone(),
            },
            public_base_url: config.ward.public_base_url.clone(),
            document_timeout: config.workflow.document_timeout(),
            notification_timeout: config.workflow.notification_timeout(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    async fn load(&self, id: LetterRequestId) -> Result<LetterRequest> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WardError::NotFound(format!("letter request {}", id)))
    }

    async fn subject_of(&self, request: &LetterRequest) -> Result<SubjectProfile> {
        self.directory
            .subject(request.resident_id)
            .await?
            .ok_or_else(|| WardError::NotFound(format!("resident {}", request.resident_id)))
    }

    async fn letter_type_of(&self, request: &LetterRequest) -> Result<LetterType> {
        self.directory
            .letter_type(request.letter_type_id)
            .await?
            .ok_or_else(|| WardError::NotFound(format!("letter type {}", request.letter_type_id)))
    }

    /// Create a pending request for the actor's own resident profile
    pub async fn submit(&self, actor: &Actor, submission: NewLetterRequest) -> Result<LetterRequest> {
        self.policy.authorize(actor, Action::SubmitLetter, None)?;

        let subject = self
            .directory
            .subject_for_user(actor.user_id)
            .await?
            .ok_or_else(|| {
                WardError::Validation("Please complete your resident registration first".to_string())
            })?;

        let letter_types = self.directory.letter_types().await?;
        if letter_types.is_empty() {
            return Err(WardError::Validation(
                "No letter types are available. Please contact the administrator.".to_string(),
            ));
        }

        // Inactive types stay selectable only while nothing is active
        let any_active = letter_types.iter().any(|t| t.is_active);
        let selectable = letter_types
            .iter()
            .any(|t| t.id == submission.letter_type_id && (t.is_active || !any_active));
        if !selectable {
            return Err(WardError::Validation(format!(
                "Letter type {} is not available",
                submission.letter_type_id
            )));
        }

        validate_purpose(&submission.purpose)?;

        let mut draft = LetterRequest::pending(
            LetterRequestId::new(0),
            actor.user_id,
            subject.id,
            submission,
            Utc::now(),
        );
        draft.requester_email = actor
            .email
            .clone()
            .or_else(|| subject.email.clone())
            .filter(|e| !e.trim().is_empty());

        let request = self.store.create(draft).await?;
        log::info!(
            "Letter request {} submitted by {} for resident {}",
            request.id,
            actor.username,
            subject.id
        );
        Ok(request)
    }

    /// Approve a pending request and notify the requester. A failed notification never reverts the approval.
    pub async fn approve(
        &self,
        actor: &Actor,
        id: LetterRequestId,
        admin_notes: &str,
    ) -> Result<ApprovalOutcome> {
        let current = self.load(id).await?;
        self.policy
            .authorize(actor, Action::ApproveLetter, Some(&current))?;

        let request = self
            .store
            .transition(
                id,
                Transition::Approve {
                    by: actor.user_id,
                    at: Utc::now(),
                    notes: admin_notes.trim().to_string(),
                },
            )
            .await?;
        log::info!("Letter request {} approved by {}", id, actor.username);

        let notification = self.notify_approval(&request).await;
        if let NotificationOutcome::Failed(reason) = &notification {
            log::warn!(
                "Letter request {} approved but the requester was not notified: {}",
                id,
                reason
            );
        }

        Ok(ApprovalOutcome {
            request,
            notification,
        })
    }

    async fn notify_approval(&self, request: &LetterRequest) -> NotificationOutcome {
        let Some(recipient) = request.requester_email.as_deref() else {
            return NotificationOutcome::Skipped("requester has no email address".to_string());
        };

        let message = match tokio::try_join!(self.subject_of(request), self.letter_type_of(request)) {
            Ok((subject, letter_type)) => {
                approval_message(request, &subject, &letter_type, &self.public_base_url)
            }
            Err(e) => return NotificationOutcome::Failed(e.to_string()),
        };

        let send = self.notifier.send(recipient, &message.subject, &message.body);
        match tokio::time::timeout(self.notification_timeout, send).await {
            Ok(Ok(())) => NotificationOutcome::Sent,
            Ok(Err(e)) => NotificationOutcome::Failed(e.to_string()),
            Err(_) => NotificationOutcome::Failed(format!(
                "notification timed out after {}s",
                self.notification_timeout.as_secs()
            )),
        }
    }

    pub async fn reject(&self, actor: &Actor, id: LetterRequestId, reason: &str) -> Result<LetterRequest> {
        let current = self.load(id).await?;
        self.policy
            .authorize(actor, Action::RejectLetter, Some(&current))?;

        let request = self
            .store
            .transition(
                id,
                Transition::Reject {
                    by: actor.user_id,
                    at: Utc::now(),
                    reason: reason.trim().to_string(),
                },
            )
            .await?;

        log::info!("Letter request {} rejected by {}", id, actor.username);
        Ok(request)
    }

    /// Render the letter of an approved request and mark it completed
    pub async fn generate_document(&self, actor: &Actor, id: LetterRequestId) -> Result<GeneratedDocument> {
        self.generate_document_with_timeout(actor, id, self.document_timeout)
            .await
    }

    pub async fn generate_document_with_timeout(
        &self,
        actor: &Actor,
        id: LetterRequestId,
        timeout: Duration,
    ) -> Result<GeneratedDocument> {
        let current = self.load(id).await?;
        self.policy
            .authorize(actor, Action::GenerateDocument, Some(&current))?;

        if current.status != LetterStatus::Approved {
            return Err(WardError::InvalidStateTransition {
                action: "generate a document for",
                from: current.status,
            });
        }

        let (subject, letter_type) =
            tokio::try_join!(self.subject_of(&current), self.letter_type_of(&current))?;

        let now = Utc::now();
        let reference = reference_number(id, now.year());
        let letter = IntroductionLetter::compose(
            &self.letterhead,
            &subject,
            &letter_type,
            &current.purpose,
            &reference,
            now,
        );
        let content = letter.content();

        let render = tokio::task::spawn_blocking(move || render_pdf(&letter));
        let bytes = match tokio::time::timeout(timeout, render).await {
            Ok(Ok(rendered)) => rendered?,
            Ok(Err(e)) => return Err(WardError::Document(format!("Rendering task failed: {}", e))),
            Err(_) => {
                log::warn!("Rendering letter request {} exceeded {:?}", id, timeout);
                return Err(WardError::Timeout(format!(
                    "document generation for letter request {}",
                    id
                )));
            }
        };
        if !validate_pdf(&bytes) {
            return Err(WardError::Document("Rendered output is not a PDF".to_string()));
        }

        // The artifact exists before the record claims it
        let stored_name = archive_filename(id, &uuid::Uuid::new_v4().simple().to_string());
        let location = self.archive.save(&stored_name, &bytes).await?;

        let completion = Transition::Complete {
            at: now,
            letter: GeneratedLetter {
                reference_number: reference,
                content,
                pdf_file: stored_name.clone(),
                generated_at: now,
                generated_by: actor.user_id,
            },
        };
        let request = match self.store.transition(id, completion).await {
            Ok(request) => request,
            Err(e) => {
                if let Err(cleanup) = self.archive.remove(&stored_name).await {
                    log::error!("Failed to remove orphaned document {}: {}", location, cleanup);
                }
                return Err(e);
            }
        };

        log::info!(
            "Letter request {} completed by {}, document stored at {}",
            id,
            actor.username,
            location
        );

        Ok(GeneratedDocument {
            request,
            file_name: attachment_filename(&subject.full_name()),
            content_type: "application/pdf",
            bytes,
        })
    }

    /// Fetch the archived document of a completed request
    pub async fn stored_document(&self, actor: &Actor, id: LetterRequestId) -> Result<GeneratedDocument> {
        let request = self.load(id).await?;
        self.policy
            .authorize(actor, Action::GenerateDocument, Some(&request))?;

        let stored_name = request
            .generated_letter
            .as_ref()
            .map(|g| g.pdf_file.clone())
            .ok_or_else(|| WardError::NotFound(format!("document for letter request {}", id)))?;
        let bytes = self
            .archive
            .load(&stored_name)
            .await?
            .ok_or_else(|| WardError::NotFound(format!("document {}", stored_name)))?;
        let subject = self.subject_of(&request).await?;

        Ok(GeneratedDocument {
            file_name: attachment_filename(&subject.full_name()),
            content_type: "application/pdf",
            request,
            bytes,
        })
    }

    pub async fn get(&self, actor: &Actor, id: LetterRequestId) -> Result<LetterRequest> {
        let request = self.load(id).await?;
        self.policy
            .authorize(actor, Action::ViewLetter, Some(&request))?;
        Ok(request)
    }

    pub async fn list_pending(&self, actor: &Actor) -> Result<Vec<LetterRequest>> {
        self.policy.authorize(actor, Action::ListPending, None)?;
        self.store.list_by_status(LetterStatus::Pending).await
    }

    pub async fn list_all(&self, actor: &Actor) -> Result<Vec<LetterRequest>> {
        self.policy.authorize(actor, Action::ListAll, None)?;
        self.store.list_all().await
    }

    pub async fn list_mine(&self, actor: &Actor) -> Result<Vec<LetterRequest>> {
        self.policy.authorize(actor, Action::ListOwn, None)?;
        self.store.list_by_requester(actor.user_id).await
    }
}
