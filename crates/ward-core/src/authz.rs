//! Authorization capability checks for letter workflow actions

use crate::error::{Result, WardError};
use std::fmt;
use ward_types::{Actor, LetterRequest, Role};

/// Every action the workflow gates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SubmitLetter,
    ApproveLetter,
    RejectLetter,
    GenerateDocument,
    ViewLetter,
    ListPending,
    ListAll,
    ListOwn,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitLetter => "submit letter request",
            Self::ApproveLetter => "approve letter request",
            Self::RejectLetter => "reject letter request",
            Self::GenerateDocument => "generate letter document",
            Self::ViewLetter => "view letter request",
            Self::ListPending => "list pending letter requests",
            Self::ListAll => "list all letter requests",
            Self::ListOwn => "list own letter requests",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether an actor may perform an action on a resource
pub trait AuthorizationPolicy: Send + Sync {
    fn allows(&self, actor: &Actor, action: Action, resource: Option<&LetterRequest>) -> bool;

    /// `allows` turned into a `PermissionDenied` error
    fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        resource: Option<&LetterRequest>,
    ) -> Result<()> {
        if self.allows(actor, action, resource) {
            return Ok(());
        }

        log::warn!(
            "Access denied for user {} ({}) to {}",
            actor.username,
            actor.role,
            action
        );
        Err(WardError::PermissionDenied(format!(
            "{} may not {}",
            actor.role, action
        )))
    }
}

/// Role-based policy of the ward office
///
/// Admins approve, reject and list everything. Residents submit and see
/// their own requests. Documents can be produced by an admin or by the
/// resident who asked for them. Clerks may look at individual requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AuthorizationPolicy for RolePolicy {
    fn allows(&self, actor: &Actor, action: Action, resource: Option<&LetterRequest>) -> bool {
        let owns = resource.map_or(false, |r| r.requested_by == actor.user_id);

        match action {
            Action::SubmitLetter | Action::ListOwn => actor.role == Role::Resident,
            Action::ApproveLetter | Action::RejectLetter | Action::ListPending | Action::ListAll => {
                actor.role == Role::Admin
            }
            Action::GenerateDocument => actor.role == Role::Admin || owns,
            Action::ViewLetter => match actor.role {
                Role::Admin | Role::Clerk => true,
                Role::Resident => owns,
            },
        }
    }
}
