//! Read-only lookup of residents and letter types

use crate::error::{Result, WardError};
use crate::validators::{validate_nida_number, validate_phone_number};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use ward_types::{LetterType, LetterTypeId, ResidentId, SubjectProfile, UserId};

/// Source of subject profiles and letter types. Registration happens elsewhere.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// Resident profile linked to an account
    async fn subject_for_user(&self, user: UserId) -> Result<Option<SubjectProfile>>;

    async fn subject(&self, id: ResidentId) -> Result<Option<SubjectProfile>>;

    /// All configured letter types, active or not
    async fn letter_types(&self) -> Result<Vec<LetterType>>;

    async fn letter_type(&self, id: LetterTypeId) -> Result<Option<LetterType>> {
        Ok(self.letter_types().await?.into_iter().find(|t| t.id == id))
    }
}

/// Seed file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub residents: Vec<SubjectProfile>,
    #[serde(default)]
    pub letter_types: Vec<LetterType>,
}

/// Directory held in memory, loaded once from a JSON seed
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    residents: Vec<SubjectProfile>,
    letter_types: Vec<LetterType>,
}

impl StaticDirectory {
    pub fn new(residents: Vec<SubjectProfile>, letter_types: Vec<LetterType>) -> Self {
        Self {
            residents,
            letter_types,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            WardError::Config(format!(
                "Failed to read directory seed {}: {}",
                path.display(),
                e
            ))
        })?;

        let directory = Self::from_json_str(&json)?;
        log::info!(
            "Loaded {} residents and {} letter types from {}",
            directory.residents.len(),
            directory.letter_types.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let seed: DirectorySeed = serde_json::from_str(json)?;

        for resident in &seed.residents {
            validate_nida_number(&resident.nida_number)
                .and_then(|_| match resident.phone_number.as_deref() {
                    Some(phone) => validate_phone_number(phone),
                    None => Ok(()),
                })
                .map_err(|e| WardError::Validation(format!("Resident {}: {}", resident.id, e)))?;
        }

        Ok(Self::new(seed.residents, seed.letter_types))
    }
}

#[async_trait]
impl SubjectDirectory for StaticDirectory {
    async fn subject_for_user(&self, user: UserId) -> Result<Option<SubjectProfile>> {
        Ok(self
            .residents
            .iter()
            .find(|r| r.user_id == Some(user))
            .cloned())
    }

    async fn subject(&self, id: ResidentId) -> Result<Option<SubjectProfile>> {
        Ok(self.residents.iter().find(|r| r.id == id).cloned())
    }

    async fn letter_types(&self) -> Result<Vec<LetterType>> {
        Ok(self.letter_types.clone())
    }
}
