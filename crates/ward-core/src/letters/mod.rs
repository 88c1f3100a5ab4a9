//! Letter requests: persistence, subject lookup and the approval workflow

pub mod directory;
pub mod file_store;
pub mod store;
pub mod workflow;

pub use directory::{DirectorySeed, StaticDirectory, SubjectDirectory};
pub use file_store::FileLetterStore;
pub use store::{LetterStore, MemoryLetterStore, Transition};
pub use workflow::{ApprovalOutcome, GeneratedDocument, LetterWorkflow, NotificationOutcome};
