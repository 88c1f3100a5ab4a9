//! Letter documents: composition, PDF rendering and archiving

pub mod archive;
pub mod letter;
pub mod pdf;
pub mod reference;

pub use archive::{DocumentArchive, FsDocumentArchive, MemoryDocumentArchive};
pub use letter::{IntroductionLetter, Letterhead};
pub use pdf::{render_pdf, validate_pdf};
pub use reference::{archive_filename, attachment_filename, reference_number};
