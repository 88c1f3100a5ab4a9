//! Reference numbers and attachment file names

use crate::constants::{REFERENCE_PREFIX, REFERENCE_SEQUENCE_WIDTH};
use ward_types::LetterRequestId;

/// `WRD/<id zero-padded to six>/<year>`
pub fn reference_number(id: LetterRequestId, year: i32) -> String {
    format!(
        "{}/{:0width$}/{}",
        REFERENCE_PREFIX,
        id.value(),
        year,
        width = REFERENCE_SEQUENCE_WIDTH
    )
}

/// Download name for a resident's letter: spaces become underscores, dots are dropped
pub fn attachment_filename(full_name: &str) -> String {
    let name: String = full_name
        .trim()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    format!("{}_Introduction_Letter.pdf", name)
}

/// Archive name for one generation attempt. Each attempt gets its own file.
pub fn archive_filename(id: LetterRequestId, attempt: &str) -> String {
    format!(
        "letter_{:0width$}_{}.pdf",
        id.value(),
        attempt,
        width = REFERENCE_SEQUENCE_WIDTH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_number() {
        assert_eq!(reference_number(LetterRequestId::new(42), 2024), "WRD/000042/2024");
        assert_eq!(
            reference_number(LetterRequestId::new(1_234_567), 2025),
            "WRD/1234567/2025"
        );
    }

    #[test]
    fn test_attachment_filename() {
        assert_eq!(
            attachment_filename("Amina J. Mushi"),
            "Amina_J_Mushi_Introduction_Letter.pdf"
        );
        assert_eq!(
            archive_filename(LetterRequestId::new(42), "a1b2"),
            "letter_000042_a1b2.pdf"
        );
    }
}
