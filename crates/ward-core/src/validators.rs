//! Input validation for resident data and letter submissions

use crate::constants::NIDA_NUMBER_LENGTH;
use crate::error::{Result, WardError};
use regex::Regex;

const MOBILE_PHONE_PATTERN: &str = r"^(\+255|0)(6|7)\d{8}$";
const LANDLINE_PHONE_PATTERN: &str = r"^(\+255|0)(2[2-9])\d{7}$";

/// National identity number: exactly 20 digits
pub fn validate_nida_number(value: &str) -> Result<()> {
    let value = value.trim();

    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(WardError::Validation(
            "NIDA number must contain only digits".to_string(),
        ));
    }
    if value.len() != NIDA_NUMBER_LENGTH {
        return Err(WardError::Validation(format!(
            "NIDA number must be exactly {} digits",
            NIDA_NUMBER_LENGTH
        )));
    }

    Ok(())
}

/// Tanzanian mobile or landline number. Spaces, dashes and parentheses are ignored.
pub fn validate_phone_number(value: &str) -> Result<()> {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    for pattern in [MOBILE_PHONE_PATTERN, LANDLINE_PHONE_PATTERN] {
        let regex = Regex::new(pattern)
            .map_err(|e| WardError::Config(format!("Invalid phone pattern: {}", e)))?;
        if regex.is_match(&cleaned) {
            return Ok(());
        }
    }

    Err(WardError::Validation(format!(
        "Invalid phone number: {}",
        value
    )))
}

pub fn validate_purpose(purpose: &str) -> Result<()> {
    if purpose.trim().is_empty() {
        return Err(WardError::Validation(
            "Purpose of the letter is required".to_string(),
        ));
    }
    Ok(())
}
