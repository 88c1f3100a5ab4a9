//! Introduction letter composition

use chrono::{DateTime, Utc};
use serde::Serialize;
use ward_types::{LetterType, SubjectProfile};

/// Letterhead details that do not depend on the resident
#[derive(Debug, Clone, Serialize)]
pub struct Letterhead {
    pub office_name: String,
    pub contact_line: String,
}

/// Fully composed letter, ready for rendering
#[derive(Debug, Clone, Serialize)]
pub struct IntroductionLetter {
    pub office_name: String,
    pub ward: String,
    pub contact_line: String,
    pub reference_number: String,
    /// Issue date, e.g. `05 March 2024`
    pub date: String,
    /// Subject line, upper-cased letter type name
    pub subject: String,
    pub body: Vec<String>,
}

impl IntroductionLetter {
    pub fn compose(
        letterhead: &Letterhead,
        subject: &SubjectProfile,
        letter_type: &LetterType,
        purpose: &str,
        reference_number: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let ward = subject.household.ward.clone();
        let name = subject.full_name().to_uppercase();
        let phone = subject
            .phone_number
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("Not provided");

        let body = vec![
            "TO WHOM IT MAY CONCERN".to_string(),
            String::new(),
            "Dear Sir/Madam,".to_string(),
            String::new(),
            format!("RE: INTRODUCTION OF A RESIDENT {}", name),
            String::new(),
            "Please refer to letter head above,".to_string(),
            String::new(),
            format!(
                "2. Be informed that {} with national identity number(NIDA) {} is a",
                name, subject.nida_number
            ),
            format!("   resident at {}. He/She is pursuing {}.", ward, purpose),
            "   He/She has been registered in our ward.".to_string(),
            String::new(),
            "3. We request your good office to assist the resident where he/she need arises."
                .to_string(),
            String::new(),
            "4. If there is any question, please don't hesitate to ask.".to_string(),
            String::new(),
            "5. Yours in Public Service,".to_string(),
            String::new(),
            String::new(),
            "________________________".to_string(),
            "Ward Executive Officer".to_string(),
            format!("For {}", ward),
            "RESIDENT CONTACTS:".to_string(),
            format!("Phone Number: {}", phone),
            format!(
                "Current Address: {}, {}",
                subject.household.house_number, subject.household.street_name
            ),
        ];

        Self {
            office_name: letterhead.office_name.clone(),
            ward,
            contact_line: letterhead.contact_line.clone(),
            reference_number: reference_number.to_string(),
            date: issued_at.format("%d %B %Y").to_string(),
            subject: letter_type.name.to_uppercase(),
            body,
        }
    }

    /// Plain-text rendition stored alongside the PDF
    pub fn content(&self) -> String {
        let mut lines = vec![
            self.office_name.clone(),
            format!("Ward: {}", self.ward),
            self.contact_line.clone(),
            format!("Reference No.: {}", self.reference_number),
            format!("Date: {}", self.date),
            format!("RE: {}", self.subject),
            String::new(),
        ];
        lines.extend(self.body.iter().cloned());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ward_types::{Household, LetterTypeId, ResidentId};

    fn subject(phone: Option<&str>) -> SubjectProfile {
        SubjectProfile {
            id: ResidentId::new(1),
            user_id: None,
            first_name: "Amina".to_string(),
            middle_name: String::new(),
            last_name: "Mushi".to_string(),
            nida_number: "19900101123450000123".to_string(),
            phone_number: phone.map(str::to_string),
            email: None,
            household: Household {
                household_number: "HH001".to_string(),
                street_name: "Main Street".to_string(),
                house_number: "123".to_string(),
                ward: "Saranga".to_string(),
            },
        }
    }

    fn compose(phone: Option<&str>) -> IntroductionLetter {
        let letterhead = Letterhead {
            office_name: "WARD ADMINISTRATION OFFICE".to_string(),
            contact_line: "Tel: 0222 000 000".to_string(),
        };
        let letter_type = LetterType {
            id: LetterTypeId::new(1),
            name: "Introduction Letter".to_string(),
            description: String::new(),
            is_active: true,
        };
        IntroductionLetter::compose(
            &letterhead,
            &subject(phone),
            &letter_type,
            "a passport application",
            "WRD/000042/2024",
            Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_compose_interpolates_resident() {
        let letter = compose(Some("+255763587710"));
        assert_eq!(letter.date, "05 March 2024");
        assert_eq!(letter.subject, "INTRODUCTION LETTER");
        assert!(letter.body.contains(&"RE: INTRODUCTION OF A RESIDENT AMINA MUSHI".to_string()));
        assert!(letter
            .body
            .contains(&"   resident at Saranga. He/She is pursuing a passport application.".to_string()));
        assert!(letter.body.contains(&"Current Address: 123, Main Street".to_string()));
        assert!(letter.body.contains(&"Phone Number: +255763587710".to_string()));
    }

    #[test]
    fn test_missing_phone_and_content() {
        let letter = compose(None);
        assert!(letter.body.contains(&"Phone Number: Not provided".to_string()));

        let content = letter.content();
        assert!(content.starts_with("WARD ADMINISTRATION OFFICE\nWard: Saranga"));
        assert!(content.contains("Reference No.: WRD/000042/2024"));
    }
}
