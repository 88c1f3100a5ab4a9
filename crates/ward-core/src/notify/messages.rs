//! Notification texts

use super::Notifier;
use ward_types::{LetterRequest, LetterType, SubjectProfile};

/// Subject and body of an outgoing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Approval notice sent to the requester
pub fn approval_message(
    request: &LetterRequest,
    subject: &SubjectProfile,
    letter_type: &LetterType,
    public_base_url: &str,
) -> Message {
    let download_url = format!(
        "{}/letters/{}/pdf",
        public_base_url.trim_end_matches('/'),
        request.id
    );
    let approval_date = request
        .approval_date
        .map(|d| d.format("%B %d, %Y").to_string())
        .unwrap_or_default();

    let body = format!(
        "Dear {},\n\n\
         Your letter request has been approved!\n\n\
         Request Details:\n\
         - Letter Type: {}\n\
         - Request Date: {}\n\
         - Approved Date: {}\n\n\
         You can now download your letter from: {}\n\n\
         Thank you for using our Ward Management System.\n\n\
         Best regards,\n\
         Ward Administration",
        subject.full_name(),
        letter_type.name,
        request.request_date.format("%B %d, %Y"),
        approval_date,
        download_url
    );

    Message {
        subject: format!("Letter Request Approved - {}", letter_type.name),
        body,
    }
}

/// Send an alert to every configured admin. Delivery failures are logged, not returned.
pub async fn send_system_alert(
    notifier: &dyn Notifier,
    admins: &[String],
    subject: &str,
    body: &str,
) -> usize {
    let subject = format!("[Ward System Alert] {}", subject);
    let mut delivered = 0;

    for admin in admins {
        match notifier.send(admin, &subject, body).await {
            Ok(()) => delivered += 1,
            Err(e) => log::error!("Failed to send system alert to {}: {}", admin, e),
        }
    }

    delivered
}
