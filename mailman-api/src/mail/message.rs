//! Outbound list post built from a sendmail request.

use std::net::IpAddr;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

/// Form fields accepted by the sendmail endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SendMailForm {
    pub name_from: Option<String>,
    pub email_from: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    /// Message-ID of the message being replied to, if any.
    pub in_reply_to: Option<String>,
}

/// A required form field was not supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingInformation;

/// Everything the message template can reference.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// List posting address
    pub email_to: String,
    /// Fresh `<uuid@domain>` identifier
    pub message_id: String,
    /// Address of the HTTP client that submitted the post
    pub ip_from: String,
    /// RFC 2822 date
    pub timestamp: String,
    pub name_from: String,
    pub email_from: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
}

impl OutboundMessage {
    /// Build a message addressed to `email_to`.
    ///
    /// `name_from`, `email_from`, `subject` and `body` must all be present.
    /// An empty `in_reply_to` counts as absent.
    pub fn build(
        email_to: &str,
        ip_from: IpAddr,
        form: SendMailForm,
    ) -> Result<Self, MissingInformation> {
        let (name_from, email_from, subject, body) =
            match (form.name_from, form.email_from, form.subject, form.body) {
                (Some(name_from), Some(email_from), Some(subject), Some(body)) => {
                    (name_from, email_from, subject, body)
                }
                _ => return Err(MissingInformation),
            };

        Ok(Self {
            email_to: email_to.to_string(),
            message_id: new_message_id(email_to),
            ip_from: ip_from.to_string(),
            timestamp: Utc::now().to_rfc2822(),
            name_from,
            email_from,
            subject,
            body,
            in_reply_to: form.in_reply_to.filter(|id| !id.is_empty()),
        })
    }
}

/// Generate a Message-ID in the domain of `address`.
fn new_message_id(address: &str) -> String {
    let domain = address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost");

    format!("<{}@{}>", Uuid::new_v4(), domain)
}
