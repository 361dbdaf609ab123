//! Posting to a list through its inbound queue.
//!
//! ## Flow
//!
//! ```text
//! SendMailForm → OutboundMessage → MessageTemplate::render → check → ListEngine::inject
//! ```
//!
//! Handoff is fire-and-forget: moderation and delivery happen in the engine.

pub mod message;
pub mod template;

use std::net::IpAddr;
use std::sync::Arc;

use mailparse::{addrparse_header, parse_mail, MailAddr, MailHeaderMap};
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{EngineError, ListEngine};

pub use message::{MissingInformation, OutboundMessage, SendMailForm};
pub use template::{MessageTemplate, TemplateError};

#[derive(Debug, Error)]
pub enum SendMailError {
    #[error("missing information")]
    MissingInformation,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("rendered message is not valid RFC 5322: {0}")]
    Malformed(String),
}

impl From<MissingInformation> for SendMailError {
    fn from(_: MissingInformation) -> Self {
        SendMailError::MissingInformation
    }
}

#[derive(Clone)]
pub struct MailInjector {
    engine: Arc<dyn ListEngine>,
    template: Arc<MessageTemplate>,
}

impl MailInjector {
    pub fn new(engine: Arc<dyn ListEngine>, template: MessageTemplate) -> Self {
        Self {
            engine,
            template: Arc::new(template),
        }
    }

    /// Render a post from `form` and queue it for `listname`.
    pub async fn send_mail(
        &self,
        listname: &str,
        form: SendMailForm,
        ip_from: IpAddr,
    ) -> Result<(), SendMailError> {
        let mlist = self.engine.get_list(listname).await?;

        let message = OutboundMessage::build(&mlist.posting_address, ip_from, form)?;
        let rendered = self.template.render(&message);
        check_rendered(&rendered, &message)?;

        self.engine.inject(&mlist.name, rendered.as_bytes()).await?;

        info!(
            listname = %mlist.name,
            message_id = %message.message_id,
            ip_from = %message.ip_from,
            has_in_reply_to = message.in_reply_to.is_some(),
            message_length = rendered.len(),
            "sendmail_injected"
        );

        Ok(())
    }
}

/// Make sure the rendered text parses, is addressed to the list and names
/// exactly one sender.
fn check_rendered(rendered: &str, message: &OutboundMessage) -> Result<(), SendMailError> {
    let mail = parse_mail(rendered.as_bytes()).map_err(|e| SendMailError::Malformed(e.to_string()))?;

    let to = mail.headers.get_first_value("To");
    if to.as_deref() != Some(message.email_to.as_str()) {
        warn!(expected = %message.email_to, found = ?to, "sendmail_recipient_mismatch");
        return Err(SendMailError::Malformed(
            "To header does not match the list address".to_string(),
        ));
    }

    let expected_from = template::header_address(&message.email_from);
    let from = mail
        .headers
        .get_first_header("From")
        .ok_or_else(|| SendMailError::Malformed("From header missing".to_string()))?;
    let senders = addrparse_header(from).map_err(|e| SendMailError::Malformed(e.to_string()))?;

    match senders.as_slice() {
        [MailAddr::Single(sender)] if sender.addr == expected_from => Ok(()),
        _ => {
            warn!(
                expected = %expected_from,
                found = %senders,
                "sendmail_sender_mismatch"
            );
            Err(SendMailError::Malformed(
                "From header must name exactly the submitted sender".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::engine::local::ListRecord;

    async fn injector() -> (tempfile::TempDir, Arc<LocalEngine>, MailInjector) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(LocalEngine::new(
            dir.path().join("lists"),
            dir.path().join("in"),
            "example.com",
        ));
        engine.create_list("dev", &ListRecord::default()).await.unwrap();
        let injector = MailInjector::new(engine.clone(), MessageTemplate::builtin().unwrap());
        (dir, engine, injector)
    }

    fn form() -> SendMailForm {
        SendMailForm {
            name_from: Some("José".to_string()),
            email_from: Some("jose@example.com".to_string()),
            subject: Some("Reunião".to_string()),
            body: Some("Olá a todos".to_string()),
            in_reply_to: Some("<parent@example.com>".to_string()),
        }
    }

    #[tokio::test]
    async fn test_send_mail_spools_parsable_message() {
        let (_dir, engine, injector) = injector().await;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        injector.send_mail("dev", form(), ip).await.unwrap();

        let pending = engine.spool().pending().await.unwrap();
        assert_eq!(pending.len(), 1);

        let mail = parse_mail(pending[0].message.as_bytes()).unwrap();
        assert_eq!(
            mail.headers.get_first_value("To").as_deref(),
            Some("dev@example.com")
        );
        assert_eq!(
            mail.headers.get_first_value("Subject").as_deref(),
            Some("Reunião")
        );
        assert_eq!(
            mail.headers.get_first_value("In-Reply-To").as_deref(),
            Some("<parent@example.com>")
        );
        assert_eq!(
            mail.headers.get_first_value("X-Originating-IP").as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(mail.get_body().unwrap().trim_end(), "Olá a todos");
    }

    #[tokio::test]
    async fn test_send_mail_sender_name_stays_in_display_name() {
        let (_dir, engine, injector) = injector().await;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let mut form = form();
        form.name_from = Some("Doe, John <eve@evil.example>".to_string());
        form.email_from = Some("john@example.com".to_string());

        injector.send_mail("dev", form, ip).await.unwrap();

        let pending = engine.spool().pending().await.unwrap();
        let mail = parse_mail(pending[0].message.as_bytes()).unwrap();
        let senders = addrparse_header(mail.headers.get_first_header("From").unwrap()).unwrap();
        assert_eq!(senders.len(), 1);
        match &senders[0] {
            MailAddr::Single(sender) => {
                assert_eq!(sender.addr, "john@example.com");
                assert_eq!(
                    sender.display_name.as_deref(),
                    Some("Doe, John <eve@evil.example>")
                );
            }
            other => panic!("unexpected sender {:?}", other),
        }
    }

    #[test]
    fn test_check_rendered_rejects_extra_sender() {
        let message = OutboundMessage::build(
            "dev@example.com",
            "127.0.0.1".parse().unwrap(),
            form(),
        )
        .unwrap();
        let rendered = "From: Doe, John <eve@evil.example>\nTo: dev@example.com\n\nhi\n";

        let err = check_rendered(rendered, &message).unwrap_err();
        assert!(matches!(err, SendMailError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_send_mail_missing_body() {
        let (_dir, engine, injector) = injector().await;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let mut form = form();
        form.body = None;

        let err = injector.send_mail("dev", form, ip).await.unwrap_err();
        assert!(matches!(err, SendMailError::MissingInformation));
        assert!(engine.spool().pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_mail_unknown_list() {
        let (_dir, _engine, injector) = injector().await;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        let err = injector.send_mail("ghost", form(), ip).await.unwrap_err();
        assert!(matches!(
            err,
            SendMailError::Engine(EngineError::NoSuchList(_))
        ));
    }
}
