//! Outbound replies via lettre (STARTTLS + login). Blocking.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::MailError;

use super::OutgoingReply;

/// Build the RFC 5322 message for a reply.
pub fn build_message(from: &str, reply: &OutgoingReply) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(&reply.to)?)
        .subject(reply.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    if let Some(id) = &reply.in_reply_to {
        builder = builder.in_reply_to(id.clone());
    }
    if let Some(refs) = &reply.references {
        builder = builder.references(refs.clone());
    }

    builder
        .body(reply.body.clone())
        .map_err(|e| MailError::Send {
            reason: format!("Failed to build email: {e}"),
        })
}

/// Send a reply through the configured SMTP relay.
pub fn send_reply(config: &MailConfig, reply: &OutgoingReply) -> Result<(), MailError> {
    let email = build_message(&config.address, reply)?;

    let creds = Credentials::new(
        config.address.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::starttls_relay(&config.smtp_host)
        .map_err(|e| MailError::Send {
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport.send(&email).map_err(|e| MailError::Send {
        reason: format!("SMTP send failed: {e}"),
    })?;

    tracing::info!(to = %reply.to, subject = %reply.subject, "Reply sent");
    Ok(())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e| MailError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}
