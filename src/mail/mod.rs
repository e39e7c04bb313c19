//! Mailbox I/O — IMAP retrieval of unread mail, SMTP delivery of replies.
//!
//! Pure I/O, no business logic. Triage lives in `crate::triage`.

pub mod imap;
pub mod parse;
pub mod smtp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::error::MailError;

use self::imap::ImapSession;

/// An unread email reduced to what triage needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// MIME-decoded display name; may be empty.
    pub sender_display_name: String,
    /// Bare sender address.
    pub sender_address: String,
    /// Decoded subject, `(no subject)` when absent.
    pub subject: String,
    /// RFC 3339 timestamp, or the raw Date header when it can't be parsed.
    pub received_at: String,
    /// Plain text only; HTML has already been reduced.
    pub body_text: String,
    /// Message-ID header, used as In-Reply-To.
    pub thread_message_id: Option<String>,
    /// References header, echoed on reply.
    pub thread_references: Option<String>,
}

/// A plain-text reply threaded onto an existing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

impl OutgoingReply {
    /// Build a reply to `original` carrying its threading identifiers.
    pub fn to_message(original: &NormalizedMessage, body: impl Into<String>) -> Self {
        Self {
            to: original.sender_address.clone(),
            subject: format!("Re: {}", original.subject),
            body: body.into(),
            in_reply_to: original.thread_message_id.clone(),
            references: original.thread_references.clone(),
        }
    }
}

/// Mailbox adapter — fetch unread messages, send approved replies.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Fetch at most `max_count` of the most recent unread messages, oldest first.
    async fn fetch_unread(&mut self, max_count: usize) -> Result<Vec<NormalizedMessage>, MailError>;

    /// Send a reply. Only called after a human approved it.
    async fn send_reply(&self, reply: &OutgoingReply) -> Result<(), MailError>;

    /// Close the retrieval session.
    async fn logout(&mut self) -> Result<(), MailError>;
}

/// IMAP inbox + SMTP outbox for one account.
pub struct ImapMailbox {
    config: MailConfig,
    session: Option<ImapSession>,
}

impl ImapMailbox {
    /// Connect and authenticate the IMAP session.
    pub async fn connect(config: MailConfig) -> Result<Self, MailError> {
        let cfg = config.clone();
        let session = tokio::task::spawn_blocking(move || ImapSession::connect(&cfg))
            .await
            .map_err(|e| MailError::Protocol(format!("IMAP connect task failed: {e}")))??;

        info!(host = %config.imap_host, user = %config.address, "IMAP session established");

        Ok(Self {
            config,
            session: Some(session),
        })
    }

    fn take_session(&mut self) -> Result<ImapSession, MailError> {
        self.session
            .take()
            .ok_or_else(|| MailError::Protocol("IMAP session already closed".into()))
    }
}

#[async_trait]
impl MailSource for ImapMailbox {
    async fn fetch_unread(&mut self, max_count: usize) -> Result<Vec<NormalizedMessage>, MailError> {
        let mut session = self.take_session()?;

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = session.fetch_unread_raw(max_count);
            (session, result)
        })
        .await
        .map_err(|e| MailError::Protocol(format!("IMAP fetch task failed: {e}")))?;
        self.session = Some(session);

        let mut messages = Vec::new();
        for (id, raw) in result? {
            match parse::normalize(&raw) {
                Some(message) => messages.push(message),
                None => warn!(id, "Skipping message that could not be parsed"),
            }
        }
        Ok(messages)
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<(), MailError> {
        let config = self.config.clone();
        let reply = reply.clone();
        tokio::task::spawn_blocking(move || smtp::send_reply(&config, &reply))
            .await
            .map_err(|e| MailError::Send {
                reason: format!("SMTP task failed: {e}"),
            })?
    }

    async fn logout(&mut self) -> Result<(), MailError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || session.logout())
            .await
            .map_err(|e| MailError::Protocol(format!("IMAP logout task failed: {e}")))?
    }
}
