//! Minimal blocking IMAP client over rustls.
//!
//! Just enough of RFC 3501 for one pass: LOGIN, SELECT, SEARCH UNSEEN,
//! FETCH RFC822 (which also sets \Seen) and LOGOUT. Run it inside
//! `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// One parsed command response.
#[derive(Debug, Default)]
struct ImapResponse {
    /// Untagged lines, CRLF stripped.
    untagged: Vec<String>,
    /// Literal payloads in the order they arrived.
    literals: Vec<Vec<u8>>,
    /// Text after the tag, e.g. `OK FETCH completed`.
    status: String,
}

impl ImapResponse {
    fn is_ok(&self) -> bool {
        self.status.starts_with("OK")
    }
}

/// An authenticated IMAP session.
pub struct ImapSession {
    reader: BufReader<TlsStream>,
    next_tag: u32,
}

impl ImapSession {
    /// Open a TLS connection, read the greeting and LOGIN.
    pub fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let host = config.imap_host.as_str();
        let port = config.imap_port;

        let tcp = TcpStream::connect((host, port)).map_err(|e| MailError::Connect {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string()).map_err(
            |e| MailError::Tls {
                host: host.to_string(),
                reason: e.to_string(),
            },
        )?;
        let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
            MailError::Tls {
                host: host.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut session = Self {
            reader: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(MailError::Protocol(format!("Unexpected greeting: {greeting}")));
        }

        let login = session.command(&format!(
            "LOGIN {} {}",
            quote(&config.address),
            quote(config.password.expose_secret())
        ))?;
        if !login.is_ok() {
            return Err(MailError::AuthFailed {
                user: config.address.clone(),
                host: host.to_string(),
            });
        }

        Ok(session)
    }

    /// Select INBOX, search UNSEEN and fetch the last `max_count` hits.
    ///
    /// Returns `(sequence number, raw RFC 822 bytes)` in ascending order.
    pub fn fetch_unread_raw(&mut self, max_count: usize) -> Result<Vec<(u32, Vec<u8>)>, MailError> {
        let select = self.command("SELECT \"INBOX\"")?;
        if !select.is_ok() {
            return Err(MailError::Protocol(format!("SELECT failed: {}", select.status)));
        }

        let search = self.command("SEARCH UNSEEN")?;
        if !search.is_ok() {
            return Err(MailError::Protocol(format!("SEARCH failed: {}", search.status)));
        }
        let ids = parse_search(&search.untagged);
        let ids = tail(&ids, max_count);
        debug!(unread = ids.len(), "Unread messages selected");

        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let fetch = self.command(&format!("FETCH {id} RFC822"))?;
            if !fetch.is_ok() {
                debug!(id, status = %fetch.status, "FETCH failed, skipping");
                continue;
            }
            match fetch.literals.into_iter().next() {
                Some(raw) => results.push((id, raw)),
                None => debug!(id, "FETCH returned no message body"),
            }
        }

        Ok(results)
    }

    /// Send LOGOUT. The server's BYE is consumed as an untagged line.
    pub fn logout(&mut self) -> Result<(), MailError> {
        let response = self.command("LOGOUT")?;
        debug!(status = %response.status, "IMAP logout");
        Ok(())
    }

    fn command(&mut self, cmd: &str) -> Result<ImapResponse, MailError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.reader.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        let prefix = format!("{tag} ");
        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&prefix) {
                response.status = status.to_string();
                return Ok(response);
            }
            if let Some(len) = literal_len(&line) {
                let mut buf = vec![0u8; len];
                self.reader.read_exact(&mut buf)?;
                response.literals.push(buf);
            }
            response.untagged.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Protocol("IMAP connection closed".into()));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Size of a `{N}` literal announced at the end of a line.
fn literal_len(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// Sequence numbers from `* SEARCH` lines.
fn parse_search(lines: &[String]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter_map(|n| n.parse().ok())
        .collect()
}

/// The last `n` entries, in their original order.
fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
