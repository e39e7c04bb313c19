//! Deterministic skip filter.
//!
//! Runs before any model call and decides whether a message must never get
//! a reply. Rules in precedence order, first match wins:
//! 1. sender domain in the blocked set
//! 2. a system / no-reply phrase in subject + body
//! 3. a promotional phrase in subject + body
//! 4. mass-mail salutation ("dear customer" with "team" or "sincerely")
//!
//! Phrase checks are case-insensitive substring matches reported in the
//! configured list order.

use tracing::debug;

use crate::config::SkipRules;
use crate::mail::NormalizedMessage;

use super::types::{ClassificationDecision, SkipReason};

/// Side-effect-free pre-filter.
#[derive(Debug, Clone)]
pub struct SkipFilter {
    rules: SkipRules,
}

impl SkipFilter {
    pub fn new(rules: SkipRules) -> Self {
        Self { rules }
    }

    /// Return the first rule that fires, or `None` to escalate to the model.
    pub fn evaluate(&self, subject: &str, body_text: &str, sender_address: &str) -> Option<SkipReason> {
        let domain = sender_domain(sender_address);
        if !domain.is_empty() && self.rules.blocked_domains.contains(&domain) {
            return Some(SkipReason::BlockedDomain(domain));
        }

        let text = format!("{subject}\n{body_text}").to_lowercase();

        if let Some(phrase) = first_match(&text, &self.rules.system_phrases) {
            return Some(SkipReason::SystemPhrase(phrase.to_string()));
        }

        if let Some(phrase) = first_match(&text, &self.rules.promo_phrases) {
            return Some(SkipReason::PromoPhrase(phrase.to_string()));
        }

        if text.contains("dear customer") && (text.contains("team") || text.contains("sincerely")) {
            return Some(SkipReason::MassMailPattern);
        }

        None
    }

    /// Classify a normalized message.
    pub fn classify(&self, message: &NormalizedMessage) -> ClassificationDecision {
        match self.evaluate(&message.subject, &message.body_text, &message.sender_address) {
            Some(reason) => {
                debug!(
                    sender = %message.sender_address,
                    reason = %reason,
                    "Skip rule matched, model call not needed"
                );
                ClassificationDecision::skipped(reason)
            }
            None => ClassificationDecision::escalate(),
        }
    }
}

impl Default for SkipFilter {
    fn default() -> Self {
        Self::new(SkipRules::default())
    }
}

/// Lower-cased text after the last `@`, or empty if there is none.
pub fn sender_domain(address: &str) -> String {
    match address.rfind('@') {
        Some(at) => address[at + 1..].trim().trim_end_matches('>').to_lowercase(),
        None => String::new(),
    }
}

fn first_match<'a>(text: &str, phrases: &'a [String]) -> Option<&'a str> {
    phrases
        .iter()
        .find(|p| text.contains(p.as_str()))
        .map(String::as_str)
}
