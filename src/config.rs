//! Configuration types.
//!
//! Everything is read once at startup and passed down by value. Nothing in
//! the triage pipeline reads the environment on its own.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Phrases that mark automated / no-reply mail, in scan order.
pub const DEFAULT_SYSTEM_PHRASES: &[&str] = &[
    "do not reply",
    "please do not reply",
    "system generated",
    "this is a system generated",
    "automated message",
    "no-reply",
    "noreply",
    "unsubscribe",
    "view in browser",
];

/// Promotional marker phrases, in scan order.
pub const DEFAULT_PROMO_PHRASES: &[&str] = &[
    "register now",
    "enroll now",
    "limited time",
    "hurry",
    "offer",
    "discount",
    "webinar",
    "workshop",
    "promotion",
];

/// Sender domains that never get a reply (banks, bulk senders).
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "icicibank.com",
    "custcomm.icicibank.com",
    "no-reply.hack2skill.com",
    "nptel.iitm.ac.in",
    "sendgrid.net",
];

/// Deterministic skip-rule tables.
///
/// Phrase lists keep their order: the first phrase found is the one reported.
#[derive(Debug, Clone)]
pub struct SkipRules {
    /// Lower-cased sender domains.
    pub blocked_domains: HashSet<String>,
    /// Lower-cased system phrases.
    pub system_phrases: Vec<String>,
    /// Lower-cased promotional phrases.
    pub promo_phrases: Vec<String>,
}

impl SkipRules {
    /// Rules with no entries. Only the mass-mail heuristic remains active.
    pub fn empty() -> Self {
        Self {
            blocked_domains: HashSet::new(),
            system_phrases: Vec::new(),
            promo_phrases: Vec::new(),
        }
    }

    /// Replace the blocked-domain set.
    pub fn with_blocked_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    /// Replace the system phrase list.
    pub fn with_system_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.system_phrases = normalize_phrases(phrases);
        self
    }

    /// Replace the promotional phrase list.
    pub fn with_promo_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.promo_phrases = normalize_phrases(phrases);
        self
    }
}

impl Default for SkipRules {
    fn default() -> Self {
        Self::empty()
            .with_blocked_domains(DEFAULT_BLOCKED_DOMAINS)
            .with_system_phrases(DEFAULT_SYSTEM_PHRASES)
            .with_promo_phrases(DEFAULT_PROMO_PHRASES)
    }
}

fn normalize_phrases<I, S>(phrases: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    phrases
        .into_iter()
        .map(|p| p.as_ref().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Reply planner tuning.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Sampling temperature for the classification call.
    pub temperature: f32,
    /// Timeout for one model call.
    pub timeout: Duration,
    /// Body characters sent to the model.
    pub body_char_limit: usize,
    /// Confidence below this flags the plan for review.
    pub review_threshold: f64,
    /// Maximum action items requested from the model.
    pub max_action_items: usize,
    /// Name drafts are signed with.
    pub signature: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            timeout: Duration::from_secs(120),
            body_char_limit: 2500,
            review_threshold: 0.75,
            max_action_items: 5,
            signature: "Yachit".to_string(),
        }
    }
}

/// Mailbox connection settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub address: String,
    pub password: SecretString,
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
}

/// Model endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL without trailing slash, e.g. `http://localhost:11434`.
    pub base_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "gemma2:2b".to_string(),
        }
    }
}

/// Full configuration for one triage run.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub mail: MailConfig,
    pub llm: LlmConfig,
    pub skip: SkipRules,
    pub planner: PlannerConfig,
    /// Unread messages processed per run.
    pub max_messages: usize,
    /// Show drafts but never prompt or send.
    pub dry_run: bool,
}

impl TriageConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let address = get("GMAIL_ADDRESS").ok_or_else(|| ConfigError::MissingRequired {
            key: "GMAIL_ADDRESS".into(),
            hint: "Set it in the environment or in .env.".into(),
        })?;
        let password = get("GMAIL_APP_PASSWORD").ok_or_else(|| ConfigError::MissingRequired {
            key: "GMAIL_APP_PASSWORD".into(),
            hint: "Create an app password for the mailbox and set it in the environment or in .env.".into(),
        })?;

        let mail = MailConfig {
            address,
            password: SecretString::from(password),
            imap_host: get("IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".into()),
            imap_port: parse_or("IMAP_PORT", get("IMAP_PORT"), 993)?,
            smtp_host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".into()),
            smtp_port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
        };

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            base_url: get("OLLAMA_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(llm_defaults.base_url),
            model: get("OLLAMA_MODEL").unwrap_or(llm_defaults.model),
        };

        let mut skip = SkipRules::default();
        if let Some(domains) = get("TRIAGE_BLOCKED_DOMAINS") {
            skip = skip.with_blocked_domains(domains.split(','));
        }

        let planner_defaults = PlannerConfig::default();
        let timeout_secs = parse_or(
            "TRIAGE_LLM_TIMEOUT_SECS",
            get("TRIAGE_LLM_TIMEOUT_SECS"),
            planner_defaults.timeout.as_secs(),
        )?;
        let planner = PlannerConfig {
            timeout: Duration::from_secs(timeout_secs),
            signature: get("TRIAGE_SIGNATURE").unwrap_or(planner_defaults.signature.clone()),
            ..planner_defaults
        };

        let max_messages = parse_or("TRIAGE_MAX_MESSAGES", get("TRIAGE_MAX_MESSAGES"), 5)?;
        let dry_run = parse_flag("TRIAGE_DRY_RUN", get("TRIAGE_DRY_RUN"))?;

        Ok(Self {
            mail,
            llm,
            skip,
            planner,
            max_messages,
            dry_run,
        })
    }
}

/// `1/true/yes/on` or `0/false/no/off`, case-insensitive. Unset is false.
fn parse_flag(key: &str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: expected true or false"),
        }),
    }
}

/// Load `.env` from the working directory or a parent into the process
/// environment. Variables that are already set keep their values.
///
/// Returns the file that was loaded, if any. Must run before the runtime
/// spawns threads.
pub fn load_dotenv() -> Option<PathBuf> {
    report_dotenv(dotenvy::dotenv())
}

fn report_dotenv(result: Result<PathBuf, dotenvy::Error>) -> Option<PathBuf> {
    match result {
        Ok(path) => {
            debug!(path = %path.display(), "Loaded .env");
            Some(path)
        }
        Err(e) if e.not_found() => {
            debug!("No .env file found, using process environment only");
            None
        }
        Err(e) => {
            warn!("Ignoring unreadable .env: {}", e);
            None
        }
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
