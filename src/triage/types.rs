//! Shared types for the triage pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Skip decision ───────────────────────────────────────────────────

/// Which deterministic rule suppressed a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "matched", rename_all = "snake_case")]
pub enum SkipReason {
    BlockedDomain(String),
    SystemPhrase(String),
    PromoPhrase(String),
    MassMailPattern,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockedDomain(domain) => write!(f, "blocked_domain:{domain}"),
            Self::SystemPhrase(phrase) => write!(f, "system_phrase:{phrase}"),
            Self::PromoPhrase(phrase) => write!(f, "promo_phrase:{phrase}"),
            Self::MassMailPattern => f.write_str("mass_mail_pattern"),
        }
    }
}

/// Output of the skip filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationDecision {
    /// False only when a rule fired; otherwise the model decides.
    pub reply_needed: bool,
    /// Set if and only if a rule fired.
    pub skip_reason: Option<SkipReason>,
}

impl ClassificationDecision {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            reply_needed: false,
            skip_reason: Some(reason),
        }
    }

    pub fn escalate() -> Self {
        Self {
            reply_needed: true,
            skip_reason: None,
        }
    }
}

// ── Model output ────────────────────────────────────────────────────

/// Message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    NeedsReply,
    TaskRequest,
    Fyi,
    Spam,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsReply => "needs_reply",
            Self::TaskRequest => "task_request",
            Self::Fyi => "fyi",
            Self::Spam => "spam",
        }
    }
}

/// Low / medium / high, used for both urgency and action-item priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A follow-up extracted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub title: String,
    pub priority: Level,
    pub next_step: Option<String>,
}

/// Lenient view over the model's JSON object.
///
/// The object is untrusted: every field has a fallback and the raw object
/// is kept for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub category: Option<Category>,
    pub urgency: Option<Level>,
    /// True only for a JSON `true`.
    pub reply_needed: bool,
    pub action_items: Vec<ActionItem>,
    pub draft_short: String,
    pub draft_detailed: String,
    /// Clamped to [0, 1]; 0.5 when absent or unparseable.
    pub confidence: f64,
    pub why: Option<String>,
    pub raw: Map<String, Value>,
}

/// Confidence assumed when the model doesn't give a usable one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

impl ModelOutput {
    /// Read a model object, keeping at most `max_action_items` items.
    pub fn from_object(raw: Map<String, Value>, max_action_items: usize) -> Self {
        let category = raw
            .get("category")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let urgency = raw
            .get("urgency")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let reply_needed = matches!(raw.get("reply_needed"), Some(Value::Bool(true)));
        let confidence = raw
            .get("confidence")
            .and_then(number_field)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_CONFIDENCE);

        let action_items = raw
            .get("action_items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(action_item)
                    .take(max_action_items)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            category,
            urgency,
            reply_needed,
            action_items,
            draft_short: string_field(&raw, "draft_short").unwrap_or_default(),
            draft_detailed: string_field(&raw, "draft_detailed").unwrap_or_default(),
            confidence,
            why: string_field(&raw, "why").filter(|w| !w.trim().is_empty()),
            raw,
        }
    }
}

/// A JSON number, or a string holding one (`"0.9"`). Non-finite values are rejected.
fn number_field(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn string_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn action_item(value: &Value) -> Option<ActionItem> {
    let object = value.as_object()?;
    let title = object.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    Some(ActionItem {
        title: title.to_string(),
        priority: object
            .get("priority")
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or_default(),
        next_step: object
            .get("next_step")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty()),
    })
}

// ── Reply plan ──────────────────────────────────────────────────────

/// What the session driver acts on for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPlan {
    pub skip_reason: Option<SkipReason>,
    /// Absent when the message was skipped.
    pub model_output: Option<ModelOutput>,
    /// Empty unless a reply is needed.
    pub short_draft: String,
    /// Empty unless a reply is needed.
    pub detailed_draft: String,
    pub confidence: f64,
    pub needs_review: bool,
}

impl ReplyPlan {
    /// Plan for a message a rule rejected. No model call was made.
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skip_reason: Some(reason),
            model_output: None,
            short_draft: String::new(),
            detailed_draft: String::new(),
            confidence: 0.0,
            needs_review: false,
        }
    }

    pub fn reply_needed(&self) -> bool {
        self.model_output.as_ref().is_some_and(|o| o.reply_needed)
    }
}
