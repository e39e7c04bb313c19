//! Session driver — one interactive triage pass over unread mail.
//!
//! Fetch → plan → show → ask → send, one message at a time. The transcript
//! goes to stdout; diagnostics go through `tracing`.

pub mod approval;

pub use approval::{AutoSkip, Approver, Decision, StdinApprover, parse_choice};

use std::io::Write;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::mail::{MailSource, NormalizedMessage, OutgoingReply};
use crate::triage::{ModelOutput, ReplyPlan, ReplyPlanner};

/// Characters of body shown before the drafts.
pub const PREVIEW_CHARS: usize = 700;

const HEAVY_RULE: usize = 90;

/// Counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub fetched: usize,
    /// Stopped by a skip rule.
    pub skipped: usize,
    /// Model said no reply is needed.
    pub no_reply: usize,
    pub sent: usize,
    /// Drafts shown but not approved, or approved but failed to send.
    pub declined: usize,
    /// Model call or output parsing failed.
    pub failed: usize,
}

/// Run one pass, writing the transcript to stdout.
pub async fn run_session(
    mailbox: &mut dyn MailSource,
    planner: &ReplyPlanner,
    approver: &mut dyn Approver,
    max_messages: usize,
) -> Result<SessionSummary> {
    let mut stdout = std::io::stdout();
    run_session_with_output(mailbox, planner, approver, max_messages, &mut stdout).await
}

/// Run one pass, writing the transcript to `out`.
///
/// Fetch failures abort the pass. A failed model call only abandons that
/// message; a failed send is reported and the pass continues. The session
/// is logged out on every exit path.
pub async fn run_session_with_output(
    mailbox: &mut dyn MailSource,
    planner: &ReplyPlanner,
    approver: &mut dyn Approver,
    max_messages: usize,
    out: &mut dyn Write,
) -> Result<SessionSummary> {
    let fetched = mailbox.fetch_unread(max_messages).await;
    let result = match fetched {
        Ok(messages) => process_messages(&*mailbox, planner, approver, &messages, out).await,
        Err(e) => Err(e.into()),
    };

    let logout = mailbox.logout().await;
    match result {
        Ok(summary) => {
            logout?;
            Ok(summary)
        }
        Err(e) => {
            if let Err(logout_err) = logout {
                warn!("Logout after failed pass also failed: {}", logout_err);
            }
            Err(e)
        }
    }
}

async fn process_messages(
    mailbox: &dyn MailSource,
    planner: &ReplyPlanner,
    approver: &mut dyn Approver,
    messages: &[NormalizedMessage],
    out: &mut dyn Write,
) -> Result<SessionSummary> {
    let mut summary = SessionSummary {
        fetched: messages.len(),
        ..Default::default()
    };

    if messages.is_empty() {
        writeln!(out, "✅ No unread emails found.")?;
        return Ok(summary);
    }

    info!(count = messages.len(), "Processing unread messages");

    for (index, message) in messages.iter().enumerate() {
        write_header(out, index + 1, message)?;

        let plan = match planner.plan(message).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(sender = %message.sender_address, "Planning failed: {}", e);
                writeln!(out, "\n❌ Could not plan a reply: {e}")?;
                summary.failed += 1;
                continue;
            }
        };

        if let Some(reason) = &plan.skip_reason {
            writeln!(out, "\n--- Decision ---")?;
            writeln!(out, "⏭️ Auto-skip: {reason}")?;
            summary.skipped += 1;
            continue;
        }

        if let Some(output) = &plan.model_output {
            write_model_output(out, output)?;
        }

        if !plan.reply_needed() {
            writeln!(out, "\n⏭️ No reply needed.")?;
            summary.no_reply += 1;
            continue;
        }

        write_drafts(out, &plan)?;
        out.flush()?;

        let body = match approver.decide(message, &plan).await {
            Decision::Approve => Some((&plan.short_draft, "SHORT")),
            Decision::ApproveDetailed => Some((&plan.detailed_draft, "DETAILED")),
            Decision::Skip => None,
        };

        let Some((body, label)) = body else {
            writeln!(out, "⏭️ Skipped.")?;
            summary.declined += 1;
            continue;
        };

        let reply = OutgoingReply::to_message(message, body.as_str());
        match mailbox.send_reply(&reply).await {
            Ok(()) => {
                writeln!(out, "✅ Sent {label} reply (threaded).")?;
                summary.sent += 1;
            }
            Err(e) => {
                error!(to = %reply.to, "Send failed: {}", e);
                writeln!(out, "❌ {e}")?;
                summary.declined += 1;
            }
        }
    }

    Ok(summary)
}

/// Body preview: the first 700 characters, with an ellipsis if cut.
pub fn preview(body: &str) -> String {
    if body.is_empty() {
        return "(No body text found)".to_string();
    }
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn write_header(out: &mut dyn Write, index: usize, message: &NormalizedMessage) -> std::io::Result<()> {
    writeln!(out, "\n{}", "=".repeat(HEAVY_RULE))?;
    writeln!(
        out,
        "[{index}] From: {}  | Subject: {}",
        message.sender_address, message.subject
    )?;
    writeln!(out, "Received: {}", message.received_at)?;
    writeln!(out, "{}", "-".repeat(HEAVY_RULE))?;
    writeln!(out, "{}", preview(&message.body_text))
}

fn write_model_output(out: &mut dyn Write, output: &ModelOutput) -> std::io::Result<()> {
    let category = output.category.map_or("unknown", |c| c.as_str());
    let urgency = output.urgency.map_or("unknown", |u| u.as_str());

    writeln!(out, "\n--- AI Decision ---")?;
    writeln!(
        out,
        "category: {category} | urgency: {urgency} | reply_needed: {} | confidence: {:.2} | why: {}",
        output.reply_needed,
        output.confidence,
        output.why.as_deref().unwrap_or("-"),
    )?;

    writeln!(out, "\n--- AI Action Items ---")?;
    if output.action_items.is_empty() {
        writeln!(out, "- None")?;
    }
    for item in &output.action_items {
        writeln!(
            out,
            "- [{}] {} | next: {}",
            item.priority.as_str(),
            item.title,
            item.next_step.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}

fn write_drafts(out: &mut dyn Write, plan: &ReplyPlan) -> std::io::Result<()> {
    writeln!(out, "\n--- Draft (SHORT) ---\n")?;
    writeln!(out, "{}", plan.short_draft)?;
    writeln!(out, "\n--- Draft (DETAILED) ---\n")?;
    writeln!(out, "{}", plan.detailed_draft)?;
    if plan.needs_review {
        writeln!(
            out,
            "\n⚠️ Low confidence → recommend SKIP unless you review carefully."
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_short_body_unchanged() {
        assert_eq!(preview("Hello"), "Hello");
    }

    #[test]
    fn preview_empty_body() {
        assert_eq!(preview(""), "(No body text found)");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let body = "ü".repeat(PREVIEW_CHARS + 3);
        let shown = preview(&body);
        assert!(shown.ends_with('…'));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 1);
    }

    #[test]
    fn preview_exact_limit_has_no_ellipsis() {
        let body = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&body), body);
    }
}
