//! End-to-end triage passes against a fake mailbox and a stub model.
//!
//! No network: the mailbox records sends in memory, the model answers from
//! a per-subject script and the approver replays canned decisions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use inbox_triage::config::PlannerConfig;
use inbox_triage::error::{Error, LlmError, MailError};
use inbox_triage::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use inbox_triage::mail::{MailSource, NormalizedMessage, OutgoingReply};
use inbox_triage::session::{Approver, AutoSkip, Decision, SessionSummary, run_session_with_output};
use inbox_triage::triage::{ReplyPlan, ReplyPlanner, SkipFilter};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeMailbox {
    inbox: Vec<NormalizedMessage>,
    fail_fetch: bool,
    fail_send: bool,
    requested_max: Option<usize>,
    sent: Arc<Mutex<Vec<OutgoingReply>>>,
    logouts: usize,
}

impl FakeMailbox {
    fn with(inbox: Vec<NormalizedMessage>) -> Self {
        Self {
            inbox,
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<OutgoingReply> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSource for FakeMailbox {
    async fn fetch_unread(&mut self, max_count: usize) -> Result<Vec<NormalizedMessage>, MailError> {
        self.requested_max = Some(max_count);
        if self.fail_fetch {
            return Err(MailError::Protocol("SELECT failed: NO mailbox unavailable".into()));
        }
        let start = self.inbox.len().saturating_sub(max_count);
        Ok(self.inbox[start..].to_vec())
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<(), MailError> {
        if self.fail_send {
            return Err(MailError::Send {
                reason: "535 authentication failed".into(),
            });
        }
        self.sent.lock().unwrap().push(reply.clone());
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), MailError> {
        self.logouts += 1;
        Ok(())
    }
}

/// Answers by the `Subject:` line of the user prompt. Unknown subjects fail.
struct ScriptedLlm {
    replies: HashMap<String, String>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(replies: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .iter()
                .map(|(s, r)| (s.to_string(), r.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &request.messages[1].content;
        let subject = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Subject: "))
            .unwrap_or_default();
        match self.replies.get(subject) {
            Some(content) => Ok(CompletionResponse {
                content: content.clone(),
            }),
            None => Err(LlmError::Timeout {
                provider: "scripted".into(),
                timeout: std::time::Duration::from_secs(120),
            }),
        }
    }
}

/// Replays decisions in order; skips once exhausted.
struct ScriptedApprover {
    decisions: VecDeque<Decision>,
    asked: Vec<String>,
}

impl ScriptedApprover {
    fn new(decisions: &[Decision]) -> Self {
        Self {
            decisions: decisions.iter().copied().collect(),
            asked: Vec::new(),
        }
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn decide(&mut self, message: &NormalizedMessage, _plan: &ReplyPlan) -> Decision {
        self.asked.push(message.subject.clone());
        self.decisions.pop_front().unwrap_or(Decision::Skip)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn message(subject: &str, body: &str, sender: &str) -> NormalizedMessage {
    NormalizedMessage {
        sender_display_name: "Sender".into(),
        sender_address: sender.into(),
        subject: subject.into(),
        received_at: "2025-01-14T09:30:00+00:00".into(),
        body_text: body.into(),
        thread_message_id: Some(format!("<{}@mail.example.com>", subject.len())),
        thread_references: Some("<root@mail.example.com>".into()),
    }
}

fn planner(llm: Arc<ScriptedLlm>) -> ReplyPlanner {
    ReplyPlanner::new(llm, SkipFilter::default(), PlannerConfig::default())
}

async fn run(
    mailbox: &mut FakeMailbox,
    llm: Arc<ScriptedLlm>,
    approver: &mut ScriptedApprover,
) -> (Result<SessionSummary, Error>, String) {
    let planner = planner(llm);
    let mut out = Vec::new();
    let result = run_session_with_output(mailbox, &planner, approver, 5, &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

const CONFIDENT_REPLY: &str = r#"{"category": "needs_reply", "urgency": "medium", "reply_needed": true,
  "action_items": [{"title": "Confirm meeting", "priority": "high", "next_step": "Reply with a time"}],
  "draft_short": "Tuesday at 3pm works.\nYachit",
  "draft_detailed": "Hi Alice,\n- Tuesday at 3pm works\n- I'll send an invite\nYachit",
  "confidence": 0.9, "why": "Direct scheduling question"}"#;

const UNSURE_REPLY: &str = r#"Sure, here it is: {"category": "task_request", "urgency": "low", "reply_needed": true,
  "draft_short": "Can you clarify the scope?", "draft_detailed": "Could you clarify:\n- scope\n- deadline",
  "confidence": 0.4, "why": "Ambiguous ask"}"#;

const NO_REPLY: &str = r#"{"category": "fyi", "urgency": "low", "reply_needed": false,
  "draft_short": "should not show", "confidence": 0.95, "why": "Informational"}"#;

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn promotional_message_is_skipped_without_model_call() {
    let mut mailbox = FakeMailbox::with(vec![message(
        "Limited Time Offer — Enroll Now",
        "Seats are filling fast.",
        "promo@deals.example.com",
    )]);
    let llm = ScriptedLlm::new(&[]);
    let mut approver = ScriptedApprover::new(&[Decision::Approve]);

    let (result, transcript) = run(&mut mailbox, Arc::clone(&llm), &mut approver).await;
    let summary = result.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(llm.calls(), 0);
    assert!(approver.asked.is_empty());
    assert!(mailbox.sent().is_empty());
    assert!(transcript.contains("--- Decision ---"));
    assert!(transcript.contains("⏭️ Auto-skip: promo_phrase:enroll now"));
    assert_eq!(mailbox.logouts, 1);
}

#[tokio::test]
async fn approved_short_draft_is_sent_threaded() {
    let original = message("Meeting next week", "Can we meet Tuesday?", "alice@company.com");
    let mut mailbox = FakeMailbox::with(vec![original.clone()]);
    let llm = ScriptedLlm::new(&[("Meeting next week", CONFIDENT_REPLY)]);
    let mut approver = ScriptedApprover::new(&[Decision::Approve]);

    let (result, transcript) = run(&mut mailbox, Arc::clone(&llm), &mut approver).await;
    let summary = result.unwrap();

    assert_eq!(summary.sent, 1);
    assert_eq!(llm.calls(), 1);

    let sent = mailbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@company.com");
    assert_eq!(sent[0].subject, "Re: Meeting next week");
    assert_eq!(sent[0].body, "Tuesday at 3pm works.\nYachit");
    assert_eq!(sent[0].in_reply_to, original.thread_message_id);
    assert_eq!(sent[0].references, original.thread_references);

    assert!(transcript.contains("[1] From: alice@company.com  | Subject: Meeting next week"));
    assert!(transcript.contains("--- AI Decision ---"));
    assert!(transcript.contains("- [high] Confirm meeting | next: Reply with a time"));
    assert!(transcript.contains("--- Draft (SHORT) ---"));
    assert!(transcript.contains("--- Draft (DETAILED) ---"));
    assert!(!transcript.contains("Low confidence"));
    assert!(transcript.contains("✅ Sent SHORT reply (threaded)."));
}

#[tokio::test]
async fn low_confidence_warns_and_sends_detailed() {
    let mut mailbox = FakeMailbox::with(vec![message(
        "Project ask",
        "Could you take a look at this?",
        "bob@company.com",
    )]);
    let llm = ScriptedLlm::new(&[("Project ask", UNSURE_REPLY)]);
    let mut approver = ScriptedApprover::new(&[Decision::ApproveDetailed]);

    let (result, transcript) = run(&mut mailbox, llm, &mut approver).await;
    assert_eq!(result.unwrap().sent, 1);

    assert!(transcript.contains("⚠️ Low confidence → recommend SKIP unless you review carefully."));
    assert!(transcript.contains("- None"));
    assert!(transcript.contains("✅ Sent DETAILED reply (threaded)."));
    assert_eq!(mailbox.sent()[0].body, "Could you clarify:\n- scope\n- deadline");
}

#[tokio::test]
async fn no_reply_needed_never_prompts() {
    let mut mailbox = FakeMailbox::with(vec![message("FYI: release notes", "v2 is out.", "eng@company.com")]);
    let llm = ScriptedLlm::new(&[("FYI: release notes", NO_REPLY)]);
    let mut approver = ScriptedApprover::new(&[Decision::Approve]);

    let (result, transcript) = run(&mut mailbox, llm, &mut approver).await;

    assert_eq!(result.unwrap().no_reply, 1);
    assert!(approver.asked.is_empty());
    assert!(mailbox.sent().is_empty());
    assert!(transcript.contains("⏭️ No reply needed."));
    assert!(!transcript.contains("should not show"));
}

#[tokio::test]
async fn declined_draft_is_not_sent() {
    let mut mailbox = FakeMailbox::with(vec![message("Meeting next week", "Tuesday?", "alice@company.com")]);
    let llm = ScriptedLlm::new(&[("Meeting next week", CONFIDENT_REPLY)]);
    let mut approver = ScriptedApprover::new(&[Decision::Skip]);

    let (result, transcript) = run(&mut mailbox, llm, &mut approver).await;

    assert_eq!(result.unwrap().declined, 1);
    assert!(mailbox.sent().is_empty());
    assert!(transcript.contains("⏭️ Skipped."));
}

#[tokio::test]
async fn dry_run_shows_drafts_but_never_sends() {
    let mut mailbox = FakeMailbox::with(vec![message("Meeting next week", "Tuesday?", "alice@company.com")]);
    let planner = planner(ScriptedLlm::new(&[("Meeting next week", CONFIDENT_REPLY)]));
    let mut out = Vec::new();

    let summary = run_session_with_output(&mut mailbox, &planner, &mut AutoSkip, 5, &mut out)
        .await
        .unwrap();
    let transcript = String::from_utf8(out).unwrap();

    assert_eq!(summary.declined, 1);
    assert!(mailbox.sent().is_empty());
    assert!(transcript.contains("--- Draft (SHORT) ---"));
    assert!(transcript.contains("⏭️ Skipped."));
}

#[tokio::test]
async fn model_failure_is_isolated_to_one_message() {
    let mut mailbox = FakeMailbox::with(vec![
        message("Unanswerable", "The model times out on this one.", "carol@company.com"),
        message("Meeting next week", "Tuesday?", "alice@company.com"),
    ]);
    let llm = ScriptedLlm::new(&[("Meeting next week", CONFIDENT_REPLY)]);
    let mut approver = ScriptedApprover::new(&[Decision::Approve]);

    let (result, transcript) = run(&mut mailbox, Arc::clone(&llm), &mut approver).await;
    let summary = result.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(llm.calls(), 2);
    assert_eq!(approver.asked, vec!["Meeting next week".to_string()]);
    assert!(transcript.contains("❌ Could not plan a reply"));
    assert!(transcript.contains("[2] From: alice@company.com"));
}

#[tokio::test]
async fn malformed_model_output_is_reported() {
    let mut mailbox = FakeMailbox::with(vec![message("Quick one", "Thoughts?", "dan@company.com")]);
    let llm = ScriptedLlm::new(&[("Quick one", "I would reply politely.")]);
    let mut approver = ScriptedApprover::new(&[]);

    let (result, transcript) = run(&mut mailbox, llm, &mut approver).await;

    assert_eq!(result.unwrap().failed, 1);
    assert!(transcript.contains("Model did not return valid JSON"));
    assert!(transcript.contains("I would reply politely."));
}

#[tokio::test]
async fn send_failure_is_reported_and_run_continues() {
    let mut mailbox = FakeMailbox::with(vec![
        message("Meeting next week", "Tuesday?", "alice@company.com"),
        message("Limited Time Offer — Enroll Now", "", "promo@deals.example.com"),
    ]);
    mailbox.fail_send = true;
    let llm = ScriptedLlm::new(&[("Meeting next week", CONFIDENT_REPLY)]);
    let mut approver = ScriptedApprover::new(&[Decision::Approve]);

    let (result, transcript) = run(&mut mailbox, llm, &mut approver).await;
    let summary = result.unwrap();

    assert_eq!(summary.sent, 0);
    assert_eq!(summary.declined, 1);
    assert_eq!(summary.skipped, 1);
    assert!(transcript.contains("❌ Failed to send reply: 535 authentication failed"));
    assert_eq!(mailbox.logouts, 1);
}

#[tokio::test]
async fn empty_inbox_logs_out() {
    let mut mailbox = FakeMailbox::with(vec![]);
    let llm = ScriptedLlm::new(&[]);
    let mut approver = ScriptedApprover::new(&[]);

    let (result, transcript) = run(&mut mailbox, Arc::clone(&llm), &mut approver).await;

    assert_eq!(result.unwrap(), SessionSummary::default());
    assert_eq!(transcript.trim(), "✅ No unread emails found.");
    assert_eq!(mailbox.logouts, 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn fetch_failure_aborts_run() {
    let mut mailbox = FakeMailbox::with(vec![message("Meeting", "Tuesday?", "a@b.com")]);
    mailbox.fail_fetch = true;
    let llm = ScriptedLlm::new(&[]);
    let mut approver = ScriptedApprover::new(&[]);

    let (result, transcript) = run(&mut mailbox, Arc::clone(&llm), &mut approver).await;

    assert!(matches!(result, Err(Error::Mail(MailError::Protocol(_)))));
    assert!(transcript.is_empty());
    assert_eq!(mailbox.logouts, 1);
    assert_eq!(llm.calls(), 0);
}

/// A transcript sink that always fails, like a closed stdout pipe.
struct ClosedPipe;

impl std::io::Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn transcript_failure_still_logs_out() {
    let mut mailbox = FakeMailbox::with(vec![message("Meeting next week", "Tuesday?", "alice@company.com")]);
    let llm = ScriptedLlm::new(&[("Meeting next week", CONFIDENT_REPLY)]);
    let planner = planner(Arc::clone(&llm));
    let mut approver = ScriptedApprover::new(&[Decision::Approve]);

    let result = run_session_with_output(&mut mailbox, &planner, &mut approver, 5, &mut ClosedPipe).await;

    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(mailbox.logouts, 1);
    assert!(mailbox.sent().is_empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn empty_inbox_transcript_failure_still_logs_out() {
    let mut mailbox = FakeMailbox::with(vec![]);
    let planner = planner(ScriptedLlm::new(&[]));
    let mut approver = ScriptedApprover::new(&[]);

    let result = run_session_with_output(&mut mailbox, &planner, &mut approver, 5, &mut ClosedPipe).await;

    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(mailbox.logouts, 1);
}

#[tokio::test]
async fn fetch_is_bounded_and_ordered() {
    let inbox: Vec<_> = (1..=7)
        .map(|i| message(&format!("Newsletter {i}"), "Click to unsubscribe", "news@site.com"))
        .collect();
    let mut mailbox = FakeMailbox::with(inbox);
    let llm = ScriptedLlm::new(&[]);
    let mut approver = ScriptedApprover::new(&[]);

    let (result, transcript) = run(&mut mailbox, llm, &mut approver).await;

    assert_eq!(mailbox.requested_max, Some(5));
    assert_eq!(result.unwrap().skipped, 5);
    let first = transcript.find("Subject: Newsletter 3").unwrap();
    let last = transcript.find("Subject: Newsletter 7").unwrap();
    assert!(first < last);
    assert!(!transcript.contains("Subject: Newsletter 2\n"));
}
