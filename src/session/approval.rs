//! Human approval gate.
//!
//! A reply is only sent after an explicit `APPROVE` or `DETAILED`. Every
//! other answer (including EOF and read errors) is treated as skip.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::mail::NormalizedMessage;
use crate::triage::ReplyPlan;

/// Prompt shown before reading a choice.
pub const APPROVAL_PROMPT: &str = "Type APPROVE to send SHORT, DETAILED to send detailed, or SKIP: ";

/// What the human chose for one draft pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Send the short draft.
    Approve,
    /// Send the detailed draft.
    ApproveDetailed,
    Skip,
}

/// Interpret a typed answer. Case and surrounding whitespace are ignored.
pub fn parse_choice(input: &str) -> Decision {
    match input.trim().to_uppercase().as_str() {
        "APPROVE" => Decision::Approve,
        "DETAILED" => Decision::ApproveDetailed,
        _ => Decision::Skip,
    }
}

/// Source of approval decisions.
#[async_trait]
pub trait Approver: Send {
    /// Decide what to do with the drafts for `message`.
    async fn decide(&mut self, message: &NormalizedMessage, plan: &ReplyPlan) -> Decision;
}

type PromptInput = Box<dyn AsyncBufRead + Send + Unpin>;
type PromptOutput = Box<dyn Write + Send>;

/// Prompts on stdout and reads one line per decision from stdin.
pub struct StdinApprover {
    lines: Lines<PromptInput>,
    prompt_out: PromptOutput,
}

impl StdinApprover {
    pub fn new() -> Self {
        Self::with_io(
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    /// Use other streams in place of stdin/stdout.
    pub fn with_io(input: PromptInput, prompt_out: PromptOutput) -> Self {
        Self {
            lines: input.lines(),
            prompt_out,
        }
    }
}

impl Default for StdinApprover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Approver for StdinApprover {
    async fn decide(&mut self, _message: &NormalizedMessage, _plan: &ReplyPlan) -> Decision {
        let prompt = write!(self.prompt_out, "{APPROVAL_PROMPT}")
            .and_then(|()| self.prompt_out.flush());
        if let Err(e) = prompt {
            tracing::warn!("Error writing approval prompt: {}", e);
        }

        match self.lines.next_line().await {
            Ok(Some(line)) => parse_choice(&line),
            Ok(None) => {
                tracing::debug!("stdin closed, treating as skip");
                Decision::Skip
            }
            Err(e) => {
                tracing::warn!("Error reading stdin: {}", e);
                Decision::Skip
            }
        }
    }
}

/// Declines everything. Selected by `TRIAGE_DRY_RUN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoSkip;

#[async_trait]
impl Approver for AutoSkip {
    async fn decide(&mut self, _message: &NormalizedMessage, _plan: &ReplyPlan) -> Decision {
        Decision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::SkipReason;

    #[test]
    fn exact_keywords() {
        assert_eq!(parse_choice("APPROVE"), Decision::Approve);
        assert_eq!(parse_choice("DETAILED"), Decision::ApproveDetailed);
        assert_eq!(parse_choice("SKIP"), Decision::Skip);
    }

    #[test]
    fn case_and_whitespace_ignored() {
        assert_eq!(parse_choice("  approve \n"), Decision::Approve);
        assert_eq!(parse_choice("Detailed"), Decision::ApproveDetailed);
    }

    #[test]
    fn anything_else_skips() {
        for input in ["", "yes", "y", "approve!", "send", "APPROVED", "detail"] {
            assert_eq!(parse_choice(input), Decision::Skip, "input {input:?}");
        }
    }

    /// Records what was written, or fails every write.
    #[derive(Clone, Default)]
    struct PromptSink {
        written: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
        broken: bool,
    }

    impl Write for PromptSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.broken {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if self.broken {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
            }
            Ok(())
        }
    }

    fn approver(input: &'static str, sink: PromptSink) -> StdinApprover {
        StdinApprover::with_io(Box::new(input.as_bytes()), Box::new(sink))
    }

    fn plan() -> ReplyPlan {
        ReplyPlan::skipped(SkipReason::MassMailPattern)
    }

    #[tokio::test]
    async fn reads_one_answer_per_prompt() {
        let sink = PromptSink::default();
        let mut approver = approver("approve\nDETAILED\nnope\n", sink.clone());
        let message = NormalizedMessage::default();

        assert_eq!(approver.decide(&message, &plan()).await, Decision::Approve);
        assert_eq!(approver.decide(&message, &plan()).await, Decision::ApproveDetailed);
        assert_eq!(approver.decide(&message, &plan()).await, Decision::Skip);
        // Input exhausted.
        assert_eq!(approver.decide(&message, &plan()).await, Decision::Skip);

        let written = String::from_utf8(sink.written.lock().unwrap().clone()).unwrap();
        assert_eq!(written.matches(APPROVAL_PROMPT).count(), 4);
    }

    #[tokio::test]
    async fn broken_prompt_output_still_reads_answer() {
        let sink = PromptSink {
            broken: true,
            ..Default::default()
        };
        let mut approver = approver("APPROVE\n", sink);
        let decision = approver.decide(&NormalizedMessage::default(), &plan()).await;
        assert_eq!(decision, Decision::Approve);
    }

    #[tokio::test]
    async fn auto_skip_declines() {
        let plan = ReplyPlan::skipped(SkipReason::MassMailPattern);
        let decision = AutoSkip.decide(&NormalizedMessage::default(), &plan).await;
        assert_eq!(decision, Decision::Skip);
    }
}
