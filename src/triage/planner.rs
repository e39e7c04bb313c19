//! Reply planner — skip filter first, then one model call for the rest.
//!
//! Flow:
//! 1. Skip filter (no network) → may short-circuit with a skipped plan
//! 2. Model call → JSON object with category, urgency, items and drafts
//! 3. Lenient read of that object into a [`ReplyPlan`]

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::error::TriageError;
use crate::llm::{LlmProvider, complete_json};
use crate::mail::NormalizedMessage;

use super::skip::SkipFilter;
use super::types::{ModelOutput, ReplyPlan};

/// Builds a reply plan for each message.
pub struct ReplyPlanner {
    llm: Arc<dyn LlmProvider>,
    filter: SkipFilter,
    config: PlannerConfig,
}

impl ReplyPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>, filter: SkipFilter, config: PlannerConfig) -> Self {
        Self {
            llm,
            filter,
            config,
        }
    }

    /// Plan a reply for one message.
    ///
    /// Skipped messages never reach the model. Model and parse failures are
    /// returned as errors; no plan is fabricated for them.
    pub async fn plan(&self, message: &NormalizedMessage) -> Result<ReplyPlan, TriageError> {
        if let Some(reason) = self.filter.classify(message).skip_reason {
            return Ok(ReplyPlan::skipped(reason));
        }

        let system_prompt = build_system_prompt(&self.config);
        let user_prompt = build_user_prompt(message, &self.config);

        info!(
            sender = %message.sender_address,
            model = self.llm.model_name(),
            "Requesting classification"
        );

        let object = complete_json(
            self.llm.as_ref(),
            &system_prompt,
            &user_prompt,
            self.config.temperature,
            self.config.timeout,
        )
        .await?;

        let output = ModelOutput::from_object(object, self.config.max_action_items);
        let plan = plan_from_output(output, self.config.review_threshold);

        debug!(
            reply_needed = plan.reply_needed(),
            confidence = plan.confidence,
            needs_review = plan.needs_review,
            "Reply plan ready"
        );

        Ok(plan)
    }
}

/// Turn model output into a plan. Drafts are dropped unless a reply is needed.
pub fn plan_from_output(output: ModelOutput, review_threshold: f64) -> ReplyPlan {
    let confidence = output.confidence;
    let (short_draft, detailed_draft) = if output.reply_needed {
        (output.draft_short.clone(), output.draft_detailed.clone())
    } else {
        (String::new(), String::new())
    };

    ReplyPlan {
        skip_reason: None,
        model_output: Some(output),
        short_draft,
        detailed_draft,
        confidence,
        needs_review: confidence < review_threshold,
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// System instruction describing the JSON contract.
pub fn build_system_prompt(config: &PlannerConfig) -> String {
    format!(
        "You are an email triage + reply assistant for a busy professional.\n\
         Return STRICT JSON only (no markdown, no extra text).\n\n\
         Be conservative:\n\
         - If it's a newsletter/promo/system/bank notice, set reply_needed=false and category=\"fyi\".\n\
         - Do NOT invent facts. If needed info is missing, ask 1-3 crisp questions.\n\n\
         Schema:\n\
         {{\n  \
           \"category\": \"needs_reply\" | \"task_request\" | \"fyi\" | \"spam\",\n  \
           \"urgency\": \"low\" | \"medium\" | \"high\",\n  \
           \"reply_needed\": true|false,\n  \
           \"action_items\": [{{\"title\": \"...\", \"priority\": \"low|medium|high\", \"next_step\": \"...\"}}],\n  \
           \"draft_short\": \"string\",\n  \
           \"draft_detailed\": \"string\",\n  \
           \"confidence\": 0.0-1.0,\n  \
           \"why\": \"short reason\"\n\
         }}\n\
         At most {max} action_items.",
        max = config.max_action_items
    )
}

/// User message: headers, truncated body and drafting instructions.
pub fn build_user_prompt(message: &NormalizedMessage, config: &PlannerConfig) -> String {
    let body: String = message.body_text.chars().take(config.body_char_limit).collect();

    format!(
        "EMAIL\n\
         From: {name} <{address}>\n\
         Subject: {subject}\n\
         Received: {received}\n\n\
         Body (clean text):\n\
         {body}\n\n\
         TASK\n\
         1) Decide category + urgency + reply_needed.\n\
         2) Extract action items (max {max}).\n\
         3) If reply_needed=true, draft:\n   \
            - draft_short (2-4 lines)\n   \
            - draft_detailed (6-12 lines, bullets if useful)\n\
         Sign as: {signature}",
        name = message.sender_display_name,
        address = message.sender_address,
        subject = message.subject,
        received = message.received_at,
        max = config.max_action_items,
        signature = config.signature,
    )
}
