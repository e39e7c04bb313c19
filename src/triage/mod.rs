//! Triage pipeline.
//!
//! Every unread message flows through:
//! 1. `SkipFilter::classify()` — deterministic rules (no LLM)
//! 2. `ReplyPlanner::plan()` — one model call for messages that pass
//!
//! **Nothing here sends mail.** Delivery only happens after human approval
//! in `crate::session`.

pub mod planner;
pub mod skip;
pub mod types;

pub use planner::ReplyPlanner;
pub use skip::{SkipFilter, sender_domain};
pub use types::{
    ActionItem, Category, ClassificationDecision, Level, ModelOutput, ReplyPlan, SkipReason,
};
