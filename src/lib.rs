//! Inbox Triage — skip rules, model-drafted replies, human-approved sends.

pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod session;
pub mod triage;
