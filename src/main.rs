use std::sync::Arc;

use inbox_triage::config::{TriageConfig, load_dotenv};
use inbox_triage::llm::{LlmProvider, OllamaProvider};
use inbox_triage::mail::ImapMailbox;
use inbox_triage::session::{Approver, AutoSkip, StdinApprover, run_session};
use inbox_triage::triage::{ReplyPlanner, SkipFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    // Logs go to stderr; stdout carries the transcript
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();

    let config = TriageConfig::from_env().unwrap_or_else(|e| {
        eprintln!("❌ {e}");
        std::process::exit(1);
    });

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.mail.address);
    eprintln!("   Model: {} @ {}", config.llm.model, config.llm.base_url);
    eprintln!("   Max messages: {}", config.max_messages);
    if config.dry_run {
        eprintln!("   Dry run: drafts are shown, nothing is sent");
    }
    eprintln!();

    let llm: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(&config.llm));
    let planner = ReplyPlanner::new(llm, SkipFilter::new(config.skip), config.planner);

    let mut mailbox = ImapMailbox::connect(config.mail).await?;
    let mut approver: Box<dyn Approver> = if config.dry_run {
        Box::new(AutoSkip)
    } else {
        Box::new(StdinApprover::new())
    };

    let summary = run_session(
        &mut mailbox,
        &planner,
        approver.as_mut(),
        config.max_messages,
    )
    .await?;

    tracing::info!(
        fetched = summary.fetched,
        skipped = summary.skipped,
        no_reply = summary.no_reply,
        sent = summary.sent,
        declined = summary.declined,
        failed = summary.failed,
        "Triage pass complete"
    );

    Ok(())
}
