//! Interactive terminal client for document-augmented chat.

use anyhow::{Context, Result};
use clap::Parser;
use docchat::{
    ChatSession, ChatSessionOptions, HttpClientOptions, HttpRetriever, DEFAULT_BASE_URL,
    DEFAULT_PAGE_BUDGET,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod repl;

/// Chat with a model over your indexed documents.
///
/// Type a message to send it. `@document "query"` searches the document index
/// and attaches the matching pages to the message.
#[derive(Parser, Debug)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Base URL of the chat and search server
    #[arg(long, env = "DOCCHAT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Pages requested per document search
    #[arg(long, env = "DOCCHAT_PAGES", default_value_t = DEFAULT_PAGE_BUDGET)]
    pages: u32,

    /// Replace the default system prompt
    #[arg(long, env = "DOCCHAT_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Seconds to wait for the next chunk of a reply before giving up
    #[arg(long, env = "DOCCHAT_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Replies go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let http_options = HttpClientOptions {
        base_url: cli.base_url,
        idle_timeout: Duration::from_secs(cli.idle_timeout_secs),
        ..HttpClientOptions::default()
    };

    let mut session_options = ChatSessionOptions {
        page_budget: cli.pages,
        ..ChatSessionOptions::default()
    };
    if let Some(system_prompt) = cli.system_prompt {
        session_options.system_prompt = system_prompt;
    }

    let session = ChatSession::http(&http_options, session_options)
        .context("failed to configure the chat session")?;
    let uploader =
        HttpRetriever::new(&http_options).context("failed to configure the upload client")?;

    tracing::info!(base_url = %http_options.base_url, "starting docchat");
    repl::Repl::new(session, uploader).run().await
}
