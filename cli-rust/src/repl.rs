use anyhow::{Context, Result};
use docchat::{
    CancellationToken, ChatEvent, ChatSession, ContextArtifact, DirectiveSpec, HttpRetriever,
    SendOutcome,
};
use std::{
    io::{self, Write},
    path::Path,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

const HELP: &str = r#"Commands:
  @document "query" <text>  search documents and ask about the matching pages
  /search <query>           list matching pages without sending
  /select <n>... | all      add pages from the last search to the context
  /attach <path>            add a local image to the context
  /upload <path>            upload a document to the index
  /context                  list the pages attached to the next message
  /remove <id>              remove a page from the context
  /clear                    empty the context
  /reset                    start a new conversation
  /help                     show this help
  /quit                     exit
Press Ctrl-C while a reply streams to stop it."#;

pub struct Repl {
    session: ChatSession,
    uploader: HttpRetriever,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    hits: Vec<ContextArtifact>,
}

impl Repl {
    pub fn new(mut session: ChatSession, uploader: HttpRetriever) -> Self {
        let events = session.subscribe();
        Self {
            session,
            uploader,
            events,
            hits: vec![],
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("docchat: type /help for commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            prompt()?;
            let Some(line) = lines.next_line().await.context("failed to read input")? else {
                break;
            };
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix('/') {
                if !self.command(command).await? {
                    break;
                }
                continue;
            }

            if self.session.is_command_trigger(line) {
                let suggestions = self.session.suggestions(line);
                if wants_palette(line, &suggestions) {
                    show_suggestions(&suggestions);
                    continue;
                }
            }

            self.send(line).await?;
        }

        Ok(())
    }

    /// Run a slash command. Returns `false` to exit.
    async fn command(&mut self, command: &str) -> Result<bool> {
        let (name, argument) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));

        match name {
            "quit" | "exit" => return Ok(false),
            "help" => println!("{HELP}"),
            "search" => self.search(argument).await,
            "select" => self.select(argument),
            "attach" => self.attach(argument).await,
            "upload" => self.upload(argument).await,
            "context" => self.show_context(),
            "remove" => match self.session.detach(argument) {
                Some(artifact) => println!("Removed {}.", artifact.id),
                None => println!("No page {argument:?} in the context."),
            },
            "clear" => {
                self.session.clear_context();
                println!("Context cleared.");
            }
            "reset" => match self.session.reset() {
                Ok(()) => println!("Conversation reset."),
                Err(error) => eprintln!("{error}"),
            },
            _ => println!("Unknown command /{name}. Type /help for commands."),
        }

        Ok(true)
    }

    async fn send(&mut self, input: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let result = {
            let send = self.session.send_with_cancel(input, cancel.clone());
            tokio::pin!(send);

            loop {
                tokio::select! {
                    result = &mut send => break result,
                    Some(event) = self.events.recv() => render(&event)?,
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => cancel.cancel(),
                }
            }
        };
        while let Ok(event) = self.events.try_recv() {
            render(&event)?;
        }

        match result {
            Ok(SendOutcome::ContextOnly { context }) => {
                println!("{context} page(s) in the context. They will be sent with your next message.");
            }
            Ok(SendOutcome::Failed { error }) => {
                let notice = self.session.messages().last().map(docchat::Message::text);
                eprintln!("{}", notice.unwrap_or_default());
                eprintln!("({error})");
            }
            Ok(SendOutcome::Completed { .. } | SendOutcome::Cancelled { .. }) => {}
            Err(error) => eprintln!("{error}"),
        }

        Ok(())
    }

    async fn search(&mut self, query: &str) {
        match self.session.search(query).await {
            Ok(hits) => {
                if hits.is_empty() {
                    println!("No matching pages.");
                }
                for (index, hit) in hits.iter().enumerate() {
                    println!("[{}] {}", index + 1, describe(hit));
                }
                self.hits = hits;
            }
            Err(error) => eprintln!("{error}"),
        }
    }

    fn select(&mut self, argument: &str) {
        let picked: Vec<ContextArtifact> = if argument == "all" {
            self.hits.clone()
        } else {
            argument
                .split_whitespace()
                .filter_map(|n| n.parse::<usize>().ok())
                .filter_map(|n| n.checked_sub(1).and_then(|i| self.hits.get(i)))
                .cloned()
                .collect()
        };

        if picked.is_empty() {
            println!("Nothing selected. Run /search first, then /select 1 2 or /select all.");
            return;
        }
        let added = self.session.attach(picked);
        println!("Added {added} page(s); {} in the context.", self.session.context().len());
    }

    async fn attach(&mut self, argument: &str) {
        if argument.is_empty() {
            println!("Usage: /attach <path>");
            return;
        }
        match tokio::fs::read(argument).await {
            Ok(bytes) => {
                let artifact =
                    ContextArtifact::from_image_bytes(argument, &bytes, image_mime_type(argument));
                let added = self.session.attach([artifact]);
                println!("Attached {argument} ({added} new).");
            }
            Err(error) => eprintln!("Failed to read {argument}: {error}"),
        }
    }

    async fn upload(&mut self, argument: &str) {
        if argument.is_empty() {
            println!("Usage: /upload <path>");
            return;
        }
        let path = Path::new(argument);
        let file_name = path
            .file_name()
            .map_or_else(|| argument.to_string(), |n| n.to_string_lossy().into_owned());

        match tokio::fs::read(path).await {
            Ok(bytes) => match self.uploader.upload(&file_name, bytes).await {
                Ok(message) => println!("{message}"),
                Err(error) => eprintln!("{error}"),
            },
            Err(error) => eprintln!("Failed to read {argument}: {error}"),
        }
    }

    fn show_context(&self) {
        if self.session.context().is_empty() {
            println!("The context is empty.");
            return;
        }
        for artifact in self.session.context().iter() {
            println!("- {}", describe(artifact));
        }
    }

}

/// A trailing `@token` opens the directive list when it names a known
/// directive, or when it is the whole input. Anything else is sent as typed.
fn wants_palette(line: &str, suggestions: &[DirectiveSpec]) -> bool {
    if suggestions.is_empty() {
        return false;
    }
    let line = line.trim();
    line == "@"
        || line
            .rsplit(char::is_whitespace)
            .next()
            .is_some_and(|token| token.len() > 1 && token.starts_with('@'))
}

fn show_suggestions(suggestions: &[DirectiveSpec]) {
    for directive in suggestions {
        println!("{:<12} {}", directive.token(), directive.description);
    }
    println!(r#"Type the query in quotes, e.g. @document "quarterly revenue"."#);
}

fn render(event: &ChatEvent) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match event {
        ChatEvent::RetrievalStarted { query } => {
            writeln!(stdout, "Searching documents for {query:?}...")?;
        }
        ChatEvent::RetrievalFinished { artifacts, .. } => {
            writeln!(stdout, "Found {artifacts} page(s).")?;
        }
        ChatEvent::Delta { text } => write!(stdout, "{text}")?,
        ChatEvent::Completed => writeln!(stdout)?,
        ChatEvent::Cancelled => writeln!(stdout, " [stopped]")?,
        ChatEvent::Failed { .. } => writeln!(stdout)?,
        ChatEvent::MessageAppended { .. } => {}
    }
    stdout.flush()?;
    Ok(())
}

fn prompt() -> Result<()> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}

fn describe(artifact: &ContextArtifact) -> String {
    let mut line = artifact.id.clone();
    if let (Some(doc_id), Some(page_num)) = (&artifact.doc_id, artifact.page_num) {
        line.push_str(&format!(" (document {doc_id}, page {page_num})"));
    }
    if let Some(score) = artifact.score {
        line.push_str(&format!(" score {score:.2}"));
    }
    line
}

fn image_mime_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Vec<DirectiveSpec> {
        vec![DirectiveSpec::new("document", "Search through documents.")]
    }

    #[test]
    fn typed_directive_prefix_opens_the_palette() {
        assert!(wants_palette("@doc", &document()));
        assert!(wants_palette("look this up @d", &document()));
        assert!(wants_palette("@", &document()));
    }

    #[test]
    fn trailing_bare_at_is_sent_as_text() {
        assert!(!wants_palette("ping me @", &document()));
    }

    #[test]
    fn unknown_token_is_sent_as_text() {
        assert!(!wants_palette("ping @bob", &[]));
    }
}
