use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// The directive that triggers a document search.
pub const DOCUMENT_DIRECTIVE: &str = "document";

/// A directive the parser recognizes, with the text shown in the suggestion
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSpec {
    pub name: String,
    pub description: String,
}

impl DirectiveSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// The `@name` token as typed by the user.
    #[must_use]
    pub fn token(&self) -> String {
        format!("@{}", self.name)
    }
}

/// A complete `@name "query"` directive extracted from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub query: String,
}

/// Result of parsing one input. Recomputed on every input change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// The input with the directive removed, or the raw input if there is
    /// none.
    pub literal_text: String,
    pub directive: Option<Directive>,
    /// Name of a directive whose quoted parameter is still open.
    pub partial: Option<String>,
}

impl PendingCommand {
    fn literal(raw: &str) -> Self {
        Self {
            literal_text: raw.to_string(),
            directive: None,
            partial: None,
        }
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.directive.as_ref().map(|d| d.query.as_str())
    }

    /// The user opened a quote after a directive but has not closed it yet.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    #[must_use]
    pub fn partial_directive(&self) -> Option<&str> {
        self.partial.as_deref()
    }
}

/// Recognizes inline directives in free-text input.
pub trait CommandGrammar: Send + Sync {
    /// Split `raw` into literal text and at most one directive.
    fn parse(&self, raw: &str) -> PendingCommand;

    /// Whether the input ends in a bare `@name` token that is not yet followed
    /// by a quoted parameter. Never true for input holding a complete
    /// directive.
    fn is_command_trigger(&self, raw: &str) -> bool;

    /// Directives matching the `@name` token being typed. Empty when the input
    /// is not a trigger.
    fn suggestions(&self, raw: &str) -> Vec<DirectiveSpec>;
}

fn complete_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"@(\w+)\s*"([^"]*)""#).expect("valid directive pattern"))
}

fn partial_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"@(\w+)\s*"[^"]*$"#).expect("valid partial pattern"))
}

fn trigger_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:^|\s)@(\w*)$").expect("valid trigger pattern"))
}

/// The `@name "query"` grammar over a registry of known directive names.
#[derive(Debug, Clone)]
pub struct CommandParser {
    directives: Vec<DirectiveSpec>,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(vec![DirectiveSpec::new(
            DOCUMENT_DIRECTIVE,
            r#"Search through documents. Use @document "query" to search."#,
        )])
    }
}

impl CommandParser {
    #[must_use]
    pub fn new(directives: Vec<DirectiveSpec>) -> Self {
        Self { directives }
    }

    #[must_use]
    pub fn with_directive(mut self, directive: DirectiveSpec) -> Self {
        self.directives.push(directive);
        self
    }

    #[must_use]
    pub fn directives(&self) -> &[DirectiveSpec] {
        &self.directives
    }

    fn recognizes(&self, name: &str) -> bool {
        self.directives.iter().any(|d| d.name == name)
    }

    fn has_complete_directive(&self, raw: &str) -> bool {
        complete_pattern()
            .captures_iter(raw)
            .any(|caps| self.recognizes(&caps[1]))
    }
}

impl CommandGrammar for CommandParser {
    fn parse(&self, raw: &str) -> PendingCommand {
        for caps in complete_pattern().captures_iter(raw) {
            let name = &caps[1];
            if !self.recognizes(name) {
                debug!(directive = name, "ignoring unknown directive");
                continue;
            }

            let query = caps[2].trim();
            if query.is_empty() {
                debug!(directive = name, "directive has an empty query, keeping input literal");
                return PendingCommand::literal(raw);
            }

            let Some(span) = caps.get(0) else {
                continue;
            };

            return PendingCommand {
                literal_text: splice_out(raw, span.start(), span.end()),
                directive: Some(Directive {
                    name: name.to_string(),
                    query: query.to_string(),
                }),
                partial: None,
            };
        }

        if let Some(caps) = partial_pattern().captures(raw) {
            if self.recognizes(&caps[1]) {
                return PendingCommand {
                    literal_text: raw.to_string(),
                    directive: None,
                    partial: Some(caps[1].to_string()),
                };
            }
        }

        PendingCommand::literal(raw)
    }

    fn is_command_trigger(&self, raw: &str) -> bool {
        trigger_pattern().is_match(raw) && !self.has_complete_directive(raw)
    }

    fn suggestions(&self, raw: &str) -> Vec<DirectiveSpec> {
        if !self.is_command_trigger(raw) {
            return vec![];
        }
        let Some(caps) = trigger_pattern().captures(raw) else {
            return vec![];
        };
        let typed = caps[1].to_lowercase();

        self.directives
            .iter()
            .filter(|d| d.name.to_lowercase().starts_with(&typed))
            .cloned()
            .collect()
    }
}

/// Remove `raw[start..end]` and collapse the whitespace around the gap.
fn splice_out(raw: &str, start: usize, end: usize) -> String {
    let prefix = raw[..start].trim();
    let suffix = raw[end..].trim();

    match (prefix.is_empty(), suffix.is_empty()) {
        (true, _) => suffix.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix} {suffix}"),
    }
}
