use serde::{Deserialize, Serialize};

/// Separator between the text and the context in a message key, as in gettext
const CONTEXT_SEPARATOR: char = '\u{4}';

/// Where in a source file a message was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// String literal in script code
    Script,
    /// Text content of markup
    Markup,
    /// Markup attribute value
    Attribute,
}

/// A unit of extractable source text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    /// One entry, or two for singular and plural source forms
    pub text: Vec<String>,
    pub scope: Scope,
    pub context: Option<String>,
}

impl Message {
    pub fn new(text: &str, scope: Scope) -> Self {
        Message {
            text: vec![text.to_string()],
            scope,
            context: None,
        }
    }

    pub fn plural(singular: &str, plural: &str, scope: Scope) -> Self {
        Message {
            text: vec![singular.to_string(), plural.to_string()],
            scope,
            context: None,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    pub fn is_plural(&self) -> bool {
        self.text.len() > 1
    }

    /// Catalog identity of this message
    pub fn key(&self) -> String {
        message_key(&self.text, self.context.as_deref())
    }
}

/// Compute the catalog key for source text and an optional context.
///
/// Only the first two text entries take part. Messages that differ only in surrounding
/// whitespace share a key.
pub fn message_key(text: &[String], context: Option<&str>) -> String {
    let mut key = text
        .iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(context) = context {
        key.push(CONTEXT_SEPARATOR);
        key.push_str(context);
    }
    key.trim().to_string()
}

/// The source expression behind placeholder `{index}` at one occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderRef {
    pub index: u32,
    pub expression: String,
}

impl PlaceholderRef {
    pub fn new(index: u32, expression: &str) -> Self {
        PlaceholderRef {
            index,
            expression: expression.to_string(),
        }
    }
}

/// One occurrence of a message as reported by a transformer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub message: Message,
    pub placeholders: Vec<PlaceholderRef>,
    /// Comments left for translators next to the source text
    pub comments: Vec<String>,
}

impl ExtractedMessage {
    pub fn new(message: Message) -> Self {
        ExtractedMessage {
            message,
            placeholders: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn with_placeholder(mut self, index: u32, expression: &str) -> Self {
        self.placeholders.push(PlaceholderRef::new(index, expression));
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comments.push(comment.to_string());
        self
    }
}
