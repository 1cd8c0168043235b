//! Source transformers
//!
//! A transformer finds translatable text in one source file. Framework-specific
//! transformers (templates, components) live outside this crate and plug in through the
//! [`Transformer`] trait. [`KeywordTransformer`] covers plain gettext-style calls:
//!
//! ```text
//! _("Save")
//! _p("menu", "Open")
//! _n("One file", "{0} files", count)
//! ```

use async_trait::async_trait;
use regex::Regex;

use crate::error::{CatalogError, CatalogResult};
use crate::message::{ExtractedMessage, Message, Scope};

/// Finds messages in the content of one source file
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Extract every message occurrence in `content`, in source order.
    ///
    /// # Arguments
    ///
    /// * `content` - The file content
    /// * `file` - Path of the file, as it will appear in catalog references
    async fn transform(&self, content: &str, file: &str) -> CatalogResult<Vec<ExtractedMessage>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

const STRING: &str = r#""((?:[^"\\]|\\.)*)""#;

/// Extracts `_()`, `_p()` and `_n()` calls with string literal arguments
#[derive(Debug, Clone)]
pub struct KeywordTransformer {
    pattern: Regex,
}

impl KeywordTransformer {
    pub fn new() -> CatalogResult<Self> {
        let source = format!(r"\b(_|_n|_p)\(\s*{}(?:\s*,\s*{})?", STRING, STRING);
        let pattern = Regex::new(&source).map_err(|e| CatalogError::Pattern {
            pattern: source.clone(),
            message: e.to_string(),
        })?;
        Ok(KeywordTransformer { pattern })
    }

    /// Synchronous extraction used by the trait implementation
    pub fn extract(&self, content: &str) -> Vec<ExtractedMessage> {
        let mut messages = Vec::new();
        for captures in self.pattern.captures_iter(content) {
            let keyword = captures.get(1).map_or("", |m| m.as_str());
            let first = captures.get(2).map(|m| unescape(m.as_str()));
            let second = captures.get(3).map(|m| unescape(m.as_str()));
            let message = match (keyword, first, second) {
                ("_", Some(text), _) => Message::new(&text, Scope::Script),
                ("_p", Some(context), Some(text)) => {
                    Message::new(&text, Scope::Script).with_context(&context)
                }
                ("_n", Some(singular), Some(plural)) => {
                    Message::plural(&singular, &plural, Scope::Script)
                }
                _ => continue,
            };
            if message.text.iter().all(|text| text.trim().is_empty()) {
                continue;
            }
            messages.push(ExtractedMessage::new(message));
        }
        messages
    }
}

#[async_trait]
impl Transformer for KeywordTransformer {
    async fn transform(&self, content: &str, _file: &str) -> CatalogResult<Vec<ExtractedMessage>> {
        Ok(self.extract(content))
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}
