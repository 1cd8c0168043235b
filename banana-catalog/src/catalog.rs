use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::message::{Message, PlaceholderRef, message_key};

/// Flag marking a translation for review
pub const FUZZY_FLAG: &str = "fuzzy";

/// Where a message occurs in one source file.
///
/// Each occurrence carries the placeholder expressions used at that location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file: String,
    pub occurrences: Vec<Vec<PlaceholderRef>>,
}

/// A persisted catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Source text, two entries for plural messages
    pub msgid: Vec<String>,
    /// Translated forms, an empty string means untranslated
    pub msgstr: Vec<String>,
    pub context: Option<String>,
    pub references: Vec<FileRef>,
    /// Translator comments (`# `)
    pub comments: Vec<String>,
    /// Comments taken from the source code (`#. `)
    #[serde(default)]
    pub extracted_comments: Vec<String>,
    /// Flags other than URL adapters, kept verbatim
    pub flags: Vec<String>,
    /// Keys of the agents that use this item as a URL pattern
    pub url_adapters: Vec<String>,
}

impl CatalogItem {
    /// An untranslated item with `nplurals` empty forms for plural source text
    pub fn new(msgid: Vec<String>, context: Option<String>, nplurals: usize) -> Self {
        let forms = if msgid.len() > 1 { nplurals.max(1) } else { 1 };
        CatalogItem {
            msgid,
            msgstr: vec![String::new(); forms],
            context,
            ..Default::default()
        }
    }

    pub fn from_message(message: &Message, nplurals: usize) -> Self {
        Self::new(message.text.clone(), message.context.clone(), nplurals)
    }

    pub fn key(&self) -> String {
        message_key(&self.msgid, self.context.as_deref())
    }

    pub fn is_plural(&self) -> bool {
        self.msgid.len() > 1
    }

    /// No source file refers to the item and it is not a URL pattern
    pub fn is_obsolete(&self) -> bool {
        self.references.is_empty() && self.url_adapters.is_empty()
    }

    pub fn is_translated(&self) -> bool {
        !self.msgstr.is_empty() && self.msgstr.iter().all(|form| !form.is_empty())
    }

    pub fn is_fuzzy(&self) -> bool {
        self.flags.iter().any(|flag| flag == FUZZY_FLAG)
    }

    /// Record one more occurrence in `file`
    pub fn add_reference(&mut self, file: &str, placeholders: Vec<PlaceholderRef>) {
        match self.references.iter_mut().find(|r| r.file == file) {
            Some(reference) => reference.occurrences.push(placeholders),
            None => self.references.push(FileRef {
                file: file.to_string(),
                occurrences: vec![placeholders],
            }),
        }
    }

    /// Forget the occurrences recorded for `file`, keeping its reference where it is so a
    /// rescan can refill it
    pub fn clear_occurrences(&mut self, file: &str) {
        if let Some(reference) = self.references.iter_mut().find(|r| r.file == file) {
            reference.occurrences.clear();
        }
    }

    /// Drop the reference to `file` when a rescan left it without occurrences
    pub fn drop_empty_reference(&mut self, file: &str) {
        self.references
            .retain(|reference| reference.file != file || !reference.occurrences.is_empty());
    }

    /// Drop every reference whose file satisfies `predicate`, returning how many were dropped
    pub fn remove_references<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.references.len();
        self.references.retain(|reference| !predicate(&reference.file));
        before - self.references.len()
    }

    pub fn add_extracted_comment(&mut self, comment: &str) {
        if !self.extracted_comments.iter().any(|c| c == comment) {
            self.extracted_comments.push(comment.to_string());
        }
    }

    pub fn add_url_adapter(&mut self, adapter: &str) {
        if !self.url_adapters.iter().any(|a| a == adapter) {
            self.url_adapters.push(adapter.to_string());
        }
    }
}

/// Translation counts for one catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub untranslated: usize,
    pub obsolete: usize,
}

/// Catalog for one locale: ordered headers and items keyed by message key.
///
/// Item order is the stored order, which index reseeding depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub headers: Vec<(String, String)>,
    items: IndexMap<String, CatalogItem>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CatalogItem> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CatalogItem> {
        self.items.get_mut(key)
    }

    /// Insert or replace an item under its own key
    pub fn insert(&mut self, item: CatalogItem) {
        self.items.insert(item.key(), item);
    }

    /// The item stored at `key`, created with `create` when absent
    pub fn get_or_insert_with<F>(&mut self, key: &str, create: F) -> &mut CatalogItem
    where
        F: FnOnce() -> CatalogItem,
    {
        self.items.entry(key.to_string()).or_insert_with(create)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.items.values()
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut CatalogItem> {
        self.items.values_mut()
    }

    /// Remove obsolete items, keeping the order of the rest
    pub fn remove_obsolete(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| !item.is_obsolete());
        before - self.items.len()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(header) => header.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Serialized form used to detect whether a pass changed anything
    pub fn snapshot(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            total: self.items.len(),
            ..Default::default()
        };
        for item in self.items.values() {
            if !item.is_translated() {
                stats.untranslated += 1;
            }
            if item.is_obsolete() {
                stats.obsolete += 1;
            }
        }
        stats
    }
}
