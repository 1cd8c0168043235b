//! Gettext `.po` catalog storage
//!
//! Each locale is stored as `{dir}/{locale}.po`. Items are written as:
//!
//! ```text
//! # translator comment
//! #. comment from the source code
//! #: src/page.html
//! #. {0}: user.name
//! #, fuzzy, url:main
//! msgctxt "menu"
//! msgid "Hello {0}"
//! msgstr "Bonjour {0}"
//! ```
//!
//! Every `#:` line is one occurrence. `#. {n}: expr` lines that follow it record the
//! expression behind each placeholder at that occurrence. `url:<agent>` flags mark URL
//! pattern items, other flags are kept as they are.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, CatalogItem};
use crate::error::{CatalogError, CatalogResult};
use crate::message::PlaceholderRef;
use crate::storage::CatalogStorage;

const URL_FLAG_PREFIX: &str = "url:";

/// Gettext catalogs in one directory
#[derive(Debug, Clone)]
pub struct PoStorage {
    dir: PathBuf,
}

impl PoStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PoStorage { dir: dir.into() }
    }

    pub fn path_for(&self, locale: &str) -> PathBuf {
        self.dir.join(format!("{}.po", locale))
    }
}

#[async_trait]
impl CatalogStorage for PoStorage {
    fn key(&self) -> String {
        format!("po:{}", self.dir.display())
    }

    async fn load(&self, locale: &str) -> CatalogResult<Option<Catalog>> {
        let path = self.path_for(locale);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_po(&content, &path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::Storage {
                location: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn save(&self, locale: &str, catalog: &Catalog) -> CatalogResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(locale);
        tokio::fs::write(&path, write_po(catalog))
            .await
            .map_err(|e| CatalogError::Storage {
                location: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::info!("Wrote catalog {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Context,
    Id,
    IdPlural,
    Str(usize),
}

/// An entry being accumulated while reading lines
#[derive(Debug, Default)]
struct PendingEntry {
    item: CatalogItem,
    msgid: Option<String>,
    msgid_plural: Option<String>,
    msgstr: BTreeMap<usize, String>,
    field: Option<Field>,
    /// Reference and occurrence positions of the last `#:` entry
    last_occurrence: Option<(usize, usize)>,
}

impl PendingEntry {
    fn push_str(&mut self, field: Field, value: &str) {
        match field {
            Field::Context => self
                .item
                .context
                .get_or_insert_with(String::new)
                .push_str(value),
            Field::Id => self.msgid.get_or_insert_with(String::new).push_str(value),
            Field::IdPlural => self
                .msgid_plural
                .get_or_insert_with(String::new)
                .push_str(value),
            Field::Str(n) => self.msgstr.entry(n).or_default().push_str(value),
        }
    }

    fn push_occurrence(&mut self, file: &str) {
        self.item.add_reference(file, Vec::new());
        self.last_occurrence = self
            .item
            .references
            .iter()
            .position(|reference| reference.file == file)
            .map(|i| (i, self.item.references[i].occurrences.len() - 1));
    }

    fn last_occurrence_mut(&mut self) -> Option<&mut Vec<PlaceholderRef>> {
        let (reference, occurrence) = self.last_occurrence?;
        self.item
            .references
            .get_mut(reference)?
            .occurrences
            .get_mut(occurrence)
    }

    fn finish(self, catalog: &mut Catalog) {
        let Some(msgid) = self.msgid else {
            return;
        };
        let forms = self.msgstr.keys().next_back().map_or(1, |last| last + 1);
        let mut msgstr = vec![String::new(); forms];
        for (n, value) in self.msgstr {
            msgstr[n] = value;
        }

        if msgid.is_empty() && self.item.context.is_none() {
            catalog.headers = parse_headers(&msgstr[0]);
            return;
        }

        let mut item = self.item;
        item.msgid = vec![msgid];
        item.msgid.extend(self.msgid_plural);
        item.msgstr = msgstr;
        catalog.insert(item);
    }
}

fn parse_headers(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn corrupt(path: &Path, line: usize, message: &str) -> CatalogError {
    CatalogError::CorruptCatalog {
        location: path.display().to_string(),
        line,
        message: message.to_string(),
    }
}

/// Parse the contents of a `.po` file
pub fn parse_po(content: &str, path: &Path) -> CatalogResult<Catalog> {
    let mut catalog = Catalog::new();
    let mut entry = PendingEntry::default();

    for (n, raw) in content.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.trim();

        if line.is_empty() {
            std::mem::take(&mut entry).finish(&mut catalog);
            continue;
        }

        // A comment after a message line starts a new entry
        if line.starts_with('#') && entry.msgid.is_some() {
            std::mem::take(&mut entry).finish(&mut catalog);
        }

        if let Some(rest) = line.strip_prefix("#,") {
            for flag in rest.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                match flag.strip_prefix(URL_FLAG_PREFIX) {
                    Some(adapter) => entry.item.add_url_adapter(adapter),
                    None => entry.item.flags.push(flag.to_string()),
                }
            }
        } else if let Some(rest) = line.strip_prefix("#:") {
            for file in rest.split_whitespace() {
                entry.push_occurrence(file);
            }
        } else if let Some(rest) = line.strip_prefix("#.") {
            let rest = rest.trim();
            let attached = match (parse_placeholder_comment(rest), entry.last_occurrence_mut()) {
                (Some(placeholder), Some(occurrence)) => {
                    occurrence.push(placeholder);
                    true
                }
                _ => false,
            };
            if !attached {
                entry.item.extracted_comments.push(rest.to_string());
            }
        } else if line.starts_with("#~") || line.starts_with("#|") {
            // previous and obsolete gettext entries are not tracked
        } else if let Some(rest) = line.strip_prefix('#') {
            let comment = rest.strip_prefix(' ').unwrap_or(rest);
            entry.item.comments.push(comment.to_string());
        } else if line.starts_with('"') {
            let field = entry
                .field
                .ok_or_else(|| corrupt(path, line_no, "continuation line outside of a message"))?;
            let value = unquote(line).ok_or_else(|| corrupt(path, line_no, "unterminated string"))?;
            entry.push_str(field, &value);
        } else {
            let (keyword, rest) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| corrupt(path, line_no, "expected a keyword and a string"))?;
            let field = parse_keyword(keyword)
                .ok_or_else(|| corrupt(path, line_no, &format!("unknown keyword '{}'", keyword)))?;
            if matches!(field, Field::Context | Field::Id) && entry.msgid.is_some() {
                std::mem::take(&mut entry).finish(&mut catalog);
            }
            let value = unquote(rest).ok_or_else(|| corrupt(path, line_no, "unterminated string"))?;
            entry.push_str(field, &value);
            entry.field = Some(field);
        }
    }
    entry.finish(&mut catalog);
    Ok(catalog)
}

fn parse_keyword(keyword: &str) -> Option<Field> {
    match keyword {
        "msgctxt" => Some(Field::Context),
        "msgid" => Some(Field::Id),
        "msgid_plural" => Some(Field::IdPlural),
        "msgstr" => Some(Field::Str(0)),
        _ => {
            let n = keyword.strip_prefix("msgstr[")?.strip_suffix(']')?;
            n.parse().ok().map(Field::Str)
        }
    }
}

/// `{n}: expression`
fn parse_placeholder_comment(text: &str) -> Option<PlaceholderRef> {
    let rest = text.strip_prefix('{')?;
    let (index, rest) = rest.split_once('}')?;
    let expression = rest.strip_prefix(':')?;
    Some(PlaceholderRef::new(index.parse().ok()?, expression.trim()))
}

/// Remove surrounding quotes and unescape. `None` when the quotes are missing.
fn unquote(s: &str) -> Option<String> {
    let s = s.trim();
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn write_string(out: &mut String, keyword: &str, value: &str) {
    let multiline = value.trim_end_matches('\n').contains('\n');
    if !multiline {
        out.push_str(&format!("{} \"{}\"\n", keyword, escape(value)));
        return;
    }
    out.push_str(&format!("{} \"\"\n", keyword));
    for line in value.split_inclusive('\n') {
        out.push_str(&format!("\"{}\"\n", escape(line)));
    }
}

/// Render a catalog as `.po` text
pub fn write_po(catalog: &Catalog) -> String {
    let mut out = String::new();

    if !catalog.headers.is_empty() {
        let header: String = catalog
            .headers
            .iter()
            .map(|(name, value)| format!("{}: {}\n", name, value))
            .collect();
        out.push_str("msgid \"\"\n");
        write_string(&mut out, "msgstr", &header);
        out.push('\n');
    }

    for item in catalog.items() {
        for comment in &item.comments {
            if comment.is_empty() {
                out.push_str("#\n");
            } else {
                out.push_str(&format!("# {}\n", comment));
            }
        }
        for comment in &item.extracted_comments {
            if comment.is_empty() {
                out.push_str("#.\n");
            } else {
                out.push_str(&format!("#. {}\n", comment));
            }
        }
        for reference in &item.references {
            for occurrence in &reference.occurrences {
                out.push_str(&format!("#: {}\n", reference.file));
                for placeholder in occurrence {
                    out.push_str(&format!(
                        "#. {{{}}}: {}\n",
                        placeholder.index, placeholder.expression
                    ));
                }
            }
        }
        let flags: Vec<String> = item
            .flags
            .iter()
            .cloned()
            .chain(
                item.url_adapters
                    .iter()
                    .map(|adapter| format!("{}{}", URL_FLAG_PREFIX, adapter)),
            )
            .collect();
        if !flags.is_empty() {
            out.push_str(&format!("#, {}\n", flags.join(", ")));
        }
        if let Some(context) = &item.context {
            write_string(&mut out, "msgctxt", context);
        }
        let msgid = item.msgid.first().map(String::as_str).unwrap_or_default();
        write_string(&mut out, "msgid", msgid);
        if let Some(plural) = item.msgid.get(1) {
            write_string(&mut out, "msgid_plural", plural);
            for (n, form) in item.msgstr.iter().enumerate() {
                write_string(&mut out, &format!("msgstr[{}]", n), form);
            }
        } else {
            let msgstr = item.msgstr.first().map(String::as_str).unwrap_or_default();
            write_string(&mut out, "msgstr", msgstr);
        }
        out.push('\n');
    }
    out
}
