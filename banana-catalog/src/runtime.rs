//! Rendering compiled catalogs
//!
//! Generated code holds a [`Compiled`] artifact per locale and asks for messages by index.
//! Lookups never fail: a missing slot renders as `i18n-404:<index>` and a slot of the wrong
//! shape as `i18n-400:<index>(<raw>)`, so problems show up on the page instead of crashing
//! it.

use crate::compiled::{Compiled, CompiledElement, CompiledEntry, Part};
use crate::error::CatalogResult;
use crate::plural::PluralSelector;

/// Marker rendered for an index with no entry
pub fn missing_marker(index: u32) -> String {
    format!("i18n-404:{}", index)
}

/// Marker rendered for an entry that cannot be used
pub fn invalid_marker(index: u32, raw: &str) -> String {
    format!("i18n-400:{}({})", index, raw)
}

/// Render `element` with positional `args`.
///
/// `tags` receives each tag index with its rendered children and returns the markup for
/// it. An argument index without a value renders as `{n}`.
pub fn render<S, F>(element: &CompiledElement, args: &[S], tags: &F) -> String
where
    S: AsRef<str>,
    F: Fn(u32, String) -> String,
{
    match element {
        CompiledElement::Text(text) => text.clone(),
        CompiledElement::Mixed(parts) | CompiledElement::Composite(parts) => {
            let mut out = String::new();
            render_parts(parts, args, tags, &mut out);
            out
        }
    }
}

fn render_parts<S, F>(parts: &[Part], args: &[S], tags: &F, out: &mut String)
where
    S: AsRef<str>,
    F: Fn(u32, String) -> String,
{
    for part in parts {
        match part {
            Part::Text(text) => out.push_str(text),
            Part::Arg(index) => match args.get(*index as usize) {
                Some(value) => out.push_str(value.as_ref()),
                None => out.push_str(&format!("{{{}}}", index)),
            },
            Part::Tag(tag) => {
                let mut inner = String::new();
                render_parts(&tag.children, args, tags, &mut inner);
                out.push_str(&tags(tag.index, inner));
            }
        }
    }
}

fn raw(entry: &CompiledEntry) -> String {
    serde_json::to_string(entry).unwrap_or_default()
}

/// Message lookup for one locale
pub struct Runtime {
    locale: String,
    compiled: Compiled,
    plurals: Option<PluralSelector>,
}

impl Runtime {
    /// Plural rules are only loaded when the artifact contains plural entries
    pub fn new(locale: &str, compiled: Compiled) -> CatalogResult<Self> {
        let plurals = if compiled.has_plurals {
            Some(PluralSelector::for_locale(locale)?)
        } else {
            None
        };
        Ok(Runtime {
            locale: locale.to_string(),
            compiled,
            plurals,
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn compiled(&self) -> &Compiled {
        &self.compiled
    }

    /// Render a non-plural message, keeping only the content of tags
    pub fn text<S: AsRef<str>>(&self, index: u32, args: &[S]) -> String {
        self.rich(index, args, |_, children| children)
    }

    /// Render a non-plural message, wrapping tag content with `tags`
    pub fn rich<S, F>(&self, index: u32, args: &[S], tags: F) -> String
    where
        S: AsRef<str>,
        F: Fn(u32, String) -> String,
    {
        match self.compiled.get(index) {
            None => missing_marker(index),
            Some(CompiledEntry::Single(element)) => render(element, args, &tags),
            Some(entry) => invalid_marker(index, &raw(entry)),
        }
    }

    /// Render the plural form `count` selects. `args` are passed through unchanged, so
    /// callers that show the count pass it as an argument too.
    pub fn plural<S: AsRef<str>>(&self, index: u32, count: usize, args: &[S]) -> String {
        let entry = match self.compiled.get(index) {
            None => return missing_marker(index),
            Some(entry) => entry,
        };
        let (CompiledEntry::Plural(forms), Some(selector)) = (entry, &self.plurals) else {
            return invalid_marker(index, &raw(entry));
        };
        let form = selector.form_index(count).min(forms.len().saturating_sub(1));
        match forms.get(form) {
            Some(element) => render(element, args, &|_, children| children),
            None => invalid_marker(index, &raw(entry)),
        }
    }
}
