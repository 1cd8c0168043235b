//! State shared by every agent that writes to the same catalog location
//!
//! Several extraction agents (for example one for templates, one for scripts) may write to
//! the same catalog files. They must see one in-memory catalog, otherwise their saves would
//! overwrite each other. The [`Registry`] hands out one [`SharedState`] per storage key.
//! The first agent to attach owns the state; later agents register their file matcher so
//! the owner can tell which references still belong to someone.

use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::index::IndexTracker;
use crate::plural::PluralRulesDescriptor;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Include and ignore globs selecting the files of one agent
#[derive(Debug, Clone, Default)]
pub struct FileMatcher {
    include: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl FileMatcher {
    pub fn new(include: &[String], ignore: &[String]) -> CatalogResult<Self> {
        Ok(FileMatcher {
            include: compile_patterns(include)?,
            ignore: compile_patterns(ignore)?,
        })
    }

    /// Whether `file` is selected by an include pattern and by no ignore pattern
    pub fn matches(&self, file: &str) -> bool {
        let file = file.strip_prefix("./").unwrap_or(file);
        self.include
            .iter()
            .any(|p| p.matches_with(file, MATCH_OPTIONS))
            && !self
                .ignore
                .iter()
                .any(|p| p.matches_with(file, MATCH_OPTIONS))
    }

    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(Pattern::as_str)
    }
}

fn compile_patterns(patterns: &[String]) -> CatalogResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|e| CatalogError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// The live catalog of one locale
#[derive(Debug, Clone)]
pub struct LocaleCatalog {
    pub catalog: Catalog,
    pub plural_rules: PluralRulesDescriptor,
    /// Whether the catalog was read from storage (or found missing) yet
    pub loaded: bool,
}

/// Catalogs and indices for one storage location
#[derive(Debug)]
pub struct SharedState {
    storage_key: String,
    owner: String,
    source_locale: String,
    pub(crate) catalogs: IndexMap<String, LocaleCatalog>,
    pub(crate) index: IndexTracker,
    matchers: IndexMap<String, FileMatcher>,
}

impl SharedState {
    fn new(storage_key: &str, owner: &str, source_locale: &str) -> Self {
        SharedState {
            storage_key: storage_key.to_string(),
            owner: owner.to_string(),
            source_locale: source_locale.to_string(),
            catalogs: IndexMap::new(),
            index: IndexTracker::new(),
            matchers: IndexMap::new(),
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_owner(&self, agent: &str) -> bool {
        self.owner == agent
    }

    pub fn source_locale(&self) -> &str {
        &self.source_locale
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }

    pub fn catalog(&self, locale: &str) -> Option<&Catalog> {
        self.catalogs.get(locale).map(|lc| &lc.catalog)
    }

    pub fn catalog_mut(&mut self, locale: &str) -> Option<&mut Catalog> {
        self.catalogs.get_mut(locale).map(|lc| &mut lc.catalog)
    }

    pub fn plural_rules(&self, locale: &str) -> Option<&PluralRulesDescriptor> {
        self.catalogs.get(locale).map(|lc| &lc.plural_rules)
    }

    pub fn index(&self) -> &IndexTracker {
        &self.index
    }

    /// Locales whose catalog has not been read from storage yet
    pub fn unloaded_locales(&self) -> Vec<String> {
        self.catalogs
            .iter()
            .filter(|(_, lc)| !lc.loaded)
            .map(|(locale, _)| locale.clone())
            .collect()
    }

    pub(crate) fn set_loaded(&mut self, locale: &str, catalog: Catalog) {
        if let Some(lc) = self.catalogs.get_mut(locale) {
            lc.catalog = catalog;
            lc.loaded = true;
        }
    }

    /// Matchers of every attached agent except `agent`
    pub fn sibling_matchers<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a FileMatcher> {
        self.matchers
            .iter()
            .filter(move |(key, _)| key.as_str() != agent)
            .map(|(_, matcher)| matcher)
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.matchers.keys().map(String::as_str)
    }
}

/// All shared states of one build, keyed by storage key
#[derive(Debug, Default)]
pub struct Registry {
    states: HashMap<String, SharedState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, storage_key: &str) -> Option<&SharedState> {
        self.states.get(storage_key)
    }

    pub fn get_mut(&mut self, storage_key: &str) -> Option<&mut SharedState> {
        self.states.get_mut(storage_key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Attach an agent to the state for `storage_key`, creating it on first use.
    ///
    /// # Errors
    ///
    /// * `SourceLocaleConflict` - the state exists with another source locale
    /// * `InvalidLocale` - a locale has no plural rules
    pub fn attach(
        &mut self,
        storage_key: &str,
        agent: &str,
        source_locale: &str,
        locales: &[String],
        matcher: FileMatcher,
    ) -> CatalogResult<&mut SharedState> {
        let state = self
            .states
            .entry(storage_key.to_string())
            .or_insert_with(|| SharedState::new(storage_key, agent, source_locale));

        if state.source_locale != source_locale {
            return Err(CatalogError::SourceLocaleConflict {
                storage: storage_key.to_string(),
                existing: state.source_locale.clone(),
                requested: source_locale.to_string(),
            });
        }

        let source = std::iter::once(source_locale.to_string());
        for locale in source.chain(locales.iter().cloned()) {
            if state.catalogs.contains_key(&locale) {
                continue;
            }
            let plural_rules = PluralRulesDescriptor::for_locale(&locale)?;
            state.catalogs.insert(
                locale,
                LocaleCatalog {
                    catalog: Catalog::new(),
                    plural_rules,
                    loaded: false,
                },
            );
        }

        if state.matchers.insert(agent.to_string(), matcher).is_none() && !state.is_owner(agent) {
            tracing::debug!(
                "Agent '{}' joined catalog '{}' owned by '{}'",
                agent,
                storage_key,
                state.owner
            );
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(include: &[&str]) -> FileMatcher {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        FileMatcher::new(&include, &[]).unwrap()
    }

    #[test]
    fn test_file_matcher() {
        let matcher = FileMatcher::new(
            &["src/**/*.html".to_string(), "app/*.js".to_string()],
            &["src/vendor/**".to_string()],
        )
        .unwrap();
        assert!(matcher.matches("src/index.html"));
        assert!(matcher.matches("./src/pages/about.html"));
        assert!(matcher.matches("app/main.js"));
        assert!(!matcher.matches("app/nested/main.js"));
        assert!(!matcher.matches("src/vendor/lib.html"));
        assert!(!matcher.matches("src/index.js"));
    }

    #[test]
    fn test_invalid_glob() {
        assert!(matches!(
            FileMatcher::new(&["src/[".to_string()], &[]),
            Err(CatalogError::Pattern { .. })
        ));
    }

    #[test]
    fn test_attach_creates_once() {
        let mut registry = Registry::new();
        let locales = vec!["en".to_string(), "fr".to_string()];
        registry
            .attach("po:locales", "main", "en", &locales, matcher(&["src/**"]))
            .unwrap();
        let state = registry
            .attach("po:locales", "docs", "en", &locales, matcher(&["docs/**"]))
            .unwrap();
        assert_eq!(state.owner(), "main");
        assert!(!state.is_owner("docs"));
        assert_eq!(state.locales().collect::<Vec<_>>(), vec!["en", "fr"]);
        assert_eq!(state.agents().collect::<Vec<_>>(), vec!["main", "docs"]);
        assert_eq!(state.sibling_matchers("main").count(), 1);
        assert_eq!(state.plural_rules("en").unwrap().nplurals(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_attach_rejects_source_locale_conflict() {
        let mut registry = Registry::new();
        registry
            .attach("po:locales", "main", "en", &[], matcher(&["src/**"]))
            .unwrap();
        let err = registry
            .attach("po:locales", "other", "de", &[], matcher(&["other/**"]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::SourceLocaleConflict { .. }));
    }

    #[test]
    fn test_attach_extends_locales() {
        let mut registry = Registry::new();
        registry
            .attach("k", "a", "en", &["fr".to_string()], matcher(&["a/**"]))
            .unwrap();
        let state = registry
            .attach("k", "b", "en", &["es".to_string()], matcher(&["b/**"]))
            .unwrap();
        assert_eq!(state.locales().collect::<Vec<_>>(), vec!["en", "fr", "es"]);
        assert_eq!(state.unloaded_locales(), vec!["en", "fr", "es"]);
    }
}
