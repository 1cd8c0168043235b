//! The catalog synchronizer
//!
//! An [`Agent`] owns one group of source files (selected by its [`FileMatcher`]) and keeps
//! the catalogs of every locale in step with them. One extraction pass:
//!
//! 1. loads the catalogs from storage on first use
//! 2. runs the transformer on every file and merges what it finds
//! 3. in clean mode, strips references to files the agent is responsible for but did not
//!    rescan, then removes items no file refers to anymore
//! 4. saves the catalogs that changed
//! 5. recompiles, publishing a [`CatalogEvent`] per load unit whose artifact changed
//!
//! Running a pass twice over unchanged files saves nothing the second time.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogItem, CatalogStats};
use crate::compiled::{Compiled, CompiledElement, CompiledEntry};
use crate::compiler::{compile, try_compile};
use crate::equivalence::is_equivalent;
use crate::error::{CatalogError, CatalogResult};
use crate::granular::{GranularStates, LoadIdFn};
use crate::index::IndexTracker;
use crate::message::{ExtractedMessage, message_key};
use crate::runtime::invalid_marker;
use crate::shared::{FileMatcher, Registry, SharedState};
use crate::storage::CatalogStorage;
use crate::transformer::Transformer;
use crate::url::UrlManifestItem;

const EVENT_CAPACITY: usize = 64;

/// How files are read and transformed during a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Read and transform every file concurrently, then merge in input order
    #[default]
    Parallel,
    /// Read, transform and merge one file at a time
    Sequential,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Drop stale references and items no file refers to
    pub clean: bool,
    pub mode: ScanMode,
}

/// Published when the compiled artifact of a load unit changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEvent {
    pub agent: String,
    /// `None` for the single bundle of a non-granular agent
    pub load_id: Option<String>,
}

/// What one file contributed to a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub file: String,
    pub load_id: Option<String>,
    /// Index of every extracted occurrence, in source order. Granular agents report
    /// unit-local indices.
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files: Vec<FileOutcome>,
    /// Locales whose catalog was saved
    pub written: Vec<String>,
    /// Load units whose compiled artifact changed
    pub updated_units: Vec<Option<String>>,
    /// References stripped in clean mode, summed over locales
    pub removed_references: usize,
    /// Obsolete items removed in clean mode, summed over locales
    pub removed_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleStatus {
    pub locale: String,
    #[serde(flatten)]
    pub stats: CatalogStats,
}

/// Synchronizes one group of source files with the shared catalogs
pub struct Agent {
    key: String,
    source_locale: String,
    /// Source locale first, then the others in configuration order
    locales: Vec<String>,
    root: PathBuf,
    matcher: FileMatcher,
    transformer: Arc<dyn Transformer>,
    storage: Arc<dyn CatalogStorage>,
    storage_key: String,
    granular: Option<GranularStates>,
    compiled: BTreeMap<String, Compiled>,
    events: broadcast::Sender<CatalogEvent>,
}

impl Agent {
    pub fn new(
        key: &str,
        source_locale: &str,
        locales: &[String],
        matcher: FileMatcher,
        transformer: Arc<dyn Transformer>,
        storage: Arc<dyn CatalogStorage>,
    ) -> Self {
        let mut all = vec![source_locale.to_string()];
        for locale in locales {
            if !all.contains(locale) {
                all.push(locale.clone());
            }
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Agent {
            key: key.to_string(),
            source_locale: source_locale.to_string(),
            locales: all,
            root: PathBuf::from("."),
            matcher,
            transformer,
            storage_key: storage.key(),
            storage,
            granular: None,
            compiled: BTreeMap::new(),
            events,
        }
    }

    /// Directory that file paths are relative to
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Compile one artifact per load unit, grouping files with `load_id`
    pub fn with_granular(mut self, load_id: LoadIdFn) -> Self {
        self.granular = Some(GranularStates::new(load_id));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn matcher(&self) -> &FileMatcher {
        &self.matcher
    }

    /// Compiled bundle for `locale`. Always `None` for granular agents.
    pub fn compiled(&self, locale: &str) -> Option<&Compiled> {
        self.compiled.get(locale)
    }

    pub fn granular(&self) -> Option<&GranularStates> {
        self.granular.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    /// Attach to the shared state of this agent's storage and read every catalog that is
    /// not in memory yet. The first load of a state seeds message indices from the stored
    /// order of the source catalog.
    pub async fn load(&self, registry: &mut Registry) -> CatalogResult<()> {
        let state = registry.attach(
            &self.storage_key,
            &self.key,
            &self.source_locale,
            &self.locales,
            self.matcher.clone(),
        )?;
        for locale in state.unloaded_locales() {
            let catalog = match self.storage.load(&locale).await? {
                Some(catalog) => catalog,
                None => {
                    debug!("No catalog stored for '{}' in {}", locale, self.storage_key);
                    new_catalog(&locale, state.plural_rules(&locale).map_or(1, |r| r.nplurals()))
                }
            };
            state.set_loaded(&locale, catalog);
        }
        if state.index.is_empty() {
            let keys: Vec<String> = state
                .catalog(state.source_locale())
                .map(|catalog| catalog.keys().map(str::to_string).collect())
                .unwrap_or_default();
            state.index.reload(keys);
        }
        Ok(())
    }

    async fn state<'r>(&self, registry: &'r mut Registry) -> CatalogResult<&'r mut SharedState> {
        if registry
            .get(&self.storage_key)
            .is_none_or(|state| !state.agents().any(|agent| agent == self.key))
        {
            self.load(registry).await?;
        }
        registry
            .get_mut(&self.storage_key)
            .ok_or_else(|| CatalogError::UnknownCatalog(self.storage_key.clone()))
    }

    /// Run one extraction pass over `files`.
    ///
    /// Files the agent's matcher does not select are skipped. A file that cannot be read or
    /// transformed aborts the pass before anything is saved or stripped. In parallel mode it
    /// also aborts before any merge.
    pub async fn extract(
        &mut self,
        registry: &mut Registry,
        files: &[String],
        options: ExtractOptions,
    ) -> CatalogResult<ExtractReport> {
        let state = self.state(registry).await?;
        let files: Vec<&str> = files
            .iter()
            .map(String::as_str)
            .filter(|file| {
                let selected = self.matcher.matches(file);
                if !selected {
                    debug!("Agent '{}' skips {}", self.key, file);
                }
                selected
            })
            .collect();
        let snapshots = snapshots(state);
        let mut report = ExtractReport::default();

        match options.mode {
            ScanMode::Parallel => {
                let scans = join_all(files.iter().map(|file| self.scan_file(file)))
                    .await
                    .into_iter()
                    .collect::<CatalogResult<Vec<_>>>()?;
                for (file, messages) in files.iter().zip(scans) {
                    let outcome = self.merge_file(state, file, messages);
                    report.files.push(outcome);
                }
            }
            ScanMode::Sequential => {
                for file in &files {
                    let messages = self.scan_file(file).await?;
                    let outcome = self.merge_file(state, file, messages);
                    report.files.push(outcome);
                }
            }
        }

        if options.clean {
            let rescanned: BTreeSet<&str> = files.iter().copied().collect();
            report.removed_references = self.strip_references(state, &rescanned);
            for lc in state.catalogs.values_mut() {
                report.removed_items += lc.catalog.remove_obsolete();
            }
        }

        report.written = self.save_changed(state, &snapshots).await?;
        report.updated_units = self.compile(state);
        self.publish(&report.updated_units);

        info!(
            "Agent '{}' extracted {} files, saved {} catalogs",
            self.key,
            report.files.len(),
            report.written.len()
        );
        Ok(report)
    }

    /// Extract a single file, as done when one file changes during development
    pub async fn extract_file(
        &mut self,
        registry: &mut Registry,
        file: &str,
    ) -> CatalogResult<ExtractReport> {
        let options = ExtractOptions {
            clean: false,
            mode: ScanMode::Sequential,
        };
        self.extract(registry, &[file.to_string()], options).await
    }

    async fn scan_file(&self, file: &str) -> CatalogResult<Vec<ExtractedMessage>> {
        let content = tokio::fs::read_to_string(self.root.join(file)).await?;
        self.transformer
            .transform(&content, file)
            .await
            .map_err(|e| match e {
                CatalogError::Transform { .. } => e,
                other => CatalogError::Transform {
                    file: file.to_string(),
                    message: other.to_string(),
                },
            })
    }

    /// Replace the references of `file` with what was just extracted from it
    fn merge_file(
        &mut self,
        state: &mut SharedState,
        file: &str,
        messages: Vec<ExtractedMessage>,
    ) -> FileOutcome {
        let source_locale = state.source_locale().to_string();
        for lc in state.catalogs.values_mut() {
            for item in lc.catalog.items_mut() {
                item.clear_occurrences(file);
            }
        }

        let mut unit = self.granular.as_mut().map(|g| g.state_for_file(file));
        let mut indices = Vec::with_capacity(messages.len());
        for extracted in messages {
            let key = extracted.message.key();
            for (locale, lc) in state.catalogs.iter_mut() {
                let nplurals = lc.plural_rules.nplurals();
                let item = lc.catalog.get_or_insert_with(&key, || {
                    CatalogItem::from_message(&extracted.message, nplurals)
                });
                item.add_reference(file, extracted.placeholders.clone());
                for comment in &extracted.comments {
                    item.add_extracted_comment(comment);
                }
                if *locale == source_locale {
                    item.msgstr = mirror_source(&item.msgid, nplurals);
                }
            }
            let index = state.index.get(&key);
            indices.push(match unit.as_mut() {
                Some(unit) => unit.index.get(&key),
                None => index,
            });
        }
        for lc in state.catalogs.values_mut() {
            for item in lc.catalog.items_mut() {
                item.drop_empty_reference(file);
            }
        }

        FileOutcome {
            file: file.to_string(),
            load_id: unit.map(|unit| unit.id.clone()),
            indices,
        }
    }

    /// Strip references to files that were not rescanned in this pass and that this agent
    /// is responsible for: its own files, and its siblings' files unless it owns the shared
    /// state.
    fn strip_references(&self, state: &mut SharedState, rescanned: &BTreeSet<&str>) -> usize {
        let siblings: Vec<FileMatcher> = if state.is_owner(&self.key) {
            Vec::new()
        } else {
            state.sibling_matchers(&self.key).cloned().collect()
        };
        let responsible = |file: &str| {
            !rescanned.contains(file)
                && (self.matcher.matches(file)
                    || siblings.iter().any(|matcher| matcher.matches(file)))
        };
        let mut removed = 0;
        for lc in state.catalogs.values_mut() {
            for item in lc.catalog.items_mut() {
                removed += item.remove_references(&responsible);
            }
        }
        removed
    }

    async fn save_changed(
        &self,
        state: &SharedState,
        snapshots: &[(String, String)],
    ) -> CatalogResult<Vec<String>> {
        let mut written = Vec::new();
        for (locale, before) in snapshots {
            let Some(catalog) = state.catalog(locale) else {
                continue;
            };
            if catalog.snapshot() == *before {
                continue;
            }
            self.storage.save(locale, catalog).await?;
            written.push(locale.clone());
        }
        Ok(written)
    }

    /// Recompile every artifact of this agent, returning the load units that changed
    fn compile(&mut self, state: &SharedState) -> Vec<Option<String>> {
        let mut updated = Vec::new();
        match self.granular.as_mut() {
            None => {
                let compiled: BTreeMap<String, Compiled> = state
                    .catalogs
                    .iter()
                    .map(|(locale, lc)| {
                        let keys = lc.catalog.keys();
                        (locale.clone(), compile_catalog(&lc.catalog, &state.index, keys))
                    })
                    .collect();
                if compiled != self.compiled {
                    self.compiled = compiled;
                    updated.push(None);
                }
            }
            Some(granular) => {
                for unit in granular.states_mut() {
                    let compiled: BTreeMap<String, Compiled> = state
                        .catalogs
                        .iter()
                        .map(|(locale, lc)| {
                            let keys = unit.index.keys().into_iter();
                            (locale.clone(), compile_catalog(&lc.catalog, &unit.index, keys))
                        })
                        .collect();
                    if compiled != unit.compiled {
                        unit.compiled = compiled;
                        updated.push(Some(unit.id.clone()));
                    }
                }
            }
        }
        updated
    }

    fn publish(&self, units: &[Option<String>]) {
        for unit in units {
            let event = CatalogEvent {
                agent: self.key.clone(),
                load_id: unit.clone(),
            };
            // Nobody listening is fine
            let _ = self.events.send(event);
        }
    }

    /// Translation counts per locale
    pub fn status(&self, registry: &Registry) -> CatalogResult<Vec<LocaleStatus>> {
        let state = registry
            .get(&self.storage_key)
            .ok_or_else(|| CatalogError::UnknownCatalog(self.storage_key.clone()))?;
        Ok(self
            .locales
            .iter()
            .filter_map(|locale| {
                state.catalog(locale).map(|catalog| LocaleStatus {
                    locale: locale.clone(),
                    stats: catalog.stats(),
                })
            })
            .collect())
    }

    /// Make `patterns` the URL patterns of this agent and return the manifest for
    /// [`crate::url::UrlLocalizer`], with localized patterns in [`Agent::locales`] order.
    ///
    /// Patterns this agent used before but no longer lists lose their URL flag, which
    /// makes them obsolete unless a source file refers to them.
    pub async fn sync_url_patterns(
        &mut self,
        registry: &mut Registry,
        patterns: &[String],
    ) -> CatalogResult<Vec<UrlManifestItem>> {
        let state = self.state(registry).await?;
        let snapshots = snapshots(state);
        let source_locale = state.source_locale().to_string();
        let keys: BTreeSet<String> = patterns
            .iter()
            .map(|pattern| message_key(std::slice::from_ref(pattern), None))
            .collect();

        for lc in state.catalogs.values_mut() {
            for item in lc.catalog.items_mut() {
                if !keys.contains(&item.key()) {
                    item.url_adapters.retain(|adapter| *adapter != self.key);
                }
            }
        }
        for pattern in patterns {
            let key = message_key(std::slice::from_ref(pattern), None);
            for (locale, lc) in state.catalogs.iter_mut() {
                let item = lc
                    .catalog
                    .get_or_insert_with(&key, || CatalogItem::new(vec![pattern.clone()], None, 1));
                item.add_url_adapter(&self.key);
                if *locale == source_locale {
                    item.msgstr = vec![pattern.clone()];
                }
            }
            state.index.get(&key);
        }

        self.save_changed(state, &snapshots).await?;
        let updated = self.compile(state);
        self.publish(&updated);

        Ok(patterns
            .iter()
            .map(|pattern| self.manifest_item(state, pattern))
            .collect())
    }

    fn manifest_item(&self, state: &SharedState, pattern: &str) -> UrlManifestItem {
        let key = message_key(&[pattern.to_string()], None);
        let localized: Vec<String> = self
            .locales
            .iter()
            .map(|locale| {
                let translated = state
                    .catalog(locale)
                    .and_then(|catalog| catalog.get(&key))
                    .and_then(|item| item.msgstr.first())
                    .filter(|text| !text.is_empty());
                match translated {
                    Some(text) if text.starts_with('/') => text.clone(),
                    Some(text) => {
                        warn!("Ignoring URL translation '{}' of '{}' in {}", text, pattern, locale);
                        pattern.to_string()
                    }
                    None => pattern.to_string(),
                }
            })
            .collect();
        if localized.iter().all(|text| text == pattern) {
            UrlManifestItem::new(pattern, None)
        } else {
            UrlManifestItem::new(pattern, Some(localized))
        }
    }

    /// Files under the root selected by this agent, relative to the root and sorted
    pub fn discover_files(&self) -> CatalogResult<Vec<String>> {
        let mut files = BTreeSet::new();
        for pattern in self.matcher.include_patterns() {
            let full = self.root.join(pattern);
            let paths =
                glob::glob(&full.to_string_lossy()).map_err(|e| CatalogError::Pattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            for entry in paths {
                let path = entry.map_err(|e| CatalogError::Io(e.into_error()))?;
                if !path.is_file() {
                    continue;
                }
                let relative = relative_path(&path, &self.root);
                if self.matcher.matches(&relative) {
                    files.insert(relative);
                }
            }
        }
        Ok(files.into_iter().collect())
    }
}

fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn snapshots(state: &SharedState) -> Vec<(String, String)> {
    state
        .catalogs
        .iter()
        .map(|(locale, lc)| (locale.clone(), lc.catalog.snapshot()))
        .collect()
}

fn new_catalog(locale: &str, nplurals: usize) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.set_header("Language", locale);
    catalog.set_header("Content-Type", "text/plain; charset=UTF-8");
    catalog.set_header("Plural-Forms", &format!("nplurals={};", nplurals));
    catalog
}

/// Source-locale translation of a message: the source text itself, one entry per form
fn mirror_source(msgid: &[String], nplurals: usize) -> Vec<String> {
    if msgid.len() < 2 {
        return msgid.to_vec();
    }
    (0..nplurals.max(1))
        .map(|form| msgid[form.min(msgid.len() - 1)].clone())
        .collect()
}

fn compile_catalog<'a>(
    catalog: &Catalog,
    index: &IndexTracker,
    keys: impl Iterator<Item = &'a str>,
) -> Compiled {
    let mut compiled = Compiled::new();
    for key in keys {
        let (Some(item), Some(position)) = (catalog.get(key), index.lookup(key)) else {
            continue;
        };
        compiled.set(position, compile_item(item, position));
    }
    compiled
}

/// Compile the translation of `item` stored at `index`
pub fn compile_item(item: &CatalogItem, index: u32) -> CompiledEntry {
    let source_for = |form: usize| {
        item.msgid
            .get(form.min(item.msgid.len().saturating_sub(1)))
            .map_or("", String::as_str)
    };
    let translation_for = |form: usize| item.msgstr.get(form).map_or("", String::as_str);
    if item.is_plural() {
        let forms = item.msgstr.len().max(1);
        CompiledEntry::Plural(
            (0..forms)
                .map(|form| compile_form(source_for(form), translation_for(form), index))
                .collect(),
        )
    } else {
        CompiledEntry::Single(compile_form(source_for(0), translation_for(0), index))
    }
}

fn compile_form(source: &str, translation: &str, index: u32) -> CompiledElement {
    let compiled_source = compile(source, CompiledElement::Text(source.to_string()));
    if translation.is_empty() {
        return compiled_source;
    }
    match try_compile(translation) {
        Err(e) => {
            warn!("Translation of message {} is malformed: {}", index, e);
            CompiledElement::Text(invalid_marker(index, translation))
        }
        Ok(compiled) if is_equivalent(&compiled_source, &compiled) => compiled,
        Ok(_) => {
            warn!(
                "Translation '{}' does not match the placeholders of '{}', using the source text",
                translation, source
            );
            compiled_source
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::Part;

    fn item(msgid: &[&str], msgstr: &[&str]) -> CatalogItem {
        CatalogItem {
            msgid: msgid.iter().map(|s| s.to_string()).collect(),
            msgstr: msgstr.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_untranslated_uses_source() {
        let entry = compile_item(&item(&["Hello {0}"], &[""]), 0);
        assert_eq!(
            entry,
            CompiledEntry::Single(CompiledElement::Mixed(vec![
                Part::Text("Hello ".to_string()),
                Part::Arg(0)
            ]))
        );
    }

    #[test]
    fn test_compile_translation() {
        let entry = compile_item(&item(&["Hello"], &["Bonjour"]), 0);
        assert_eq!(
            entry,
            CompiledEntry::Single(CompiledElement::Text("Bonjour".to_string()))
        );
    }

    #[test]
    fn test_compile_malformed_translation_is_flagged() {
        let entry = compile_item(&item(&["<0>Docs</0>"], &["<0>Docs"]), 4);
        assert_eq!(
            entry,
            CompiledEntry::Single(CompiledElement::Text("i18n-400:4(<0>Docs)".to_string()))
        );
    }

    #[test]
    fn test_compile_stale_translation_falls_back() {
        let entry = compile_item(&item(&["Hi {0}"], &["Salut"]), 0);
        assert_eq!(
            entry,
            CompiledEntry::Single(CompiledElement::Mixed(vec![
                Part::Text("Hi ".to_string()),
                Part::Arg(0)
            ]))
        );
    }

    #[test]
    fn test_compile_plural_forms() {
        let entry = compile_item(&item(&["One", "{0} many"], &["", "", ""]), 0);
        let CompiledEntry::Plural(forms) = entry else {
            panic!("expected plural entry");
        };
        assert_eq!(forms.len(), 3);
        assert_eq!(forms[0], CompiledElement::Text("One".to_string()));
        assert!(matches!(forms[2], CompiledElement::Mixed(_)));
    }

    #[test]
    fn test_mirror_source() {
        assert_eq!(mirror_source(&["a".to_string()], 2), vec!["a"]);
        let plural = vec!["one".to_string(), "many".to_string()];
        assert_eq!(mirror_source(&plural, 3), vec!["one", "many", "many"]);
    }
}
