//! Granular load units
//!
//! In granular mode an agent compiles one artifact per load unit instead of one per
//! catalog, so a page only downloads the messages it uses. Every source file maps to a load
//! id; files with the same id share a unit. Each unit numbers its messages independently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::compiled::Compiled;
use crate::index::IndexTracker;

/// Maps a source file path to the load unit it belongs to
pub type LoadIdFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One load id per file, with every character that is not ASCII alphanumeric replaced
/// by `_`
pub fn default_load_id(file: &str) -> String {
    let file = file.strip_prefix("./").unwrap_or(file);
    file.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Messages and compiled artifacts of one load unit
#[derive(Debug, Clone, Default)]
pub struct GranularState {
    pub id: String,
    /// Unit-local message numbering
    pub index: IndexTracker,
    /// Compiled artifact per locale
    pub compiled: BTreeMap<String, Compiled>,
    pub files: BTreeSet<String>,
}

impl GranularState {
    fn new(id: &str) -> Self {
        GranularState {
            id: id.to_string(),
            ..Default::default()
        }
    }
}

/// All load units of one agent, reachable by file and by id
pub struct GranularStates {
    load_id: LoadIdFn,
    by_file: HashMap<String, String>,
    by_id: BTreeMap<String, GranularState>,
}

impl GranularStates {
    pub fn new(load_id: LoadIdFn) -> Self {
        GranularStates {
            load_id,
            by_file: HashMap::new(),
            by_id: BTreeMap::new(),
        }
    }

    /// The unit `file` belongs to, created on first use
    pub fn state_for_file(&mut self, file: &str) -> &mut GranularState {
        let id = match self.by_file.get(file) {
            Some(id) => id.clone(),
            None => {
                let id = (self.load_id)(file);
                self.by_file.insert(file.to_string(), id.clone());
                id
            }
        };
        let state = self
            .by_id
            .entry(id.clone())
            .or_insert_with(|| GranularState::new(&id));
        state.files.insert(file.to_string());
        state
    }

    pub fn load_id_for(&self, file: &str) -> Option<&str> {
        self.by_file.get(file).map(String::as_str)
    }

    pub fn by_id(&self, id: &str) -> Option<&GranularState> {
        self.by_id.get(id)
    }

    pub fn states(&self) -> impl Iterator<Item = &GranularState> {
        self.by_id.values()
    }

    pub(crate) fn states_mut(&mut self) -> impl Iterator<Item = &mut GranularState> {
        self.by_id.values_mut()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for GranularStates {
    fn default() -> Self {
        Self::new(Arc::new(default_load_id))
    }
}

impl fmt::Debug for GranularStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GranularStates")
            .field("by_file", &self.by_file)
            .field("by_id", &self.by_id)
            .finish()
    }
}
