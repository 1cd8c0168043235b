//! Catalog persistence
//!
//! The synchronizer does not know how catalogs are laid out on disk. It talks to a
//! [`CatalogStorage`], which loads and saves one [`Catalog`] per locale. Agents writing to
//! the same location report the same [`CatalogStorage::key`] and share one catalog in
//! memory.
//!
//! Two implementations ship with the crate: [`crate::po::PoStorage`] for gettext files
//! and [`MemoryStorage`] for tests and embedding.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};

/// Loads and saves per-locale catalogs for one storage location
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    /// Identity of the storage location. Agents with equal keys share state.
    fn key(&self) -> String;

    /// Load the catalog for `locale`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing has been stored yet for this locale
    /// * `Ok(Some(catalog))` - The stored catalog
    /// * `Err(CatalogError)` - The catalog exists but cannot be read
    async fn load(&self, locale: &str) -> CatalogResult<Option<Catalog>>;

    /// Replace the stored catalog for `locale`
    async fn save(&self, locale: &str, catalog: &Catalog) -> CatalogResult<()>;
}

/// Storage keeping catalogs in memory.
///
/// Clones share the same contents, so a test can keep one handle to inspect what an agent
/// wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    key: String,
    catalogs: Arc<Mutex<HashMap<String, Catalog>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryStorage {
    pub fn new(key: &str) -> Self {
        MemoryStorage {
            key: key.to_string(),
            ..Default::default()
        }
    }

    /// Seed a catalog as if it had been saved earlier
    pub fn with_catalog(self, locale: &str, catalog: Catalog) -> Self {
        if let Ok(mut catalogs) = self.catalogs.lock() {
            catalogs.insert(locale.to_string(), catalog);
        }
        self
    }

    pub fn stored(&self, locale: &str) -> Option<Catalog> {
        self.catalogs
            .lock()
            .ok()
            .and_then(|catalogs| catalogs.get(locale).cloned())
    }

    /// Number of saves performed through any handle
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|writes| *writes).unwrap_or_default()
    }

    fn poisoned(&self) -> CatalogError {
        CatalogError::Storage {
            location: self.key.clone(),
            message: "memory storage lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl CatalogStorage for MemoryStorage {
    fn key(&self) -> String {
        format!("memory:{}", self.key)
    }

    async fn load(&self, locale: &str) -> CatalogResult<Option<Catalog>> {
        let catalogs = self.catalogs.lock().map_err(|_| self.poisoned())?;
        Ok(catalogs.get(locale).cloned())
    }

    async fn save(&self, locale: &str, catalog: &Catalog) -> CatalogResult<()> {
        self.catalogs
            .lock()
            .map_err(|_| self.poisoned())?
            .insert(locale.to_string(), catalog.clone());
        *self.writes.lock().map_err(|_| self.poisoned())? += 1;
        Ok(())
    }
}
