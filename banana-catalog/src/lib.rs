//! # banana-catalog
//!
//! Keeps translation catalogs in sync with the source files of an application and
//! compiles them into compact per-locale artifacts for the runtime.
//!
//! Messages may carry positional placeholders and numbered tags:
//!
//! ```text
//! Hello {0}, read <0>the docs</0><1/>
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use banana_catalog::{Agent, ExtractOptions, FileMatcher, KeywordTransformer, PoStorage, Registry};
//! use std::sync::Arc;
//!
//! # async fn run() -> banana_catalog::CatalogResult<()> {
//! let matcher = FileMatcher::new(&["src/**/*.js".to_string()], &[])?;
//! let mut agent = Agent::new(
//!     "main",
//!     "en",
//!     &["es".to_string()],
//!     matcher,
//!     Arc::new(KeywordTransformer::new()?),
//!     Arc::new(PoStorage::new("locales")),
//! );
//! let mut registry = Registry::new();
//! let files = agent.discover_files()?;
//! agent.extract(&mut registry, &files, ExtractOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod catalog;
pub mod compiled;
pub mod compiler;
pub mod config;
pub mod equivalence;
pub mod error;
pub mod granular;
pub mod index;
pub mod message;
pub mod plural;
pub mod po;
pub mod runtime;
pub mod shared;
pub mod storage;
pub mod transformer;
pub mod url;

pub use agent::{Agent, CatalogEvent, ExtractOptions, ExtractReport, LocaleStatus, ScanMode};
pub use catalog::{Catalog, CatalogItem, CatalogStats, FileRef};
pub use compiled::{Compiled, CompiledElement, CompiledEntry, Part, Tag};
pub use compiler::{compile, serialize, try_compile};
pub use config::{AgentConfig, Config};
pub use equivalence::is_equivalent;
pub use error::{CatalogError, CatalogResult, CompileError};
pub use granular::{GranularState, GranularStates, LoadIdFn, default_load_id};
pub use index::IndexTracker;
pub use message::{ExtractedMessage, Message, PlaceholderRef, Scope, message_key};
pub use plural::{PluralRulesDescriptor, PluralSelector};
pub use po::PoStorage;
pub use runtime::Runtime;
pub use shared::{FileMatcher, Registry, SharedState};
pub use storage::{CatalogStorage, MemoryStorage};
pub use transformer::{KeywordTransformer, Transformer};
pub use url::{UrlLocalizer, UrlManifestItem, UrlMatch};

mod integration_tests;
