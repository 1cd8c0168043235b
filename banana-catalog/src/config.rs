//! Project configuration
//!
//! Read from a JSON file, `banana-catalog.json` by default:
//!
//! ```json
//! {
//!     "source_locale": "en",
//!     "locales": ["en", "es"],
//!     "catalog_dir": "locales",
//!     "agents": [
//!         { "key": "main", "include": ["src/**/*.js"], "url_patterns": ["/", "/about"] },
//!         { "key": "pages", "include": ["pages/**/*.js"], "granular": true }
//!     ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::{CatalogError, CatalogResult};
use crate::granular::default_load_id;
use crate::plural::PluralRulesDescriptor;
use crate::po::PoStorage;
use crate::shared::FileMatcher;
use crate::transformer::Transformer;

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("locales")
}

fn default_agents() -> Vec<AgentConfig> {
    vec![AgentConfig {
        key: "main".to_string(),
        include: vec!["src/**/*".to_string()],
        ignore: Vec::new(),
        granular: false,
        catalog_dir: None,
        url_patterns: Vec::new(),
    }]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub source_locale: String,
    pub locales: Vec<String>,
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub key: String,
    pub include: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub granular: bool,
    /// Overrides the project catalog directory. Agents with the same directory share
    /// catalogs.
    #[serde(default)]
    pub catalog_dir: Option<PathBuf>,
    #[serde(default)]
    pub url_patterns: Vec<String>,
}

impl Config {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> CatalogResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CatalogError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| CatalogError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        PluralRulesDescriptor::for_locale(&self.source_locale)?;
        for locale in &self.locales {
            PluralRulesDescriptor::for_locale(locale)?;
        }
        if self.agents.is_empty() {
            return Err(CatalogError::Config("no agents configured".to_string()));
        }
        for (i, agent) in self.agents.iter().enumerate() {
            if self.agents[..i].iter().any(|other| other.key == agent.key) {
                return Err(CatalogError::Config(format!(
                    "duplicate agent key '{}'",
                    agent.key
                )));
            }
            if agent.include.is_empty() {
                return Err(CatalogError::Config(format!(
                    "agent '{}' has no include patterns",
                    agent.key
                )));
            }
        }
        Ok(())
    }

    /// Build the configured agents. File paths are resolved against `root`, and so are
    /// relative catalog directories.
    pub fn build_agents(
        &self,
        root: &Path,
        transformer: Arc<dyn Transformer>,
    ) -> CatalogResult<Vec<Agent>> {
        self.agents
            .iter()
            .map(|agent| {
                let matcher = FileMatcher::new(&agent.include, &agent.ignore)?;
                let dir = agent.catalog_dir.as_ref().unwrap_or(&self.catalog_dir);
                let storage = Arc::new(PoStorage::new(root.join(dir)));
                let built = Agent::new(
                    &agent.key,
                    &self.source_locale,
                    &self.locales,
                    matcher,
                    transformer.clone(),
                    storage,
                )
                .with_root(root);
                Ok(if agent.granular {
                    built.with_granular(Arc::new(default_load_id))
                } else {
                    built
                })
            })
            .collect()
    }
}
