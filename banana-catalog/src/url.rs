//! Localized URL patterns
//!
//! URL patterns are catalog items like any other message, so translators can localize
//! paths. A manifest lists each canonical pattern with its per-locale translations:
//!
//! ```text
//! [["/"], ["/path", ["/path", "/ruta"]]]
//! ```
//!
//! Patterns are `/`-separated segments. `:name` matches one segment, `*name` matches the
//! rest of the path. Everything else is literal.

use regex::Regex;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{CatalogError, CatalogResult};

/// One manifest entry: a canonical pattern and its translations by locale ordinal.
///
/// `localized` is `None` when no locale translates the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlManifestItem {
    pub pattern: String,
    pub localized: Option<Vec<String>>,
}

impl UrlManifestItem {
    pub fn new(pattern: &str, localized: Option<Vec<String>>) -> Self {
        UrlManifestItem {
            pattern: pattern.to_string(),
            localized,
        }
    }

    /// Read an entry from its `[pattern, localized?]` JSON form
    pub fn from_value(value: &Value) -> CatalogResult<Self> {
        let invalid = || CatalogError::UrlPattern(format!("invalid manifest entry: {}", value));
        let items = value.as_array().ok_or_else(invalid)?;
        let pattern = items.first().and_then(Value::as_str).ok_or_else(invalid)?;
        let localized = match items.get(1) {
            None | Some(Value::Null) => None,
            Some(Value::Array(list)) => Some(
                list.iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
                    .collect::<CatalogResult<Vec<_>>>()?,
            ),
            Some(_) => return Err(invalid()),
        };
        Ok(UrlManifestItem::new(pattern, localized))
    }
}

impl Serialize for UrlManifestItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.localized.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.pattern)?;
        if let Some(localized) = &self.localized {
            seq.serialize_element(localized)?;
        }
        seq.end()
    }
}

/// Parse a whole manifest
pub fn parse_manifest(json: &str) -> CatalogResult<Vec<UrlManifestItem>> {
    let value: Value = serde_json::from_str(json)?;
    value
        .as_array()
        .ok_or_else(|| CatalogError::UrlPattern("manifest must be an array".to_string()))?
        .iter()
        .map(UrlManifestItem::from_value)
        .collect()
}

#[derive(Debug, Clone)]
struct PathPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

impl PathPattern {
    fn new(source: &str) -> CatalogResult<Self> {
        if !source.starts_with('/') {
            return Err(CatalogError::UrlPattern(format!(
                "'{}' does not start with '/'",
                source
            )));
        }
        let segments: Vec<&str> = source[1..].split('/').collect();
        let mut params = Vec::new();
        let mut body = String::new();
        for (i, segment) in segments.iter().enumerate() {
            body.push('/');
            if let Some(name) = segment.strip_prefix(':') {
                params.push(name.to_string());
                body.push_str("([^/]+)");
            } else if let Some(name) = segment.strip_prefix('*') {
                if i + 1 != segments.len() {
                    return Err(CatalogError::UrlPattern(format!(
                        "'{}': catch-all must be the last segment",
                        source
                    )));
                }
                params.push(name.to_string());
                body.push_str("(.*)");
            } else {
                body.push_str(&regex::escape(segment));
            }
        }
        let anchored = if body.ends_with('/') {
            format!("^{}$", body)
        } else {
            format!("^{}/?$", body)
        };
        let regex = Regex::new(&anchored)
            .map_err(|e| CatalogError::UrlPattern(format!("'{}': {}", source, e)))?;
        Ok(PathPattern {
            source: source.to_string(),
            regex,
            params,
        })
    }

    fn capture(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = captures.get(i + 1).map_or("", |m| m.as_str());
                    (name.clone(), value.to_string())
                })
                .collect(),
        )
    }
}

/// Substitute `params` into the `:name` and `*name` segments of `pattern`.
///
/// Segments naming an unknown parameter are left as they are.
pub fn fill_pattern(pattern: &str, params: &[(String, String)]) -> String {
    pattern
        .split('/')
        .map(|segment| {
            let name = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix('*'));
            match name.and_then(|name| params.iter().find(|(key, _)| key == name)) {
                Some((_, value)) => value.as_str(),
                None => segment,
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Result of matching a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatch {
    /// The path with the canonical pattern filled in
    pub canonical_path: String,
    pub params: Vec<(String, String)>,
    /// Pattern of the matched route for every other locale
    pub alternates: BTreeMap<String, String>,
}

impl UrlMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The matched path as it reads in `locale`
    pub fn alternate_path(&self, locale: &str) -> Option<String> {
        self.alternates
            .get(locale)
            .map(|pattern| fill_pattern(pattern, &self.params))
    }
}

#[derive(Debug, Clone)]
struct Route {
    canonical: PathPattern,
    /// One pattern per locale ordinal
    localized: Vec<PathPattern>,
}

/// Matches and rewrites paths against a manifest
#[derive(Debug, Clone)]
pub struct UrlLocalizer {
    locales: Vec<String>,
    routes: Vec<Route>,
}

impl UrlLocalizer {
    /// Compile `manifest` for the locales in `locales` order
    pub fn new(manifest: &[UrlManifestItem], locales: &[String]) -> CatalogResult<Self> {
        let mut routes = Vec::with_capacity(manifest.len());
        for item in manifest {
            let canonical = PathPattern::new(&item.pattern)?;
            let mut localized = Vec::with_capacity(locales.len());
            for ordinal in 0..locales.len() {
                let pattern = item
                    .localized
                    .as_ref()
                    .and_then(|list| list.get(ordinal))
                    .filter(|pattern| !pattern.is_empty());
                localized.push(match pattern {
                    Some(pattern) => PathPattern::new(pattern)?,
                    None => canonical.clone(),
                });
            }
            routes.push(Route {
                canonical,
                localized,
            });
        }
        Ok(UrlLocalizer {
            locales: locales.to_vec(),
            routes,
        })
    }

    fn ordinal(&self, locale: &str) -> Option<usize> {
        self.locales.iter().position(|l| l == locale)
    }

    /// Match `path` as it reads in `locale`. Without a locale nothing matches. The first
    /// matching route wins.
    pub fn match_path(&self, path: &str, locale: Option<&str>) -> Option<UrlMatch> {
        let ordinal = self.ordinal(locale?)?;
        for route in &self.routes {
            let Some(params) = route.localized[ordinal].capture(path) else {
                continue;
            };
            let alternates = self
                .locales
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != ordinal)
                .map(|(i, locale)| (locale.clone(), route.localized[i].source.clone()))
                .collect();
            return Some(UrlMatch {
                canonical_path: fill_pattern(&route.canonical.source, &params),
                params,
                alternates,
            });
        }
        None
    }

    /// Rewrite a canonical path into `locale`
    pub fn localize_path(&self, canonical_path: &str, locale: &str) -> Option<String> {
        let ordinal = self.ordinal(locale)?;
        self.routes.iter().find_map(|route| {
            let params = route.canonical.capture(canonical_path)?;
            Some(fill_pattern(&route.localized[ordinal].source, &params))
        })
    }
}
