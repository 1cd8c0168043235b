use icu_locale::Locale;
use icu_plurals::{PluralCategory, PluralRuleType, PluralRules};

use crate::error::{CatalogError, CatalogResult};

/// Every category in the order plural forms are stored in a catalog item
const CATEGORY_ORDER: [PluralCategory; 6] = [
    PluralCategory::Zero,
    PluralCategory::One,
    PluralCategory::Two,
    PluralCategory::Few,
    PluralCategory::Many,
    PluralCategory::Other,
];

fn load_rules(locale: &str) -> CatalogResult<PluralRules> {
    let parsed: Locale = locale
        .parse()
        .map_err(|_| CatalogError::InvalidLocale(locale.to_string()))?;
    PluralRules::try_new(parsed.into(), PluralRuleType::Cardinal.into())
        .map_err(|_| CatalogError::InvalidLocale(locale.to_string()))
}

/// Cardinal plural categories used by a locale.
///
/// Form `i` of a plural catalog item belongs to `categories[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluralRulesDescriptor {
    pub locale: String,
    pub categories: Vec<PluralCategory>,
}

impl PluralRulesDescriptor {
    /// Load the CLDR plural rules for `locale`
    pub fn for_locale(locale: &str) -> CatalogResult<Self> {
        let rules = load_rules(locale)?;
        let used: Vec<PluralCategory> = rules.categories().collect();
        let categories = CATEGORY_ORDER
            .iter()
            .copied()
            .filter(|category| used.contains(category))
            .collect();
        Ok(PluralRulesDescriptor {
            locale: locale.to_string(),
            categories,
        })
    }

    /// Number of plural forms a translation needs
    pub fn nplurals(&self) -> usize {
        self.categories.len().max(1)
    }

    pub fn form_for_category(&self, category: PluralCategory) -> usize {
        self.categories
            .iter()
            .position(|c| *c == category)
            .unwrap_or_else(|| self.nplurals() - 1)
    }
}

/// Selects plural forms for counts at runtime
pub struct PluralSelector {
    descriptor: PluralRulesDescriptor,
    rules: PluralRules,
}

impl PluralSelector {
    pub fn for_locale(locale: &str) -> CatalogResult<Self> {
        Ok(PluralSelector {
            descriptor: PluralRulesDescriptor::for_locale(locale)?,
            rules: load_rules(locale)?,
        })
    }

    pub fn descriptor(&self) -> &PluralRulesDescriptor {
        &self.descriptor
    }

    /// Index of the plural form to use for `count`
    pub fn form_index(&self, count: usize) -> usize {
        self.descriptor
            .form_for_category(self.rules.category_for(count))
    }
}
