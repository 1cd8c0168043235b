//! Runtime representation of compiled messages
//!
//! A translation such as `"Foo <0>bar {0}<0/></0>"` is compiled once at build time
//! into a [`CompiledElement`] and shipped to the runtime as JSON:
//!
//! ```json
//! ["Foo ", [0, "bar ", 0, [0]]]
//! ```
//!
//! Top-level arrays hold the message parts. Nested arrays are tagged spans whose first
//! item is the tag index, numbers are positional placeholders and strings are literal text.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// One item of a compiled message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Positional placeholder `{n}`
    Arg(u32),
    /// Tagged span `<n>...</n>` or `<n/>`
    Tag(Tag),
}

/// A tagged span and the parts it wraps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub index: u32,
    pub children: Vec<Part>,
}

impl Tag {
    pub fn new(index: u32, children: Vec<Part>) -> Self {
        Tag { index, children }
    }
}

/// A compiled message.
///
/// The variant is decided by content: a message without placeholders or tags is always
/// `Text`, a message with placeholders but no tags is `Mixed`, anything containing a tag
/// is `Composite`. Use [`CompiledElement::from_parts`] to get the normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledElement {
    Text(String),
    Mixed(Vec<Part>),
    Composite(Vec<Part>),
}

impl CompiledElement {
    /// Build the normalized element for a list of parts
    pub fn from_parts(mut parts: Vec<Part>) -> Self {
        if parts.len() <= 1 {
            match parts.pop() {
                None => return CompiledElement::Text(String::new()),
                Some(Part::Text(text)) => return CompiledElement::Text(text),
                Some(other) => parts.push(other),
            }
        }
        if parts.iter().any(|part| matches!(part, Part::Tag(_))) {
            CompiledElement::Composite(parts)
        } else {
            CompiledElement::Mixed(parts)
        }
    }

    /// The parts of a structured element, `None` for plain text
    pub fn parts(&self) -> Option<&[Part]> {
        match self {
            CompiledElement::Text(_) => None,
            CompiledElement::Mixed(parts) | CompiledElement::Composite(parts) => Some(parts),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, CompiledElement::Text(_))
    }

    /// Parse the JSON shape produced by serialization. Returns `None` for anything that is
    /// not a string or a well-formed part array.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(CompiledElement::Text(text.clone())),
            Value::Array(items) => {
                let parts = items
                    .iter()
                    .map(part_from_value)
                    .collect::<Option<Vec<_>>>()?;
                Some(CompiledElement::from_parts(parts))
            }
            _ => None,
        }
    }
}

fn part_from_value(value: &Value) -> Option<Part> {
    match value {
        Value::String(text) => Some(Part::Text(text.clone())),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Part::Arg),
        Value::Array(items) => {
            let (head, rest) = items.split_first()?;
            let index = head.as_u64().and_then(|n| u32::try_from(n).ok())?;
            let children = rest
                .iter()
                .map(part_from_value)
                .collect::<Option<Vec<_>>>()?;
            Some(Part::Tag(Tag::new(index, children)))
        }
        _ => None,
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.children.len() + 1))?;
        seq.serialize_element(&self.index)?;
        for child in &self.children {
            seq.serialize_element(child)?;
        }
        seq.end()
    }
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::Text(text) => serializer.serialize_str(text),
            Part::Arg(index) => serializer.serialize_u32(*index),
            Part::Tag(tag) => tag.serialize(serializer),
        }
    }
}

impl Serialize for CompiledElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CompiledElement::Text(text) => serializer.serialize_str(text),
            CompiledElement::Mixed(parts) | CompiledElement::Composite(parts) => {
                parts.serialize(serializer)
            }
        }
    }
}

/// The value stored at one index of a compiled catalog
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledEntry {
    Single(CompiledElement),
    /// One element per plural form, in the locale's plural category order
    Plural(Vec<CompiledElement>),
    /// A slot read from an artifact that does not have a recognizable shape
    Invalid(Value),
}

impl CompiledEntry {
    fn from_value(value: &Value) -> Self {
        if let Value::Object(map) = value {
            if let Some(Value::Array(forms)) = map.get("plural") {
                if let Some(forms) = forms
                    .iter()
                    .map(CompiledElement::from_value)
                    .collect::<Option<Vec<_>>>()
                {
                    return CompiledEntry::Plural(forms);
                }
            }
            return CompiledEntry::Invalid(value.clone());
        }
        match CompiledElement::from_value(value) {
            Some(element) => CompiledEntry::Single(element),
            None => CompiledEntry::Invalid(value.clone()),
        }
    }
}

impl Serialize for CompiledEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CompiledEntry::Single(element) => element.serialize(serializer),
            CompiledEntry::Plural(forms) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("plural", forms)?;
                map.end()
            }
            CompiledEntry::Invalid(raw) => raw.serialize(serializer),
        }
    }
}

/// Compiled catalog for one locale, indexed by message index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Compiled {
    pub catalog: Vec<Option<CompiledEntry>>,
    pub has_plurals: bool,
}

impl Compiled {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry at `index`, growing the catalog with empty slots as needed
    pub fn set(&mut self, index: u32, entry: CompiledEntry) {
        let index = index as usize;
        if self.catalog.len() <= index {
            self.catalog.resize(index + 1, None);
        }
        if matches!(entry, CompiledEntry::Plural(_)) {
            self.has_plurals = true;
        }
        self.catalog[index] = Some(entry);
    }

    pub fn get(&self, index: u32) -> Option<&CompiledEntry> {
        self.catalog.get(index as usize).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Read an artifact. Slots with an unknown shape are kept as
    /// [`CompiledEntry::Invalid`] so the runtime can flag them instead of failing.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let root: Value = serde_json::from_str(json)?;
        let mut compiled = Compiled::new();
        if let Some(Value::Array(slots)) = root.get("catalog") {
            compiled.catalog = slots
                .iter()
                .map(|slot| match slot {
                    Value::Null => None,
                    other => Some(CompiledEntry::from_value(other)),
                })
                .collect();
        }
        compiled.has_plurals = root
            .get("has_plurals")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| {
                compiled
                    .catalog
                    .iter()
                    .any(|slot| matches!(slot, Some(CompiledEntry::Plural(_))))
            });
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested() -> CompiledElement {
        CompiledElement::from_parts(vec![
            Part::Text("Foo ".to_string()),
            Part::Tag(Tag::new(
                0,
                vec![
                    Part::Text("bar ".to_string()),
                    Part::Arg(0),
                    Part::Tag(Tag::new(0, vec![])),
                ],
            )),
        ])
    }

    #[test]
    fn test_from_parts_normalizes_variants() {
        assert_eq!(
            CompiledElement::from_parts(vec![Part::Text("hi".to_string())]),
            CompiledElement::Text("hi".to_string())
        );
        assert_eq!(
            CompiledElement::from_parts(vec![]),
            CompiledElement::Text(String::new())
        );
        assert!(matches!(
            CompiledElement::from_parts(vec![Part::Text("a ".to_string()), Part::Arg(0)]),
            CompiledElement::Mixed(_)
        ));
        assert!(matches!(nested(), CompiledElement::Composite(_)));
    }

    #[test]
    fn test_serialize_nested_shape() {
        let value = serde_json::to_value(nested()).unwrap();
        assert_eq!(value, json!(["Foo ", [0, "bar ", 0, [0]]]));
    }

    #[test]
    fn test_from_value_reads_serialized_shape() {
        let value = json!(["Foo ", [0, "bar ", 0, [0]]]);
        assert_eq!(CompiledElement::from_value(&value), Some(nested()));
        assert_eq!(CompiledElement::from_value(&json!({"a": 1})), None);
        assert_eq!(CompiledElement::from_value(&json!([[]])), None);
    }

    #[test]
    fn test_compiled_set_grows_with_gaps() {
        let mut compiled = Compiled::new();
        compiled.set(2, CompiledEntry::Single(CompiledElement::Text("x".to_string())));
        assert_eq!(compiled.len(), 3);
        assert!(compiled.get(0).is_none());
        assert!(compiled.get(2).is_some());
        assert!(!compiled.has_plurals);

        compiled.set(
            0,
            CompiledEntry::Plural(vec![
                CompiledElement::Text("one".to_string()),
                CompiledElement::Text("many".to_string()),
            ]),
        );
        assert!(compiled.has_plurals);
    }

    #[test]
    fn test_compiled_json_keeps_invalid_slots() {
        let json = r#"{"catalog": ["a", null, {"plural": ["x", "y"]}, {"bogus": true}], "has_plurals": true}"#;
        let compiled = Compiled::from_json(json).unwrap();
        assert_eq!(compiled.len(), 4);
        assert_eq!(
            compiled.get(0),
            Some(&CompiledEntry::Single(CompiledElement::Text("a".to_string())))
        );
        assert!(compiled.get(1).is_none());
        assert!(matches!(compiled.get(2), Some(CompiledEntry::Plural(forms)) if forms.len() == 2));
        assert!(matches!(compiled.get(3), Some(CompiledEntry::Invalid(_))));
        assert!(compiled.has_plurals);
    }

    #[test]
    fn test_compiled_to_json() {
        let mut compiled = Compiled::new();
        compiled.set(1, CompiledEntry::Single(nested()));
        let value: Value = serde_json::from_str(&compiled.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"catalog": [null, ["Foo ", [0, "bar ", 0, [0]]]], "has_plurals": false})
        );
    }
}
