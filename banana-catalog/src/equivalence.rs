//! Structural comparison between a compiled source message and a compiled translation
//!
//! When the source text changes, an existing translation may no longer carry the same
//! placeholders and tags. Rendering it would drop arguments or break markup, so the caller
//! uses [`is_equivalent`] to decide whether the translation can still be trusted.
//!
//! The check is permissive on order, since translators move `{0}` and tagged spans around
//! freely, and strict on cardinality.

use crate::compiled::{CompiledElement, Part};

/// Whether `translation` has the same placeholder and tag structure as `source`
pub fn is_equivalent(source: &CompiledElement, translation: &CompiledElement) -> bool {
    match (source.parts(), translation.parts()) {
        (None, None) => true,
        (Some(source), Some(translation)) => parts_equivalent(source, translation),
        _ => false,
    }
}

fn parts_equivalent(source: &[Part], translation: &[Part]) -> bool {
    for part in source {
        let found = match part {
            Part::Text(_) => true,
            Part::Arg(index) => translation
                .iter()
                .any(|other| matches!(other, Part::Arg(i) if i == index)),
            Part::Tag(tag) => translation.iter().any(|other| match other {
                Part::Tag(other) => {
                    other.index == tag.index && parts_equivalent(&tag.children, &other.children)
                }
                _ => false,
            }),
        };
        if !found {
            return false;
        }
    }
    has_text(source) == has_text(translation)
        && structural_count(source) == structural_count(translation)
}

fn has_text(parts: &[Part]) -> bool {
    parts.iter().any(|part| matches!(part, Part::Text(_)))
}

fn structural_count(parts: &[Part]) -> usize {
    parts
        .iter()
        .filter(|part| !matches!(part, Part::Text(_)))
        .count()
}
