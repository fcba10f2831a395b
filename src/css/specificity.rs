//! Specificity weights, cascade ordering and base/state decomposition.
//!
//! Specificity is flattened to a single integer:
//!
//! ```text
//! 100 * ids + 10 * (classes + attributes + pseudo-classes) + types
//! ```
//!
//! Pseudo-elements and the universal selector carry no weight. Two rules
//! compare by specificity first and document order (`rule_index`) second,
//! which is exactly what the derived `Ord` of [`CascadePosition`] gives.

use crate::css::selector::{Selector, SelectorComponent};

/// Per-category selector counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Specificity {
    /// Number of ID selectors (`#id`).
    pub id_count: u32,
    /// Number of class, attribute and pseudo-class selectors.
    pub class_count: u32,
    /// Number of type selectors (`button`, `h1`).
    pub type_count: u32,
}

impl Specificity {
    /// Count the components of a parsed selector.
    pub fn from_selector(selector: &Selector) -> Self {
        let mut spec = Self::default();
        for component in selector.components() {
            match component {
                SelectorComponent::Id(_) => spec.id_count += 1,
                SelectorComponent::Class(_)
                | SelectorComponent::Attribute { .. }
                | SelectorComponent::PseudoClass(_) => spec.class_count += 1,
                SelectorComponent::Type(_) => spec.type_count += 1,
                SelectorComponent::Universal | SelectorComponent::PseudoElement(_) => {}
            }
        }
        spec
    }

    /// The flattened integer weight.
    pub fn value(&self) -> u32 {
        self.id_count * 100 + self.class_count * 10 + self.type_count
    }
}

/// Compute the integer specificity of a selector.
///
/// A selector that cannot be tokenized (or a selector list) weighs 0.
pub fn compute_specificity(selector: &str) -> u32 {
    match Selector::parse(selector) {
        Ok(parsed) => Specificity::from_selector(&parsed).value(),
        Err(err) => {
            log::debug!(target: "cascade_lens::specificity", "specificity 0 for `{selector}`: {err}");
            0
        }
    }
}

/// A rule's place in the cascade: higher specificity wins, then later
/// `rule_index` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CascadePosition {
    pub specificity: u32,
    pub rule_index: usize,
}

impl CascadePosition {
    pub fn new(specificity: u32, rule_index: usize) -> Self {
        Self {
            specificity,
            rule_index,
        }
    }
}

/// Split a selector at its first `:` into base selector and state name.
///
/// The state keeps everything after the colon run, so `.btn:hover` gives
/// `(".btn", Some("hover"))` and `.card::before` gives
/// `(".card", Some("before"))`. Surrounding whitespace is trimmed from both.
/// Escaped colons (`.md\:flex`) belong to the base.
pub fn split_base_and_state(selector: &str) -> (&str, Option<&str>) {
    match first_unescaped_colon(selector) {
        None => (selector.trim(), None),
        Some(at) => {
            let state = selector[at..].trim_start_matches(':').trim();
            (selector[..at].trim(), Some(state))
        }
    }
}

fn first_unescaped_colon(selector: &str) -> Option<usize> {
    let bytes = selector.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b':' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// The base selector alone.
pub fn base_selector(selector: &str) -> &str {
    split_base_and_state(selector).0
}

/// Returns `true` if the selector contains a pseudo-class (a single colon).
pub fn has_pseudo_class(selector: &str) -> bool {
    pseudo_markers(selector).any(|double| !double)
}

/// Returns `true` if the selector contains a pseudo-element (`::name`).
pub fn has_pseudo_element(selector: &str) -> bool {
    pseudo_markers(selector).any(|double| double)
}

/// Yields one item per colon run outside brackets and quotes: `true` for
/// `::`, `false` for `:`.
fn pseudo_markers(selector: &str) -> impl Iterator<Item = bool> + '_ {
    let bytes = selector.as_bytes();
    let mut i = 0;
    let mut bracket = 0usize;
    let mut quote: Option<u8> = None;
    std::iter::from_fn(move || {
        while i < bytes.len() {
            let b = bytes[i];
            i += 1;
            match (quote, b) {
                (_, b'\\') => i += 1,
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(b),
                (None, b'[') => bracket += 1,
                (None, b']') => bracket = bracket.saturating_sub(1),
                (None, b':') if bracket == 0 => {
                    let double = bytes.get(i) == Some(&b':');
                    if double {
                        i += 1;
                    }
                    return Some(double);
                }
                _ => {}
            }
        }
        None
    })
}
