//! What-If state: staged edits that change the preview without touching the
//! rule tree.
//!
//! The host UI owns and mutates these sets. Engine calls take an immutable
//! [`WhatIf`] snapshot, so two calls with the same snapshot see the same world.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::css::model::StyleRule;

const ADDED_MARKER: &str = "::ADDED::";

/// Identifies one toggled-off declaration.
///
/// The textual forms are `"{rule_index}-{property}"` for declarations present
/// in the source and `"{rule_index}::ADDED::{property}"` for staged ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisabledKey {
    Declared { rule_index: usize, property: String },
    Added { rule_index: usize, property: String },
}

impl DisabledKey {
    pub fn declared(rule_index: usize, property: impl Into<String>) -> Self {
        Self::Declared {
            rule_index,
            property: property.into(),
        }
    }

    pub fn added(rule_index: usize, property: impl Into<String>) -> Self {
        Self::Added {
            rule_index,
            property: property.into(),
        }
    }
}

impl fmt::Display for DisabledKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisabledKey::Declared {
                rule_index,
                property,
            } => write!(f, "{rule_index}-{property}"),
            DisabledKey::Added {
                rule_index,
                property,
            } => write!(f, "{rule_index}{ADDED_MARKER}{property}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid disabled-property key `{0}`")]
pub struct InvalidKey(pub String);

impl FromStr for DisabledKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidKey(s.to_owned());
        let (index, property, added) = match s.split_once(ADDED_MARKER) {
            Some((index, property)) => (index, property, true),
            None => {
                let (index, property) = s.split_once('-').ok_or_else(invalid)?;
                (index, property, false)
            }
        };
        let rule_index: usize = index.parse().map_err(|_| invalid())?;
        if property.is_empty() {
            return Err(invalid());
        }
        Ok(if added {
            Self::added(rule_index, property)
        } else {
            Self::declared(rule_index, property)
        })
    }
}

/// Declarations toggled off in the preview.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisabledProperties {
    keys: BTreeSet<DisabledKey>,
}

impl DisabledProperties {
    pub const fn new() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, key: DisabledKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: &DisabledKey) -> bool {
        self.keys.remove(key)
    }

    /// Returns `true` if the source declaration of `property` on the rule is
    /// toggled off.
    pub fn is_disabled(&self, rule_index: usize, property: &str) -> bool {
        self.keys.contains(&DisabledKey::declared(rule_index, property))
    }

    /// Returns `true` if the staged `property` on the rule is toggled off.
    pub fn is_added_disabled(&self, rule_index: usize, property: &str) -> bool {
        self.keys.contains(&DisabledKey::added(rule_index, property))
    }

    pub fn contains(&self, key: &DisabledKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisabledKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<DisabledKey> for DisabledProperties {
    fn from_iter<I: IntoIterator<Item = DisabledKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Pending values keyed by selector, then property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyOverrides {
    by_selector: BTreeMap<String, BTreeMap<String, String>>,
}

impl PropertyOverrides {
    pub const fn new() -> Self {
        Self {
            by_selector: BTreeMap::new(),
        }
    }

    pub fn set(
        &mut self,
        selector: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.by_selector
            .entry(selector.into())
            .or_default()
            .insert(property.into(), value.into());
    }

    pub fn clear(&mut self, selector: &str, property: &str) {
        if let Some(props) = self.by_selector.get_mut(selector) {
            props.remove(property);
            if props.is_empty() {
                self.by_selector.remove(selector);
            }
        }
    }

    /// The staged value, if any. Blank values count as absent.
    pub fn get(&self, selector: &str, property: &str) -> Option<&str> {
        self.by_selector
            .get(selector)?
            .get(property)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// `(selector, property, value)` triples in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.by_selector.iter().flat_map(|(selector, props)| {
            props
                .iter()
                .map(move |(p, v)| (selector.as_str(), p.as_str(), v.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.by_selector.is_empty()
    }
}

/// User-chosen values for custom properties, keyed by `--name`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableOverrides {
    values: BTreeMap<String, String>,
}

impl VariableOverrides {
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Stage a value. The leading `--` may be omitted from `name`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(normalize_variable(name), value.into());
    }

    /// The staged value, if any. Blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        let found = if name.starts_with("--") {
            self.values.get(name)
        } else {
            self.values.get(&normalize_variable(name))
        };
        found.map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalize_variable(name: &str) -> String {
    if name.starts_with("--") {
        name.to_owned()
    } else {
        format!("--{name}")
    }
}

/// A declaration staged through "add property", not yet in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddedProperty {
    pub property: String,
    pub value: String,
}

/// Staged declarations per rule, in the order they were added.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddedProperties {
    by_rule: BTreeMap<usize, Vec<AddedProperty>>,
}

impl AddedProperties {
    pub const fn new() -> Self {
        Self {
            by_rule: BTreeMap::new(),
        }
    }

    /// Stage `property: value` on a rule. Re-adding a property replaces its
    /// value in place.
    pub fn add(&mut self, rule_index: usize, property: impl Into<String>, value: impl Into<String>) {
        let property = property.into();
        let value = value.into();
        let staged = self.by_rule.entry(rule_index).or_default();
        match staged.iter_mut().find(|a| a.property == property) {
            Some(existing) => existing.value = value,
            None => staged.push(AddedProperty { property, value }),
        }
    }

    pub fn remove(&mut self, rule_index: usize, property: &str) {
        if let Some(staged) = self.by_rule.get_mut(&rule_index) {
            staged.retain(|a| a.property != property);
            if staged.is_empty() {
                self.by_rule.remove(&rule_index);
            }
        }
    }

    pub fn for_rule(&self, rule_index: usize) -> &[AddedProperty] {
        self.by_rule
            .get(&rule_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_rule.is_empty()
    }
}

/// One immutable snapshot of all staged edits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WhatIf {
    pub disabled: DisabledProperties,
    pub property_overrides: PropertyOverrides,
    pub variable_overrides: VariableOverrides,
    pub added: AddedProperties,
}

static NO_EDITS: WhatIf = WhatIf::new();

impl WhatIf {
    pub const fn new() -> Self {
        Self {
            disabled: DisabledProperties::new(),
            property_overrides: PropertyOverrides::new(),
            variable_overrides: VariableOverrides::new(),
            added: AddedProperties::new(),
        }
    }

    /// A shared snapshot with no staged edits.
    pub fn none() -> &'static WhatIf {
        &NO_EDITS
    }

    pub fn with_disabled(mut self, disabled: DisabledProperties) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_property_overrides(mut self, overrides: PropertyOverrides) -> Self {
        self.property_overrides = overrides;
        self
    }

    pub fn with_variable_overrides(mut self, overrides: VariableOverrides) -> Self {
        self.variable_overrides = overrides;
        self
    }

    pub fn with_added(mut self, added: AddedProperties) -> Self {
        self.added = added;
        self
    }

    /// Returns `true` if, after staged edits, the rule still sets `property`:
    /// through a source declaration that is not disabled, or through a staged
    /// addition that is not disabled.
    pub fn rule_sets(&self, rule_index: usize, rule: &StyleRule, property: &str) -> bool {
        let declared = rule.declares(property) && !self.disabled.is_disabled(rule_index, property);
        declared
            || self
                .added
                .for_rule(rule_index)
                .iter()
                .any(|a| a.property == property && !self.disabled.is_added_disabled(rule_index, property))
    }

    pub fn is_empty(&self) -> bool {
        self.disabled.is_empty()
            && self.property_overrides.is_empty()
            && self.variable_overrides.is_empty()
            && self.added.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::model::Declaration;
    use pretty_assertions::assert_eq;

    // ── Disabled keys ────────────────────────────────────────────────

    #[test]
    fn key_text_forms() {
        assert_eq!(DisabledKey::declared(3, "color").to_string(), "3-color");
        assert_eq!(DisabledKey::added(3, "color").to_string(), "3::ADDED::color");
    }

    #[test]
    fn key_parse() {
        assert_eq!("3-color".parse::<DisabledKey>(), Ok(DisabledKey::declared(3, "color")));
        assert_eq!(
            "12::ADDED::margin-top".parse::<DisabledKey>(),
            Ok(DisabledKey::added(12, "margin-top"))
        );
        assert_eq!(
            "0--webkit-appearance".parse::<DisabledKey>(),
            Ok(DisabledKey::declared(0, "-webkit-appearance"))
        );
    }

    #[test]
    fn key_parse_rejects_garbage() {
        assert!("color".parse::<DisabledKey>().is_err());
        assert!("x-color".parse::<DisabledKey>().is_err());
        assert!("3-".parse::<DisabledKey>().is_err());
        assert!("::ADDED::color".parse::<DisabledKey>().is_err());
    }

    #[test]
    fn declared_and_added_are_distinct() {
        let disabled: DisabledProperties = [DisabledKey::added(0, "color")].into_iter().collect();
        assert!(disabled.is_added_disabled(0, "color"));
        assert!(!disabled.is_disabled(0, "color"));
    }

    // ── Overrides ────────────────────────────────────────────────────

    #[test]
    fn blank_override_is_absent() {
        let mut overrides = PropertyOverrides::new();
        overrides.set(".a", "color", "  ");
        overrides.set(".a", "margin", "0");
        assert_eq!(overrides.get(".a", "color"), None);
        assert_eq!(overrides.get(".a", "margin"), Some("0"));
        assert_eq!(overrides.get(".b", "margin"), None);
    }

    #[test]
    fn clear_override_drops_empty_selector() {
        let mut overrides = PropertyOverrides::new();
        overrides.set(".a", "color", "red");
        overrides.clear(".a", "color");
        assert!(overrides.is_empty());
    }

    #[test]
    fn variable_names_normalized() {
        let mut vars = VariableOverrides::new();
        vars.set("brand", "red");
        assert_eq!(vars.get("--brand"), Some("red"));
        assert_eq!(vars.get("brand"), Some("red"));
    }

    #[test]
    fn added_properties_replace_in_place() {
        let mut added = AddedProperties::new();
        added.add(1, "color", "red");
        added.add(1, "margin", "0");
        added.add(1, "color", "blue");
        let props: Vec<(&str, &str)> = added
            .for_rule(1)
            .iter()
            .map(|a| (a.property.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(props, vec![("color", "blue"), ("margin", "0")]);
        assert!(added.for_rule(2).is_empty());
        added.remove(1, "color");
        added.remove(1, "margin");
        assert!(added.is_empty());
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    #[test]
    fn rule_sets_honours_disabled_and_added() {
        let rule = StyleRule::new(".a", vec![Declaration::new("color", "red")]);
        let mut added = AddedProperties::new();
        added.add(0, "margin", "0");
        let what_if = WhatIf::new()
            .with_disabled([DisabledKey::declared(0, "color")].into_iter().collect())
            .with_added(added);

        assert!(!what_if.rule_sets(0, &rule, "color"));
        assert!(what_if.rule_sets(0, &rule, "margin"));
        assert!(WhatIf::none().rule_sets(0, &rule, "color"));
        assert!(WhatIf::none().is_empty());
    }
}
