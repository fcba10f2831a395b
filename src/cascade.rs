//! Cascade override resolution.
//!
//! Decides whether a declaration on one rule occurrence is re-declared by a
//! later rule that wins the cascade for the same selector. Only direct
//! selector relationships are considered: an exact repeat of the selector, or a
//! pseudo-class variant of the same base selector with strictly higher
//! specificity. Combinators and inheritance are not reasoned about.

use crate::css::model::{RuleTree, StyleRule};
use crate::css::specificity::{
    base_selector, compute_specificity, has_pseudo_class, has_pseudo_element,
};
use crate::state::WhatIf;

/// How a later rule relates to the rule it overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverrideKind {
    /// Same selector text.
    Exact,
    /// Pseudo-class variant of the same base selector.
    PseudoVariant,
}

/// The rule that wins the cascade over an earlier declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OverridingRule {
    pub rule_index: usize,
    pub selector: String,
    pub specificity: u32,
    pub kind: OverrideKind,
}

/// Resolves overrides against one rule tree and one What-If snapshot.
///
/// Style rules are flattened once, in document order, with `@keyframes` frames
/// left out.
#[derive(Debug)]
pub struct OverrideResolver<'a> {
    tree: &'a RuleTree,
    what_if: &'a WhatIf,
    rules: Vec<(usize, &'a StyleRule)>,
}

impl<'a> OverrideResolver<'a> {
    /// A resolver with no staged edits.
    pub fn new(tree: &'a RuleTree) -> Self {
        Self::with_what_if(tree, WhatIf::none())
    }

    /// A resolver that sees the rule set after staged edits: disabled
    /// declarations no longer override, staged additions do.
    pub fn with_what_if(tree: &'a RuleTree, what_if: &'a WhatIf) -> Self {
        let rules = tree
            .style_rules()
            .map(|(rule, style)| (rule.rule_index, style))
            .collect();
        Self {
            tree,
            what_if,
            rules,
        }
    }

    pub fn tree(&self) -> &'a RuleTree {
        self.tree
    }

    pub fn what_if(&self) -> &'a WhatIf {
        self.what_if
    }

    /// The nearest later rule that overrides `property` of the rule at
    /// `rule_index` (whose selector is `selector`).
    pub fn find_overriding_rule(
        &self,
        rule_index: usize,
        selector: &str,
        property: &str,
    ) -> Option<OverridingRule> {
        let current_specificity = self.specificity_of(rule_index, selector);
        let base = base_selector(selector);
        let current_is_pseudo_element = has_pseudo_element(selector);

        let start = self.rules.partition_point(|(index, _)| *index <= rule_index);
        self.rules[start..].iter().find_map(|&(later_index, later)| {
            let kind = if later.selector == selector {
                OverrideKind::Exact
            } else if !current_is_pseudo_element
                && !base.is_empty()
                && has_pseudo_class(&later.selector)
                && !has_pseudo_element(&later.selector)
                && base_selector(&later.selector) == base
                && later.specificity > current_specificity
            {
                OverrideKind::PseudoVariant
            } else {
                return None;
            };

            if !self.what_if.rule_sets(later_index, later, property) {
                return None;
            }

            log::trace!(
                target: "cascade_lens::cascade",
                "{property} on rule {rule_index} overridden by rule {later_index} ({kind:?})"
            );
            Some(OverridingRule {
                rule_index: later_index,
                selector: later.selector.clone(),
                specificity: later.specificity,
                kind,
            })
        })
    }

    pub fn is_overridden(&self, rule_index: usize, selector: &str, property: &str) -> bool {
        self.find_overriding_rule(rule_index, selector, property)
            .is_some()
    }

    fn specificity_of(&self, rule_index: usize, selector: &str) -> u32 {
        match self
            .rules
            .binary_search_by_key(&rule_index, |(index, _)| *index)
        {
            Ok(at) => self.rules[at].1.specificity,
            Err(_) => compute_specificity(selector),
        }
    }
}
