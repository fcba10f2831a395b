//! Refactor suggestions.
//!
//! Read-only advice derived from the rule tree and impact data. Nothing here
//! edits a stylesheet; the [`merge`](crate::merge) module applies a mergeable
//! group when the host asks for it.

use std::collections::HashMap;

use crate::css::model::{CssRule, RuleTree};
use crate::impact::{is_rule_redundant, RuleImpact};

/// Where a group of duplicate selectors lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MergeScope {
    TopLevel,
    /// Children of one at-rule occurrence.
    AtRule { rule_index: usize, prelude: String },
}

/// Rules sharing one selector within one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeableGroup {
    pub selector: String,
    pub scope: MergeScope,
    /// Ascending.
    pub rule_indices: Vec<usize>,
    /// Start line of each occurrence, ascending.
    pub occurrences: Vec<usize>,
}

impl MergeableGroup {
    pub fn count(&self) -> usize {
        self.rule_indices.len()
    }

    pub fn description(&self) -> String {
        format!(
            "This selector is defined {} times and could be merged",
            self.count()
        )
    }
}

/// Group style rules with identical selectors.
///
/// Grouping never crosses an at-rule boundary: a rule inside `@media` only
/// groups with its siblings. Keyframe frames are not selectors and are left
/// out. Groups come in order of first occurrence.
pub fn find_mergeable_groups(tree: &RuleTree) -> Vec<MergeableGroup> {
    let mut groups: Vec<MergeableGroup> = Vec::new();
    let mut slots: HashMap<(Option<usize>, &str), usize> = HashMap::new();

    for visit in tree.walk() {
        if visit.in_keyframes() {
            continue;
        }
        let Some(style) = visit.rule.as_style() else {
            continue;
        };
        let scope_key = visit.parent.map(|p| p.rule_index);
        let slot = *slots
            .entry((scope_key, style.selector.as_str()))
            .or_insert_with(|| {
                let scope = match (visit.parent, visit.parent_at_rule()) {
                    (Some(parent), Some(at)) => MergeScope::AtRule {
                        rule_index: parent.rule_index,
                        prelude: prelude(&at.name, &at.params),
                    },
                    _ => MergeScope::TopLevel,
                };
                groups.push(MergeableGroup {
                    selector: style.selector.clone(),
                    scope,
                    rule_indices: Vec::new(),
                    occurrences: Vec::new(),
                });
                groups.len() - 1
            });
        groups[slot].rule_indices.push(visit.rule.rule_index);
        groups[slot].occurrences.push(visit.rule.location.start_line);
    }

    groups.retain(|group| group.count() > 1);
    for group in &mut groups {
        group.occurrences.sort_unstable();
    }
    groups
}

fn prelude(name: &str, params: &str) -> String {
    if params.is_empty() {
        format!("@{name}")
    } else {
        format!("@{name} {params}")
    }
}

/// All suggestions are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    #[default]
    Info,
}

/// A declaration that never takes effect on any affected node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeadDeclaration {
    pub property: String,
    pub value: String,
    pub overridden_by: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SuggestionKind {
    /// The rule's selector is declared more than once in its scope.
    Mergeable { group: MergeableGroup },
    /// Some declarations never win the cascade.
    AlwaysOverridden { declarations: Vec<DeadDeclaration> },
    /// No declaration of the rule takes effect.
    FullyOverridden,
    /// Every mergeable group in the stylesheet.
    GlobalMergeable { groups: Vec<MergeableGroup> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Suggestion {
    pub id: String,
    pub kind: SuggestionKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub details: String,
}

impl Suggestion {
    /// Whether the host can offer an action for this suggestion (a merge).
    pub fn is_actionable(&self) -> bool {
        matches!(self.kind, SuggestionKind::Mergeable { .. })
    }
}

/// Suggestions for one rule.
///
/// `impact` is the rule's measured impact, if one was taken. Suggestions that
/// need impact data are skipped without it.
pub fn suggest(rule: &CssRule, impact: Option<&RuleImpact>, tree: &RuleTree) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    let Some(style) = rule.as_style() else {
        return suggestions;
    };

    if let Some(group) = find_mergeable_groups(tree)
        .into_iter()
        .find(|g| g.rule_indices.contains(&rule.rule_index))
    {
        let lines: Vec<String> = group.occurrences.iter().map(|l| format!("Line {l}")).collect();
        suggestions.push(Suggestion {
            id: format!("merge-{}", style.selector),
            severity: Severity::Info,
            title: "Mergeable Rules".into(),
            description: "This selector is defined multiple times and could be consolidated".into(),
            details: format!("Occurrences: {}", lines.join(", ")),
            kind: SuggestionKind::Mergeable { group },
        });
    }

    let Some(impact) = impact.filter(|i| !i.is_empty()) else {
        return suggestions;
    };

    let dead = dead_declarations(rule, impact);
    if !dead.is_empty() {
        let details: Vec<String> = dead
            .iter()
            .map(|d| format!("{} ({})", d.property, dead_reason(rule.rule_index, d)))
            .collect();
        suggestions.push(Suggestion {
            id: format!("always-overridden-{}", rule.rule_index),
            severity: Severity::Info,
            title: "Always Overridden Properties".into(),
            description: format!("{} declaration(s) never win the cascade", dead.len()),
            details: details.join("; "),
            kind: SuggestionKind::AlwaysOverridden { declarations: dead },
        });
    }

    if is_rule_redundant(impact).is_redundant {
        suggestions.push(Suggestion {
            id: format!("fully-overridden-{}", rule.rule_index),
            kind: SuggestionKind::FullyOverridden,
            severity: Severity::Info,
            title: "Fully Overridden Rule".into(),
            description: "All declarations are overridden by later rules".into(),
            details: "This rule does not contribute any final computed values and may be a \
                      candidate for removal"
                .into(),
        });
    }

    suggestions
}

/// Declarations that are not effective on any affected node.
///
/// Impact properties line up with the rule's declarations by position.
fn dead_declarations(rule: &CssRule, impact: &RuleImpact) -> Vec<DeadDeclaration> {
    let Some(style) = rule.as_style() else {
        return Vec::new();
    };
    style
        .declarations
        .iter()
        .enumerate()
        .filter_map(|(position, decl)| {
            let observations: Vec<_> = impact
                .affected_nodes
                .iter()
                .filter_map(|node| node.properties.get(position))
                .filter(|p| p.property == decl.property)
                .collect();
            if observations.is_empty() || observations.iter().any(|p| p.effective) {
                return None;
            }
            Some(DeadDeclaration {
                property: decl.property.clone(),
                value: decl.value.clone(),
                overridden_by: observations.iter().find_map(|p| p.overridden_by),
            })
        })
        .collect()
}

fn dead_reason(rule_index: usize, dead: &DeadDeclaration) -> String {
    match dead.overridden_by {
        Some(index) if index == rule_index => "repeated later in the same rule".into(),
        Some(index) => format!("overridden by rule {index}"),
        None => "no visible effect".into(),
    }
}

/// Stylesheet-wide suggestions.
pub fn global_suggestions(tree: &RuleTree) -> Vec<Suggestion> {
    let groups = find_mergeable_groups(tree);
    if groups.is_empty() {
        return Vec::new();
    }
    let details: Vec<String> = groups
        .iter()
        .map(|g| format!("{} ×{}", g.selector, g.count()))
        .collect();
    vec![Suggestion {
        id: "mergeable-summary".into(),
        severity: Severity::Info,
        title: "Mergeable Rules Found".into(),
        description: format!("{} group(s) of rules with duplicate selectors", groups.len()),
        details: details.join(", "),
        kind: SuggestionKind::GlobalMergeable { groups },
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::model::RuleTreeBuilder;
    use crate::impact::{AffectedNode, PropertyImpact};
    use pretty_assertions::assert_eq;

    fn impact(rule_index: usize, props: &[(&str, bool, Option<usize>)]) -> RuleImpact {
        RuleImpact {
            rule_index,
            selector: ".a".into(),
            affected_nodes: vec![AffectedNode {
                node_id: "node--a".into(),
                element: ".a".into(),
                properties: props
                    .iter()
                    .map(|&(property, effective, overridden_by)| PropertyImpact {
                        property: property.into(),
                        effective,
                        value: String::new(),
                        overridden_by,
                    })
                    .collect(),
            }],
        }
    }

    // ── Mergeable groups ─────────────────────────────────────────────

    #[test]
    fn groups_by_selector_in_first_occurrence_order() {
        let tree = RuleTreeBuilder::new()
            .rule(".b", &[("color", "red")])
            .rule(".a", &[("color", "red")])
            .rule(".b", &[("margin", "0")])
            .rule(".a", &[("margin", "0")])
            .rule(".c", &[("margin", "0")])
            .build();
        let groups = find_mergeable_groups(&tree);
        let summary: Vec<_> = groups
            .iter()
            .map(|g| (g.selector.as_str(), g.rule_indices.clone()))
            .collect();
        assert_eq!(summary, vec![(".b", vec![0, 2]), (".a", vec![1, 3])]);
        assert_eq!(groups[0].scope, MergeScope::TopLevel);
        assert_eq!(groups[0].description(), "This selector is defined 2 times and could be merged");
    }

    #[test]
    fn groups_do_not_cross_at_rules() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .at_rule("media", "print", |b| {
                b.rule(".a", &[("color", "black")])
                    .rule(".a", &[("margin", "0")])
            })
            .at_rule("keyframes", "pulse", |b| {
                b.rule("to", &[("opacity", "0")]).rule("to", &[("opacity", "1")])
            })
            .build();
        let groups = find_mergeable_groups(&tree);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rule_indices, vec![2, 3]);
        assert_eq!(
            groups[0].scope,
            MergeScope::AtRule {
                rule_index: 1,
                prelude: "@media print".into(),
            }
        );
    }

    #[test]
    fn mergeable_suggestion_lists_lines() {
        let tree = RuleTreeBuilder::new()
            .rule(".card", &[("padding", "4px")])
            .rule(".other", &[("margin", "0")])
            .rule(".card", &[("color", "red")])
            .build();
        let rule = tree.get(2).unwrap();
        let suggestions = suggest(rule, None, &tree);
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.id, "merge-.card");
        assert_eq!(s.title, "Mergeable Rules");
        assert_eq!(s.details, "Occurrences: Line 1, Line 3");
        assert_eq!(s.severity, Severity::Info);
        assert!(s.is_actionable());
    }

    // ── Impact-based suggestions ─────────────────────────────────────

    #[test]
    fn always_overridden_declarations() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red"), ("margin", "0"), ("padding", "4px")])
            .rule(".a", &[("color", "blue")])
            .build();
        let rule = tree.get(0).unwrap();
        let measured = impact(
            0,
            &[("color", false, Some(1)), ("margin", false, None), ("padding", true, None)],
        );
        let suggestions = suggest(rule, Some(&measured), &tree);
        let dead = suggestions
            .iter()
            .find(|s| s.id == "always-overridden-0")
            .unwrap();
        assert_eq!(dead.description, "2 declaration(s) never win the cascade");
        assert_eq!(dead.details, "color (overridden by rule 1); margin (no visible effect)");
        assert!(!dead.is_actionable());
        assert!(!suggestions.iter().any(|s| s.kind == SuggestionKind::FullyOverridden));
    }

    #[test]
    fn fully_overridden_rule() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red"), ("color", "green")])
            .rule(".a", &[("color", "blue")])
            .build();
        let rule = tree.get(0).unwrap();
        let measured = impact(0, &[("color", false, Some(0)), ("color", false, Some(1))]);
        let suggestions = suggest(rule, Some(&measured), &tree);
        let ids: Vec<_> = suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["merge-.a", "always-overridden-0", "fully-overridden-0"]);
        assert_eq!(
            suggestions[1].details,
            "color (repeated later in the same rule); color (overridden by rule 1)"
        );
    }

    #[test]
    fn empty_impact_gives_no_impact_suggestions() {
        let tree = RuleTreeBuilder::new().rule(".a", &[("color", "red")]).build();
        let rule = tree.get(0).unwrap();
        assert!(suggest(rule, Some(&RuleImpact::empty(0, ".a")), &tree).is_empty());
    }

    #[test]
    fn at_rules_get_no_suggestions() {
        let tree = RuleTreeBuilder::new()
            .at_rule("media", "print", |b| b.rule(".a", &[("color", "red")]))
            .build();
        assert!(suggest(tree.get(0).unwrap(), None, &tree).is_empty());
    }

    // ── Global ───────────────────────────────────────────────────────

    #[test]
    fn global_summary() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".a", &[("color", "blue")])
            .build();
        let global = global_suggestions(&tree);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].id, "mergeable-summary");
        assert_eq!(global[0].description, "1 group(s) of rules with duplicate selectors");
        assert_eq!(global[0].details, ".a ×2");

        let clean = RuleTreeBuilder::new().rule(".a", &[("color", "red")]).build();
        assert!(global_suggestions(&clean).is_empty());
    }
}
