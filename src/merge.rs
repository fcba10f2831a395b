//! Merging duplicate selectors.
//!
//! Applies [`MergeableGroup`]s from the suggestion engine. The input tree is
//! never modified: every operation returns a new [`RuleTree`], keeping the
//! surviving rules' indices.

use std::collections::HashSet;
use std::fmt;

use crate::css::model::{CssRule, Declaration, OriginSource, RuleKind, RuleTree, SourceLocation, StyleRule};
use crate::suggest::{find_mergeable_groups, MergeableGroup};

/// Marks preview lines whose value comes from a later occurrence.
pub const PREVIEW_MARKER: &str = "◆";

/// How one group collapses into a single rule.
///
/// The merged rule sits at the base rule's position but carries the values
/// that won among all occurrences. A rule placed between the base and the
/// occurrence a value came from can flip the outcome for elements it also
/// matches: `.a{color:red} .b{color:green} .a{color:blue}` on an element with
/// both classes renders blue before merging and green after. Such rules are
/// listed in `interleaved_rule_indices`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergePlan {
    /// The rule that survives and receives the merged declarations.
    pub base_rule_index: usize,
    pub merged: StyleRule,
    /// Spans every occurrence of the group.
    pub location: SourceLocation,
    /// Ascending.
    pub removed_rule_indices: Vec<usize>,
    /// Other style rules declaring a moved property between its source
    /// occurrence and the base. Ascending.
    pub interleaved_rule_indices: Vec<usize>,
}

impl MergePlan {
    /// `true` when no other rule sits between a moved value and the base.
    pub fn preserves_order(&self) -> bool {
        self.interleaved_rule_indices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeSummary {
    pub groups_merged: usize,
    pub rules_removed: usize,
    pub selectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub tree: RuleTree,
    pub summary: MergeSummary,
}

/// One property of a merged rule as shown in a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreviewLine {
    pub property: String,
    pub value: String,
    /// Declared by more than one occurrence, or only by a later one.
    pub highlighted: bool,
}

/// The merged rule of one group, before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergePreview {
    pub selector: String,
    pub lines: Vec<PreviewLine>,
}

impl MergePreview {
    pub fn has_highlights(&self) -> bool {
        self.lines.iter().any(|line| line.highlighted)
    }
}

impl fmt::Display for MergePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", self.selector)?;
        for line in &self.lines {
            write!(f, "  {}: {};", line.property, line.value)?;
            if line.highlighted {
                write!(f, " {PREVIEW_MARKER}")?;
            }
            writeln!(f)?;
        }
        write!(f, "}}")?;
        if self.has_highlights() {
            write!(f, "\n\n{PREVIEW_MARKER} = value combined from a later occurrence")?;
        }
        Ok(())
    }
}

/// A declaration of the merged rule and where it came from.
struct Collected {
    decl: Declaration,
    /// Position in the member list of the occurrence the value came from.
    source: usize,
    declared_by: usize,
}

/// Declarations in cascade order. Each property keeps the position of its
/// first occurrence and the value that wins the cascade: the last one, unless
/// an earlier one is `!important` and the later is not.
fn collect(members: &[&CssRule]) -> Vec<Collected> {
    let mut collected: Vec<Collected> = Vec::new();
    for (source, style) in members.iter().filter_map(|rule| rule.as_style()).enumerate() {
        for decl in &style.declarations {
            match collected.iter_mut().find(|c| c.decl.property == decl.property) {
                Some(existing) => {
                    existing.declared_by += 1;
                    if !(existing.decl.is_important() && !decl.is_important()) {
                        existing.decl = decl.clone();
                        existing.source = source;
                    }
                }
                None => collected.push(Collected {
                    decl: decl.clone(),
                    source,
                    declared_by: 1,
                }),
            }
        }
    }
    collected
}

fn members<'t>(tree: &'t RuleTree, group: &MergeableGroup) -> Vec<&'t CssRule> {
    group
        .rule_indices
        .iter()
        .filter_map(|&index| tree.get(index))
        .filter(|rule| rule.as_style().is_some())
        .collect()
}

/// The occurrence that survives a merge.
///
/// When the group spans both origins the first occurrence from `preferred`
/// is kept; otherwise the first occurrence.
fn choose_base(members: &[&CssRule], preferred: OriginSource) -> usize {
    let mixed = members
        .iter()
        .any(|rule| rule.origin.source != members[0].origin.source);
    if !mixed {
        return 0;
    }
    members
        .iter()
        .position(|rule| rule.origin.source == preferred)
        .unwrap_or(0)
}

/// Plan the merge of one group.
///
/// See [`MergePlan`] for where the merged rule lands. The merged rule keeps
/// the base's origin, so `preferred` decides which source a group split
/// between a stylesheet and inline style blocks collapses into.
///
/// Returns `None` when fewer than two of the group's rules are style rules in
/// `tree`.
pub fn plan_group(tree: &RuleTree, group: &MergeableGroup, preferred: OriginSource) -> Option<MergePlan> {
    let members = members(tree, group);
    if members.len() < 2 {
        return None;
    }

    let base = members[choose_base(&members, preferred)];
    let collected = collect(&members);

    let group_indices: HashSet<usize> = members.iter().map(|rule| rule.rule_index).collect();
    let mut interleaved: Vec<usize> = Vec::new();
    for c in &collected {
        let from = members[c.source].rule_index;
        let (lo, hi) = (from.min(base.rule_index), from.max(base.rule_index));
        interleaved.extend(
            tree.style_rules()
                .filter(|(rule, _)| rule.rule_index > lo && rule.rule_index < hi)
                .filter(|(rule, _)| !group_indices.contains(&rule.rule_index))
                .filter(|(_, style)| style.declarations.iter().any(|d| d.property == c.decl.property))
                .map(|(rule, _)| rule.rule_index),
        );
    }
    interleaved.sort_unstable();
    interleaved.dedup();
    if !interleaved.is_empty() {
        log::debug!(
            target: "cascade_lens::merge",
            "merging `{}` moves values past rule(s) {interleaved:?}",
            group.selector
        );
    }

    let location = members
        .iter()
        .skip(1)
        .fold(members[0].location, |span, rule| span.span(rule.location));
    let removed_rule_indices = members
        .iter()
        .map(|rule| rule.rule_index)
        .filter(|&index| index != base.rule_index)
        .collect();

    Some(MergePlan {
        base_rule_index: base.rule_index,
        merged: StyleRule::new(
            group.selector.clone(),
            collected.into_iter().map(|c| c.decl).collect(),
        ),
        location,
        removed_rule_indices,
        interleaved_rule_indices: interleaved,
    })
}

/// Preview the merged rule of one group. Returns `None` when there is
/// nothing to merge.
pub fn merge_preview(tree: &RuleTree, group: &MergeableGroup) -> Option<MergePreview> {
    let members = members(tree, group);
    if members.len() < 2 {
        return None;
    }
    let lines = collect(&members)
        .into_iter()
        .map(|c| PreviewLine {
            highlighted: c.declared_by > 1 || c.source > 0,
            property: c.decl.property,
            value: c.decl.value,
        })
        .collect();
    Some(MergePreview {
        selector: group.selector.clone(),
        lines,
    })
}

/// A plain-text summary of what merging `groups` would change.
pub fn merge_diff_preview(groups: &[MergeableGroup]) -> String {
    if groups.is_empty() {
        return "No mergeable selectors found.".to_owned();
    }
    let mut out = String::new();
    for (n, group) in groups.iter().enumerate() {
        let lines: Vec<String> = group.occurrences.iter().map(ToString::to_string).collect();
        out.push_str(&format!(
            "{}. {}\n   defined {} times, at lines {}\n   merges into 1 rule\n\n",
            n + 1,
            group.selector,
            group.count(),
            lines.join(", ")
        ));
    }
    let removed: usize = groups.iter().map(|g| g.count().saturating_sub(1)).sum();
    out.push_str(&format!(
        "Total: {} selector(s) merged\nRules removed: {removed}",
        groups.len()
    ));
    out
}

/// Merge every mergeable group of `tree`, keeping stylesheet occurrences.
pub fn merge_all(tree: &RuleTree) -> MergeOutcome {
    merge_selected(tree, &find_mergeable_groups(tree), OriginSource::Stylesheet)
}

/// Merge the given groups only.
pub fn merge_selected(tree: &RuleTree, groups: &[MergeableGroup], preferred: OriginSource) -> MergeOutcome {
    let plans: Vec<MergePlan> = groups
        .iter()
        .filter_map(|g| plan_group(tree, g, preferred))
        .collect();
    let removed: HashSet<usize> = plans
        .iter()
        .flat_map(|p| p.removed_rule_indices.iter().copied())
        .collect();

    let summary = MergeSummary {
        groups_merged: plans.len(),
        rules_removed: removed.len(),
        selectors: plans.iter().map(|p| p.merged.selector.clone()).collect(),
    };
    log::debug!(
        target: "cascade_lens::merge",
        "merged {} group(s), removed {} rule(s)",
        summary.groups_merged,
        summary.rules_removed
    );

    MergeOutcome {
        tree: RuleTree::from_ordered(apply(tree.rules(), &plans, &removed)),
        summary,
    }
}

fn apply(rules: &[CssRule], plans: &[MergePlan], removed: &HashSet<usize>) -> Vec<CssRule> {
    rules
        .iter()
        .filter(|rule| !removed.contains(&rule.rule_index))
        .map(|rule| match &rule.kind {
            RuleKind::Rule(_) => match plans.iter().find(|p| p.base_rule_index == rule.rule_index) {
                Some(plan) => CssRule::style(rule.rule_index, plan.merged.clone())
                    .with_origin(rule.origin)
                    .with_location(plan.location),
                None => rule.clone(),
            },
            RuleKind::AtRule(at) => {
                let mut at = at.clone();
                at.children = apply(&at.children, plans, removed);
                CssRule::at_rule(rule.rule_index, at)
                    .with_origin(rule.origin)
                    .with_location(rule.location)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::model::RuleTreeBuilder;
    use crate::serialize::to_css;
    use pretty_assertions::assert_eq;

    fn pairs(style: &StyleRule) -> Vec<(&str, &str)> {
        style
            .declarations
            .iter()
            .map(|d| (d.property.as_str(), d.value.as_str()))
            .collect()
    }

    #[test]
    fn plan_keeps_first_position_and_last_value() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red"), ("margin", "0")])
            .rule(".b", &[("color", "green")])
            .rule(".a", &[("padding", "4px"), ("color", "blue")])
            .build();
        let group = &find_mergeable_groups(&tree)[0];
        let plan = plan_group(&tree, group, OriginSource::Stylesheet).unwrap();
        assert_eq!(plan.base_rule_index, 0);
        assert_eq!(plan.removed_rule_indices, vec![2]);
        assert_eq!(
            pairs(&plan.merged),
            vec![("color", "blue"), ("margin", "0"), ("padding", "4px")]
        );
        assert_eq!(plan.location, SourceLocation::new(1, 3));
        assert_eq!(plan.interleaved_rule_indices, vec![1]);
    }

    #[test]
    fn important_survives_later_normal_value() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red !important")])
            .rule(".a", &[("color", "blue")])
            .build();
        let plan = plan_group(&tree, &find_mergeable_groups(&tree)[0], OriginSource::Stylesheet).unwrap();
        assert_eq!(pairs(&plan.merged), vec![("color", "red !important")]);
    }

    #[test]
    fn stylesheet_rule_is_base() {
        let tree = RuleTreeBuilder::new()
            .origin(OriginSource::InlineStyleBlock)
            .rule(".a", &[("color", "red")])
            .origin(OriginSource::Stylesheet)
            .rule(".a", &[("margin", "0")])
            .build();
        let plan = plan_group(&tree, &find_mergeable_groups(&tree)[0], OriginSource::Stylesheet).unwrap();
        assert_eq!(plan.base_rule_index, 1);
        assert_eq!(plan.removed_rule_indices, vec![0]);
    }

    #[test]
    fn preferred_origin_picks_base() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .origin(OriginSource::InlineStyleBlock)
            .rule(".a", &[("margin", "0")])
            .rule(".a", &[("padding", "0")])
            .build();
        let group = &find_mergeable_groups(&tree)[0];
        let plan = plan_group(&tree, group, OriginSource::InlineStyleBlock).unwrap();
        assert_eq!(plan.base_rule_index, 1);
        assert_eq!(plan.removed_rule_indices, vec![0, 2]);

        let outcome = merge_selected(&tree, &find_mergeable_groups(&tree), OriginSource::InlineStyleBlock);
        let merged = outcome.tree.get(1).unwrap();
        assert_eq!(merged.origin.source, OriginSource::InlineStyleBlock);
        assert_eq!(outcome.tree.len(), 1);
    }

    #[test]
    fn single_origin_keeps_first_occurrence() {
        let tree = RuleTreeBuilder::new()
            .origin(OriginSource::InlineStyleBlock)
            .rule(".a", &[("color", "red")])
            .rule(".a", &[("margin", "0")])
            .build();
        let plan = plan_group(&tree, &find_mergeable_groups(&tree)[0], OriginSource::Stylesheet).unwrap();
        assert_eq!(plan.base_rule_index, 0);
    }

    // ── Order hazards ────────────────────────────────────────────────

    #[test]
    fn interleaved_rule_is_reported() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".b", &[("color", "green")])
            .rule(".a", &[("color", "blue")])
            .build();
        let plan = plan_group(&tree, &find_mergeable_groups(&tree)[0], OriginSource::Stylesheet).unwrap();
        assert_eq!(pairs(&plan.merged), vec![("color", "blue")]);
        assert_eq!(plan.interleaved_rule_indices, vec![1]);
        assert!(!plan.preserves_order());
    }

    #[test]
    fn unrelated_rule_between_occurrences_is_safe() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".b", &[("margin", "0")])
            .rule(".a", &[("color", "blue")])
            .build();
        let plan = plan_group(&tree, &find_mergeable_groups(&tree)[0], OriginSource::Stylesheet).unwrap();
        assert!(plan.preserves_order());
    }

    #[test]
    fn later_base_reports_rules_before_it() {
        let tree = RuleTreeBuilder::new()
            .origin(OriginSource::InlineStyleBlock)
            .rule(".a", &[("padding", "4px")])
            .rule(".b", &[("padding", "0")])
            .origin(OriginSource::Stylesheet)
            .rule(".a", &[("color", "blue")])
            .build();
        let plan = plan_group(&tree, &find_mergeable_groups(&tree)[0], OriginSource::Stylesheet).unwrap();
        assert_eq!(plan.base_rule_index, 2);
        assert_eq!(plan.interleaved_rule_indices, vec![1]);
    }

    // ── Preview ──────────────────────────────────────────────────────

    #[test]
    fn preview_highlights_later_values() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red"), ("margin", "0")])
            .rule(".a", &[("padding", "4px"), ("color", "blue")])
            .build();
        let preview = merge_preview(&tree, &find_mergeable_groups(&tree)[0]).unwrap();
        let flags: Vec<_> = preview
            .lines
            .iter()
            .map(|l| (l.property.as_str(), l.value.as_str(), l.highlighted))
            .collect();
        assert_eq!(
            flags,
            vec![("color", "blue", true), ("margin", "0", false), ("padding", "4px", true)]
        );
        assert_eq!(
            preview.to_string(),
            ".a {\n  color: blue; ◆\n  margin: 0;\n  padding: 4px; ◆\n}\n\n◆ = value combined from a later occurrence"
        );
    }

    #[test]
    fn preview_without_highlights_has_no_legend() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".a", &[])
            .build();
        let preview = merge_preview(&tree, &find_mergeable_groups(&tree)[0]).unwrap();
        assert!(!preview.has_highlights());
        assert_eq!(preview.to_string(), ".a {\n  color: red;\n}");
    }

    #[test]
    fn diff_preview_counts_removals() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".a", &[("margin", "0")])
            .rule(".a", &[("padding", "0")])
            .build();
        let text = merge_diff_preview(&find_mergeable_groups(&tree));
        assert_eq!(
            text,
            "1. .a\n   defined 3 times, at lines 1, 2, 3\n   merges into 1 rule\n\n\
             Total: 1 selector(s) merged\nRules removed: 2"
        );
        assert_eq!(merge_diff_preview(&[]), "No mergeable selectors found.");
    }

    #[test]
    fn merge_all_is_copy_on_write() {
        let tree = RuleTreeBuilder::new()
            .skip(2)
            .rule(".card", &[("padding", "4px")])
            .skip(2)
            .rule(".card", &[("margin", "0")])
            .skip(3)
            .rule(".card", &[("padding", "8px")])
            .build();
        let before = tree.clone();

        let outcome = merge_all(&tree);
        assert_eq!(tree, before);
        assert_eq!(
            outcome.summary,
            MergeSummary {
                groups_merged: 1,
                rules_removed: 2,
                selectors: vec![".card".into()],
            }
        );
        assert_eq!(outcome.tree.len(), 1);
        let merged = outcome.tree.get(2).unwrap();
        assert_eq!(pairs(merged.as_style().unwrap()), vec![("padding", "8px"), ("margin", "0")]);
        assert_eq!(merged.location, SourceLocation::new(3, 10));
    }

    #[test]
    fn merges_inside_at_rules_separately() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .at_rule("media", "print", |b| {
                b.rule(".a", &[("color", "black")])
                    .rule(".a", &[("margin", "0")])
            })
            .build();
        let outcome = merge_all(&tree);
        assert_eq!(
            to_css(outcome.tree.rules()),
            ".a {\n  color: red;\n}\n\n@media print {\n  .a {\n    color: black;\n    margin: 0;\n  }\n}\n"
        );
    }

    #[test]
    fn merge_selected_leaves_other_groups() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".b", &[("color", "red")])
            .rule(".a", &[("margin", "0")])
            .rule(".b", &[("margin", "0")])
            .build();
        let groups = find_mergeable_groups(&tree);
        let outcome = merge_selected(&tree, &groups[1..], OriginSource::Stylesheet);
        let selectors: Vec<_> = outcome.tree.rules().iter().filter_map(CssRule::selector).collect();
        assert_eq!(selectors, [".a", ".b", ".a"]);
    }

    #[test]
    fn nothing_to_merge() {
        let tree = RuleTreeBuilder::new().rule(".a", &[("color", "red")]).build();
        let outcome = merge_all(&tree);
        assert_eq!(outcome.tree, tree);
        assert_eq!(outcome.summary, MergeSummary::default());
    }
}
