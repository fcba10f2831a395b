//! Writing rule trees back to CSS, and committing What-If edits.

use std::fmt::Write as _;

use crate::cascade::OverrideResolver;
use crate::css::model::{CssRule, Declaration, OriginSource, RuleKind, RuleTree, StyleRule};
use crate::state::WhatIf;

/// Serialize rules with two-space indentation and a blank line between
/// top-level rules.
pub fn to_css(rules: &[CssRule]) -> String {
    let blocks: Vec<String> = rules
        .iter()
        .map(|rule| {
            let mut out = String::new();
            write_rule(&mut out, rule, 0);
            out.trim_end().to_owned()
        })
        .collect();
    if blocks.is_empty() {
        return String::new();
    }
    let mut css = blocks.join("\n\n");
    css.push('\n');
    css
}

/// Serialized CSS split by where each top-level rule came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CssByOrigin {
    /// Rules from `<style>` blocks in markup.
    pub inline: String,
    pub stylesheet: String,
}

/// Serialize top-level rules into one text per origin, each formatted like
/// [`to_css`]. At-rules go with their own origin, children included.
pub fn to_css_by_origin(rules: &[CssRule]) -> CssByOrigin {
    let (inline, stylesheet): (Vec<CssRule>, Vec<CssRule>) = rules
        .iter()
        .cloned()
        .partition(|rule| rule.origin.source == OriginSource::InlineStyleBlock);
    CssByOrigin {
        inline: to_css(&inline),
        stylesheet: to_css(&stylesheet),
    }
}

fn write_rule(out: &mut String, rule: &CssRule, depth: usize) {
    let indent = "  ".repeat(depth);
    match &rule.kind {
        RuleKind::Rule(style) => {
            let _ = writeln!(out, "{indent}{} {{", style.selector);
            write_declarations(out, &style.declarations, depth + 1);
            let _ = writeln!(out, "{indent}}}");
        }
        RuleKind::AtRule(at) => {
            if at.params.is_empty() {
                let _ = writeln!(out, "{indent}@{} {{", at.name);
            } else {
                let _ = writeln!(out, "{indent}@{} {} {{", at.name, at.params);
            }
            write_declarations(out, &at.declarations, depth + 1);
            for child in &at.children {
                write_rule(out, child, depth + 1);
            }
            let _ = writeln!(out, "{indent}}}");
        }
    }
}

fn write_declarations(out: &mut String, declarations: &[Declaration], depth: usize) {
    let indent = "  ".repeat(depth);
    for decl in declarations {
        let _ = writeln!(out, "{indent}{}: {};", decl.property, decl.value);
    }
}

/// Commit a What-If snapshot into a new tree.
///
/// Disabled declarations are removed, staged values replace the declarations
/// they showed on in the preview (occurrences the cascade hides keep their
/// value), staged additions are appended, and style rules emptied by the edits
/// are dropped. Rule indices are kept.
pub fn materialize(tree: &RuleTree, what_if: &WhatIf) -> RuleTree {
    let resolver = OverrideResolver::with_what_if(tree, what_if);
    RuleTree::from_ordered(materialize_rules(tree.rules(), &resolver, false))
}

fn materialize_rules(rules: &[CssRule], resolver: &OverrideResolver<'_>, in_keyframes: bool) -> Vec<CssRule> {
    let what_if = resolver.what_if();
    rules
        .iter()
        .filter_map(|rule| match &rule.kind {
            RuleKind::Rule(style) => {
                let committed = commit_style(rule.rule_index, style, resolver, in_keyframes);
                if committed.declarations.is_empty() && !style.declarations.is_empty() {
                    log::debug!(
                        target: "cascade_lens::serialize",
                        "dropping emptied rule {} `{}`",
                        rule.rule_index,
                        style.selector
                    );
                    return None;
                }
                Some(
                    CssRule::style(rule.rule_index, committed)
                        .with_origin(rule.origin)
                        .with_location(rule.location),
                )
            }
            RuleKind::AtRule(at) => {
                let mut at = at.clone();
                at.declarations
                    .retain(|d| !what_if.disabled.is_disabled(rule.rule_index, &d.property));
                at.children = materialize_rules(&at.children, resolver, at.is_keyframes());
                Some(
                    CssRule::at_rule(rule.rule_index, at)
                        .with_origin(rule.origin)
                        .with_location(rule.location),
                )
            }
        })
        .collect()
}

fn commit_style(
    rule_index: usize,
    style: &StyleRule,
    resolver: &OverrideResolver<'_>,
    in_keyframes: bool,
) -> StyleRule {
    let what_if = resolver.what_if();
    let mut declarations: Vec<Declaration> = style
        .declarations
        .iter()
        .filter(|d| !what_if.disabled.is_disabled(rule_index, &d.property))
        .map(|decl| {
            let staged = what_if
                .property_overrides
                .get(&style.selector, &decl.property)
                .filter(|_| {
                    !in_keyframes && !resolver.is_overridden(rule_index, &style.selector, &decl.property)
                });
            match staged {
                Some(value) => Declaration::new(decl.property.clone(), value).at(decl.location),
                None => decl.clone(),
            }
        })
        .collect();
    declarations.extend(
        what_if
            .added
            .for_rule(rule_index)
            .iter()
            .filter(|added| !what_if.disabled.is_added_disabled(rule_index, &added.property))
            .map(|added| Declaration::new(added.property.clone(), added.value.clone())),
    );
    StyleRule {
        declarations,
        ..style.clone()
    }
}
