//! Rule tree data model.
//!
//! A stylesheet is a list of [`CssRule`]s. Each rule is either a style rule
//! (`selector { declarations }`) or an at-rule holding nested rules. Every rule
//! carries an explicit `rule_index` that increases strictly in depth-first
//! pre-order: an at-rule precedes its children, and the children precede the
//! at-rule's next sibling. The index is the cascade's order key and is never
//! recomputed after the tree is built.

use crate::css::specificity::compute_specificity;

/// 1-based source lines of a rule or declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceLocation {
    pub start_line: usize,
    pub end_line: usize,
}

impl SourceLocation {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    /// A location spanning a single line.
    pub fn line(line: usize) -> Self {
        Self::new(line, line)
    }

    /// The smallest location covering both `self` and `other`.
    pub fn span(self, other: SourceLocation) -> Self {
        Self::new(
            self.start_line.min(other.start_line),
            self.end_line.max(other.end_line),
        )
    }
}

/// Where a rule came from. Used for display and for choosing the rule that
/// survives a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum OriginSource {
    /// A standalone stylesheet.
    #[default]
    Stylesheet,
    /// A `<style>` block embedded in markup.
    InlineStyleBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Origin {
    pub source: OriginSource,
}

impl Origin {
    pub fn new(source: OriginSource) -> Self {
        Self { source }
    }
}

/// A single `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Declaration {
    pub property: String,
    /// The raw value text, including any `!important` suffix.
    pub value: String,
    pub location: SourceLocation,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            location: SourceLocation::default(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns `true` if the value ends with `!important`.
    pub fn is_important(&self) -> bool {
        split_important(&self.value).1
    }

    /// Returns `true` for custom properties (`--name`).
    pub fn is_custom_property(&self) -> bool {
        self.property.starts_with("--")
    }
}

/// Split a value into its text and whether it carried `!important`.
pub fn split_important(value: &str) -> (&str, bool) {
    let trimmed = value.trim_end();
    let lower_tail = trimmed
        .len()
        .checked_sub("important".len())
        .and_then(|at| trimmed.get(at..))
        .map(str::to_ascii_lowercase);
    if lower_tail.as_deref() == Some("important") {
        let head = &trimmed[..trimmed.len() - "important".len()];
        if let Some(rest) = head.trim_end().strip_suffix('!') {
            return (rest.trim_end(), true);
        }
    }
    (trimmed, false)
}

/// `selector { declarations }`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StyleRule {
    pub selector: String,
    /// Declarations in source order. Duplicates are kept; the last one wins.
    pub declarations: Vec<Declaration>,
    pub specificity: u32,
}

impl StyleRule {
    /// Create a style rule, computing its specificity from the selector.
    pub fn new(selector: impl Into<String>, declarations: Vec<Declaration>) -> Self {
        let selector = selector.into();
        let specificity = compute_specificity(&selector);
        Self {
            selector,
            declarations,
            specificity,
        }
    }

    /// Returns `true` if any declaration sets `property`.
    pub fn declares(&self, property: &str) -> bool {
        self.declarations.iter().any(|d| d.property == property)
    }

    /// The winning (last) value declared for `property`.
    pub fn value_of(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|d| d.property == property)
            .map(|d| d.value.as_str())
    }

    /// Distinct property names in order of first appearance.
    pub fn property_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.declarations.len());
        for decl in &self.declarations {
            if !names.contains(&decl.property.as_str()) {
                names.push(&decl.property);
            }
        }
        names
    }
}

/// `@name params { children }`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtRule {
    /// Name without the `@`: `media`, `keyframes`, `font-face`.
    pub name: String,
    /// Raw parameter text: `(max-width: 600px)`, `spin`.
    pub params: String,
    pub children: Vec<CssRule>,
    /// Declarations placed directly in the block (`@font-face`, `@page`).
    pub declarations: Vec<Declaration>,
}

impl AtRule {
    pub fn new(name: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
            children: Vec::new(),
            declarations: Vec::new(),
        }
    }

    /// `@keyframes` and vendor-prefixed variants.
    pub fn is_keyframes(&self) -> bool {
        self.name == "keyframes" || (self.name.starts_with('-') && self.name.ends_with("-keyframes"))
    }

    pub fn is_media(&self) -> bool {
        self.name == "media"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuleKind {
    Rule(StyleRule),
    AtRule(AtRule),
}

/// One rule occurrence in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CssRule {
    pub rule_index: usize,
    pub kind: RuleKind,
    pub origin: Origin,
    pub location: SourceLocation,
}

impl CssRule {
    pub fn style(rule_index: usize, rule: StyleRule) -> Self {
        Self {
            rule_index,
            kind: RuleKind::Rule(rule),
            origin: Origin::default(),
            location: SourceLocation::default(),
        }
    }

    pub fn at_rule(rule_index: usize, rule: AtRule) -> Self {
        Self {
            rule_index,
            kind: RuleKind::AtRule(rule),
            origin: Origin::default(),
            location: SourceLocation::default(),
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn as_style(&self) -> Option<&StyleRule> {
        match &self.kind {
            RuleKind::Rule(rule) => Some(rule),
            RuleKind::AtRule(_) => None,
        }
    }

    pub fn as_at_rule(&self) -> Option<&AtRule> {
        match &self.kind {
            RuleKind::AtRule(rule) => Some(rule),
            RuleKind::Rule(_) => None,
        }
    }

    /// The selector of a style rule.
    pub fn selector(&self) -> Option<&str> {
        self.as_style().map(|r| r.selector.as_str())
    }
}

/// A custom property declared anywhere in the stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeclaredVariable {
    /// Including the leading `--`.
    pub name: String,
    pub value: String,
}

impl DeclaredVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Errors raised while assembling a [`RuleTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("rule index {found} does not follow {previous} in document order")]
    NonMonotonicIndex { previous: usize, found: usize },
}

/// A validated rule tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RuleTree {
    rules: Vec<CssRule>,
}

impl RuleTree {
    /// Wrap top-level rules, checking that `rule_index` strictly increases in
    /// depth-first pre-order.
    pub fn new(rules: Vec<CssRule>) -> Result<Self, TreeError> {
        let tree = Self { rules };
        let mut previous: Option<usize> = None;
        for visit in tree.walk() {
            let found = visit.rule.rule_index;
            if let Some(previous) = previous {
                if found <= previous {
                    return Err(TreeError::NonMonotonicIndex { previous, found });
                }
            }
            previous = Some(found);
        }
        Ok(tree)
    }

    /// Wrap rules already known to be ordered (derived from a validated tree
    /// by removing or editing rules in place).
    pub(crate) fn from_ordered(rules: Vec<CssRule>) -> Self {
        Self { rules }
    }

    /// Top-level rules.
    pub fn rules(&self) -> &[CssRule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<CssRule> {
        self.rules
    }

    /// Depth-first pre-order walk over every rule, i.e. ascending `rule_index`.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(&self.rules)
    }

    /// Every style rule outside `@keyframes`, in document order.
    pub fn style_rules(&self) -> impl Iterator<Item = (&CssRule, &StyleRule)> + '_ {
        self.walk()
            .filter(|visit| !visit.in_keyframes())
            .filter_map(|visit| visit.rule.as_style().map(|style| (visit.rule, style)))
    }

    /// Find a rule (at any depth) by index.
    pub fn get(&self, rule_index: usize) -> Option<&CssRule> {
        self.walk()
            .map(|visit| visit.rule)
            .find(|rule| rule.rule_index == rule_index)
    }

    /// Find a rule by index together with its walk context.
    pub fn visit(&self, rule_index: usize) -> Option<Visit<'_>> {
        self.walk().find(|visit| visit.rule.rule_index == rule_index)
    }

    /// Total number of rules at every depth.
    pub fn len(&self) -> usize {
        self.walk().count()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Custom properties from every style rule, in document order.
    ///
    /// A name declared more than once keeps its position of first appearance
    /// and takes its last value.
    pub fn custom_properties(&self) -> Vec<DeclaredVariable> {
        let mut vars: Vec<DeclaredVariable> = Vec::new();
        for (_, style) in self.style_rules() {
            for decl in style.declarations.iter().filter(|d| d.is_custom_property()) {
                let value = split_important(&decl.value).0.to_owned();
                match vars.iter_mut().find(|v| v.name == decl.property) {
                    Some(existing) => existing.value = value,
                    None => vars.push(DeclaredVariable::new(decl.property.clone(), value)),
                }
            }
        }
        vars
    }
}

/// One step of a [`RuleTree::walk`].
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub rule: &'a CssRule,
    /// The enclosing at-rule, if any.
    pub parent: Option<&'a CssRule>,
    /// 0 for top-level rules.
    pub depth: usize,
}

impl<'a> Visit<'a> {
    /// Returns `true` if the rule is a frame of a `@keyframes` block.
    pub fn in_keyframes(&self) -> bool {
        self.parent_at_rule().is_some_and(AtRule::is_keyframes)
    }

    pub fn parent_at_rule(&self) -> Option<&'a AtRule> {
        self.parent.and_then(CssRule::as_at_rule)
    }
}

/// Iterative depth-first walk.
pub struct Walk<'a> {
    stack: Vec<Visit<'a>>,
}

impl<'a> Walk<'a> {
    fn new(rules: &'a [CssRule]) -> Self {
        let stack = rules
            .iter()
            .rev()
            .map(|rule| Visit {
                rule,
                parent: None,
                depth: 0,
            })
            .collect();
        Self { stack }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let visit = self.stack.pop()?;
        if let RuleKind::AtRule(at) = &visit.rule.kind {
            self.stack.extend(at.children.iter().rev().map(|child| Visit {
                rule: child,
                parent: Some(visit.rule),
                depth: visit.depth + 1,
            }));
        }
        Some(visit)
    }
}

/// Builds a [`RuleTree`] with indices assigned in document order.
///
/// # Example
///
/// ```
/// use cascade_lens::css::model::RuleTreeBuilder;
///
/// let tree = RuleTreeBuilder::new()
///     .rule(".a", &[("color", "red")])
///     .at_rule("media", "(max-width: 600px)", |b| b.rule(".a", &[("color", "blue")]))
///     .build();
///
/// assert_eq!(tree.len(), 3);
/// assert_eq!(tree.get(2).and_then(|r| r.selector()), Some(".a"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleTreeBuilder {
    rules: Vec<CssRule>,
    next_index: usize,
    origin: Origin,
}

impl RuleTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Origin applied to the rules added after this call.
    pub fn origin(mut self, source: OriginSource) -> Self {
        self.origin = Origin::new(source);
        self
    }

    /// Leave `count` indices unused before the next rule.
    pub fn skip(mut self, count: usize) -> Self {
        self.next_index += count;
        self
    }

    /// Add a style rule. Its location defaults to line `rule_index + 1`.
    pub fn rule(self, selector: &str, declarations: &[(&str, &str)]) -> Self {
        let line = SourceLocation::line(self.next_index + 1);
        self.rule_at(selector, declarations, line)
    }

    /// Add a style rule at an explicit location.
    pub fn rule_at(
        mut self,
        selector: &str,
        declarations: &[(&str, &str)],
        location: SourceLocation,
    ) -> Self {
        let declarations = declarations
            .iter()
            .map(|(property, value)| Declaration::new(*property, *value).at(location))
            .collect();
        let rule = CssRule::style(self.next_index, StyleRule::new(selector, declarations))
            .with_origin(self.origin)
            .with_location(location);
        self.next_index += 1;
        self.rules.push(rule);
        self
    }

    /// Add a grouping at-rule; `children` adds its nested rules.
    pub fn at_rule(
        mut self,
        name: &str,
        params: &str,
        children: impl FnOnce(RuleTreeBuilder) -> RuleTreeBuilder,
    ) -> Self {
        let index = self.next_index;
        let nested = children(RuleTreeBuilder {
            rules: Vec::new(),
            next_index: index + 1,
            origin: self.origin,
        });
        let mut at = AtRule::new(name, params);
        at.children = nested.rules;
        let location = SourceLocation::line(index + 1).span(
            at.children
                .last()
                .map_or(SourceLocation::line(index + 1), |c| c.location),
        );
        self.rules.push(
            CssRule::at_rule(index, at)
                .with_origin(self.origin)
                .with_location(location),
        );
        self.next_index = nested.next_index;
        self
    }

    /// Add a descriptor at-rule such as `@font-face` with direct declarations.
    pub fn descriptor(mut self, name: &str, params: &str, declarations: &[(&str, &str)]) -> Self {
        let location = SourceLocation::line(self.next_index + 1);
        let mut at = AtRule::new(name, params);
        at.declarations = declarations
            .iter()
            .map(|(property, value)| Declaration::new(*property, *value).at(location))
            .collect();
        self.rules.push(
            CssRule::at_rule(self.next_index, at)
                .with_origin(self.origin)
                .with_location(location),
        );
        self.next_index += 1;
        self
    }

    pub fn build(self) -> RuleTree {
        RuleTree::from_ordered(self.rules)
    }
}
