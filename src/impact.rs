//! Rule impact analysis.
//!
//! Measures which declarations of a rule visibly change the preview. The rule
//! is negated with one transient `!important` block, the surface recalculates
//! once, and each property's computed value is compared before and after. The
//! block is removed before returning, whatever happened in between.
//!
//! Properties that survive measurement are then checked against the
//! [`OverrideResolver`]: a later rule that wins the cascade downgrades them.

use std::collections::HashMap;

use crate::cascade::OverrideResolver;
use crate::css::model::{Declaration, RuleTree};
use crate::css::specificity::{base_selector, has_pseudo_class, has_pseudo_element};
use crate::state::WhatIf;
use crate::surface::{RenderSurface, SurfaceError};

/// Reason reported for a rule whose every declaration is overridden.
pub const REDUNDANT_REASON: &str = "All properties overridden by later rules";

/// Observation for one declaration on one element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyImpact {
    pub property: String,
    /// The declaration visibly applies and no later rule overrides it.
    pub effective: bool,
    /// Computed value before negation, or the declared value when nothing was
    /// measured.
    pub value: String,
    /// The rule that overrides this declaration. A rule can name itself when
    /// it repeats a property.
    pub overridden_by: Option<usize>,
}

/// One element matched by the measured rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AffectedNode {
    pub node_id: String,
    /// The measured selector.
    pub element: String,
    pub properties: Vec<PropertyImpact>,
}

/// Which elements a rule touches and which of its declarations take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleImpact {
    pub rule_index: usize,
    pub selector: String,
    pub affected_nodes: Vec<AffectedNode>,
}

impl RuleImpact {
    /// An impact with no affected nodes.
    pub fn empty(rule_index: usize, selector: impl Into<String>) -> Self {
        Self {
            rule_index,
            selector: selector.into(),
            affected_nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.affected_nodes.is_empty()
    }

    /// Every observation of `property` across all affected nodes.
    pub fn observations<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a PropertyImpact> {
        self.affected_nodes
            .iter()
            .flat_map(|node| node.properties.iter())
            .filter(move |p| p.property == property)
    }
}

/// Result of [`is_rule_redundant`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Redundancy {
    pub is_redundant: bool,
    pub reason: Option<String>,
}

/// A rule is redundant when it affects at least one node and no property on
/// any affected node is effective.
///
/// A rule that matches nothing in the preview is not redundant: that is a
/// limit of the preview, not a defect in the stylesheet.
pub fn is_rule_redundant(impact: &RuleImpact) -> Redundancy {
    let mut total = 0usize;
    let mut ineffective = 0usize;
    for property in impact.affected_nodes.iter().flat_map(|n| n.properties.iter()) {
        total += 1;
        if !property.effective {
            ineffective += 1;
        }
    }
    if total > 0 && ineffective == total {
        Redundancy {
            is_redundant: true,
            reason: Some(REDUNDANT_REASON.to_owned()),
        }
    } else {
        Redundancy::default()
    }
}

/// The transient block that resets every declared property of `selector`.
///
/// Each property appears once. On pseudo-element selectors `content` resets to
/// `none`, which removes the generated box.
pub fn negation_css(selector: &str, declarations: &[Declaration]) -> String {
    let pseudo_element = has_pseudo_element(selector);
    let mut seen: Vec<&str> = Vec::new();
    let mut body = Vec::new();
    for decl in declarations {
        if seen.contains(&decl.property.as_str()) {
            continue;
        }
        seen.push(&decl.property);
        let reset = if pseudo_element && decl.property == "content" {
            "none"
        } else {
            "initial"
        };
        body.push(format!("{}: {reset} !important", decl.property));
    }
    format!("{selector} {{ {}; }}", body.join("; "))
}

/// Measures rule impact against one rule tree and What-If snapshot.
#[derive(Debug)]
pub struct ImpactAnalyzer<'a> {
    resolver: OverrideResolver<'a>,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(tree: &'a RuleTree) -> Self {
        Self::from_resolver(OverrideResolver::new(tree))
    }

    pub fn with_what_if(tree: &'a RuleTree, what_if: &'a WhatIf) -> Self {
        Self::from_resolver(OverrideResolver::with_what_if(tree, what_if))
    }

    pub fn from_resolver(resolver: OverrideResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Measure the impact of the rule at `rule_index`.
    ///
    /// Never fails: a selector that cannot be queried or a surface error
    /// yields an impact with no affected nodes.
    pub fn measure<S: RenderSurface>(
        &self,
        rule_index: usize,
        selector: &str,
        declarations: &[Declaration],
        surface: &mut S,
    ) -> RuleImpact {
        if declarations.is_empty() || selector.trim().is_empty() {
            return RuleImpact::empty(rule_index, selector);
        }

        let elements = match query_elements(surface, selector) {
            Some(elements) if !elements.is_empty() => elements,
            _ => return RuleImpact::empty(rule_index, selector),
        };

        let pseudo_element = has_pseudo_element(selector);
        let observed = if pseudo_element || has_pseudo_class(selector) {
            // Nothing to observe in a static preview: the state or generated
            // box does not exist.
            assumed_observations(declarations, pseudo_element)
        } else {
            match measure_element(surface, elements[0], selector, declarations) {
                Ok(deltas) => measured_observations(declarations, &deltas),
                Err(err) => {
                    log::warn!(
                        target: "cascade_lens::impact",
                        "measuring rule {rule_index} `{selector}` failed: {err}"
                    );
                    return RuleImpact::empty(rule_index, selector);
                }
            }
        };

        let properties = self.resolve_overrides(rule_index, selector, declarations, observed);
        let affected_nodes = elements
            .into_iter()
            .map(|element| AffectedNode {
                node_id: surface.element_key(element),
                element: selector.to_owned(),
                properties: properties.clone(),
            })
            .collect();

        RuleImpact {
            rule_index,
            selector: selector.to_owned(),
            affected_nodes,
        }
    }

    fn resolve_overrides(
        &self,
        rule_index: usize,
        selector: &str,
        declarations: &[Declaration],
        observed: Vec<(bool, String)>,
    ) -> Vec<PropertyImpact> {
        declarations
            .iter()
            .zip(observed)
            .enumerate()
            .map(|(position, (decl, (visible, value)))| {
                let repeated_later = declarations[position + 1..]
                    .iter()
                    .any(|later| later.property == decl.property);
                let overridden_by = if repeated_later {
                    Some(rule_index)
                } else {
                    self.resolver
                        .find_overriding_rule(rule_index, selector, &decl.property)
                        .map(|o| o.rule_index)
                };
                PropertyImpact {
                    property: decl.property.clone(),
                    effective: visible && overridden_by.is_none(),
                    value,
                    overridden_by,
                }
            })
            .collect()
    }
}

/// Measure with a fresh resolver over `tree`.
pub fn measure_impact<S: RenderSurface>(
    rule_index: usize,
    selector: &str,
    declarations: &[Declaration],
    surface: &mut S,
    tree: &RuleTree,
) -> RuleImpact {
    ImpactAnalyzer::new(tree).measure(rule_index, selector, declarations, surface)
}

/// Elements matching the selector's base form, falling back to its first
/// class when the base form is not a valid query.
fn query_elements<S: RenderSurface>(surface: &S, selector: &str) -> Option<Vec<S::Element>> {
    let base = base_selector(selector);
    if base.is_empty() {
        return None;
    }
    match surface.query_all(base) {
        Ok(elements) => Some(elements),
        Err(err) => {
            let fallback = first_class(selector)?;
            log::debug!(
                target: "cascade_lens::impact",
                "query `{base}` failed ({err}), falling back to `{fallback}`"
            );
            match surface.query_all(&fallback) {
                Ok(elements) => Some(elements),
                Err(err) => {
                    log::warn!(target: "cascade_lens::impact", "fallback query failed: {err}");
                    None
                }
            }
        }
    }
}

fn first_class(selector: &str) -> Option<String> {
    let at = selector.find('.')?;
    let name: String = selector[at + 1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!name.is_empty()).then(|| format!(".{name}"))
}

/// Before and after values per property.
type Deltas = HashMap<String, (Option<String>, Option<String>)>;

/// Read every declared property, inject one negation block, recalculate once,
/// read again, and remove the block.
fn measure_element<S: RenderSurface>(
    surface: &mut S,
    element: S::Element,
    selector: &str,
    declarations: &[Declaration],
) -> Result<Deltas, SurfaceError> {
    let mut deltas: Deltas = HashMap::new();
    for decl in declarations {
        deltas
            .entry(decl.property.clone())
            .or_insert_with(|| (surface.computed_value(element, &decl.property), None));
    }

    let injection = surface.inject_overrides(&negation_css(selector, declarations))?;
    surface.force_recalc();
    for (property, (_, after)) in deltas.iter_mut() {
        *after = surface.computed_value(element, property);
    }
    surface.remove_overrides(injection)?;
    Ok(deltas)
}

fn measured_observations(declarations: &[Declaration], deltas: &Deltas) -> Vec<(bool, String)> {
    declarations
        .iter()
        .map(|decl| match deltas.get(&decl.property) {
            Some((Some(before), Some(after))) => (before != after, before.clone()),
            _ => (false, decl.value.clone()),
        })
        .collect()
}

fn assumed_observations(declarations: &[Declaration], pseudo_element: bool) -> Vec<(bool, String)> {
    declarations
        .iter()
        .map(|decl| {
            let content_reset = pseudo_element
                && decl.property == "content"
                && matches!(decl.value.trim(), "none" | "normal");
            (!content_reset, decl.value.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::model::RuleTreeBuilder;
    use crate::preview::PreviewCompiler;
    use crate::surface::{Dom, HeadlessSurface, InjectionId, NodeData};
    use crate::synthetic::generate;
    use pretty_assertions::assert_eq;

    fn decls(pairs: &[(&str, &str)]) -> Vec<Declaration> {
        pairs.iter().map(|(p, v)| Declaration::new(*p, *v)).collect()
    }

    fn preview_surface(tree: &RuleTree) -> HeadlessSurface {
        let css = PreviewCompiler::new(tree, &[], WhatIf::none())
            .with_baseline(false)
            .compile();
        HeadlessSurface::from_preview(&generate(tree, 25), &css).unwrap()
    }

    fn measure_rule(tree: &RuleTree, surface: &mut HeadlessSurface, index: usize) -> RuleImpact {
        let rule = tree.get(index).unwrap();
        let style = rule.as_style().unwrap();
        measure_impact(index, &style.selector, &style.declarations, surface, tree)
    }

    fn single(impact: &RuleImpact) -> &[PropertyImpact] {
        assert_eq!(impact.affected_nodes.len(), 1);
        &impact.affected_nodes[0].properties
    }

    // ── Measurement ──────────────────────────────────────────────────

    #[test]
    fn overridden_declaration_downgraded() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(".a", &[("color", "blue")])
            .build();
        let mut surface = preview_surface(&tree);

        let first = measure_rule(&tree, &mut surface, 0);
        assert_eq!(first.affected_nodes[0].node_id, "node--a");
        assert_eq!(first.affected_nodes[0].element, ".a");
        assert_eq!(
            single(&first),
            &[PropertyImpact {
                property: "color".into(),
                effective: false,
                value: "blue".into(),
                overridden_by: Some(1),
            }]
        );

        let second = measure_rule(&tree, &mut surface, 1);
        assert!(single(&second)[0].effective);
        assert_eq!(single(&second)[0].overridden_by, None);
    }

    #[test]
    fn value_equal_to_initial_is_not_effective() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("margin", "0"), ("color", "red")])
            .build();
        let mut surface = preview_surface(&tree);
        let impact = measure_rule(&tree, &mut surface, 0);
        let props = single(&impact);
        assert!(!props[0].effective);
        assert_eq!(props[0].overridden_by, None);
        assert!(props[1].effective);
    }

    #[test]
    fn one_injection_and_recalc_per_rule() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red"), ("padding", "4px"), ("opacity", "0.5")])
            .build();
        let mut surface = preview_surface(&tree);
        let el = surface.query_all(".a").unwrap()[0];
        let before = surface.computed_value(el, "padding");

        measure_rule(&tree, &mut surface, 0);

        assert_eq!(surface.recalc_count(), 1);
        assert_eq!(surface.active_injections(), 0);
        assert_eq!(surface.computed_value(el, "padding"), before);
    }

    #[test]
    fn repeated_property_overridden_by_own_rule() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red"), ("color", "blue")])
            .build();
        let mut surface = preview_surface(&tree);
        let impact = measure_rule(&tree, &mut surface, 0);
        let props = single(&impact);
        assert_eq!((props[0].effective, props[0].overridden_by), (false, Some(0)));
        assert_eq!((props[1].effective, props[1].overridden_by), (true, None));
    }

    #[test]
    fn every_matching_element_reported() {
        let mut dom = Dom::new();
        let root = dom.insert(NodeData::new("div"));
        dom.insert_child(root, NodeData::new("p").with_id("one").with_class("a"));
        dom.insert_child(root, NodeData::new("p").with_id("two").with_class("a"));
        let mut surface = HeadlessSurface::new(dom);
        surface.load_css(".a { color: red; }").unwrap();
        let tree = RuleTreeBuilder::new().rule(".a", &[("color", "red")]).build();

        let impact = measure_rule(&tree, &mut surface, 0);
        let ids: Vec<_> = impact.affected_nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, ["one", "two"]);
        assert_eq!(surface.recalc_count(), 1);
    }

    // ── Pseudo selectors ─────────────────────────────────────────────

    #[test]
    fn pseudo_class_assumed_effective_without_injection() {
        let tree = RuleTreeBuilder::new()
            .rule(".btn", &[("color", "red")])
            .rule(".btn:hover", &[("color", "blue"), ("opacity", "0.8")])
            .rule(".btn:hover", &[("opacity", "1")])
            .build();
        let mut surface = preview_surface(&tree);
        let impact = measure_rule(&tree, &mut surface, 1);
        let props = single(&impact);
        assert!(props[0].effective);
        assert_eq!(props[0].value, "blue");
        assert_eq!((props[1].effective, props[1].overridden_by), (false, Some(2)));
        assert_eq!(surface.recalc_count(), 0);
    }

    #[test]
    fn pseudo_element_content_reset_not_effective() {
        let tree = RuleTreeBuilder::new()
            .rule(".tag", &[("color", "red")])
            .rule(".tag::before", &[("content", "none"), ("color", "green")])
            .build();
        let mut surface = preview_surface(&tree);
        let impact = measure_rule(&tree, &mut surface, 1);
        let props = single(&impact);
        assert!(!props[0].effective);
        assert!(props[1].effective);
        assert_eq!(surface.active_injections(), 0);
    }

    // ── Degraded results ─────────────────────────────────────────────

    #[test]
    fn unmatched_or_empty_selector_gives_empty_impact() {
        let tree = RuleTreeBuilder::new()
            .rule(".a", &[("color", "red")])
            .rule(":root", &[("--x", "1")])
            .build();
        let mut surface = preview_surface(&tree);
        let missing = measure_impact(0, ".nowhere", &decls(&[("color", "red")]), &mut surface, &tree);
        assert!(missing.is_empty());
        assert!(measure_rule(&tree, &mut surface, 1).is_empty());
        assert!(measure_impact(0, ".a", &[], &mut surface, &tree).is_empty());
    }

    #[test]
    fn invalid_selector_falls_back_to_first_class() {
        let tree = RuleTreeBuilder::new().rule(".card", &[("color", "red")]).build();
        let mut surface = preview_surface(&tree);
        let impact = measure_impact(0, ".card[", &decls(&[("color", "red")]), &mut surface, &tree);
        assert_eq!(impact.affected_nodes.len(), 1);
        assert_eq!(first_class("div > .x-y_z:hover"), Some(".x-y_z".to_owned()));
        assert_eq!(first_class("div["), None);
    }

    /// Matches one element but refuses every injection.
    struct RefusingSurface;

    impl RenderSurface for RefusingSurface {
        type Element = u8;

        fn query_all(&self, _: &str) -> Result<Vec<u8>, SurfaceError> {
            Ok(vec![0])
        }
        fn element_key(&self, _: u8) -> String {
            "el".into()
        }
        fn computed_value(&self, _: u8, _: &str) -> Option<String> {
            Some("x".into())
        }
        fn inject_overrides(&mut self, _: &str) -> Result<InjectionId, SurfaceError> {
            Err(SurfaceError::Injection("read-only".into()))
        }
        fn remove_overrides(&mut self, id: InjectionId) -> Result<(), SurfaceError> {
            Err(SurfaceError::UnknownInjection(id))
        }
        fn force_recalc(&mut self) {}
    }

    #[test]
    fn surface_failure_degrades_to_empty() {
        let tree = RuleTreeBuilder::new().rule(".a", &[("color", "red")]).build();
        let impact = measure_impact(0, ".a", &decls(&[("color", "red")]), &mut RefusingSurface, &tree);
        assert_eq!(impact, RuleImpact::empty(0, ".a"));
        assert_eq!(is_rule_redundant(&impact), Redundancy::default());
    }

    // ── Redundancy ───────────────────────────────────────────────────

    fn impact_with(effective: &[bool]) -> RuleImpact {
        RuleImpact {
            rule_index: 0,
            selector: ".a".into(),
            affected_nodes: vec![AffectedNode {
                node_id: "n".into(),
                element: ".a".into(),
                properties: effective
                    .iter()
                    .map(|&effective| PropertyImpact {
                        property: "color".into(),
                        effective,
                        value: "red".into(),
                        overridden_by: None,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn redundancy_rules() {
        assert_eq!(
            is_rule_redundant(&impact_with(&[false, false])),
            Redundancy {
                is_redundant: true,
                reason: Some(REDUNDANT_REASON.into()),
            }
        );
        assert!(!is_rule_redundant(&impact_with(&[false, true])).is_redundant);
        assert!(!is_rule_redundant(&impact_with(&[])).is_redundant);
        assert!(!is_rule_redundant(&RuleImpact::empty(0, ".a")).is_redundant);
    }

    #[test]
    fn negation_block_format() {
        let d = decls(&[("color", "red"), ("content", "'x'"), ("color", "blue")]);
        insta::assert_snapshot!(
            negation_css(".a", &d),
            @".a { color: initial !important; content: initial !important; }"
        );
        insta::assert_snapshot!(
            negation_css(".a::after", &d),
            @".a::after { color: initial !important; content: none !important; }"
        );
    }
}
