//! In-process render surface.
//!
//! Applies CSS to a [`Dom`] with a simplified cascade:
//!
//! - `!important` declarations beat normal ones, then higher specificity,
//!   then later source order;
//! - dynamic pseudo-classes never match, forced `.pseudo-*` classes do;
//! - pseudo-element rules never match an element;
//! - conditional at-rule children (`@media`, `@supports`) always apply;
//! - inherited properties fall back to the parent, others to a small table of
//!   initial values.
//!
//! Computed values are derived from the current rules on every read, so
//! [`force_recalc`](RenderSurface::force_recalc) only counts calls.

use crate::css::model::split_important;
use crate::css::parser::parse_stylesheet;
use crate::css::selector::{split_selector_list, Selector};
use crate::css::specificity::Specificity;
use crate::synthetic::{pseudo_state_class, SyntheticDom};

use super::dom::{Dom, NodeData, NodeId};
use super::{InjectionId, RenderSurface, SurfaceError};

/// Properties that inherit from the parent when no rule sets them.
const INHERITED: &[&str] = &[
    "color",
    "cursor",
    "direction",
    "font",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "line-height",
    "list-style",
    "text-align",
    "text-indent",
    "text-transform",
    "visibility",
    "white-space",
    "word-spacing",
];

/// Initial values for common properties.
const INITIAL_VALUES: &[(&str, &str)] = &[
    ("background-color", "rgba(0, 0, 0, 0)"),
    ("color", "canvastext"),
    ("content", "normal"),
    ("display", "inline"),
    ("font-size", "16px"),
    ("font-weight", "400"),
    ("height", "auto"),
    ("margin", "0px"),
    ("margin-bottom", "0px"),
    ("margin-left", "0px"),
    ("margin-right", "0px"),
    ("margin-top", "0px"),
    ("opacity", "1"),
    ("padding", "0px"),
    ("padding-bottom", "0px"),
    ("padding-left", "0px"),
    ("padding-right", "0px"),
    ("padding-top", "0px"),
    ("position", "static"),
    ("visibility", "visible"),
    ("width", "auto"),
];

/// Initial value of a property; `initial` for properties outside the table.
pub fn initial_value(property: &str) -> &'static str {
    INITIAL_VALUES
        .iter()
        .find(|(name, _)| *name == property)
        .map_or("initial", |&(_, value)| value)
}

fn is_inherited(property: &str) -> bool {
    INHERITED.contains(&property)
}

fn is_length(property: &str) -> bool {
    property.starts_with("margin")
        || property.starts_with("padding")
        || matches!(
            property,
            "top" | "right" | "bottom" | "left" | "gap" | "border-width" | "border-radius"
        )
}

#[derive(Debug, Clone)]
struct LoadedDeclaration {
    property: String,
    value: String,
    important: bool,
}

#[derive(Debug, Clone)]
struct LoadedRule {
    selector: Selector,
    specificity: u32,
    order: usize,
    declarations: Vec<LoadedDeclaration>,
}

/// Cascade key: importance, specificity, rule order, declaration position.
type CascadeKey = (bool, u32, usize, usize);

/// A headless [`RenderSurface`] over a slotmap [`Dom`].
#[derive(Debug)]
pub struct HeadlessSurface {
    dom: Dom,
    rules: Vec<LoadedRule>,
    injections: Vec<(InjectionId, Vec<LoadedRule>)>,
    next_injection: u64,
    next_order: usize,
    recalc_count: usize,
}

impl HeadlessSurface {
    /// A surface over `dom` with no styles loaded.
    pub fn new(dom: Dom) -> Self {
        Self {
            dom,
            rules: Vec::new(),
            injections: Vec::new(),
            next_injection: 0,
            next_order: 0,
            recalc_count: 0,
        }
    }

    /// Build the synthetic elements under a `.preview-root` container and load
    /// the compiled preview CSS.
    pub fn from_preview(preview: &SyntheticDom, css: &str) -> Result<Self, SurfaceError> {
        let mut dom = Dom::new();
        let root = dom.insert(NodeData::new("div").with_class("preview-root"));
        for element in &preview.elements {
            let mut data = NodeData::new(&element.tag)
                .with_id(&element.dom_id)
                .with_classes(element.classes())
                .with_attribute("data-synthetic-node", &element.id)
                .with_attribute("data-base-selector", &element.base_selector);
            for (name, value) in &element.attributes {
                data = data.with_attribute(name, value);
            }
            if element.tag != "input" {
                data = data.with_text(&element.base_selector);
            }
            dom.insert_child(root, data);
        }

        let mut surface = Self::new(dom);
        surface.load_css(css)?;
        log::debug!(
            target: "cascade_lens::surface",
            "headless surface: {} elements, {} rules",
            preview.elements.len(),
            surface.rules.len()
        );
        Ok(surface)
    }

    /// Append a stylesheet after the ones already loaded.
    pub fn load_css(&mut self, css: &str) -> Result<(), SurfaceError> {
        let rules = self.compile_rules(css)?;
        self.rules.extend(rules);
        Ok(())
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    /// Toggle the forced class for `state` on every interactive element
    /// (`button`, `a`, `input`). Returns how many elements changed.
    pub fn set_forced_state(&mut self, state: &str, on: bool) -> usize {
        let class = pseudo_state_class(state);
        let mut changed = 0;
        for id in self.dom.document_order() {
            let Some(node) = self.dom.get_mut(id) else {
                continue;
            };
            if !matches!(node.tag.as_str(), "button" | "a" | "input") {
                continue;
            }
            let toggled = if on {
                let had = node.has_class(&class);
                node.add_class(class.as_str());
                !had
            } else {
                node.remove_class(&class)
            };
            if toggled {
                changed += 1;
            }
        }
        changed
    }

    /// Number of forced recalculations so far.
    pub fn recalc_count(&self) -> usize {
        self.recalc_count
    }

    /// Number of injected blocks still present.
    pub fn active_injections(&self) -> usize {
        self.injections.len()
    }

    /// The element whose [`element_key`](RenderSurface::element_key) is `key`.
    pub fn element_by_key(&self, key: &str) -> Option<NodeId> {
        self.dom
            .document_order()
            .into_iter()
            .find(|&id| self.element_key(id) == key)
    }

    fn compile_rules(&mut self, css: &str) -> Result<Vec<LoadedRule>, SurfaceError> {
        let parsed = parse_stylesheet(css).map_err(|e| SurfaceError::Injection(e.to_string()))?;
        let mut rules = Vec::new();
        for (_, style) in parsed.tree.style_rules() {
            let selector = match Selector::parse(&style.selector) {
                Ok(selector) => selector,
                Err(err) => {
                    log::debug!(
                        target: "cascade_lens::surface",
                        "ignoring rule `{}`: {err}",
                        style.selector
                    );
                    continue;
                }
            };
            let declarations = style
                .declarations
                .iter()
                .map(|decl| LoadedDeclaration {
                    property: decl.property.clone(),
                    value: split_important(&decl.value).0.to_owned(),
                    important: decl.is_important(),
                })
                .collect();
            rules.push(LoadedRule {
                specificity: Specificity::from_selector(&selector).value(),
                selector,
                order: self.next_order,
                declarations,
            });
            self.next_order += 1;
        }
        Ok(rules)
    }

    fn all_rules(&self) -> impl Iterator<Item = &LoadedRule> {
        self.rules
            .iter()
            .chain(self.injections.iter().flat_map(|(_, rules)| rules.iter()))
    }

    /// The winning declared value for `property` on `id`, if any rule sets it.
    fn cascaded_value(&self, id: NodeId, property: &str) -> Option<&str> {
        let mut best: Option<(CascadeKey, &str)> = None;
        for rule in self.all_rules() {
            let setting = rule
                .declarations
                .iter()
                .enumerate()
                .filter(|(_, d)| d.property == property);
            let mut matched = None;
            for (position, decl) in setting {
                let matches = *matched.get_or_insert_with(|| self.dom.matches(&rule.selector, id));
                if !matches {
                    break;
                }
                let key = (decl.important, rule.specificity, rule.order, position);
                if best.as_ref().map_or(true, |(k, _)| key > *k) {
                    best = Some((key, decl.value.as_str()));
                }
            }
        }
        best.map(|(_, value)| value)
    }

    fn compute(&self, id: NodeId, property: &str) -> String {
        let from_parent = || {
            self.dom
                .parent(id)
                .map_or_else(|| initial_value(property).to_owned(), |p| self.compute(p, property))
        };
        match self.cascaded_value(id, property) {
            Some("initial") => initial_value(property).to_owned(),
            Some("inherit") => from_parent(),
            Some("unset") if is_inherited(property) => from_parent(),
            Some("unset") => initial_value(property).to_owned(),
            Some(value) if is_length(property) && value == "0" => "0px".to_owned(),
            Some(value) => value.to_owned(),
            None if is_inherited(property) => from_parent(),
            None => initial_value(property).to_owned(),
        }
    }
}

impl RenderSurface for HeadlessSurface {
    type Element = NodeId;

    fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, SurfaceError> {
        let invalid = |reason: String| SurfaceError::InvalidSelector {
            selector: selector.to_owned(),
            reason,
        };
        let parts = split_selector_list(selector);
        if parts.is_empty() {
            return Err(invalid("empty selector".to_owned()));
        }
        let selectors = parts
            .iter()
            .map(|part| Selector::parse(part).map_err(|e| invalid(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self
            .dom
            .document_order()
            .into_iter()
            .filter(|&id| selectors.iter().any(|s| self.dom.matches(s, id)))
            .collect())
    }

    fn element_key(&self, element: NodeId) -> String {
        let Some(node) = self.dom.get(element) else {
            return String::new();
        };
        node.attribute("data-synthetic-node")
            .or_else(|| node.id.clone())
            .unwrap_or_else(|| format!("node-{}", node.classes.join(" ")))
    }

    fn computed_value(&self, element: NodeId, property: &str) -> Option<String> {
        self.dom.get(element)?;
        Some(self.compute(element, &property.to_ascii_lowercase()))
    }

    fn inject_overrides(&mut self, css: &str) -> Result<InjectionId, SurfaceError> {
        let rules = self.compile_rules(css)?;
        let id = InjectionId(self.next_injection);
        self.next_injection += 1;
        self.injections.push((id, rules));
        Ok(id)
    }

    fn remove_overrides(&mut self, id: InjectionId) -> Result<(), SurfaceError> {
        let at = self
            .injections
            .iter()
            .position(|(live, _)| *live == id)
            .ok_or(SurfaceError::UnknownInjection(id))?;
        self.injections.remove(at);
        Ok(())
    }

    fn force_recalc(&mut self) {
        self.recalc_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::model::RuleTreeBuilder;
    use crate::synthetic::generate;
    use pretty_assertions::assert_eq;

    fn surface_with(css: &str) -> (HeadlessSurface, NodeId, NodeId) {
        let mut dom = Dom::new();
        let root = dom.insert(NodeData::new("div").with_class("preview-root"));
        let el = dom
            .insert_child(
                root,
                NodeData::new("button").with_id("x").with_classes(["a", "btn"]),
            )
            .unwrap();
        let mut surface = HeadlessSurface::new(dom);
        surface.load_css(css).unwrap();
        (surface, root, el)
    }

    fn value(surface: &HeadlessSurface, el: NodeId, property: &str) -> String {
        surface.computed_value(el, property).unwrap()
    }

    // ── Cascade ──────────────────────────────────────────────────────

    #[test]
    fn later_rule_wins_at_equal_specificity() {
        let (surface, _, el) = surface_with(".a { color: red; } .a { color: blue; }");
        assert_eq!(value(&surface, el, "color"), "blue");
    }

    #[test]
    fn specificity_beats_order() {
        let (surface, _, el) = surface_with("#x { color: red; } .a { color: blue; }");
        assert_eq!(value(&surface, el, "color"), "red");
    }

    #[test]
    fn important_beats_specificity() {
        let (surface, _, el) = surface_with("#x { color: red; } .a { color: blue !important; }");
        assert_eq!(value(&surface, el, "color"), "blue");
    }

    #[test]
    fn last_declaration_in_rule_wins() {
        let (surface, _, el) = surface_with(".a { color: red; color: green; }");
        assert_eq!(value(&surface, el, "color"), "green");
    }

    #[test]
    fn inheritance_and_initial_values() {
        let (surface, root, el) = surface_with(".preview-root { color: navy; margin: 4px; }");
        assert_eq!(value(&surface, el, "color"), "navy");
        assert_eq!(value(&surface, el, "margin"), "0px");
        assert_eq!(value(&surface, root, "margin"), "4px");
        assert_eq!(value(&surface, el, "display"), "inline");
        assert_eq!(value(&surface, el, "grid-area"), "initial");
    }

    #[test]
    fn keywords_and_zero_lengths() {
        let (surface, _, el) = surface_with(
            ".preview-root { color: navy; } .a { color: initial; padding: 0; } .btn { font-size: inherit; }",
        );
        assert_eq!(value(&surface, el, "color"), "canvastext");
        assert_eq!(value(&surface, el, "padding"), "0px");
        assert_eq!(value(&surface, el, "font-size"), "16px");
    }

    #[test]
    fn media_children_apply_and_pseudo_rules_do_not() {
        let (surface, _, el) = surface_with(
            "@media (max-width: 1px) { .a { color: red; } } .a:hover { color: blue; } .a::before { color: green; }",
        );
        assert_eq!(value(&surface, el, "color"), "red");
    }

    #[test]
    fn forced_state_class_matches() {
        let (mut surface, _, el) =
            surface_with(".a { color: red; } .a:hover { color: blue; } .a.pseudo-hover { color: blue; }");
        assert_eq!(surface.set_forced_state("hover", true), 1);
        assert_eq!(value(&surface, el, "color"), "blue");
        assert_eq!(surface.set_forced_state("hover", true), 0);
        assert_eq!(surface.set_forced_state("hover", false), 1);
        assert_eq!(value(&surface, el, "color"), "red");
    }

    // ── Injection ────────────────────────────────────────────────────

    #[test]
    fn injection_applies_until_removed() {
        let (mut surface, _, el) = surface_with("#x { color: red; }");
        let id = surface
            .inject_overrides(".a { color: initial !important; }")
            .unwrap();
        surface.force_recalc();
        assert_eq!(value(&surface, el, "color"), "canvastext");
        assert_eq!(surface.active_injections(), 1);

        surface.remove_overrides(id).unwrap();
        assert_eq!(value(&surface, el, "color"), "red");
        assert_eq!(surface.active_injections(), 0);
        assert_eq!(surface.recalc_count(), 1);
        assert_eq!(
            surface.remove_overrides(id),
            Err(SurfaceError::UnknownInjection(id))
        );
    }

    #[test]
    fn unparseable_injection_rejected() {
        let (mut surface, _, _) = surface_with("");
        assert!(matches!(
            surface.inject_overrides(".a { color: red;"),
            Err(SurfaceError::Injection(_))
        ));
        assert_eq!(surface.active_injections(), 0);
    }

    // ── Queries ──────────────────────────────────────────────────────

    #[test]
    fn query_errors_and_lists() {
        let (surface, root, el) = surface_with("");
        assert_eq!(surface.query_all(".btn").unwrap(), vec![el]);
        assert_eq!(surface.query_all(".preview-root, .a").unwrap(), vec![root, el]);
        assert!(matches!(
            surface.query_all("..bad"),
            Err(SurfaceError::InvalidSelector { .. })
        ));
        assert!(surface.query_all("   ").is_err());
    }

    #[test]
    fn from_preview_builds_synthetic_elements() {
        let tree = RuleTreeBuilder::new()
            .rule(".btn", &[("color", "red")])
            .rule(".btn:hover", &[("color", "blue")])
            .rule("#hero", &[("margin", "0")])
            .build();
        let preview = generate(&tree, 25);
        let surface = HeadlessSurface::from_preview(&preview, ".btn { color: red; }").unwrap();

        assert_eq!(surface.dom().len(), 3);
        let btn = surface.query_all(".btn").unwrap();
        assert_eq!(btn.len(), 1);
        assert_eq!(surface.element_key(btn[0]), "node--btn");
        assert_eq!(surface.element_by_key("node--btn"), Some(btn[0]));
        assert_eq!(surface.query_all("#hero").unwrap().len(), 1);
        assert_eq!(value(&surface, btn[0], "color"), "red");
    }
}
