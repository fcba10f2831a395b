//! Synthetic preview elements.
//!
//! Every distinct base selector in the rule tree gets exactly one synthetic
//! element. Pseudo-class and pseudo-element variants of the selector do not
//! create elements of their own; they become named state layers on the
//! element of their base selector.
//!
//! ```text
//! .btn            -> <button class="btn">, state "base"
//! .btn:hover      -> same element, state "hover"
//! .card::before   -> <div class="card">, state "before"
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::config::InspectorConfig;
use crate::css::model::{CssRule, Declaration, RuleTree, SourceLocation};
use crate::css::selector::{AttributeMatch, Selector};
use crate::css::specificity::split_base_and_state;

/// State name used for rules without a pseudo part.
pub const BASE_STATE: &str = "base";

/// One state layer of a synthetic element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateEntry {
    /// The latest rule occurrence contributing this state.
    pub rule_index: usize,
    /// Property names declared by that rule, in source order.
    pub declared_properties: Vec<String>,
    pub location: SourceLocation,
}

/// A preview element standing in for one base selector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyntheticElement {
    /// Stable id: `node-` followed by the base selector with every
    /// non-alphanumeric character replaced by `-`.
    pub id: String,
    pub tag: String,
    pub base_selector: String,
    /// Space-separated classes of the selector's subject.
    pub class_name: String,
    /// The `id` attribute: the selector's own `#id` if it has one.
    pub dom_id: String,
    /// Extra attributes required by attribute selectors on the subject.
    pub attributes: Vec<(String, String)>,
    /// State layers keyed by state name (`base`, `hover`, ...).
    pub states: BTreeMap<String, StateEntry>,
    /// Location of the rule that created the element.
    pub location: SourceLocation,
}

impl SyntheticElement {
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name.split_whitespace()
    }

    /// Returns `true` for elements that receive forced pseudo-state classes.
    pub fn is_interactive(&self) -> bool {
        matches!(self.tag.as_str(), "button" | "a" | "input")
    }
}

/// The generated preview: elements plus their markup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyntheticDom {
    pub elements: Vec<SyntheticElement>,
    pub markup: String,
    pub element_count: usize,
    /// Base selectors seen after the element cap was reached.
    pub overflow: Vec<String>,
}

impl SyntheticDom {
    pub fn element_for(&self, base_selector: &str) -> Option<&SyntheticElement> {
        self.elements
            .iter()
            .find(|e| e.base_selector == base_selector)
    }

    pub fn element_by_id(&self, id: &str) -> Option<&SyntheticElement> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// Generate the synthetic preview with default markup options.
pub fn generate(tree: &RuleTree, max_elements: usize) -> SyntheticDom {
    generate_with(tree, &InspectorConfig::new().with_max_elements(max_elements))
}

/// Generate the synthetic preview.
pub fn generate_with(tree: &RuleTree, config: &InspectorConfig) -> SyntheticDom {
    let mut elements: Vec<SyntheticElement> = Vec::new();
    let mut by_base: HashMap<String, usize> = HashMap::new();
    let mut overflow: Vec<String> = Vec::new();

    for (rule, style) in tree.style_rules() {
        let (base, state) = split_base_and_state(&style.selector);
        if base.is_empty() {
            log::debug!(
                target: "cascade_lens::synthetic",
                "no element for `{}`: empty base selector",
                style.selector
            );
            continue;
        }

        let slot = match by_base.get(base) {
            Some(&slot) => slot,
            None if elements.len() >= config.max_elements => {
                if !overflow.iter().any(|b| b == base) {
                    log::debug!(
                        target: "cascade_lens::synthetic",
                        "element cap {} reached, not rendering `{base}`",
                        config.max_elements
                    );
                    overflow.push(base.to_owned());
                }
                continue;
            }
            None => {
                let element = new_element(base, rule, &elements);
                by_base.insert(base.to_owned(), elements.len());
                elements.push(element);
                elements.len() - 1
            }
        };

        let declared_properties = style
            .property_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        elements[slot].states.insert(
            state.unwrap_or(BASE_STATE).to_owned(),
            StateEntry {
                rule_index: rule.rule_index,
                declared_properties,
                location: rule.location,
            },
        );
    }

    let markup = render_markup(&elements, config.placeholder_text);
    SyntheticDom {
        element_count: elements.len(),
        elements,
        markup,
        overflow,
    }
}

fn new_element(base: &str, rule: &CssRule, existing: &[SyntheticElement]) -> SyntheticElement {
    let id = unique_id(base, existing);
    let parsed = Selector::parse(base).ok();
    let subject = parsed.as_ref().and_then(Selector::subject);

    let class_name = subject
        .map(|s| s.classes().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let dom_id = subject
        .and_then(|s| s.id())
        .map_or_else(|| format!("element-{id}"), str::to_owned);
    let attributes = subject
        .map(|s| {
            s.attributes()
                .filter(|(name, _)| !matches!(*name, "class" | "id"))
                .map(|(name, matcher)| (name.to_owned(), attribute_value(matcher)))
                .collect()
        })
        .unwrap_or_default();

    SyntheticElement {
        tag: infer_tag(base).to_owned(),
        id,
        base_selector: base.to_owned(),
        class_name,
        dom_id,
        attributes,
        states: BTreeMap::new(),
        location: rule.location,
    }
}

fn attribute_value(matcher: &AttributeMatch) -> String {
    matcher.value().unwrap_or_default().to_owned()
}

fn unique_id(base: &str, existing: &[SyntheticElement]) -> String {
    let slug: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let id = format!("node-{slug}");
    if !existing.iter().any(|e| e.id == id) {
        return id;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{id}-{n}");
        if !existing.iter().any(|e| e.id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

// ── Tag inference ────────────────────────────────────────────────────

/// Explicit base selector to tag table, consulted first.
const SELECTOR_TAGS: &[(&str, &str)] = &[
    // containers
    ("body", "div"),
    (".body", "div"),
    (".container", "div"),
    (".wrapper", "div"),
    (".main", "main"),
    (".content", "div"),
    (".section", "section"),
    // navigation
    (".navbar", "nav"),
    (".nav", "nav"),
    (".header", "header"),
    (".footer", "footer"),
    // semantic
    (".card", "div"),
    (".list", "ul"),
    (".list-item", "li"),
    (".paragraph", "p"),
    (".button", "button"),
    (".btn", "button"),
    (".link", "a"),
    (".heading", "div"),
    (".title", "h1"),
    (".subtitle", "h2"),
    // interactive
    (".input", "input"),
    (".form", "form"),
    (".select", "select"),
    (".textarea", "textarea"),
    // typography
    (".text", "span"),
    (".label", "label"),
    (".code", "code"),
];

/// Class-name substrings hinting at a tag, in priority order.
const CLASS_HINTS: &[(&str, &str)] = &[
    ("btn", "button"),
    ("button", "button"),
    ("link", "a"),
    ("header", "header"),
    ("footer", "footer"),
    ("nav", "nav"),
    ("form", "form"),
    ("input", "input"),
    ("card", "div"),
];

/// Element names a literal type selector may produce.
const HTML_TAGS: &[&str] = &[
    "a", "abbr", "article", "aside", "b", "blockquote", "button", "code", "dd", "details",
    "dialog", "div", "dl", "dt", "em", "fieldset", "figcaption", "figure", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "img", "input", "label", "legend", "li",
    "main", "mark", "nav", "ol", "option", "p", "pre", "section", "select", "small", "span",
    "strong", "sub", "summary", "sup", "table", "tbody", "td", "textarea", "tfoot", "th", "thead",
    "tr", "u", "ul",
];

const VOID_TAGS: &[&str] = &["input", "img", "hr"];

/// Infer the preview tag for a base selector.
///
/// Priority: explicit table, then a literal HTML type selector on the subject,
/// then class-name hints (each class checked against the table before the
/// substring hints), else `div`.
pub fn infer_tag(base_selector: &str) -> &'static str {
    let base = base_selector.trim();
    if let Some(&(_, tag)) = SELECTOR_TAGS.iter().find(|(sel, _)| *sel == base) {
        return tag;
    }

    let parsed = Selector::parse(base).ok();
    if let Some(tag) = parsed
        .as_ref()
        .and_then(Selector::subject)
        .and_then(|s| s.tag())
        .and_then(|t| HTML_TAGS.iter().copied().find(|h| h.eq_ignore_ascii_case(t)))
    {
        return tag;
    }

    for class in class_names(base) {
        let dotted = format!(".{class}");
        if let Some(&(_, tag)) = SELECTOR_TAGS.iter().find(|(sel, _)| *sel == dotted) {
            return tag;
        }
        if let Some(&(_, tag)) = CLASS_HINTS.iter().find(|(hint, _)| class.contains(hint)) {
            return tag;
        }
    }
    "div"
}

/// `.name` runs anywhere in the selector text.
fn class_names(selector: &str) -> impl Iterator<Item = &str> {
    selector.split('.').skip(1).filter_map(|rest| {
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })
}

// ── Markup ───────────────────────────────────────────────────────────

/// The class toggled on elements to force a pseudo-state.
pub fn pseudo_state_class(state: &str) -> String {
    format!("pseudo-{}", state.trim_start_matches(':'))
}

fn render_markup(elements: &[SyntheticElement], placeholders: bool) -> String {
    let mut html = String::from("<div class=\"preview-root\" style=\"padding: 20px;\">\n");
    for element in elements {
        html.push_str("  ");
        html.push_str(&element_markup(element, placeholders));
        html.push('\n');
    }
    html.push_str("</div>");
    html
}

/// Markup for one element on a single line.
pub fn element_markup(element: &SyntheticElement, placeholder: bool) -> String {
    let tag = element.tag.as_str();
    let base = escape_html(&element.base_selector);

    let mut open = format!("<{tag}");
    if !element.class_name.is_empty() {
        open.push_str(&format!(" class=\"{}\"", escape_html(&element.class_name)));
    }
    open.push_str(&format!(" id=\"{}\"", escape_html(&element.dom_id)));
    for (name, value) in &element.attributes {
        open.push_str(&format!(" {}=\"{}\"", escape_html(name), escape_html(value)));
    }
    if tag == "a" {
        open.push_str(" href=\"#\"");
    }
    if tag == "input" && placeholder {
        open.push_str(&format!(" placeholder=\"{base}\""));
    }
    open.push_str(&format!(
        " data-synthetic-node=\"{}\" data-base-selector=\"{base}\">",
        escape_html(&element.id)
    ));

    if VOID_TAGS.contains(&tag) {
        return open;
    }

    let content = if !placeholder {
        String::new()
    } else {
        match tag {
            "div" | "section" | "article" | "header" | "footer" | "main" | "nav" | "aside"
            | "form" => format!("<span style=\"color: #999; font-size: 12px;\">{base}</span>"),
            "a" => "Link".to_owned(),
            "select" => format!("<option>{base}</option>"),
            "ul" | "ol" => format!("<li>{base}</li>"),
            _ => base,
        }
    };
    format!("{open}{content}</{tag}>")
}

/// Escape text for use in HTML content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

// ── Element inspector ────────────────────────────────────────────────

/// How a rule relates to the inspected selector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AffectingKind {
    /// Same selector, outside any conditional at-rule.
    Base,
    /// `selector:state` or `selector::element`.
    Pseudo { state: String },
    /// Same selector inside a conditional at-rule.
    Media { query: String },
}

/// A rule listed by the element inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AffectingRule {
    pub rule_index: usize,
    pub selector: String,
    pub specificity: u32,
    pub declarations: Vec<Declaration>,
    pub kind: AffectingKind,
    pub location: SourceLocation,
}

/// Every rule that styles `selector` or one of its pseudo variants, in cascade
/// order: specificity descending, then document order.
pub fn affecting_rules(selector: &str, tree: &RuleTree) -> Vec<AffectingRule> {
    let selector = selector.trim();
    let mut found: Vec<AffectingRule> = tree
        .walk()
        .filter(|visit| !visit.in_keyframes())
        .filter_map(|visit| {
            let style = visit.rule.as_style()?;
            let kind = if style.selector == selector {
                match visit.parent_at_rule() {
                    Some(at) => AffectingKind::Media {
                        query: at.params.clone(),
                    },
                    None => AffectingKind::Base,
                }
            } else {
                let rest = style.selector.strip_prefix(selector)?;
                if !rest.starts_with(':') {
                    return None;
                }
                let state = rest.trim_start_matches(':');
                let end = state
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
                    .unwrap_or(state.len());
                if end == 0 {
                    return None;
                }
                AffectingKind::Pseudo {
                    state: state[..end].to_owned(),
                }
            };
            Some(AffectingRule {
                rule_index: visit.rule.rule_index,
                selector: style.selector.clone(),
                specificity: style.specificity,
                declarations: style.declarations.clone(),
                kind,
                location: visit.rule.location,
            })
        })
        .collect();
    found.sort_by(|a, b| {
        b.specificity
            .cmp(&a.specificity)
            .then(a.rule_index.cmp(&b.rule_index))
    });
    found
}

/// One `@keyframes` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyframeFrame {
    pub rule_index: usize,
    /// `from`, `to`, `50%`, `0%, 100%`.
    pub selector: String,
    pub declarations: Vec<Declaration>,
    pub location: SourceLocation,
}

/// One `@keyframes` occurrence. Repeated names give separate entries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyframesBlock {
    pub name: String,
    pub rule_index: usize,
    pub location: SourceLocation,
    pub frames: Vec<KeyframeFrame>,
}

/// Every `@keyframes` block at any depth, in document order.
pub fn keyframes(tree: &RuleTree) -> Vec<KeyframesBlock> {
    tree.walk()
        .filter_map(|visit| {
            let at = visit.rule.as_at_rule().filter(|at| at.is_keyframes())?;
            let frames = at
                .children
                .iter()
                .filter_map(|child| {
                    child.as_style().map(|style| KeyframeFrame {
                        rule_index: child.rule_index,
                        selector: style.selector.clone(),
                        declarations: style.declarations.clone(),
                        location: child.location,
                    })
                })
                .collect();
            Some(KeyframesBlock {
                name: at.params.clone(),
                rule_index: visit.rule.rule_index,
                location: visit.rule.location,
                frames,
            })
        })
        .collect()
}
