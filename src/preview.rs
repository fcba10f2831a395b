//! Preview CSS compiler.
//!
//! Turns the rule tree plus a What-If snapshot into the CSS text injected into
//! the preview document. Compared to the source stylesheet the output:
//!
//! - leaves out disabled declarations,
//! - substitutes staged property values when the cascade lets them show,
//! - resolves `var()` references it can,
//! - repeats every pseudo-class rule under a `.pseudo-*` class selector so a
//!   forced-state toggle can simulate `:hover`, `:focus` and friends,
//! - starts with fixed baseline styles.
//!
//! Output is a pure function of the inputs: the same tree and snapshot always
//! give byte-identical text.

use std::fmt::Write as _;

use crate::cascade::OverrideResolver;
use crate::css::model::{AtRule, CssRule, Declaration, DeclaredVariable, RuleKind, RuleTree, StyleRule};
use crate::css::specificity::has_pseudo_class;
use crate::state::{DisabledProperties, PropertyOverrides, VariableOverrides, WhatIf};

/// Static styles prepended to every compiled preview.
pub const BASELINE_STYLES: &str = "\
* {
  box-sizing: border-box;
}

html, body {
  height: 100%;
  margin: 0;
  padding: 0;
  scrollbar-width: thin;
  scrollbar-color: rgba(128, 128, 128, 0.5) transparent;
}

::-webkit-scrollbar {
  width: 6px;
  height: 6px;
}

::-webkit-scrollbar-track {
  background: transparent;
}

::-webkit-scrollbar-thumb {
  background-color: rgba(128, 128, 128, 0.5);
  border-radius: 3px;
}

::-webkit-scrollbar-thumb:hover {
  background-color: rgba(128, 128, 128, 0.7);
}

.preview-root {
  font-family: -apple-system, BlinkMacSystemFont, \"Segoe UI\", Roboto, sans-serif;
  line-height: 1.5;
  height: 100%;
}

button.pseudo-hover,
a.pseudo-hover,
input.pseudo-hover {
  outline: 2px dashed #0066cc;
}

button.pseudo-focus,
a.pseudo-focus,
input.pseudo-focus {
  outline: 2px solid #0066cc;
}

button.pseudo-active,
a.pseudo-active,
input.pseudo-active {
  opacity: 0.8;
}
";

/// Compile preview CSS from the individual What-If sets.
pub fn compile(
    tree: &RuleTree,
    declared_variables: &[DeclaredVariable],
    variable_overrides: &VariableOverrides,
    disabled: &DisabledProperties,
    property_overrides: &PropertyOverrides,
) -> String {
    let what_if = WhatIf::new()
        .with_disabled(disabled.clone())
        .with_property_overrides(property_overrides.clone())
        .with_variable_overrides(variable_overrides.clone());
    PreviewCompiler::new(tree, declared_variables, &what_if).compile()
}

/// Compiles one rule tree under one What-If snapshot.
#[derive(Debug)]
pub struct PreviewCompiler<'a> {
    variables: &'a [DeclaredVariable],
    what_if: &'a WhatIf,
    resolver: OverrideResolver<'a>,
    include_baseline: bool,
}

impl<'a> PreviewCompiler<'a> {
    pub fn new(tree: &'a RuleTree, variables: &'a [DeclaredVariable], what_if: &'a WhatIf) -> Self {
        Self {
            variables,
            what_if,
            resolver: OverrideResolver::with_what_if(tree, what_if),
            include_baseline: true,
        }
    }

    /// Toggle the baseline styles (builder).
    pub fn with_baseline(mut self, include: bool) -> Self {
        self.include_baseline = include;
        self
    }

    pub fn compile(&self) -> String {
        let mut css = String::new();
        if self.include_baseline {
            css.push_str(BASELINE_STYLES);
            css.push('\n');
        }
        for rule in self.resolver.tree().rules() {
            self.emit_rule(&mut css, rule, 0, false);
        }
        css
    }

    fn emit_rule(&self, css: &mut String, rule: &CssRule, depth: usize, in_keyframes: bool) {
        match &rule.kind {
            RuleKind::Rule(style) => self.emit_style(css, rule.rule_index, style, depth, in_keyframes),
            RuleKind::AtRule(at) => self.emit_at_rule(css, rule.rule_index, at, depth),
        }
    }

    fn emit_style(
        &self,
        css: &mut String,
        rule_index: usize,
        style: &StyleRule,
        depth: usize,
        in_keyframes: bool,
    ) {
        let indent = "  ".repeat(depth);
        let mut block = String::new();

        for decl in &style.declarations {
            if self.what_if.disabled.is_disabled(rule_index, &decl.property) {
                continue;
            }
            let value = self.declaration_value(rule_index, style, decl, in_keyframes);
            let _ = writeln!(block, "{indent}  {}: {value};", decl.property);
        }
        for added in self.what_if.added.for_rule(rule_index) {
            if self.what_if.disabled.is_added_disabled(rule_index, &added.property) {
                continue;
            }
            let _ = writeln!(block, "{indent}  {}: {};", added.property, added.value);
        }

        let _ = write!(css, "{indent}{} {{\n{block}{indent}}}\n\n", style.selector);

        if !in_keyframes && has_pseudo_class(&style.selector) {
            let forced = convert_pseudo_classes(&style.selector);
            if forced != style.selector {
                let _ = write!(css, "{indent}{forced} {{\n{block}{indent}}}\n\n");
            }
        }
    }

    fn declaration_value(
        &self,
        rule_index: usize,
        style: &StyleRule,
        decl: &Declaration,
        in_keyframes: bool,
    ) -> String {
        if !in_keyframes {
            if let Some(staged) = self
                .what_if
                .property_overrides
                .get(&style.selector, &decl.property)
            {
                if !self
                    .resolver
                    .is_overridden(rule_index, &style.selector, &decl.property)
                {
                    return staged.to_owned();
                }
                log::debug!(
                    target: "cascade_lens::preview",
                    "staged {} on `{}` hidden by a later rule",
                    decl.property,
                    style.selector
                );
            }
        }
        resolve_value_variables(&decl.value, self.variables, &self.what_if.variable_overrides)
    }

    fn emit_at_rule(&self, css: &mut String, rule_index: usize, at: &AtRule, depth: usize) {
        let indent = "  ".repeat(depth);
        if at.params.is_empty() {
            let _ = writeln!(css, "{indent}@{} {{", at.name);
        } else {
            let _ = writeln!(css, "{indent}@{} {} {{", at.name, at.params);
        }
        for decl in &at.declarations {
            if self.what_if.disabled.is_disabled(rule_index, &decl.property) {
                continue;
            }
            let value =
                resolve_value_variables(&decl.value, self.variables, &self.what_if.variable_overrides);
            let _ = writeln!(css, "{indent}  {}: {value};", decl.property);
        }
        let frames = at.is_keyframes();
        for child in &at.children {
            self.emit_rule(css, child, depth + 1, frames);
        }
        let _ = write!(css, "{indent}}}\n\n");
    }
}

/// Resolve `var(--name[, fallback])` references in a value.
///
/// Each reference resolves to, in order: the user's override, the declared
/// value (the last declaration of the name wins), the fallback text, else the
/// reference is left as written. A fallback is itself resolved once, so
/// `var(--a, var(--b, blue))` works but a third level stays verbatim.
pub fn resolve_value_variables(
    value: &str,
    declared: &[DeclaredVariable],
    overrides: &VariableOverrides,
) -> String {
    resolve_with_depth(value, declared, overrides, 0)
}

fn resolve_with_depth(
    value: &str,
    declared: &[DeclaredVariable],
    overrides: &VariableOverrides,
    depth: usize,
) -> String {
    if !value.contains("var(") {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(at) = rest.find("var(") {
        out.push_str(&rest[..at]);
        let args_start = at + "var(".len();
        let Some(close) = matching_paren(&rest[args_start..]).map(|i| args_start + i) else {
            // Unbalanced: keep the remainder untouched.
            out.push_str(&rest[at..]);
            return out;
        };
        let reference = &rest[at..=close];
        let args = &rest[args_start..close];
        let (name, fallback) = match split_top_level_comma(args) {
            Some((name, fallback)) => (name.trim(), Some(fallback.trim())),
            None => (args.trim(), None),
        };

        let resolved = if !name.starts_with("--") {
            None
        } else if let Some(v) = overrides.get(name) {
            Some(v.to_owned())
        } else if let Some(v) = declared.iter().rev().find(|v| v.name == name) {
            Some(v.value.clone())
        } else {
            match fallback.filter(|f| !f.is_empty()) {
                Some(f) if depth == 0 => Some(resolve_with_depth(f, declared, overrides, depth + 1)),
                Some(f) => Some(f.to_owned()),
                None => None,
            }
        };
        match resolved {
            Some(v) => out.push_str(&v),
            None => out.push_str(reference),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Byte offset of the `)` closing an already opened parenthesis.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn split_top_level_comma(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&text[..i], &text[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Rewrite each `:state` pseudo-class into a `.pseudo-state` class.
///
/// Pseudo-elements (`::before`) and functional pseudo-classes (`:not(...)`,
/// `:nth-child(...)`) are left native: the first has no class form, the second
/// is structural rather than a toggleable state.
///
/// ```
/// use cascade_lens::preview::convert_pseudo_classes;
///
/// assert_eq!(convert_pseudo_classes(".btn:hover"), ".btn.pseudo-hover");
/// assert_eq!(convert_pseudo_classes("a:focus::after"), "a.pseudo-focus::after");
/// ```
pub fn convert_pseudo_classes(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len() + 8);
    let mut chars = selector.char_indices().peekable();
    let mut bracket = 0usize;
    let mut quote: Option<char> = None;

    while let Some((i, ch)) = chars.next() {
        match (quote, ch) {
            (_, '\\') => {
                out.push(ch);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => bracket += 1,
            (None, ']') => bracket = bracket.saturating_sub(1),
            (None, ':') if bracket == 0 => {
                if chars.peek().is_some_and(|&(_, next)| next == ':') {
                    // Pseudo-element: copy both colons and the name as-is.
                    out.push_str("::");
                    chars.next();
                    continue;
                }
                let name_start = i + 1;
                let name_end = selector[name_start..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                    .map_or(selector.len(), |off| name_start + off);
                let name = &selector[name_start..name_end];
                let functional = selector[name_end..].starts_with('(');
                if name.is_empty() || functional {
                    out.push(ch);
                    continue;
                }
                out.push_str(".pseudo-");
                out.push_str(name);
                while chars.peek().is_some_and(|&(j, _)| j < name_end) {
                    chars.next();
                }
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

/// Wrap compiled CSS and markup into a standalone preview document.
///
/// The document is meant to replace the previous one wholesale.
pub fn preview_document(css: &str, markup: &str) -> String {
    let css = css.replace("</style", "<\\/style");
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>CSS Preview</title>\n\
         <style>\n{css}</style>\n\
         </head>\n\
         <body style=\"margin: 0; padding: 0; background: white;\">\n{markup}\n</body>\n\
         </html>\n"
    )
}
