//! The inspector: one stylesheet, every engine.

use crate::cascade::OverrideResolver;
use crate::config::InspectorConfig;
use crate::css::model::{CssRule, DeclaredVariable, OriginSource, RuleTree};
use crate::css::parser::{parse_style_blocks, parse_stylesheet, ParsedStylesheet};
use crate::error::Result;
use crate::impact::{is_rule_redundant, ImpactAnalyzer, Redundancy, RuleImpact};
use crate::merge::{merge_all, merge_preview, merge_selected, MergeOutcome, MergePreview};
use crate::preview::{preview_document, PreviewCompiler};
use crate::serialize::{materialize, to_css_by_origin, CssByOrigin};
use crate::state::WhatIf;
use crate::suggest::{global_suggestions, suggest, MergeableGroup, Suggestion};
use crate::surface::{HeadlessSurface, RenderSurface};
use crate::synthetic::{affecting_rules, generate_with, AffectingRule, SyntheticDom};

/// A compiled preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub css: String,
    pub markup: String,
    /// Full HTML document wrapping `css` and `markup`.
    pub document: String,
    pub dom: SyntheticDom,
}

/// Everything known about one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub rule_index: usize,
    pub selector: String,
    pub impact: RuleImpact,
    pub redundancy: Redundancy,
    pub suggestions: Vec<Suggestion>,
    /// Rules targeting the same selector or its pseudo variants.
    pub affecting: Vec<AffectingRule>,
}

/// Owns a rule tree, its declared variables and the configuration.
///
/// Every operation borrows the tree immutably; edits are simulated through a
/// [`WhatIf`] snapshot and committed with [`materialize`](Self::materialize).
#[derive(Debug, Clone)]
pub struct Inspector {
    tree: RuleTree,
    variables: Vec<DeclaredVariable>,
    config: InspectorConfig,
}

impl Inspector {
    pub fn new(tree: RuleTree, variables: Vec<DeclaredVariable>, config: InspectorConfig) -> Self {
        Self {
            tree,
            variables,
            config,
        }
    }

    /// Take variables from the tree's own custom properties.
    pub fn from_tree(tree: RuleTree, config: InspectorConfig) -> Self {
        let variables = tree.custom_properties();
        Self::new(tree, variables, config)
    }

    /// Validate rule order and wrap the rules.
    pub fn from_rules(rules: Vec<CssRule>, config: InspectorConfig) -> Result<Self> {
        Ok(Self::from_tree(RuleTree::new(rules)?, config))
    }

    pub fn from_css(css: &str, config: InspectorConfig) -> Result<Self> {
        Ok(Self::from_parsed(parse_stylesheet(css)?, config))
    }

    /// Inspect the `<style>` blocks of an HTML document.
    pub fn from_html(html: &str, config: InspectorConfig) -> Result<Self> {
        Ok(Self::from_parsed(parse_style_blocks(html)?, config))
    }

    fn from_parsed(parsed: ParsedStylesheet, config: InspectorConfig) -> Self {
        log::debug!(
            target: "cascade_lens::inspector",
            "loaded {} rules, {} variables",
            parsed.tree.len(),
            parsed.variables.len()
        );
        Self::new(parsed.tree, parsed.variables, config)
    }

    pub fn tree(&self) -> &RuleTree {
        &self.tree
    }

    pub fn variables(&self) -> &[DeclaredVariable] {
        &self.variables
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Synthetic elements, compiled CSS and the preview document.
    pub fn preview(&self, what_if: &WhatIf) -> Preview {
        let dom = generate_with(&self.tree, &self.config);
        let css = PreviewCompiler::new(&self.tree, &self.variables, what_if)
            .with_baseline(self.config.include_baseline)
            .compile();
        Preview {
            document: preview_document(&css, &dom.markup),
            markup: dom.markup.clone(),
            css,
            dom,
        }
    }

    pub fn resolver<'a>(&'a self, what_if: &'a WhatIf) -> OverrideResolver<'a> {
        OverrideResolver::with_what_if(&self.tree, what_if)
    }

    /// A headless surface rendering the current preview.
    pub fn headless_surface(&self, what_if: &WhatIf) -> Result<HeadlessSurface> {
        let preview = self.preview(what_if);
        Ok(HeadlessSurface::from_preview(&preview.dom, &preview.css)?)
    }

    /// Measure and explain the style rule at `rule_index`.
    ///
    /// Returns `None` if there is no such rule or it is an at-rule.
    pub fn inspect<S: RenderSurface>(
        &self,
        rule_index: usize,
        surface: &mut S,
        what_if: &WhatIf,
    ) -> Option<Inspection> {
        let rule = self.tree.get(rule_index)?;
        let style = rule.as_style()?;

        let analyzer = ImpactAnalyzer::with_what_if(&self.tree, what_if);
        let impact = analyzer.measure(rule_index, &style.selector, &style.declarations, surface);
        let redundancy = is_rule_redundant(&impact);
        let suggestions = suggest(rule, Some(&impact), &self.tree);

        Some(Inspection {
            rule_index,
            selector: style.selector.clone(),
            affecting: affecting_rules(&style.selector, &self.tree),
            impact,
            redundancy,
            suggestions,
        })
    }

    pub fn global_suggestions(&self) -> Vec<Suggestion> {
        global_suggestions(&self.tree)
    }

    pub fn affecting_rules(&self, selector: &str) -> Vec<AffectingRule> {
        affecting_rules(selector, &self.tree)
    }

    pub fn merge_all(&self) -> MergeOutcome {
        merge_all(&self.tree)
    }

    /// Merge `groups`, collapsing groups split across origins into `preferred`.
    pub fn merge_selected(&self, groups: &[MergeableGroup], preferred: OriginSource) -> MergeOutcome {
        merge_selected(&self.tree, groups, preferred)
    }

    pub fn merge_preview(&self, group: &MergeableGroup) -> Option<MergePreview> {
        merge_preview(&self.tree, group)
    }

    /// The current tree written back per origin.
    pub fn css_by_origin(&self) -> CssByOrigin {
        to_css_by_origin(self.tree.rules())
    }

    /// The tree with the snapshot's edits committed.
    pub fn materialize(&self, what_if: &WhatIf) -> RuleTree {
        materialize(&self.tree, what_if)
    }
}
