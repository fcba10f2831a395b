//! Integration tests for cascade-lens.
//!
//! These tests exercise the public API from outside the crate: parsing,
//! cascade resolution, preview compilation, impact measurement on the
//! headless surface and the refactor engines working together.

use cascade_lens::css::model::RuleTreeBuilder;
use cascade_lens::preview::{compile, PreviewCompiler};
use cascade_lens::serialize::to_css;
use cascade_lens::state::{DisabledKey, DisabledProperties, PropertyOverrides, VariableOverrides};
use cascade_lens::suggest::{find_mergeable_groups, SuggestionKind};
use cascade_lens::surface::{Dom, NodeData};
use cascade_lens::{
    HeadlessSurface, ImpactAnalyzer, Inspector, InspectorConfig, OverrideResolver, RenderSurface,
    WhatIf,
};

// ---------------------------------------------------------------------------
// Cascade resolution
// ---------------------------------------------------------------------------

#[test]
fn test_basic_override() {
    let tree = RuleTreeBuilder::new()
        .rule(".a", &[("color", "red")])
        .rule(".a", &[("color", "blue")])
        .build();
    let resolver = OverrideResolver::new(&tree);

    assert!(resolver.is_overridden(0, ".a", "color"));
    let overriding = resolver.find_overriding_rule(0, ".a", "color").unwrap();
    assert_eq!(overriding.rule_index, 1);
    assert!(!resolver.is_overridden(1, ".a", "color"));
}

#[test]
fn test_specificity_beats_order() {
    let tree = RuleTreeBuilder::new()
        .rule("#id", &[("color", "red")])
        .rule(".a", &[("color", "blue")])
        .build();
    assert_eq!(tree.get(0).unwrap().as_style().unwrap().specificity, 100);
    assert_eq!(tree.get(1).unwrap().as_style().unwrap().specificity, 10);

    let mut dom = Dom::new();
    dom.insert(NodeData::new("div").with_id("id").with_class("a"));
    let mut surface = HeadlessSurface::new(dom);
    surface.load_css(&to_css(tree.rules())).unwrap();

    let element = surface.query_all(".a").unwrap()[0];
    assert_eq!(surface.computed_value(element, "color").as_deref(), Some("red"));

    let style = tree.get(0).unwrap().as_style().unwrap();
    let impact = ImpactAnalyzer::new(&tree).measure(0, "#id", &style.declarations, &mut surface);
    let color = &impact.affected_nodes[0].properties[0];
    assert!(color.effective);
    assert_eq!(color.overridden_by, None);
    assert_eq!(color.value, "red");
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

#[test]
fn test_mergeable_detection() {
    let tree = RuleTreeBuilder::new()
        .skip(2)
        .rule(".card", &[("padding", "4px")])
        .skip(2)
        .rule(".card", &[("margin", "0")])
        .skip(3)
        .rule(".card", &[("color", "red")])
        .build();

    let groups = find_mergeable_groups(&tree);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count(), 3);
    assert_eq!(groups[0].rule_indices, vec![2, 5, 9]);
    assert_eq!(groups[0].occurrences, vec![3, 6, 10]);

    let inspector = Inspector::from_tree(tree, InspectorConfig::default());
    let global = inspector.global_suggestions();
    assert!(matches!(
        &global[0].kind,
        SuggestionKind::GlobalMergeable { groups } if groups.len() == 1
    ));
}

// ---------------------------------------------------------------------------
// Preview compilation
// ---------------------------------------------------------------------------

#[test]
fn test_disabled_property_excluded_from_compile() {
    let tree = RuleTreeBuilder::new()
        .rule(".a", &[("color", "red"), ("padding", "4px")])
        .build();
    let mut disabled = DisabledProperties::new();
    disabled.insert(DisabledKey::declared(0, "color"));

    let css = compile(
        &tree,
        &[],
        &VariableOverrides::new(),
        &disabled,
        &PropertyOverrides::new(),
    );
    let block_start = css.find(".a {").unwrap();
    let block = &css[block_start..];
    assert!(block.contains("padding: 4px;"));
    assert!(!block.contains("color"));
}

#[test]
fn test_compile_is_idempotent() {
    let inspector = Inspector::from_css(
        ":root { --gap: 4px; }\n.a { margin: var(--gap); }\n.a:hover { color: red; }\n",
        InspectorConfig::default(),
    )
    .unwrap();
    let compiler = PreviewCompiler::new(inspector.tree(), inspector.variables(), WhatIf::none());
    assert_eq!(compiler.compile(), compiler.compile());
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

#[test]
fn test_measurement_leaves_surface_unchanged() {
    let inspector = Inspector::from_css(
        ".btn { color: red; padding: 4px; }\n.btn { padding: 8px; }\n",
        InspectorConfig::default(),
    )
    .unwrap();
    let mut surface = inspector.headless_surface(WhatIf::none()).unwrap();
    let element = surface.query_all(".btn").unwrap()[0];
    let before: Vec<_> = ["color", "padding"]
        .iter()
        .map(|p| surface.computed_value(element, p))
        .collect();

    for rule_index in 0..2 {
        inspector.inspect(rule_index, &mut surface, WhatIf::none()).unwrap();
    }

    let after: Vec<_> = ["color", "padding"]
        .iter()
        .map(|p| surface.computed_value(element, p))
        .collect();
    assert_eq!(before, after);
    assert_eq!(surface.active_injections(), 0);
    assert_eq!(surface.recalc_count(), 2);
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_parse_preview_inspect_flow() {
    let css = "\
.card { color: red; margin: 0; }
@media (max-width: 600px) {
  .card { margin: 4px; }
}
.card { color: blue; }
";
    let inspector = Inspector::from_css(css, InspectorConfig::new().with_baseline(false)).unwrap();

    let preview = inspector.preview(WhatIf::none());
    assert_eq!(preview.dom.element_count, 1);
    assert!(preview.document.contains("<style>"));

    let mut surface = inspector.headless_surface(WhatIf::none()).unwrap();
    let inspection = inspector.inspect(0, &mut surface, WhatIf::none()).unwrap();
    let props = &inspection.impact.affected_nodes[0].properties;
    assert_eq!(props[0].property, "color");
    assert_eq!(props[0].overridden_by, Some(3));
    assert!(!props[0].effective);

    let merged = inspector.merge_all();
    assert_eq!(merged.summary.rules_removed, 1);
    assert_eq!(
        to_css(merged.tree.rules()),
        ".card {\n  color: blue;\n  margin: 0;\n}\n\n@media (max-width: 600px) {\n  .card {\n    margin: 4px;\n  }\n}\n"
    );
}

#[test]
fn test_materialize_commits_what_if() {
    let inspector = Inspector::from_css(".a { color: red; padding: 4px; }", InspectorConfig::default())
        .unwrap();
    let mut disabled = DisabledProperties::new();
    disabled.insert(DisabledKey::declared(0, "color"));
    let what_if = WhatIf::new().with_disabled(disabled);

    let committed = inspector.materialize(&what_if);
    assert_eq!(to_css(committed.rules()), ".a {\n  padding: 4px;\n}\n");
    assert_eq!(inspector.tree().len(), 1);
}
