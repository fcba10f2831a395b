//! # cascade-lens
//!
//! CSS cascade resolution and rule impact analysis for live style previews.
//!
//! cascade-lens parses a stylesheet into an ordered rule tree, builds a
//! synthetic preview for every selector it finds, and answers the questions a
//! style editor asks: which later rule overrides this declaration, does this
//! rule change anything on screen, and which rules could be merged. Edits are
//! simulated through What-If snapshots and only committed on request.
//!
//! ## Core Systems
//!
//! - **[`css`]**: tokenizer, selector model, specificity, rule tree and parser
//! - **[`state`]**: What-If snapshots (disabled, overridden and added properties, variable overrides)
//! - **[`cascade`]**: finds the later rule that overrides a declaration
//! - **[`synthetic`]**: synthetic elements per base selector, element inspector, keyframes
//! - **[`preview`]**: compiles the tree and a What-If snapshot into preview CSS
//! - **[`surface`]**: render surface abstraction, slotmap DOM and a headless cascade
//! - **[`impact`]**: measures what each declaration of a rule changes
//! - **[`suggest`]**: mergeable rules, always-overridden declarations, redundant rules
//! - **[`merge`]** / **[`serialize`]**: copy-on-write refactors and CSS output
//! - **[`inspector`]**: one entry point tying everything together
//!
//! ```
//! use cascade_lens::{Inspector, InspectorConfig, WhatIf};
//!
//! let inspector = Inspector::from_css(
//!     ".btn { color: red; padding: 4px; } .btn { color: blue; }",
//!     InspectorConfig::default(),
//! )?;
//! let mut surface = inspector.headless_surface(WhatIf::none())?;
//! let inspection = inspector.inspect(0, &mut surface, WhatIf::none()).unwrap();
//!
//! let color = &inspection.impact.affected_nodes[0].properties[0];
//! assert_eq!(color.overridden_by, Some(1));
//! assert!(!color.effective);
//! # Ok::<(), cascade_lens::Error>(())
//! ```

// Foundation
pub mod config;
pub mod error;

// Stylesheet model
pub mod css;
pub mod state;
pub mod cascade;

// Preview
pub mod synthetic;
pub mod preview;
pub mod surface;

// Analysis and refactoring
pub mod impact;
pub mod suggest;
pub mod merge;
pub mod serialize;

pub mod inspector;

pub use cascade::{OverrideResolver, OverridingRule};
pub use config::InspectorConfig;
pub use css::{parse_stylesheet, CssRule, Declaration, RuleTree, StyleRule};
pub use error::{Error, Result};
pub use impact::{ImpactAnalyzer, RuleImpact};
pub use inspector::{Inspection, Inspector, Preview};
pub use merge::{MergeOutcome, MergePlan, MergePreview};
pub use state::WhatIf;
pub use suggest::{MergeableGroup, Suggestion};
pub use surface::{HeadlessSurface, RenderSurface};
