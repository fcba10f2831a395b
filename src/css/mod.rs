//! CSS layer: tokenizer, selector model, specificity, rule tree and parser.

pub mod tokenizer;
pub mod selector;
pub mod specificity;
pub mod model;
pub mod parser;

pub use model::{
    AtRule, CssRule, Declaration, DeclaredVariable, Origin, OriginSource, RuleKind, RuleTree,
    RuleTreeBuilder, SourceLocation, StyleRule, TreeError,
};
pub use parser::{parse_stylesheet, parse_stylesheet_with, ParseError, ParseOptions};
pub use specificity::{compute_specificity, split_base_and_state, CascadePosition};
