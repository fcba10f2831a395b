//! Recursive descent rule-tree builder.
//!
//! Turns CSS text into a [`RuleTree`] using the structural tokens from
//! [`crate::css::tokenizer`]. Selectors, at-rule parameters and declaration
//! values are sliced from the source between token spans, so they keep their
//! original spelling (whitespace runs in selectors are collapsed).
//!
//! This is a forgiving builder, not a conforming CSS parser:
//!
//! - selector lists are split, one rule per selector, each with its own index
//!   (frames of `@keyframes` are kept whole);
//! - statement at-rules (`@import`, `@charset`) are skipped;
//! - nested blocks inside a style rule are skipped;
//! - malformed declarations (no `:`) are dropped.
//!
//! Only unbalanced braces are reported as errors.

use crate::css::model::{
    AtRule, CssRule, Declaration, DeclaredVariable, Origin, OriginSource, RuleTree, SourceLocation,
    StyleRule,
};
use crate::css::selector::{collapse_whitespace, split_selector_list};
use crate::css::tokenizer::{tokenize, Spanned, Token};

/// Errors from CSS parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token at line {line}: {message}")]
    UnexpectedToken { line: usize, message: String },
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(String),
}

/// Options for [`parse_stylesheet_with`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParseOptions {
    /// Origin recorded on every parsed rule.
    pub origin: OriginSource,
    /// Added to every reported line (CSS embedded in a larger document).
    pub line_offset: usize,
    /// Index given to the first parsed rule.
    pub first_index: usize,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: OriginSource) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_line_offset(mut self, line_offset: usize) -> Self {
        self.line_offset = line_offset;
        self
    }

    pub fn with_first_index(mut self, first_index: usize) -> Self {
        self.first_index = first_index;
        self
    }
}

/// A parsed stylesheet: the rule tree plus its custom properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedStylesheet {
    pub tree: RuleTree,
    pub variables: Vec<DeclaredVariable>,
}

/// Parse CSS text with default options.
pub fn parse_stylesheet(css: &str) -> Result<ParsedStylesheet, ParseError> {
    parse_stylesheet_with(css, &ParseOptions::default())
}

/// Parse CSS text.
pub fn parse_stylesheet_with(
    css: &str,
    options: &ParseOptions,
) -> Result<ParsedStylesheet, ParseError> {
    let rules = parse_rules(css, options)?.0;
    let tree = RuleTree::from_ordered(rules);
    let variables = tree.custom_properties();
    Ok(ParsedStylesheet { tree, variables })
}

/// Parse every `<style>` block in an HTML document into one tree.
///
/// Rules are marked [`OriginSource::InlineStyleBlock`], indices continue across
/// blocks and lines refer to the HTML document.
pub fn parse_style_blocks(html: &str) -> Result<ParsedStylesheet, ParseError> {
    let mut rules = Vec::new();
    let mut next_index = 0;
    for (content_start, css) in style_blocks(html) {
        let line_offset = html[..content_start].matches('\n').count();
        let options = ParseOptions::new()
            .with_origin(OriginSource::InlineStyleBlock)
            .with_line_offset(line_offset)
            .with_first_index(next_index);
        let (block_rules, next) = parse_rules(css, &options)?;
        rules.extend(block_rules);
        next_index = next;
    }
    log::debug!(target: "cascade_lens::parser", "parsed {} top-level rules from style blocks", rules.len());
    let tree = RuleTree::from_ordered(rules);
    let variables = tree.custom_properties();
    Ok(ParsedStylesheet { tree, variables })
}

/// Byte offset and content of each `<style ...>...</style>` element.
fn style_blocks(html: &str) -> Vec<(usize, &str)> {
    let lower = html.to_ascii_lowercase();
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(open) = lower[cursor..].find("<style").map(|at| cursor + at) {
        let after_name = open + "<style".len();
        // `<styles>` or `<style-guide>` are different elements.
        if !lower[after_name..].starts_with(|c: char| c == '>' || c.is_ascii_whitespace()) {
            cursor = after_name;
            continue;
        }
        let Some(content_start) = lower[after_name..].find('>').map(|at| after_name + at + 1) else {
            break;
        };
        let Some(content_end) = lower[content_start..].find("</style").map(|at| content_start + at)
        else {
            break;
        };
        blocks.push((content_start, &html[content_start..content_end]));
        cursor = content_end;
    }
    blocks
}

/// Returns the top-level rules and the next unused index.
fn parse_rules(css: &str, options: &ParseOptions) -> Result<(Vec<CssRule>, usize), ParseError> {
    let source = strip_comments(css);
    let tokens = tokenize(&source);
    let mut parser = Parser {
        source: &source,
        tokens,
        cursor: 0,
        lines: LineIndex::new(&source, options.line_offset),
        origin: Origin::new(options.origin),
        next_index: options.first_index,
    };
    let block = parser.parse_block(false, true)?;
    if !block.declarations.is_empty() {
        log::debug!(
            target: "cascade_lens::parser",
            "dropped {} declarations outside any rule",
            block.declarations.len()
        );
    }
    Ok((block.rules, parser.next_index))
}

/// Parenthesis depth after `token`. Unbalanced `)` never goes below zero.
fn nesting(depth: usize, token: Token) -> usize {
    match token {
        Token::ParenOpen => depth + 1,
        Token::ParenClose => depth.saturating_sub(1),
        _ => depth,
    }
}

/// Replace `/* ... */` comments with spaces, keeping byte offsets and newlines.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((_, ch)) = chars.next() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
            }
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                out.push(ch);
            }
            None if ch == '/' && chars.peek().is_some_and(|&(_, next)| next == '*') => {
                chars.next();
                out.push_str("  ");
                let mut previous = '\0';
                for (_, inner) in chars.by_ref() {
                    blank(&mut out, inner);
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
            }
            None => out.push(ch),
        }
    }
    out
}

/// Push whitespace occupying the same bytes as `ch`.
fn blank(out: &mut String, ch: char) {
    if ch == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
    }
}

/// Maps byte offsets to 1-based line numbers.
struct LineIndex {
    newlines: Vec<usize>,
    offset: usize,
}

impl LineIndex {
    fn new(source: &str, offset: usize) -> Self {
        let newlines = source
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| (b == b'\n').then_some(i))
            .collect();
        Self { newlines, offset }
    }

    fn line(&self, byte: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < byte) + 1 + self.offset
    }

    fn location(&self, start: usize, end: usize) -> SourceLocation {
        SourceLocation::new(self.line(start), self.line(end.saturating_sub(1).max(start)))
    }
}

/// Contents of one `{ ... }` block (or of the whole stylesheet).
#[derive(Default)]
struct Block {
    rules: Vec<CssRule>,
    declarations: Vec<Declaration>,
    /// Byte offset just past the closing brace.
    end: usize,
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned<Token>>,
    cursor: usize,
    lines: LineIndex,
    origin: Origin,
    next_index: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.cursor)
    }

    fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Parse rules and declarations until the closing brace (when `nested`)
    /// or the end of input.
    fn parse_block(&mut self, nested: bool, split_lists: bool) -> Result<Block, ParseError> {
        let mut block = Block::default();
        let mut segment: Option<usize> = None;
        let mut parens = 0usize;

        loop {
            let Some(tok) = self.peek() else {
                if nested {
                    return Err(ParseError::UnexpectedEof("missing `}`".into()));
                }
                if let Some(start) = segment {
                    log::debug!(
                        target: "cascade_lens::parser",
                        "ignoring trailing text at line {}",
                        self.lines.line(start)
                    );
                }
                block.end = self.source.len();
                return Ok(block);
            };
            let (token, start, end) = (tok.token, tok.start, tok.end);

            match token {
                Token::BraceClose => {
                    if !nested {
                        return Err(ParseError::UnexpectedToken {
                            line: self.lines.line(start),
                            message: "unmatched `}`".into(),
                        });
                    }
                    self.cursor += 1;
                    if let Some(seg) = segment.take() {
                        self.push_declaration(&mut block.declarations, seg, start);
                    }
                    block.end = end;
                    return Ok(block);
                }
                Token::AtKeyword if segment.is_none() => {
                    if let Some(rule) = self.parse_at_rule()? {
                        block.rules.push(rule);
                    }
                }
                Token::BraceOpen => {
                    parens = 0;
                    let prelude_start = segment.take().unwrap_or(start);
                    self.cursor += 1;
                    let body = self.parse_declaration_block()?;
                    let prelude = &self.source[prelude_start..start];
                    let location = self.lines.location(prelude_start, body.end);
                    let selectors = if split_lists {
                        split_selector_list(prelude)
                    } else {
                        Some(collapse_whitespace(prelude))
                            .filter(|s| !s.is_empty())
                            .into_iter()
                            .collect()
                    };
                    if selectors.is_empty() {
                        log::debug!(
                            target: "cascade_lens::parser",
                            "skipping block without selector at line {}",
                            location.start_line
                        );
                    }
                    for selector in selectors {
                        let index = self.allocate_index();
                        block.rules.push(
                            CssRule::style(index, StyleRule::new(selector, body.declarations.clone()))
                                .with_origin(self.origin)
                                .with_location(location),
                        );
                    }
                }
                Token::Semicolon if parens == 0 => {
                    self.cursor += 1;
                    if let Some(seg) = segment.take() {
                        self.push_declaration(&mut block.declarations, seg, start);
                    }
                }
                _ => {
                    segment.get_or_insert(start);
                    parens = nesting(parens, token);
                    self.cursor += 1;
                }
            }
        }
    }

    /// Parse the declarations of a style rule, after its `{`.
    ///
    /// Semicolons inside parentheses, as in `url(data:image/png;base64,...)`,
    /// belong to the value.
    fn parse_declaration_block(&mut self) -> Result<Block, ParseError> {
        let mut block = Block::default();
        let mut segment: Option<usize> = None;
        let mut parens = 0usize;

        loop {
            let Some(tok) = self.peek() else {
                return Err(ParseError::UnexpectedEof("missing `}` after declarations".into()));
            };
            let (token, start, end) = (tok.token, tok.start, tok.end);
            self.cursor += 1;

            match token {
                Token::Semicolon if parens == 0 => {
                    if let Some(seg) = segment.take() {
                        self.push_declaration(&mut block.declarations, seg, start);
                    }
                }
                Token::BraceClose => {
                    if let Some(seg) = segment.take() {
                        self.push_declaration(&mut block.declarations, seg, start);
                    }
                    block.end = end;
                    return Ok(block);
                }
                Token::BraceOpen => {
                    log::debug!(
                        target: "cascade_lens::parser",
                        "skipping nested block at line {}",
                        self.lines.line(start)
                    );
                    segment = None;
                    parens = 0;
                    self.skip_block()?;
                }
                _ => {
                    segment.get_or_insert(start);
                    parens = nesting(parens, token);
                }
            }
        }
    }

    /// Skip to the brace matching an already consumed `{`.
    fn skip_block(&mut self) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while let Some(tok) = self.peek() {
            let token = tok.token;
            self.cursor += 1;
            match token {
                Token::BraceOpen => depth += 1,
                Token::BraceClose => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::UnexpectedEof("missing `}` in nested block".into()))
    }

    /// Parse an at-rule starting at the current `@keyword` token.
    ///
    /// Statement at-rules return `None`.
    fn parse_at_rule(&mut self) -> Result<Option<CssRule>, ParseError> {
        let Some(keyword) = self.peek() else {
            return Ok(None);
        };
        let (at_start, name_end) = (keyword.start, keyword.end);
        let name = self.source[at_start + 1..name_end].to_ascii_lowercase();
        self.cursor += 1;

        loop {
            let Some(tok) = self.peek() else {
                return Err(ParseError::UnexpectedEof(format!("unterminated @{name}")));
            };
            let (token, start) = (tok.token, tok.start);
            match token {
                Token::Semicolon => {
                    self.cursor += 1;
                    log::debug!(
                        target: "cascade_lens::parser",
                        "skipping statement at-rule @{name} at line {}",
                        self.lines.line(at_start)
                    );
                    return Ok(None);
                }
                Token::BraceClose => {
                    log::debug!(
                        target: "cascade_lens::parser",
                        "at-rule @{name} without block at line {}",
                        self.lines.line(at_start)
                    );
                    return Ok(None);
                }
                Token::BraceOpen => {
                    let params = collapse_whitespace(&self.source[name_end..start]);
                    let index = self.allocate_index();
                    self.cursor += 1;
                    let mut at = AtRule::new(name, params);
                    let split_lists = !at.is_keyframes();
                    let body = self.parse_block(true, split_lists)?;
                    at.children = body.rules;
                    at.declarations = body.declarations;
                    let location = self.lines.location(at_start, body.end);
                    return Ok(Some(
                        CssRule::at_rule(index, at)
                            .with_origin(self.origin)
                            .with_location(location),
                    ));
                }
                _ => self.cursor += 1,
            }
        }
    }

    fn push_declaration(&self, out: &mut Vec<Declaration>, start: usize, end: usize) {
        let text = &self.source[start..end];
        let Some((property, value)) = text.split_once(':') else {
            log::debug!(
                target: "cascade_lens::parser",
                "dropping malformed declaration `{}` at line {}",
                text.trim(),
                self.lines.line(start)
            );
            return;
        };
        let property = property.trim();
        let value = value.trim();
        if property.is_empty() {
            return;
        }
        let property = if property.starts_with("--") {
            property.to_owned()
        } else {
            property.to_ascii_lowercase()
        };
        out.push(Declaration::new(property, value).at(self.lines.location(start, end)));
    }
}
