//! logos-based lexers for stylesheets and selectors.
//!
//! Two token sets live here:
//!
//! - [`Token`] scans stylesheet structure only (at-keywords, braces,
//!   parentheses, semicolons, strings, everything else as opaque chunks). The parser slices the raw source
//!   text between token spans, so selectors and values keep their exact spelling.
//! - [`SelectorToken`] scans a single selector into simple-selector pieces and
//!   combinators. It feeds both specificity counting and structural matching.
//!
//! Token priority in logos is determined by:
//! 1. Longest match wins (e.g. `::before` as [`SelectorToken::PseudoElement`]
//!    beats `:` + `:before`)
//! 2. For equal length matches, earlier-defined variants win

use logos::Logos;

/// Structural stylesheet token.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\n\r\f]+")]
pub enum Token {
    /// `@media`, `@keyframes`, `@-webkit-keyframes`, ...
    #[regex(r"@-?[a-zA-Z][a-zA-Z0-9_-]*")]
    AtKeyword,

    /// `{`
    #[token("{")]
    BraceOpen,

    /// `}`
    #[token("}")]
    BraceClose,

    /// `;`
    #[token(";")]
    Semicolon,

    /// Double-quoted string literal (may contain braces and semicolons).
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,

    /// Single-quoted string literal.
    #[regex(r"'([^'\\]|\\.)*'")]
    StringLiteralSingle,

    /// `(`, opening a function or a parenthesized group.
    #[token("(")]
    ParenOpen,

    /// `)`
    #[token(")")]
    ParenClose,

    /// Any other run of non-structural characters.
    #[regex(r#"[^{};@"'()\s]+"#)]
    Chunk,
}

/// Selector token produced by [`SelectorToken::lexer`].
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\n\r\f]+")]
pub enum SelectorToken {
    // ── Simple selectors ─────────────────────────────────────────────

    /// `#main`
    #[regex(r"#-?([a-zA-Z_]|\\.)([a-zA-Z0-9_-]|\\.)*")]
    Id,

    /// `.card`, `.col-2`, `.md\:flex`
    #[regex(r"\.-?([a-zA-Z_]|\\.)([a-zA-Z0-9_-]|\\.)*")]
    Class,

    /// `[type]`, `[type="text"]`
    #[regex(r"\[[^\]]*\]")]
    Attribute,

    /// `::before`, `::placeholder`
    #[regex(r"::[a-zA-Z][a-zA-Z0-9_-]*")]
    PseudoElement,

    /// `:hover`, `:first-child`
    #[regex(r":[a-zA-Z][a-zA-Z0-9_-]*")]
    PseudoClass,

    /// `:not(.a)`, `:nth-child(2n)`
    #[regex(r":[a-zA-Z][a-zA-Z0-9_-]*\([^)]*\)")]
    FunctionalPseudoClass,

    /// `button`, `h1`
    #[regex(r"[a-zA-Z][a-zA-Z0-9-]*")]
    Type,

    /// `*`
    #[token("*")]
    Universal,

    // ── Combinators and separators ───────────────────────────────────

    /// `>`
    #[token(">")]
    Child,

    /// `+`
    #[token("+")]
    NextSibling,

    /// `~`
    #[token("~")]
    SubsequentSibling,

    /// `,`
    #[token(",")]
    Comma,
}

impl SelectorToken {
    /// Returns `true` for tokens that make up a compound selector.
    pub fn is_simple(self) -> bool {
        !matches!(
            self,
            SelectorToken::Child
                | SelectorToken::NextSibling
                | SelectorToken::SubsequentSibling
                | SelectorToken::Comma
        )
    }
}

/// A token together with its byte span in the scanned source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub token: T,
    pub start: usize,
    pub end: usize,
}

/// Tokenize stylesheet text, keeping byte spans.
///
/// Characters logos cannot classify (a lone `@`, an unterminated quote) are
/// dropped from the token stream; they remain in the source text and are picked
/// up again when the parser slices raw spans.
pub fn tokenize(input: &str) -> Vec<Spanned<Token>> {
    Token::lexer(input)
        .spanned()
        .filter_map(|(result, span)| {
            result.ok().map(|token| Spanned {
                token,
                start: span.start,
                end: span.end,
            })
        })
        .collect()
}

/// Tokenize a selector.
///
/// Unlike [`tokenize`], a selector with any unrecognised character is rejected
/// as a whole: the error carries the byte offset of the first bad character.
pub fn tokenize_selector(input: &str) -> Result<Vec<Spanned<SelectorToken>>, usize> {
    SelectorToken::lexer(input)
        .spanned()
        .map(|(result, span)| match result {
            Ok(token) => Ok(Spanned {
                token,
                start: span.start,
                end: span.end,
            }),
            Err(()) => Err(span.start),
        })
        .collect()
}
