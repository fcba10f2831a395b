//! Structured selector model: compound selectors joined by combinators.
//!
//! The cascade engine itself works on selector *text* (exact-match and
//! base-selector comparisons). The structured form here is used where a selector
//! has to be matched against elements or decomposed into tag/class/id pieces:
//! the headless render surface and tag inference for synthetic elements.

use crate::css::tokenizer::{tokenize_selector, SelectorToken, Spanned};

/// How an attribute selector compares the attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeMatch {
    /// `[name]`
    Present,
    /// `[name=value]`
    Equals(String),
    /// `[name~=value]`
    Word(String),
    /// `[name|=value]`
    DashPrefix(String),
    /// `[name^=value]`
    Prefix(String),
    /// `[name$=value]`
    Suffix(String),
    /// `[name*=value]`
    Substring(String),
}

impl AttributeMatch {
    /// Test an attribute value against this matcher.
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            AttributeMatch::Present => true,
            AttributeMatch::Equals(v) => actual == v,
            AttributeMatch::Word(v) => actual.split_whitespace().any(|w| w == v),
            AttributeMatch::DashPrefix(v) => {
                actual == v || actual.strip_prefix(v.as_str()).is_some_and(|r| r.starts_with('-'))
            }
            AttributeMatch::Prefix(v) => !v.is_empty() && actual.starts_with(v.as_str()),
            AttributeMatch::Suffix(v) => !v.is_empty() && actual.ends_with(v.as_str()),
            AttributeMatch::Substring(v) => !v.is_empty() && actual.contains(v.as_str()),
        }
    }

    /// The literal value carried by the matcher, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            AttributeMatch::Present => None,
            AttributeMatch::Equals(v)
            | AttributeMatch::Word(v)
            | AttributeMatch::DashPrefix(v)
            | AttributeMatch::Prefix(v)
            | AttributeMatch::Suffix(v)
            | AttributeMatch::Substring(v) => Some(v),
        }
    }
}

/// A single simple selector inside a compound selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorComponent {
    /// Type selector: `button`.
    Type(String),
    /// Universal selector: `*`.
    Universal,
    /// Class selector: `.card`.
    Class(String),
    /// ID selector: `#main`.
    Id(String),
    /// Attribute selector: `[type="text"]`.
    Attribute { name: String, matcher: AttributeMatch },
    /// Pseudo-class, without the colon: `hover`, `not(.a)`.
    PseudoClass(String),
    /// Pseudo-element, without the colons: `before`.
    PseudoElement(String),
}

/// A combinator between compound selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace: `A B`.
    Descendant,
    /// `A > B`.
    Child,
    /// `A + B`.
    NextSibling,
    /// `A ~ B`.
    SubsequentSibling,
}

/// A sequence of simple selectors with no combinator between them,
/// e.g. `button.primary:hover`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub components: Vec<SelectorComponent>,
}

impl CompoundSelector {
    /// The type selector of this compound, if it has one.
    pub fn tag(&self) -> Option<&str> {
        self.components.iter().find_map(|c| match c {
            SelectorComponent::Type(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The first ID selector of this compound, if it has one.
    pub fn id(&self) -> Option<&str> {
        self.components.iter().find_map(|c| match c {
            SelectorComponent::Id(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// All class names, in selector order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.components.iter().filter_map(|c| match c {
            SelectorComponent::Class(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// All attribute selectors as `(name, matcher)` pairs.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeMatch)> {
        self.components.iter().filter_map(|c| match c {
            SelectorComponent::Attribute { name, matcher } => Some((name.as_str(), matcher)),
            _ => None,
        })
    }
}

/// One element in a selector chain: either a compound selector or a combinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPart {
    Compound(CompoundSelector),
    Combinator(Combinator),
}

/// Errors from [`Selector::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character at byte {offset} in selector `{selector}`")]
    InvalidToken { selector: String, offset: usize },
    #[error("combinator without a selector on both sides in `{0}`")]
    DanglingCombinator(String),
    #[error("selector list `{0}` must be split before parsing")]
    List(String),
    #[error("malformed attribute selector `{0}`")]
    Attribute(String),
}

/// A full selector: compound selectors joined by combinators.
///
/// For example, `nav > a.active:hover` has parts
/// `[Compound(nav), Combinator(Child), Compound(a.active:hover)]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    /// Alternating compound selectors and combinators.
    /// Always starts and ends with a `SelectorPart::Compound`.
    pub parts: Vec<SelectorPart>,
}

impl Selector {
    /// Parse a single (non-list) selector.
    ///
    /// Whitespace between two simple selectors is a descendant combinator; the
    /// span of each token decides whether it is glued to the previous one.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize_selector(text).map_err(|offset| SelectorError::InvalidToken {
            selector: text.to_owned(),
            offset,
        })?;
        if tokens.is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut parts: Vec<SelectorPart> = Vec::new();
        let mut current = CompoundSelector::default();
        let mut previous: Option<&Spanned<SelectorToken>> = None;
        let mut pending: Option<Combinator> = None;

        for spanned in &tokens {
            let combinator = match spanned.token {
                SelectorToken::Comma => return Err(SelectorError::List(text.to_owned())),
                SelectorToken::Child => Some(Combinator::Child),
                SelectorToken::NextSibling => Some(Combinator::NextSibling),
                SelectorToken::SubsequentSibling => Some(Combinator::SubsequentSibling),
                _ => None,
            };

            if let Some(combinator) = combinator {
                if current.components.is_empty() || pending.is_some() {
                    return Err(SelectorError::DanglingCombinator(text.to_owned()));
                }
                parts.push(SelectorPart::Compound(std::mem::take(&mut current)));
                pending = Some(combinator);
                previous = Some(spanned);
                continue;
            }

            let glued = previous
                .is_some_and(|p| p.token.is_simple() && p.end == spanned.start);
            if !glued && !current.components.is_empty() {
                parts.push(SelectorPart::Compound(std::mem::take(&mut current)));
                pending = Some(Combinator::Descendant);
            }
            if let Some(combinator) = pending.take() {
                parts.push(SelectorPart::Combinator(combinator));
            }

            current
                .components
                .push(component(spanned.token, &text[spanned.start..spanned.end])?);
            previous = Some(spanned);
        }

        if current.components.is_empty() || pending.is_some() {
            return Err(SelectorError::DanglingCombinator(text.to_owned()));
        }
        parts.push(SelectorPart::Compound(current));

        Ok(Selector { parts })
    }

    /// The rightmost compound selector: the one that matches the element itself.
    pub fn subject(&self) -> Option<&CompoundSelector> {
        self.parts.iter().rev().find_map(|part| match part {
            SelectorPart::Compound(compound) => Some(compound),
            SelectorPart::Combinator(_) => None,
        })
    }

    /// Iterate over all simple selector components, left to right.
    pub fn components(&self) -> impl Iterator<Item = &SelectorComponent> {
        self.parts.iter().flat_map(|part| match part {
            SelectorPart::Compound(compound) => compound.components.iter(),
            SelectorPart::Combinator(_) => [].iter(),
        })
    }
}

fn component(token: SelectorToken, text: &str) -> Result<SelectorComponent, SelectorError> {
    Ok(match token {
        SelectorToken::Type => SelectorComponent::Type(text.to_owned()),
        SelectorToken::Universal => SelectorComponent::Universal,
        SelectorToken::Class => SelectorComponent::Class(unescape(&text[1..])),
        SelectorToken::Id => SelectorComponent::Id(unescape(&text[1..])),
        SelectorToken::PseudoClass | SelectorToken::FunctionalPseudoClass => {
            SelectorComponent::PseudoClass(text[1..].to_owned())
        }
        SelectorToken::PseudoElement => SelectorComponent::PseudoElement(text[2..].to_owned()),
        SelectorToken::Attribute => parse_attribute(text)?,
        SelectorToken::Child
        | SelectorToken::NextSibling
        | SelectorToken::SubsequentSibling
        | SelectorToken::Comma => unreachable!("combinators are handled by the caller"),
    })
}

/// Parse the inside of `[...]`.
fn parse_attribute(text: &str) -> Result<SelectorComponent, SelectorError> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| SelectorError::Attribute(text.to_owned()))?;

    let Some((lhs, rhs)) = inner.split_once('=') else {
        let name = inner.trim();
        if name.is_empty() {
            return Err(SelectorError::Attribute(text.to_owned()));
        }
        return Ok(SelectorComponent::Attribute {
            name: name.to_owned(),
            matcher: AttributeMatch::Present,
        });
    };

    let lhs = lhs.trim_end();
    let (name, operator) = match lhs.chars().last() {
        Some(op @ ('~' | '|' | '^' | '$' | '*')) => (&lhs[..lhs.len() - 1], Some(op)),
        _ => (lhs, None),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(SelectorError::Attribute(text.to_owned()));
    }

    // Drop a trailing case flag (`[a="b" i]`) and the surrounding quotes.
    let mut value = rhs.trim();
    if let Some(stripped) = value.strip_suffix(" i").or_else(|| value.strip_suffix(" s")) {
        value = stripped.trim_end();
    }
    let value = unquote(value).to_owned();

    let matcher = match operator {
        None => AttributeMatch::Equals(value),
        Some('~') => AttributeMatch::Word(value),
        Some('|') => AttributeMatch::DashPrefix(value),
        Some('^') => AttributeMatch::Prefix(value),
        Some('$') => AttributeMatch::Suffix(value),
        Some(_) => AttributeMatch::Substring(value),
    };

    Ok(SelectorComponent::Attribute {
        name: name.to_owned(),
        matcher,
    })
}

/// Drop the backslash of each escaped character: `md\:flex` is `md:flex`.
fn unescape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let mut chars = ident.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.extend(chars.next()),
            _ => out.push(ch),
        }
    }
    out
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

/// Split a selector list on top-level commas.
///
/// Commas inside parentheses, brackets or quotes do not split. Empty entries
/// are dropped and each entry has its whitespace collapsed.
pub fn split_selector_list(list: &str) -> Vec<String> {
    let mut selectors = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in list.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                push_collapsed(&mut selectors, &list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_collapsed(&mut selectors, &list[start..]);
    selectors
}

fn push_collapsed(out: &mut Vec<String>, raw: &str) {
    let collapsed = collapse_whitespace(raw);
    if !collapsed.is_empty() {
        out.push(collapsed);
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
