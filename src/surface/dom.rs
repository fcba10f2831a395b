//! Slotmap-backed element tree and selector matching.

use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::css::selector::{Combinator, CompoundSelector, Selector, SelectorComponent, SelectorPart};

new_key_type! {
    /// Identifier for an element in a [`Dom`].
    pub struct NodeId;
}

const EMPTY_CHILDREN: &[NodeId] = &[];

/// Data carried by one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    /// Lowercase tag name.
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Attributes other than `id` and `class`.
    pub attributes: Vec<(String, String)>,
    /// Text content, if the element has any.
    pub text: Option<String>,
}

impl NodeData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            attributes: Vec::new(),
            text: None,
        }
    }

    /// Set the `id` attribute (builder).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class (builder). Duplicates are ignored.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.add_class(class);
        self
    }

    /// Add several classes (builder).
    pub fn with_classes<'a>(mut self, classes: impl IntoIterator<Item = &'a str>) -> Self {
        for class in classes {
            self.add_class(class);
        }
        self
    }

    /// Set an attribute (builder).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Set the text content (builder).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        if !self.has_class(&class) {
            self.classes.push(class);
        }
    }

    pub fn remove_class(&mut self, class: &str) -> bool {
        let before = self.classes.len();
        self.classes.retain(|c| c != class);
        self.classes.len() != before
    }

    /// Attribute lookup, `id` and `class` included.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            "class" => None,
            _ => self
                .attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
        }
    }
}

/// An element tree backed by a slotmap arena.
///
/// Parent and child links live in secondary maps so lookups are O(1).
#[derive(Debug, Default)]
pub struct Dom {
    nodes: SlotMap<NodeId, NodeData>,
    children: SecondaryMap<NodeId, Vec<NodeId>>,
    parent: SecondaryMap<NodeId, NodeId>,
    root: Option<NodeId>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parentless node. The first one becomes the root.
    pub fn insert(&mut self, data: NodeData) -> NodeId {
        let id = self.nodes.insert(data);
        self.children.insert(id, Vec::new());
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Insert a node as the last child of `parent`.
    ///
    /// Returns `None` if `parent` is not in the tree.
    pub fn insert_child(&mut self, parent: NodeId, data: NodeData) -> Option<NodeId> {
        if !self.nodes.contains_key(parent) {
            return None;
        }
        let id = self.nodes.insert(data);
        self.children.insert(id, Vec::new());
        self.parent.insert(id, parent);
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.push(id);
        }
        Some(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent.get(id).copied()
    }

    /// Children of a node; empty if it has none or does not exist.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_CHILDREN)
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(p) = self.parent.get(current).copied() {
            result.push(p);
            current = p;
        }
        result
    }

    /// Siblings before `id`, nearest first.
    pub fn previous_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let siblings = self.children(parent);
        match siblings.iter().position(|&s| s == id) {
            Some(at) => siblings[..at].iter().rev().copied().collect(),
            None => Vec::new(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order depth-first traversal from `start`.
    pub fn walk_depth_first(&self, start: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !self.nodes.contains_key(current) {
                continue;
            }
            result.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    /// Every node in document order.
    pub fn document_order(&self) -> Vec<NodeId> {
        self.root
            .map(|root| self.walk_depth_first(root))
            .unwrap_or_default()
    }

    /// All nodes matching `selector`, in document order.
    pub fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.document_order()
            .into_iter()
            .filter(|&id| self.matches(selector, id))
            .collect()
    }

    /// Check whether a full selector matches a node.
    ///
    /// Walks the parts right to left. Descendant and subsequent-sibling
    /// combinators try every candidate, so `.a .b > .c` backtracks correctly.
    pub fn matches(&self, selector: &Selector, id: NodeId) -> bool {
        self.matches_from(&selector.parts, id)
    }

    fn matches_from(&self, parts: &[SelectorPart], id: NodeId) -> bool {
        let Some((SelectorPart::Compound(compound), rest)) = parts.split_last() else {
            return false;
        };
        if !self.matches_compound(compound, id) {
            return false;
        }
        let Some((SelectorPart::Combinator(combinator), rest)) = rest.split_last() else {
            return rest.is_empty();
        };
        match combinator {
            Combinator::Child => self
                .parent(id)
                .is_some_and(|parent| self.matches_from(rest, parent)),
            Combinator::Descendant => self
                .ancestors(id)
                .into_iter()
                .any(|ancestor| self.matches_from(rest, ancestor)),
            Combinator::NextSibling => self
                .previous_siblings(id)
                .first()
                .is_some_and(|&sibling| self.matches_from(rest, sibling)),
            Combinator::SubsequentSibling => self
                .previous_siblings(id)
                .into_iter()
                .any(|sibling| self.matches_from(rest, sibling)),
        }
    }

    /// Check whether a compound selector matches a single node.
    pub fn matches_compound(&self, compound: &CompoundSelector, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        compound.components.iter().all(|component| match component {
            SelectorComponent::Type(name) => node.tag.eq_ignore_ascii_case(name),
            SelectorComponent::Universal => true,
            SelectorComponent::Class(name) => node.has_class(name),
            SelectorComponent::Id(name) => node.id.as_deref() == Some(name.as_str()),
            SelectorComponent::Attribute { name, matcher } => node
                .attribute(name)
                .is_some_and(|value| matcher.matches(&value)),
            SelectorComponent::PseudoClass(pseudo) => self.matches_pseudo_class(pseudo, id),
            // Pseudo-elements style generated boxes, never the element.
            SelectorComponent::PseudoElement(_) => false,
        })
    }

    /// Structural pseudo-classes match; dynamic ones (`:hover`, `:focus`, ...)
    /// need a pointer or focus and never do.
    fn matches_pseudo_class(&self, pseudo: &str, id: NodeId) -> bool {
        let siblings = self.parent(id).map(|p| self.children(p));
        match pseudo.to_ascii_lowercase().as_str() {
            "root" => self.parent(id).is_none(),
            "first-child" => siblings.is_some_and(|s| s.first() == Some(&id)),
            "last-child" => siblings.is_some_and(|s| s.last() == Some(&id)),
            "only-child" => siblings.is_some_and(|s| s.len() == 1),
            "empty" => {
                self.children(id).is_empty()
                    && self.get(id).is_some_and(|n| n.text.as_deref().unwrap_or("").is_empty())
            }
            other => match other.strip_prefix("not(").and_then(|s| s.strip_suffix(')')) {
                Some(inner) => match Selector::parse(inner.trim()) {
                    Ok(negated) => !self.matches(&negated, id),
                    Err(_) => false,
                },
                None => false,
            },
        }
    }
}
