//! Render surface capability.
//!
//! The impact analyzer needs a place where CSS is actually applied to
//! elements: it queries elements, reads computed values, and injects a
//! transient style block. [`RenderSurface`] is that seam. A browser-backed host
//! implements it over its preview frame; [`headless::HeadlessSurface`] is a
//! small in-process implementation over a slotmap DOM.

pub mod dom;
pub mod headless;

pub use dom::{Dom, NodeData, NodeId};
pub use headless::HeadlessSurface;

/// Handle for one injected style block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectionId(pub u64);

/// Errors raised by a render surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    /// The selector could not be used as an element query.
    #[error("invalid selector query `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The style block could not be parsed or applied.
    #[error("cannot inject styles: {0}")]
    Injection(String),

    /// No live injection with this id.
    #[error("unknown injection {0:?}")]
    UnknownInjection(InjectionId),
}

/// A place where styles are computed for real elements.
pub trait RenderSurface {
    /// Element handle.
    type Element: Copy + Eq + std::fmt::Debug;

    /// All elements matching `selector`, in document order.
    fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>, SurfaceError>;

    /// Stable identifier for an element in impact reports.
    fn element_key(&self, element: Self::Element) -> String;

    /// The computed value of `property` on `element`.
    fn computed_value(&self, element: Self::Element, property: &str) -> Option<String>;

    /// Add a style block after every existing one.
    fn inject_overrides(&mut self, css: &str) -> Result<InjectionId, SurfaceError>;

    /// Remove a block added by [`inject_overrides`](Self::inject_overrides).
    fn remove_overrides(&mut self, id: InjectionId) -> Result<(), SurfaceError>;

    /// Force a synchronous style recalculation.
    fn force_recalc(&mut self);
}
