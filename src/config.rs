//! Inspector configuration.

/// Default cap on synthetic preview elements.
pub const DEFAULT_MAX_ELEMENTS: usize = 25;

/// Configuration for the [`Inspector`](crate::inspector::Inspector) and the
/// synthetic preview it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InspectorConfig {
    /// Maximum number of synthetic elements. Base selectors beyond the cap are
    /// still analyzed but not rendered.
    pub max_elements: usize,
    /// Prepend the fixed baseline styles to compiled CSS.
    pub include_baseline: bool,
    /// Put a short placeholder text inside each synthetic element.
    pub placeholder_text: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
            include_baseline: true,
            placeholder_text: true,
        }
    }
}

impl InspectorConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the element cap (builder).
    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    /// Toggle the baseline styles (builder).
    pub fn with_baseline(mut self, include: bool) -> Self {
        self.include_baseline = include;
        self
    }

    /// Toggle placeholder text (builder).
    pub fn with_placeholder_text(mut self, enabled: bool) -> Self {
        self.placeholder_text = enabled;
        self
    }
}
