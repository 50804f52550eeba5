//! Property-test detection.

use syn::{Attribute, ItemFn, Meta};

/// Decides whether a function is a property test.
///
/// The extractor only asks this predicate, so other generator-binding
/// conventions can be plugged in without touching the traversal.
pub trait TestMarker: Send + Sync {
    /// Whether a single attribute marks its function as a property test.
    fn matches(&self, attr: &Attribute) -> bool;

    fn is_property_test(&self, func: &ItemFn) -> bool {
        func.attrs.iter().any(|attr| self.matches(attr))
    }
}

/// Matches attributes whose path contains one of the configured marker names,
/// e.g. `#[proptest]`, `#[proptest(cases = 64)]` or `#[test_strategy::proptest]`.
///
/// Aliased imports of the marker (`use proptest as pt;`) are not resolved.
#[derive(Debug, Clone)]
pub struct AttributeMarker {
    names: Vec<String>,
}

impl AttributeMarker {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for AttributeMarker {
    fn default() -> Self {
        Self::new(["proptest"])
    }
}

impl TestMarker for AttributeMarker {
    fn matches(&self, attr: &Attribute) -> bool {
        if !matches!(attr.meta, Meta::Path(_) | Meta::List(_)) {
            return false;
        }
        attr.path()
            .segments
            .iter()
            .any(|seg| self.names.iter().any(|name| seg.ident == name))
    }
}
