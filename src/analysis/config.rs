//! Analysis configuration.
//!
//! [`AnalysisConfig`] is a plain struct with public fields. Start from [`Default`] or
//! one of the presets and override what you need:
//!
//! ```rust
//! use fusescope::analysis::{AnalysisConfig, ContextIdentity, GcPolicy};
//!
//! let config = AnalysisConfig {
//!     max_depth: 40,
//!     gc: GcPolicy::Disabled,
//!     ..AnalysisConfig::default()
//! };
//! assert_eq!(config.context_identity, ContextIdentity::CallString);
//! ```
//!
//! # Presets
//!
//! - [`AnalysisConfig::new()`] - Same as default
//! - [`AnalysisConfig::heap_sensitive()`] - Contexts keyed by call string, heap and arguments
//! - [`AnalysisConfig::exhaustive_gc()`] - Abstract GC after every analysed call

/// When the interpreter reclaims unreachable heap cells after an analysed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPolicy {
    /// Never reclaim
    Disabled,
    /// Only in contexts of exactly this call-string depth
    AtDepth(usize),
    /// In every context up to and including this depth
    UpToDepth(usize),
}

impl GcPolicy {
    /// Returns `true` if reclamation runs in a context of the given depth.
    #[must_use]
    pub fn applies_at(self, depth: usize) -> bool {
        match self {
            GcPolicy::Disabled => false,
            GcPolicy::AtDepth(d) => depth == d,
            GcPolicy::UpToDepth(d) => depth <= d,
        }
    }
}

impl Default for GcPolicy {
    fn default() -> Self {
        GcPolicy::AtDepth(1)
    }
}

/// What makes two analysis contexts the same entry in the context table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextIdentity {
    /// Only the chain of call sites. Re-analysing a call site along the same call
    /// string replaces the recorded frames of the earlier analysis.
    #[default]
    CallString,
    /// The call string plus the entry heap and argument values.
    HeapSensitive,
}

/// Configuration of one analysis session.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Maximum call-string depth before the session aborts with
    /// [`crate::Error::RecursionLimit`].
    pub max_depth: usize,

    /// Abstract garbage collection gating.
    pub gc: GcPolicy,

    /// Context identity used by the context table.
    pub context_identity: ContextIdentity,

    /// Raise [`crate::Error::InliningPrevented`] when a core pipeline call ends up
    /// denied for inlining.
    pub verify_transformable: bool,

    /// Classes whose static initializer is run to build the initial static heap.
    /// Classes the provider does not know are skipped.
    pub static_classes: Vec<String>,

    /// Owner prefixes that identify the pipeline library itself.
    pub library_prefixes: Vec<String>,

    /// Return-type ancestors that turn an unresolvable call into a session abort.
    pub pipeline_roots: Vec<String>,

    /// Rewrite method bodies with [`crate::bytecode::preprocess`] before analysing them.
    pub preprocess: bool,

    /// Abort with [`crate::Error::TrackedEscape`] when cells allocated by the analysed
    /// method escape it. When unset, escaped cells are only denied stack allocation.
    pub reject_escapes: bool,
}

impl AnalysisConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call-string plus heap and argument context identity.
    #[must_use]
    pub fn heap_sensitive() -> Self {
        AnalysisConfig {
            context_identity: ContextIdentity::HeapSensitive,
            ..Self::default()
        }
    }

    /// Reclaims unreachable cells after every analysed call, at every depth.
    #[must_use]
    pub fn exhaustive_gc() -> Self {
        AnalysisConfig {
            gc: GcPolicy::UpToDepth(usize::MAX),
            ..Self::default()
        }
    }

    /// Sets the recursion bound.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the GC policy.
    #[must_use]
    pub fn with_gc(mut self, gc: GcPolicy) -> Self {
        self.gc = gc;
        self
    }

    /// Adds a class to the static heap.
    #[must_use]
    pub fn with_static_class(mut self, class: impl Into<String>) -> Self {
        self.static_classes.push(class.into());
        self
    }

    /// Returns `true` if `owner` belongs to the pipeline library.
    #[must_use]
    pub fn is_library_class(&self, owner: &str) -> bool {
        self.library_prefixes.iter().any(|p| owner.starts_with(p))
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_depth: 100,
            gc: GcPolicy::default(),
            context_identity: ContextIdentity::default(),
            verify_transformable: true,
            static_classes: [
                "java/util/stream/StreamOpFlag$Type",
                "java/util/stream/StreamOpFlag",
                "java/util/stream/MatchOps$MatchKind",
                "java/util/stream/Collectors",
                "java/util/stream/Collector$Characteristics",
                "java/util/stream/FindOps$FindSink$OfRef",
                "java/util/stream/FindOps$FindSink$OfInt",
                "java/util/stream/FindOps$FindSink$OfLong",
                "java/util/stream/FindOps$FindSink$OfDouble",
                "java/util/stream/WhileOps",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            library_prefixes: vec!["java/util/stream/".to_string()],
            pipeline_roots: vec![
                "java/util/stream/BaseStream".to_string(),
                "java/util/Spliterator".to_string(),
            ],
            preprocess: true,
            reject_escapes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_policy() {
        assert!(GcPolicy::default().applies_at(1));
        assert!(!GcPolicy::default().applies_at(2));
        assert!(!GcPolicy::Disabled.applies_at(1));
        assert!(GcPolicy::UpToDepth(3).applies_at(3));
        assert!(!GcPolicy::UpToDepth(3).applies_at(4));
    }

    #[test]
    fn test_presets() {
        let config = AnalysisConfig::new();
        assert_eq!(config.max_depth, 100);
        assert!(config.verify_transformable);
        assert!(!config.reject_escapes);
        assert!(config.is_library_class("java/util/stream/ReferencePipeline"));
        assert!(!config.is_library_class("java/util/ArrayList"));

        assert_eq!(
            AnalysisConfig::heap_sensitive().context_identity,
            ContextIdentity::HeapSensitive
        );
        assert!(AnalysisConfig::exhaustive_gc().gc.applies_at(57));
    }
}
