//! The result-key heuristic used to crown one answer among several.
//!
//! Both reduce convergence and the workflow engine's final-resolution
//! pass need to turn a small mapping of labelled results into a single
//! value. The policy is pluggable; the core only requires determinism.

use crate::collector::CollectedResults;

/// Selects "the" answer key out of a multi-entry result mapping.
///
/// Implementations must be deterministic: the same mapping always yields
/// the same key, and the key must exist in the mapping.
pub trait ResultPicker: Send + Sync {
    /// Pick one existing key, or `None` when the mapping is empty.
    fn pick(&self, results: &CollectedResults) -> Option<String>;
}

/// Picks the first key in insertion order.
///
/// Collected results preserve first-insertion order, so this favours the
/// earliest-registered source.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstResultPicker;

impl ResultPicker for FirstResultPicker {
    fn pick(&self, results: &CollectedResults) -> Option<String> {
        results.keys().next().cloned()
    }
}
