//! Presence-only reconciliation of two uid-keyed event sets.
//!
//! Only the key sets are compared. An event present on both sides is left
//! alone even when its fields differ, so edits made after the first sync
//! never propagate.

use crate::event::{Event, EventMap};

/// Events that exist on exactly one side.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<'a> {
    /// In A but not in B; these need to be written to B.
    pub only_in_a: Vec<&'a Event>,
    /// In B but not in A; these need to be written to A.
    pub only_in_b: Vec<&'a Event>,
}

impl Reconciliation<'_> {
    pub fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

/// Compute `keys(A) - keys(B)` and `keys(B) - keys(A)`.
pub fn reconcile<'a>(a: &'a EventMap, b: &'a EventMap) -> Reconciliation<'a> {
    Reconciliation {
        only_in_a: missing_from(a, b),
        only_in_b: missing_from(b, a),
    }
}

fn missing_from<'a>(source: &'a EventMap, target: &EventMap) -> Vec<&'a Event> {
    source
        .iter()
        .filter(|event| !target.contains(&event.uid))
        .collect()
}
