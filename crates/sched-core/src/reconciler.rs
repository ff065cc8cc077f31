//! Identifier reconciliation for merged sources
//!
//! When independently numbered sources are merged into one namespace, ids may
//! clash. [`IdentifierReconciler`] hands out each id unchanged the first time
//! it is seen and renumbers later clashes, remembering the reassignment so
//! references to the original id can still be resolved.

use std::collections::{HashMap, HashSet};

/// Collision detector and renumberer for one identifier namespace
#[derive(Debug, Clone)]
pub struct IdentifierReconciler {
    /// Every id handed out so far
    reserved: HashSet<i32>,
    /// Lowest candidate for the next replacement id; only moves forward
    cursor: i32,
    /// Original id -> most recent replacement
    reassigned: HashMap<i32, i32>,
    /// Reassignments in the order they were made
    history: Vec<(i32, i32)>,
}

impl Default for IdentifierReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierReconciler {
    pub fn new() -> Self {
        Self {
            reserved: HashSet::new(),
            cursor: 1,
            reassigned: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Reserve `id`, or a replacement if it is already taken.
    ///
    /// The returned id is unique for the lifetime of this reconciler. A
    /// second allocation of the same original id is treated as a clash.
    pub fn allocate(&mut self, id: i32) -> i32 {
        if self.reserved.insert(id) {
            return id;
        }

        let replacement = self.next_free();
        self.reserved.insert(replacement);
        self.reassigned.insert(id, replacement);
        self.history.push((id, replacement));
        tracing::debug!(original = id, replacement, "renumbered clashing id");
        replacement
    }

    /// Reserve `id` without using the result
    pub fn reserve(&mut self, id: i32) {
        self.allocate(id);
    }

    /// The id now standing for `id`; unchanged if it was never reassigned
    pub fn resolve(&self, id: i32) -> i32 {
        self.reassigned.get(&id).copied().unwrap_or(id)
    }

    /// Whether `id` has been handed out
    pub fn is_reserved(&self, id: i32) -> bool {
        self.reserved.contains(&id)
    }

    /// Reassignments as `(original, replacement)` in the order they were made
    pub fn reassignments(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.history.iter().copied()
    }

    /// Number of ids handed out
    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }

    fn next_free(&mut self) -> i32 {
        while self.reserved.contains(&self.cursor) {
            self.cursor += 1;
        }
        self.cursor
    }
}
