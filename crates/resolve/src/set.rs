//! Per-request deduplication of coordinates.

use depot_core::Coordinate;
use depot_core::coordinate::ModuleKey;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Two versions of the same module met during expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// The version that was seen first and is resolved.
    pub kept: Coordinate,
    /// The version that was dropped.
    pub discarded: Coordinate,
}

/// Outcome of offering a coordinate to a [`ResolutionSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First time this module was seen; the caller owns its acquisition.
    Inserted(usize),
    /// The same version is already tracked.
    Duplicate(usize),
    /// Another version is already tracked and wins.
    Conflict(Conflict),
}

#[derive(Debug, Default)]
struct Inner {
    arena: Vec<Coordinate>,
    index: HashMap<ModuleKey, usize>,
    conflicts: Vec<Conflict>,
}

/// Working set of one resolution request, keyed by `(group, name)`.
///
/// Coordinates live in an arena in admission order; the module index maps each
/// `(group, name)` to its slot. Admission is a single locked check-then-insert,
/// so concurrent workers never both own the same module.
#[derive(Debug, Default)]
pub struct ResolutionSet {
    inner: Mutex<Inner>,
}

impl ResolutionSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a coordinate; first seen wins.
    pub fn admit(&self, coordinate: &Coordinate) -> Admission {
        let mut inner = self.lock();
        let key = coordinate.module_key();
        if let Some(&slot) = inner.index.get(&key) {
            let kept = &inner.arena[slot];
            if kept == coordinate {
                return Admission::Duplicate(slot);
            }
            let conflict = Conflict {
                kept: kept.clone(),
                discarded: coordinate.clone(),
            };
            if !inner.conflicts.contains(&conflict) {
                inner.conflicts.push(conflict.clone());
            }
            return Admission::Conflict(conflict);
        }

        let slot = inner.arena.len();
        inner.arena.push(coordinate.clone());
        inner.index.insert(key, slot);
        Admission::Inserted(slot)
    }

    /// Number of distinct modules admitted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().arena.len()
    }

    /// Whether nothing has been admitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admitted coordinate at `slot`.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<Coordinate> {
        self.lock().arena.get(slot).cloned()
    }

    /// Consume the set, yielding admitted coordinates in order and the
    /// conflicts recorded along the way.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Coordinate>, Vec<Conflict>) {
        let inner = self
            .inner
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (inner.arena, inner.conflicts)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner is consistent after every admit, so a poisoned lock is still usable
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
