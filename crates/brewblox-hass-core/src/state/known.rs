// # Known Entity Set
//
// In-memory record of every entity whose discovery config was published.
//
// ## Purpose
//
// Lets the relay announce each entity once per process. The set grows
// monotonically under normal operation and is never persisted.
//
// ## Restart Behavior
//
// - All entries are lost on restart
// - The first message after a restart re-announces every entity it mentions
// - Discovery topics are retained, so re-announcing is harmless
//
// ## Atomicity
//
// `claim` performs check-and-insert under one lock. Two concurrent claims for
// the same identity cannot both succeed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::translate::EntityIdentity;

/// Process-lifetime set of announced entities
///
/// Clones share the same underlying set.
///
/// # Example
///
/// ```rust
/// use brewblox_hass_core::state::KnownSet;
/// use brewblox_hass_core::translate::EntityIdentity;
///
/// let known = KnownSet::new();
/// let entity = EntityIdentity::spark("spark-one", "Sensor1");
///
/// assert!(known.claim(&entity));
/// assert!(!known.claim(&entity));
/// ```
#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    inner: Arc<Mutex<HashSet<EntityIdentity>>>,
}

impl KnownSet {
    /// Create a new empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity if absent
    ///
    /// Returns `true` when the caller now owns the announcement for this
    /// identity, `false` when it was already known.
    pub fn claim(&self, entity: &EntityIdentity) -> bool {
        self.lock().insert(entity.clone())
    }

    /// Remove an identity after its announcement failed
    pub fn release(&self, entity: &EntityIdentity) {
        self.lock().remove(entity);
    }

    /// Check whether an identity was announced
    pub fn contains(&self, entity: &EntityIdentity) -> bool {
        self.lock().contains(entity)
    }

    /// Get the number of known entities
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all known identities, sorted
    pub fn entities(&self) -> Vec<EntityIdentity> {
        let mut entities: Vec<_> = self.lock().iter().cloned().collect();
        entities.sort();
        entities
    }

    // A panic while holding the lock cannot leave the set half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashSet<EntityIdentity>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
