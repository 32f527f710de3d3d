use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::{ObjectId, Runtime, Value};

/// Handle to one observer registration. Closures have no identity of
/// their own, so removal goes through the handle handed out at
/// registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Mutation interceptor: `(runtime, target, name, proposed)` returning
/// `true` to accept or `false` to veto. Deletes propose [`Value::Null`].
pub type ObserverFn = Arc<dyn Fn(&Runtime, ObjectId, &str, &Value) -> bool + Send + Sync>;

struct ObserverEntry {
    id: ObserverId,
    callback: ObserverFn,
}

/// Identity-keyed observer lists plus the freeze and extensibility
/// ledgers. Frozen means "a reject-all observer is installed"; unfreeze
/// removes exactly that one. Extensibility is consulted only at child
/// creation, never at own-property mutation.
#[derive(Default)]
pub struct Observers {
    entries: HashMap<ObjectId, Vec<ObserverEntry>>,
    frozen: HashMap<ObjectId, ObserverId>,
    sealed: HashSet<ObjectId>,
    next: u64,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; idempotent per identical callback (same
    /// `Arc`), returning the existing handle in that case.
    pub fn observe(&mut self, target: ObjectId, callback: ObserverFn) -> ObserverId {
        let list = self.entries.entry(target).or_default();
        if let Some(entry) = list.iter().find(|e| Arc::ptr_eq(&e.callback, &callback)) {
            return entry.id;
        }
        let id = ObserverId(self.next);
        self.next += 1;
        list.push(ObserverEntry { id, callback });
        id
    }

    /// Remove a registration; no-op when the handle is unknown.
    pub fn unobserve(&mut self, target: ObjectId, id: ObserverId) -> bool {
        let Some(list) = self.entries.get_mut(&target) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.remove(&target);
        }
        removed
    }

    /// Snapshot of the callbacks watching `target`, in registration
    /// order. Cloned out so callers can invoke them without holding any
    /// borrow of the registry.
    pub fn watchers(&self, target: ObjectId) -> Vec<ObserverFn> {
        self.entries
            .get(&target)
            .map(|list| list.iter().map(|e| e.callback.clone()).collect())
            .unwrap_or_default()
    }

    /// Install the reject-all observer. Idempotent: a frozen target keeps
    /// its existing registration.
    pub fn freeze(&mut self, target: ObjectId) {
        if self.frozen.contains_key(&target) {
            return;
        }
        let id = self.observe(target, Arc::new(|_, _, _, _| false));
        self.frozen.insert(target, id);
        debug!("froze {target}");
    }

    /// Remove the freeze observer if present; other observers stay.
    pub fn unfreeze(&mut self, target: ObjectId) {
        if let Some(id) = self.frozen.remove(&target) {
            self.unobserve(target, id);
            debug!("unfroze {target}");
        }
    }

    #[inline]
    pub fn is_frozen(&self, target: ObjectId) -> bool {
        self.frozen.contains_key(&target)
    }

    pub fn prevent_extensions(&mut self, target: ObjectId) {
        self.sealed.insert(target);
        debug!("sealed {target} against extension");
    }

    #[inline]
    pub fn is_extensible(&self, target: ObjectId) -> bool {
        !self.sealed.contains(&target)
    }

    /// Disposal cleanup: drop observer registrations and both marks.
    pub fn drop_target(&mut self, target: ObjectId) {
        self.entries.remove(&target);
        self.frozen.remove(&target);
        self.sealed.remove(&target);
    }
}
