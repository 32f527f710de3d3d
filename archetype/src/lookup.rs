use std::collections::HashMap;

use log::trace;

use crate::{Arena, ObjectId, Value};

/// One memoized chain resolution.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The resolved value as produced at the defining prototype.
    pub value: Value,
    /// The defining prototype declared this name a static method.
    pub static_method: bool,
}

/// Memoizes prototype-chain resolutions per property name, keyed by the
/// defining prototype so every instance sharing that prototype shares one
/// resolution.
///
/// Invalidation is deliberately coarse: any accepted write or delete of a
/// name drops every entry for that name, whichever prototype it touched.
/// Pinpointing the affected entries would need chain-reachability
/// analysis; over-invalidating is the cheap, correct trade-off.
#[derive(Debug, Default)]
pub struct PropertyCache {
    entries: HashMap<String, HashMap<ObjectId, CacheEntry>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str, prototype: ObjectId) -> Option<&CacheEntry> {
        self.entries.get(name)?.get(&prototype)
    }

    pub fn store(&mut self, name: &str, prototype: ObjectId, entry: CacheEntry) {
        trace!("cache store `{name}` for prototype {prototype}");
        self.entries
            .entry(name.to_string())
            .or_default()
            .insert(prototype, entry);
    }

    /// Drop every cached resolution of `name`, for all prototypes.
    pub fn invalidate(&mut self, name: &str) {
        if self.entries.remove(name).is_some() {
            trace!("cache invalidated for `{name}`");
        }
    }

    /// Drop every entry keyed by `id` or whose cached value references it.
    /// Disposal hygiene; writes are already covered by [`invalidate`].
    ///
    /// [`invalidate`]: PropertyCache::invalidate
    pub fn purge_object(&mut self, id: ObjectId) {
        for per_proto in self.entries.values_mut() {
            per_proto.retain(|&proto, entry| {
                if proto == id {
                    return false;
                }
                match &entry.value {
                    Value::Object(o) => *o != id,
                    Value::Method(m) => m.receiver() != Some(id),
                    _ => true,
                }
            });
        }
        self.entries.retain(|_, per_proto| !per_proto.is_empty());
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve `name` on `id`: own properties first, then the prototype chain
/// through the cache.
///
/// On a chain hit the resolver decides the binding at resolution time:
/// a method the defining prototype declared static is returned untouched
/// and the name is flagged static on the requester (so call dispatch
/// prepends the receiver); any other method is rebound to the requester,
/// so inherited methods always execute against the most specific object.
pub(crate) fn resolve(
    arena: &mut Arena,
    cache: &mut PropertyCache,
    id: ObjectId,
    name: &str,
) -> Option<Value> {
    let instance = arena.get(id)?;
    if let Some(value) = instance.get_own(name) {
        return Some(value.clone());
    }
    let prototype = instance.prototype()?;

    let entry = match cache.lookup(name, prototype) {
        Some(entry) => entry.clone(),
        None => {
            let value = resolve(arena, cache, prototype, name)?;
            let static_method = value.is_method()
                && arena.get(prototype).is_some_and(|p| p.is_static(name));
            let entry = CacheEntry {
                value,
                static_method,
            };
            cache.store(name, prototype, entry.clone());
            entry
        }
    };

    match &entry.value {
        Value::Method(m) if entry.static_method => {
            if let Some(instance) = arena.get_mut(id) {
                instance.mark_static(name);
            }
            Some(Value::Method(m.clone()))
        }
        Value::Method(m) => Some(Value::Method(m.bind(id))),
        other => Some(other.clone()),
    }
}
