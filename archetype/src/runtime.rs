use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::{error, fmt};

use indexmap::IndexMap;
use log::{debug, trace};
use parking_lot::RwLock;

use crate::instance::reserved;
use crate::lookup::{self, PropertyCache};
use crate::{Arena, Instance, ObjectId, ObserverFn, ObserverId, Observers, Value};

/// Failure channel for `call`/`invoke`. Gated mutations never error;
/// they report rejection through their return value instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    MethodNotFound { name: String },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::MethodNotFound { name } => {
                write!(f, "`{name}` is not a method on this object")
            }
        }
    }
}

impl error::Error for CallError {}

/// Everything the runtime owns, behind one lock: the instance arena, the
/// resolution cache, observers with their ledgers, and the per-prototype
/// child registry.
#[derive(Default)]
struct World {
    arena: Arena,
    cache: PropertyCache,
    observers: Observers,
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

/// The prototype object runtime: factory, property protocol, observers
/// and introspection over one shared world.
///
/// Cloning is cheap and shares the world. All state sits behind a single
/// `RwLock`; user callbacks (observers, methods, reserved hooks) are
/// always invoked with the lock released, so they may re-enter the
/// runtime freely. Observers run strictly before a mutation is applied,
/// and cache invalidation strictly after.
#[derive(Clone, Default)]
pub struct Runtime(Arc<RwLock<World>>);

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Factory ────────────────────────────────────────────────────

    /// Create a root object from a property list. See [`Instance::new`]
    /// for the construction special cases.
    pub fn create<K, I>(&self, properties: I) -> ObjectId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut guard = self.0.write();
        let id = guard.arena.insert(Instance::new(properties));
        if let Some(instance) = guard.arena.get_mut(id) {
            instance.bind_all(id);
        }
        debug!("created {id}");
        id
    }

    /// Create a child of `prototype` and register it. Returns `None`
    /// (nothing created) when the prototype is non-extensible or gone.
    pub fn extend<K, I>(&self, prototype: ObjectId, properties: I) -> Option<ObjectId>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut guard = self.0.write();
        if !guard.arena.contains(prototype) || !guard.observers.is_extensible(prototype) {
            return None;
        }
        let mut instance = Instance::new(properties);
        instance.force_prototype(prototype);
        let id = guard.arena.insert(instance);
        if let Some(instance) = guard.arena.get_mut(id) {
            instance.bind_all(id);
        }
        guard.children.entry(prototype).or_default().push(id);
        debug!("extended {prototype} with {id}");
        Some(id)
    }

    /// Extend `prototype` with the merged public views of `sources`,
    /// later sources winning on key conflicts.
    pub fn assign(&self, prototype: ObjectId, sources: &[ObjectId]) -> Option<ObjectId> {
        let mut merged: IndexMap<String, Value> = IndexMap::new();
        for &source in sources {
            for (key, value) in self.entries(source) {
                merged.insert(key, value);
            }
        }
        self.extend(prototype, merged)
    }

    /// Copy an object: same prototype, copied properties and static
    /// flags, every non-static method rebound to the copy. Runs the
    /// reserved `clone` capability on the copy if one resolves. The copy
    /// is not registered as a child (only `extend`/`assign` register).
    pub fn clone_instance(&self, obj: ObjectId) -> Option<ObjectId> {
        let id = {
            let mut guard = self.0.write();
            let copy = guard.arena.get(obj)?.clone();
            let id = guard.arena.insert(copy);
            if let Some(instance) = guard.arena.get_mut(id) {
                instance.bind_all(id);
            }
            debug!("cloned {obj} as {id}");
            id
        };
        let _ = self.call(id, reserved::CLONE, &[]);
        Some(id)
    }

    /// Explicit disposal: runs the reserved `dispose` capability if one
    /// resolves, then removes the object from the arena, its prototype's
    /// child list, the observer registry, both ledgers and the cache.
    pub fn dispose(&self, obj: ObjectId) {
        if !self.contains(obj) {
            return;
        }
        let _ = self.call(obj, reserved::DISPOSE, &[]);
        let mut guard = self.0.write();
        let Some(instance) = guard.arena.remove(obj) else {
            return;
        };
        if let Some(prototype) = instance.prototype() {
            if let Some(list) = guard.children.get_mut(&prototype) {
                list.retain(|&child| child != obj);
            }
        }
        guard.children.remove(&obj);
        guard.observers.drop_target(obj);
        guard.cache.purge_object(obj);
        debug!("disposed {obj}");
    }

    #[inline]
    pub fn contains(&self, obj: ObjectId) -> bool {
        self.0.read().arena.contains(obj)
    }

    // ── Property protocol ──────────────────────────────────────────

    /// Resolve a property: own first, then the prototype chain. `None`
    /// means absent (or a disposed handle). The pseudo-property
    /// `prototype` yields the prototype reference.
    pub fn get(&self, obj: ObjectId, name: &str) -> Option<Value> {
        let mut guard = self.0.write();
        if name == reserved::PROTOTYPE {
            // a disposed prototype reads as absent, like any stale handle
            let prototype = guard.arena.get(obj)?.prototype()?;
            return guard.arena.contains(prototype).then_some(Value::Object(prototype));
        }
        let world = &mut *guard;
        lookup::resolve(&mut world.arena, &mut world.cache, obj, name)
    }

    /// Gated write. Returns `false` without mutating when the name is
    /// reserved, the target is gone, or any observer vetoes. On success
    /// the cache for `name` is invalidated globally.
    pub fn set(&self, obj: ObjectId, name: &str, value: Value) -> bool {
        if name == reserved::PROTOTYPE || name == reserved::PROPERTIES {
            return false;
        }
        let watchers = {
            let guard = self.0.read();
            if !guard.arena.contains(obj) {
                return false;
            }
            guard.observers.watchers(obj)
        };
        if !self.accepted(&watchers, obj, name, &value) {
            return false;
        }
        let mut guard = self.0.write();
        let world = &mut *guard;
        let Some(instance) = world.arena.get_mut(obj) else {
            return false;
        };
        // statics stay unbound even when reassigned
        let value = match value {
            Value::Method(m) if !instance.is_static(name) => Value::Method(m.bind(obj)),
            other => other,
        };
        instance.insert_own(name, value);
        world.cache.invalidate(name);
        true
    }

    /// Gated delete; observers see a [`Value::Null`] proposal. Returns
    /// `true` only when an own property was actually removed.
    pub fn delete(&self, obj: ObjectId, name: &str) -> bool {
        if name == reserved::PROTOTYPE || name == reserved::PROPERTIES {
            return false;
        }
        let watchers = {
            let guard = self.0.read();
            if !guard.arena.contains(obj) {
                return false;
            }
            guard.observers.watchers(obj)
        };
        if !self.accepted(&watchers, obj, name, &Value::Null) {
            return false;
        }
        let mut guard = self.0.write();
        let world = &mut *guard;
        let Some(instance) = world.arena.get_mut(obj) else {
            return false;
        };
        if !instance.remove_own(name) {
            return false;
        }
        world.cache.invalidate(name);
        true
    }

    fn accepted(&self, watchers: &[ObserverFn], obj: ObjectId, name: &str, value: &Value) -> bool {
        for watcher in watchers {
            if !watcher(self, obj, name, value) {
                trace!("mutation of `{name}` on {obj} vetoed");
                return false;
            }
        }
        true
    }

    /// Call a method property. Static methods run unbound with the
    /// caller prepended as first argument; non-static methods run bound
    /// to the caller. Anything else is `MethodNotFound`.
    pub fn call(&self, obj: ObjectId, name: &str, args: &[Value]) -> Result<Value, CallError> {
        let (method, is_static) = {
            let mut guard = self.0.write();
            let world = &mut *guard;
            match lookup::resolve(&mut world.arena, &mut world.cache, obj, name) {
                Some(Value::Method(m)) => {
                    let is_static = world.arena.get(obj).is_some_and(|i| i.is_static(name));
                    (m, is_static)
                }
                _ => {
                    return Err(CallError::MethodNotFound {
                        name: name.to_string(),
                    });
                }
            }
        };
        if is_static {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(Value::Object(obj));
            full.extend_from_slice(args);
            Ok(method.invoke(self, &full))
        } else {
            Ok(method.invoke(self, args))
        }
    }

    /// Call the reserved `invoke` capability.
    pub fn invoke(&self, obj: ObjectId, args: &[Value]) -> Result<Value, CallError> {
        self.call(obj, reserved::INVOKE, args)
    }

    /// Render via the reserved `to_string` capability, falling back to a
    /// default representation. Never fails.
    pub fn stringify(&self, obj: ObjectId) -> String {
        match self.call(obj, reserved::STRINGIFY, &[]) {
            Ok(value) => value.to_string(),
            Err(_) => format!("<object {obj}>"),
        }
    }

    /// Membership in the resolved view (own, inherited, and the
    /// `prototype` pseudo-entry).
    pub fn has_property(&self, obj: ObjectId, name: &str) -> bool {
        let guard = self.0.read();
        entries_view(&guard.arena, obj).contains_key(name)
    }

    /// Membership among own properties only; the `prototype`
    /// pseudo-entry does not count.
    pub fn has_own_property(&self, obj: ObjectId, name: &str) -> bool {
        self.0
            .read()
            .arena
            .get(obj)
            .is_some_and(|instance| instance.has_own(name))
    }

    // ── Views ──────────────────────────────────────────────────────

    /// The resolved view: the prototype's view merged with own entries,
    /// own entries overriding inherited ones in place. The prototype
    /// reference appears as a `prototype` pseudo-entry.
    pub fn entries(&self, obj: ObjectId) -> Vec<(String, Value)> {
        let guard = self.0.read();
        entries_view(&guard.arena, obj).into_iter().collect()
    }

    pub fn keys(&self, obj: ObjectId) -> Vec<String> {
        self.entries(obj).into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self, obj: ObjectId) -> Vec<Value> {
        self.entries(obj).into_iter().map(|(_, v)| v).collect()
    }

    /// Own entries in insertion order, without the pseudo-entry.
    pub fn own_entries(&self, obj: ObjectId) -> Vec<(String, Value)> {
        let guard = self.0.read();
        match guard.arena.get(obj) {
            Some(instance) => instance
                .own_entries()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn own_keys(&self, obj: ObjectId) -> Vec<String> {
        self.own_entries(obj).into_iter().map(|(k, _)| k).collect()
    }

    pub fn own_values(&self, obj: ObjectId) -> Vec<Value> {
        self.own_entries(obj).into_iter().map(|(_, v)| v).collect()
    }

    // ── Observers, freeze, extensibility ───────────────────────────

    pub fn observe(&self, target: ObjectId, callback: ObserverFn) -> ObserverId {
        self.0.write().observers.observe(target, callback)
    }

    pub fn unobserve(&self, target: ObjectId, id: ObserverId) -> bool {
        self.0.write().observers.unobserve(target, id)
    }

    pub fn freeze(&self, target: ObjectId) {
        self.0.write().observers.freeze(target)
    }

    pub fn unfreeze(&self, target: ObjectId) {
        self.0.write().observers.unfreeze(target)
    }

    pub fn is_frozen(&self, target: ObjectId) -> bool {
        self.0.read().observers.is_frozen(target)
    }

    pub fn prevent_extensions(&self, target: ObjectId) {
        self.0.write().observers.prevent_extensions(target)
    }

    pub fn is_extensible(&self, target: ObjectId) -> bool {
        self.0.read().observers.is_extensible(target)
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Direct children registered under `prototype`, in creation order.
    pub fn get_instances(&self, prototype: ObjectId) -> Vec<ObjectId> {
        self.0
            .read()
            .children
            .get(&prototype)
            .cloned()
            .unwrap_or_default()
    }

    /// All transitive children. Deduplicated by identity; treat the
    /// result as a set.
    pub fn get_descendants(&self, prototype: ObjectId) -> Vec<ObjectId> {
        let guard = self.0.read();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut out = Vec::new();
        let mut queue = vec![prototype];
        while let Some(next) = queue.pop() {
            if let Some(list) = guard.children.get(&next) {
                for &child in list {
                    if seen.insert(child) {
                        out.push(child);
                        queue.push(child);
                    }
                }
            }
        }
        out
    }

    /// The ancestor chain from `obj`'s prototype up to the root.
    pub fn get_prototypes(&self, obj: ObjectId) -> Vec<ObjectId> {
        let guard = self.0.read();
        let mut chain = Vec::new();
        let mut current = obj;
        while let Some(prototype) = guard.arena.get(current).and_then(|i| i.prototype()) {
            if !guard.arena.contains(prototype) {
                break;
            }
            chain.push(prototype);
            current = prototype;
        }
        chain
    }

    /// Whether `candidate` appears anywhere in `obj`'s ancestor chain
    /// (identity, not structure).
    pub fn has_prototype(&self, obj: ObjectId, candidate: ObjectId) -> bool {
        let guard = self.0.read();
        let mut current = obj;
        while let Some(prototype) = guard.arena.get(current).and_then(|i| i.prototype()) {
            if !guard.arena.contains(prototype) {
                break;
            }
            if prototype == candidate {
                return true;
            }
            current = prototype;
        }
        false
    }

    /// Live object count; test and debugging aid.
    pub fn object_count(&self) -> usize {
        self.0.read().arena.len()
    }
}

fn entries_view(arena: &Arena, obj: ObjectId) -> IndexMap<String, Value> {
    let Some(instance) = arena.get(obj) else {
        return IndexMap::new();
    };
    let prototype = instance.prototype().filter(|&p| arena.contains(p));
    let mut view = match prototype {
        Some(prototype) => entries_view(arena, prototype),
        None => IndexMap::new(),
    };
    view.insert(
        reserved::PROTOTYPE.to_string(),
        prototype.map(Value::Object).unwrap_or(Value::Null),
    );
    for (key, value) in instance.own_entries() {
        view.insert(key.to_string(), value.clone());
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn int(n: i64) -> Value {
        Value::from(n)
    }

    /// Chain `root <- mid <- leaf` where only `root` holds `x`.
    fn chain(rt: &Runtime) -> (ObjectId, ObjectId, ObjectId) {
        let root = rt.create(vec![("x", int(1))]);
        let mid = rt.extend(root, Vec::<(String, Value)>::new()).unwrap();
        let leaf = rt.extend(mid, Vec::<(String, Value)>::new()).unwrap();
        (root, mid, leaf)
    }

    #[test]
    fn own_value_shadows_prototype() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("x", int(1))]);
        let child = rt.extend(proto, vec![("x", int(2))]).unwrap();
        assert_eq!(rt.get(child, "x"), Some(int(2)));
        assert_eq!(rt.get(proto, "x"), Some(int(1)));
    }

    #[test]
    fn resolution_walks_the_whole_chain() {
        let rt = Runtime::new();
        let (_, _, leaf) = chain(&rt);
        assert_eq!(rt.get(leaf, "x"), Some(int(1)));
        assert_eq!(rt.get(leaf, "missing"), None);
    }

    #[test]
    fn cached_resolution_observes_later_writes() {
        let rt = Runtime::new();
        let (root, _, leaf) = chain(&rt);
        assert_eq!(rt.get(leaf, "x"), Some(int(1)));
        assert!(rt.set(root, "x", int(9)));
        assert_eq!(rt.get(leaf, "x"), Some(int(9)));
    }

    #[test]
    fn cached_resolution_observes_deletes() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("x", int(1))]);
        let child = rt.extend(proto, vec![("x", int(2))]).unwrap();
        assert_eq!(rt.get(child, "x"), Some(int(2)));
        assert!(rt.delete(child, "x"));
        // shadow removed, prototype value shows through
        assert_eq!(rt.get(child, "x"), Some(int(1)));
        assert!(!rt.delete(child, "x"), "nothing left to remove");
    }

    #[test]
    fn freeze_blocks_set_and_delete_until_unfrozen() {
        let rt = Runtime::new();
        let obj = rt.create(vec![("x", int(1))]);
        rt.freeze(obj);
        assert!(rt.is_frozen(obj));
        assert!(!rt.set(obj, "x", int(2)));
        assert!(!rt.delete(obj, "x"));
        assert_eq!(rt.get(obj, "x"), Some(int(1)));
        rt.unfreeze(obj);
        assert!(!rt.is_frozen(obj));
        assert!(rt.set(obj, "x", int(2)));
        assert_eq!(rt.get(obj, "x"), Some(int(2)));
    }

    #[test]
    fn prevent_extensions_blocks_children_not_mutation() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("x", int(1))]);
        rt.prevent_extensions(proto);
        assert!(!rt.is_extensible(proto));
        assert!(rt.extend(proto, vec![("y", int(2))]).is_none());
        assert!(rt.set(proto, "x", int(5)), "own mutation still allowed");
    }

    #[test]
    fn extend_on_disposed_prototype_creates_nothing() {
        let rt = Runtime::new();
        let proto = rt.create(Vec::<(String, Value)>::new());
        rt.dispose(proto);
        assert!(rt.extend(proto, vec![("x", int(1))]).is_none());
    }

    #[test]
    fn inherited_method_runs_bound_to_the_caller() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("who", Value::method(|_, recv, _| recv))]);
        let child = rt.extend(proto, Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(rt.call(child, "who", &[]), Ok(Value::Object(child)));
        assert_eq!(rt.call(proto, "who", &[]), Ok(Value::Object(proto)));
    }

    #[test]
    fn static_method_receives_caller_as_first_argument() {
        let rt = Runtime::new();
        let proto = rt.create(vec![(
            ":first_arg",
            Value::method(|_, recv, args| {
                assert_eq!(recv, Value::Null, "static methods stay unbound");
                args[0].clone()
            }),
        )]);
        let child = rt.extend(proto, Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(rt.call(child, "first_arg", &[]), Ok(Value::Object(child)));
    }

    #[test]
    fn static_dispatch_survives_a_deep_chain() {
        let rt = Runtime::new();
        let root = rt.create(vec![(":me", Value::method(|_, _, args| args[0].clone()))]);
        let mid = rt.extend(root, Vec::<(String, Value)>::new()).unwrap();
        let leaf = rt.extend(mid, Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(rt.call(leaf, "me", &[]), Ok(Value::Object(leaf)));
    }

    #[test]
    fn calling_a_non_method_is_method_not_found() {
        let rt = Runtime::new();
        let obj = rt.create(vec![("x", int(1))]);
        let err = rt.call(obj, "x", &[]).unwrap_err();
        assert_eq!(
            err,
            CallError::MethodNotFound {
                name: "x".to_string()
            }
        );
        assert!(rt.call(obj, "absent", &[]).is_err());
    }

    #[test]
    fn invoke_uses_the_reserved_capability() {
        let rt = Runtime::new();
        let callable = rt.create(vec![(
            reserved::INVOKE,
            Value::method(|_, _, args| args[0].clone()),
        )]);
        assert_eq!(rt.invoke(callable, &[int(3)]), Ok(int(3)));
        let plain = rt.create(Vec::<(String, Value)>::new());
        assert!(rt.invoke(plain, &[]).is_err());
    }

    #[test]
    fn stringify_prefers_capability_over_default() {
        let rt = Runtime::new();
        let named = rt.create(vec![(
            reserved::STRINGIFY,
            Value::method(|_, _, _| Value::from("custom")),
        )]);
        assert_eq!(rt.stringify(named), "custom");
        let plain = rt.create(Vec::<(String, Value)>::new());
        assert_eq!(rt.stringify(plain), format!("<object {plain}>"));
    }

    #[test]
    fn assign_merges_with_later_source_winning() {
        let rt = Runtime::new();
        let proto = rt.create(Vec::<(String, Value)>::new());
        let a = rt.create(vec![("x", int(1)), ("y", int(10))]);
        let b = rt.create(vec![("x", int(2))]);
        let merged = rt.assign(proto, &[a, b]).unwrap();
        assert_eq!(rt.get(merged, "x"), Some(int(2)));
        assert_eq!(rt.get(merged, "y"), Some(int(10)));
        assert_eq!(rt.get(merged, "prototype"), Some(Value::Object(proto)));
        assert_eq!(rt.get_instances(proto), vec![merged]);
    }

    #[test]
    fn observers_veto_silently_and_see_the_old_state() {
        let rt = Runtime::new();
        let obj = rt.create(vec![("x", int(1))]);
        let seen: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        rt.observe(
            obj,
            Arc::new(move |rt, target, name, proposed| {
                record.lock().push(rt.get(target, name));
                proposed != &int(13)
            }),
        );
        assert!(rt.set(obj, "x", int(2)));
        assert!(!rt.set(obj, "x", int(13)), "vetoed write is a no-op");
        assert_eq!(rt.get(obj, "x"), Some(int(2)));
        // each proposal saw the value from before its own mutation
        assert_eq!(*seen.lock(), vec![Some(int(1)), Some(int(2))]);
    }

    #[test]
    fn all_observers_must_accept() {
        let rt = Runtime::new();
        let obj = rt.create(Vec::<(String, Value)>::new());
        rt.observe(obj, Arc::new(|_, _, _, _| true));
        let veto = rt.observe(obj, Arc::new(|_, _, _, _| false));
        assert!(!rt.set(obj, "x", int(1)));
        assert!(rt.unobserve(obj, veto));
        assert!(rt.set(obj, "x", int(1)));
    }

    #[test]
    fn reserved_names_are_never_settable() {
        let rt = Runtime::new();
        let proto = rt.create(Vec::<(String, Value)>::new());
        let obj = rt.extend(proto, Vec::<(String, Value)>::new()).unwrap();
        assert!(!rt.set(obj, "prototype", Value::Null));
        assert!(!rt.set(obj, "properties", int(1)));
        assert!(!rt.delete(obj, "prototype"));
        assert_eq!(rt.get(obj, "prototype"), Some(Value::Object(proto)));
    }

    #[test]
    fn entries_merge_own_over_inherited_in_place() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("a", int(1)), ("b", int(2))]);
        let child = rt.extend(proto, vec![("b", int(3)), ("c", int(4))]).unwrap();
        let entries = rt.entries(child);
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["prototype", "a", "b", "c"]);
        assert_eq!(entries[0].1, Value::Object(proto));
        assert_eq!(entries[2].1, int(3), "own value overrides inherited");
        assert_eq!(rt.values(child), vec![Value::Object(proto), int(1), int(3), int(4)]);
        assert_eq!(rt.own_keys(child), vec!["b", "c"]);
    }

    #[test]
    fn property_membership_views() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("a", int(1))]);
        let child = rt.extend(proto, vec![("b", int(2))]).unwrap();
        assert!(rt.has_property(child, "a"));
        assert!(rt.has_property(child, "b"));
        assert!(rt.has_property(child, "prototype"));
        assert!(!rt.has_property(child, "c"));
        assert!(rt.has_own_property(child, "b"));
        assert!(!rt.has_own_property(child, "a"));
        assert!(!rt.has_own_property(child, "prototype"));
    }

    #[test]
    fn descendants_are_a_deduplicated_set() {
        let rt = Runtime::new();
        let root = rt.create(Vec::<(String, Value)>::new());
        let c1 = rt.extend(root, Vec::<(String, Value)>::new()).unwrap();
        let c2 = rt.extend(root, Vec::<(String, Value)>::new()).unwrap();
        let g1 = rt.extend(c1, Vec::<(String, Value)>::new()).unwrap();
        let got: HashSet<ObjectId> = rt.get_descendants(root).into_iter().collect();
        let expected: HashSet<ObjectId> = [c1, c2, g1].into_iter().collect();
        assert_eq!(got, expected);
        assert_eq!(rt.get_descendants(root).len(), 3, "no duplicates");
        assert_eq!(rt.get_instances(root), vec![c1, c2]);
        assert!(rt.get_instances(g1).is_empty());
    }

    #[test]
    fn prototype_chain_introspection() {
        let rt = Runtime::new();
        let (root, mid, leaf) = chain(&rt);
        assert_eq!(rt.get_prototypes(leaf), vec![mid, root]);
        assert_eq!(rt.get_prototypes(root), Vec::<ObjectId>::new());
        assert!(rt.has_prototype(leaf, root));
        assert!(rt.has_prototype(leaf, mid));
        assert!(!rt.has_prototype(root, leaf));
        assert!(!rt.has_prototype(mid, leaf));
    }

    #[test]
    fn clone_copies_state_and_rebinds_methods() {
        let rt = Runtime::new();
        let orig = rt.create(vec![
            ("x", int(1)),
            ("who", Value::method(|_, recv, _| recv)),
        ]);
        let copy = rt.clone_instance(orig).unwrap();
        assert_ne!(copy, orig);
        assert_eq!(rt.get(copy, "x"), Some(int(1)));
        assert_eq!(rt.call(copy, "who", &[]), Ok(Value::Object(copy)));
        assert_eq!(rt.call(orig, "who", &[]), Ok(Value::Object(orig)));
        // copies diverge afterwards
        assert!(rt.set(copy, "x", int(5)));
        assert_eq!(rt.get(orig, "x"), Some(int(1)));
    }

    #[test]
    fn clone_hook_runs_on_the_copy() {
        let rt = Runtime::new();
        let orig = rt.create(vec![(
            reserved::CLONE,
            Value::method(|rt, recv, _| {
                let id = recv.as_object().unwrap();
                rt.set(id, "cloned", Value::from(true));
                Value::Null
            }),
        )]);
        let copy = rt.clone_instance(orig).unwrap();
        assert_eq!(rt.get(copy, "cloned"), Some(Value::from(true)));
        assert_eq!(rt.get(orig, "cloned"), None);
    }

    #[test]
    fn dispose_runs_hook_and_cleans_every_registry() {
        let rt = Runtime::new();
        let proto = rt.create(Vec::<(String, Value)>::new());
        let disposed: Arc<Mutex<Vec<ObjectId>>> = Arc::new(Mutex::new(Vec::new()));
        let log = disposed.clone();
        let child = rt
            .extend(
                proto,
                vec![(
                    reserved::DISPOSE,
                    Value::method(move |_, recv, _| {
                        log.lock().push(recv.as_object().unwrap());
                        Value::Null
                    }),
                )],
            )
            .unwrap();
        rt.observe(child, Arc::new(|_, _, _, _| true));
        rt.freeze(child);
        rt.prevent_extensions(child);

        rt.dispose(child);
        assert_eq!(*disposed.lock(), vec![child]);
        assert!(!rt.contains(child));
        assert!(rt.get_instances(proto).is_empty());
        assert!(!rt.is_frozen(child));
        assert!(rt.is_extensible(child));
        assert_eq!(rt.get(child, "x"), None);
        assert!(!rt.set(child, "x", int(1)));
        rt.dispose(child); // double disposal is a no-op
        assert_eq!(disposed.lock().len(), 1);
    }

    #[test]
    fn disposing_a_prototype_orphans_children_quietly() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("x", int(1))]);
        let child = rt.extend(proto, Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(rt.get(child, "x"), Some(int(1)));
        rt.dispose(proto);
        assert!(rt.contains(child));
        assert_eq!(rt.get(child, "x"), None, "dangling chain reads as absent");
        assert_eq!(rt.get(child, "prototype"), None);
    }

    #[test]
    fn creation_with_prototype_key_links_without_registering() {
        let rt = Runtime::new();
        let proto = rt.create(vec![("x", int(1))]);
        let obj = rt.create(vec![("prototype", Value::Object(proto))]);
        assert_eq!(rt.get(obj, "x"), Some(int(1)));
        assert!(rt.has_prototype(obj, proto));
        assert!(
            rt.get_instances(proto).is_empty(),
            "only extend/assign register children"
        );
    }

    #[test]
    fn runtime_is_shared_across_clones() {
        let rt = Runtime::new();
        let other = rt.clone();
        let obj = rt.create(vec![("x", int(1))]);
        assert_eq!(other.get(obj, "x"), Some(int(1)));
        assert!(other.set(obj, "x", int(2)));
        assert_eq!(rt.get(obj, "x"), Some(int(2)));
        assert_eq!(rt.object_count(), 1);
    }

    #[test]
    fn methods_may_reenter_the_runtime() {
        let rt = Runtime::new();
        let obj = rt.create(vec![
            ("count", int(0)),
            (
                "bump",
                Value::method(|rt, recv, _| {
                    let id = recv.as_object().unwrap();
                    let n = rt.get(id, "count").and_then(|v| v.as_int()).unwrap_or(0);
                    rt.set(id, "count", int(n + 1));
                    int(n + 1)
                }),
            ),
        ]);
        assert_eq!(rt.call(obj, "bump", &[]), Ok(int(1)));
        assert_eq!(rt.call(obj, "bump", &[]), Ok(int(2)));
        assert_eq!(rt.get(obj, "count"), Some(int(2)));
    }
}
