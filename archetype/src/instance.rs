use std::collections::HashSet;

use indexmap::IndexMap;

use crate::{ObjectId, Value};

/// Prefix marking a property as a static method at construction time.
/// The stored name has the prefix stripped.
pub const STATIC_MARKER: char = ':';

/// Property names with meaning to the runtime rather than to the object.
pub mod reserved {
    /// Pseudo-property exposing the prototype reference; never settable.
    pub const PROTOTYPE: &str = "prototype";
    /// Reserved for the merged property view; never stored or settable.
    pub const PROPERTIES: &str = "properties";
    /// Capability used by `Runtime::invoke`.
    pub const INVOKE: &str = "invoke";
    /// Capability used by `Runtime::stringify`.
    pub const STRINGIFY: &str = "to_string";
    /// Hook run on the copy after `Runtime::clone_instance`.
    pub const CLONE: &str = "clone";
    /// Hook run before `Runtime::dispose` tears an instance down.
    pub const DISPOSE: &str = "dispose";
}

/// Own state of a single object: its properties in insertion order, the
/// names flagged as static methods, and the prototype reference.
///
/// The prototype is assigned at construction (or forced once by the
/// factory) and never reassigned afterwards, which keeps the prototype
/// graph acyclic by construction.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    properties: IndexMap<String, Value>,
    statics: HashSet<String>,
    prototype: Option<ObjectId>,
}

impl Instance {
    /// Build an instance from a property list, applying the construction
    /// special cases:
    ///
    /// - a key starting with [`STATIC_MARKER`] is stored without the marker
    ///   and flagged static;
    /// - a key named `prototype` holding an object sets the prototype
    ///   reference instead of a property;
    /// - purely numeric keys and a key named `properties` are ignored.
    ///
    /// Methods are stored unbound; the factory binds them once the
    /// instance has a handle.
    pub fn new<K, I>(properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut instance = Self::default();
        for (key, value) in properties {
            let key = key.into();
            if is_numeric_key(&key) || key == reserved::PROPERTIES {
                continue;
            }
            if let Some(stripped) = key.strip_prefix(STATIC_MARKER) {
                instance.statics.insert(stripped.to_string());
                instance.properties.insert(stripped.to_string(), value);
            } else if key == reserved::PROTOTYPE {
                if let Value::Object(id) = value {
                    instance.prototype = Some(id);
                }
            } else {
                instance.properties.insert(key, value);
            }
        }
        instance
    }

    #[inline]
    pub fn prototype(&self) -> Option<ObjectId> {
        self.prototype
    }

    /// Used by the factory when extending: the given prototype wins over
    /// any `prototype` entry the property list carried.
    pub(crate) fn force_prototype(&mut self, prototype: ObjectId) {
        self.prototype = Some(prototype);
    }

    pub fn get_own(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    #[inline]
    pub fn has_own(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Insert or replace an own property. Replacing keeps the original
    /// insertion position, matching the enumeration order contract.
    pub fn insert_own(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }

    /// Remove an own property and its static flag. Returns whether a
    /// property was actually removed.
    pub fn remove_own(&mut self, name: &str) -> bool {
        self.statics.remove(name);
        self.properties.shift_remove(name).is_some()
    }

    #[inline]
    pub fn is_static(&self, name: &str) -> bool {
        self.statics.contains(name)
    }

    pub fn mark_static(&mut self, name: &str) {
        self.statics.insert(name.to_string());
    }

    pub fn own_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn own_len(&self) -> usize {
        self.properties.len()
    }

    /// Bind every non-static method property to `owner`. Static methods
    /// stay unbound; they receive the caller as an explicit argument at
    /// dispatch time instead.
    pub(crate) fn bind_all(&mut self, owner: ObjectId) {
        for (name, value) in self.properties.iter_mut() {
            if self.statics.contains(name) {
                continue;
            }
            if let Value::Method(m) = value {
                *value = Value::Method(m.bind(owner));
            }
        }
    }
}

fn is_numeric_key(key: &str) -> bool {
    !key.is_empty() && key.parse::<f64>().is_ok()
}
