use std::fmt;
use std::sync::Arc;

use crate::{ObjectId, Runtime};

/// Native function backing a method property.
///
/// `receiver` is the value the method is currently bound to: an object
/// reference for bound methods, [`Value::Null`] for unbound (static) ones.
pub type NativeFn = Arc<dyn Fn(&Runtime, Value, &[Value]) -> Value + Send + Sync>;

/// A callable property value: a shared native function plus an optional
/// bound receiver. Binding never copies the function, only the handle.
#[derive(Clone)]
pub struct Method {
    func: NativeFn,
    receiver: Option<ObjectId>,
}

impl Method {
    /// Wrap a native function as an unbound method.
    pub fn new(func: NativeFn) -> Self {
        Self {
            func,
            receiver: None,
        }
    }

    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&Runtime, Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self::new(Arc::new(func))
    }

    /// Copy of this method bound to `owner`. The previous binding, if any,
    /// is replaced.
    pub fn bind(&self, owner: ObjectId) -> Self {
        Self {
            func: self.func.clone(),
            receiver: Some(owner),
        }
    }

    #[inline]
    pub fn receiver(&self) -> Option<ObjectId> {
        self.receiver
    }

    #[inline]
    pub fn receiver_value(&self) -> Value {
        match self.receiver {
            Some(id) => Value::Object(id),
            None => Value::Null,
        }
    }

    pub fn invoke(&self, runtime: &Runtime, args: &[Value]) -> Value {
        (self.func)(runtime, self.receiver_value(), args)
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func) && self.receiver == other.receiver
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.receiver {
            Some(id) => write!(f, "Method(bound {id})"),
            None => write!(f, "Method(unbound)"),
        }
    }
}

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(ObjectId),
    Method(Method),
}

impl Value {
    pub fn method<F>(func: F) -> Self
    where
        F: Fn(&Runtime, Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Method(Method::from_fn(func))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_method(&self) -> bool {
        matches!(self, Value::Method(_))
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Value::Method(m) => Some(m),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(id) => write!(f, "<object {id}>"),
            Value::Method(_) => write!(f, "<method>"),
        }
    }
}
