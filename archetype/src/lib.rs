mod arena;
mod instance;
mod lookup;
mod observe;
mod runtime;
mod value;

pub use arena::{Arena, ObjectId};
pub use instance::{Instance, STATIC_MARKER, reserved};
pub use lookup::{CacheEntry, PropertyCache};
pub use observe::{ObserverFn, ObserverId, Observers};
pub use runtime::{CallError, Runtime};
pub use value::{Method, NativeFn, Value};
