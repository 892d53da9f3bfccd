//! Service identification keys.
//!
//! [`ServiceKey`] is the canonical identity of a service within a container.
//! It replaces name-string lookups with a stable [`TypeId`] token while
//! keeping the human-readable type name around for diagnostics.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use horreum_support::rendering::shorten_type_name;

/// Canonical identity of a service type.
///
/// By convention the key of a service is the key of its *retrievable* type:
/// a concrete struct, an `Arc<Concrete>`, or `Arc<dyn Trait>` for
/// interface-shaped services.
///
/// # Examples
/// ```
/// use horreum_container::key::ServiceKey;
///
/// let key = ServiceKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.short_name(), "String");
/// ```
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    /// Creates the key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name with path prefixes stripped, for display.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.type_name)
    }
}

// Errors and event ids rely on the full name being printed here.
impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repository;

    trait Marker {}

    #[test]
    fn key_of_type() {
        let key = ServiceKey::of::<Repository>();
        assert!(key.type_name().contains("Repository"));
        assert_eq!(key.short_name(), "Repository");
    }

    #[test]
    fn key_equality_same_type() {
        assert_eq!(ServiceKey::of::<String>(), ServiceKey::of::<String>());
    }

    #[test]
    fn key_inequality_different_types() {
        assert_ne!(ServiceKey::of::<String>(), ServiceKey::of::<i32>());
    }

    #[test]
    fn unsized_type_key() {
        let key = ServiceKey::of::<dyn Marker>();
        assert_ne!(key, ServiceKey::of::<Repository>());
    }

    #[test]
    fn key_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ServiceKey::of::<String>(), "string");
        map.insert(ServiceKey::of::<i32>(), "i32");
        assert_eq!(map.get(&ServiceKey::of::<String>()), Some(&"string"));
        assert_eq!(map.get(&ServiceKey::of::<bool>()), None);
    }
}
