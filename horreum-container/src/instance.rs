//! Type-erased service instances and injection parameters.
//!
//! Dynamic-language containers lean on `instanceof` to check that whatever a
//! factory produced satisfies the bound type. Here an [`Instance`] carries an
//! explicit capability set instead: the runtime class identity of the wrapped
//! value plus one upcast closure per abstract key the value satisfies. A
//! value built as `FileLogger` can therefore be checked against, and
//! extracted as, `Arc<dyn Logger>` without the registry knowing either type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::key::ServiceKey;

/// Shared, type-erased value. Everything the container hands around —
/// instances, injection parameters, resolved arguments — is one of these.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Upcast from a concrete erased value to one of its capability types.
pub type CastFn = Arc<dyn Fn(&AnyValue) -> Option<AnyValue> + Send + Sync>;

/// A produced service instance with its capability set.
#[derive(Clone)]
pub struct Instance {
    value: AnyValue,
    class: ServiceKey,
    casts: Arc<HashMap<ServiceKey, CastFn>>,
}

impl Instance {
    /// Wraps a concrete value. The recorded class is `T`; no additional
    /// capabilities are attached.
    pub fn of<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            class: ServiceKey::of::<T>(),
            casts: Arc::new(HashMap::new()),
        }
    }

    pub(crate) fn from_parts(
        value: AnyValue,
        class: ServiceKey,
        casts: Arc<HashMap<ServiceKey, CastFn>>,
    ) -> Self {
        Self { value, class, casts }
    }

    /// Declares that this instance also satisfies `I`, reachable through
    /// `cast` from the concrete value.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use horreum_container::instance::Instance;
    ///
    /// trait Greeter: Send + Sync {
    ///     fn hello(&self) -> String;
    /// }
    ///
    /// #[derive(Clone)]
    /// struct English;
    /// impl Greeter for English {
    ///     fn hello(&self) -> String { "hello".into() }
    /// }
    ///
    /// let instance = Instance::of(English)
    ///     .implementing::<English, Arc<dyn Greeter>>(|e| Arc::new(e.clone()));
    /// let greeter: Arc<dyn Greeter> = instance.extract().unwrap();
    /// assert_eq!(greeter.hello(), "hello");
    /// ```
    pub fn implementing<T, I>(mut self, cast: impl Fn(&T) -> I + Send + Sync + 'static) -> Self
    where
        T: Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
    {
        let casts = Arc::make_mut(&mut self.casts);
        casts.insert(
            ServiceKey::of::<I>(),
            Arc::new(move |value: &AnyValue| {
                value
                    .downcast_ref::<T>()
                    .map(|concrete| Arc::new(cast(concrete)) as AnyValue)
            }),
        );
        self
    }

    /// The runtime class identity of the wrapped value.
    pub fn class(&self) -> ServiceKey {
        self.class
    }

    /// Does this instance satisfy `key`? True for the class itself and for
    /// every registered capability.
    pub fn satisfies(&self, key: &ServiceKey) -> bool {
        self.class == *key || self.casts.contains_key(key)
    }

    /// The erased value viewed as `key`: the raw value when `key` is the
    /// class itself, otherwise the capability upcast.
    pub fn value_for(&self, key: &ServiceKey) -> Option<AnyValue> {
        if self.class == *key {
            return Some(Arc::clone(&self.value));
        }

        self.casts.get(key).and_then(|cast| cast(&self.value))
    }

    /// Clones the value out as `T`, directly or through a capability cast.
    pub fn extract<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        if let Some(concrete) = self.value.downcast_ref::<T>() {
            return Some(concrete.clone());
        }

        self.value_for(&ServiceKey::of::<T>())
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Borrows the value as `T` without cloning. Capability casts produce
    /// fresh values, so only the concrete class can be borrowed.
    pub fn downcast_ref<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Reference identity of the wrapped value, for memoization checks.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class)
            .field("capabilities", &self.casts.len())
            .finish()
    }
}

/// Named injection parameters: explicit argument overrides handed to a
/// binding's factory and to the argument binder.
///
/// Values are `Arc`-shared so the map survives repeated factory invocation.
#[derive(Clone, Default)]
pub struct Params {
    values: HashMap<String, AnyValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    ///
    /// ```
    /// use horreum_container::instance::Params;
    ///
    /// let params = Params::new().with("retries", 3u32).with("name", "db".to_string());
    /// assert_eq!(params.get_as::<u32>("retries"), Some(3));
    /// ```
    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: AnyValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AnyValue> {
        self.values.get(name)
    }

    /// Clones the named value out as `T`, when present and of that type.
    pub fn get_as<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.values
            .get(name)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<AnyValue> {
        self.values.remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Copies every entry of `other` in, overwriting same-named entries.
    pub fn merge(&mut self, other: &Params) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), Arc::clone(value));
        }
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Params").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {
        fn sides(&self) -> u32;
    }

    #[derive(Clone)]
    struct Square;

    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    #[test]
    fn instance_class_identity() {
        let instance = Instance::of(Square);
        assert_eq!(instance.class(), ServiceKey::of::<Square>());
        assert!(instance.satisfies(&ServiceKey::of::<Square>()));
        assert!(!instance.satisfies(&ServiceKey::of::<Arc<dyn Shape>>()));
    }

    #[test]
    fn capability_cast_extracts_interface() {
        let instance =
            Instance::of(Square).implementing::<Square, Arc<dyn Shape>>(|s| Arc::new(s.clone()));

        assert!(instance.satisfies(&ServiceKey::of::<Arc<dyn Shape>>()));

        let shape: Arc<dyn Shape> = instance.extract().unwrap();
        assert_eq!(shape.sides(), 4);
    }

    #[test]
    fn extract_concrete_value() {
        let instance = Instance::of(42u32);
        assert_eq!(instance.extract::<u32>(), Some(42));
        assert_eq!(instance.extract::<i32>(), None);
    }

    #[test]
    fn clone_shares_value() {
        let a = Instance::of(String::from("shared"));
        let b = a.clone();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn params_roundtrip() {
        let mut params = Params::new().with("url", String::from("postgres://localhost"));
        assert!(params.contains("url"));
        assert_eq!(
            params.get_as::<String>("url").as_deref(),
            Some("postgres://localhost")
        );

        params.remove("url");
        assert!(params.is_empty());
    }

    #[test]
    fn params_merge_overwrites() {
        let mut base = Params::new().with("x", 1i64);
        let update = Params::new().with("x", 2i64).with("y", 3i64);
        base.merge(&update);
        assert_eq!(base.get_as::<i64>("x"), Some(2));
        assert_eq!(base.get_as::<i64>("y"), Some(3));
        assert_eq!(base.len(), 2);
    }
}
