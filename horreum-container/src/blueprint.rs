//! Constructor blueprints.
//!
//! A [`Blueprint`] is the declared constructor metadata for one concrete
//! class: its parameter list, a constructor closure over the resolved
//! positional arguments, and the capability casts its products carry. It is
//! what reflection hands a dynamic-language container for free; here the
//! application declares it once, and the container's class-identity targets
//! and autowiring run off it.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::error::{HorreumError, Result};
use crate::instance::{AnyValue, CastFn, Instance};
use crate::key::ServiceKey;

/// Thunk producing a parameter's default value.
pub type DefaultFn = Arc<dyn Fn() -> AnyValue + Send + Sync>;

/// One declared constructor parameter.
///
/// Resolution order (applied by the argument binder): explicit override by
/// name, then recursive container lookup when a service key is declared,
/// then the default thunk, then failure naming the parameter.
#[derive(Clone)]
pub struct ParamSpec {
    name: &'static str,
    service: Option<ServiceKey>,
    default: Option<DefaultFn>,
}

impl ParamSpec {
    /// A required parameter resolved from the container as `D`.
    pub fn service<D: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            service: Some(ServiceKey::of::<D>()),
            default: None,
        }
    }

    /// A parameter resolved from the container as `D`, falling back to
    /// `default` when the lookup finds nothing.
    pub fn service_or<D, F>(name: &'static str, default: F) -> Self
    where
        D: Clone + Send + Sync + 'static,
        F: Fn() -> D + Send + Sync + 'static,
    {
        Self {
            name,
            service: Some(ServiceKey::of::<D>()),
            default: Some(Arc::new(move || Arc::new(default()) as AnyValue)),
        }
    }

    /// A plain value parameter with no default; it must be overridden.
    pub fn value(name: &'static str) -> Self {
        Self {
            name,
            service: None,
            default: None,
        }
    }

    /// A plain value parameter with a declared default.
    pub fn value_or<T, F>(name: &'static str, default: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name,
            service: None,
            default: Some(Arc::new(move || Arc::new(default()) as AnyValue)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The service key to resolve this parameter from, when declared.
    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.service.as_ref()
    }

    pub fn default_value(&self) -> Option<AnyValue> {
        self.default.as_ref().map(|thunk| thunk())
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Positional arguments produced by the argument binder, in declared
/// parameter order.
pub struct ResolvedArgs {
    values: Vec<AnyValue>,
}

impl ResolvedArgs {
    pub fn new(values: Vec<AnyValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Clones argument `index` out as `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            HorreumError::logic(format!(
                "constructor argument #{index} was not resolved ({} available)",
                self.values.len()
            ))
        })?;

        value.downcast_ref::<T>().cloned().ok_or_else(|| {
            HorreumError::logic(format!(
                "constructor argument #{index} is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

type MakeFn = Arc<dyn Fn(&ResolvedArgs) -> Result<AnyValue> + Send + Sync>;

/// Declared constructor metadata for one concrete class.
pub struct Blueprint {
    key: ServiceKey,
    params: Vec<ParamSpec>,
    make: MakeFn,
    casts: Arc<HashMap<ServiceKey, CastFn>>,
}

impl Blueprint {
    /// Starts a blueprint for the concrete type `T`.
    ///
    /// ```
    /// use horreum_container::blueprint::{Blueprint, ParamSpec};
    ///
    /// struct Greeting {
    ///     text: String,
    /// }
    ///
    /// let blueprint = Blueprint::of::<Greeting>()
    ///     .param(ParamSpec::value_or("text", || String::from("hello")))
    ///     .constructor(|args| Ok(Greeting { text: args.get(0)? }));
    /// assert_eq!(blueprint.params().len(), 1);
    /// ```
    pub fn of<T: Send + Sync + 'static>() -> BlueprintBuilder<T> {
        BlueprintBuilder {
            params: Vec::new(),
            casts: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// The concrete class identity this blueprint constructs.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Runs the constructor over resolved arguments and wraps the product
    /// with this blueprint's class identity and capability set.
    pub fn produce(&self, args: &ResolvedArgs) -> Result<Instance> {
        trace!(class = %self.key, args = args.len(), "Constructing from blueprint");
        let value = (self.make)(args)?;
        Ok(Instance::from_parts(
            value,
            self.key,
            Arc::clone(&self.casts),
        ))
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("key", &self.key)
            .field("params", &self.params)
            .field("capabilities", &self.casts.len())
            .finish()
    }
}

/// Fluent construction of a [`Blueprint`].
pub struct BlueprintBuilder<T> {
    params: Vec<ParamSpec>,
    casts: HashMap<ServiceKey, CastFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> BlueprintBuilder<T> {
    /// Appends a declared parameter; order is argument order.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Declares that constructed values also satisfy `I`.
    pub fn implements<I>(mut self, cast: impl Fn(&T) -> I + Send + Sync + 'static) -> Self
    where
        I: Clone + Send + Sync + 'static,
    {
        self.casts.insert(
            ServiceKey::of::<I>(),
            Arc::new(move |value: &AnyValue| {
                value
                    .downcast_ref::<T>()
                    .map(|concrete| Arc::new(cast(concrete)) as AnyValue)
            }),
        );
        self
    }

    /// Finishes the blueprint with its constructor closure.
    pub fn constructor(
        self,
        make: impl Fn(&ResolvedArgs) -> Result<T> + Send + Sync + 'static,
    ) -> Blueprint {
        Blueprint {
            key: ServiceKey::of::<T>(),
            params: self.params,
            make: Arc::new(move |args| Ok(Arc::new(make(args)?) as AnyValue)),
            casts: Arc::new(self.casts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Port: Send + Sync {
        fn number(&self) -> u16;
    }

    #[derive(Clone)]
    struct FixedPort(u16);

    impl Port for FixedPort {
        fn number(&self) -> u16 {
            self.0
        }
    }

    #[test]
    fn produce_wraps_with_class_identity() {
        let blueprint = Blueprint::of::<FixedPort>()
            .param(ParamSpec::value_or("port", || 8080u16))
            .constructor(|args| Ok(FixedPort(args.get(0)?)));

        let args = ResolvedArgs::new(vec![Arc::new(9090u16) as AnyValue]);
        let instance = blueprint.produce(&args).unwrap();

        assert_eq!(instance.class(), ServiceKey::of::<FixedPort>());
        assert_eq!(instance.extract::<FixedPort>().unwrap().0, 9090);
    }

    #[test]
    fn produce_attaches_capabilities() {
        let blueprint = Blueprint::of::<FixedPort>()
            .implements::<Arc<dyn Port>>(|p| Arc::new(p.clone()))
            .constructor(|_| Ok(FixedPort(443)));

        let instance = blueprint.produce(&ResolvedArgs::new(vec![])).unwrap();
        assert!(instance.satisfies(&ServiceKey::of::<Arc<dyn Port>>()));

        let port: Arc<dyn Port> = instance.extract().unwrap();
        assert_eq!(port.number(), 443);
    }

    #[test]
    fn resolved_args_type_mismatch() {
        let args = ResolvedArgs::new(vec![Arc::new(1u8) as AnyValue]);
        let err = args.get::<String>(0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Logic);
    }

    #[test]
    fn resolved_args_missing_index() {
        let args = ResolvedArgs::new(vec![]);
        assert!(args.get::<u8>(0).is_err());
    }

    #[test]
    fn param_spec_defaults() {
        let spec = ParamSpec::value_or("limit", || 10usize);
        assert!(spec.has_default());
        let value = spec.default_value().unwrap();
        assert_eq!(value.downcast_ref::<usize>(), Some(&10));

        let required = ParamSpec::service::<String>("name");
        assert!(!required.has_default());
        assert_eq!(required.service_key(), Some(&ServiceKey::of::<String>()));
    }
}
