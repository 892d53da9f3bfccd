//! Boundary collaborators for autowired construction.
//!
//! The registry itself stays free of parameter-resolution policy: an
//! [`ArgumentBinder`] turns a declared parameter list plus explicit
//! overrides into positional arguments, and a [`NameResolver`] maps an
//! abstract key to a conventional concrete class as the last resort of
//! lookup. Both are injected, so hosts can swap in generated or
//! configuration-driven strategies.

use tracing::trace;

use crate::blueprint::ParamSpec;
use crate::container::Container;
use crate::error::{ErrorKind, HorreumError, Result};
use crate::instance::{AnyValue, Params};
use crate::key::ServiceKey;

/// Resolves a declared parameter list into positional arguments.
pub trait ArgumentBinder: Send + Sync {
    /// Produces one argument per spec, in order.
    ///
    /// # Errors
    /// [`HorreumError::Logic`] when a required parameter cannot be
    /// satisfied; lookup errors from recursive resolution pass through.
    fn resolve_parameters(
        &self,
        params: &[ParamSpec],
        overrides: &Params,
        container: &Container,
    ) -> Result<Vec<AnyValue>>;
}

/// Maps an abstract service key to a conventional concrete class identity.
///
/// Consulted only when lookup has exhausted bindings, aliases, providers
/// and the container's own key. A hit is bound shared and memoized, so the
/// resolver is asked at most once per key.
pub trait NameResolver: Send + Sync {
    fn try_resolve(&self, key: &ServiceKey) -> Option<ServiceKey>;
}

/// Default binder: override by name, then container lookup for service
/// parameters (declared default softens a failed lookup), then declared
/// default, then failure naming the parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutowireBinder;

impl ArgumentBinder for AutowireBinder {
    fn resolve_parameters(
        &self,
        params: &[ParamSpec],
        overrides: &Params,
        container: &Container,
    ) -> Result<Vec<AnyValue>> {
        let mut args = Vec::with_capacity(params.len());

        for spec in params {
            if let Some(value) = overrides.get(spec.name()) {
                trace!(param = spec.name(), "Using explicit override");
                args.push(value.clone());
                continue;
            }

            if let Some(service) = spec.service_key() {
                match container.get_instance(service) {
                    Ok(instance) => {
                        let value = instance.value_for(service).ok_or_else(|| {
                            HorreumError::logic(format!(
                                "resolved instance for parameter `{}` does not satisfy {service}",
                                spec.name()
                            ))
                        })?;
                        args.push(value);
                        continue;
                    }
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        if let Some(default) = spec.default_value() {
                            trace!(param = spec.name(), "Lookup failed, using declared default");
                            args.push(default);
                            continue;
                        }
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                }
            }

            if let Some(default) = spec.default_value() {
                args.push(default);
                continue;
            }

            return Err(HorreumError::logic(format!(
                "binding param `{}` cannot be resolved",
                spec.name()
            )));
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Target;

    #[test]
    fn override_beats_everything() {
        let container = Container::new();
        container
            .bind_shared::<String>(Target::Instance(crate::instance::Instance::of(String::from(
                "bound",
            ))))
            .unwrap();

        let params = vec![ParamSpec::service::<String>("name")];
        let overrides = Params::new().with("name", String::from("explicit"));

        let args = AutowireBinder
            .resolve_parameters(&params, &overrides, &container)
            .unwrap();
        assert_eq!(args[0].downcast_ref::<String>().unwrap(), "explicit");
    }

    #[test]
    fn service_param_resolves_recursively() {
        let container = Container::new();
        container
            .bind_shared::<u32>(Target::Instance(crate::instance::Instance::of(7u32)))
            .unwrap();

        let params = vec![ParamSpec::service::<u32>("port")];
        let args = AutowireBinder
            .resolve_parameters(&params, &Params::new(), &container)
            .unwrap();
        assert_eq!(args[0].downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn optional_service_falls_back_to_default() {
        let container = Container::new();
        let params = vec![ParamSpec::service_or::<u32, _>("port", || 8080)];

        let args = AutowireBinder
            .resolve_parameters(&params, &Params::new(), &container)
            .unwrap();
        assert_eq!(args[0].downcast_ref::<u32>(), Some(&8080));
    }

    #[test]
    fn required_service_propagates_not_found() {
        let container = Container::new();
        let params = vec![ParamSpec::service::<u32>("port")];

        let err = AutowireBinder
            .resolve_parameters(&params, &Params::new(), &container)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn value_param_uses_declared_default() {
        let container = Container::new();
        let params = vec![ParamSpec::value_or("limit", || 25usize)];

        let args = AutowireBinder
            .resolve_parameters(&params, &Params::new(), &container)
            .unwrap();
        assert_eq!(args[0].downcast_ref::<usize>(), Some(&25));
    }

    #[test]
    fn unresolvable_param_is_a_logic_error() {
        let container = Container::new();
        let params = vec![ParamSpec::value("limit")];

        let err = AutowireBinder
            .resolve_parameters(&params, &Params::new(), &container)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert!(format!("{err}").contains("limit"));
    }
}
