//! Deferred service registrars.
//!
//! A [`Provider`] bundles related registrations and defers them: the
//! container records which keys the provider claims, and the registrar runs
//! only when one of those keys is first looked up. Bootstrap code can hand
//! the container dozens of providers without paying for services nobody
//! asks for.

use std::any::type_name;

use crate::container::Container;
use crate::error::Result;
use crate::key::ServiceKey;

/// A module of related service registrations, invoked lazily.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use horreum_container::binding::Target;
/// use horreum_container::container::Container;
/// use horreum_container::instance::Instance;
/// use horreum_container::key::ServiceKey;
/// use horreum_container::provider::Provider;
///
/// struct StorageProvider;
///
/// impl Provider for StorageProvider {
///     fn provided_services(&self) -> Vec<ServiceKey> {
///         vec![ServiceKey::of::<String>()]
///     }
///
///     fn register_services(&self, container: &Container) -> horreum_container::error::Result<()> {
///         container.bind_shared::<String>(Target::Instance(Instance::of(
///             String::from("postgres://localhost"),
///         )))?;
///         Ok(())
///     }
/// }
///
/// let container = Container::new();
/// container.register_provider(Arc::new(StorageProvider));
/// assert!(container.has::<String>());
/// let url: String = container.get().unwrap();
/// assert_eq!(url, "postgres://localhost");
/// ```
pub trait Provider: Send + Sync {
    /// Every key this provider will register. The container clears all of
    /// them from its pending set once the registrar has run.
    fn provided_services(&self) -> Vec<ServiceKey>;

    /// Performs the actual registrations. Called at most once per
    /// container, on first lookup of a provided key.
    fn register_services(&self, container: &Container) -> Result<()>;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyProvider;

    impl Provider for EmptyProvider {
        fn provided_services(&self) -> Vec<ServiceKey> {
            Vec::new()
        }

        fn register_services(&self, _container: &Container) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn provider_has_default_name() {
        assert!(EmptyProvider.name().contains("EmptyProvider"));
    }
}
