//! The per-type resolution record.
//!
//! A [`Binding`] owns the resolution strategy for exactly one declared
//! service key: a target normalized into a factory, an optional memoized
//! instance, a singleton flag, explicit injection parameters, and an ordered
//! preparator pipeline run over every freshly produced instance.
//!
//! Bindings do not hold a reference back to their container; every operation
//! that needs the registry takes it as an argument. Registry locks are never
//! held across factory invocation, and a per-binding construction lock makes
//! shared construction at-most-once under concurrent first access.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::container::Container;
use crate::error::{HorreumError, Result};
use crate::events::{EventCallback, EventToken};
use crate::instance::{AnyValue, Instance, Params};
use crate::key::ServiceKey;

/// Factory closure: produces an instance on demand, or legitimately nothing.
///
/// The binding's injection parameters are passed through on every call.
pub type FactoryFn =
    Arc<dyn Fn(&Container, &Params) -> Result<Option<Instance>> + Send + Sync>;

/// Post-construction hook; may transform or replace the instance.
pub type Preparator = Arc<dyn Fn(Instance, &Container) -> Instance + Send + Sync>;

/// What a binding should resolve to.
pub enum Target {
    /// The bound key itself names the class to construct.
    Type,
    /// Another class identity, constructed through its blueprint — or, when
    /// a different binding for that identity already exists at bind time,
    /// delegated to it.
    Class(ServiceKey),
    /// An explicit factory closure.
    Factory(FactoryFn, &'static Location<'static>),
    /// An already-built instance, adopted directly.
    Instance(Instance),
}

impl Target {
    /// Wraps a factory closure, recording the caller's source location for
    /// binding descriptions.
    #[track_caller]
    pub fn factory(
        factory: impl Fn(&Container, &Params) -> Result<Option<Instance>> + Send + Sync + 'static,
    ) -> Self {
        Self::Factory(Arc::new(factory), Location::caller())
    }
}

impl From<ServiceKey> for Target {
    fn from(class: ServiceKey) -> Self {
        Self::Class(class)
    }
}

impl From<Instance> for Target {
    fn from(instance: Instance) -> Self {
        Self::Instance(instance)
    }
}

/// The recorded, normalized target of a binding.
#[derive(Clone, Debug)]
pub enum TargetKind {
    Class(ServiceKey),
    Factory(&'static Location<'static>),
}

struct StoredFactory {
    produce: FactoryFn,
}

/// Resolution record for one declared service key.
pub struct Binding {
    key: ServiceKey,
    alias: RwLock<Option<String>>,
    target: RwLock<Option<TargetKind>>,
    factory: RwLock<Option<StoredFactory>>,
    shared: AtomicBool,
    instance: RwLock<Option<Instance>>,
    construction: Mutex<()>,
    preparators: RwLock<Vec<Preparator>>,
    params: RwLock<Params>,
}

impl Binding {
    /// Creates a binding and normalizes its target. `auto_alias` consults
    /// the container's auto-aliasers; temporary and group-child bindings
    /// pass `false`.
    pub(crate) fn new(
        container: &Container,
        key: ServiceKey,
        target: Target,
        auto_alias: bool,
    ) -> Result<Arc<Self>> {
        let binding = Arc::new(Self {
            key,
            alias: RwLock::new(None),
            target: RwLock::new(None),
            factory: RwLock::new(None),
            shared: AtomicBool::new(false),
            instance: RwLock::new(None),
            construction: Mutex::new(()),
            preparators: RwLock::new(Vec::new()),
            params: RwLock::new(Params::new()),
        });

        binding.set_target(container, target)?;

        if auto_alias {
            if let Some(alias) = container.auto_alias(&key) {
                binding.set_alias(container, &alias)?;
            }
        }

        Ok(binding)
    }

    /// The declared service key. Immutable for the binding's lifetime.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    // ── Target & factory ──

    /// Normalizes and adopts a new target.
    ///
    /// A class target must be constructible: either a blueprint for it is
    /// registered, or (when it differs from the bound key) another binding
    /// for it already exists, in which case resolution delegates to that
    /// binding. The delegate-vs-build decision is captured here, at bind
    /// time; bindings registered for the class later are not linked.
    pub fn set_target(&self, container: &Container, target: Target) -> Result<()> {
        match target {
            Target::Type => self.set_class_target(container, self.key),
            Target::Class(class) => self.set_class_target(container, class),
            Target::Factory(produce, location) => {
                *self.target.write() = Some(TargetKind::Factory(location));
                self.adopt_factory(container, produce)
            }
            Target::Instance(instance) => {
                let class = instance.class();
                self.set_instance(container, instance)?;
                *self.target.write() = Some(TargetKind::Class(class));

                // Keep a rebuild path for a forgotten instance when the
                // class is constructible.
                if container.has_blueprint(&class) {
                    self.adopt_factory(container, build_factory(class))?;
                }

                Ok(())
            }
        }
    }

    fn set_class_target(&self, container: &Container, class: ServiceKey) -> Result<()> {
        let delegate = class != self.key && container.has_binding(&class);

        if !delegate && !container.has_blueprint(&class) {
            return Err(HorreumError::invalid_argument_with(
                format!(
                    "binding target for {} cannot be converted to a factory",
                    self.key
                ),
                class.type_name(),
            ));
        }

        *self.target.write() = Some(TargetKind::Class(class));

        let produce: FactoryFn = if delegate {
            trace!(key = %self.key, class = %class, "Delegating to existing binding");
            Arc::new(move |c: &Container, _params: &Params| c.get_binding_key(&class)?.instance(c))
        } else {
            build_factory(class)
        };

        self.adopt_factory(container, produce)
    }

    /// Replaces the factory with an explicit closure, firing the
    /// "rebinding" notification when one was already in place.
    #[track_caller]
    pub fn set_factory(
        &self,
        container: &Container,
        factory: impl Fn(&Container, &Params) -> Result<Option<Instance>> + Send + Sync + 'static,
    ) -> Result<()> {
        *self.target.write() = Some(TargetKind::Factory(Location::caller()));
        self.adopt_factory(container, Arc::new(factory))
    }

    fn adopt_factory(&self, container: &Container, produce: FactoryFn) -> Result<()> {
        let previous = self.factory.write().replace(StoredFactory { produce });

        if previous.is_some() {
            container.trigger_after_rebinding_with(&self.key, || self.instance(container))?;
        }

        Ok(())
    }

    /// The recorded target, when one is set.
    pub fn target(&self) -> Option<TargetKind> {
        self.target.read().clone()
    }

    // ── Alias ──

    /// Registers a secondary lookup name with the container.
    pub fn set_alias(&self, container: &Container, alias: &str) -> Result<()> {
        register_alias_for(container, self.key, &self.alias, alias)
    }

    /// The current alias, when one is set.
    pub fn alias(&self) -> Option<String> {
        self.alias.read().clone()
    }

    pub fn has_alias(&self) -> bool {
        self.alias.read().is_some()
    }

    /// Unregisters the alias with the container.
    pub fn remove_alias(&self, container: &Container) {
        remove_alias_for(container, &self.alias);
    }

    // ── Shared flag ──

    pub fn is_shared(&self) -> bool {
        self.shared.load(Ordering::Acquire)
    }

    /// Marks the binding as a singleton: the first produced instance is
    /// cached and reused.
    pub fn set_shared(&self, shared: bool) -> &Self {
        self.shared.store(shared, Ordering::Release);
        self
    }

    // ── Preparators ──

    /// Appends a preparator; registration order is execution order.
    pub fn prepare_with(
        &self,
        preparator: impl Fn(Instance, &Container) -> Instance + Send + Sync + 'static,
    ) -> &Self {
        self.preparators.write().push(Arc::new(preparator));
        self
    }

    pub fn has_preparators(&self) -> bool {
        !self.preparators.read().is_empty()
    }

    pub fn clear_preparators(&self) -> &Self {
        self.preparators.write().clear();
        self
    }

    // ── Injection parameters ──

    /// Adds one named argument override.
    pub fn inject<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) -> &Self {
        self.params.write().insert(name, value);
        self
    }

    pub fn inject_value(&self, name: impl Into<String>, value: AnyValue) -> &Self {
        self.params.write().insert_value(name, value);
        self
    }

    pub fn param_value(&self, name: &str) -> Option<AnyValue> {
        self.params.read().get(name).cloned()
    }

    /// The named override, cloned out as `T`.
    pub fn param_as<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.params.read().get_as(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.read().contains(name)
    }

    pub fn remove_param(&self, name: &str) -> &Self {
        self.params.write().remove(name);
        self
    }

    pub fn clear_params(&self) -> &Self {
        self.params.write().clear();
        self
    }

    /// Merges a set of overrides in.
    pub fn add_params(&self, params: &Params) -> &Self {
        self.params.write().merge(params);
        self
    }

    // ── Instances ──

    /// Adopts `instance` as the permanent cached instance, discarding any
    /// pending target and factory.
    ///
    /// # Errors
    /// [`HorreumError::Logic`] when the instance does not satisfy the bound
    /// key.
    pub fn set_instance(&self, container: &Container, instance: Instance) -> Result<()> {
        if !instance.satisfies(&self.key) {
            return Err(HorreumError::logic_with(
                format!("binding instance does not implement type {}", self.key),
                instance.class().type_name(),
            ));
        }

        *self.target.write() = None;
        *self.factory.write() = None;

        let prepared = self.prepare_instance(container, instance);
        *self.instance.write() = Some(prepared);
        Ok(())
    }

    /// Clears the cached instance only; target and factory remain, so the
    /// next resolution rebuilds. Fires no event.
    pub fn forget_instance(&self) -> &Self {
        self.instance.write().take();
        self
    }

    pub fn has_instance(&self) -> bool {
        self.instance.read().is_some()
    }

    /// Returns the cached instance or produces one, memoizing it when the
    /// binding is shared. A factory's legitimate "no instance" result is
    /// passed through as `None`.
    pub fn instance(&self, container: &Container) -> Result<Option<Instance>> {
        if let Some(existing) = self.instance.read().clone() {
            return Ok(Some(existing));
        }

        if !self.is_shared() {
            return self.new_instance(container);
        }

        // At-most-once construction for shared bindings. The lock is
        // per-binding, so unrelated types never serialize.
        let _guard = self.construction.lock();

        if let Some(existing) = self.instance.read().clone() {
            return Ok(Some(existing));
        }

        let built = self.new_instance(container)?;

        if let Some(ref instance) = built {
            *self.instance.write() = Some(instance.clone());
        }

        Ok(built)
    }

    /// Invokes the factory and runs the product through the preparators,
    /// ignoring any cached instance.
    pub fn new_instance(&self, container: &Container) -> Result<Option<Instance>> {
        let produce = {
            let factory = self.factory.read();
            factory.as_ref().map(|stored| Arc::clone(&stored.produce))
        };

        let produce = produce.ok_or_else(|| {
            HorreumError::runtime(format!(
                "binding for {} has no factory to produce an instance",
                self.key
            ))
        })?;

        let params = self.params.read().clone();

        match produce(container, &params)? {
            Some(raw) => Ok(Some(self.prepare_instance(container, raw))),
            None => Ok(None),
        }
    }

    /// Folds the preparators over `instance` in registration order. A
    /// replacement that does not satisfy the bound key is discarded in
    /// favor of the pre-call value. Fires the "resolving" notification.
    fn prepare_instance(&self, container: &Container, mut instance: Instance) -> Instance {
        let preparators: Vec<Preparator> = self.preparators.read().to_vec();

        for preparator in preparators {
            let candidate = preparator(instance.clone(), container);

            if candidate.satisfies(&self.key) {
                instance = candidate;
            } else {
                debug!(
                    key = %self.key,
                    produced = candidate.class().type_name(),
                    "Preparator returned wrong type, keeping previous instance"
                );
            }
        }

        container.trigger_after_resolving(&self.key, &instance);
        instance
    }

    /// The singular instance wrapped in a one-element sequence, for uniform
    /// handling alongside groups. A factory yielding nothing gives an empty
    /// sequence.
    pub fn group_instances(&self, container: &Container) -> Result<Vec<Instance>> {
        Ok(self.instance(container)?.into_iter().collect())
    }

    // ── Introspection ──

    /// One-line human description of how this binding resolves.
    pub fn describe_instance(&self) -> String {
        let mut output = if self.is_shared() {
            String::from("* ")
        } else {
            String::new()
        };

        if let Some(instance) = self.instance.read().as_ref() {
            output.push_str(&format!("instance : {}", instance.class().short_name()));
        } else {
            match self.target.read().as_ref() {
                Some(TargetKind::Class(class)) => {
                    output.push_str(&format!("type : {}", class.short_name()));
                }
                Some(TargetKind::Factory(location)) => {
                    output.push_str(&format!(
                        "factory @ {} : {}",
                        location.file(),
                        location.line()
                    ));
                }
                None => output.push_str("null"),
            }
        }

        output
    }

    /// Description list, for uniform handling alongside groups.
    pub fn describe_instances(&self) -> Vec<String> {
        vec![self.describe_instance()]
    }

    // ── Event conveniences ──

    /// Registers a handler for this binding's "resolving" notifications.
    pub fn after_resolving(&self, container: &Container, callback: EventCallback) -> EventToken {
        container.after_resolving_key(&self.key, callback)
    }

    /// Registers a handler for this binding's "rebinding" notifications.
    pub fn after_rebinding(&self, container: &Container, callback: EventCallback) -> EventToken {
        container.after_rebinding_key(&self.key, callback)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("shared", &self.is_shared())
            .field("resolved", &self.has_instance())
            .finish()
    }
}

/// Factory asking the container to construct `class` through its blueprint,
/// with the binding's params as argument overrides.
fn build_factory(class: ServiceKey) -> FactoryFn {
    Arc::new(move |container: &Container, params: &Params| {
        container.build_instance(&class, params, &[]).map(Some)
    })
}

/// Shared alias registration used by single bindings and groups.
pub(crate) fn register_alias_for(
    container: &Container,
    key: ServiceKey,
    slot: &RwLock<Option<String>>,
    alias: &str,
) -> Result<()> {
    if alias.contains("::") {
        return Err(HorreumError::invalid_argument_with(
            "aliases must not contain the :: separator",
            alias,
        ));
    }

    if slot.read().as_deref() == Some(alias) {
        return Ok(());
    }

    if container.has_alias(alias) && container.aliased_type(alias) != Some(key) {
        return Err(HorreumError::logic_with(
            format!("alias \"{alias}\" has already been bound"),
            alias,
        ));
    }

    // Drop the slot guard before touching the registry; the registry lock
    // may be held while this slot is read.
    let previous = slot.write().replace(alias.to_string());
    if let Some(previous) = previous {
        container.unregister_alias(&previous);
    }

    container.register_alias(key, alias);
    Ok(())
}

pub(crate) fn remove_alias_for(container: &Container, slot: &RwLock<Option<String>>) {
    let previous = slot.write().take();
    if let Some(previous) = previous {
        container.unregister_alias(&previous);
    }
}
