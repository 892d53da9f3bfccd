//! The service registry.
//!
//! A [`Container`] maps service keys to [`Registration`]s (single bindings
//! or groups), maintains the alias and deferred-provider indexes, owns the
//! event bus, and drives autowired construction through its injected
//! collaborators.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use horreum_container::container::Container;
//! use horreum_container::binding::Target;
//! use horreum_container::blueprint::Blueprint;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! #[derive(Clone)]
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//!
//! let container = Container::new();
//! container.register_blueprint(
//!     Blueprint::of::<ConsoleLogger>()
//!         .implements::<Arc<dyn Logger>>(|l| Arc::new(l.clone()))
//!         .constructor(|_| Ok(ConsoleLogger)),
//! );
//!
//! container
//!     .bind_shared::<Arc<dyn Logger>>(Target::Class(
//!         horreum_container::key::ServiceKey::of::<ConsoleLogger>(),
//!     ))
//!     .unwrap();
//!
//! let logger: Arc<dyn Logger> = container.get().unwrap();
//! logger.log("ready");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace};

use horreum_support::rendering::suggest_similar;

use crate::autowire::{ArgumentBinder, AutowireBinder, NameResolver};
use crate::binding::{Binding, Target};
use crate::blueprint::{Blueprint, ParamSpec, ResolvedArgs};
use crate::error::{HorreumError, NotFoundError, Result};
use crate::events::{EventCallback, EventToken, Events};
use crate::group::Group;
use crate::instance::{AnyValue, Instance, Params};
use crate::key::ServiceKey;
use crate::provider::Provider;

/// Generator of conventional aliases, consulted when bindings and provided
/// services are registered.
pub type AliaserFn = Arc<dyn Fn(&ServiceKey) -> Option<String> + Send + Sync>;

/// A registry entry: one binding, or an ordered group of them.
///
/// Modeling the two shapes as a sum keeps single-only operations
/// (`set_target`, `set_factory`, `set_instance`) off groups entirely — the
/// compiler rejects them instead of a runtime error.
#[derive(Clone)]
pub enum Registration {
    Single(Arc<Binding>),
    Group(Arc<Group>),
}

impl Registration {
    pub fn key(&self) -> ServiceKey {
        match self {
            Self::Single(binding) => binding.key(),
            Self::Group(group) => group.key(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// The single binding, when this entry is one.
    pub fn as_single(&self) -> Option<&Arc<Binding>> {
        match self {
            Self::Single(binding) => Some(binding),
            Self::Group(_) => None,
        }
    }

    /// The group, when this entry is one.
    pub fn as_group(&self) -> Option<&Arc<Group>> {
        match self {
            Self::Single(_) => None,
            Self::Group(group) => Some(group),
        }
    }

    /// Resolves an instance: the binding's own, or the first group child
    /// that yields one.
    pub fn instance(&self, container: &Container) -> Result<Option<Instance>> {
        match self {
            Self::Single(binding) => binding.instance(container),
            Self::Group(group) => group.instance(container).map(Some),
        }
    }

    /// Builds a fresh instance, bypassing caches.
    pub fn new_instance(&self, container: &Container) -> Result<Option<Instance>> {
        match self {
            Self::Single(binding) => binding.new_instance(container),
            Self::Group(group) => group.new_instance(container).map(Some),
        }
    }

    /// The group view: every available instance, in order.
    pub fn group_instances(&self, container: &Container) -> Result<Vec<Instance>> {
        match self {
            Self::Single(binding) => binding.group_instances(container),
            Self::Group(group) => group.group_instances(container),
        }
    }

    pub fn inject_value(&self, name: &str, value: AnyValue) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.inject_value(name, value);
            }
            Self::Group(group) => {
                group.inject_value(name, value);
            }
        }
        self
    }

    pub fn add_params(&self, params: &Params) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.add_params(params);
            }
            Self::Group(group) => {
                group.add_params(params);
            }
        }
        self
    }

    pub fn param_value(&self, name: &str) -> Option<AnyValue> {
        match self {
            Self::Single(binding) => binding.param_value(name),
            Self::Group(group) => group.param_value(name),
        }
    }

    pub fn has_param(&self, name: &str) -> bool {
        match self {
            Self::Single(binding) => binding.has_param(name),
            Self::Group(group) => group.has_param(name),
        }
    }

    pub fn remove_param(&self, name: &str) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.remove_param(name);
            }
            Self::Group(group) => {
                group.remove_param(name);
            }
        }
        self
    }

    pub fn clear_params(&self) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.clear_params();
            }
            Self::Group(group) => {
                group.clear_params();
            }
        }
        self
    }

    pub fn prepare_with(
        &self,
        preparator: impl Fn(Instance, &Container) -> Instance + Send + Sync + Clone + 'static,
    ) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.prepare_with(preparator);
            }
            Self::Group(group) => {
                group.prepare_with(preparator);
            }
        }
        self
    }

    pub fn has_preparators(&self) -> bool {
        match self {
            Self::Single(binding) => binding.has_preparators(),
            Self::Group(group) => group.has_preparators(),
        }
    }

    pub fn clear_preparators(&self) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.clear_preparators();
            }
            Self::Group(group) => {
                group.clear_preparators();
            }
        }
        self
    }

    pub fn forget_instance(&self) -> &Self {
        match self {
            Self::Single(binding) => {
                binding.forget_instance();
            }
            Self::Group(group) => {
                group.forget_instance();
            }
        }
        self
    }

    pub fn alias(&self) -> Option<String> {
        match self {
            Self::Single(binding) => binding.alias(),
            Self::Group(group) => group.alias(),
        }
    }

    pub fn set_alias(&self, container: &Container, alias: &str) -> Result<()> {
        match self {
            Self::Single(binding) => binding.set_alias(container, alias),
            Self::Group(group) => group.set_alias(container, alias),
        }
    }

    pub fn describe_instance(&self) -> String {
        match self {
            Self::Single(binding) => binding.describe_instance(),
            Self::Group(group) => group.describe_instance(),
        }
    }

    pub fn describe_instances(&self) -> Vec<String> {
        match self {
            Self::Single(binding) => binding.describe_instances(),
            Self::Group(group) => group.describe_instances(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(binding) => binding.fmt(f),
            Self::Group(group) => group.fmt(f),
        }
    }
}

// The binding, alias and provider maps form one mutual-exclusion domain:
// `bind`/`remove`/lookup all read-then-write across them. Guards are never
// held across factory invocation or user callbacks.
#[derive(Default)]
struct RegistryState {
    bindings: HashMap<ServiceKey, Registration>,
    aliases: HashMap<String, ServiceKey>,
    providers: HashMap<ServiceKey, Arc<dyn Provider>>,
}

/// Serializable snapshot of the registry, for diagnostics.
#[derive(Debug, Serialize)]
pub struct ContainerReport {
    /// Alias (or type name) → binding description.
    pub bindings: BTreeMap<String, String>,
    /// Alias (or type name) → pending provider name.
    pub providers: BTreeMap<String, String>,
}

/// The type-keyed service registry.
pub struct Container {
    state: RwLock<RegistryState>,
    blueprints: DashMap<ServiceKey, Arc<Blueprint>>,
    binder: Arc<dyn ArgumentBinder>,
    name_resolver: RwLock<Option<Arc<dyn NameResolver>>>,
    auto_aliasers: RwLock<Vec<(String, AliaserFn)>>,
    events: Events,
    self_ref: Weak<Container>,
}

impl Container {
    /// Creates a container with the default [`AutowireBinder`].
    pub fn new() -> Arc<Self> {
        Self::with_binder(Arc::new(AutowireBinder))
    }

    /// Creates a container with a custom argument binder.
    pub fn with_binder(binder: Arc<dyn ArgumentBinder>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: RwLock::new(RegistryState::default()),
            blueprints: DashMap::new(),
            binder,
            name_resolver: RwLock::new(None),
            auto_aliasers: RwLock::new(Vec::new()),
            events: Events::new(),
            self_ref: weak.clone(),
        })
    }

    /// Installs the last-resort name resolver.
    pub fn set_name_resolver(&self, resolver: Arc<dyn NameResolver>) -> &Self {
        *self.name_resolver.write() = Some(resolver);
        self
    }

    fn self_arc(&self) -> Result<Arc<Container>> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| HorreumError::logic("container self reference is gone"))
    }

    // ── Blueprints ──

    /// Registers constructor metadata for a concrete class.
    pub fn register_blueprint(&self, blueprint: Blueprint) -> &Self {
        trace!(class = %blueprint.key(), "Registered blueprint");
        self.blueprints.insert(blueprint.key(), Arc::new(blueprint));
        self
    }

    pub fn has_blueprint(&self, key: &ServiceKey) -> bool {
        self.blueprints.contains_key(key)
    }

    fn blueprint(&self, key: &ServiceKey) -> Option<Arc<Blueprint>> {
        self.blueprints.get(key).map(|entry| Arc::clone(entry.value()))
    }

    // ── Auto-aliasers ──

    /// Registers an alias generator, consulted in registration order.
    pub fn register_auto_aliaser(
        &self,
        name: &str,
        aliaser: impl Fn(&ServiceKey) -> Option<String> + Send + Sync + 'static,
    ) -> &Self {
        let mut aliasers = self.auto_aliasers.write();
        aliasers.retain(|(existing, _)| existing != name);
        aliasers.push((name.to_string(), Arc::new(aliaser)));
        self
    }

    pub fn unregister_auto_aliaser(&self, name: &str) -> &Self {
        self.auto_aliasers
            .write()
            .retain(|(existing, _)| existing != name);
        self
    }

    /// Generates the conventional alias for a key, when any aliaser has one.
    pub fn auto_alias(&self, key: &ServiceKey) -> Option<String> {
        let aliasers = self.auto_aliasers.read();
        aliasers
            .iter()
            .find_map(|(_, aliaser)| aliaser(key).filter(|alias| !alias.is_empty()))
    }

    // ── Providers ──

    /// Registers a list of deferred providers.
    pub fn register_providers(&self, providers: impl IntoIterator<Item = Arc<dyn Provider>>) {
        for provider in providers {
            self.register_provider(provider);
        }
    }

    /// Records a provider for every service it claims that is not already
    /// bound. The registrar runs on first lookup of one of those keys.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        let services = provider.provided_services();
        debug!(
            provider = provider.name(),
            services = services.len(),
            "Registered deferred provider"
        );

        for key in services {
            {
                let state = self.state.read();
                if state.bindings.contains_key(&key) {
                    continue;
                }
            }

            self.state
                .write()
                .providers
                .insert(key, Arc::clone(&provider));

            if let Some(alias) = self.auto_alias(&key) {
                self.register_alias(key, &alias);
            }
        }
    }

    /// Keys with a pending (not yet invoked) provider.
    pub fn pending_providers(&self) -> Vec<ServiceKey> {
        self.state.read().providers.keys().copied().collect()
    }

    // ── Binding registration ──

    /// Binds `T` to a target, replacing and discarding any existing entry
    /// and firing the "rebinding" notification when one existed.
    pub fn bind<T: ?Sized + 'static>(&self, target: impl Into<Target>) -> Result<Arc<Binding>> {
        self.bind_key(ServiceKey::of::<T>(), target.into())
    }

    /// Key-level [`bind`](Self::bind).
    pub fn bind_key(&self, key: ServiceKey, target: Target) -> Result<Arc<Binding>> {
        debug!(key = %key, "Binding");

        // Normalization may fail; construct before touching the registry so
        // a failed bind leaves it untouched.
        let binding = Binding::new(self, key, target, false)?;

        let old = {
            let mut state = self.state.write();
            state.providers.remove(&key);
            let old = state.bindings.remove(&key);
            if let Some(alias) = old.as_ref().and_then(Registration::alias) {
                state.aliases.remove(&alias);
            }
            state
                .bindings
                .insert(key, Registration::Single(Arc::clone(&binding)));
            old
        };

        if let Some(alias) = self.auto_alias(&key) {
            binding.set_alias(self, &alias)?;
        }

        if old.is_some() {
            let entry = Registration::Single(Arc::clone(&binding));
            self.trigger_after_rebinding_with(&key, || entry.instance(self))?;
        }

        Ok(binding)
    }

    /// Binds `T` as a singleton.
    pub fn bind_shared<T: ?Sized + 'static>(
        &self,
        target: impl Into<Target>,
    ) -> Result<Arc<Binding>> {
        self.bind_shared_key(ServiceKey::of::<T>(), target.into())
    }

    /// Key-level [`bind_shared`](Self::bind_shared).
    pub fn bind_shared_key(&self, key: ServiceKey, target: Target) -> Result<Arc<Binding>> {
        let binding = self.bind_key(key, target)?;
        binding.set_shared(true);
        Ok(binding)
    }

    /// Binds only when `T` is not bound already; otherwise returns a
    /// disposable, unregistered binding.
    pub fn bind_locked<T: ?Sized + 'static>(
        &self,
        target: impl Into<Target>,
    ) -> Result<Arc<Binding>> {
        self.bind_locked_with::<T>(target, |_, _| Ok(()))
    }

    /// [`bind_locked`](Self::bind_locked) with a setup callback, run
    /// exactly once, at registration time.
    pub fn bind_locked_with<T: ?Sized + 'static>(
        &self,
        target: impl Into<Target>,
        setup: impl FnOnce(&Arc<Binding>, &Container) -> Result<()>,
    ) -> Result<Arc<Binding>> {
        let key = ServiceKey::of::<T>();

        if self.has_binding(&key) {
            return Binding::new(self, key, target.into(), false);
        }

        let binding = self.bind_key(key, target.into())?;
        setup(&binding, self)?;
        Ok(binding)
    }

    /// Shared variant of [`bind_locked`](Self::bind_locked): returns the
    /// existing registration when one exists.
    pub fn bind_shared_locked<T: ?Sized + 'static>(
        &self,
        target: impl Into<Target>,
    ) -> Result<Registration> {
        self.bind_shared_locked_with::<T>(target, |_, _| Ok(()))
    }

    /// [`bind_shared_locked`](Self::bind_shared_locked) with a setup
    /// callback, run exactly once, at registration time.
    pub fn bind_shared_locked_with<T: ?Sized + 'static>(
        &self,
        target: impl Into<Target>,
        setup: impl FnOnce(&Arc<Binding>, &Container) -> Result<()>,
    ) -> Result<Registration> {
        let key = ServiceKey::of::<T>();

        let existing = self.state.read().bindings.get(&key).cloned();
        if let Some(entry) = existing {
            return Ok(entry);
        }

        let binding = self.bind_shared_key(key, target.into())?;
        setup(&binding, self)?;
        Ok(Registration::Single(binding))
    }

    /// Appends bindings for `T` as a group, promoting an existing single
    /// binding into a group with the old binding first.
    pub fn bind_to_group<T: ?Sized + 'static>(
        &self,
        targets: impl IntoIterator<Item = Target>,
    ) -> Result<Arc<Group>> {
        self.bind_to_group_key(ServiceKey::of::<T>(), targets)
    }

    /// Key-level [`bind_to_group`](Self::bind_to_group).
    pub fn bind_to_group_key(
        &self,
        key: ServiceKey,
        targets: impl IntoIterator<Item = Target>,
    ) -> Result<Arc<Group>> {
        let existing = self.state.read().bindings.get(&key).cloned();

        let group = match existing {
            Some(Registration::Group(group)) => group,
            Some(Registration::Single(old)) => {
                debug!(key = %key, "Promoting single binding into a group");
                let group = Group::new(key);
                group.add_binding(old);
                self.remove_key(&key);
                group
            }
            None => Group::new(key),
        };

        for target in targets {
            let binding = Binding::new(self, key, target, false)?;
            group.add_binding(binding);
        }

        {
            let mut state = self.state.write();
            state.providers.remove(&key);
            state
                .bindings
                .insert(key, Registration::Group(Arc::clone(&group)));
        }

        Ok(group)
    }

    /// Appends a singleton binding to `T`'s group.
    pub fn bind_shared_to_group<T: ?Sized + 'static>(
        &self,
        target: impl Into<Target>,
    ) -> Result<Arc<Group>> {
        let group = self.bind_to_group_key(ServiceKey::of::<T>(), [target.into()])?;

        if let Some(last) = group.bindings().last() {
            last.set_shared(true);
        }

        Ok(group)
    }

    // ── Aliases ──

    /// Sets an alias on `T`'s registration.
    pub fn alias<T: ?Sized + 'static>(&self, alias: &str) -> Result<&Self> {
        self.get_binding_key(&ServiceKey::of::<T>())?
            .set_alias(self, alias)?;
        Ok(self)
    }

    /// The alias of `T`'s registration, or any alias pointing at `T`.
    pub fn get_alias<T: ?Sized + 'static>(&self) -> Option<String> {
        self.get_alias_key(&ServiceKey::of::<T>())
    }

    /// Key-level [`get_alias`](Self::get_alias).
    pub fn get_alias_key(&self, key: &ServiceKey) -> Option<String> {
        let state = self.state.read();

        if let Some(entry) = state.bindings.get(key) {
            return entry.alias();
        }

        state
            .aliases
            .iter()
            .find_map(|(name, target)| (target == key).then(|| name.clone()))
    }

    /// Has this alias name been used?
    pub fn has_alias(&self, alias: &str) -> bool {
        self.state.read().aliases.contains_key(alias)
    }

    /// Does any alias point at `T`?
    pub fn is_aliased<T: ?Sized + 'static>(&self) -> bool {
        let key = ServiceKey::of::<T>();
        self.state.read().aliases.values().any(|target| *target == key)
    }

    /// The canonical key behind an alias name.
    pub fn aliased_type(&self, alias: &str) -> Option<ServiceKey> {
        self.state.read().aliases.get(alias).copied()
    }

    /// Quietly records `alias` → `key`. Bindings call this; prefer
    /// [`alias`](Self::alias) everywhere else.
    pub fn register_alias(&self, key: ServiceKey, alias: &str) {
        trace!(key = %key, alias, "Registered alias");
        self.state.write().aliases.insert(alias.to_string(), key);
    }

    /// Quietly drops an alias name.
    pub fn unregister_alias(&self, alias: &str) {
        self.state.write().aliases.remove(alias);
    }

    // ── Retrieval ──

    /// Builds or retrieves an instance of `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Result<T> {
        let key = ServiceKey::of::<T>();
        let instance = self.get_instance(&key)?;
        extract_as(&key, &instance)
    }

    /// Builds or retrieves an instance of `T` with argument overrides. The
    /// overrides are merged into the binding and persist for later
    /// resolutions of a singleton that has not cached its instance yet.
    pub fn get_with<T: Clone + Send + Sync + 'static>(&self, params: &Params) -> Result<T> {
        let key = ServiceKey::of::<T>();
        let instance = self.get_instance_with(&key, params)?;
        extract_as(&key, &instance)
    }

    /// Builds or retrieves an instance through an alias name.
    pub fn get_aliased<T: Clone + Send + Sync + 'static>(&self, alias: &str) -> Result<T> {
        let key = self
            .aliased_type(alias)
            .ok_or_else(|| HorreumError::not_found(format!("alias \"{alias}\"")))?;

        let instance = self.get_instance(&key)?;

        instance.extract::<T>().ok_or_else(|| {
            HorreumError::logic_with(
                format!("instance behind alias \"{alias}\" does not satisfy the requested type"),
                instance.class().type_name(),
            )
        })
    }

    /// Key-level, type-erased retrieval.
    pub fn get_instance(&self, key: &ServiceKey) -> Result<Instance> {
        let entry = self.get_binding_key(key)?;

        match entry.instance(self)? {
            Some(instance) => Ok(instance),
            None => Err(HorreumError::runtime(format!(
                "binding for {key} produced no instance"
            ))),
        }
    }

    /// Key-level retrieval with argument overrides.
    pub fn get_instance_with(&self, key: &ServiceKey, params: &Params) -> Result<Instance> {
        let entry = self.get_binding_key(key)?;
        entry.add_params(params);

        match entry.instance(self)? {
            Some(instance) => Ok(instance),
            None => Err(HorreumError::runtime(format!(
                "binding for {key} produced no instance"
            ))),
        }
    }

    /// Every available instance of `T`, in group order.
    pub fn get_group<T: Clone + Send + Sync + 'static>(&self) -> Result<Vec<T>> {
        let key = ServiceKey::of::<T>();
        self.get_group_instances(&key)?
            .iter()
            .map(|instance| extract_as(&key, instance))
            .collect()
    }

    /// Key-level, type-erased group retrieval.
    pub fn get_group_instances(&self, key: &ServiceKey) -> Result<Vec<Instance>> {
        self.get_binding_key(key)?.group_instances(self)
    }

    /// Runs a callback over every instance of `T`'s group.
    pub fn each<T: Clone + Send + Sync + 'static>(
        &self,
        mut callback: impl FnMut(T, &Container),
    ) -> Result<&Self> {
        for item in self.get_group::<T>()? {
            callback(item, self);
        }

        Ok(self)
    }

    /// Is `T` a live binding, a pending provider, or fallback-resolvable?
    /// Never forces resolution.
    pub fn has<T: ?Sized + 'static>(&self) -> bool {
        self.has_key(&ServiceKey::of::<T>())
    }

    /// Key-level [`has`](Self::has).
    pub fn has_key(&self, key: &ServiceKey) -> bool {
        {
            let state = self.state.read();
            if state.bindings.contains_key(key) || state.providers.contains_key(key) {
                return true;
            }
        }

        if *key == ServiceKey::of::<Arc<Container>>() {
            return true;
        }

        let resolver = self.name_resolver.read().clone();
        resolver.is_some_and(|resolver| resolver.try_resolve(key).is_some())
    }

    /// Is a registration present for this exact key, ignoring providers and
    /// fallbacks?
    pub fn has_binding(&self, key: &ServiceKey) -> bool {
        self.state.read().bindings.contains_key(key)
    }

    /// Discards `T`'s registration, its alias, and any provider entry.
    pub fn remove<T: ?Sized + 'static>(&self) -> &Self {
        self.remove_key(&ServiceKey::of::<T>())
    }

    /// Key-level [`remove`](Self::remove).
    pub fn remove_key(&self, key: &ServiceKey) -> &Self {
        let mut state = self.state.write();
        state.providers.remove(key);

        if let Some(entry) = state.bindings.remove(key) {
            debug!(key = %key, "Removed binding");
            if let Some(alias) = entry.alias() {
                state.aliases.remove(&alias);
            }
        }

        self
    }

    /// Looks up `T`'s registration, running deferred providers and the
    /// fallback chain as needed.
    pub fn get_binding<T: ?Sized + 'static>(&self) -> Result<Registration> {
        self.get_binding_key(&ServiceKey::of::<T>())
    }

    /// Key-level [`get_binding`](Self::get_binding).
    pub fn get_binding_key(&self, key: &ServiceKey) -> Result<Registration> {
        if let Some(entry) = self.lookup_binding(key)? {
            return Ok(entry);
        }

        // The container can always supply itself.
        if *key == ServiceKey::of::<Arc<Container>>() {
            debug!("Self-binding the container");
            let this = self.self_arc()?;
            let binding = self.bind_shared_key(*key, Target::Instance(Instance::of(this)))?;
            return Ok(Registration::Single(binding));
        }

        // Conventional discovery, memoized as a shared binding.
        let resolver = self.name_resolver.read().clone();
        if let Some(resolver) = resolver {
            if let Some(class) = resolver.try_resolve(key) {
                debug!(key = %key, class = %class, "Name resolver supplied an implementation");
                let binding = self.bind_shared_key(*key, Target::Class(class))?;
                return Ok(Registration::Single(binding));
            }
        }

        Err(HorreumError::NotFound(
            NotFoundError::for_key(key).with_suggestions(self.suggestions_for(key)),
        ))
    }

    /// Alias-free lookup: live bindings, then deferred providers.
    fn lookup_binding(&self, key: &ServiceKey) -> Result<Option<Registration>> {
        if let Some(entry) = self.state.read().bindings.get(key).cloned() {
            return Ok(Some(entry));
        }

        let provider = self.state.read().providers.get(key).cloned();

        if let Some(provider) = provider {
            debug!(key = %key, provider = provider.name(), "Running deferred provider");
            provider.register_services(self)?;

            {
                let mut state = self.state.write();
                for provided in provider.provided_services() {
                    state.providers.remove(&provided);
                }
            }

            let entry = self.state.read().bindings.get(key).cloned();
            return match entry {
                Some(entry) => Ok(Some(entry)),
                None => Err(HorreumError::implementation(format!(
                    "provider {} did not register promised service {key}",
                    provider.name()
                ))),
            };
        }

        Ok(None)
    }

    fn suggestions_for(&self, key: &ServiceKey) -> Vec<String> {
        let mut names: Vec<&str> = Vec::new();

        {
            let state = self.state.read();
            names.extend(state.bindings.keys().map(ServiceKey::type_name));
            names.extend(state.providers.keys().map(ServiceKey::type_name));
        }

        for entry in self.blueprints.iter() {
            names.push(entry.key().type_name());
        }

        names.sort_unstable();
        names.dedup();
        suggest_similar(key.type_name(), &names, 3)
    }

    /// Keys with a live registration.
    pub fn bound_keys(&self) -> Vec<ServiceKey> {
        self.state.read().bindings.keys().copied().collect()
    }

    // ── Binding configuration sugar ──

    /// Appends a preparator to `T`'s registration.
    pub fn prepare_with<T: ?Sized + 'static>(
        &self,
        preparator: impl Fn(Instance, &Container) -> Instance + Send + Sync + Clone + 'static,
    ) -> Result<&Self> {
        self.get_binding_key(&ServiceKey::of::<T>())?
            .prepare_with(preparator);
        Ok(self)
    }

    /// Adds one argument override to `T`'s registration.
    pub fn inject<T: ?Sized + 'static, V: Send + Sync + 'static>(
        &self,
        name: &str,
        value: V,
    ) -> Result<&Self> {
        self.get_binding_key(&ServiceKey::of::<T>())?
            .inject_value(name, Arc::new(value));
        Ok(self)
    }

    /// Merges argument overrides into `T`'s registration.
    pub fn add_params<T: ?Sized + 'static>(&self, params: &Params) -> Result<&Self> {
        self.get_binding_key(&ServiceKey::of::<T>())?
            .add_params(params);
        Ok(self)
    }

    /// Clears `T`'s argument overrides.
    pub fn clear_params<T: ?Sized + 'static>(&self) -> Result<&Self> {
        self.get_binding_key(&ServiceKey::of::<T>())?.clear_params();
        Ok(self)
    }

    /// Clears argument overrides on every registration.
    pub fn clear_all_params(&self) -> &Self {
        let entries: Vec<Registration> = self.state.read().bindings.values().cloned().collect();

        for entry in entries {
            entry.clear_params();
        }

        self
    }

    /// Resets bindings, aliases and events. Pending providers survive.
    pub fn clear(&self) -> &Self {
        {
            let mut state = self.state.write();
            state.bindings.clear();
            state.aliases.clear();
        }

        self.events.clear();
        self
    }

    /// Clears `T`'s cached instance, forcing the next resolution to
    /// rebuild. Fires no event.
    pub fn forget_instance<T: ?Sized + 'static>(&self) -> Result<Registration> {
        let entry = self.get_binding_key(&ServiceKey::of::<T>())?;
        entry.forget_instance();
        Ok(entry)
    }

    /// Clears every registration's cached instance.
    pub fn forget_all_instances(&self) -> &Self {
        let entries: Vec<Registration> = self.state.read().bindings.values().cloned().collect();

        for entry in entries {
            entry.forget_instance();
        }

        self
    }

    // ── Autowired construction ──

    /// Builds or retrieves an instance of `T` through its registration,
    /// creating a temporary unregistered binding when none exists.
    pub fn new_instance_of<T: Clone + Send + Sync + 'static>(&self, params: &Params) -> Result<T> {
        let key = ServiceKey::of::<T>();
        let instance = self.new_instance_of_key(&key, params, &[])?;
        extract_as(&key, &instance)
    }

    /// Key-level [`new_instance_of`](Self::new_instance_of), with optional
    /// interface-contract checks on the product.
    pub fn new_instance_of_key(
        &self,
        key: &ServiceKey,
        params: &Params,
        interfaces: &[ServiceKey],
    ) -> Result<Instance> {
        let entry = match self.lookup_binding(key)? {
            Some(entry) => entry,
            None => Registration::Single(Binding::new(self, *key, Target::Type, false)?),
        };

        entry.add_params(params);

        let instance = entry.instance(self)?.ok_or_else(|| {
            HorreumError::runtime(format!("binding for {key} produced no instance"))
        })?;

        ensure_satisfies(&instance, interfaces)?;
        Ok(instance)
    }

    /// Constructs a fresh `T` directly through its blueprint, bypassing any
    /// registration.
    pub fn build_instance_of<T: Clone + Send + Sync + 'static>(
        &self,
        params: &Params,
    ) -> Result<T> {
        let key = ServiceKey::of::<T>();
        let instance = self.build_instance(&key, params, &[])?;
        extract_as(&key, &instance)
    }

    /// Key-level blueprint construction with optional interface-contract
    /// checks.
    ///
    /// No cycle detection is performed: a circular construction graph is a
    /// caller error and will not terminate.
    pub fn build_instance(
        &self,
        key: &ServiceKey,
        params: &Params,
        interfaces: &[ServiceKey],
    ) -> Result<Instance> {
        let blueprint = self.blueprint(key).ok_or_else(|| {
            HorreumError::logic(format!("binding target {key} cannot be instantiated"))
        })?;

        let args = self
            .binder
            .resolve_parameters(blueprint.params(), params, self)
            .map_err(|err| annotate_required_by(err, key))?;

        let instance = blueprint.produce(&ResolvedArgs::new(args))?;
        ensure_satisfies(&instance, interfaces)?;
        Ok(instance)
    }

    /// Calls a function with arguments resolved from its declared
    /// parameter list, explicit overrides first.
    pub fn call<R>(
        &self,
        params: &[ParamSpec],
        overrides: &Params,
        function: impl FnOnce(&ResolvedArgs) -> Result<R>,
    ) -> Result<R> {
        let args = self.binder.resolve_parameters(params, overrides, self)?;
        function(&ResolvedArgs::new(args))
    }

    // ── Events ──

    /// Registers a handler fired after instances of `T` are produced.
    pub fn after_resolving<T: ?Sized + 'static>(
        &self,
        callback: impl Fn(&Instance, &Container) + Send + Sync + 'static,
    ) -> EventToken {
        self.after_resolving_key(&ServiceKey::of::<T>(), Arc::new(callback))
    }

    /// Key-level [`after_resolving`](Self::after_resolving).
    pub fn after_resolving_key(&self, key: &ServiceKey, callback: EventCallback) -> EventToken {
        self.events
            .after(&format!("resolving.{}", key.type_name()), callback)
    }

    /// Registers a handler fired after *any* instance is produced.
    pub fn after_any_resolving(
        &self,
        callback: impl Fn(&Instance, &Container) + Send + Sync + 'static,
    ) -> EventToken {
        self.events.after("resolving.*", Arc::new(callback))
    }

    /// Fires the "resolving" notification for a freshly produced instance.
    /// Called by bindings; handler panics propagate to the resolver.
    pub fn trigger_after_resolving(&self, key: &ServiceKey, instance: &Instance) {
        let id = format!("resolving.{}", key.type_name());

        if self.events.has_after(&[id.as_str(), "resolving.*"]) {
            self.events.trigger_after(&id, instance, self);
            self.events.trigger_after("resolving.*", instance, self);
        }
    }

    /// Registers a handler fired after `T`'s factory is replaced.
    pub fn after_rebinding<T: ?Sized + 'static>(
        &self,
        callback: impl Fn(&Instance, &Container) + Send + Sync + 'static,
    ) -> EventToken {
        self.after_rebinding_key(&ServiceKey::of::<T>(), Arc::new(callback))
    }

    /// Key-level [`after_rebinding`](Self::after_rebinding).
    pub fn after_rebinding_key(&self, key: &ServiceKey, callback: EventCallback) -> EventToken {
        self.events
            .after(&format!("rebinding.{}", key.type_name()), callback)
    }

    /// Registers a handler fired after *any* factory is replaced.
    pub fn after_any_rebinding(
        &self,
        callback: impl Fn(&Instance, &Container) + Send + Sync + 'static,
    ) -> EventToken {
        self.events.after("rebinding.*", Arc::new(callback))
    }

    /// Fires the "rebinding" notification. The replacement instance is
    /// resolved only when listeners exist.
    pub(crate) fn trigger_after_rebinding_with(
        &self,
        key: &ServiceKey,
        resolve: impl FnOnce() -> Result<Option<Instance>>,
    ) -> Result<()> {
        let id = format!("rebinding.{}", key.type_name());

        if self.events.has_after(&[id.as_str(), "rebinding.*"]) {
            if let Some(instance) = resolve()? {
                self.events.trigger_after(&id, &instance, self);
                self.events.trigger_after("rebinding.*", &instance, self);
            }
        }

        Ok(())
    }

    // ── Introspection ──

    /// Serializable snapshot of the registry.
    pub fn report(&self) -> ContainerReport {
        let state = self.state.read();

        let mut bindings = BTreeMap::new();
        for (key, entry) in &state.bindings {
            let label = entry
                .alias()
                .unwrap_or_else(|| key.type_name().to_string());
            bindings.insert(label, entry.describe_instance());
        }

        let mut providers = BTreeMap::new();
        for (key, provider) in &state.providers {
            let label = self
                .auto_alias(key)
                .unwrap_or_else(|| key.type_name().to_string());
            providers.insert(label, format!("provider : {}", provider.name()));
        }

        ContainerReport {
            bindings,
            providers,
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Container")
            .field("bindings", &state.bindings.len())
            .field("aliases", &state.aliases.len())
            .field("providers", &state.providers.len())
            .field("blueprints", &self.blueprints.len())
            .finish()
    }
}

fn extract_as<T: Clone + Send + Sync + 'static>(
    key: &ServiceKey,
    instance: &Instance,
) -> Result<T> {
    instance.extract::<T>().ok_or_else(|| {
        HorreumError::logic_with(
            format!("bound instance does not satisfy requested type {key}"),
            instance.class().type_name(),
        )
    })
}

fn ensure_satisfies(instance: &Instance, interfaces: &[ServiceKey]) -> Result<()> {
    for interface in interfaces {
        if !instance.satisfies(interface) {
            return Err(HorreumError::implementation(format!(
                "binding target does not implement {interface}"
            )));
        }
    }

    Ok(())
}

fn annotate_required_by(err: HorreumError, key: &ServiceKey) -> HorreumError {
    match err {
        HorreumError::NotFound(mut not_found) if not_found.required_by.is_none() => {
            not_found.required_by = Some(*key);
            HorreumError::NotFound(not_found)
        }
        other => other,
    }
}

pub mod prelude {
    pub use super::{AliaserFn, Container, ContainerReport, Registration};
    pub use crate::autowire::{ArgumentBinder, AutowireBinder, NameResolver};
    pub use crate::binding::{Binding, FactoryFn, Preparator, Target, TargetKind};
    pub use crate::blueprint::{Blueprint, ParamSpec, ResolvedArgs};
    pub use crate::error::{ErrorKind, HorreumError, Result};
    pub use crate::events::{EventCallback, EventToken, Events};
    pub use crate::group::Group;
    pub use crate::instance::{AnyValue, Instance, Params};
    pub use crate::key::ServiceKey;
    pub use crate::provider::Provider;
}
