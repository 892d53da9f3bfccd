//! Composite bindings.
//!
//! A [`Group`] aggregates an ordered list of child bindings under one
//! declared key — the "many providers of one type" case, typically plugins
//! or listeners that should all be retrievable. Singular reads resolve the
//! first child that yields an instance; group reads collect every child;
//! writes fan out to all children. Groups never nest: the container
//! flattens by appending to an existing group.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::binding::{Binding, register_alias_for, remove_alias_for};
use crate::container::Container;
use crate::error::{HorreumError, Result};
use crate::instance::{AnyValue, Instance, Params};
use crate::key::ServiceKey;

/// Ordered composite of child bindings sharing one declared key.
pub struct Group {
    key: ServiceKey,
    bindings: RwLock<Vec<Arc<Binding>>>,
    alias: RwLock<Option<String>>,
}

impl Group {
    pub(crate) fn new(key: ServiceKey) -> Arc<Self> {
        Arc::new(Self {
            key,
            bindings: RwLock::new(Vec::new()),
            alias: RwLock::new(None),
        })
    }

    /// The declared service key shared by every child.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Appends a child binding; insertion order is resolution order.
    pub fn add_binding(&self, binding: Arc<Binding>) -> &Self {
        trace!(key = %self.key, "Appending binding to group");
        self.bindings.write().push(binding);
        self
    }

    /// Snapshot of the child list, in order.
    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        self.bindings.read().clone()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    // ── Reads ──

    /// Resolves the first child that yields an instance.
    ///
    /// # Errors
    /// [`HorreumError::Runtime`] when the group is empty or every child
    /// yields nothing.
    pub fn instance(&self, container: &Container) -> Result<Instance> {
        for binding in self.bindings() {
            if let Some(instance) = binding.instance(container)? {
                return Ok(instance);
            }
        }

        Err(HorreumError::runtime(format!(
            "no available bindings for {}",
            self.key
        )))
    }

    /// Builds a fresh instance from the first child that yields one,
    /// bypassing caches.
    pub fn new_instance(&self, container: &Container) -> Result<Instance> {
        for binding in self.bindings() {
            if let Some(instance) = binding.new_instance(container)? {
                return Ok(instance);
            }
        }

        Err(HorreumError::runtime(format!(
            "no available bindings for {}",
            self.key
        )))
    }

    /// Resolves every child, collecting the non-empty results in child
    /// order.
    pub fn group_instances(&self, container: &Container) -> Result<Vec<Instance>> {
        let mut output = Vec::new();

        for binding in self.bindings() {
            if let Some(instance) = binding.instance(container)? {
                output.push(instance);
            }
        }

        Ok(output)
    }

    // ── Fan-out writes ──

    /// Adds one named argument override to every child.
    pub fn inject<T: Clone + Send + Sync + 'static>(&self, name: &str, value: T) -> &Self {
        for binding in self.bindings() {
            binding.inject(name, value.clone());
        }
        self
    }

    pub fn inject_value(&self, name: &str, value: AnyValue) -> &Self {
        for binding in self.bindings() {
            binding.inject_value(name, Arc::clone(&value));
        }
        self
    }

    /// Merges overrides into every child.
    pub fn add_params(&self, params: &Params) -> &Self {
        for binding in self.bindings() {
            binding.add_params(params);
        }
        self
    }

    /// The named override from the first child that has it.
    pub fn param_value(&self, name: &str) -> Option<AnyValue> {
        self.bindings()
            .iter()
            .find_map(|binding| binding.param_value(name))
    }

    /// Is the override present on any child?
    pub fn has_param(&self, name: &str) -> bool {
        self.bindings().iter().any(|binding| binding.has_param(name))
    }

    pub fn remove_param(&self, name: &str) -> &Self {
        for binding in self.bindings() {
            binding.remove_param(name);
        }
        self
    }

    pub fn clear_params(&self) -> &Self {
        for binding in self.bindings() {
            binding.clear_params();
        }
        self
    }

    /// Appends a preparator to every child.
    pub fn prepare_with(
        &self,
        preparator: impl Fn(Instance, &Container) -> Instance + Send + Sync + Clone + 'static,
    ) -> &Self {
        for binding in self.bindings() {
            binding.prepare_with(preparator.clone());
        }
        self
    }

    /// Does any child carry preparators?
    pub fn has_preparators(&self) -> bool {
        self.bindings()
            .iter()
            .any(|binding| binding.has_preparators())
    }

    pub fn clear_preparators(&self) -> &Self {
        for binding in self.bindings() {
            binding.clear_preparators();
        }
        self
    }

    /// Clears every child's cached instance.
    pub fn forget_instance(&self) -> &Self {
        for binding in self.bindings() {
            binding.forget_instance();
        }
        self
    }

    // ── Alias ──

    /// Registers a secondary lookup name for the group's key.
    pub fn set_alias(&self, container: &Container, alias: &str) -> Result<()> {
        register_alias_for(container, self.key, &self.alias, alias)
    }

    pub fn alias(&self) -> Option<String> {
        self.alias.read().clone()
    }

    pub fn has_alias(&self) -> bool {
        self.alias.read().is_some()
    }

    pub fn remove_alias(&self, container: &Container) {
        remove_alias_for(container, &self.alias);
    }

    // ── Introspection ──

    /// Child descriptions joined into one block.
    pub fn describe_instance(&self) -> String {
        self.describe_instances().join("\n")
    }

    /// One description line per child, in order.
    pub fn describe_instances(&self) -> Vec<String> {
        self.bindings()
            .iter()
            .map(|binding| binding.describe_instance())
            .collect()
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("bindings", &self.len())
            .finish()
    }
}
