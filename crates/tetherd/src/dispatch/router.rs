//! Method routing for command dispatch.
//!
//! The router maps method names to handler entries. Built-in methods are
//! installed once as the static table; feature modules then merge their own
//! tables with [`Router::extend`]. Both operations publish the whole table at
//! once, so a concurrent dispatch sees either none or all of a table's
//! entries. Lookups share a read lock and clone the entry out, so a handler
//! never runs with the table locked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, warn};

use crate::arguments::{ResolvedArgs, Signature};

use super::errors::DispatchError;
use super::outcome::Outcome;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Function invoked for a method.
pub type HandlerFn = dyn Fn(&ResolvedArgs) -> Result<Outcome, DispatchError> + Send + Sync;

/// A registered method: its name, declared signature and handler.
pub struct MethodEntry {
    name: String,
    signature: Signature,
    handler: Arc<HandlerFn>,
}

impl MethodEntry {
    /// Builds an entry.
    pub fn new<F>(name: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(&ResolvedArgs) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            handler: Arc::new(handler),
        }
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Runs the handler.
    ///
    /// # Errors
    ///
    /// Propagates the handler's failure unchanged.
    pub fn invoke(&self, args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
        (self.handler)(args)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A batch of methods installed together.
#[derive(Debug, Default)]
pub struct MethodTable {
    entries: Vec<MethodEntry>,
}

impl MethodTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table with one more method.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(&ResolvedArgs) -> Result<Outcome, DispatchError> + Send + Sync + 'static,
    {
        self.insert(MethodEntry::new(name, signature, handler));
        self
    }

    /// Adds an entry.
    pub fn insert(&mut self, entry: MethodEntry) {
        self.entries.push(entry);
    }

    /// Method names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(MethodEntry::name)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &MethodEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Errors raised while assembling the method table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// The static table may only be installed once.
    #[error("the built-in method table is already installed")]
    StaticTableInstalled,
}

#[derive(Default)]
struct RouteTable {
    methods: HashMap<String, Arc<MethodEntry>>,
    static_installed: bool,
}

/// Maps method names to handlers.
#[derive(Default)]
pub struct Router {
    table: RwLock<RouteTable>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the built-in methods.
    ///
    /// Names already present from an earlier [`extend`](Self::extend) are
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaticTableInstalled`] on a second call.
    pub fn register_static(&self, table: MethodTable) -> Result<(), RouterError> {
        let mut guard = self.write_table();
        if guard.static_installed {
            return Err(RouterError::StaticTableInstalled);
        }
        let count = table.len();
        let replaced = merge(&mut guard, table);
        guard.static_installed = true;
        drop(guard);
        report_replaced("static", &replaced);
        debug!(target: DISPATCH_TARGET, count, "installed built-in methods");
        Ok(())
    }

    /// Merges additional methods, later registrations winning.
    ///
    /// Returns the names whose earlier handlers were replaced; each is also
    /// logged at `warn`.
    pub fn extend(&self, table: MethodTable) -> Vec<String> {
        let count = table.len();
        let replaced = merge(&mut self.write_table(), table);
        report_replaced("extension", &replaced);
        debug!(target: DISPATCH_TARGET, count, "extended method table");
        replaced
    }

    /// Looks up the entry for `method`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MethodNotFound`] when no handler is registered.
    pub fn lookup(&self, method: &str) -> Result<Arc<MethodEntry>, DispatchError> {
        self.read_table()
            .methods
            .get(method)
            .map(Arc::clone)
            .ok_or_else(|| DispatchError::method_not_found(method))
    }

    /// Invokes the handler registered for `method`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MethodNotFound`] for unknown names and
    /// otherwise propagates the handler's own failure unchanged.
    pub fn dispatch(&self, method: &str, args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
        let entry = self.lookup(method)?;
        entry.invoke(args)
    }

    /// `true` when a handler is registered for `method`.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.read_table().methods.contains_key(method)
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_table().methods.keys().cloned().collect();
        names.sort();
        names
    }

    // Table updates are single map operations; a poisoned lock still guards a
    // consistent table.
    fn read_table(&self) -> RwLockReadGuard<'_, RouteTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, RouteTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Router")
            .field("methods", &self.method_names())
            .finish()
    }
}

fn merge(table: &mut RouteTable, incoming: MethodTable) -> Vec<String> {
    let mut replaced = Vec::new();
    for entry in incoming.entries {
        let name = entry.name.clone();
        if table.methods.insert(name.clone(), Arc::new(entry)).is_some() {
            replaced.push(name);
        }
    }
    replaced
}

fn report_replaced(source: &str, replaced: &[String]) {
    for method in replaced {
        warn!(
            target: DISPATCH_TARGET,
            method = method.as_str(),
            source,
            "method handler replaced by a later registration"
        );
    }
}

#[cfg(test)]
mod tests;
