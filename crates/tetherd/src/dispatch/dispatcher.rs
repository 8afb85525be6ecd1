//! Composition root tying the registry, resolver and router together.
//!
//! A request flows through [`Dispatcher::dispatch`] in four steps: the
//! method is looked up, its arguments are resolved against the handle
//! registry, the handler runs, and an object result is registered so the
//! driver receives a handle. Lookup and resolution fail before the handler
//! runs and leave no trace; the registry lock is never held while a handler
//! executes.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::arguments::{ArgumentBag, ArgumentResolver};
use crate::features::FeatureModule;
use crate::handles::HandleRegistry;

use super::builtin::builtin_methods;
use super::errors::DispatchError;
use super::outcome::{Outcome, Reply};
use super::router::{DISPATCH_TARGET, Router, RouterError};

/// Routes requests to handlers and keeps their object results addressable.
#[derive(Debug)]
pub struct Dispatcher {
    router: Arc<Router>,
    registry: Arc<HandleRegistry>,
}

impl Dispatcher {
    /// Starts assembling a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Runs `method` with the raw argument bag.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MethodNotFound`] for unknown methods,
    /// [`DispatchError::Argument`] when resolution fails, and the handler's
    /// own error otherwise.
    pub fn dispatch(&self, method: &str, bag: &ArgumentBag) -> Result<Reply, DispatchError> {
        let entry = self.router.lookup(method)?;
        let args = ArgumentResolver::new(&self.registry).resolve(bag, entry.signature())?;
        debug!(
            target: DISPATCH_TARGET,
            method,
            arguments = args.values().len(),
            "invoking handler"
        );
        let outcome = entry.invoke(&args)?;
        Ok(self.reply_for(outcome))
    }

    /// Router holding the installed methods.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Registry holding objects handed out to drivers.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Drops every registered object, returning how many were live.
    pub fn release_all(&self) -> usize {
        let released = self.registry.clear();
        if released > 0 {
            info!(target: DISPATCH_TARGET, released, "released remaining objects");
        }
        released
    }

    fn reply_for(&self, outcome: Outcome) -> Reply {
        match outcome {
            Outcome::Void => Reply::Void,
            Outcome::Value(value) => Reply::Value(value),
            Outcome::Object(object) => {
                let tag = object.tag();
                let handle = self.registry.register(object);
                Reply::Handle { handle, tag }
            }
        }
    }
}

/// Assembles a [`Dispatcher`] from its built-ins and feature modules.
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: Option<Arc<HandleRegistry>>,
    features: Vec<Box<dyn FeatureModule>>,
}

impl DispatcherBuilder {
    /// Uses an existing registry instead of a fresh one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<HandleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Adds a feature whose methods are installed after the built-ins.
    #[must_use]
    pub fn feature(mut self, feature: impl FeatureModule + 'static) -> Self {
        self.features.push(Box::new(feature));
        self
    }

    /// Installs the built-in table, then every feature in the order added.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] if the built-in table cannot be installed.
    pub fn build(self) -> Result<Dispatcher, RouterError> {
        let registry = self.registry.unwrap_or_default();
        let router = Router::new();
        router.register_static(builtin_methods(&registry))?;

        for feature in &self.features {
            let table = feature.methods();
            let methods = table.len();
            let replaced = router.extend(table);
            info!(
                target: DISPATCH_TARGET,
                feature = feature.name(),
                methods,
                replaced = replaced.len(),
                "installed feature"
            );
        }

        Ok(Dispatcher {
            router: Arc::new(router),
            registry,
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let features: Vec<&str> = self.features.iter().map(|feature| feature.name()).collect();
        formatter
            .debug_struct("DispatcherBuilder")
            .field("features", &features)
            .finish_non_exhaustive()
    }
}
