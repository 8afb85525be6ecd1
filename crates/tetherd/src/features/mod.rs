//! Feature modules that extend the dispatcher with method families.
//!
//! A feature contributes a [`MethodTable`] which the dispatcher merges into
//! its router once, during start-up, after the built-in methods are
//! installed. Features never touch the router directly.

mod collections;
mod orchestration;

use crate::dispatch::MethodTable;

pub use self::collections::{Array, CollectionsFeature, Dictionary};
pub use self::orchestration::{CB_SERVER, OrchestrationFeature, SYNC_GATEWAY};

/// A family of methods installed together.
pub trait FeatureModule: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Methods this feature contributes.
    fn methods(&self) -> MethodTable;
}
