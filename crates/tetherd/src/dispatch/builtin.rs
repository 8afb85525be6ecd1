//! Methods every dispatcher carries regardless of installed features.

use std::sync::Arc;

use tracing::debug;

use crate::arguments::{Param, ParamKind, Signature};
use crate::handles::HandleRegistry;

use super::outcome::Outcome;
use super::router::{DISPATCH_TARGET, MethodTable};

/// Releases the object named by `object`.
pub const RELEASE: &str = "release";

/// Drops every registered object and returns how many there were.
pub const FLUSH_MEMORY: &str = "flushMemory";

/// Builds the static table of built-in methods bound to `registry`.
pub(crate) fn builtin_methods(registry: &Arc<HandleRegistry>) -> MethodTable {
    let release_registry = Arc::clone(registry);
    let flush_registry = Arc::clone(registry);

    MethodTable::new()
        .with(
            RELEASE,
            Signature::new([Param::required("object", ParamKind::AnyObject)]),
            move |args| {
                let object = args.live_object("object")?;
                let tag = release_registry.release(object.handle())?;
                debug!(
                    target: DISPATCH_TARGET,
                    handle = %object.handle(),
                    tag = %tag,
                    "released object"
                );
                Ok(Outcome::Void)
            },
        )
        .with(FLUSH_MEMORY, Signature::none(), move |_| {
            let dropped = flush_registry.clear();
            Ok(Outcome::value(dropped))
        })
}
