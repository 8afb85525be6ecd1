//! Arena of live objects addressed by opaque handles.
//!
//! Handlers frequently produce objects that cannot cross the transport (open
//! databases, listeners, replicators). The [`HandleRegistry`] keeps such
//! objects alive on behalf of the remote driver and hands back a [`Handle`]
//! naming them. The registry is the only owner that decides an object's
//! lifetime: drivers hold identifiers, never the object.
//!
//! Handles are rendered on the wire as `@<n>`. The counter behind them only
//! moves forward, so an identifier is never reissued while the registry
//! lives, even after the original object is released.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

/// Tracing target for registry operations.
pub(crate) const HANDLES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handles");

const HANDLE_PREFIX: char = '@';

/// Opaque identifier naming one registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Numeric value behind the handle.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Recognises the `@<digits>` marker used on the wire.
    ///
    /// Returns `None` for anything else, including digit runs that overflow.
    #[must_use]
    pub fn from_marker(text: &str) -> Option<Self> {
        let digits = text.strip_prefix(HANDLE_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{HANDLE_PREFIX}{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = HandleError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_marker(text).ok_or_else(|| HandleError::Malformed {
            text: text.to_owned(),
        })
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Names the kind of object behind a handle.
///
/// Tags let the resolver and the response encoder check object kinds without
/// inspecting Rust types at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(&'static str);

impl TypeTag {
    /// Builds a tag from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The tag's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.0)
    }
}

/// Objects that may be kept alive in the registry.
pub trait HandleObject: Any + Send + Sync {
    /// Tag reported to drivers and checked by argument signatures.
    const TYPE_TAG: TypeTag;
}

/// A freshly produced object awaiting registration.
pub struct NewObject {
    tag: TypeTag,
    object: Arc<dyn Any + Send + Sync>,
}

impl NewObject {
    /// Wraps a value so it can be registered.
    pub fn new<T: HandleObject>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Wraps an object that is already shared elsewhere.
    pub fn shared<T: HandleObject>(object: Arc<T>) -> Self {
        Self {
            tag: T::TYPE_TAG,
            object,
        }
    }

    /// Tag of the wrapped object.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }
}

impl fmt::Debug for NewObject {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NewObject")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// A registered object together with its handle and tag.
#[derive(Clone)]
pub struct LiveObject {
    handle: Handle,
    tag: TypeTag,
    object: Arc<dyn Any + Send + Sync>,
}

impl LiveObject {
    /// Handle under which the object is registered.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Tag recorded at registration.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Returns the object as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::TypeMismatch`] when the recorded tag or the
    /// concrete type differs from `T`.
    pub fn downcast<T: HandleObject>(&self) -> Result<Arc<T>, HandleError> {
        if self.tag != T::TYPE_TAG {
            return Err(self.mismatch(T::TYPE_TAG));
        }
        Arc::clone(&self.object)
            .downcast::<T>()
            .map_err(|_| self.mismatch(T::TYPE_TAG))
    }

    /// `true` when both values refer to the same allocation.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }

    fn mismatch(&self, expected: TypeTag) -> HandleError {
        HandleError::TypeMismatch {
            handle: self.handle,
            expected,
            found: self.tag,
        }
    }
}

impl fmt::Debug for LiveObject {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LiveObject")
            .field("handle", &self.handle)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Errors raised by handle lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandleError {
    /// No live object is registered under the handle.
    #[error("unknown handle {handle}")]
    Unknown {
        /// Handle that was looked up.
        handle: Handle,
    },
    /// The object behind the handle is of a different kind.
    #[error("handle {handle} refers to a {found}, expected a {expected}")]
    TypeMismatch {
        /// Handle that was looked up.
        handle: Handle,
        /// Tag the caller asked for.
        expected: TypeTag,
        /// Tag recorded at registration.
        found: TypeTag,
    },
    /// Text did not have the `@<digits>` shape.
    #[error("'{text}' is not a handle")]
    Malformed {
        /// Offending text.
        text: String,
    },
}

/// Thread-safe arena mapping handles to live objects.
///
/// Lookups share a read lock; registration and release take the write lock
/// only for the map operation itself. Objects removed from the map are
/// dropped after the lock is released.
#[derive(Default)]
pub struct HandleRegistry {
    last_issued: AtomicU64,
    entries: RwLock<HashMap<Handle, LiveObject>>,
}

impl HandleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object and returns the fresh handle naming it.
    pub fn register(&self, object: NewObject) -> Handle {
        let handle = Handle(self.last_issued.fetch_add(1, Ordering::Relaxed) + 1);
        let NewObject { tag, object } = object;
        let entry = LiveObject {
            handle,
            tag,
            object,
        };
        self.write_entries().insert(handle, entry);
        debug!(
            target: HANDLES_TARGET,
            %handle,
            tag = tag.as_str(),
            "registered object"
        );
        handle
    }

    /// Convenience wrapper over [`register`](Self::register).
    pub fn register_value<T: HandleObject>(&self, value: T) -> Handle {
        self.register(NewObject::new(value))
    }

    /// Looks up the object named by `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Unknown`] when nothing is registered under it.
    pub fn resolve(&self, handle: Handle) -> Result<LiveObject, HandleError> {
        self.read_entries()
            .get(&handle)
            .cloned()
            .ok_or(HandleError::Unknown { handle })
    }

    /// Looks up the object named by `handle` as a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Unknown`] for missing handles and
    /// [`HandleError::TypeMismatch`] for objects of another kind.
    pub fn resolve_as<T: HandleObject>(&self, handle: Handle) -> Result<Arc<T>, HandleError> {
        self.resolve(handle)?.downcast()
    }

    /// Removes the object named by `handle`.
    ///
    /// Releasing twice is a caller bug and is reported rather than ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Unknown`] when nothing is registered under it.
    pub fn release(&self, handle: Handle) -> Result<TypeTag, HandleError> {
        let removed = self.write_entries().remove(&handle);
        let entry = removed.ok_or(HandleError::Unknown { handle })?;
        debug!(
            target: HANDLES_TARGET,
            %handle,
            tag = entry.tag.as_str(),
            "released object"
        );
        Ok(entry.tag)
    }

    /// Releases every registered object, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.write_entries());
        let count = drained.len();
        drop(drained);
        debug!(target: HANDLES_TARGET, count, "released all objects");
        count
    }

    /// `true` when `handle` names a live object.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.read_entries().contains_key(&handle)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// `true` when no objects are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    // Map operations cannot panic part-way, so a poisoned lock still guards a
    // consistent map.
    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Handle, LiveObject>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Handle, LiveObject>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandleRegistry")
            .field("live", &self.len())
            .field("last_issued", &self.last_issued.load(Ordering::Relaxed))
            .finish()
    }
}
