//! Non-owning handles to shared values, and the expiration token that
//! watches them.
//!
//! A [`WeakHandle`] wraps a [`std::sync::Weak`]. It resolves to the value for
//! as long as some `Arc` keeps it alive, and never extends that lifetime.
//! [`WeakToken`] turns a handle into an [`ExpirationToken`] so the store drops
//! the entry once the value is gone.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::token::{ChangeCallback, ExpirationToken, Registration};

/// Weak reference to a value held elsewhere in an `Arc<T>`.
///
/// Once the last `Arc<T>` is dropped the handle is dead for good.
pub struct WeakHandle<T> {
	inner: Weak<T>,
}

impl<T: Send + Sync + 'static> WeakHandle<T> {
	pub fn new(value: &Arc<T>) -> Self {
		Self {
			inner: Arc::downgrade(value),
		}
	}

	/// Get a strong reference if the value is still alive.
	pub fn try_resolve(&self) -> Option<Arc<T>> {
		self.inner.upgrade()
	}

	/// Whether the value is still alive. Does not create a strong reference.
	pub fn is_alive(&self) -> bool {
		self.inner.strong_count() > 0
	}

	/// Whether both handles point at the same allocation.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		self.inner.ptr_eq(&other.inner)
	}
}

impl<T: Send + Sync + 'static> From<&Arc<T>> for WeakHandle<T> {
	fn from(value: &Arc<T>) -> Self {
		Self::new(value)
	}
}

impl<T> Clone for WeakHandle<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for WeakHandle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakHandle")
			.field("type", &type_name::<T>())
			.field("alive", &(self.inner.strong_count() > 0))
			.finish()
	}
}

/// Expiration token that changes once its handle's value is reclaimed.
///
/// Liveness is polled; there is nothing to push a notification when an `Arc`
/// is dropped, so callback registration is not supported.
pub struct WeakToken<T> {
	handle: WeakHandle<T>,
}

impl<T: Send + Sync + 'static> WeakToken<T> {
	pub fn new(handle: WeakHandle<T>) -> Self {
		Self {
			handle,
		}
	}
}

impl<T: Send + Sync + 'static> ExpirationToken for WeakToken<T> {
	fn has_changed(&self) -> bool {
		!self.handle.is_alive()
	}

	fn register_change_callback(&self, _callback: ChangeCallback) -> Result<Registration> {
		Err(Error::NotSupported("weak tokens cannot notify on reclamation"))
	}
}

impl<T> fmt::Debug for WeakToken<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakToken").field("handle", &self.handle).finish()
	}
}

/// Type-independent view of a [`WeakHandle`].
pub trait ResolveWeak: Send + Sync {
	fn is_alive(&self) -> bool;

	/// Resolve to the value as `dyn Any`.
	fn resolve_any(&self) -> Option<Arc<dyn Any + Send + Sync>>;

	/// The handle itself, for downcasting back to `WeakHandle<T>`.
	fn as_any(&self) -> &dyn Any;

	/// Name of the referenced type.
	fn type_name(&self) -> &'static str;
}

impl<T: Send + Sync + 'static> ResolveWeak for WeakHandle<T> {
	fn is_alive(&self) -> bool {
		WeakHandle::is_alive(self)
	}

	fn resolve_any(&self) -> Option<Arc<dyn Any + Send + Sync>> {
		self.try_resolve().map(|value| value as Arc<dyn Any + Send + Sync>)
	}

	fn as_any(&self) -> &dyn Any {
		self
	}

	fn type_name(&self) -> &'static str {
		type_name::<T>()
	}
}

/// The payload the weak cache stores: a handle of any referent type.
pub struct ErasedWeak {
	handle: Box<dyn ResolveWeak>,
}

impl ErasedWeak {
	pub fn new<T: Send + Sync + 'static>(handle: WeakHandle<T>) -> Self {
		Self {
			handle: Box::new(handle),
		}
	}

	pub fn is_alive(&self) -> bool {
		self.handle.is_alive()
	}

	pub fn resolve_any(&self) -> Option<Arc<dyn Any + Send + Sync>> {
		self.handle.resolve_any()
	}

	/// The typed handle, if the referent is a `T`.
	pub fn handle<T: Send + Sync + 'static>(&self) -> Option<&WeakHandle<T>> {
		self.handle.as_any().downcast_ref()
	}

	/// Resolve as a `T`. `None` if the value is gone or is not a `T`.
	pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		self.handle::<T>()?.try_resolve()
	}

	pub fn type_name(&self) -> &'static str {
		self.handle.type_name()
	}
}

impl fmt::Debug for ErasedWeak {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ErasedWeak")
			.field("type", &self.type_name())
			.field("alive", &self.is_alive())
			.finish()
	}
}
