//! Expiration tokens: predicates the store consults to decide whether an
//! entry is still valid.
//!
//! A token is polled with [`has_changed`](ExpirationToken::has_changed) on
//! every lookup and during sweeps. Tokens that can announce a change
//! themselves report [`active_change_callbacks`](ExpirationToken::active_change_callbacks)
//! and accept callbacks; the store uses those to flag an entry as expired the
//! moment the token fires.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;

/// Callback invoked once when a token changes.
pub type ChangeCallback = Box<dyn FnOnce() + Send>;

/// A predicate attached to a cache entry. Once it reports a change, the
/// entry is treated as expired.
pub trait ExpirationToken: Send + Sync {
	/// Whether the token has changed (the entry it guards is invalid).
	fn has_changed(&self) -> bool;

	/// Whether this token pushes change notifications to registered callbacks.
	///
	/// When `false`, the store relies on polling alone and never calls
	/// [`register_change_callback`](ExpirationToken::register_change_callback).
	fn active_change_callbacks(&self) -> bool {
		false
	}

	/// Register a callback to run when the token changes.
	///
	/// Dropping the returned [`Registration`] unregisters the callback.
	/// Poll-only tokens return [`Error::NotSupported`](crate::Error::NotSupported).
	fn register_change_callback(&self, callback: ChangeCallback) -> Result<Registration>;
}

/// Handle for a registered change callback. Unregisters on drop.
#[must_use = "dropping a registration unregisters its callback"]
pub struct Registration {
	unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Registration {
	/// A registration with nothing to undo.
	pub fn empty() -> Self {
		Self {
			unregister: None,
		}
	}

	/// A registration that runs `unregister` when dropped.
	pub fn new(unregister: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			unregister: Some(Box::new(unregister)),
		}
	}
}

impl Drop for Registration {
	fn drop(&mut self) {
		if let Some(unregister) = self.unregister.take() {
			unregister();
		}
	}
}

impl fmt::Debug for Registration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registration").field("active", &self.unregister.is_some()).finish()
	}
}

/// Token that changes when [`signal`](SignalToken::signal) is called.
///
/// Clones share state: signalling one clone fires all of them. Useful for
/// invalidating a group of entries at once.
#[derive(Clone, Default)]
pub struct SignalToken {
	inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
	fired: AtomicBool,
	next_id: AtomicU64,
	callbacks: Mutex<Vec<(u64, ChangeCallback)>>,
}

impl SignalToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fire the token. Registered callbacks run on the calling thread;
	/// later calls are no-ops.
	pub fn signal(&self) {
		if self.inner.fired.swap(true, Ordering::AcqRel) {
			return;
		}
		let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
		for (_, callback) in callbacks {
			callback();
		}
	}

	/// Number of callbacks still waiting for the signal.
	pub fn registered(&self) -> usize {
		self.inner.callbacks.lock().len()
	}
}

impl ExpirationToken for SignalToken {
	fn has_changed(&self) -> bool {
		self.inner.fired.load(Ordering::Acquire)
	}

	fn active_change_callbacks(&self) -> bool {
		true
	}

	fn register_change_callback(&self, callback: ChangeCallback) -> Result<Registration> {
		let mut callbacks = self.inner.callbacks.lock();
		if self.inner.fired.load(Ordering::Acquire) {
			drop(callbacks);
			callback();
			return Ok(Registration::empty());
		}

		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		callbacks.push((id, callback));

		let inner: Weak<SignalInner> = Arc::downgrade(&self.inner);
		Ok(Registration::new(move || {
			if let Some(inner) = inner.upgrade() {
				inner.callbacks.lock().retain(|(other, _)| *other != id);
			}
		}))
	}
}

impl fmt::Debug for SignalToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SignalToken").field("fired", &self.has_changed()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
		let count = Arc::new(AtomicUsize::new(0));
		let captured = count.clone();
		(
			count,
			Box::new(move || {
				captured.fetch_add(1, Ordering::SeqCst);
			}),
		)
	}

	#[test]
	fn test_signal_runs_callbacks_once() {
		let token = SignalToken::new();
		let (count, callback) = counter();
		let _registration = token.register_change_callback(callback).expect("signal tokens accept callbacks");

		assert!(!token.has_changed());
		token.signal();
		token.signal();

		assert!(token.has_changed());
		assert_eq!(count.load(Ordering::SeqCst), 1);
		assert_eq!(token.registered(), 0);
	}

	#[test]
	fn test_dropping_registration_unregisters() {
		let token = SignalToken::new();
		let (count, callback) = counter();
		let registration = token.register_change_callback(callback).expect("signal tokens accept callbacks");
		assert_eq!(token.registered(), 1);

		drop(registration);
		assert_eq!(token.registered(), 0);

		token.signal();
		assert_eq!(count.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_register_after_signal_runs_immediately() {
		let token = SignalToken::new();
		token.signal();

		let (count, callback) = counter();
		let _registration = token.register_change_callback(callback).expect("signal tokens accept callbacks");
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_clones_share_state() {
		let token = SignalToken::new();
		let clone = token.clone();
		clone.signal();
		assert!(token.has_changed());
	}
}
