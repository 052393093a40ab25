use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::token::ExpirationToken;
use crate::traits::CachePolicy;

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
	/// Removed explicitly or by `clear`.
	Removed,
	/// Overwritten by a newer entry under the same key.
	Replaced,
	/// Absolute or sliding expiration elapsed.
	Expired,
	/// One of the entry's expiration tokens changed.
	TokenExpired,
	/// Removed by compaction, or rejected because it did not fit.
	Capacity,
}

/// An entry that has just left the store, as seen by eviction callbacks.
pub struct Evicted<'a> {
	pub key: &'a (dyn Any + Send + Sync),
	pub value: &'a Arc<dyn Any + Send + Sync>,
	pub reason: EvictionReason,
}

impl Evicted<'_> {
	/// The key, if it has type `K`.
	pub fn key<K: 'static>(&self) -> Option<&K> {
		self.key.downcast_ref()
	}

	/// The stored value, if it has type `V`.
	pub fn value<V: 'static>(&self) -> Option<&V> {
		self.value.downcast_ref()
	}
}

impl fmt::Debug for Evicted<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Evicted").field("reason", &self.reason).finish_non_exhaustive()
	}
}

/// Callback run after an entry leaves the store. Runs with no store locks held.
pub type EvictionCallback = Arc<dyn Fn(&Evicted<'_>) + Send + Sync>;

/// Per-entry policy: expiration, size, priority, tokens and eviction callbacks.
///
/// Options are reusable; cloning shares tokens and callbacks.
///
/// ```
/// use std::time::Duration;
/// use weak_cache::{CachePolicy, EntryOptions};
///
/// let options = EntryOptions::new()
///     .sliding_expiration(Duration::from_secs(30))
///     .size(4)
///     .policy(CachePolicy::Critical);
/// assert_eq!(options.get_size(), Some(4));
/// ```
#[derive(Clone, Default)]
pub struct EntryOptions {
	pub(crate) absolute_expiration: Option<Instant>,
	pub(crate) absolute_expiration_relative_to_now: Option<Duration>,
	pub(crate) sliding_expiration: Option<Duration>,
	pub(crate) size: Option<u64>,
	pub(crate) policy: CachePolicy,
	pub(crate) tokens: Vec<Arc<dyn ExpirationToken>>,
	pub(crate) callbacks: Vec<EvictionCallback>,
}

impl EntryOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Expire at a fixed point in time.
	pub fn absolute_expiration(mut self, at: Instant) -> Self {
		self.absolute_expiration = Some(at);
		self
	}

	/// Expire a fixed duration after the entry is inserted.
	///
	/// Takes precedence over [`absolute_expiration`](Self::absolute_expiration).
	pub fn absolute_expiration_relative_to_now(mut self, after: Duration) -> Self {
		self.absolute_expiration_relative_to_now = Some(after);
		self
	}

	/// Expire once the entry has not been read for `idle`. Reads reset the window,
	/// but never past an absolute expiration.
	pub fn sliding_expiration(mut self, idle: Duration) -> Self {
		self.sliding_expiration = Some(idle);
		self
	}

	/// Size charged against the store's size limit. The unit is up to the caller.
	pub fn size(mut self, size: u64) -> Self {
		self.size = Some(size);
		self
	}

	pub fn policy(mut self, policy: CachePolicy) -> Self {
		self.policy = policy;
		self
	}

	/// Attach an expiration token.
	pub fn expiration_token(mut self, token: Arc<dyn ExpirationToken>) -> Self {
		self.tokens.push(token);
		self
	}

	/// Run `callback` when the entry leaves the store.
	pub fn on_eviction(mut self, callback: impl Fn(&Evicted<'_>) + Send + Sync + 'static) -> Self {
		self.callbacks.push(Arc::new(callback));
		self
	}

	pub fn get_size(&self) -> Option<u64> {
		self.size
	}

	pub fn get_policy(&self) -> CachePolicy {
		self.policy
	}

	pub(crate) fn validate(&self) -> Result<()> {
		if self.sliding_expiration.is_some_and(|idle| idle.is_zero()) {
			return Err(Error::InvalidOption {
				option: "sliding_expiration",
				reason: "must be positive",
			});
		}
		if self.absolute_expiration_relative_to_now.is_some_and(|after| after.is_zero()) {
			return Err(Error::InvalidOption {
				option: "absolute_expiration_relative_to_now",
				reason: "must be positive",
			});
		}
		Ok(())
	}

	/// Resolve the absolute deadline given the insertion time.
	pub(crate) fn deadline(&self, now: Instant) -> Option<Instant> {
		match self.absolute_expiration_relative_to_now {
			Some(after) => now.checked_add(after),
			None => self.absolute_expiration,
		}
	}
}

impl fmt::Debug for EntryOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EntryOptions")
			.field("absolute_expiration", &self.absolute_expiration)
			.field("absolute_expiration_relative_to_now", &self.absolute_expiration_relative_to_now)
			.field("sliding_expiration", &self.sliding_expiration)
			.field("size", &self.size)
			.field("policy", &self.policy)
			.field("tokens", &self.tokens.len())
			.field("callbacks", &self.callbacks.len())
			.finish()
	}
}
