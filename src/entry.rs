use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::options::{EntryOptions, Evicted};
use crate::store::MemoryStore;
use crate::token::ExpirationToken;
use crate::traits::{CacheKey, CachePolicy};

/// Pending entry for a key, configured fluently and stored by
/// [`insert`](EntryBuilder::insert).
///
/// Obtained from [`MemoryStore::entry`].
#[must_use = "nothing is stored until `insert` is called"]
pub struct EntryBuilder<'a, K: CacheKey> {
	store: &'a MemoryStore,
	key: K,
	options: EntryOptions,
}

impl<'a, K: CacheKey> EntryBuilder<'a, K> {
	pub(crate) fn new(store: &'a MemoryStore, key: K) -> Self {
		Self {
			store,
			key,
			options: EntryOptions::default(),
		}
	}

	pub fn absolute_expiration(mut self, at: Instant) -> Self {
		self.options = self.options.absolute_expiration(at);
		self
	}

	pub fn absolute_expiration_relative_to_now(mut self, after: Duration) -> Self {
		self.options = self.options.absolute_expiration_relative_to_now(after);
		self
	}

	pub fn sliding_expiration(mut self, idle: Duration) -> Self {
		self.options = self.options.sliding_expiration(idle);
		self
	}

	pub fn size(mut self, size: u64) -> Self {
		self.options = self.options.size(size);
		self
	}

	pub fn policy(mut self, policy: CachePolicy) -> Self {
		self.options = self.options.policy(policy);
		self
	}

	pub fn expiration_token(mut self, token: Arc<dyn ExpirationToken>) -> Self {
		self.options = self.options.expiration_token(token);
		self
	}

	pub fn on_eviction(mut self, callback: impl Fn(&Evicted<'_>) + Send + Sync + 'static) -> Self {
		self.options = self.options.on_eviction(callback);
		self
	}

	/// Apply reusable options. Expirations, size and policy are overwritten;
	/// tokens and callbacks are added to any already configured.
	pub fn options(mut self, options: &EntryOptions) -> Self {
		let previous = std::mem::replace(&mut self.options, options.clone());

		let mut tokens = previous.tokens;
		tokens.append(&mut self.options.tokens);
		self.options.tokens = tokens;

		let mut callbacks = previous.callbacks;
		callbacks.append(&mut self.options.callbacks);
		self.options.callbacks = callbacks;
		self
	}

	/// Store `value`, replacing any previous entry for the key.
	pub fn insert<V: Send + Sync + 'static>(self, value: V) -> Result<()> {
		self.insert_shared(Arc::new(value))
	}

	/// Store an already shared, type-erased payload.
	pub fn insert_shared(self, value: Arc<dyn Any + Send + Sync>) -> Result<()> {
		self.store.commit(self.key, value, self.options)
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;
	use crate::options::EvictionReason;

	#[test]
	fn test_options_merge_keeps_existing_callbacks() {
		let store = MemoryStore::new();
		let seen = Arc::new(Mutex::new(Vec::new()));

		let first = seen.clone();
		let second = seen.clone();
		let shared = EntryOptions::new().size(9).on_eviction(move |_| first.lock().push("shared"));

		store
			.entry("key")
			.size(1)
			.on_eviction(move |_| second.lock().push("local"))
			.options(&shared)
			.insert(5u32)
			.expect("insert should succeed");
		assert_eq!(store.size(), 9);

		store.remove(&"key");
		assert_eq!(*seen.lock(), vec!["local", "shared"]);
	}

	#[test]
	fn test_insert_shared_payload() {
		let store = MemoryStore::new();
		let payload: Arc<dyn Any + Send + Sync> = Arc::new(String::from("shared"));

		store.entry(1u8).insert_shared(payload.clone()).expect("insert should succeed");

		let stored = store.get_any(&1u8).expect("entry should exist");
		assert!(Arc::ptr_eq(&stored, &payload));
	}

	#[test]
	fn test_callback_sees_value() {
		let store = MemoryStore::new();
		let seen = Arc::new(Mutex::new(None));
		let captured = seen.clone();

		store
			.entry(1u8)
			.on_eviction(move |evicted| {
				*captured.lock() = evicted.value::<String>().map(|v| (v.clone(), evicted.reason));
			})
			.insert(String::from("payload"))
			.expect("insert should succeed");
		store.remove(&1u8);

		assert_eq!(*seen.lock(), Some((String::from("payload"), EvictionReason::Removed)));
	}
}
