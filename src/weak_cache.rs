//! Cache of weakly-held values.
//!
//! Values are stored as [`WeakHandle`]s guarded by a [`WeakToken`], so an entry
//! stays visible only while something outside the cache still holds the value.
//! Once the last `Arc` is dropped the entry reads as absent, and the store
//! purges it on the next lookup of that key or the next sweep.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::builder::StoreOptions;
use crate::error::Result;
use crate::options::EntryOptions;
use crate::store::MemoryStore;
use crate::traits::CacheKey;
use crate::weak::{ErasedWeak, WeakHandle, WeakToken};

/// Weak-value operations on a [`MemoryStore`].
///
/// Weak entries share the store with ordinary ones. A key written through
/// [`MemoryStore::insert`] is invisible to these methods.
pub trait WeakStoreExt {
	/// Store a weak handle to `value` under `key`, replacing any previous entry.
	/// Returns `value` unchanged.
	fn set_weak<K: CacheKey, T: Send + Sync + 'static>(&self, key: K, value: Arc<T>) -> Result<Arc<T>>;

	/// As [`set_weak`](Self::set_weak), with entry options applied first.
	fn set_weak_with<K: CacheKey, T: Send + Sync + 'static>(
		&self,
		key: K,
		value: Arc<T>,
		options: &EntryOptions,
	) -> Result<Arc<T>>;

	/// Resolve the value under `key`, if it is still alive and is a `T`.
	fn get_weak<K: CacheKey, T: Send + Sync + 'static>(&self, key: &K) -> Option<Arc<T>>;

	/// Resolve the value under `key` without naming its type.
	fn get_weak_any<K: CacheKey>(&self, key: &K) -> Option<Arc<dyn Any + Send + Sync>>;

	/// The stored handle itself, without resolving it.
	fn get_weak_handle<K: CacheKey, T: Send + Sync + 'static>(&self, key: &K) -> Option<WeakHandle<T>>;
}

impl WeakStoreExt for MemoryStore {
	fn set_weak<K: CacheKey, T: Send + Sync + 'static>(&self, key: K, value: Arc<T>) -> Result<Arc<T>> {
		self.set_weak_with(key, value, &EntryOptions::default())
	}

	fn set_weak_with<K: CacheKey, T: Send + Sync + 'static>(
		&self,
		key: K,
		value: Arc<T>,
		options: &EntryOptions,
	) -> Result<Arc<T>> {
		let handle = WeakHandle::new(&value);
		let token = WeakToken::new(handle.clone());

		self.entry(key).options(options).expiration_token(Arc::new(token)).insert(ErasedWeak::new(handle))?;
		Ok(value)
	}

	fn get_weak<K: CacheKey, T: Send + Sync + 'static>(&self, key: &K) -> Option<Arc<T>> {
		self.get::<K, ErasedWeak>(key)?.resolve::<T>()
	}

	fn get_weak_any<K: CacheKey>(&self, key: &K) -> Option<Arc<dyn Any + Send + Sync>> {
		self.get::<K, ErasedWeak>(key)?.resolve_any()
	}

	fn get_weak_handle<K: CacheKey, T: Send + Sync + 'static>(&self, key: &K) -> Option<WeakHandle<T>> {
		self.get::<K, ErasedWeak>(key)?.handle::<T>().cloned()
	}
}

/// A cache that never keeps its values alive.
///
/// Every value is handed in as an `Arc<T>`; the cache keeps only a weak
/// handle. Lookups succeed while any strong reference exists elsewhere.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_cache::WeakCache;
///
/// let cache = WeakCache::new();
/// let config = cache.set("config", Arc::new(String::from("debug=true"))).unwrap();
///
/// assert_eq!(cache.get::<_, String>(&"config").as_deref(), Some(&*config));
///
/// drop(config);
/// assert!(cache.get::<_, String>(&"config").is_none());
/// ```
#[derive(Debug, Default)]
pub struct WeakCache {
	store: MemoryStore,
}

impl WeakCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_options(options: StoreOptions) -> Self {
		Self::from_store(MemoryStore::with_options(options))
	}

	/// Wrap an existing store, e.g. one built with a size limit or a custom clock.
	pub fn from_store(store: MemoryStore) -> Self {
		Self {
			store,
		}
	}

	/// Cache `value` under `key` and return it unchanged.
	pub fn set<K: CacheKey, T: Send + Sync + 'static>(&self, key: K, value: Arc<T>) -> Result<Arc<T>> {
		self.store.set_weak(key, value)
	}

	/// Cache `value` with entry options (expiration, size, tokens, callbacks).
	pub fn set_with<K: CacheKey, T: Send + Sync + 'static>(
		&self,
		key: K,
		value: Arc<T>,
		options: &EntryOptions,
	) -> Result<Arc<T>> {
		self.store.set_weak_with(key, value, options)
	}

	/// Cache `value` until `at`, or until it is reclaimed.
	pub fn set_until<K: CacheKey, T: Send + Sync + 'static>(
		&self,
		key: K,
		value: Arc<T>,
		at: Instant,
	) -> Result<Arc<T>> {
		self.set_with(key, value, &EntryOptions::new().absolute_expiration(at))
	}

	/// Cache `value` for `after`, or until it is reclaimed.
	pub fn set_for<K: CacheKey, T: Send + Sync + 'static>(
		&self,
		key: K,
		value: Arc<T>,
		after: Duration,
	) -> Result<Arc<T>> {
		self.set_with(key, value, &EntryOptions::new().absolute_expiration_relative_to_now(after))
	}

	/// Get the value under `key` if it is alive and is a `T`.
	pub fn get<K: CacheKey, T: Send + Sync + 'static>(&self, key: &K) -> Option<Arc<T>> {
		self.store.get_weak(key)
	}

	pub fn get_any<K: CacheKey>(&self, key: &K) -> Option<Arc<dyn Any + Send + Sync>> {
		self.store.get_weak_any(key)
	}

	/// Whether a live value is cached under `key`. Never creates a strong reference
	/// and does not restart the entry's sliding expiration window.
	pub fn contains<K: CacheKey>(&self, key: &K) -> bool {
		self.store
			.peek(key)
			.and_then(|payload| payload.downcast::<ErasedWeak>().ok())
			.is_some_and(|weak| weak.is_alive())
	}

	pub fn get_weak_handle<K: CacheKey, T: Send + Sync + 'static>(&self, key: &K) -> Option<WeakHandle<T>> {
		self.store.get_weak_handle(key)
	}

	/// Return the cached value, or build, cache and return a new one.
	pub fn get_or_insert_with<K: CacheKey, T: Send + Sync + 'static>(
		&self,
		key: K,
		make: impl FnOnce() -> Arc<T>,
	) -> Result<Arc<T>> {
		if let Some(value) = self.get(&key) {
			return Ok(value);
		}
		self.set(key, make())
	}

	/// Remove the entry under `key`. Returns whether there was one.
	pub fn remove<K: CacheKey>(&self, key: &K) -> bool {
		self.store.remove(key)
	}

	/// Entries in the store, including dead ones not yet purged.
	pub fn len(&self) -> usize {
		self.store.len()
	}

	pub fn is_empty(&self) -> bool {
		self.store.is_empty()
	}

	/// See [`MemoryStore::compact`].
	pub fn compact(&self, percentage: f64) -> usize {
		self.store.compact(percentage)
	}

	pub fn clear(&self) {
		self.store.clear();
	}

	pub fn store(&self) -> &MemoryStore {
		&self.store
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, PartialEq)]
	struct Document {
		body: String,
	}

	fn document(body: &str) -> Arc<Document> {
		Arc::new(Document {
			body: body.to_string(),
		})
	}

	#[test]
	fn test_set_returns_same_value() {
		let cache = WeakCache::new();
		let doc = document("a");

		let returned = cache.set("doc", doc.clone()).expect("set should succeed");
		assert!(Arc::ptr_eq(&returned, &doc));
	}

	#[test]
	fn test_cache_does_not_hold_strong_reference() {
		let cache = WeakCache::new();
		let doc = cache.set("doc", document("a")).expect("set should succeed");

		assert_eq!(Arc::strong_count(&doc), 1);
		assert!(cache.contains(&"doc"));
		assert_eq!(Arc::strong_count(&doc), 1);
	}

	#[test]
	fn test_get_after_drop_is_absent() {
		let cache = WeakCache::new();
		let doc = cache.set(1u32, document("a")).expect("set should succeed");

		drop(doc);
		assert!(cache.get::<_, Document>(&1u32).is_none());
		assert!(!cache.contains(&1u32));
		// The lookup purged the dead entry.
		assert!(cache.is_empty());
	}

	#[test]
	fn test_type_mismatch_is_absent() {
		let cache = WeakCache::new();
		let _doc = cache.set("doc", document("a")).expect("set should succeed");

		assert!(cache.get::<_, String>(&"doc").is_none());
		assert!(cache.get_weak_handle::<_, String>(&"doc").is_none());
		assert!(cache.get::<_, Document>(&"doc").is_some());
	}

	#[test]
	fn test_get_weak_handle_does_not_resolve() {
		let cache = WeakCache::new();
		let doc = cache.set("doc", document("a")).expect("set should succeed");

		let handle = cache.get_weak_handle::<_, Document>(&"doc").expect("entry should exist");
		assert_eq!(Arc::strong_count(&doc), 1);
		assert!(handle.is_alive());

		drop(doc);
		assert!(!handle.is_alive());
	}

	#[test]
	fn test_get_any() {
		let cache = WeakCache::new();
		let doc = cache.set("doc", document("a")).expect("set should succeed");

		let any = cache.get_any(&"doc").expect("value is held");
		assert_eq!(any.downcast_ref::<Document>(), Some(&*doc));
	}

	#[test]
	fn test_plain_store_values_are_invisible() {
		let cache = WeakCache::new();
		cache.store().insert("raw", String::from("strong")).expect("insert should succeed");

		assert!(cache.get::<_, String>(&"raw").is_none());
		assert!(cache.get_any(&"raw").is_none());
		assert!(!cache.contains(&"raw"));
		assert!(cache.store().contains(&"raw"));
	}

	#[test]
	fn test_get_or_insert_with() {
		let cache = WeakCache::new();

		let first = cache.get_or_insert_with("doc", || document("first")).expect("set should succeed");
		let second = cache.get_or_insert_with("doc", || document("second")).expect("lookup should succeed");
		assert!(Arc::ptr_eq(&first, &second));

		drop(first);
		drop(second);
		let third = cache.get_or_insert_with("doc", || document("third")).expect("set should succeed");
		assert_eq!(third.body, "third");
	}

	#[test]
	fn test_extension_trait_on_bare_store() {
		let store = MemoryStore::new();
		let value = store.set_weak(9u64, Arc::new(String::from("nine"))).expect("set should succeed");

		assert_eq!(store.get_weak::<_, String>(&9u64).as_deref(), Some(&*value));
		assert!(store.get_weak_any(&9u64).is_some());
		assert!(store.get_weak_handle::<_, String>(&9u64).is_some());
	}
}
