use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::options::{EntryOptions, EvictionCallback, EvictionReason};
use crate::token::{ExpirationToken, Registration};
use crate::traits::{CacheKey, CachePolicy};

/// Type-erased cache key with pre-computed hash.
///
/// This allows storing keys of different types in the same table
/// without requiring a unified enum type.
pub(crate) struct ErasedKey {
	/// TypeId of the concrete key type K
	pub type_id: TypeId,
	/// Pre-computed hash of (TypeId, K)
	pub hash: u64,
	/// The actual key, boxed and type-erased
	pub data: Box<dyn Any + Send + Sync>,
}

impl ErasedKey {
	/// Create a new erased key, taking ownership of the concrete key.
	pub fn new<K: CacheKey>(key: K) -> Self {
		let type_id = TypeId::of::<K>();
		let hash = Self::compute_hash(type_id, &key);
		Self {
			type_id,
			hash,
			data: Box::new(key),
		}
	}

	/// Compute the combined hash of TypeId and key.
	pub(crate) fn compute_hash<K: CacheKey>(type_id: TypeId, key: &K) -> u64 {
		let mut hasher = ahash::AHasher::default();
		type_id.hash(&mut hasher);
		key.hash(&mut hasher);
		hasher.finish()
	}

	/// Attempt to downcast to the concrete key type.
	pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
		self.data.downcast_ref()
	}
}

impl fmt::Debug for ErasedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ErasedKey")
			.field("type_id", &self.type_id)
			.field("hash", &self.hash)
			.field("data", &"<Box<dyn Any>>")
			.finish()
	}
}

/// Borrowed reference to a cache key for zero-allocation lookups.
pub(crate) struct ErasedKeyRef<'a, K> {
	pub type_id: TypeId,
	pub hash: u64,
	pub key: &'a K,
}

impl<'a, K: CacheKey> ErasedKeyRef<'a, K> {
	/// Create a borrowed key reference (no allocation).
	pub fn new(key: &'a K) -> Self {
		let type_id = TypeId::of::<K>();
		let hash = ErasedKey::compute_hash(type_id, key);
		Self {
			type_id,
			hash,
			key,
		}
	}

	/// Check equality with an owned ErasedKey.
	pub fn equals(&self, other: &ErasedKey) -> bool {
		if self.hash != other.hash || self.type_id != other.type_id {
			return false;
		}
		other.downcast_ref::<K>().is_some_and(|other_key| self.key == other_key)
	}
}

/// A stored entry: the payload plus everything needed to decide whether it
/// is still valid.
///
/// Timestamps are nanoseconds since the owning store's origin instant.
pub(crate) struct Entry {
	/// Unique per store; distinguishes this entry from later ones under the same key
	pub id: u64,
	pub value: Arc<dyn Any + Send + Sync>,
	/// Charged against the size limit (0 when unspecified)
	pub size: u64,
	pub policy: CachePolicy,
	/// Absolute expiration
	pub deadline: Option<u64>,
	/// Sliding expiration window
	pub sliding: Option<u64>,
	pub last_access: AtomicU64,
	/// Set once expiration is observed, or by a token's change callback
	pub expired: Arc<AtomicBool>,
	pub tokens: Vec<Arc<dyn ExpirationToken>>,
	/// Dropped together with the entry, which unregisters token callbacks
	pub registrations: Vec<Registration>,
	pub callbacks: Vec<EvictionCallback>,
}

impl Entry {
	pub fn new(
		id: u64,
		value: Arc<dyn Any + Send + Sync>,
		options: EntryOptions,
		deadline: Option<u64>,
		now: u64,
	) -> Self {
		let sliding = options.sliding_expiration.map(|idle| u64::try_from(idle.as_nanos()).unwrap_or(u64::MAX));
		Self {
			id,
			value,
			size: options.size.unwrap_or(0),
			policy: options.policy,
			deadline,
			sliding,
			last_access: AtomicU64::new(now),
			expired: Arc::new(AtomicBool::new(false)),
			tokens: options.tokens,
			registrations: Vec::new(),
			callbacks: options.callbacks,
		}
	}

	/// Decide whether the entry is expired at `now`, and why.
	///
	/// Once expired, an entry stays expired.
	pub fn check_expired(&self, now: u64) -> Option<EvictionReason> {
		if self.expired.load(Ordering::Acquire) {
			// The flag is set either by a token callback or by an earlier check;
			// re-derive the reason so callbacks see the same answer either way.
			return Some(self.time_expired(now).unwrap_or(EvictionReason::TokenExpired));
		}

		let reason = self.time_expired(now).or_else(|| {
			self.tokens.iter().any(|token| token.has_changed()).then_some(EvictionReason::TokenExpired)
		})?;
		self.expired.store(true, Ordering::Release);
		Some(reason)
	}

	fn time_expired(&self, now: u64) -> Option<EvictionReason> {
		if self.deadline.is_some_and(|deadline| deadline <= now) {
			return Some(EvictionReason::Expired);
		}
		if let Some(sliding) = self.sliding {
			let idle = now.saturating_sub(self.last_access.load(Ordering::Relaxed));
			if idle >= sliding {
				return Some(EvictionReason::Expired);
			}
		}
		None
	}

	/// Record a read, restarting the sliding window.
	pub fn touch(&self, now: u64) {
		self.last_access.fetch_max(now, Ordering::Relaxed);
	}
}

impl fmt::Debug for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("id", &self.id)
			.field("size", &self.size)
			.field("policy", &self.policy)
			.field("deadline", &self.deadline)
			.field("sliding", &self.sliding)
			.field("last_access", &self.last_access.load(Ordering::Relaxed))
			.field("expired", &self.expired.load(Ordering::Relaxed))
			.field("tokens", &self.tokens.len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::token::SignalToken;

	#[derive(Hash, Eq, PartialEq, Clone, Debug)]
	struct TestKey(u64);

	#[derive(Hash, Eq, PartialEq, Clone, Debug)]
	struct OtherKey(u64);

	fn entry(options: EntryOptions, deadline: Option<u64>) -> Entry {
		Entry::new(1, Arc::new("value"), options, deadline, 0)
	}

	#[test]
	fn test_erased_key_creation() {
		let erased = ErasedKey::new(TestKey(42));

		assert_eq!(erased.type_id, TypeId::of::<TestKey>());
		assert_eq!(erased.downcast_ref::<TestKey>().expect("should downcast"), &TestKey(42));
		assert!(erased.downcast_ref::<OtherKey>().is_none());
	}

	#[test]
	fn test_key_ref_equals() {
		let erased = ErasedKey::new(TestKey(42));

		assert!(ErasedKeyRef::new(&TestKey(42)).equals(&erased));
		assert!(!ErasedKeyRef::new(&TestKey(99)).equals(&erased));
	}

	#[test]
	fn test_same_value_different_type_never_equal() {
		let erased = ErasedKey::new(TestKey(7));
		let other = ErasedKeyRef::new(&OtherKey(7));

		assert_ne!(erased.hash, other.hash);
		assert!(!other.equals(&erased));
	}

	#[test]
	fn test_entry_absolute_deadline() {
		let entry = entry(EntryOptions::new(), Some(100));

		assert_eq!(entry.check_expired(99), None);
		assert_eq!(entry.check_expired(100), Some(EvictionReason::Expired));
	}

	#[test]
	fn test_entry_sliding_window_restarts_on_touch() {
		let entry = entry(EntryOptions::new().sliding_expiration(Duration::from_nanos(10)), None);

		assert_eq!(entry.check_expired(9), None);
		entry.touch(9);
		assert_eq!(entry.check_expired(18), None);
		assert_eq!(entry.check_expired(19), Some(EvictionReason::Expired));
	}

	#[test]
	fn test_entry_token_expiry_is_sticky() {
		let token = SignalToken::new();
		let entry = entry(EntryOptions::new().expiration_token(Arc::new(token.clone())), None);

		assert_eq!(entry.check_expired(0), None);
		token.signal();
		assert_eq!(entry.check_expired(0), Some(EvictionReason::TokenExpired));
		assert!(entry.expired.load(Ordering::Acquire));
		assert_eq!(entry.check_expired(0), Some(EvictionReason::TokenExpired));
	}

	#[test]
	fn test_entry_defaults() {
		let entry = entry(EntryOptions::new(), None);

		assert_eq!(entry.size, 0);
		assert_eq!(entry.policy, CachePolicy::Standard);
		assert_eq!(entry.check_expired(u64::MAX), None);
	}
}
