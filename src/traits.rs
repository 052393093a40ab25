use std::hash::Hash;

/// Eviction priority of an entry.
///
/// Compaction removes `Volatile` entries first, then `Standard`, then
/// `Critical`. `Pinned` entries are never removed to make room; they leave the
/// store only by explicit removal, replacement, or expiration.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CachePolicy {
	/// Never evicted for capacity.
	Pinned = 0,

	/// Expensive to rebuild. Evicted only after every `Standard` and `Volatile` entry.
	Critical = 1,

	/// Normal eviction behavior.
	#[default]
	Standard = 2,

	/// Cheap to recompute. First to be evicted.
	Volatile = 3,
}

impl CachePolicy {
	/// Position in compaction order; lower ranks are removed first.
	pub(crate) fn eviction_rank(self) -> u8 {
		CachePolicy::Volatile as u8 - self as u8
	}

	/// Whether compaction may remove entries with this policy.
	pub fn is_evictable(self) -> bool {
		self != CachePolicy::Pinned
	}
}

/// Any type usable as a cache key.
///
/// Keys of different types can live in the same store; two keys only match
/// when both their type and their value are equal.
pub trait CacheKey: Hash + Eq + Send + Sync + 'static {}

impl<K: Hash + Eq + Send + Sync + 'static> CacheKey for K {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_eviction_order() {
		assert!(CachePolicy::Volatile.eviction_rank() < CachePolicy::Standard.eviction_rank());
		assert!(CachePolicy::Standard.eviction_rank() < CachePolicy::Critical.eviction_rank());
		assert!(!CachePolicy::Pinned.is_evictable());
		assert!(CachePolicy::Critical.is_evictable());
	}

	#[test]
	fn test_default_policy() {
		assert_eq!(CachePolicy::default(), CachePolicy::Standard);
	}
}
