//! Store performance metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::options::EvictionReason;

/// Performance metrics for the store.
///
/// This struct provides insights into store behavior including hit rates,
/// eviction and expiration counts, and size utilization.
///
/// # Example
///
/// ```
/// use weak_cache::MemoryStore;
///
/// let store = MemoryStore::new();
/// // ... perform store operations ...
///
/// let metrics = store.metrics();
/// println!("Hit rate: {:.2}%", metrics.hit_rate() * 100.0);
/// println!("Expirations: {}", metrics.expirations);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
	/// Number of lookups that found a live entry.
	pub hits: u64,
	/// Number of lookups that found nothing, or only an expired entry.
	pub misses: u64,
	/// Number of new entries inserted into the store.
	pub inserts: u64,
	/// Number of existing entries replaced (key already existed).
	pub updates: u64,
	/// Number of entries removed by compaction or rejected for capacity.
	pub evictions: u64,
	/// Number of entries purged because they expired (time or token).
	pub expirations: u64,
	/// Number of entries explicitly removed via remove() or clear().
	pub removals: u64,
	/// Current sum of entry sizes.
	pub current_size: u64,
	/// Configured size limit, if any.
	pub size_limit: Option<u64>,
	/// Current number of entries in the store.
	pub entry_count: usize,
}

impl CacheMetrics {
	/// Calculate the hit rate as a ratio between 0.0 and 1.0.
	///
	/// Returns 0.0 if there have been no lookups.
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64
		}
	}

	/// Calculate size utilization as a ratio between 0.0 and 1.0.
	///
	/// Returns 0.0 for an unbounded store.
	pub fn utilization(&self) -> f64 {
		match self.size_limit {
			Some(limit) if limit > 0 => self.current_size as f64 / limit as f64,
			_ => 0.0,
		}
	}

	/// Calculate the total number of lookups (hits + misses).
	pub fn total_accesses(&self) -> u64 {
		self.hits + self.misses
	}
}

/// Live counters behind [`CacheMetrics`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
	hits: AtomicU64,
	misses: AtomicU64,
	inserts: AtomicU64,
	updates: AtomicU64,
	evictions: AtomicU64,
	expirations: AtomicU64,
	removals: AtomicU64,
}

impl Counters {
	pub fn hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub fn miss(&self) {
		self.misses.fetch_add(1, Ordering::Relaxed);
	}

	pub fn insert(&self, replaced: bool) {
		let counter = if replaced { &self.updates } else { &self.inserts };
		counter.fetch_add(1, Ordering::Relaxed);
	}

	/// Count an entry leaving the store. Replacements are counted by `insert`.
	pub fn evicted(&self, reason: EvictionReason) {
		let counter = match reason {
			EvictionReason::Removed => &self.removals,
			EvictionReason::Expired | EvictionReason::TokenExpired => &self.expirations,
			EvictionReason::Capacity => &self.evictions,
			EvictionReason::Replaced => return,
		};
		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub fn reset(&self) {
		for counter in [
			&self.hits,
			&self.misses,
			&self.inserts,
			&self.updates,
			&self.evictions,
			&self.expirations,
			&self.removals,
		] {
			counter.store(0, Ordering::Relaxed);
		}
	}

	pub fn snapshot(&self, current_size: u64, size_limit: Option<u64>, entry_count: usize) -> CacheMetrics {
		CacheMetrics {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			inserts: self.inserts.load(Ordering::Relaxed),
			updates: self.updates.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			expirations: self.expirations.load(Ordering::Relaxed),
			removals: self.removals.load(Ordering::Relaxed),
			current_size,
			size_limit,
			entry_count,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_hit_rate() {
		let counters = Counters::default();
		assert_eq!(counters.snapshot(0, None, 0).hit_rate(), 0.0);

		counters.hit();
		counters.hit();
		counters.hit();
		counters.miss();
		let metrics = counters.snapshot(0, None, 0);
		assert_eq!(metrics.hit_rate(), 0.75);
		assert_eq!(metrics.total_accesses(), 4);
	}

	#[test]
	fn test_evictions_by_reason() {
		let counters = Counters::default();
		counters.evicted(EvictionReason::Expired);
		counters.evicted(EvictionReason::TokenExpired);
		counters.evicted(EvictionReason::Capacity);
		counters.evicted(EvictionReason::Removed);
		counters.evicted(EvictionReason::Replaced);

		let metrics = counters.snapshot(0, None, 0);
		assert_eq!(metrics.expirations, 2);
		assert_eq!(metrics.evictions, 1);
		assert_eq!(metrics.removals, 1);
	}

	#[test]
	fn test_utilization() {
		let counters = Counters::default();
		assert_eq!(counters.snapshot(50, Some(200), 1).utilization(), 0.25);
		assert_eq!(counters.snapshot(50, None, 1).utilization(), 0.0);
	}
}
