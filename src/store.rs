use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::builder::{StoreBuilder, StoreOptions};
use crate::clock::Clock;
use crate::entry::EntryBuilder;
use crate::erased::{Entry, ErasedKey, ErasedKeyRef};
use crate::error::{Error, Result};
use crate::metrics::{CacheMetrics, Counters};
use crate::options::{EntryOptions, Evicted, EvictionReason};
use crate::shard::Shard;
use crate::traits::CacheKey;

/// An entry on its way out, with the reason it is leaving.
type Departed = (ErasedKey, Entry, EvictionReason);

/// Thread-safe in-memory store with expiration, size limits and eviction callbacks.
///
/// The store can be shared across threads via `Arc<MemoryStore>`. All methods are
/// synchronous and never block on anything but the lock of the shard they touch.
///
/// # Expiration
///
/// An entry expires when its absolute deadline passes, when it has not been read
/// within its sliding window, or when one of its expiration tokens changes.
/// Expiration is evaluated lazily: a lookup never returns an expired entry and
/// purges it on the spot, and the first operation after
/// [`expiration_scan_frequency`](StoreBuilder::expiration_scan_frequency) has
/// elapsed sweeps the whole store. No background thread is started.
///
/// # Capacity
///
/// With a size limit, every entry must declare a size. An insert that does not
/// fit triggers a compaction (expired entries first, then by
/// [`CachePolicy`](crate::CachePolicy), least recently used first). If the entry
/// still does not fit it is not stored and its eviction callbacks run with
/// [`EvictionReason::Capacity`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use weak_cache::MemoryStore;
///
/// let store = MemoryStore::new();
/// store
///     .entry("greeting")
///     .sliding_expiration(Duration::from_secs(60))
///     .insert(String::from("hello"))
///     .unwrap();
///
/// let value = store.get::<_, String>(&"greeting").unwrap();
/// assert_eq!(value.as_str(), "hello");
/// ```
pub struct MemoryStore {
	/// Sharded storage
	shards: Box<[RwLock<Shard>]>,
	/// Number of shards (power of two)
	shard_count: usize,
	clock: Arc<dyn Clock>,
	/// All timestamps are nanoseconds since this instant
	origin: Instant,
	size_limit: Option<u64>,
	compaction_percentage: f64,
	scan_frequency: u64,
	last_scan: AtomicU64,
	/// Sum of entry sizes
	current_size: AtomicU64,
	entry_count: AtomicUsize,
	next_id: AtomicU64,
	counters: Counters,
}

enum Lookup {
	Miss,
	Hit(Arc<dyn Any + Send + Sync>),
	Expired {
		id: u64,
		reason: EvictionReason,
	},
}

#[derive(Debug, Clone, Copy)]
enum Goal {
	Count(usize),
	Size(u64),
}

impl Goal {
	fn met(self, removed: usize, freed: u64) -> bool {
		match self {
			Goal::Count(target) => removed >= target,
			Goal::Size(target) => freed >= target,
		}
	}
}

fn duration_nanos(duration: Duration) -> u64 {
	u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl MemoryStore {
	/// Create a store with default settings: unbounded, 16 shards, a sweep at most
	/// once a minute.
	pub fn new() -> Self {
		StoreBuilder::new().build()
	}

	pub fn with_options(options: StoreOptions) -> Self {
		StoreBuilder::from_options(options).build()
	}

	pub fn builder() -> StoreBuilder {
		StoreBuilder::new()
	}

	/// Construct from options already validated by the builder.
	pub(crate) fn from_parts(options: StoreOptions, clock: Arc<dyn Clock>) -> Self {
		let shard_count = options.shards.next_power_of_two();
		let shards = (0..shard_count).map(|_| RwLock::new(Shard::new())).collect();
		let origin = clock.now();

		Self {
			shards,
			shard_count,
			clock,
			origin,
			size_limit: options.size_limit,
			compaction_percentage: options.compaction_percentage,
			scan_frequency: duration_nanos(options.expiration_scan_frequency),
			last_scan: AtomicU64::new(0),
			current_size: AtomicU64::new(0),
			entry_count: AtomicUsize::new(0),
			next_id: AtomicU64::new(0),
			counters: Counters::default(),
		}
	}

	/// Start creating or replacing the entry for `key`.
	///
	/// Nothing is stored until [`EntryBuilder::insert`] is called.
	pub fn entry<K: CacheKey>(&self, key: K) -> EntryBuilder<'_, K> {
		EntryBuilder::new(self, key)
	}

	/// Store `value` under `key` with default options, replacing any previous entry.
	pub fn insert<K: CacheKey, V: Send + Sync + 'static>(&self, key: K, value: V) -> Result<()> {
		self.entry(key).insert(value)
	}

	/// Store an entry. Called by [`EntryBuilder`].
	pub(crate) fn commit<K: CacheKey>(
		&self,
		key: K,
		value: Arc<dyn Any + Send + Sync>,
		options: EntryOptions,
	) -> Result<()> {
		options.validate()?;
		if self.size_limit.is_some() && options.size.is_none() {
			return Err(Error::SizeRequired);
		}

		let instant = self.clock.now();
		let now = self.ticks(instant);
		let deadline = options.deadline(instant).map(|at| self.ticks(at));
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let mut entry = Entry::new(id, value, options, deadline, now);

		for token in entry.tokens.iter().filter(|token| token.active_change_callbacks()) {
			let expired = Arc::clone(&entry.expired);
			let registration =
				token.register_change_callback(Box::new(move || expired.store(true, Ordering::Release)))?;
			entry.registrations.push(registration);
		}

		let key = ErasedKey::new(key);

		if let Some(reason) = entry.check_expired(now) {
			trace!(id, ?reason, "entry expired before it was stored");
			self.reject::<K>(key, entry, reason);
			return Ok(());
		}

		if !self.reserve(entry.size) {
			self.make_room(entry.size, now);
			if !self.reserve(entry.size) {
				debug!(id, size = entry.size, limit = ?self.size_limit, "entry does not fit, rejecting");
				self.reject::<K>(key, entry, EvictionReason::Capacity);
				return Ok(());
			}
		}

		let hash = key.hash;
		let replaced = {
			let mut shard = self.shard(hash).write();
			let replaced = shard.insert::<K>(key, entry);
			// Counters move under the guard so `len` always matches the tables.
			match &replaced {
				Some((_, old_entry)) => {
					self.current_size.fetch_sub(old_entry.size, Ordering::AcqRel);
				}
				None => {
					self.entry_count.fetch_add(1, Ordering::Relaxed);
				}
			}
			replaced
		}; // Lock released here

		self.counters.insert(replaced.is_some());
		if let Some((old_key, old_entry)) = replaced {
			self.notify(vec![(old_key, old_entry, EvictionReason::Replaced)]);
		}
		trace!(id, "entry stored");

		self.maybe_scan(now);
		Ok(())
	}

	/// Drop a new entry without storing it. Any previous entry under the same key
	/// is removed as replaced, matching create-or-replace semantics.
	fn reject<K: CacheKey>(&self, key: ErasedKey, entry: Entry, reason: EvictionReason) {
		let mut departed = Vec::with_capacity(2);

		if let Some(concrete) = key.downcast_ref::<K>() {
			let key_ref = ErasedKeyRef::new(concrete);
			let prior = self.take(key_ref.hash, |shard| shard.remove(&key_ref));
			if let Some((prior_key, prior_entry)) = prior {
				departed.push((prior_key, prior_entry, EvictionReason::Replaced));
			}
		}

		departed.push((key, entry, reason));
		self.notify(departed);
	}

	/// Retrieve the payload stored under `key`, whatever its type.
	///
	/// An expired entry is removed during this call and reported as absent.
	/// A hit restarts the entry's sliding expiration window.
	pub fn get_any<K: CacheKey>(&self, key: &K) -> Option<Arc<dyn Any + Send + Sync>> {
		let now = self.now();
		let key_ref = ErasedKeyRef::new(key);

		let lookup = {
			let shard = self.shard(key_ref.hash).read();
			match shard.get_ref(&key_ref) {
				None => Lookup::Miss,
				Some(entry) => match entry.check_expired(now) {
					Some(reason) => Lookup::Expired {
						id: entry.id,
						reason,
					},
					None => {
						entry.touch(now);
						Lookup::Hit(Arc::clone(&entry.value))
					}
				},
			}
		}; // Lock released here

		let value = match lookup {
			Lookup::Hit(value) => Some(value),
			Lookup::Miss => None,
			Lookup::Expired {
				id,
				reason,
			} => {
				self.remove_departed(key_ref.hash, id, reason);
				None
			}
		};

		if value.is_some() {
			self.counters.hit();
		} else {
			self.counters.miss();
		}

		self.maybe_scan(now);
		value
	}

	/// Retrieve the payload stored under `key` as a `V`.
	///
	/// Returns `None` if there is no live entry or the payload is not a `V`.
	pub fn get<K: CacheKey, V: Send + Sync + 'static>(&self, key: &K) -> Option<Arc<V>> {
		self.get_any(key)?.downcast::<V>().ok()
	}

	/// Check for a live entry without refreshing its sliding window.
	pub fn contains<K: CacheKey>(&self, key: &K) -> bool {
		let now = self.now();
		let key_ref = ErasedKeyRef::new(key);
		let shard = self.shard(key_ref.hash).read();
		shard.get_ref(&key_ref).is_some_and(|entry| entry.check_expired(now).is_none())
	}

	/// Payload of a live entry, without refreshing its sliding window or
	/// counting a hit.
	pub(crate) fn peek<K: CacheKey>(&self, key: &K) -> Option<Arc<dyn Any + Send + Sync>> {
		let now = self.now();
		let key_ref = ErasedKeyRef::new(key);
		let shard = self.shard(key_ref.hash).read();
		shard
			.get_ref(&key_ref)
			.filter(|entry| entry.check_expired(now).is_none())
			.map(|entry| Arc::clone(&entry.value))
	}

	/// Remove the entry for `key`. Returns whether there was one.
	pub fn remove<K: CacheKey>(&self, key: &K) -> bool {
		let now = self.now();
		let key_ref = ErasedKeyRef::new(key);

		let removed = self.take(key_ref.hash, |shard| shard.remove(&key_ref));
		let found = removed.is_some();
		if let Some((key, entry)) = removed {
			self.notify(vec![(key, entry, EvictionReason::Removed)]);
		}

		self.maybe_scan(now);
		found
	}

	/// Remove all entries. Eviction callbacks run with [`EvictionReason::Removed`].
	pub fn clear(&self) {
		let mut departed = Vec::new();
		for shard_lock in self.shards.iter() {
			let mut shard = shard_lock.write();
			let drained = shard.drain();
			for (_, entry) in &drained {
				self.release(entry);
			}
			drop(shard);
			departed.extend(drained.into_iter().map(|(key, entry)| (key, entry, EvictionReason::Removed)));
		}
		debug!(removed = departed.len(), "store cleared");
		self.notify(departed);

		// Reset all metrics
		self.counters.reset();
	}

	/// Remove all expired entries plus at least `percentage` (0.0 to 1.0) of the
	/// current entry count, lowest policy and least recently used first.
	///
	/// Returns the number of entries removed.
	pub fn compact(&self, percentage: f64) -> usize {
		let percentage = percentage.clamp(0.0, 1.0);
		let target = (self.len() as f64 * percentage) as usize;
		self.evict(Goal::Count(target), self.now())
	}

	/// Sweep the store for expired entries now. Returns the number removed.
	///
	/// This also runs automatically; see [`StoreBuilder::expiration_scan_frequency`].
	pub fn scan_expired(&self) -> usize {
		let now = self.now();
		self.last_scan.store(now, Ordering::Relaxed);
		self.purge_expired(now)
	}

	/// Number of entries, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.entry_count.load(Ordering::Relaxed)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Sum of entry sizes.
	pub fn size(&self) -> u64 {
		self.current_size.load(Ordering::Relaxed)
	}

	pub fn size_limit(&self) -> Option<u64> {
		self.size_limit
	}

	pub fn shard_count(&self) -> usize {
		self.shard_count
	}

	/// Get a performance metrics snapshot.
	pub fn metrics(&self) -> CacheMetrics {
		self.counters.snapshot(self.size(), self.size_limit, self.len())
	}

	/// Get the shard for a given hash.
	fn shard(&self, hash: u64) -> &RwLock<Shard> {
		let index = (hash as usize) & (self.shard_count - 1);
		&self.shards[index]
	}

	fn now(&self) -> u64 {
		self.ticks(self.clock.now())
	}

	fn ticks(&self, at: Instant) -> u64 {
		duration_nanos(at.saturating_duration_since(self.origin))
	}

	/// Claim `size` against the limit. Fails without side effects if it does not fit.
	fn reserve(&self, size: u64) -> bool {
		match self.size_limit {
			None => {
				self.current_size.fetch_add(size, Ordering::AcqRel);
				true
			}
			Some(limit) => self
				.current_size
				.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
					current.checked_add(size).filter(|next| *next <= limit)
				})
				.is_ok(),
		}
	}

	/// Account for an entry that has left the store.
	fn release(&self, entry: &Entry) {
		self.current_size.fetch_sub(entry.size, Ordering::AcqRel);
		self.entry_count.fetch_sub(1, Ordering::Relaxed);
	}

	/// Compact enough to fit an entry of `size`, and at least the configured
	/// fraction of the limit so back-to-back inserts do not compact every time.
	fn make_room(&self, size: u64, now: u64) {
		let Some(limit) = self.size_limit else {
			return;
		};
		if size > limit {
			return;
		}
		let needed = self.size().saturating_add(size).saturating_sub(limit);
		let floor = (limit as f64 * self.compaction_percentage) as u64;
		self.evict(Goal::Size(needed.max(floor)), now);
	}

	/// Remove expired entries, then evictable entries until `goal` is met.
	fn evict(&self, goal: Goal, now: u64) -> usize {
		let mut departed = self.drain_expired(now);

		let mut removed = departed.len();
		let mut freed: u64 = departed.iter().map(|(_, entry, _)| entry.size).sum();

		if !goal.met(removed, freed) {
			let mut candidates = Vec::new();
			for shard_lock in self.shards.iter() {
				shard_lock.read().collect_candidates(&mut candidates);
			}
			candidates.sort_by_key(|candidate| (candidate.policy.eviction_rank(), candidate.last_access));

			for candidate in candidates {
				if goal.met(removed, freed) {
					break;
				}
				let evicted = self.take(candidate.hash, |shard| shard.remove_by_id(candidate.hash, candidate.id));
				if let Some((key, entry)) = evicted {
					removed += 1;
					freed = freed.saturating_add(entry.size);
					departed.push((key, entry, EvictionReason::Capacity));
				}
			}
		}

		debug!(removed, freed, ?goal, "store compacted");
		self.notify(departed);
		removed
	}

	fn purge_expired(&self, now: u64) -> usize {
		let departed = self.drain_expired(now);

		let removed = departed.len();
		debug!(removed, "swept expired entries");
		self.notify(departed);
		removed
	}

	/// Sweep if the scan interval has elapsed. Only one caller wins the sweep.
	fn maybe_scan(&self, now: u64) {
		let last = self.last_scan.load(Ordering::Relaxed);
		if now.saturating_sub(last) < self.scan_frequency {
			return;
		}
		if self.last_scan.compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
			self.purge_expired(now);
		}
	}

	/// Remove one specific entry found expired during a lookup.
	fn remove_departed(&self, hash: u64, id: u64, reason: EvictionReason) {
		let removed = self.take(hash, |shard| shard.remove_by_id(hash, id));
		if let Some((key, entry)) = removed {
			self.notify(vec![(key, entry, reason)]);
		}
	}

	/// Remove through `remove` under the shard's write lock, releasing the
	/// entry's accounting before the lock drops.
	fn take(
		&self,
		hash: u64,
		remove: impl FnOnce(&mut Shard) -> Option<(ErasedKey, Entry)>,
	) -> Option<(ErasedKey, Entry)> {
		let mut shard = self.shard(hash).write();
		let removed = remove(&mut *shard);
		if let Some((_, entry)) = &removed {
			self.release(entry);
		}
		removed
	}

	fn drain_expired(&self, now: u64) -> Vec<Departed> {
		let mut departed = Vec::new();
		for shard_lock in self.shards.iter() {
			let mut shard = shard_lock.write();
			let drained = shard.drain_expired(now);
			for (_, entry, _) in &drained {
				self.release(entry);
			}
			drop(shard);
			departed.extend(drained);
		}
		departed
	}

	/// Run eviction callbacks. Must be called with no shard lock held.
	fn notify(&self, departed: Vec<Departed>) {
		for (key, entry, reason) in departed {
			self.counters.evicted(reason);
			trace!(id = entry.id, ?reason, "entry left the store");
			if entry.callbacks.is_empty() {
				continue;
			}

			let evicted = Evicted {
				key: key.data.as_ref(),
				value: &entry.value,
				reason,
			};
			for callback in &entry.callbacks {
				callback(&evicted);
			}
		}
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for MemoryStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryStore")
			.field("len", &self.len())
			.field("size", &self.size())
			.field("size_limit", &self.size_limit)
			.field("shard_count", &self.shard_count)
			.finish_non_exhaustive()
	}
}
