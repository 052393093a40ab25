//! Shard implementation for partitioned cache storage.
//!
//! A `Shard` is a single partition of the store. The `MemoryStore` holds many
//! of them, each wrapped in an `RwLock`, and routes keys by their pre-computed
//! hash. A shard knows nothing about capacity or callbacks: it stores, finds
//! and removes entries, and reports which ones are expired or evictable.
//!
//! Entries live in a `hashbrown::HashTable` keyed by the `ErasedKey` hash, so
//! lookups with a borrowed key never allocate and never re-hash.

use std::sync::atomic::Ordering;

use hashbrown::HashTable;
use hashbrown::hash_table::Entry as TableEntry;

use crate::erased::{Entry, ErasedKey, ErasedKeyRef};
use crate::options::EvictionReason;
use crate::traits::{CacheKey, CachePolicy};

/// An entry that compaction may remove, identified without holding a borrow.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
	pub hash: u64,
	pub id: u64,
	pub policy: CachePolicy,
	pub last_access: u64,
}

#[derive(Default)]
pub(crate) struct Shard {
	entries: HashTable<(ErasedKey, Entry)>,
}

impl Shard {
	pub fn new() -> Self {
		Self::default()
	}

	/// Find an entry by borrowed key (zero allocation).
	pub fn get_ref<K: CacheKey>(&self, key_ref: &ErasedKeyRef<'_, K>) -> Option<&Entry> {
		self.entries.find(key_ref.hash, |(stored, _)| key_ref.equals(stored)).map(|(_, entry)| entry)
	}

	/// Insert an entry, returning the one it replaced.
	pub fn insert<K: CacheKey>(&mut self, key: ErasedKey, entry: Entry) -> Option<(ErasedKey, Entry)> {
		let slot = {
			let probe = key.downcast_ref::<K>();
			self.entries.entry(
				key.hash,
				|(stored, _)| stored.type_id == key.type_id && stored.downcast_ref::<K>() == probe,
				|(stored, _)| stored.hash,
			)
		};

		match slot {
			TableEntry::Occupied(mut occupied) => Some(std::mem::replace(occupied.get_mut(), (key, entry))),
			TableEntry::Vacant(vacant) => {
				vacant.insert((key, entry));
				None
			}
		}
	}

	/// Remove the entry stored under a key.
	pub fn remove<K: CacheKey>(&mut self, key_ref: &ErasedKeyRef<'_, K>) -> Option<(ErasedKey, Entry)> {
		let occupied = self.entries.find_entry(key_ref.hash, |(stored, _)| key_ref.equals(stored)).ok()?;
		let (pair, _) = occupied.remove();
		Some(pair)
	}

	/// Remove one specific entry, leaving any newer entry under the same key alone.
	pub fn remove_by_id(&mut self, hash: u64, id: u64) -> Option<(ErasedKey, Entry)> {
		let occupied = self.entries.find_entry(hash, |(_, entry)| entry.id == id).ok()?;
		let (pair, _) = occupied.remove();
		Some(pair)
	}

	/// Remove every entry that is expired at `now`.
	pub fn drain_expired(&mut self, now: u64) -> Vec<(ErasedKey, Entry, EvictionReason)> {
		let expired: Vec<_> = self
			.entries
			.iter()
			.filter_map(|(key, entry)| entry.check_expired(now).map(|reason| (key.hash, entry.id, reason)))
			.collect();

		expired
			.into_iter()
			.filter_map(|(hash, id, reason)| self.remove_by_id(hash, id).map(|(key, entry)| (key, entry, reason)))
			.collect()
	}

	/// Append every entry compaction is allowed to remove.
	pub fn collect_candidates(&self, out: &mut Vec<Candidate>) {
		out.extend(self.entries.iter().filter(|(_, entry)| entry.policy.is_evictable()).map(|(key, entry)| {
			Candidate {
				hash: key.hash,
				id: entry.id,
				policy: entry.policy,
				last_access: entry.last_access.load(Ordering::Relaxed),
			}
		}));
	}

	/// Remove and return all entries.
	pub fn drain(&mut self) -> Vec<(ErasedKey, Entry)> {
		self.entries.drain().collect()
	}

	/// Number of entries in this shard.
	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.len()
	}
}
