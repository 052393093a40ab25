use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use weak_cache::{CachePolicy, EntryOptions, MemoryStore, StoreBuilder, WeakCache, WeakStoreExt};

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct TestKey(u64);

#[derive(Clone, Debug, PartialEq)]
struct TestValue {
	id: u64,
}

fn policy_strategy() -> impl Strategy<Value = CachePolicy> {
	prop_oneof![
		Just(CachePolicy::Pinned),
		Just(CachePolicy::Critical),
		Just(CachePolicy::Standard),
		Just(CachePolicy::Volatile),
	]
}

proptest! {
	#[test]
	fn test_set_get_consistency(keys in prop::collection::vec(0u64..100, 1..50)) {
		let cache = WeakCache::new();
		let mut held = HashMap::new();

		for key in &keys {
			let value = cache.set(TestKey(*key), Arc::new(TestValue { id: *key })).expect("set should succeed");
			held.insert(*key, value);
		}

		for (key, value) in &held {
			let found = cache.get::<_, TestValue>(&TestKey(*key));
			prop_assert!(found.is_some_and(|found| Arc::ptr_eq(&found, value)));
		}
		prop_assert_eq!(cache.len(), held.len());
	}

	#[test]
	fn test_dropped_values_disappear(
		keys in prop::collection::hash_set(0u64..200, 1..60),
		drop_mask in prop::collection::vec(any::<bool>(), 60)
	) {
		let cache = WeakCache::new();
		let mut kept = Vec::new();
		let mut dropped = Vec::new();

		for (index, key) in keys.iter().enumerate() {
			let value = cache.set(TestKey(*key), Arc::new(TestValue { id: *key })).expect("set should succeed");
			if drop_mask[index] {
				dropped.push(*key);
			} else {
				kept.push((*key, value));
			}
		}

		for key in &dropped {
			prop_assert!(cache.get::<_, TestValue>(&TestKey(*key)).is_none());
		}
		for (key, value) in &kept {
			prop_assert_eq!(cache.get::<_, TestValue>(&TestKey(*key)).map(|found| found.id), Some(value.id));
		}
		// Every dropped key was purged by its own lookup.
		prop_assert_eq!(cache.len(), kept.len());
	}

	#[test]
	fn test_size_never_exceeds_limit(
		operations in prop::collection::vec((0u64..20, 1u64..40, policy_strategy()), 1..40)
	) {
		let limit = 100;
		let store = StoreBuilder::new().size_limit(limit).build();
		let mut held = Vec::new();

		for (key, size, policy) in operations {
			let options = EntryOptions::new().size(size).policy(policy);
			held.push(store.set_weak_with(TestKey(key), Arc::new(TestValue { id: key }), &options).expect("set should succeed"));
			prop_assert!(store.size() <= limit);
		}
	}

	#[test]
	fn test_remove_decreases_size(
		inserts in prop::collection::vec((0u64..50, 1u64..20), 10..20),
		remove_indices in prop::collection::vec(0usize..10, 1..5)
	) {
		let store = MemoryStore::new();
		let mut inserted_keys = Vec::new();

		for (key, size) in inserts {
			store.entry(TestKey(key)).size(size).insert(TestValue { id: key }).expect("insert should succeed");
			inserted_keys.push(TestKey(key));
		}

		let size_before = store.size();

		for &idx in &remove_indices {
			if idx < inserted_keys.len() {
				store.remove(&inserted_keys[idx]);
			}
		}

		prop_assert!(store.size() <= size_before);
	}

	#[test]
	fn test_size_matches_live_entries(operations in prop::collection::vec((0u64..30, 1u64..50, any::<bool>()), 1..60)) {
		let store = MemoryStore::new();
		let mut model: HashMap<u64, u64> = HashMap::new();

		for (key, size, remove) in operations {
			if remove {
				prop_assert_eq!(store.remove(&TestKey(key)), model.remove(&key).is_some());
			} else {
				store.entry(TestKey(key)).size(size).insert(TestValue { id: key }).expect("insert should succeed");
				model.insert(key, size);
			}
		}

		prop_assert_eq!(store.len(), model.len());
		prop_assert_eq!(store.size(), model.values().sum::<u64>());
	}

	#[test]
	fn test_clear_empties_store(operations in prop::collection::vec((0u64..100, 1u64..100), 1..50)) {
		let store = MemoryStore::new();

		for (key, size) in operations {
			store.entry(TestKey(key)).size(size).insert(TestValue { id: key }).expect("insert should succeed");
		}

		store.clear();

		prop_assert_eq!(store.len(), 0);
		prop_assert_eq!(store.size(), 0);
		prop_assert!(store.is_empty());
	}

	#[test]
	fn test_update_existing_key(key in 0u64..100, ids in prop::collection::vec(0u64..1000, 2..10)) {
		let cache = WeakCache::new();
		let mut last = None;

		for id in ids {
			last = Some(cache.set(TestKey(key), Arc::new(TestValue { id })).expect("set should succeed"));
		}

		let last = last.expect("at least two writes");
		let found = cache.get::<_, TestValue>(&TestKey(key));
		prop_assert!(found.is_some_and(|found| Arc::ptr_eq(&found, &last)));
		prop_assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_not_contains_after_remove(keys in prop::collection::vec(0u64..50, 5..20)) {
		let cache = WeakCache::new();
		let mut held = Vec::new();

		for key in &keys {
			held.push(cache.set(TestKey(*key), Arc::new(TestValue { id: *key })).expect("set should succeed"));
		}

		for key in &keys {
			cache.remove(&TestKey(*key));
			prop_assert!(!cache.contains(&TestKey(*key)));
		}
		prop_assert!(cache.is_empty());
	}

	#[test]
	fn test_compact_respects_pinned(
		policies in prop::collection::vec(policy_strategy(), 1..40),
		percentage in 0.0f64..=1.0
	) {
		let store = MemoryStore::new();
		let pinned = policies.iter().filter(|policy| **policy == CachePolicy::Pinned).count();

		for (key, policy) in policies.iter().enumerate() {
			store.entry(TestKey(key as u64)).policy(*policy).insert(TestValue { id: key as u64 }).expect("insert should succeed");
		}

		store.compact(percentage);
		prop_assert!(store.len() >= pinned);
	}
}

#[test]
fn test_no_panics_on_empty_operations() {
	let cache = WeakCache::new();

	// Operations on empty cache should not panic
	assert!(cache.get::<_, TestValue>(&TestKey(1)).is_none());
	assert!(cache.get_any(&TestKey(1)).is_none());
	assert!(!cache.remove(&TestKey(1)));
	assert!(!cache.contains(&TestKey(1)));
	assert_eq!(cache.len(), 0);
	assert_eq!(cache.compact(1.0), 0);

	cache.clear(); // Should not panic
}

#[test]
fn test_duplicate_insertions() {
	let cache = WeakCache::new();
	let key = TestKey(1);
	let mut held = Vec::new();

	for id in 0..100 {
		held.push(cache.set(key, Arc::new(TestValue { id })).expect("set should succeed"));
	}

	// Should have exactly one entry
	assert_eq!(cache.len(), 1);
	assert_eq!(cache.get::<_, TestValue>(&key).map(|found| found.id), Some(99));
}
