//! # Weak Cache
//!
//! A concurrent, in-memory cache that holds its values through weak references:
//! - **Never extends lifetimes**: a cached value stays visible exactly as long as
//!   something outside the cache keeps an `Arc` to it
//! - **Heterogeneous storage** (multiple key/value types without a unified enum)
//! - **Expiration**: absolute, sliding, and token-driven
//! - **Size-bounded capacity** with policy-ordered compaction
//! - **Read-optimized concurrency** via fine-grained sharding
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use weak_cache::WeakCache;
//!
//! #[derive(Debug)]
//! struct Session {
//!     user: String,
//! }
//!
//! let cache = WeakCache::new();
//!
//! // The cache returns the value it was given and keeps only a weak handle.
//! let session = cache.set(42u64, Arc::new(Session { user: "alice".into() })).unwrap();
//!
//! if let Some(found) = cache.get::<_, Session>(&42u64) {
//!     println!("User: {}", found.user);
//! }
//!
//! // Once the last strong reference is gone, so is the entry.
//! drop(session);
//! assert!(cache.get::<_, Session>(&42u64).is_none());
//! ```
//!
//! ## Entry Options
//!
//! Weak entries accept the same options as any other store entry:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use weak_cache::{CachePolicy, EntryOptions, WeakCache};
//!
//! let cache = WeakCache::new();
//! let options = EntryOptions::new()
//!     .sliding_expiration(Duration::from_secs(300))
//!     .policy(CachePolicy::Critical)
//!     .on_eviction(|evicted| println!("gone: {:?}", evicted.reason));
//!
//! let report = cache.set_with("report", Arc::new(vec![1u8, 2, 3]), &options).unwrap();
//! assert!(cache.contains(&"report"));
//! # drop(report);
//! ```
//!
//! ## The Underlying Store
//!
//! [`MemoryStore`] is a general-purpose cache in its own right. The weak
//! operations are also available on a bare store through [`WeakStoreExt`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use weak_cache::{MemoryStore, WeakStoreExt};
//!
//! let store = MemoryStore::builder().shards(4).build();
//! store.insert("answer", 42u32).unwrap();
//!
//! let name = store.set_weak("name", Arc::new(String::from("weak"))).unwrap();
//! assert_eq!(store.get::<_, u32>(&"answer").as_deref(), Some(&42));
//! assert_eq!(store.get_weak::<_, String>(&"name").as_deref(), Some(&*name));
//! ```
//!
//! ## Thread Safety
//!
//! Both [`WeakCache`] and [`MemoryStore`] are `Send + Sync` and can be shared
//! across threads via `Arc`. Lookups return an owned `Arc`, so no lock is held
//! once a call returns and results can be kept across await points.

mod builder;
mod clock;
mod entry;
mod erased;
mod error;
mod metrics;
mod options;
mod shard;
mod store;
mod token;
mod traits;
mod weak;
mod weak_cache;

pub use builder::{StoreBuilder, StoreOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::EntryBuilder;
pub use error::{Error, Result};
pub use metrics::CacheMetrics;
pub use options::{EntryOptions, Evicted, EvictionCallback, EvictionReason};
pub use store::MemoryStore;
pub use token::{ChangeCallback, ExpirationToken, Registration, SignalToken};
pub use traits::{CacheKey, CachePolicy};
pub use weak::{ErasedWeak, ResolveWeak, WeakHandle, WeakToken};
pub use weak_cache::{WeakCache, WeakStoreExt};
