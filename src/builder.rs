use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::store::MemoryStore;

/// Default number of shards.
pub(crate) const DEFAULT_SHARD_COUNT: usize = 16;

/// Store-wide settings.
///
/// With the `serde` feature this can be read straight out of a host
/// application's configuration file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreOptions {
	/// Upper bound on the sum of entry sizes. `None` means unbounded.
	pub size_limit: Option<u64>,
	/// Number of lock partitions, rounded up to a power of two.
	pub shards: usize,
	/// Minimum time between automatic sweeps for expired entries.
	pub expiration_scan_frequency: Duration,
	/// Fraction of the size limit freed when an insert does not fit.
	pub compaction_percentage: f64,
}

impl Default for StoreOptions {
	fn default() -> Self {
		Self {
			size_limit: None,
			shards: DEFAULT_SHARD_COUNT,
			expiration_scan_frequency: Duration::from_secs(60),
			compaction_percentage: 0.05,
		}
	}
}

/// Builder for configuring a [`MemoryStore`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use weak_cache::StoreBuilder;
///
/// let store = StoreBuilder::new()
///     .size_limit(10_000)
///     .shards(32)
///     .expiration_scan_frequency(Duration::from_secs(10))
///     .build();
/// assert_eq!(store.size_limit(), Some(10_000));
/// ```
pub struct StoreBuilder {
	options: StoreOptions,
	clock: Arc<dyn Clock>,
}

impl StoreBuilder {
	pub fn new() -> Self {
		Self::from_options(StoreOptions::default())
	}

	/// Start from existing options, e.g. ones loaded from configuration.
	pub fn from_options(options: StoreOptions) -> Self {
		Self {
			options,
			clock: Arc::new(SystemClock),
		}
	}

	/// Cap the sum of entry sizes. Every entry must then carry a size.
	pub fn size_limit(mut self, limit: u64) -> Self {
		self.options.size_limit = Some(limit);
		self
	}

	/// Set the number of shards.
	///
	/// More shards reduce contention but increase memory overhead.
	/// Will be rounded up to the next power of 2.
	///
	/// Default: 16 shards
	pub fn shards(mut self, count: usize) -> Self {
		self.options.shards = count;
		self
	}

	/// How often an operation on the store also sweeps out expired entries.
	///
	/// Default: 60 seconds
	pub fn expiration_scan_frequency(mut self, every: Duration) -> Self {
		self.options.expiration_scan_frequency = every;
		self
	}

	/// Fraction of the size limit to free when an insert does not fit.
	/// Valid range: 0.0 to 1.0.
	///
	/// Default: 0.05 (5%)
	pub fn compaction_percentage(mut self, percent: f64) -> Self {
		self.options.compaction_percentage = percent;
		self
	}

	/// Replace the time source. Mostly useful with [`ManualClock`](crate::ManualClock) in tests.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Build the store with the configured settings.
	pub fn build(self) -> MemoryStore {
		let options = self.options;
		assert!(options.shards > 0, "shards must be greater than 0");
		assert!(
			options.shards.checked_next_power_of_two().is_some(),
			"shards must round up to a representable power of two"
		);
		assert!(
			(0.0..=1.0).contains(&options.compaction_percentage),
			"compaction_percentage must be between 0.0 and 1.0"
		);
		assert!(
			!options.expiration_scan_frequency.is_zero(),
			"expiration_scan_frequency must be positive"
		);

		MemoryStore::from_parts(options, self.clock)
	}
}

impl Default for StoreBuilder {
	fn default() -> Self {
		Self::new()
	}
}
