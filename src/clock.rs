use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source consulted by the store for expiration decisions.
pub trait Clock: Send + Sync {
	fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Clock that only moves when told to.
///
/// Share it with the store through `Arc<ManualClock>` and call
/// [`advance`](ManualClock::advance) to step time forward deterministically.
pub struct ManualClock {
	base: Instant,
	offset_nanos: AtomicU64,
}

impl ManualClock {
	pub fn new() -> Self {
		Self {
			base: Instant::now(),
			offset_nanos: AtomicU64::new(0),
		}
	}

	/// Move the clock forward.
	pub fn advance(&self, by: Duration) {
		let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
		self.offset_nanos.fetch_add(nanos, Ordering::AcqRel);
	}

	/// Total time advanced since creation.
	pub fn elapsed(&self) -> Duration {
		Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.base + self.elapsed()
	}
}

impl fmt::Debug for ManualClock {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManualClock").field("elapsed", &self.elapsed()).finish()
	}
}
