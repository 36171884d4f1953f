use std::{
	num::NonZeroUsize,
	sync::Mutex,
	time::{Duration, Instant},
};

use lru::LruCache;
use weir_domain::SearchResult;

const DEFAULT_CAPACITY: usize = 512;
const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct Entry {
	results: Vec<SearchResult>,
	expires_at: Instant,
}

/// Capacity- and TTL-bounded L1 result cache.
///
/// Values are owned copies of the published result list, so neither the
/// cache nor its callers can observe each other's mutations. Expired
/// entries count as misses and are evicted on access.
pub struct ResultCache {
	inner: Mutex<LruCache<String, Entry>>,
	default_ttl: Duration,
}
impl ResultCache {
	pub fn new(capacity: usize, default_ttl: Duration) -> Self {
		let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
		let default_ttl = if default_ttl.is_zero() { DEFAULT_TTL } else { default_ttl };
		let capacity = NonZeroUsize::new(capacity)
			.unwrap_or_else(|| unreachable!("cache capacity is forced non-zero above"));

		Self { inner: Mutex::new(LruCache::new(capacity)), default_ttl }
	}

	/// Returns a copy of the cached list, promoting the entry to MRU.
	pub fn get(&self, key: &str) -> Option<Vec<SearchResult>> {
		let mut inner = self.lock();
		let expired = match inner.get(key) {
			Some(entry) => {
				if entry.expires_at > Instant::now() {
					return Some(entry.results.clone());
				}

				true
			},
			None => false,
		};

		if expired {
			inner.pop(key);
		}

		None
	}

	/// Stores a result list; a zero `ttl` means the cache default. The LRU
	/// entry is evicted when capacity overflows.
	pub fn set(&self, key: String, results: Vec<SearchResult>, ttl: Option<Duration>) {
		let ttl = ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(self.default_ttl);
		let entry = Entry { results, expires_at: Instant::now() + ttl };

		self.lock().put(key, entry);
	}

	pub fn purge(&self) {
		self.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use weir_domain::Document;

	use super::*;

	fn results(id: &str) -> Vec<SearchResult> {
		vec![SearchResult::new(Document::new(id, format!("content {id}")), 0.5)]
	}

	#[test]
	fn reads_are_independent_copies() {
		let cache = ResultCache::new(4, Duration::from_secs(60));

		cache.set("k".to_string(), results("a"), None);

		let mut first = cache.get("k").expect("entry must be present");
		let second = cache.get("k").expect("entry must be present");

		first[0].document.content = "mutated".to_string();

		assert_eq!(second[0].document.content, "content a");
		assert_eq!(
			cache.get("k").expect("entry must survive reads")[0].document.content,
			"content a"
		);
	}

	#[test]
	fn expired_entries_miss_and_are_evicted() {
		let cache = ResultCache::new(4, Duration::from_secs(60));

		cache.set("k".to_string(), results("a"), Some(Duration::from_millis(1)));
		std::thread::sleep(Duration::from_millis(5));

		assert!(cache.get("k").is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn capacity_overflow_evicts_the_lru_entry() {
		let cache = ResultCache::new(2, Duration::from_secs(60));

		cache.set("a".to_string(), results("a"), None);
		cache.set("b".to_string(), results("b"), None);

		// Touch `a` so `b` becomes the eviction candidate.
		let _ = cache.get("a");

		cache.set("c".to_string(), results("c"), None);

		assert!(cache.get("a").is_some());
		assert!(cache.get("b").is_none());
		assert!(cache.get("c").is_some());
	}

	#[test]
	fn purge_clears_everything() {
		let cache = ResultCache::new(4, Duration::from_secs(60));

		cache.set("a".to_string(), results("a"), None);
		cache.set("b".to_string(), results("b"), None);
		cache.purge();

		assert!(cache.is_empty());
	}
}
