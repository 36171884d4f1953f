use std::{
	collections::HashMap,
	sync::Mutex,
	time::{Duration, Instant},
};

use time::OffsetDateTime;
use weir_config::FeedbackConfig;
use weir_domain::{Trend, Verdict, VerdictRecord, trend_of};

const DEFAULT_MAX_PER_KEY: usize = 100;
const GLOBAL_KEY: &str = "_global";

/// Records corrective verdicts per profile key and exposes trends.
///
/// History is a bounded ring per key (5x the trend window); the cooldown
/// map throttles how often the gating stage may mutate profiles.
pub struct FeedbackManager {
	cfg: FeedbackConfig,
	max_per_key: usize,
	inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
	history: HashMap<String, Vec<VerdictRecord>>,
	last_adjustment: HashMap<String, Instant>,
}

impl FeedbackManager {
	pub fn new(cfg: FeedbackConfig) -> Self {
		let max_per_key = if cfg.window > 0 { cfg.window * 5 } else { DEFAULT_MAX_PER_KEY };

		Self { cfg, max_per_key, inner: Mutex::new(Inner::default()) }
	}

	pub fn config(&self) -> &FeedbackConfig {
		&self.cfg
	}

	pub fn record(&self, key: &str, verdict: Verdict, confidence: f64) {
		let key = normalize_key(key);
		let record =
			VerdictRecord { timestamp: OffsetDateTime::now_utc(), verdict, confidence };
		let mut inner = self.lock();
		let history = inner.history.entry(key).or_default();

		history.push(record);

		if history.len() > self.max_per_key {
			let overflow = history.len() - self.max_per_key;

			history.drain(..overflow);
		}
	}

	pub fn trend(&self, key: &str, window: usize) -> Trend {
		let key = normalize_key(key);
		let window = if window > 0 {
			window
		} else if self.cfg.window > 0 {
			self.cfg.window
		} else {
			5
		};
		let inner = self.lock();

		match inner.history.get(&key) {
			Some(history) => trend_of(history, window),
			None => Trend::default(),
		}
	}

	pub fn in_cooldown(&self, key: &str, cooldown: Duration) -> bool {
		if cooldown.is_zero() {
			return false;
		}

		let key = normalize_key(key);
		let inner = self.lock();

		inner
			.last_adjustment
			.get(&key)
			.is_some_and(|last| last.elapsed() < cooldown)
	}

	pub fn mark_adjustment(&self, key: &str) {
		let key = normalize_key(key);
		let mut inner = self.lock();

		inner.last_adjustment.insert(key, Instant::now());
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

fn normalize_key(key: &str) -> String {
	if key.is_empty() { GLOBAL_KEY.to_string() } else { key.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn records_fold_into_trends() {
		let manager = FeedbackManager::new(FeedbackConfig::default());

		manager.record("default", Verdict::Incorrect, 0.2);
		manager.record("default", Verdict::Incorrect, 0.1);

		let trend = manager.trend("default", 5);

		assert_eq!(trend.total, 2);
		assert_eq!(trend.consecutive_incorrect, 2);
	}

	#[test]
	fn empty_key_maps_to_the_global_bucket() {
		let manager = FeedbackManager::new(FeedbackConfig::default());

		manager.record("", Verdict::Correct, 0.9);

		assert_eq!(manager.trend("", 5).confident, 1);
	}

	#[test]
	fn history_is_capped_at_five_windows() {
		let cfg = FeedbackConfig { window: 2, ..Default::default() };
		let manager = FeedbackManager::new(cfg);

		for _ in 0..30 {
			manager.record("k", Verdict::Correct, 1.0);
		}

		// Window 2 caps history at 10; the trend still only scans the window.
		let trend = manager.trend("k", 100);

		assert_eq!(trend.total, 10);
	}

	#[test]
	fn cooldown_gates_until_it_expires() {
		let manager = FeedbackManager::new(FeedbackConfig::default());

		assert!(!manager.in_cooldown("k", Duration::from_secs(60)));

		manager.mark_adjustment("k");

		assert!(manager.in_cooldown("k", Duration::from_secs(60)));
		assert!(!manager.in_cooldown("k", Duration::ZERO));
		assert!(!manager.in_cooldown("other", Duration::from_secs(60)));
	}
}
