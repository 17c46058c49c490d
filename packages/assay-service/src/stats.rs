use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters for operational visibility. Never consulted by request logic.
#[derive(Debug, Default)]
pub struct RefinementStats {
	requests: AtomicU64,
	heuristic_only: AtomicU64,
	generative_accepted: AtomicU64,
	generative_degraded: AtomicU64,
	shortfalls: AtomicU64,
}
impl RefinementStats {
	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			requests: self.requests.load(Ordering::Relaxed),
			heuristic_only: self.heuristic_only.load(Ordering::Relaxed),
			generative_accepted: self.generative_accepted.load(Ordering::Relaxed),
			generative_degraded: self.generative_degraded.load(Ordering::Relaxed),
			shortfalls: self.shortfalls.load(Ordering::Relaxed),
		}
	}

	pub(crate) fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_heuristic_only(&self) {
		self.heuristic_only.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_generative_accepted(&self) {
		self.generative_accepted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_generative_degraded(&self) {
		self.generative_degraded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_shortfall(&self) {
		self.shortfalls.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
	pub requests: u64,
	pub heuristic_only: u64,
	pub generative_accepted: u64,
	pub generative_degraded: u64,
	pub shortfalls: u64,
}
