use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Categorical outcome of a corrective evaluation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
	Correct,
	#[default]
	Ambiguous,
	Incorrect,
	Unknown,
}
impl Verdict {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Correct => "correct",
			Self::Ambiguous => "ambiguous",
			Self::Incorrect => "incorrect",
			Self::Unknown => "unknown",
		}
	}

	/// Maps a wire-format verdict string; anything unrecognized is ambiguous.
	pub fn parse_lenient(raw: &str) -> Self {
		match raw {
			"correct" => Self::Correct,
			"incorrect" => Self::Incorrect,
			_ => Self::Ambiguous,
		}
	}
}

/// A single recorded evaluation outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct VerdictRecord {
	pub timestamp: OffsetDateTime,
	pub verdict: Verdict,
	pub confidence: f64,
}

/// Verdict trend statistics over a recent window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trend {
	pub total: usize,
	pub incorrect: usize,
	pub ambiguous: usize,
	pub confident: usize,
	pub consecutive_incorrect: usize,
	pub consecutive_ambiguous: usize,
	pub consecutive_confident: usize,
	pub last_updated: Option<OffsetDateTime>,
}

/// Computes trend statistics over the last `window` records.
///
/// Consecutive counts walk backwards from the most recent record and stop
/// at the first differing verdict, so they measure the newest streak only.
/// `Unknown` verdicts count toward the total but never form a streak.
pub fn trend_of(records: &[VerdictRecord], window: usize) -> Trend {
	let window = if window == 0 { 5 } else { window };
	let recent = if records.len() > window { &records[records.len() - window..] } else { records };

	if recent.is_empty() {
		return Trend::default();
	}

	let mut trend = Trend {
		total: recent.len(),
		last_updated: recent.last().map(|record| record.timestamp),
		..Default::default()
	};

	for record in recent {
		match record.verdict {
			Verdict::Incorrect => trend.incorrect += 1,
			Verdict::Ambiguous => trend.ambiguous += 1,
			Verdict::Correct => trend.confident += 1,
			Verdict::Unknown => {},
		}
	}

	if let Some(tail) = recent.last().map(|record| record.verdict) {
		let run = recent.iter().rev().take_while(|record| record.verdict == tail).count();

		match tail {
			Verdict::Incorrect => trend.consecutive_incorrect = run,
			Verdict::Ambiguous => trend.consecutive_ambiguous = run,
			Verdict::Correct => trend.consecutive_confident = run,
			Verdict::Unknown => {},
		}
	}

	trend
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(verdict: Verdict) -> VerdictRecord {
		VerdictRecord { timestamp: OffsetDateTime::UNIX_EPOCH, verdict, confidence: 0.0 }
	}

	#[test]
	fn empty_history_yields_default_trend() {
		assert_eq!(trend_of(&[], 5), Trend::default());
	}

	#[test]
	fn consecutive_runs_are_counted_from_the_tail() {
		let records = vec![
			record(Verdict::Correct),
			record(Verdict::Incorrect),
			record(Verdict::Incorrect),
		];
		let trend = trend_of(&records, 5);

		assert_eq!(trend.total, 3);
		assert_eq!(trend.incorrect, 2);
		assert_eq!(trend.confident, 1);
		assert_eq!(trend.consecutive_incorrect, 2);
		assert_eq!(trend.consecutive_confident, 0);
	}

	#[test]
	fn other_verdicts_break_a_run() {
		let records = vec![
			record(Verdict::Incorrect),
			record(Verdict::Correct),
			record(Verdict::Incorrect),
		];
		let trend = trend_of(&records, 5);

		assert_eq!(trend.consecutive_incorrect, 1);
	}

	#[test]
	fn window_limits_the_scan() {
		let mut records = vec![record(Verdict::Incorrect); 8];

		records.push(record(Verdict::Correct));

		let trend = trend_of(&records, 3);

		assert_eq!(trend.total, 3);
		assert_eq!(trend.incorrect, 2);
		assert_eq!(trend.consecutive_confident, 1);
	}

	#[test]
	fn unknown_counts_toward_total_but_breaks_runs() {
		let records =
			vec![record(Verdict::Correct), record(Verdict::Unknown), record(Verdict::Correct)];
		let trend = trend_of(&records, 5);

		assert_eq!(trend.total, 3);
		assert_eq!(trend.confident, 2);
		assert_eq!(trend.consecutive_confident, 1);
	}

	#[test]
	fn lenient_parse_maps_unrecognized_to_ambiguous() {
		assert_eq!(Verdict::parse_lenient("correct"), Verdict::Correct);
		assert_eq!(Verdict::parse_lenient("incorrect"), Verdict::Incorrect);
		assert_eq!(Verdict::parse_lenient("maybe"), Verdict::Ambiguous);
	}
}
