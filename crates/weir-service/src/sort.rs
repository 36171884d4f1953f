use std::cmp::Ordering;

use weir_domain::SearchResult;

/// Stable sort by score descending; NaN scores sink to the end.
pub(crate) fn stable_sort_desc(results: &mut [SearchResult]) {
	results.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
	});
}
