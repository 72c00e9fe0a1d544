use std::collections::HashSet;

use crate::models::Listing;

/// Candidates whose url is not among the existing listings, in candidate order.
///
/// Duplicates inside `candidates` are left alone; see [`dedupe_candidates`].
pub fn diff(candidates: Vec<Listing>, existing: &[Listing]) -> Vec<Listing> {
    diff_urls(candidates, existing.iter().map(|listing| listing.url.as_str()))
}

/// Same as [`diff`], against a bare set of known urls (e.g. a store's URL column).
pub fn diff_urls<'a, I>(candidates: Vec<Listing>, existing: I) -> Vec<Listing>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: HashSet<&str> = existing.into_iter().collect();
    candidates
        .into_iter()
        .filter(|candidate| !known.contains(candidate.url.as_str()))
        .collect()
}

/// Drops repeated urls within one batch, first occurrence wins.
/// Returns the kept listings and the number dropped.
pub fn dedupe_candidates(candidates: Vec<Listing>) -> (Vec<Listing>, usize) {
    let before = candidates.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<Listing> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
