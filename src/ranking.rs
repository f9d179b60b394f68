// src/ranking.rs
//! Ranking: viewed-id exclusion and score-ordered rerank.
//!
//! - Exclusion keeps source order and drops any id already shown.
//! - Rerank sorts by descending score. Ids the service did not score get 0.0.
//!   The sort is stable, so equal scores keep source order.

use std::collections::HashSet;

use crate::model::{CandidateItem, ItemId};
use crate::scoring::ScoringOutcome;

pub const FALLBACK_SCORE: f64 = 0.0;

/// Returns the unseen candidates (source order kept) and how many were dropped.
pub fn exclude_viewed(
    candidates: Vec<CandidateItem>,
    viewed: &HashSet<ItemId>,
) -> (Vec<CandidateItem>, usize) {
    let before = candidates.len();
    let unseen: Vec<CandidateItem> = candidates
        .into_iter()
        .filter(|c| !viewed.contains(&c.id))
        .collect();
    let excluded = before - unseen.len();
    (unseen, excluded)
}

/// Stable descending sort of `candidates` by the scores in `outcome`.
pub fn rank_by_scores(
    candidates: Vec<CandidateItem>,
    outcome: &ScoringOutcome,
) -> Vec<(CandidateItem, f64)> {
    let lookup = outcome.score_map();
    let mut scored: Vec<(CandidateItem, f64)> = candidates
        .into_iter()
        .map(|c| {
            let s = lookup.get(&c.id).copied().unwrap_or(FALLBACK_SCORE);
            // NaN would break the total order; rank it like an unscored item.
            let s = if s.is_nan() { FALLBACK_SCORE } else { s };
            (c, s)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoredResult;

    fn item(id: &str) -> CandidateItem {
        CandidateItem::new(id, format!("title {id}"), "")
    }

    fn outcome(pairs: &[(&str, f64)]) -> ScoringOutcome {
        ScoringOutcome {
            algorithm: Some("tfidf".into()),
            scores: pairs
                .iter()
                .map(|(id, s)| ScoredResult {
                    id: ItemId::from(*id),
                    relevance_score: *s,
                })
                .collect(),
            note: None,
        }
    }

    fn ids(v: &[(CandidateItem, f64)]) -> Vec<&str> {
        v.iter().map(|(c, _)| c.id.as_str()).collect()
    }

    #[test]
    fn ties_keep_source_order() {
        let ranked = rank_by_scores(
            vec![item("A"), item("B"), item("C")],
            &outcome(&[("A", 0.5), ("B", 0.5), ("C", 0.9)]),
        );
        assert_eq!(ids(&ranked), vec!["C", "A", "B"]);
    }

    #[test]
    fn unscored_items_fall_to_zero() {
        let ranked = rank_by_scores(
            vec![item("x"), item("y"), item("z")],
            &outcome(&[("z", 0.3)]),
        );
        assert_eq!(ids(&ranked), vec!["z", "x", "y"]);
        assert_eq!(ranked[1].1, FALLBACK_SCORE);
    }

    #[test]
    fn negative_scores_sort_below_unscored() {
        let ranked = rank_by_scores(
            vec![item("neg"), item("none")],
            &outcome(&[("neg", -0.2)]),
        );
        assert_eq!(ids(&ranked), vec!["none", "neg"]);
    }

    #[test]
    fn nan_is_treated_as_unscored() {
        let ranked = rank_by_scores(
            vec![item("nan"), item("good")],
            &outcome(&[("nan", f64::NAN), ("good", 0.1)]),
        );
        assert_eq!(ids(&ranked), vec!["good", "nan"]);
    }

    #[test]
    fn exclusion_keeps_order_and_counts() {
        let viewed: HashSet<ItemId> = [ItemId::from("b")].into_iter().collect();
        let (unseen, dropped) = exclude_viewed(vec![item("a"), item("b"), item("c")], &viewed);
        assert_eq!(dropped, 1);
        assert_eq!(
            unseen.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
    }
}
