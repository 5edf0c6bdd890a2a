//! Dynasty Report - Group aggregation and summary rendering
//!
//! Folds a completed run into one [`SummaryRow`] per group plus the
//! implicit `ALL` row. Aggregation is a pure function of its input and keeps
//! full precision; rounding happens only when rendering.
//!
//! Author: hephaex@gmail.com

pub mod render;

pub use render::{render, render_json, render_markdown, ReportFormat, UNDEFINED_MARKER};

use std::collections::BTreeMap;

use dynasty_core::{ExtractionResult, FailurePolicy, Subject, SummaryRow, ALL_GROUP};

// ============================================================================
// Tally
// ============================================================================

/// Running counts for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GroupTally {
    subjects: usize,
    succeeded: usize,
    with_ancestor: usize,
    with_relation: usize,
}

impl GroupTally {
    fn add(&mut self, result: &ExtractionResult, policy: FailurePolicy) {
        if result.extraction_failed() {
            if policy == FailurePolicy::Count {
                self.subjects += 1;
            }
            return;
        }

        self.subjects += 1;
        self.succeeded += 1;
        self.with_ancestor += usize::from(result.has_political_ancestor());
        self.with_relation += usize::from(result.has_political_relation());
    }

    /// `None` when the group has no successful extraction
    fn percentage(&self, count: usize) -> Option<f64> {
        if self.succeeded == 0 {
            None
        } else {
            Some(100.0 * count as f64 / self.succeeded as f64)
        }
    }

    fn into_row(self, group_key: impl Into<String>) -> SummaryRow {
        SummaryRow {
            group_key: group_key.into(),
            political_ancestor_percentage: self.percentage(self.with_ancestor),
            political_relation_percentage: self.percentage(self.with_relation),
            subject_count: self.subjects,
        }
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Computes summary rows from (subject, result) pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    policy: FailurePolicy,
}

impl Aggregator {
    /// Create an aggregator with the given failed-subject policy
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// Aggregate a completed run.
    ///
    /// Groups are keyed by exact `Subject::group`. The `ALL` row comes first,
    /// then groups by ancestor percentage descending (undefined last), ties
    /// broken by group key.
    pub fn aggregate<'a, I>(&self, pairs: I) -> Vec<SummaryRow>
    where
        I: IntoIterator<Item = (&'a Subject, &'a ExtractionResult)>,
    {
        let mut all = GroupTally::default();
        let mut groups: BTreeMap<&'a str, GroupTally> = BTreeMap::new();

        for (subject, result) in pairs {
            all.add(result, self.policy);
            groups
                .entry(subject.group.as_str())
                .or_default()
                .add(result, self.policy);
        }

        tracing::debug!(
            groups = groups.len(),
            subjects = all.subjects,
            succeeded = all.succeeded,
            policy = %self.policy,
            "Aggregated results"
        );

        let mut rows: Vec<SummaryRow> = groups
            .into_iter()
            .map(|(key, tally)| tally.into_row(key))
            .collect();
        rows.sort_by(compare_rows);

        let mut out = Vec::with_capacity(rows.len() + 1);
        out.push(all.into_row(ALL_GROUP));
        out.extend(rows);
        out
    }
}

/// Ancestor percentage descending with undefined last, then group key
fn compare_rows(a: &SummaryRow, b: &SummaryRow) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let by_pct = match (
        a.political_ancestor_percentage,
        b.political_ancestor_percentage,
    ) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_pct.then_with(|| a.group_key.cmp(&b.group_key))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dynasty_core::{PoliticalRelation, RelationKind};
    use proptest::prelude::*;

    fn subject(i: usize, group: &str) -> Subject {
        Subject::new(format!("MP {i}"), format!("wiki/MP_{i}"), group)
    }

    fn ancestor(subject: &Subject) -> ExtractionResult {
        ExtractionResult::from_relations(
            &subject.source_ref,
            vec![PoliticalRelation::new(RelationKind::Parent, "Parent")],
        )
    }

    fn sibling(subject: &Subject) -> ExtractionResult {
        ExtractionResult::from_relations(
            &subject.source_ref,
            vec![PoliticalRelation::new(RelationKind::Sibling, "Sibling")],
        )
    }

    fn row<'a>(rows: &'a [SummaryRow], key: &str) -> &'a SummaryRow {
        rows.iter()
            .find(|r| r.group_key == key)
            .unwrap_or_else(|| panic!("no row for {key}"))
    }

    fn aggregate(
        policy: FailurePolicy,
        pairs: &[(Subject, ExtractionResult)],
    ) -> Vec<SummaryRow> {
        Aggregator::new(policy).aggregate(pairs.iter().map(|(s, r)| (s, r)))
    }

    #[test]
    fn test_four_subjects_two_groups() {
        let subjects = vec![
            subject(0, "X"),
            subject(1, "X"),
            subject(2, "Y"),
            subject(3, "Y"),
        ];
        let pairs = vec![
            (subjects[0].clone(), ancestor(&subjects[0])),
            (subjects[1].clone(), ExtractionResult::empty(&subjects[1].source_ref)),
            (subjects[2].clone(), ExtractionResult::empty(&subjects[2].source_ref)),
            (subjects[3].clone(), sibling(&subjects[3])),
        ];

        let rows = aggregate(FailurePolicy::Count, &pairs);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].group_key, ALL_GROUP);
        assert_eq!(rows[0].political_ancestor_percentage, Some(25.0));
        assert_eq!(rows[0].political_relation_percentage, Some(50.0));
        assert_eq!(rows[0].subject_count, 4);
        assert_eq!(row(&rows, "X").political_ancestor_percentage, Some(50.0));
        assert_eq!(row(&rows, "Y").political_ancestor_percentage, Some(0.0));
        assert_eq!(row(&rows, "Y").political_relation_percentage, Some(50.0));
    }

    #[test]
    fn test_all_failed_group_is_undefined() {
        let a = subject(0, "X");
        let b = subject(1, "Y");
        let pairs = vec![
            (a.clone(), ancestor(&a)),
            (b.clone(), ExtractionResult::failed(&b.source_ref, "timeout")),
        ];

        let rows = aggregate(FailurePolicy::Count, &pairs);

        let y = row(&rows, "Y");
        assert_eq!(y.political_ancestor_percentage, None);
        assert_eq!(y.political_relation_percentage, None);
        assert_eq!(y.subject_count, 1);
        assert_eq!(rows[0].political_ancestor_percentage, Some(100.0));
        assert_eq!(rows.last().unwrap().group_key, "Y");
    }

    #[test]
    fn test_failure_policy_only_changes_subject_count() {
        let a = subject(0, "X");
        let b = subject(1, "X");
        let pairs = vec![
            (a.clone(), ancestor(&a)),
            (b.clone(), ExtractionResult::failed(&b.source_ref, "bad payload")),
        ];

        let counted = aggregate(FailurePolicy::Count, &pairs);
        let excluded = aggregate(FailurePolicy::Exclude, &pairs);

        assert_eq!(row(&counted, "X").subject_count, 2);
        assert_eq!(row(&excluded, "X").subject_count, 1);
        assert_eq!(row(&counted, "X").political_ancestor_percentage, Some(100.0));
        assert_eq!(row(&excluded, "X").political_ancestor_percentage, Some(100.0));
    }

    #[test]
    fn test_group_keys_are_exact() {
        let subjects = vec![subject(0, "Labour"), subject(1, "labour"), subject(2, "Labour ")];
        let pairs: Vec<_> = subjects
            .iter()
            .map(|s| (s.clone(), ExtractionResult::empty(&s.source_ref)))
            .collect();

        let rows = aggregate(FailurePolicy::Count, &pairs);

        assert_eq!(rows.len(), 4);
        assert_eq!(row(&rows, "Labour").subject_count, 1);
        assert_eq!(row(&rows, "labour").subject_count, 1);
        assert_eq!(row(&rows, "Labour ").subject_count, 1);
    }

    #[test]
    fn test_row_ordering() {
        let s: Vec<Subject> = vec![
            subject(0, "B"),
            subject(1, "A"),
            subject(2, "C"),
            subject(3, "D"),
            subject(4, "D"),
        ];
        let pairs = vec![
            (s[0].clone(), ExtractionResult::empty(&s[0].source_ref)),
            (s[1].clone(), ExtractionResult::empty(&s[1].source_ref)),
            (s[2].clone(), ExtractionResult::failed(&s[2].source_ref, "x")),
            (s[3].clone(), ancestor(&s[3])),
            (s[4].clone(), ExtractionResult::empty(&s[4].source_ref)),
        ];

        let rows = aggregate(FailurePolicy::Count, &pairs);
        let keys: Vec<&str> = rows.iter().map(|r| r.group_key.as_str()).collect();

        assert_eq!(keys, vec!["ALL", "D", "A", "B", "C"]);
    }

    #[test]
    fn test_group_named_all_is_kept_separately() {
        let a = subject(0, ALL_GROUP);
        let b = subject(1, "X");
        let pairs = vec![
            (a.clone(), ancestor(&a)),
            (b.clone(), ExtractionResult::empty(&b.source_ref)),
        ];

        let rows = aggregate(FailurePolicy::Count, &pairs);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].subject_count, 2);
        assert_eq!(rows[1].group_key, ALL_GROUP);
        assert_eq!(rows[1].subject_count, 1);
    }

    #[test]
    fn test_empty_run() {
        let rows = aggregate(FailurePolicy::Count, &[]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject_count, 0);
        assert_eq!(rows[0].political_ancestor_percentage, None);
    }

    /// 0 = failed, 1 = no relation, 2 = sibling only, 3 = ancestor
    fn arb_run() -> impl Strategy<Value = Vec<(Subject, ExtractionResult)>> {
        prop::collection::vec((0usize..3, 0u8..4), 0..40).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (group, outcome))| {
                    let s = subject(i, ["X", "Y", "Z"][group]);
                    let result = match outcome {
                        0 => ExtractionResult::failed(&s.source_ref, "failed"),
                        1 => ExtractionResult::empty(&s.source_ref),
                        2 => sibling(&s),
                        _ => ancestor(&s),
                    };
                    (s, result)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_percentages_within_bounds(pairs in arb_run()) {
            for row in aggregate(FailurePolicy::Count, &pairs) {
                for pct in [row.political_ancestor_percentage, row.political_relation_percentage]
                    .into_iter()
                    .flatten()
                {
                    prop_assert!((0.0..=100.0).contains(&pct));
                }
                if let (Some(anc), Some(rel)) =
                    (row.political_ancestor_percentage, row.political_relation_percentage)
                {
                    prop_assert!(anc <= rel);
                }
            }
        }

        #[test]
        fn prop_aggregation_is_idempotent(pairs in arb_run()) {
            let first = aggregate(FailurePolicy::Exclude, &pairs);
            let second = aggregate(FailurePolicy::Exclude, &pairs);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_all_row_counts_every_subject(pairs in arb_run()) {
            let rows = aggregate(FailurePolicy::Count, &pairs);
            prop_assert_eq!(rows[0].subject_count, pairs.len());
            let group_total: usize = rows[1..].iter().map(|r| r.subject_count).sum();
            prop_assert_eq!(group_total, pairs.len());
        }
    }
}
