//! Subject-level extraction pipeline
//!
//! Fetches and extracts every subject with at most `workers` extractions in
//! flight. Subjects share no mutable state; the pipeline returns only after
//! every subject has settled, so aggregation always sees a complete run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dynasty_core::{Biography, BiographySource, ExtractionResult, StoredRecord, Subject};
use futures::stream::{self, StreamExt};

use crate::relation::RelationExtractor;

/// Progress is logged every this many subjects
const PROGRESS_EVERY: usize = 50;

/// Final state of one subject in a run
#[derive(Debug, Clone)]
pub struct SubjectOutcome {
    pub subject: Subject,
    pub result: ExtractionResult,
    pub extracted_at: DateTime<Utc>,
    /// Taken from a previous run instead of being extracted again
    pub reused: bool,
}

impl SubjectOutcome {
    /// Outcome of a fresh extraction
    pub fn new(subject: Subject, result: ExtractionResult) -> Self {
        Self {
            subject,
            result,
            extracted_at: Utc::now(),
            reused: false,
        }
    }

    /// Outcome carried over from a stored record
    pub fn from_record(subject: Subject, record: StoredRecord) -> Self {
        let extracted_at = record.extracted_at;
        let (_, result) = record.into_parts();
        Self {
            subject,
            result,
            extracted_at,
            reused: true,
        }
    }

    /// Persisted form
    pub fn to_record(&self) -> StoredRecord {
        StoredRecord::new(&self.subject, &self.result, self.extracted_at)
    }
}

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub failed: usize,
    pub with_relations: usize,
    pub reused: usize,
}

impl RunStats {
    /// Count outcomes
    pub fn from_outcomes(outcomes: &[SubjectOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut stats, o| {
            stats.total += 1;
            stats.failed += usize::from(o.result.extraction_failed());
            stats.with_relations += usize::from(o.result.has_political_relation());
            stats.reused += usize::from(o.reused);
            stats
        })
    }
}

/// Fetch-then-extract pipeline over a list of subjects
pub struct Pipeline {
    source: Arc<dyn BiographySource>,
    extractor: Arc<RelationExtractor>,
    workers: usize,
}

impl Pipeline {
    /// Create a pipeline running at most `workers` subjects concurrently
    pub fn new(
        source: Arc<dyn BiographySource>,
        extractor: Arc<RelationExtractor>,
        workers: usize,
    ) -> Self {
        Self {
            source,
            extractor,
            workers: workers.max(1),
        }
    }

    /// Fetch and extract one subject.
    ///
    /// A fetch error is logged and the biography treated as empty.
    pub async fn process(&self, subject: Subject) -> SubjectOutcome {
        let biography = match self.source.fetch(&subject).await {
            Ok(biography) => biography,
            Err(e) => {
                tracing::warn!(
                    subject = %subject.name,
                    source = self.source.name(),
                    error = %e,
                    "Biography unavailable, treating as empty"
                );
                Biography::empty(&subject.source_ref)
            }
        };

        let result = self.extractor.extract(&subject, &biography).await;
        SubjectOutcome::new(subject, result)
    }

    /// Extract every subject; outcomes are in input order
    pub async fn run(&self, subjects: Vec<Subject>) -> Vec<SubjectOutcome> {
        self.run_resuming(subjects, Vec::new()).await
    }

    /// Like [`run`](Self::run), but reuses successful records from a previous
    /// run instead of extracting those subjects again
    pub async fn run_resuming(
        &self,
        subjects: Vec<Subject>,
        previous: Vec<StoredRecord>,
    ) -> Vec<SubjectOutcome> {
        let total = subjects.len();
        let mut previous: HashMap<String, StoredRecord> = previous
            .into_iter()
            .filter(|r| !r.extraction_failed)
            .map(|r| (r.source_ref.clone(), r))
            .collect();

        tracing::info!(
            total,
            workers = self.workers,
            model = self.extractor.model(),
            "Extracting relations"
        );

        let completed = AtomicUsize::new(0);
        let completed = &completed;

        let outcomes: Vec<SubjectOutcome> = stream::iter(subjects)
            .map(|subject| {
                let stored = previous.remove(&subject.source_ref);
                async move {
                    let outcome = match stored {
                        Some(record) => SubjectOutcome::from_record(subject, record),
                        None => self.process(subject).await,
                    };

                    let n = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % PROGRESS_EVERY == 0 || n == total {
                        tracing::info!("Extracted {}/{} subjects", n, total);
                    }
                    outcome
                }
            })
            .buffered(self.workers)
            .collect()
            .await;

        let stats = RunStats::from_outcomes(&outcomes);
        tracing::info!(
            total = stats.total,
            failed = stats.failed,
            with_relations = stats.with_relations,
            reused = stats.reused,
            "Extraction finished"
        );

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::ExtractorConfig;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use dynasty_core::{Result, StructuredLlm, StructuredRequest};
    use serde_json::json;
    use std::time::Duration;

    /// Answers with a parent relation and tracks peak concurrency
    struct CountingLlm {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingLlm {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StructuredLlm for CountingLlm {
        async fn generate_structured(
            &self,
            _request: &StructuredRequest,
        ) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"relations": [{"relation_kind": "parent", "relative_name": "P"}]}))
        }

        fn model(&self) -> &str {
            "counting"
        }
    }

    fn subjects(n: usize) -> Vec<Subject> {
        (0..n)
            .map(|i| Subject::new(format!("MP {i}"), format!("wiki/MP_{i}"), "X"))
            .collect()
    }

    fn source_for(subjects: &[Subject]) -> MemorySource {
        subjects.iter().fold(MemorySource::new(), |s, subject| {
            s.with_biography(&subject.source_ref, "Child of a politician.")
        })
    }

    fn pipeline(llm: Arc<CountingLlm>, source: MemorySource, workers: usize) -> Pipeline {
        let extractor = Arc::new(RelationExtractor::new(llm, ExtractorConfig::default()));
        Pipeline::new(Arc::new(source), extractor, workers)
    }

    #[tokio::test]
    async fn test_run_preserves_order_and_bounds_concurrency() {
        let subjects = subjects(20);
        let llm = CountingLlm::new();
        let pipeline = pipeline(llm.clone(), source_for(&subjects), 4);

        let outcomes = pipeline.run(subjects.clone()).await;

        assert_eq!(outcomes.len(), 20);
        for (outcome, subject) in outcomes.iter().zip(&subjects) {
            assert_eq!(&outcome.subject, subject);
            assert_eq!(outcome.result.subject_ref(), subject.source_ref);
            assert!(outcome.result.has_political_ancestor());
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 20);
        assert!(llm.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_missing_biography_is_empty_not_failed() {
        let llm = CountingLlm::new();
        let pipeline = pipeline(llm.clone(), MemorySource::new(), 2);

        let outcomes = pipeline.run(subjects(1)).await;

        assert!(!outcomes[0].result.extraction_failed());
        assert!(!outcomes[0].result.has_political_relation());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_skips_successful_records_only() {
        let subjects = subjects(3);
        let llm = CountingLlm::new();
        let pipeline = pipeline(llm.clone(), source_for(&subjects), 2);

        let ok = SubjectOutcome::new(
            subjects[0].clone(),
            ExtractionResult::empty(&subjects[0].source_ref),
        );
        let failed = SubjectOutcome::new(
            subjects[1].clone(),
            ExtractionResult::failed(&subjects[1].source_ref, "timeout"),
        );

        let outcomes = pipeline
            .run_resuming(subjects.clone(), vec![ok.to_record(), failed.to_record()])
            .await;

        assert!(outcomes[0].reused);
        assert!(!outcomes[0].result.has_political_relation());
        assert!(!outcomes[1].reused);
        assert!(!outcomes[1].result.extraction_failed());
        assert!(!outcomes[2].reused);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);

        let stats = RunStats::from_outcomes(&outcomes);
        assert_eq!(
            stats,
            RunStats {
                total: 3,
                failed: 0,
                with_relations: 2,
                reused: 1
            }
        );
    }

    #[test]
    fn test_workers_at_least_one() {
        let pipeline = pipeline(CountingLlm::new(), MemorySource::new(), 0);
        assert_eq!(pipeline.workers, 1);
    }
}
