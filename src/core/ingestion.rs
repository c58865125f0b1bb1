use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::IngestionSettings;
use crate::core::pairing::{distinct_participants, generate_pairs};
use crate::core::processor::{MatchProcessor, ProcessError};
use crate::models::{
    BatchSummary, IngestOptions, IngestSource, MatchResult, MatchResultFilter, MatchSet, Page, PairOutcome, User,
    UserFilter,
};
use crate::services::store::{MatchResultStore, MatchSetStore, StoreError, UserStore};

/// Errors that abort a whole ingestion call
///
/// Per-pair failures never show up here; they are counted in [`BatchSummary::failed`].
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Match set {match_set_id} missed its {deadline:?} deadline after {completed} of {total} pairs")]
    DeadlineExceeded {
        match_set_id: Uuid,
        deadline: Duration,
        completed: usize,
        total: usize,
    },

    #[error("Worker pool closed: {0}")]
    WorkerPool(#[from] AcquireError),
}

/// Builds match sets from the user population and runs them through the processor
///
/// Pairs are independent, so the run phase fans out over a bounded pool of
/// tasks that each talk to the store on their own; there is no batch-wide
/// transaction and a failing pair never affects its siblings.
pub struct IngestionOrchestrator {
    users: Arc<dyn UserStore>,
    match_sets: Arc<dyn MatchSetStore>,
    results: Arc<dyn MatchResultStore>,
    processor: MatchProcessor,
    clock: Arc<dyn Clock>,
    worker_count: usize,
    deadline: Duration,
    page_size: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        users: Arc<dyn UserStore>,
        match_sets: Arc<dyn MatchSetStore>,
        results: Arc<dyn MatchResultStore>,
        processor: MatchProcessor,
        clock: Arc<dyn Clock>,
        settings: &IngestionSettings,
    ) -> Self {
        Self {
            users,
            match_sets,
            results,
            processor,
            clock,
            worker_count: settings.worker_count.max(1),
            deadline: Duration::from_secs(settings.batch_deadline_secs),
            page_size: settings.page_size.max(1),
        }
    }

    /// Pair every active user
    pub async fn ingest_all(&self) -> Result<MatchSet, IngestionError> {
        self.ingest_with_options(IngestOptions::default()).await
    }

    /// Pair every active user, optionally restricted by the test-user flag
    pub async fn ingest_with_options(&self, options: IngestOptions) -> Result<MatchSet, IngestionError> {
        let users = self.users.users(&UserFilter::active(options.test_users)).await?;
        tracing::debug!("Loaded {} active users for ingestion", users.len());

        self.create_set(&users, IngestSource::All, options).await
    }

    /// Persist a new set and one empty result per pair
    async fn create_set(
        &self,
        users: &[User],
        source: IngestSource,
        options: IngestOptions,
    ) -> Result<MatchSet, IngestionError> {
        let now = self.clock.now();
        let pairs = generate_pairs(users);

        let set = MatchSet {
            id: Uuid::new_v4(),
            source,
            number_of_participants: distinct_participants(users) as i32,
            number_of_pairs: pairs.len() as i32,
            test_users: options.test_users,
            created_at: now,
        };
        let results: Vec<MatchResult> = pairs
            .iter()
            .map(|pair| MatchResult::new(set.id, pair.first, pair.second, now))
            .collect();

        self.match_sets.create_match_set(&set, &results).await?;

        tracing::info!(
            "Created {} match set {} with {} participants and {} pairs",
            source.as_str(),
            set.id,
            set.number_of_participants,
            set.number_of_pairs
        );
        Ok(set)
    }

    /// Every result id matching `filter`, oldest first
    async fn collect_ids(&self, filter: &MatchResultFilter) -> Result<Vec<MatchResult>, StoreError> {
        let mut rows = Vec::new();
        let mut page = Page::first(self.page_size);

        loop {
            let batch = self.results.match_results(filter, page).await?;
            let exhausted = batch.len() < page.limit;
            rows.extend(batch);
            if exhausted {
                return Ok(rows);
            }
            page = page.next();
        }
    }

    /// Process every result of a set on the worker pool and wait for all of them
    pub async fn run_ingestion_set(&self, match_set_id: Uuid) -> Result<BatchSummary, IngestionError> {
        let set = self.match_sets.match_set(match_set_id).await?;
        let ids: Vec<Uuid> = self
            .collect_ids(&MatchResultFilter::for_set(set.id))
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let started = Instant::now();
        let mut summary = BatchSummary {
            match_set_id: set.id,
            total: ids.len(),
            ..Default::default()
        };

        tracing::info!(
            "Running match set {} ({} pairs, {} workers)",
            set.id,
            summary.total,
            self.worker_count
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut tasks: JoinSet<(Uuid, Result<PairOutcome, ProcessError>)> = JoinSet::new();

        let drive = async {
            for id in ids {
                // record finished pairs while waiting for a free worker
                let permit = loop {
                    tokio::select! {
                        permit = Arc::clone(&semaphore).acquire_owned() => break permit?,
                        Some(joined) = tasks.join_next(), if !tasks.is_empty() => record(&mut summary, joined),
                    }
                };
                let processor = self.processor.clone();

                tasks.spawn(async move {
                    let _permit = permit;
                    (id, processor.process(id).await)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                record(&mut summary, joined);
            }
            Ok::<(), IngestionError>(())
        };

        match tokio::time::timeout(self.deadline, drive).await {
            Ok(result) => result?,
            Err(_) => {
                tasks.abort_all();
                let completed = summary.processed();
                tracing::error!(
                    "Match set {} hit its deadline; {} of {} pairs finished",
                    set.id,
                    completed,
                    summary.total
                );
                return Err(IngestionError::DeadlineExceeded {
                    match_set_id: set.id,
                    deadline: self.deadline,
                    completed,
                    total: summary.total,
                });
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Match set {} finished in {}ms: {} qualified, {} disqualified, {} failed",
            set.id,
            summary.elapsed_ms,
            summary.qualified,
            summary.disqualified,
            summary.failed
        );
        Ok(summary)
    }

    /// Pair and run users with no approved, undropped match
    ///
    /// Returns `Ok(None)` without creating a set when fewer than two such users exist.
    pub async fn run_match_for_unmatched_users(
        &self,
        options: IngestOptions,
    ) -> Result<Option<BatchSummary>, IngestionError> {
        let matched: HashSet<Uuid> = self
            .collect_ids(&MatchResultFilter::awaiting_drop())
            .await?
            .iter()
            .flat_map(|r| [r.user_a_id, r.user_b_id])
            .collect();

        let unmatched: Vec<User> = self
            .users
            .users(&UserFilter::active(options.test_users))
            .await?
            .into_iter()
            .filter(|u| !matched.contains(&u.id))
            .collect();

        if distinct_participants(&unmatched) < 2 {
            tracing::info!(
                "Only {} unmatched users, skipping unmatched matching",
                unmatched.len()
            );
            return Ok(None);
        }

        let set = self.create_set(&unmatched, IngestSource::Unmatched, options).await?;
        self.run_ingestion_set(set.id).await.map(Some)
    }
}

fn record(summary: &mut BatchSummary, joined: Result<(Uuid, Result<PairOutcome, ProcessError>), JoinError>) {
    match joined {
        Ok((_, Ok(PairOutcome::Qualified { .. }))) => summary.qualified += 1,
        Ok((_, Ok(PairOutcome::Disqualified { .. }))) => summary.disqualified += 1,
        Ok((id, Err(e))) => {
            tracing::warn!("Failed to process match {}: {}", id, e);
            summary.failed += 1;
        }
        Err(e) => {
            tracing::error!("Match worker panicked: {}", e);
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::{CompatibilityResult, Gender, MatchConfig, Profile};
    use crate::services::compatibility::{CompatibilityError, CompatibilityScorer, ProfilePair};
    use crate::services::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowScorer(Duration);

    #[async_trait]
    impl CompatibilityScorer for SlowScorer {
        async fn qualify(&self, _pair: &ProfilePair) -> Result<CompatibilityResult, CompatibilityError> {
            tokio::time::sleep(self.0).await;
            Ok(CompatibilityResult {
                score: 0.5,
                label: None,
                details: serde_json::Value::Null,
            })
        }
    }

    fn user(gender: Gender, prefs: Vec<Gender>) -> User {
        User {
            id: Uuid::new_v4(),
            age: Some(30),
            gender: Some(gender),
            height_cm: Some(175),
            latitude: Some(48.85),
            longitude: Some(2.35),
            dating_preferences: prefs,
            is_test_user: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    async fn store_with(users: Vec<User>) -> MemoryStore {
        let store = MemoryStore::default();
        store
            .insert_config(MatchConfig {
                id: Uuid::new_v4(),
                version: 1,
                is_active: true,
                age_range_end: 10,
                age_range_man_older_by: 10,
                age_range_woman_older_by: 10,
                height_male_greater_by_cm: 0,
                location_radius_km: 100.0,
                location_adaptive_expansion: vec![],
                match_expiration_hours: None,
                match_drop_hours: None,
                compatibility_score_threshold: None,
                created_at: Utc::now(),
            })
            .await;
        for u in users {
            store
                .insert_profile(Profile {
                    user_id: u.id,
                    name: "Test".to_string(),
                    bio: None,
                    interests: vec![],
                    prompts: serde_json::Value::Null,
                })
                .await;
            store.insert_user(u).await;
        }
        store
    }

    fn orchestrator(store: &MemoryStore, scorer: Arc<dyn CompatibilityScorer>, settings: IngestionSettings) -> IngestionOrchestrator {
        let shared = Arc::new(store.clone());
        let clock = Arc::new(SystemClock);
        let processor = MatchProcessor::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared.clone(),
            scorer,
            clock.clone(),
        );
        IngestionOrchestrator::new(shared.clone(), shared.clone(), shared, processor, clock, &settings)
    }

    #[tokio::test]
    async fn test_small_pages_still_collect_every_result() {
        let users: Vec<User> = (0..5)
            .map(|_| user(Gender::NonBinary, vec![Gender::NonBinary]))
            .collect();
        let store = store_with(users).await;
        let settings = IngestionSettings {
            page_size: 3,
            worker_count: 2,
            ..Default::default()
        };
        let ingestion = orchestrator(&store, Arc::new(SlowScorer(Duration::ZERO)), settings);

        let set = ingestion.ingest_all().await.unwrap();
        let summary = ingestion.run_ingestion_set(set.id).await.unwrap();

        assert_eq!(summary.total, 10);
        assert_eq!(summary.qualified, 10);
        assert_eq!(summary.processed(), 10);
    }

    #[tokio::test]
    async fn test_deadline_aborts_remaining_pairs() {
        let users: Vec<User> = (0..4)
            .map(|_| user(Gender::NonBinary, vec![Gender::NonBinary]))
            .collect();
        let store = store_with(users).await;
        let settings = IngestionSettings {
            worker_count: 1,
            batch_deadline_secs: 1,
            ..Default::default()
        };
        let ingestion = orchestrator(&store, Arc::new(SlowScorer(Duration::from_secs(5))), settings);

        let set = ingestion.ingest_all().await.unwrap();
        let err = ingestion.run_ingestion_set(set.id).await.unwrap_err();

        match err {
            IngestionError::DeadlineExceeded { total, completed, .. } => {
                assert_eq!(total, 6);
                assert!(completed < total);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    /// Answers the first `fast` calls immediately, then stalls
    struct StallingScorer {
        calls: AtomicUsize,
        fast: usize,
    }

    #[async_trait]
    impl CompatibilityScorer for StallingScorer {
        async fn qualify(&self, _pair: &ProfilePair) -> Result<CompatibilityResult, CompatibilityError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fast {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok(CompatibilityResult {
                score: 0.5,
                label: None,
                details: serde_json::Value::Null,
            })
        }
    }

    #[tokio::test]
    async fn test_deadline_counts_pairs_finished_while_spawning() {
        let users: Vec<User> = (0..5)
            .map(|_| user(Gender::NonBinary, vec![Gender::NonBinary]))
            .collect();
        let store = store_with(users).await;
        let settings = IngestionSettings {
            worker_count: 1,
            batch_deadline_secs: 1,
            ..Default::default()
        };
        let scorer = Arc::new(StallingScorer {
            calls: AtomicUsize::new(0),
            fast: 3,
        });
        let ingestion = orchestrator(&store, scorer, settings);

        let set = ingestion.ingest_all().await.unwrap();
        let err = ingestion.run_ingestion_set(set.id).await.unwrap_err();

        let scored = store
            .match_results(&MatchResultFilter::for_set(set.id), Page::first(100))
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.compatibility_report.is_some())
            .count();
        assert_eq!(scored, 3);
        match err {
            IngestionError::DeadlineExceeded { total, completed, .. } => {
                assert_eq!(total, 10);
                assert_eq!(completed, scored);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_set_is_store_error() {
        let store = store_with(vec![]).await;
        let ingestion = orchestrator(&store, Arc::new(SlowScorer(Duration::ZERO)), IngestionSettings::default());

        let err = ingestion.run_ingestion_set(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, IngestionError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_test_user_filter_narrows_population() {
        let mut tester = user(Gender::Male, vec![Gender::Female]);
        tester.is_test_user = true;
        let users = vec![
            tester,
            user(Gender::Female, vec![Gender::Male]),
            user(Gender::Female, vec![Gender::Male]),
        ];
        let store = store_with(users).await;
        let ingestion = orchestrator(&store, Arc::new(SlowScorer(Duration::ZERO)), IngestionSettings::default());

        let set = ingestion
            .ingest_with_options(IngestOptions::real_users_only())
            .await
            .unwrap();

        assert_eq!(set.number_of_participants, 2);
        assert_eq!(set.number_of_pairs, 1);
        assert_eq!(set.test_users, Some(false));
    }
}
