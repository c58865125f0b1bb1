use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{DropSummary, MatchResultFilter, Page};
use crate::services::store::{MatchResultStore, StoreError};

/// Releases approved matches to users, at most one per user per pass
pub struct DropScheduler {
    results: Arc<dyn MatchResultStore>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl DropScheduler {
    pub fn new(results: Arc<dyn MatchResultStore>, clock: Arc<dyn Clock>, page_size: usize) -> Self {
        Self {
            results,
            clock,
            page_size: page_size.max(1),
        }
    }

    /// Drop the oldest approved match of every user not yet dropped in this pass
    ///
    /// Candidates are read in full before any write so that rows dropped by
    /// this pass do not shift the pagination window.
    pub async fn drop_one_match_per_user(&self) -> Result<DropSummary, StoreError> {
        let filter = MatchResultFilter::awaiting_drop();
        let mut candidates = Vec::new();
        let mut page = Page::first(self.page_size);

        loop {
            let batch = self.results.match_results(&filter, page).await?;
            let exhausted = batch.len() < page.limit;
            candidates.extend(batch);
            if exhausted {
                break;
            }
            page = page.next();
        }

        let mut summary = DropSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut dropped_users: HashSet<Uuid> = HashSet::new();

        for result in candidates {
            if dropped_users.contains(&result.user_a_id) || dropped_users.contains(&result.user_b_id) {
                summary.skipped += 1;
                continue;
            }

            if self.results.mark_dropped(result.id, self.clock.now()).await? {
                tracing::debug!(
                    "Dropped match {} for {} and {}",
                    result.id,
                    result.user_a_id,
                    result.user_b_id
                );
                summary.dropped.push(result.id);
            } else {
                // another pass got there first; its users still count as served
                summary.skipped += 1;
            }
            dropped_users.insert(result.user_a_id);
            dropped_users.insert(result.user_b_id);
        }

        tracing::info!(
            "Drop pass finished: {} candidates, {} dropped, {} skipped",
            summary.candidates,
            summary.dropped.len(),
            summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{IngestSource, MatchResult, MatchSet};
    use crate::services::memory::MemoryStore;
    use crate::services::store::MatchSetStore;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_disjoint_pairs_all_dropped() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let store = MemoryStore::new(clock.clone());
        let set = MatchSet {
            id: Uuid::new_v4(),
            source: IngestSource::All,
            number_of_participants: 4,
            number_of_pairs: 2,
            test_users: None,
            created_at: clock.now(),
        };
        let rows: Vec<MatchResult> = (0..2)
            .map(|i| {
                let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
                ids.sort();
                MatchResult::new(set.id, ids[0], ids[1], clock.now() + Duration::seconds(i))
            })
            .collect();
        store.create_match_set(&set, &rows).await.unwrap();
        for row in &rows {
            store.approve(row.id, clock.now()).await.unwrap();
        }

        let scheduler = DropScheduler::new(Arc::new(store.clone()), clock.clone(), 1);
        let summary = scheduler.drop_one_match_per_user().await.unwrap();

        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.dropped.len(), 2);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_unapproved_rows_are_not_candidates() {
        let store = MemoryStore::default();
        let set = MatchSet {
            id: Uuid::new_v4(),
            source: IngestSource::All,
            number_of_participants: 2,
            number_of_pairs: 1,
            test_users: None,
            created_at: Utc::now(),
        };
        let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();
        store
            .create_match_set(&set, &[MatchResult::new(set.id, ids[0], ids[1], Utc::now())])
            .await
            .unwrap();

        let scheduler = DropScheduler::new(Arc::new(store), Arc::new(crate::clock::SystemClock), 100);
        let summary = scheduler.drop_one_match_per_user().await.unwrap();

        assert_eq!(summary, DropSummary::default());
    }
}
