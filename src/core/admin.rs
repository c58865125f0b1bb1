use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::services::store::{MatchResultStore, StoreError};

/// Operator actions on a match result's lifecycle
pub struct MatchAdmin {
    results: Arc<dyn MatchResultStore>,
    clock: Arc<dyn Clock>,
}

impl MatchAdmin {
    pub fn new(results: Arc<dyn MatchResultStore>, clock: Arc<dyn Clock>) -> Self {
        Self { results, clock }
    }

    /// Mark a match as ready for dropping; false if it already was
    pub async fn approve_match(&self, match_id: Uuid) -> Result<bool, StoreError> {
        let changed = self.results.approve(match_id, self.clock.now()).await?;
        if changed {
            tracing::info!("Approved match {}", match_id);
        } else {
            tracing::debug!("Match {} was already approved", match_id);
        }
        Ok(changed)
    }

    /// Close a match for good; false if it was already expired
    pub async fn expire_match(&self, match_id: Uuid) -> Result<bool, StoreError> {
        let changed = self.results.expire(match_id, self.clock.now()).await?;
        if changed {
            tracing::info!("Expired match {}", match_id);
        } else {
            tracing::debug!("Match {} was already expired", match_id);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{IngestSource, LifecycleStatus, MatchResult, MatchSet};
    use crate::services::memory::MemoryStore;
    use crate::services::store::MatchSetStore;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_approve_and_expire_are_one_shot() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()));
        let store = MemoryStore::new(clock.clone());
        let set = MatchSet {
            id: Uuid::new_v4(),
            source: IngestSource::All,
            number_of_participants: 2,
            number_of_pairs: 1,
            test_users: None,
            created_at: clock.now(),
        };
        let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();
        let row = MatchResult::new(set.id, ids[0], ids[1], clock.now());
        let id = row.id;
        store.create_match_set(&set, &[row]).await.unwrap();

        let admin = MatchAdmin::new(Arc::new(store.clone()), clock.clone());

        assert!(admin.approve_match(id).await.unwrap());
        let approved_at = store.match_result(id).await.unwrap().approved_at;

        clock.advance(Duration::hours(1));
        assert!(!admin.approve_match(id).await.unwrap());
        assert_eq!(store.match_result(id).await.unwrap().approved_at, approved_at);

        assert!(admin.expire_match(id).await.unwrap());
        assert!(!admin.expire_match(id).await.unwrap());
        let row = store.match_result(id).await.unwrap();
        assert!(row.expired);
        assert_eq!(row.lifecycle_status, LifecycleStatus::Expired);
        assert_eq!(row.expired_at, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_unknown_match_is_not_found() {
        let admin = MatchAdmin::new(Arc::new(MemoryStore::default()), Arc::new(crate::clock::SystemClock));

        assert!(matches!(
            admin.approve_match(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
