use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::models::{
    CompatibilityReport, ConfigFilter, DateInstance, DateInstanceLog, LifecycleStatus, MatchConfig,
    MatchForUser, MatchResult, MatchResultFilter, MatchSet, Page, Profile, QualifierReport, User,
    UserAction, UserFilter,
};
use crate::services::store::{
    ConfigStore, MatchResultStore, MatchSetStore, ProfileStore, ProposalStore, ProposalTx, StoreError,
    UserStore,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    configs: Vec<MatchConfig>,
    match_sets: HashMap<Uuid, MatchSet>,
    match_results: HashMap<Uuid, MatchResult>,
    pair_keys: HashSet<(Uuid, Uuid, Uuid)>,
    date_instances: HashMap<Uuid, DateInstance>,
    date_instance_logs: Vec<DateInstanceLog>,
}

impl Tables {
    fn match_result_mut(&mut self, id: Uuid) -> Result<&mut MatchResult, StoreError> {
        self.match_results
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("match result {}", id)))
    }

    fn has_date_instance_for(&self, match_id: Uuid) -> bool {
        self.date_instances
            .values()
            .any(|d| d.match_result_id == match_id)
    }
}

/// In-process implementation of every store contract
///
/// Row locks for the proposal machine are per-match async mutexes held by
/// the open transaction; transaction writes are staged and applied on commit.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            row_locks: Arc::new(DashMap::new()),
            clock,
        }
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.tables.write().await.profiles.insert(profile.user_id, profile);
    }

    pub async fn insert_config(&self, config: MatchConfig) {
        let mut tables = self.tables.write().await;
        tables.configs.retain(|c| c.id != config.id);
        tables.configs.push(config);
    }

    /// Every date instance linked to `match_id`
    pub async fn date_instances_for(&self, match_id: Uuid) -> Vec<DateInstance> {
        self.tables
            .read()
            .await
            .date_instances
            .values()
            .filter(|d| d.match_result_id == match_id)
            .cloned()
            .collect()
    }

    pub async fn date_instance_logs(&self, date_instance_id: Uuid) -> Vec<DateInstanceLog> {
        self.tables
            .read()
            .await
            .date_instance_logs
            .iter()
            .filter(|l| l.date_instance_id == date_instance_id)
            .cloned()
            .collect()
    }

    pub async fn match_set_count(&self) -> usize {
        self.tables.read().await.match_sets.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn user(&self, id: Uuid) -> Result<User, StoreError> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn config(&self, filter: &ConfigFilter) -> Result<MatchConfig, StoreError> {
        let tables = self.tables.read().await;
        let mut found = tables.configs.iter().filter(|c| filter.matches(c));

        let config = found
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("match config for {:?}", filter)))?;
        if found.next().is_some() {
            return Err(StoreError::Ambiguous(format!("several match configs for {:?}", filter)));
        }
        Ok(config.clone())
    }
}

#[async_trait]
impl MatchSetStore for MemoryStore {
    async fn create_match_set(&self, set: &MatchSet, results: &[MatchResult]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if tables.match_sets.contains_key(&set.id) {
            return Err(StoreError::Conflict(format!("match set {} already exists", set.id)));
        }

        let mut keys = HashSet::with_capacity(results.len());
        for result in results {
            if result.match_set_id != set.id {
                return Err(StoreError::InvalidRow(format!(
                    "match result {} belongs to set {}",
                    result.id, result.match_set_id
                )));
            }
            let key = (set.id, result.user_a_id, result.user_b_id);
            if !keys.insert(key) || tables.pair_keys.contains(&key) {
                return Err(StoreError::Conflict(format!(
                    "duplicate pair {} / {} in set {}",
                    result.user_a_id, result.user_b_id, set.id
                )));
            }
        }

        tables.match_sets.insert(set.id, set.clone());
        tables.pair_keys.extend(keys);
        for result in results {
            tables.match_results.insert(result.id, result.clone());
        }
        Ok(())
    }

    async fn match_set(&self, id: Uuid) -> Result<MatchSet, StoreError> {
        self.tables
            .read()
            .await
            .match_sets
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match set {}", id)))
    }
}

#[async_trait]
impl MatchResultStore for MemoryStore {
    async fn match_result(&self, id: Uuid) -> Result<MatchResult, StoreError> {
        self.tables
            .read()
            .await
            .match_results
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match result {}", id)))
    }

    async fn match_results(&self, filter: &MatchResultFilter, page: Page) -> Result<Vec<MatchResult>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&MatchResult> = tables
            .match_results
            .values()
            .filter(|r| filter.matches(r))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn record_hard_qualifiers(&self, id: Uuid, report: &QualifierReport) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        let row = tables.match_result_mut(id)?;
        row.passed_hard_qualifiers = Some(report.passed());
        row.hard_qualifier_report = Some(report.clone());
        row.compatibility_report = None;
        row.matched_qualitatively = false;
        row.is_possible_match = false;
        row.updated_at = now;
        Ok(())
    }

    async fn record_compatibility(&self, id: Uuid, report: &CompatibilityReport) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        let row = tables.match_result_mut(id)?;
        row.compatibility_report = Some(report.clone());
        row.matched_qualitatively = true;
        row.is_possible_match = true;
        row.updated_at = now;
        Ok(())
    }

    async fn approve(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables.match_result_mut(id)?;
        if row.approved {
            return Ok(false);
        }
        row.approved = true;
        row.approved_at = Some(at);
        row.updated_at = at;
        Ok(true)
    }

    async fn expire(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables.match_result_mut(id)?;
        if row.expired {
            return Ok(false);
        }
        row.expired = true;
        row.expired_at = Some(at);
        row.lifecycle_status = LifecycleStatus::Expired;
        row.updated_at = at;
        Ok(true)
    }

    async fn mark_dropped(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables.match_result_mut(id)?;
        if row.dropped {
            return Ok(false);
        }
        row.dropped = true;
        row.dropped_at = Some(at);
        row.updated_at = at;
        Ok(true)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> Result<Profile, StoreError> {
        self.tables
            .read()
            .await
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("profile for user {}", user_id)))
    }
}

#[async_trait]
impl ProposalStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn ProposalTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            tables: Arc::clone(&self.tables),
            row_locks: Arc::clone(&self.row_locks),
            clock: Arc::clone(&self.clock),
            locked: None,
            staged_row: None,
            staged_instances: Vec::new(),
            staged_logs: Vec::new(),
        }))
    }
}

/// Staged transaction over [`MemoryStore`]
struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
    locked: Option<(Uuid, OwnedMutexGuard<()>)>,
    staged_row: Option<MatchResult>,
    staged_instances: Vec<DateInstance>,
    staged_logs: Vec<DateInstanceLog>,
}

impl MemoryTx {
    fn view(row: &MatchResult, user_id: Uuid) -> Result<MatchForUser, StoreError> {
        row.for_user(user_id)
            .ok_or_else(|| StoreError::NotParticipant {
                match_id: row.id,
                user_id,
            })
    }

    fn staged_mut(&mut self, match_id: Uuid) -> Result<&mut MatchResult, StoreError> {
        match self.staged_row.as_mut() {
            Some(row) if row.id == match_id => Ok(row),
            _ => Err(StoreError::Conflict(format!(
                "match {} is not locked by this transaction",
                match_id
            ))),
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some((match_id, guard)) = self.locked.take() {
            drop(guard);
            self.row_locks
                .remove_if(&match_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[async_trait]
impl ProposalTx for MemoryTx {
    async fn lock_match_for_user(&mut self, match_id: Uuid, user_id: Uuid) -> Result<MatchForUser, StoreError> {
        if let Some(locked_id) = self.locked.as_ref().map(|(id, _)| *id) {
            if locked_id != match_id {
                return Err(StoreError::Conflict(format!(
                    "transaction already holds the lock on match {}",
                    locked_id
                )));
            }
            let row = self.staged_mut(match_id)?;
            return Self::view(row, user_id);
        }

        let lock = Arc::clone(&*self.row_locks.entry(match_id).or_default());
        self.locked = Some((match_id, lock.lock_owned().await));

        let row = self
            .tables
            .read()
            .await
            .match_results
            .get(&match_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match result {}", match_id)))?;
        let view = Self::view(&row, user_id)?;

        self.staged_row = Some(row);
        Ok(view)
    }

    async fn match_for_user(&mut self, match_id: Uuid, user_id: Uuid) -> Result<MatchForUser, StoreError> {
        if let Some(row) = self.staged_row.as_ref().filter(|r| r.id == match_id) {
            return Self::view(row, user_id);
        }

        let tables = self.tables.read().await;
        let row = tables
            .match_results
            .get(&match_id)
            .ok_or_else(|| StoreError::NotFound(format!("match result {}", match_id)))?;
        Self::view(row, user_id)
    }

    async fn update_user_action(&mut self, match_id: Uuid, user_id: Uuid, action: UserAction) -> Result<(), StoreError> {
        let now = self.clock.now();
        let row = self.staged_mut(match_id)?;
        if !row.set_action(user_id, action) {
            return Err(StoreError::NotParticipant { match_id, user_id });
        }
        row.updated_at = now;
        Ok(())
    }

    async fn update_lifecycle_status(&mut self, match_id: Uuid, status: LifecycleStatus) -> Result<(), StoreError> {
        let now = self.clock.now();
        let row = self.staged_mut(match_id)?;
        row.lifecycle_status = status;
        row.updated_at = now;
        Ok(())
    }

    async fn insert_date_instance(&mut self, instance: &DateInstance) -> Result<(), StoreError> {
        let duplicate_staged = self
            .staged_instances
            .iter()
            .any(|d| d.match_result_id == instance.match_result_id);
        let duplicate_committed = self
            .tables
            .read()
            .await
            .has_date_instance_for(instance.match_result_id);

        if duplicate_staged || duplicate_committed {
            return Err(StoreError::Conflict(format!(
                "date instance already exists for match {}",
                instance.match_result_id
            )));
        }
        self.staged_instances.push(instance.clone());
        Ok(())
    }

    async fn insert_date_instance_log(&mut self, log: &DateInstanceLog) -> Result<(), StoreError> {
        let known = self.staged_instances.iter().any(|d| d.id == log.date_instance_id)
            || self
                .tables
                .read()
                .await
                .date_instances
                .contains_key(&log.date_instance_id);
        if !known {
            return Err(StoreError::NotFound(format!("date instance {}", log.date_instance_id)));
        }
        self.staged_logs.push(log.clone());
        Ok(())
    }

    async fn update_match_for_date_instance(
        &mut self,
        match_id: Uuid,
        date_instance_id: Uuid,
        decision_window_ends_at: DateTime<Utc>,
        status: LifecycleStatus,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let row = self.staged_mut(match_id)?;
        row.current_date_instance_id = Some(date_instance_id);
        row.decision_window_ends_at = Some(decision_window_ends_at);
        row.lifecycle_status = status;
        row.updated_at = now;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = *self;
        let staged_row = this.staged_row.take();
        let staged_instances = std::mem::take(&mut this.staged_instances);
        let staged_logs = std::mem::take(&mut this.staged_logs);
        let mut tables = this.tables.write().await;

        for instance in &staged_instances {
            if tables.has_date_instance_for(instance.match_result_id) {
                return Err(StoreError::Conflict(format!(
                    "date instance already exists for match {}",
                    instance.match_result_id
                )));
            }
        }

        // only proposal columns are written back; drop and approval flags
        // may have moved while the row was locked
        if let Some(staged) = staged_row {
            let row = tables.match_result_mut(staged.id)?;
            row.user_a_action = staged.user_a_action;
            row.user_b_action = staged.user_b_action;
            if !row.expired {
                row.lifecycle_status = staged.lifecycle_status;
            }
            row.current_date_instance_id = staged.current_date_instance_id;
            row.decision_window_ends_at = staged.decision_window_ends_at;
            row.updated_at = staged.updated_at;
        }
        for instance in staged_instances {
            tables.date_instances.insert(instance.id, instance);
        }
        tables.date_instance_logs.extend(staged_logs);

        // row lock goes with `this`, after the writes are visible
        drop(tables);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    fn user(test_user: bool) -> User {
        User {
            id: Uuid::new_v4(),
            age: Some(30),
            gender: Some(Gender::Female),
            height_cm: Some(165),
            latitude: Some(0.0),
            longitude: Some(0.0),
            dating_preferences: vec![Gender::Male],
            is_test_user: test_user,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_users_filtered_by_test_flag() {
        let store = MemoryStore::default();
        store.insert_user(user(true)).await;
        store.insert_user(user(false)).await;
        store.insert_user(user(false)).await;

        let real = store.users(&UserFilter::active(Some(false))).await.unwrap();
        let all = store.users(&UserFilter::active(None)).await.unwrap();

        assert_eq!(real.len(), 2);
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_pair_rejected() {
        let store = MemoryStore::default();
        let set = MatchSet {
            id: Uuid::new_v4(),
            source: crate::models::IngestSource::All,
            number_of_participants: 2,
            number_of_pairs: 2,
            test_users: None,
            created_at: Utc::now(),
        };
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![
            MatchResult::new(set.id, a, b, Utc::now()),
            MatchResult::new(set.id, a, b, Utc::now()),
        ];

        let err = store.create_match_set(&set, &rows).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.match_set_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_tx_discards_writes() {
        let store = MemoryStore::default();
        let set_id = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let row = MatchResult::new(set_id, a, b, Utc::now());
        let row_id = row.id;
        store
            .tables
            .write()
            .await
            .match_results
            .insert(row_id, row);

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_match_for_user(row_id, a).await.unwrap();
            tx.update_user_action(row_id, a, UserAction::Proposed).await.unwrap();
        }

        let row = store.match_result(row_id).await.unwrap();
        assert_eq!(row.user_a_action, UserAction::Pending);

        // lock was released with the dropped transaction
        let mut tx = store.begin().await.unwrap();
        tx.lock_match_for_user(row_id, b).await.unwrap();
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_row_locks_released_after_use() {
        let store = MemoryStore::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows: Vec<MatchResult> = (0..3)
            .map(|_| MatchResult::new(Uuid::new_v4(), a, b, Utc::now()))
            .collect();
        for row in &rows {
            store.tables.write().await.match_results.insert(row.id, row.clone());
        }

        let mut tx = store.begin().await.unwrap();
        tx.lock_match_for_user(rows[0].id, a).await.unwrap();
        tx.update_user_action(rows[0].id, a, UserAction::Proposed).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.lock_match_for_user(rows[1].id, b).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_match_for_user(rows[2].id, a).await.unwrap();
            assert_eq!(store.row_locks.len(), 1);
        }

        assert!(store.row_locks.is_empty());
        assert_eq!(
            store.match_result(rows[0].id).await.unwrap().user_a_action,
            UserAction::Proposed
        );
    }
}
