//! Capability contracts the matching core consumes.
//!
//! The core only ever holds these as `Arc<dyn ...>`; concrete persistence
//! lives in [`super::memory`] and [`super::postgres`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CompatibilityReport, ConfigFilter, DateInstance, DateInstanceLog, LifecycleStatus, MatchConfig,
    MatchForUser, MatchResult, MatchResultFilter, MatchSet, Page, Profile, QualifierReport, User,
    UserAction, UserFilter,
};

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User {user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: Uuid, user_id: Uuid },

    #[error("Ambiguous match: {0}")]
    Ambiguous(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("SQLx error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError>;

    async fn user(&self, id: Uuid) -> Result<User, StoreError>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Exactly one config matching `filter`; `NotFound` or `Ambiguous` otherwise
    async fn config(&self, filter: &ConfigFilter) -> Result<MatchConfig, StoreError>;
}

#[async_trait]
pub trait MatchSetStore: Send + Sync {
    /// Persist a set and all of its results in one pass
    async fn create_match_set(&self, set: &MatchSet, results: &[MatchResult]) -> Result<(), StoreError>;

    async fn match_set(&self, id: Uuid) -> Result<MatchSet, StoreError>;
}

#[async_trait]
pub trait MatchResultStore: Send + Sync {
    async fn match_result(&self, id: Uuid) -> Result<MatchResult, StoreError>;

    /// Results matching `filter`, ordered by `created_at` then `id`
    async fn match_results(&self, filter: &MatchResultFilter, page: Page) -> Result<Vec<MatchResult>, StoreError>;

    /// Store the qualifier report; always resets `matched_qualitatively`
    async fn record_hard_qualifiers(&self, id: Uuid, report: &QualifierReport) -> Result<(), StoreError>;

    /// Store a compatibility score and flag the pair as a possible match
    async fn record_compatibility(&self, id: Uuid, report: &CompatibilityReport) -> Result<(), StoreError>;

    /// Returns false when the row was already approved
    async fn approve(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Returns false when the row was already expired
    async fn expire(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Conditional on `dropped = false`; returns false when another pass got there first
    async fn mark_dropped(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> Result<Profile, StoreError>;
}

/// Opens transactions for the proposal state machine
#[async_trait]
pub trait ProposalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ProposalTx>, StoreError>;
}

/// A single transaction holding a row lock on at most one match result
///
/// Dropping the transaction without `commit` discards every write.
#[async_trait]
pub trait ProposalTx: Send {
    /// Read the match-for-user view and lock the underlying row until commit/rollback
    async fn lock_match_for_user(&mut self, match_id: Uuid, user_id: Uuid) -> Result<MatchForUser, StoreError>;

    /// Re-read the view inside the transaction
    async fn match_for_user(&mut self, match_id: Uuid, user_id: Uuid) -> Result<MatchForUser, StoreError>;

    async fn update_user_action(&mut self, match_id: Uuid, user_id: Uuid, action: UserAction) -> Result<(), StoreError>;

    async fn update_lifecycle_status(&mut self, match_id: Uuid, status: LifecycleStatus) -> Result<(), StoreError>;

    async fn insert_date_instance(&mut self, instance: &DateInstance) -> Result<(), StoreError>;

    async fn insert_date_instance_log(&mut self, log: &DateInstanceLog) -> Result<(), StoreError>;

    async fn update_match_for_date_instance(
        &mut self,
        match_id: Uuid,
        date_instance_id: Uuid,
        decision_window_ends_at: DateTime<Utc>,
        status: LifecycleStatus,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
