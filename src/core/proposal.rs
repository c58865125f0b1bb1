use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{
    ConfigFilter, DateInstance, DateInstanceLog, LifecycleStatus, MatchForUser, ProposalOutcome, UserAction,
    DEFAULT_MATCH_EXPIRATION_HOURS,
};
use crate::services::store::{ConfigStore, ProposalStore, ProposalTx, StoreError};

/// Audit action written when a date instance is created
pub const LOG_CREATED: &str = "created";

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Match {0} not found")]
    MatchNotFound(Uuid),

    #[error("User {user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: Uuid, user_id: Uuid },

    #[error("Cannot move match {match_id} from {from} to {to}")]
    InvalidTransition {
        match_id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("Match {0} has expired")]
    MatchExpired(Uuid),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ProposalError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotParticipant { match_id, user_id } => ProposalError::NotParticipant { match_id, user_id },
            other => ProposalError::Store(other),
        }
    }
}

/// Per-user propose/pass decisions on a match result
///
/// Every call runs in one store transaction holding the row lock on the
/// match, so concurrent proposers on the same pair are serialized and only
/// one of them can see the other's proposal first.
pub struct ProposalMachine {
    store: Arc<dyn ProposalStore>,
    configs: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
}

impl ProposalMachine {
    pub fn new(store: Arc<dyn ProposalStore>, configs: Arc<dyn ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, configs, clock }
    }

    /// Propose in a fresh transaction; rolled back on any error
    pub async fn propose_match(&self, match_id: Uuid, user_id: Uuid) -> Result<ProposalOutcome, ProposalError> {
        let mut tx = self.store.begin().await?;

        match self.propose_in(tx.as_mut(), match_id, user_id).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback of proposal on match {} failed: {}", match_id, rollback);
                }
                Err(e)
            }
        }
    }

    /// Pass in a fresh transaction; rolled back on any error
    pub async fn pass_match(&self, match_id: Uuid, user_id: Uuid) -> Result<(), ProposalError> {
        let mut tx = self.store.begin().await?;

        match self.pass_in(tx.as_mut(), match_id, user_id).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback of pass on match {} failed: {}", match_id, rollback);
                }
                Err(e)
            }
        }
    }

    async fn lock(&self, tx: &mut dyn ProposalTx, match_id: Uuid, user_id: Uuid) -> Result<MatchForUser, ProposalError> {
        let view = tx.lock_match_for_user(match_id, user_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => ProposalError::MatchNotFound(match_id),
            other => other.into(),
        })?;

        if view.expired || view.lifecycle_status == LifecycleStatus::Expired {
            return Err(ProposalError::MatchExpired(match_id));
        }
        Ok(view)
    }

    /// A declined match takes no further actions
    fn ensure_open(view: &MatchForUser, to: UserAction) -> Result<(), ProposalError> {
        if view.lifecycle_status.is_terminal() {
            return Err(ProposalError::InvalidTransition {
                match_id: view.match_result_id,
                from: view.lifecycle_status.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    /// Propose inside a caller-owned transaction
    ///
    /// Repeating a proposal is a no-op that reports the current state,
    /// including the date instance if one exists.
    pub async fn propose_in(
        &self,
        tx: &mut dyn ProposalTx,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<ProposalOutcome, ProposalError> {
        let view = self.lock(tx, match_id, user_id).await?;
        Self::ensure_open(&view, UserAction::Proposed)?;

        match view.user_action {
            UserAction::Passed => {
                return Err(ProposalError::InvalidTransition {
                    match_id,
                    from: UserAction::Passed.as_str(),
                    to: UserAction::Proposed.as_str(),
                })
            }
            UserAction::Proposed => {}
            UserAction::Pending => tx.update_user_action(match_id, user_id, UserAction::Proposed).await?,
        }

        let mut mutual = view.other_user_action == UserAction::Proposed;
        let current = tx.match_for_user(match_id, user_id).await?;
        if !mutual && current.other_user_action == UserAction::Proposed {
            tracing::debug!("Mutual proposal on match {} found on re-read", match_id);
            mutual = true;
        }

        if !mutual {
            return Ok(ProposalOutcome {
                match_result_id: match_id,
                mutual_proposal: false,
                date_instance_id: None,
            });
        }

        let date_instance_id = self.ensure_date_instance(tx, &current).await?;
        Ok(ProposalOutcome {
            match_result_id: match_id,
            mutual_proposal: true,
            date_instance_id: Some(date_instance_id),
        })
    }

    /// Pass inside a caller-owned transaction
    ///
    /// A proposal can still be withdrawn by passing until a date instance exists.
    pub async fn pass_in(&self, tx: &mut dyn ProposalTx, match_id: Uuid, user_id: Uuid) -> Result<(), ProposalError> {
        let view = self.lock(tx, match_id, user_id).await?;

        if view.user_action == UserAction::Passed {
            return Ok(());
        }
        Self::ensure_open(&view, UserAction::Passed)?;
        if view.current_date_instance_id.is_some() {
            return Err(ProposalError::InvalidTransition {
                match_id,
                from: view.user_action.as_str(),
                to: UserAction::Passed.as_str(),
            });
        }

        tx.update_user_action(match_id, user_id, UserAction::Passed).await?;
        tx.update_lifecycle_status(match_id, LifecycleStatus::Declined).await?;

        tracing::info!("User {} passed on match {}", user_id, match_id);
        Ok(())
    }

    async fn expiration(&self) -> Result<Duration, ProposalError> {
        let hours = match self.configs.config(&ConfigFilter::active()).await {
            Ok(config) => config.expiration_hours(),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(
                    "No active match config, using {}h decision window",
                    DEFAULT_MATCH_EXPIRATION_HOURS
                );
                DEFAULT_MATCH_EXPIRATION_HOURS
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Duration::hours(i64::from(hours)))
    }

    /// Create the date instance for a mutual match exactly once
    async fn ensure_date_instance(&self, tx: &mut dyn ProposalTx, view: &MatchForUser) -> Result<Uuid, ProposalError> {
        if let Some(existing) = view.current_date_instance_id {
            return Ok(existing);
        }

        let now = self.clock.now();
        let decision_window_ends_at = match view.decision_window_ends_at {
            Some(at) => at,
            None => now + self.expiration().await?,
        };

        let (user_a_id, user_b_id) = if view.user_id < view.other_user_id {
            (view.user_id, view.other_user_id)
        } else {
            (view.other_user_id, view.user_id)
        };
        let instance = DateInstance {
            id: Uuid::new_v4(),
            match_result_id: view.match_result_id,
            user_a_id,
            user_b_id,
            status: LifecycleStatus::Scheduling,
            decision_window_ends_at,
            created_at: now,
        };
        tx.insert_date_instance(&instance).await?;

        tx.insert_date_instance_log(&DateInstanceLog {
            id: Uuid::new_v4(),
            date_instance_id: instance.id,
            action: LOG_CREATED.to_string(),
            actor_user_id: Some(view.user_id),
            details: json!({
                "reason": "mutual_proposal",
                "decision_window_ends_at": decision_window_ends_at,
            }),
            created_at: now,
        })
        .await?;

        tx.update_match_for_date_instance(
            view.match_result_id,
            instance.id,
            decision_window_ends_at,
            LifecycleStatus::Scheduling,
        )
        .await?;

        tracing::info!(
            "Mutual proposal on match {}: created date instance {} (decision window ends {})",
            view.match_result_id,
            instance.id,
            decision_window_ends_at
        );
        Ok(instance.id)
    }
}
