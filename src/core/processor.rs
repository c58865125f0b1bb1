use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::clock::Clock;
use crate::core::qualifiers::QualifierChain;
use crate::models::{CompatibilityReport, ConfigFilter, PairOutcome, User};
use crate::services::compatibility::{CompatibilityError, CompatibilityScorer, ProfilePair};
use crate::services::store::{ConfigStore, MatchResultStore, ProfileStore, StoreError, UserStore};

/// Why a single pair could not be processed
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("User {user_id} has invalid or missing matching attributes: {errors}")]
    Validation {
        user_id: Uuid,
        errors: ValidationErrors,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Compatibility error: {0}")]
    Compatibility(#[from] CompatibilityError),
}

/// Evaluates one match result end to end
///
/// # Pipeline Stages
/// 1. Load and validate both users
/// 2. Load the active match config
/// 3. Run every hard qualifier and persist the report
/// 4. Score qualified pairs with the compatibility classifier
#[derive(Clone)]
pub struct MatchProcessor {
    users: Arc<dyn UserStore>,
    configs: Arc<dyn ConfigStore>,
    results: Arc<dyn MatchResultStore>,
    profiles: Arc<dyn ProfileStore>,
    scorer: Arc<dyn CompatibilityScorer>,
    chain: Arc<QualifierChain>,
    clock: Arc<dyn Clock>,
}

impl MatchProcessor {
    pub fn new(
        users: Arc<dyn UserStore>,
        configs: Arc<dyn ConfigStore>,
        results: Arc<dyn MatchResultStore>,
        profiles: Arc<dyn ProfileStore>,
        scorer: Arc<dyn CompatibilityScorer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            configs,
            results,
            profiles,
            scorer,
            chain: Arc::new(QualifierChain::standard()),
            clock,
        }
    }

    /// Swap the qualifier chain
    pub fn with_chain(mut self, chain: QualifierChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    async fn load_valid_user(&self, id: Uuid) -> Result<User, ProcessError> {
        let user = self.users.user(id).await?;
        user.validate()
            .map_err(|errors| ProcessError::Validation { user_id: id, errors })?;
        Ok(user)
    }

    /// Process a single match result
    ///
    /// A pair failing its hard qualifiers is a normal outcome, not an error.
    /// Errors leave whatever was already persisted for the row untouched.
    pub async fn process(&self, match_result_id: Uuid) -> Result<PairOutcome, ProcessError> {
        let row = self.results.match_result(match_result_id).await?;

        let user_a = self.load_valid_user(row.user_a_id).await?;
        let user_b = self.load_valid_user(row.user_b_id).await?;

        let config = self.configs.config(&ConfigFilter::active()).await?;

        let report = self.chain.run(&config, &user_a, &user_b);
        self.results.record_hard_qualifiers(row.id, &report).await?;

        if !report.passed() {
            let failures: Vec<String> = report.failures().map(|f| f.code.clone()).collect();
            tracing::debug!("Match {} disqualified: {:?}", row.id, failures);
            return Ok(PairOutcome::Disqualified { failures });
        }

        let pair = ProfilePair {
            a: self.profiles.profile(user_a.id).await?,
            b: self.profiles.profile(user_b.id).await?,
        };

        let result = self.scorer.qualify(&pair).await?;
        let score = result.score;
        let compatibility = CompatibilityReport::new(result, config.compatibility_score_threshold, self.clock.now());
        self.results.record_compatibility(row.id, &compatibility).await?;

        tracing::debug!(
            "Match {} qualified with score {:.3} (meets threshold: {:?})",
            row.id,
            score,
            compatibility.meets_threshold
        );
        Ok(PairOutcome::Qualified { score })
    }
}
