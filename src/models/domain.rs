use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::models::report::{CompatibilityReport, QualifierReport};

/// Gender as recorded on a user and in dating preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::NonBinary => "non_binary",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "man" => Ok(Gender::Male),
            "female" | "woman" => Ok(Gender::Female),
            "non_binary" | "nonbinary" | "non-binary" => Ok(Gender::NonBinary),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

/// Snapshot of a user's matching attributes
///
/// Every attribute a qualifier reads is optional so a half-filled profile can
/// still be loaded and reported on; `validate()` enforces the required set
/// before a pair is processed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct User {
    pub id: Uuid,
    #[validate(required, range(min = 18, max = 120))]
    pub age: Option<u8>,
    #[validate(required)]
    pub gender: Option<Gender>,
    #[validate(required, range(min = 50, max = 260))]
    pub height_cm: Option<u16>,
    #[validate(required, range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(required, range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub dating_preferences: Vec<Gender>,
    #[serde(default)]
    pub is_test_user: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn accepts(&self, gender: Gender) -> bool {
        self.dating_preferences.contains(&gender)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Public profile handed to the compatibility classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub prompts: serde_json::Value,
}

/// Versioned hard-qualifier rule set, read once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    pub id: Uuid,
    pub version: i32,
    pub is_active: bool,
    /// Maximum age gap for same-gender and non-binary pairings
    pub age_range_end: u8,
    pub age_range_man_older_by: u8,
    pub age_range_woman_older_by: u8,
    pub height_male_greater_by_cm: i16,
    pub location_radius_km: f64,
    /// Fallback radii, tried in ascending order when the base radius fails
    #[serde(default)]
    pub location_adaptive_expansion: Vec<f64>,
    #[serde(default)]
    pub match_expiration_hours: Option<u32>,
    #[serde(default)]
    pub match_drop_hours: Option<u32>,
    #[serde(default)]
    pub compatibility_score_threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_MATCH_EXPIRATION_HOURS: u32 = 72;

impl MatchConfig {
    pub fn expiration_hours(&self) -> u32 {
        self.match_expiration_hours
            .unwrap_or(DEFAULT_MATCH_EXPIRATION_HOURS)
    }

    /// Adaptive radii sorted ascending, non-finite values dropped
    pub fn adaptive_radii(&self) -> Vec<f64> {
        let mut radii: Vec<f64> = self
            .location_adaptive_expansion
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .collect();
        radii.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        radii
    }
}

/// How a match set's population was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestSource {
    All,
    Unmatched,
}

impl IngestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestSource::All => "all",
            IngestSource::Unmatched => "unmatched",
        }
    }
}

impl FromStr for IngestSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(IngestSource::All),
            "unmatched" => Ok(IngestSource::Unmatched),
            other => Err(format!("unknown ingest source: {}", other)),
        }
    }
}

/// One batch of pairwise comparisons over a population snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSet {
    pub id: Uuid,
    pub source: IngestSource,
    pub number_of_participants: i32,
    pub number_of_pairs: i32,
    /// Test-user filter the population was selected with, if any
    pub test_users: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// A participant's answer to a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    #[default]
    Pending,
    Proposed,
    Passed,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::Pending => "pending",
            UserAction::Proposed => "proposed",
            UserAction::Passed => "passed",
        }
    }
}

impl FromStr for UserAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UserAction::Pending),
            "proposed" => Ok(UserAction::Proposed),
            "passed" => Ok(UserAction::Passed),
            other => Err(format!("unknown user action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Pending,
    Scheduling,
    Declined,
    Expired,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Pending => "pending",
            LifecycleStatus::Scheduling => "scheduling",
            LifecycleStatus::Declined => "declined",
            LifecycleStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Declined | LifecycleStatus::Expired)
    }
}

impl FromStr for LifecycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LifecycleStatus::Pending),
            "scheduling" => Ok(LifecycleStatus::Scheduling),
            "declined" => Ok(LifecycleStatus::Declined),
            "expired" => Ok(LifecycleStatus::Expired),
            other => Err(format!("unknown lifecycle status: {}", other)),
        }
    }
}

/// One pair's full record within a match set
///
/// `user_a_id < user_b_id` always holds; see [`crate::core::pairing::UserPair`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: Uuid,
    pub match_set_id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub hard_qualifier_report: Option<QualifierReport>,
    pub passed_hard_qualifiers: Option<bool>,
    pub matched_qualitatively: bool,
    pub is_possible_match: bool,
    pub compatibility_report: Option<CompatibilityReport>,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub dropped: bool,
    pub dropped_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub expired_at: Option<DateTime<Utc>>,
    pub user_a_action: UserAction,
    pub user_b_action: UserAction,
    pub current_date_instance_id: Option<Uuid>,
    pub lifecycle_status: LifecycleStatus,
    pub decision_window_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchResult {
    /// A fresh row with empty qualifier state
    pub fn new(match_set_id: Uuid, user_a_id: Uuid, user_b_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_set_id,
            user_a_id,
            user_b_id,
            hard_qualifier_report: None,
            passed_hard_qualifiers: None,
            matched_qualitatively: false,
            is_possible_match: false,
            compatibility_report: None,
            approved: false,
            approved_at: None,
            dropped: false,
            dropped_at: None,
            expired: false,
            expired_at: None,
            user_a_action: UserAction::Pending,
            user_b_action: UserAction::Pending,
            current_date_instance_id: None,
            lifecycle_status: LifecycleStatus::Pending,
            decision_window_ends_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    /// Project the row from one participant's point of view
    pub fn for_user(&self, user_id: Uuid) -> Option<MatchForUser> {
        let (other_user_id, user_action, other_user_action) = if self.user_a_id == user_id {
            (self.user_b_id, self.user_a_action, self.user_b_action)
        } else if self.user_b_id == user_id {
            (self.user_a_id, self.user_b_action, self.user_a_action)
        } else {
            return None;
        };

        Some(MatchForUser {
            match_result_id: self.id,
            user_id,
            other_user_id,
            user_action,
            other_user_action,
            current_date_instance_id: self.current_date_instance_id,
            lifecycle_status: self.lifecycle_status,
            decision_window_ends_at: self.decision_window_ends_at,
            expired: self.expired,
        })
    }

    /// Set the action column belonging to `user_id`; false if not a participant
    pub fn set_action(&mut self, user_id: Uuid, action: UserAction) -> bool {
        if self.user_a_id == user_id {
            self.user_a_action = action;
        } else if self.user_b_id == user_id {
            self.user_b_action = action;
        } else {
            return false;
        }
        true
    }
}

/// A match row as one participant sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchForUser {
    pub match_result_id: Uuid,
    pub user_id: Uuid,
    pub other_user_id: Uuid,
    pub user_action: UserAction,
    pub other_user_action: UserAction,
    pub current_date_instance_id: Option<Uuid>,
    pub lifecycle_status: LifecycleStatus,
    pub decision_window_ends_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

/// A scheduled meeting created from a mutual proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateInstance {
    pub id: Uuid,
    pub match_result_id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub status: LifecycleStatus,
    pub decision_window_ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Audit trail entry for a date instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateInstanceLog {
    pub id: Uuid,
    pub date_instance_id: Uuid,
    pub action: String,
    pub actor_user_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
