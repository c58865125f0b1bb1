use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Options for building a match set
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestOptions {
    /// `Some(true)` restricts the population to test users, `Some(false)` excludes them
    #[serde(default, rename = "testUsers")]
    pub test_users: Option<bool>,
}

impl IngestOptions {
    pub fn real_users_only() -> Self {
        Self { test_users: Some(false) }
    }
}

/// User selection for `UserStore::users`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFilter {
    pub is_active: Option<bool>,
    pub is_test_user: Option<bool>,
}

impl UserFilter {
    pub fn active(test_users: Option<bool>) -> Self {
        Self {
            is_active: Some(true),
            is_test_user: test_users,
        }
    }

    pub fn matches(&self, user: &crate::models::User) -> bool {
        self.is_active.map_or(true, |a| user.is_active == a)
            && self.is_test_user.map_or(true, |t| user.is_test_user == t)
    }
}

/// Match config selection; stores must error on zero or several matches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFilter {
    pub id: Option<Uuid>,
    pub version: Option<i32>,
    pub is_active: Option<bool>,
}

impl ConfigFilter {
    pub fn active() -> Self {
        Self {
            is_active: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, config: &crate::models::MatchConfig) -> bool {
        self.id.map_or(true, |id| config.id == id)
            && self.version.map_or(true, |v| config.version == v)
            && self.is_active.map_or(true, |a| config.is_active == a)
    }
}

/// Match result selection; results always come back oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResultFilter {
    pub match_set_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub approved: Option<bool>,
    pub dropped: Option<bool>,
    pub expired: Option<bool>,
}

impl MatchResultFilter {
    pub fn for_set(match_set_id: Uuid) -> Self {
        Self {
            match_set_id: Some(match_set_id),
            ..Default::default()
        }
    }

    /// Approved results not yet shown to their users
    pub fn awaiting_drop() -> Self {
        Self {
            approved: Some(true),
            dropped: Some(false),
            ..Default::default()
        }
    }

    pub fn matches(&self, result: &crate::models::MatchResult) -> bool {
        self.match_set_id.map_or(true, |id| result.match_set_id == id)
            && self.user_id.map_or(true, |id| result.involves(id))
            && self.approved.map_or(true, |a| result.approved == a)
            && self.dropped.map_or(true, |d| result.dropped == d)
            && self.expired.map_or(true, |e| result.expired == e)
    }
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn next(self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset + self.limit,
        }
    }
}
