use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::state::UserId;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub user_id: UserId,
    pub display_name: Option<String>,
    /// Inviting user, written once at first registration.
    pub referred_by: Option<UserId>,
    pub notify: bool,
    pub credit_balance: i64,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Per-user counters shown on the profile screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub participations: i64,
    pub wins: i64,
    pub referrals: i64,
    pub credit_balance: i64,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReferrerTally {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub referrals: i64,
}

/// Admin dashboard counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub total_users: i64,
    pub new_users_last_week: i64,
    pub total_drawings: i64,
    pub active_drawings: i64,
    pub completed_drawings: i64,
    pub total_winners: i64,
}
