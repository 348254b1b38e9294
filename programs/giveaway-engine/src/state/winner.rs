use sqlx::FromRow;

use crate::state::{DrawingId, UserId};

/// A participant selected at closure. Written once, in the closure transaction.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Winner {
    pub id: i64,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub drawing_id: DrawingId,
}

/// One leaderboard line: a user and how many times they won.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct WinnerTally {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub wins: i64,
}
