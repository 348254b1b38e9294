use sqlx::FromRow;

use crate::state::{DrawingId, UserId};

/// A user's admitted entry into a drawing. Unique per (drawing, user).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Participant {
    pub id: i64,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub drawing_id: DrawingId,
}
