use chrono::{DateTime, Duration, Utc};

use crate::{
    error::Result,
    state::{Analytics, Drawing, DrawingSummary, ReferrerTally, UserId, UserStats, Winner, WinnerTally},
    store::Store,
};

/// A finished drawing and who won it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDrawing {
    pub drawing: Drawing,
    pub winners: Vec<Winner>,
}

/// Open drawings that have not reached their end time, soonest first.
pub async fn active_drawings(store: &Store, now: DateTime<Utc>) -> Result<Vec<DrawingSummary>> {
    let mut summaries = store.open_drawing_summaries().await?;
    summaries.retain(|summary| summary.drawing.end_time > now);
    Ok(summaries)
}

/// The `limit` most recently completed drawings with their winners.
pub async fn drawing_history(store: &Store, limit: i64) -> Result<Vec<CompletedDrawing>> {
    let drawings = store.completed_drawings(limit).await?;
    let mut history = Vec::with_capacity(drawings.len());
    for drawing in drawings {
        let winners = store.winners(drawing.id).await?;
        history.push(CompletedDrawing { drawing, winners });
    }
    Ok(history)
}

pub async fn user_stats(store: &Store, user_id: UserId) -> Result<Option<UserStats>> {
    store.user_stats(user_id).await
}

pub async fn top_winners(store: &Store, limit: i64) -> Result<Vec<WinnerTally>> {
    store.top_winners(limit).await
}

pub async fn top_referrers(store: &Store, limit: i64) -> Result<Vec<ReferrerTally>> {
    store.top_referrers(limit).await
}

/// Dashboard counters; "new" means registered within the last seven days.
pub async fn analytics(store: &Store, now: DateTime<Utc>) -> Result<Analytics> {
    store.analytics(now - Duration::days(7)).await
}
