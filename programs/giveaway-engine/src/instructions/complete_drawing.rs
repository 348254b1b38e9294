use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::{
    config::EngineSettings,
    error::Result,
    events::{emit, DrawingCompleted},
    instructions::select_winners::select_winners,
    state::{Drawing, DrawingId, Winner},
    store::{self, Store},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Someone else already flipped the completion flag (or the drawing is gone).
    AlreadyCompleted,
    Completed {
        drawing: Drawing,
        participant_count: usize,
        winners: Vec<Winner>,
    },
}

/// Closes a drawing and draws its winners in a single transaction.
///
/// Execution order:
/// 1. Compare-and-set `completed` from false to true; if nothing changed the
///    drawing was already closed and the call returns `AlreadyCompleted`
/// 2. Read the full participant set inside the same transaction
/// 3. Select `min(requested, participants)` winners uniformly
/// 4. Insert one winner row per selection and credit each winner
/// 5. Commit
///
/// Because step 1 is the first write, a second caller blocks on the write lock
/// and then sees `completed = 1`, so selection runs at most once per drawing.
/// With zero participants the drawing still completes, with no winners.
pub async fn complete_drawing<R: Rng + Send>(
    store: &Store,
    settings: &EngineSettings,
    drawing_id: DrawingId,
    rng: &mut R,
) -> Result<Completion> {
    let mut tx = store.pool().begin().await?;

    let Some(drawing) = store::claim_completion(&mut *tx, drawing_id).await? else {
        return Ok(Completion::AlreadyCompleted);
    };

    let participants = store::participants_in(&mut *tx, drawing_id).await?;
    let selected = select_winners(&participants, drawing.winners_requested, rng);

    let mut winners = Vec::with_capacity(selected.len());
    for participant in &selected {
        winners.push(store::insert_winner(&mut *tx, participant).await?);
        store::credit_user(&mut *tx, participant.user_id, settings.winner_credits).await?;
    }
    tx.commit().await?;

    info!(
        drawing_id,
        participants = participants.len(),
        winners = winners.len(),
        "giveaway completed"
    );
    emit(&DrawingCompleted {
        drawing_id,
        participant_count: participants.len(),
        winners: winners.iter().map(|w| w.user_id).collect(),
        completed_at: Utc::now(),
    });

    Ok(Completion::Completed {
        drawing,
        participant_count: participants.len(),
        winners,
    })
}
