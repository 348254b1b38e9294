use chrono::{DateTime, Duration, Utc};
use tokio::time;
use tracing::{info, warn};

use crate::{
    config::EngineSettings,
    constants::{MAX_DURATION_MINUTES, MIN_DURATION_MINUTES},
    error::{GiveawayError, Result},
    events::{emit, DrawingCreated},
    messenger::Messenger,
    render::render_post,
    state::{ChatId, Drawing, NewDrawing, PostLocation},
    store::Store,
};

/// Parameters for a new drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDrawing {
    pub text: String,
    pub winners_requested: i64,
    pub duration_minutes: i64,
    pub required_channels: Vec<ChatId>,
    /// Chat the public post is published to. No post when `None`.
    pub post_chat_id: Option<ChatId>,
}

/// Creates a drawing and publishes its status post.
///
/// # Arguments
/// * `store` - persisted store the drawing row is written to
/// * `messenger` - used once to publish the initial post
/// * `request` - text, winner count, duration and gating channels
/// * `now` - creation instant; the end time is `now + duration`
///
/// # Validation
/// 1. Text must not be blank
/// 2. At least one winner
/// 3. Duration between one minute and 30 days
///
/// # Implementation Notes
/// - The drawing starts open with `completed = false`
/// - A failed publish is logged; the drawing still exists and runs, it just
///   has no post location for live edits
/// - Spawning the watcher and the announcement broadcast is the caller's job
pub async fn create_drawing<M: Messenger>(
    store: &Store,
    messenger: &M,
    settings: &EngineSettings,
    request: CreateDrawing,
    now: DateTime<Utc>,
) -> Result<Drawing> {
    validate(&request)?;

    let new = NewDrawing {
        text: request.text,
        winners_requested: request.winners_requested,
        end_time: now + Duration::minutes(request.duration_minutes),
        required_channels: request.required_channels,
    };
    let mut drawing = store.insert_drawing(&new, now).await?;

    if let Some(chat_id) = request.post_chat_id {
        let post = render_post(&drawing, 0, &[], now);
        let sent = time::timeout(
            settings.external_call_timeout(),
            messenger.send_message(chat_id, &post.text, post.action.as_ref()),
        )
        .await;
        match sent {
            Ok(Ok(message_id)) => {
                let location = PostLocation {
                    chat_id,
                    message_id,
                };
                store.set_post_location(drawing.id, location).await?;
                drawing.post_chat_id = Some(chat_id);
                drawing.post_message_id = Some(message_id);
            }
            Ok(Err(err)) => warn!(drawing_id = drawing.id, chat_id, %err, "failed to publish giveaway post"),
            Err(_) => warn!(drawing_id = drawing.id, chat_id, "publishing giveaway post timed out"),
        }
    }

    info!(
        drawing_id = drawing.id,
        end_time = %drawing.end_time,
        winners = drawing.winners_requested,
        "giveaway created"
    );
    emit(&DrawingCreated {
        drawing_id: drawing.id,
        winners_requested: drawing.winners_requested,
        end_time: drawing.end_time,
        required_channels: drawing.channels().to_vec(),
        post_chat_id: drawing.post_chat_id,
    });

    Ok(drawing)
}

fn validate(request: &CreateDrawing) -> Result<()> {
    if request.text.trim().is_empty() {
        return Err(GiveawayError::EmptyText);
    }
    if request.winners_requested < 1 {
        return Err(GiveawayError::WinnersTooLow);
    }
    if request.duration_minutes < MIN_DURATION_MINUTES {
        return Err(GiveawayError::DurationTooShort(MIN_DURATION_MINUTES));
    }
    if request.duration_minutes > MAX_DURATION_MINUTES {
        return Err(GiveawayError::DurationTooLong(MAX_DURATION_MINUTES));
    }
    Ok(())
}
