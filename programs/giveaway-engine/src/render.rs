use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::constants::ALLOWED_TAGS;
use crate::messenger::{CallToAction, Messenger};
use crate::state::{Drawing, DrawingId, UserId, Winner};
use crate::store::Store;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

/// Text and optional button for a drawing's public post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub text: String,
    pub action: Option<CallToAction>,
}

/// Strips everything but the basic formatting tags the chat platform accepts.
/// Disallowed tags are dropped, their content is kept.
pub fn sanitize(text: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_TAGS.into_iter().collect();
    let tag_attributes: HashMap<&str, HashSet<&str>> =
        HashMap::from([("a", HashSet::from(["href"]))]);
    ammonia::Builder::new()
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .link_rel(None)
        .clean(text)
        .to_string()
}

/// Escapes the characters that are significant in HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Whole minutes and seconds left, or "Finished".
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds();
    if secs <= 0 {
        return "Finished".to_string();
    }
    format!("{} min {} sec left", secs / 60, secs % 60)
}

/// Keeps the first and last two digits of an id.
pub fn mask_user_id(user_id: UserId) -> String {
    let digits = user_id.unsigned_abs().to_string();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let (head, rest) = digits.split_at(2);
    let tail = &rest[rest.len() - 2..];
    format!("{head}{}{tail}", "*".repeat(rest.len() - 2))
}

fn winner_label(winner: &Winner) -> String {
    match winner.display_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => escape_html(name),
        _ => format!("<code>{}</code>", mask_user_id(winner.user_id)),
    }
}

/// Builds the status post. Pure: all inputs are passed in.
pub fn render_post(
    drawing: &Drawing,
    participant_count: i64,
    winners: &[Winner],
    now: DateTime<Utc>,
) -> RenderedPost {
    let remaining = if drawing.completed {
        "Finished".to_string()
    } else {
        format_remaining(drawing.remaining(now))
    };

    let mut text = format!(
        "{body}\n{RULE}\n\
         👥 <b>Participants:</b> <b>{participant_count}</b>\n\
         🏆 <b>Winners:</b> <b>{winners_requested}</b>\n\
         ⏰ <b>Time left:</b> {remaining}\n\
         {RULE}\n\
         <b>How to enter</b>\n\
         1️⃣ Subscribe to every required channel\n\
         2️⃣ Press <b>Join</b> and wait for the draw!\n\
         {RULE}\n\
         🍀 <b>Good luck!</b>",
        body = sanitize(&drawing.text),
        winners_requested = drawing.winners_requested,
    );

    if !drawing.completed {
        return RenderedPost {
            text,
            action: Some(CallToAction::join(drawing.id)),
        };
    }

    if winners.is_empty() {
        text.push_str("\n\n<b>No winners: nobody entered this giveaway.</b>");
    } else {
        text.push_str("\n\n<b>Winners:</b>\n");
        for winner in winners {
            text.push_str(" - ");
            text.push_str(&winner_label(winner));
            text.push('\n');
        }
    }
    RenderedPost { text, action: None }
}

/// Recomputes the post for `drawing_id` and edits it in place.
///
/// Never fails: a missing drawing, missing post location, store error or
/// rejected edit is logged and otherwise ignored.
pub async fn refresh_post<M: Messenger>(store: &Store, messenger: &M, drawing_id: DrawingId) {
    let loaded = async {
        let Some(drawing) = store.fetch_drawing(drawing_id).await? else {
            return Ok(None);
        };
        let count = store.count_participants(drawing_id).await?;
        let winners = if drawing.completed {
            store.winners(drawing_id).await?
        } else {
            Vec::new()
        };
        Ok::<_, crate::error::GiveawayError>(Some((drawing, count, winners)))
    }
    .await;

    let (drawing, count, winners) = match loaded {
        Ok(Some(loaded)) => loaded,
        Ok(None) => {
            debug!(drawing_id, "refresh skipped: drawing not found");
            return;
        }
        Err(err) => {
            warn!(drawing_id, %err, "refresh skipped: store unavailable");
            return;
        }
    };

    let Some(location) = drawing.post_location() else {
        debug!(drawing_id, "refresh skipped: no post location recorded");
        return;
    };

    let post = render_post(&drawing, count, &winners, Utc::now());
    if let Err(err) = messenger
        .edit_message(
            location.chat_id,
            location.message_id,
            &post.text,
            post.action.as_ref(),
        )
        .await
    {
        warn!(drawing_id, %err, "failed to edit giveaway post");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sqlx::types::Json;

    use super::*;

    fn drawing(completed: bool, end_in_secs: i64, now: DateTime<Utc>) -> Drawing {
        Drawing {
            id: 9,
            text: "<b>Win</b> a <script>alert(1)</script><blink>prize</blink>".to_string(),
            winners_requested: 2,
            end_time: now + Duration::seconds(end_in_secs),
            completed,
            reminder_sent: false,
            required_channels: Json(vec![]),
            post_chat_id: Some(-100),
            post_message_id: Some(1),
            created_at: now,
        }
    }

    fn winner(user_id: UserId, name: Option<&str>) -> Winner {
        Winner {
            id: user_id,
            user_id,
            display_name: name.map(str::to_string),
            drawing_id: 9,
        }
    }

    #[test]
    fn sanitize_keeps_basic_tags_and_drops_the_rest() {
        let cleaned = sanitize(r#"<b>bold</b> <a href="https://x.y" onclick="z">l</a> <div>d</div><script>s</script>"#);
        assert_eq!(cleaned, r#"<b>bold</b> <a href="https://x.y">l</a> d"#);
    }

    #[test]
    fn escaping_touches_only_markup_characters() {
        assert_eq!(
            escape_html("Tom & \"Jerry\" <3\nline two / a=b"),
            "Tom &amp; &quot;Jerry&quot; &lt;3\nline two / a=b"
        );
    }

    #[test]
    fn remaining_time_is_whole_minutes_and_seconds() {
        assert_eq!(format_remaining(Duration::seconds(125)), "2 min 5 sec left");
        assert_eq!(format_remaining(Duration::milliseconds(59_900)), "0 min 59 sec left");
        assert_eq!(format_remaining(Duration::seconds(0)), "Finished");
        assert_eq!(format_remaining(Duration::seconds(-3)), "Finished");
    }

    #[test]
    fn masked_ids_hide_the_middle() {
        assert_eq!(mask_user_id(747885035), "74*****35");
        assert_eq!(mask_user_id(1234), "****");
    }

    #[test]
    fn open_post_has_counts_and_join_button() {
        let now = Utc::now();
        let post = render_post(&drawing(false, 90, now), 5, &[], now);

        assert!(post.text.starts_with("<b>Win</b> a prize\n"));
        assert!(post.text.contains("<b>Participants:</b> <b>5</b>"));
        assert!(post.text.contains("<b>Winners:</b> <b>2</b>"));
        assert!(post.text.contains("1 min 30 sec left"));
        assert_eq!(post.action, Some(CallToAction::join(9)));
    }

    #[test]
    fn completed_post_lists_winners_without_button() {
        let now = Utc::now();
        let winners = [winner(11, Some("@alice")), winner(123456789, None), winner(5, Some("<x>"))];
        let post = render_post(&drawing(true, -10, now), 3, &winners, now);

        assert_eq!(post.action, None);
        assert!(post.text.contains("Finished"));
        assert!(post.text.contains(" - @alice\n"));
        assert!(post.text.contains(" - <code>12*****89</code>\n"));
        assert!(post.text.contains(" - &lt;x&gt;\n"));
    }

    #[test]
    fn completed_post_without_entries_says_so() {
        let now = Utc::now();
        let post = render_post(&drawing(true, -10, now), 0, &[], now);
        assert!(post.text.contains("No winners: nobody entered this giveaway."));
        assert_eq!(post.action, None);
    }
}
