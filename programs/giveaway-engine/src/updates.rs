//! Turns Bot API updates into engine calls and the replies to send back.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

use crate::{
    constants::JOIN_CALLBACK_PREFIX,
    error::{GiveawayError, Result},
    instructions::{CreateDrawing, JoinOutcome},
    messenger::Messenger,
    render::{escape_html, format_remaining, mask_user_id},
    state::{ChatId, DrawingId, UserId},
    telegram::{TgUser, Update},
    GiveawayEngine,
};

const LIST_LIMIT: i64 = 10;

pub const GIVEAWAY_USAGE: &str = "Usage: /giveaway <winners> <minutes> [channels=<id,id>] [post=<chat id>]\n\
                                  followed by the giveaway text on the next lines";

/// What the transport should send after an update was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Message { chat_id: ChatId, text: String },
    CallbackAnswer { callback_query_id: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { referrer: Option<UserId> },
    Stats,
    Notify(bool),
    Redeem(i64),
    Active,
    History,
    Leaders,
    Giveaway(CreateDrawing),
    Ban { user_id: UserId, reason: String },
    Unban(UserId),
    Grant { user_id: UserId, amount: i64 },
    Analytics,
}

impl Command {
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Command::Giveaway(_)
                | Command::Ban { .. }
                | Command::Unban(_)
                | Command::Grant { .. }
                | Command::Analytics
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{0} must be a whole number, got `{1}`")]
    NotANumber(&'static str, String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("expected `on` or `off`")]
    NotAToggle,
}

fn number<T: std::str::FromStr>(what: &'static str, raw: Option<&str>) -> Result<T, CommandError> {
    let raw = raw.ok_or(CommandError::Missing(what))?;
    raw.parse()
        .map_err(|_| CommandError::NotANumber(what, raw.to_string()))
}

/// Splits `/name@bot args` into the bare command name and everything after it.
fn split_command(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start().strip_prefix('/')?;
    let end = text
        .find(|c: char| c.is_whitespace())
        .unwrap_or(text.len());
    let (token, rest) = text.split_at(end);
    let name = token.split('@').next().unwrap_or(token);
    Some((name, rest))
}

fn parse_giveaway(args: &str, chat_id: ChatId) -> Result<Command, CommandError> {
    let (header, body) = args.split_once('\n').unwrap_or((args, ""));
    let mut words = header.split_whitespace();
    let winners_requested = number("winner count", words.next())?;
    let duration_minutes = number("duration in minutes", words.next())?;

    let mut required_channels = Vec::new();
    let mut post_chat_id = Some(chat_id);
    for option in words {
        match option.split_once('=') {
            Some(("channels", ids)) => {
                for id in ids.split(',').filter(|id| !id.is_empty()) {
                    required_channels.push(number("channel id", Some(id))?);
                }
            }
            Some(("post", chat)) => post_chat_id = Some(number("post chat id", Some(chat))?),
            _ => return Err(CommandError::UnknownOption(option.to_string())),
        }
    }

    Ok(Command::Giveaway(CreateDrawing {
        text: body.trim().to_string(),
        winners_requested,
        duration_minutes,
        required_channels,
        post_chat_id,
    }))
}

/// Parses a chat command. `None` for plain text and commands the bot does not know.
pub fn parse_command(text: &str, chat_id: ChatId) -> Option<Result<Command, CommandError>> {
    let (name, args) = split_command(text)?;
    let mut words = args.split_whitespace();
    let command = match name {
        "start" => Ok(Command::Start {
            referrer: words
                .next()
                .and_then(|arg| arg.strip_prefix("ref_"))
                .and_then(|id| id.parse().ok()),
        }),
        "stats" => Ok(Command::Stats),
        "notify" => match words.next() {
            Some("on") => Ok(Command::Notify(true)),
            Some("off") => Ok(Command::Notify(false)),
            _ => Err(CommandError::NotAToggle),
        },
        "redeem" => number("amount", words.next()).map(Command::Redeem),
        "active" => Ok(Command::Active),
        "history" => Ok(Command::History),
        "top" => Ok(Command::Leaders),
        "giveaway" => parse_giveaway(args, chat_id),
        "ban" => number("user id", words.next()).map(|user_id| Command::Ban {
            user_id,
            reason: words.collect::<Vec<_>>().join(" "),
        }),
        "unban" => number("user id", words.next()).map(Command::Unban),
        "grant" => number("user id", words.next()).and_then(|user_id| {
            number("amount", words.next()).map(|amount| Command::Grant { user_id, amount })
        }),
        "analytics" => Ok(Command::Analytics),
        _ => return None,
    };
    Some(command)
}

/// Extracts the drawing id from a join button's callback data.
pub fn parse_join(data: &str) -> Option<DrawingId> {
    data.strip_prefix(JOIN_CALLBACK_PREFIX)?.parse().ok()
}

/// Handles one update. Business failures become reply text; only store
/// failures are returned as errors.
pub async fn route<M: Messenger>(
    engine: &GiveawayEngine<M>,
    admins: &[UserId],
    update: &Update,
) -> Result<Option<Reply>> {
    if let Some(query) = &update.callback_query {
        let Some(drawing_id) = query.data.as_deref().and_then(parse_join) else {
            debug!(data = ?query.data, "ignoring unknown callback");
            return Ok(None);
        };
        let outcome = engine
            .join(drawing_id, query.from.id, Some(query.from.display_name().as_str()))
            .await?;
        return Ok(Some(Reply::CallbackAnswer {
            callback_query_id: query.id.clone(),
            text: outcome.reason(),
        }));
    }

    let Some(message) = &update.message else {
        return Ok(None);
    };
    let (Some(from), Some(text)) = (&message.from, message.text.as_deref()) else {
        return Ok(None);
    };
    let Some(parsed) = parse_command(text, message.chat.id) else {
        return Ok(None);
    };
    let reply = |text: String| -> Result<Option<Reply>> {
        Ok(Some(Reply::Message {
            chat_id: message.chat.id,
            text,
        }))
    };

    let referrer = match &parsed {
        Ok(Command::Start { referrer }) => *referrer,
        _ => None,
    };
    let registration = engine
        .register_user(from.id, Some(from.display_name().as_str()), referrer)
        .await?;
    if let Some(user) = engine.store().fetch_user(from.id).await? {
        if user.banned {
            return reply(escape_html(&JoinOutcome::Banned { reason: user.ban_reason }.reason()));
        }
    }

    let command = match parsed {
        Ok(command) => command,
        Err(err) if text.trim_start().starts_with("/giveaway") => {
            return reply(format!(
                "⚠️ {}\n\n{}",
                escape_html(&err.to_string()),
                escape_html(GIVEAWAY_USAGE)
            ))
        }
        Err(err) => return reply(format!("⚠️ {}", escape_html(&err.to_string()))),
    };
    if command.admin_only() && !admins.contains(&from.id) {
        return reply("This command is for administrators.".to_string());
    }

    let outcome = execute(engine, from, command, registration.referred_by).await;
    match outcome {
        Ok(text) => reply(text),
        Err(err @ (GiveawayError::Store(_) | GiveawayError::Migrate(_))) => Err(err),
        Err(err) => reply(format!("⚠️ {}", escape_html(&err.to_string()))),
    }
}

async fn execute<M: Messenger>(
    engine: &GiveawayEngine<M>,
    from: &TgUser,
    command: Command,
    referred_by: Option<UserId>,
) -> Result<String> {
    let text = match command {
        Command::Start { .. } => {
            let mut text = format!(
                "👋 Hi, {}!\nPress <b>Join</b> under a giveaway post to take part.\n\
                 Invite friends with <code>/start ref_{}</code> to earn credits.",
                escape_html(&from.display_name()),
                from.id
            );
            if referred_by.is_some() {
                text.push_str("\n\n🤝 You were invited by a friend.");
            }
            text
        }
        Command::Stats => match engine.user_stats(from.id).await? {
            Some(stats) => format!(
                "📊 <b>Your stats</b>\nGiveaways joined: {}\nWins: {}\nFriends invited: {}\n\
                 Credits: {}\nAnnouncements: {}",
                stats.participations,
                stats.wins,
                stats.referrals,
                stats.credit_balance,
                if stats.notify { "on" } else { "off" }
            ),
            None => return Err(GiveawayError::UserNotFound(from.id)),
        },
        Command::Notify(on) => {
            engine.set_notify(from.id, on).await?;
            format!("🔔 Announcements turned {}.", if on { "on" } else { "off" })
        }
        Command::Redeem(amount) => {
            let balance = engine.redeem_credits(from.id, amount).await?;
            format!("✅ Redeemed {amount} credits. Remaining balance: {balance}.")
        }
        Command::Active => {
            let active = engine.active_drawings().await?;
            if active.is_empty() {
                return Ok("No giveaways are running right now.".to_string());
            }
            let now = chrono::Utc::now();
            let mut text = "🎁 <b>Running giveaways</b>\n".to_string();
            for summary in active {
                let _ = write!(
                    text,
                    "\n#{} · {} participants · {}",
                    summary.drawing.id,
                    summary.participant_count,
                    format_remaining(summary.drawing.remaining(now))
                );
            }
            text
        }
        Command::History => {
            let history = engine.drawing_history(LIST_LIMIT).await?;
            if history.is_empty() {
                return Ok("No giveaways have finished yet.".to_string());
            }
            let mut text = "🏁 <b>Finished giveaways</b>\n".to_string();
            for entry in history {
                let _ = write!(
                    text,
                    "\n#{} · {} winner(s)",
                    entry.drawing.id,
                    entry.winners.len()
                );
            }
            text
        }
        Command::Leaders => {
            let winners = engine.top_winners(LIST_LIMIT).await?;
            let referrers = engine.top_referrers(LIST_LIMIT).await?;
            let mut text = "🏆 <b>Top winners</b>\n".to_string();
            for tally in &winners {
                let _ = write!(text, "\n{} · {}", name_or_mask(tally.display_name.as_deref(), tally.user_id), tally.wins);
            }
            text.push_str("\n\n🤝 <b>Top referrers</b>\n");
            for tally in &referrers {
                let _ = write!(
                    text,
                    "\n{} · {}",
                    name_or_mask(tally.display_name.as_deref(), tally.user_id),
                    tally.referrals
                );
            }
            text
        }
        Command::Giveaway(request) => {
            let drawing = engine.create_drawing(request).await?;
            format!(
                "✅ Giveaway #{} created. It ends at {} UTC.",
                drawing.id,
                drawing.end_time.format("%Y-%m-%d %H:%M")
            )
        }
        Command::Ban { user_id, reason } => {
            engine.ban_user(user_id, &reason).await?;
            format!("⛔️ User {user_id} banned.")
        }
        Command::Unban(user_id) => {
            engine.unban_user(user_id).await?;
            format!("✅ User {user_id} unbanned.")
        }
        Command::Grant { user_id, amount } => {
            let balance = engine.grant_credits(user_id, amount).await?;
            format!("✅ Granted {amount} credits to {user_id}. New balance: {balance}.")
        }
        Command::Analytics => {
            let report = engine.analytics().await?;
            format!(
                "📈 <b>Analytics</b>\nUsers: {} ({} new this week)\nGiveaways: {} ({} active, {} finished)\n\
                 Winners: {}",
                report.total_users,
                report.new_users_last_week,
                report.total_drawings,
                report.active_drawings,
                report.completed_drawings,
                report.total_winners
            )
        }
    };
    Ok(text)
}

fn name_or_mask(name: Option<&str>, user_id: UserId) -> String {
    match name {
        Some(name) if !name.is_empty() => escape_html(name),
        _ => format!("<code>{}</code>", mask_user_id(user_id)),
    }
}
