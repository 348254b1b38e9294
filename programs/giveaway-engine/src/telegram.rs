use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::MessengerError;
use crate::messenger::{CallToAction, MembershipStatus, Messenger};
use crate::state::{ChatId, MessageId, UserId};

pub const API_BASE_URL: &str = "https://api.telegram.org";

/// Seconds `getUpdates` is allowed to hold the connection open.
pub const LONG_POLL_SECS: u64 = 25;

/// Bot API client over HTTPS.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    endpoint: String,
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &'static str) -> Result<T, MessengerError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(MessengerError::Api {
                method,
                code: self.error_code.unwrap_or_default(),
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ChatMemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: ChatMemberStatus,
    #[serde(default)]
    is_member: Option<bool>,
}

impl ChatMember {
    fn membership(&self) -> MembershipStatus {
        match self.status {
            ChatMemberStatus::Creator => MembershipStatus::Creator,
            ChatMemberStatus::Administrator => MembershipStatus::Administrator,
            ChatMemberStatus::Member => MembershipStatus::Member,
            // a restricted user may already have left the chat
            ChatMemberStatus::Restricted if self.is_member == Some(false) => MembershipStatus::Left,
            ChatMemberStatus::Restricted => MembershipStatus::Restricted,
            ChatMemberStatus::Left => MembershipStatus::Left,
            ChatMemberStatus::Kicked => MembershipStatus::Kicked,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

impl TgUser {
    /// `@username` when set, the first name otherwise.
    pub fn display_name(&self) -> String {
        match self.username.as_deref() {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

fn reply_markup(action: Option<&CallToAction>) -> Option<serde_json::Value> {
    action.map(|action| {
        json!({
            "inline_keyboard": [[{
                "text": action.label,
                "callback_data": action.callback_data,
            }]]
        })
    })
}

fn is_not_modified(err: &MessengerError) -> bool {
    matches!(err, MessengerError::Api { description, .. } if description.contains("message is not modified"))
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, MessengerError> {
        Self::with_base_url(API_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, MessengerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{token}", base_url.trim_end_matches('/')),
        })
    }

    async fn call<P, T>(&self, method: &'static str, params: &P) -> Result<T, MessengerError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        // the token is part of the url; keep it out of error messages
        let response = self
            .http
            .post(format!("{}/{method}", self.endpoint))
            .json(params)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let body: ApiResponse<T> = response.json().await.map_err(reqwest::Error::without_url)?;
        body.into_result(method)
    }

    /// Long-polls for new updates starting at `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, MessengerError> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: LONG_POLL_SECS,
                allowed_updates: ["message", "callback_query"],
            },
        )
        .await
    }

    /// Shows `text` as an alert to the user who pressed a button.
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), MessengerError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({
                    "callback_query_id": callback_query_id,
                    "text": text,
                    "show_alert": true,
                }),
            )
            .await?;
        Ok(())
    }
}

impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        action: Option<&CallToAction>,
    ) -> Result<MessageId, MessengerError> {
        let mut params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup(action) {
            params["reply_markup"] = markup;
        }
        let sent: SentMessage = self.call("sendMessage", &params).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        action: Option<&CallToAction>,
    ) -> Result<(), MessengerError> {
        // leaving out reply_markup removes the button
        let mut params = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup(action) {
            params["reply_markup"] = markup;
        }
        match self.call::<_, serde_json::Value>("editMessageText", &params).await {
            Err(err) if is_not_modified(&err) => Ok(()),
            Err(err) => Err(err),
            Ok(_) => Ok(()),
        }
    }

    async fn get_membership(
        &self,
        channel_id: ChatId,
        user_id: UserId,
    ) -> Result<MembershipStatus, MessengerError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": channel_id, "user_id": user_id }),
            )
            .await?;
        Ok(member.membership())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_envelope_becomes_api_error() {
        let body: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap();

        match body.into_result("sendMessage") {
            Err(MessengerError::Api { method, code, description }) => {
                assert_eq!(method, "sendMessage");
                assert_eq!(code, 403);
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn successful_envelope_yields_result() {
        let body: ApiResponse<SentMessage> =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":42,"date":0}}"#).unwrap();
        assert_eq!(body.into_result("sendMessage").unwrap().message_id, 42);
    }

    #[test]
    fn chat_member_statuses_map_to_membership() {
        let cases = [
            (r#"{"status":"creator"}"#, MembershipStatus::Creator),
            (r#"{"status":"administrator"}"#, MembershipStatus::Administrator),
            (r#"{"status":"member"}"#, MembershipStatus::Member),
            (r#"{"status":"restricted","is_member":true}"#, MembershipStatus::Restricted),
            (r#"{"status":"restricted","is_member":false}"#, MembershipStatus::Left),
            (r#"{"status":"left"}"#, MembershipStatus::Left),
            (r#"{"status":"kicked","until_date":0}"#, MembershipStatus::Kicked),
        ];
        for (raw, expected) in cases {
            let member: ChatMember = serde_json::from_str(raw).unwrap();
            assert_eq!(member.membership(), expected, "{raw}");
        }
    }

    #[test]
    fn call_to_action_becomes_single_button_keyboard() {
        let markup = reply_markup(Some(&CallToAction::join(12))).unwrap();
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "join_12");
        assert_eq!(markup["inline_keyboard"][0][0]["text"], "Join");
        assert!(reply_markup(None).is_none());
    }

    #[test]
    fn updates_deserialize_with_optional_parts() {
        let updates: Vec<Update> = serde_json::from_str(
            r#"[
                {"update_id":1,"message":{"message_id":5,"chat":{"id":9,"type":"private"},
                  "from":{"id":9,"is_bot":false,"first_name":"Ann","username":"ann"},"text":"/start ref_3"}},
                {"update_id":2,"callback_query":{"id":"cb","from":{"id":8,"is_bot":false,"first_name":"Bo"},
                  "chat_instance":"x","data":"join_4"}}
            ]"#,
        )
        .unwrap();

        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.from.as_ref().unwrap().display_name(), "@ann");
        let query = updates[1].callback_query.as_ref().unwrap();
        assert_eq!(query.from.display_name(), "Bo");
        assert_eq!(query.data.as_deref(), Some("join_4"));
    }
}
