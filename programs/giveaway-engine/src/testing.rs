//! In-process `Messenger` double that records every call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use crate::error::MessengerError;
use crate::messenger::{CallToAction, MembershipStatus, Messenger};
use crate::state::{ChatId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub action: Option<CallToAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub action: Option<CallToAction>,
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    memberships: Mutex<HashMap<(ChatId, UserId), MembershipStatus>>,
    unreachable: Mutex<HashSet<ChatId>>,
    fail_edits: AtomicBool,
    next_message_id: AtomicI64,
}

impl RecordingMessenger {
    pub fn set_membership(&self, channel_id: ChatId, user_id: UserId, status: MembershipStatus) {
        self.memberships
            .lock()
            .unwrap()
            .insert((channel_id, user_id), status);
    }

    /// Every later send to `chat_id` fails, like a user who blocked the bot.
    pub fn make_unreachable(&self, chat_id: ChatId) {
        self.unreachable.lock().unwrap().insert(chat_id);
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|message| message.chat_id == chat_id)
            .map(|message| message.text)
            .collect()
    }

    pub fn sent_containing(&self, needle: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|message| message.text.contains(needle))
            .collect()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().unwrap().clone()
    }

    pub fn last_edit(&self) -> Option<EditedMessage> {
        self.edits.lock().unwrap().last().cloned()
    }
}

impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        action: Option<&CallToAction>,
    ) -> Result<MessageId, MessengerError> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(MessengerError::Unavailable(format!("chat {chat_id} blocked the bot")));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            action: action.cloned(),
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        action: Option<&CallToAction>,
    ) -> Result<(), MessengerError> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(MessengerError::Unavailable("message to edit not found".to_string()));
        }
        self.edits.lock().unwrap().push(EditedMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            action: action.cloned(),
        });
        Ok(())
    }

    async fn get_membership(
        &self,
        channel_id: ChatId,
        user_id: UserId,
    ) -> Result<MembershipStatus, MessengerError> {
        self.memberships
            .lock()
            .unwrap()
            .get(&(channel_id, user_id))
            .copied()
            .ok_or_else(|| MessengerError::Unavailable(format!("chat {channel_id} not found")))
    }
}
