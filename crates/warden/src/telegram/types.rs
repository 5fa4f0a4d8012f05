//! Bot API models for the update kinds the bot consumes.
//!
//! Unknown fields are ignored, so only what the bot reads is modelled.

use serde::{Deserialize, Serialize};

use warden_common::constants::member_status;

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    /// First and last name as shown in the chat
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub new_chat_members: Option<Vec<User>>,
    pub reply_to_message: Option<Box<Message>>,
}

/// Membership of one user in one chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
    /// Only sent for `restricted` members
    pub is_member: Option<bool>,
}

impl ChatMember {
    /// Whether the user currently counts as part of the chat
    pub fn is_present(&self) -> bool {
        match self.status.as_str() {
            member_status::CREATOR | member_status::ADMINISTRATOR | member_status::MEMBER => true,
            member_status::RESTRICTED => self.is_member.unwrap_or(true),
            _ => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self.status.as_str(),
            member_status::CREATOR | member_status::ADMINISTRATOR
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub old_chat_member: ChatMember,
    pub new_chat_member: ChatMember,
}

impl ChatMemberUpdated {
    /// True when the user went from outside the chat to a plain member.
    ///
    /// Promotions and restriction changes of present members are not joins.
    pub fn is_join(&self) -> bool {
        let joined_as = matches!(
            self.new_chat_member.status.as_str(),
            member_status::MEMBER | member_status::RESTRICTED
        );
        joined_as && !self.old_chat_member.is_present() && self.new_chat_member.is_present()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// Permission set sent with `restrictChatMember`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatPermissions {
    pub can_send_messages: bool,
    pub can_send_audios: bool,
    pub can_send_documents: bool,
    pub can_send_photos: bool,
    pub can_send_videos: bool,
    pub can_send_video_notes: bool,
    pub can_send_voice_notes: bool,
    pub can_send_polls: bool,
    pub can_send_other_messages: bool,
    pub can_add_web_page_previews: bool,
    pub can_invite_users: bool,
}

impl ChatPermissions {
    pub fn all(allowed: bool) -> Self {
        Self {
            can_send_messages: allowed,
            can_send_audios: allowed,
            can_send_documents: allowed,
            can_send_photos: allowed,
            can_send_videos: allowed,
            can_send_video_notes: allowed,
            can_send_voice_notes: allowed,
            can_send_polls: allowed,
            can_send_other_messages: allowed,
            can_add_web_page_previews: allowed,
            can_invite_users: allowed,
        }
    }
}
