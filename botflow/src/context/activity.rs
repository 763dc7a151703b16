//! The slice of the activity schema the turn core reads and produces.
//!
//! Only the channel id, conversation id, and sender id feed storage keys;
//! the remaining fields exist so adapters can address replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity type for text messages.
pub const MESSAGE_ACTIVITY: &str = "message";

/// Activity type for proactive continuations.
pub const EVENT_ACTIVITY: &str = "event";

/// A user or bot account on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    /// Channel-specific account id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    /// Creates an account.
    #[must_use]
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    /// Channel-specific conversation id.
    pub id: String,
    /// Whether the conversation has more than two participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

impl ConversationAccount {
    /// Creates a conversation account.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_group: None,
        }
    }
}

/// Enough addressing information to resume a conversation proactively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    /// Id of the activity the reference was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    /// The user side of the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
    /// The bot side of the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    /// The conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    /// The channel id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Service endpoint for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

/// Response returned by an adapter for each sent activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// Id assigned by the channel.
    pub id: String,
}

impl ResourceResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One inbound or outbound activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Activity type, e.g. `"message"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Channel-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// When the activity was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Channel the activity arrived on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Service endpoint for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    /// Sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    /// Recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    /// Conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    /// Message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Id of the activity this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl Activity {
    /// Creates a message activity.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_ACTIVITY.to_string(),
            timestamp: Some(Utc::now()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Builds the event activity used to run a proactive turn.
    #[must_use]
    pub fn from_reference(reference: &ConversationReference) -> Self {
        Self {
            kind: EVENT_ACTIVITY.to_string(),
            timestamp: Some(Utc::now()),
            channel_id: reference.channel_id.clone(),
            service_url: reference.service_url.clone(),
            from: reference.user.clone(),
            recipient: reference.bot.clone(),
            conversation: reference.conversation.clone(),
            reply_to_id: reference.activity_id.clone(),
            ..Default::default()
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the channel id.
    #[must_use]
    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Sets the conversation.
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation = Some(ConversationAccount::new(conversation_id));
        self
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_from(mut self, user_id: impl Into<String>) -> Self {
        self.from = Some(ChannelAccount::new(user_id, None));
        self
    }

    /// Sets the recipient.
    #[must_use]
    pub fn with_recipient(mut self, bot_id: impl Into<String>) -> Self {
        self.recipient = Some(ChannelAccount::new(bot_id, None));
        self
    }

    /// Returns the channel id, treating an empty id as missing.
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        non_empty(self.channel_id.as_deref())
    }

    /// Returns the conversation id, treating an empty id as missing.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        non_empty(self.conversation.as_ref().map(|c| c.id.as_str()))
    }

    /// Returns the sender id, treating an empty id as missing.
    #[must_use]
    pub fn from_id(&self) -> Option<&str> {
        non_empty(self.from.as_ref().map(|f| f.id.as_str()))
    }

    /// Creates a message addressed back to the sender of this activity.
    #[must_use]
    pub fn create_reply(&self, text: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_ACTIVITY.to_string(),
            timestamp: Some(Utc::now()),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            conversation: self.conversation.clone(),
            text: Some(text.into()),
            reply_to_id: self.id.clone(),
            ..Default::default()
        }
    }

    /// Captures the addressing information needed to continue this conversation later.
    #[must_use]
    pub fn conversation_reference(&self) -> ConversationReference {
        ConversationReference {
            activity_id: self.id.clone(),
            user: self.from.clone(),
            bot: self.recipient.clone(),
            conversation: self.conversation.clone(),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
        }
    }
}
