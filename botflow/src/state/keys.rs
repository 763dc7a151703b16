//! Storage key derivation for the built-in state scopes.

use crate::config::StateConfig;
use crate::context::Activity;
use crate::errors::{BotflowError, Result};
use sha2::{Digest, Sha256};

/// Derives a scope's storage key from turn data.
///
/// Derivation must be pure: the same activity fields always produce the same key.
pub trait StorageKeyFactory: Send + Sync {
    /// Returns the storage key for the activity.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a field the scope needs is missing.
    fn storage_key(&self, activity: &Activity, config: &StateConfig) -> Result<String>;
}

/// Returns the fixed-width content hash used in place of over-long conversation ids.
#[must_use]
pub fn hash_conversation_id(conversation_id: &str) -> String {
    hex::encode(Sha256::digest(conversation_id.as_bytes()))
}

fn require<'a>(value: Option<&'a str>, scope: &str, field: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        BotflowError::invalid_state(format!("{scope}: activity is missing {field}"))
    })
}

/// Composes a key containing a conversation id, hashing the id when the key
/// would exceed the configured maximum length.
///
/// Fails with `InvalidState` if the key is still too long after hashing,
/// which only the other components (channel or user id) can cause.
fn compose_with_conversation(
    scope: &str,
    conversation_id: &str,
    config: &StateConfig,
    compose: impl Fn(&str) -> String,
) -> Result<String> {
    let key = compose(conversation_id);
    if key.len() <= config.max_key_length {
        return Ok(key);
    }

    let hashed = compose(&hash_conversation_id(conversation_id));
    if hashed.len() > config.max_key_length {
        return Err(BotflowError::invalid_state(format!(
            "{scope}: storage key is {} bytes after hashing the conversation id, limit is {}",
            hashed.len(),
            config.max_key_length
        )));
    }
    Ok(hashed)
}

/// Keys state by channel and sender: `{channel}/users/{user}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserKey;

impl StorageKeyFactory for UserKey {
    fn storage_key(&self, activity: &Activity, _config: &StateConfig) -> Result<String> {
        let channel_id = require(activity.channel_id(), "UserState", "channel id")?;
        let user_id = require(activity.from_id(), "UserState", "from.id")?;
        Ok(format!("{channel_id}/users/{user_id}"))
    }
}

/// Keys state by channel and conversation: `{channel}/conversations/{conversation}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationKey;

impl StorageKeyFactory for ConversationKey {
    fn storage_key(&self, activity: &Activity, config: &StateConfig) -> Result<String> {
        let channel_id = require(activity.channel_id(), "ConversationState", "channel id")?;
        let conversation_id =
            require(activity.conversation_id(), "ConversationState", "conversation.id")?;

        compose_with_conversation("ConversationState", conversation_id, config, |id| {
            format!("{channel_id}/conversations/{id}")
        })
    }
}

/// Keys state by channel, conversation, and sender:
/// `{channel}/conversations/{conversation}/users/{user}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateConversationKey;

impl StorageKeyFactory for PrivateConversationKey {
    fn storage_key(&self, activity: &Activity, config: &StateConfig) -> Result<String> {
        let scope = "PrivateConversationState";
        let channel_id = require(activity.channel_id(), scope, "channel id")?;
        let conversation_id = require(activity.conversation_id(), scope, "conversation.id")?;
        let user_id = require(activity.from_id(), scope, "from.id")?;

        compose_with_conversation(scope, conversation_id, config, |id| {
            format!("{channel_id}/conversations/{id}/users/{user_id}")
        })
    }
}

impl<F> StorageKeyFactory for F
where
    F: Fn(&Activity) -> Result<String> + Send + Sync,
{
    fn storage_key(&self, activity: &Activity, _config: &StateConfig) -> Result<String> {
        self(activity)
    }
}
