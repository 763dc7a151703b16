//! Turn-scoped state persistence.
//!
//! This module provides:
//! - `BotState` scopes that derive a storage key from turn data and cache
//!   their document in the turn's service registry
//! - Content fingerprints so unchanged documents are never rewritten
//! - `BotStateSet` for loading and saving several scopes concurrently
//! - `AutoSaveStateMiddleware` for saving after the bot runs

mod accessor;
mod auto_save;
mod bot_state;
mod cache;
mod keys;
mod state_set;
#[cfg(test)]
mod state_tests;

pub use accessor::StatePropertyAccessor;
pub use auto_save::AutoSaveStateMiddleware;
pub use bot_state::BotState;
pub use cache::{compute_hash, CachedBotState};
pub use keys::{
    hash_conversation_id, ConversationKey, PrivateConversationKey, StorageKeyFactory, UserKey,
};
pub use state_set::BotStateSet;
