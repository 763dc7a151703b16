//! Turn context management.
//!
//! This module provides:
//! - The activity fields the core reads to address state and replies
//! - The per-turn context handed to every middleware and to the bot
//! - Hooks that intercept the turn's outbound sends, updates, and deletes
//! - The turn-scoped service registry with disposal at turn end

mod activity;
mod hooks;
mod services;
mod turn;

pub use activity::{
    Activity, ChannelAccount, ConversationAccount, ConversationReference, ResourceResponse,
    EVENT_ACTIVITY, MESSAGE_ACTIVITY,
};
pub use hooks::{
    ActivityHook, DeleteActivityHook, DeleteNext, HookNext, SendActivitiesHook, SendNext,
    UpdateActivityHook, UpdateNext,
};
pub use services::{Dispose, TurnServiceRegistry};
pub use turn::TurnContext;
