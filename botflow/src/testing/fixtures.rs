//! An in-process adapter for driving turns in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::adapter::{process_activity, BotAdapter};
use crate::context::{Activity, ConversationReference, ResourceResponse, TurnContext};
use crate::errors::{BotflowError, Result};
use crate::middleware::{Bot, Middleware, MiddlewareSet};
use crate::state::AutoSaveStateMiddleware;

/// Channel id used by [`TestAdapter`] turns.
pub const TEST_CHANNEL: &str = "test";
/// Conversation id used by [`TestAdapter`] turns.
pub const TEST_CONVERSATION: &str = "Convo1";
/// Sender id used by [`TestAdapter`] turns.
pub const TEST_USER: &str = "user1";

const TEST_BOT: &str = "bot";

/// Builds a message activity addressed the way [`TestAdapter`] addresses turns.
#[must_use]
pub fn test_activity(text: impl Into<String>) -> Activity {
    Activity::message(text)
        .with_channel_id(TEST_CHANNEL)
        .with_conversation(TEST_CONVERSATION)
        .with_from(TEST_USER)
        .with_recipient(TEST_BOT)
}

/// An adapter that keeps every sent activity in memory.
#[derive(Debug, Default)]
pub struct TestAdapter {
    middleware: MiddlewareSet,
    conversation_id: Option<String>,
    user_id: Option<String>,
    sent: Mutex<Vec<Activity>>,
    deleted: Mutex<Vec<ConversationReference>>,
    updates: AtomicUsize,
    next_id: AtomicUsize,
}

impl TestAdapter {
    /// Creates an adapter with an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Installs auto-save as the outermost middleware.
    #[must_use]
    pub fn with_auto_save(mut self, auto_save: AutoSaveStateMiddleware) -> Self {
        self.middleware.add_auto_save(auto_save);
        self
    }

    /// Overrides the conversation id of generated activities.
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Overrides the sender id of generated activities.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns the pipeline for further registration.
    pub fn middleware_mut(&mut self) -> &mut MiddlewareSet {
        &mut self.middleware
    }

    /// Builds the activity a user would send.
    #[must_use]
    pub fn make_activity(&self, text: impl Into<String>) -> Activity {
        let mut activity = test_activity(text)
            .with_id(format!("in-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        if let Some(id) = &self.conversation_id {
            activity = activity.with_conversation(id.clone());
        }
        if let Some(id) = &self.user_id {
            activity = activity.with_from(id.clone());
        }
        activity
    }

    /// Creates a turn context without running the pipeline.
    #[must_use]
    pub fn context(self: &Arc<Self>, text: impl Into<String>) -> TurnContext {
        let adapter: Arc<dyn BotAdapter> = self.clone();
        TurnContext::new(adapter, self.make_activity(text))
    }

    /// Sends a text message through the pipeline to the bot.
    pub async fn send(self: &Arc<Self>, text: impl Into<String>, bot: &dyn Bot) -> Result<()> {
        let activity = self.make_activity(text);
        self.process(activity, bot).await
    }

    /// Runs an arbitrary activity through the pipeline to the bot.
    pub async fn process(self: &Arc<Self>, activity: Activity, bot: &dyn Bot) -> Result<()> {
        let adapter: Arc<dyn BotAdapter> = self.clone();
        process_activity(adapter, activity, bot).await
    }

    /// Returns every activity sent so far.
    #[must_use]
    pub fn sent_activities(&self) -> Vec<Activity> {
        self.sent.lock().clone()
    }

    /// Returns the references of every deleted activity.
    #[must_use]
    pub fn deleted_references(&self) -> Vec<ConversationReference> {
        self.deleted.lock().clone()
    }

    /// Returns the ids of every deleted activity.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted
            .lock()
            .iter()
            .filter_map(|r| r.activity_id.clone())
            .collect()
    }

    /// Returns how many updates were applied.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Returns the text of every activity sent so far.
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|a| a.text.clone())
            .collect()
    }
}

#[async_trait]
impl BotAdapter for TestAdapter {
    fn middleware(&self) -> &MiddlewareSet {
        &self.middleware
    }

    async fn send_activities(
        &self,
        _ctx: &TurnContext,
        activities: Vec<Activity>,
    ) -> Result<Vec<ResourceResponse>> {
        let mut sent = self.sent.lock();
        let responses = activities
            .into_iter()
            .map(|activity| {
                let id = format!("out-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                sent.push(activity.with_id(id.clone()));
                ResourceResponse::new(id)
            })
            .collect();
        Ok(responses)
    }

    async fn update_activity(
        &self,
        _ctx: &TurnContext,
        activity: Activity,
    ) -> Result<ResourceResponse> {
        let id = activity
            .id
            .clone()
            .ok_or_else(|| BotflowError::invalid_state("update_activity: activity has no id"))?;

        let mut sent = self.sent.lock();
        let slot = sent
            .iter_mut()
            .find(|a| a.id.as_deref() == Some(id.as_str()))
            .ok_or_else(|| BotflowError::invalid_state(format!("no sent activity {id}")))?;
        *slot = activity;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(ResourceResponse::new(id))
    }

    async fn delete_activity(
        &self,
        _ctx: &TurnContext,
        reference: &ConversationReference,
    ) -> Result<()> {
        let id = reference.activity_id.as_deref();
        self.sent.lock().retain(|a| a.id.as_deref() != id);
        self.deleted.lock().push(reference.clone());
        Ok(())
    }
}
