//! The adapter seam: where turns enter the pipeline and replies leave it.
//!
//! Channel-specific adapters (HTTP connectors, authentication) live outside
//! this crate. They implement [`BotAdapter`] and hand each inbound activity to
//! [`process_activity`].

use crate::cancellation::CancellationToken;
use crate::context::{Activity, ConversationReference, ResourceResponse, TurnContext};
use crate::errors::Result;
use crate::middleware::{Bot, MiddlewareSet};
use crate::observability::turn_span;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, Instrument};

/// A channel adapter.
#[async_trait]
pub trait BotAdapter: Send + Sync {
    /// Returns the middleware every turn from this adapter runs through.
    fn middleware(&self) -> &MiddlewareSet;

    /// Delivers outbound activities to the channel.
    async fn send_activities(
        &self,
        ctx: &TurnContext,
        activities: Vec<Activity>,
    ) -> Result<Vec<ResourceResponse>>;

    /// Replaces a previously sent activity. `activity.id` names the one to replace.
    async fn update_activity(
        &self,
        ctx: &TurnContext,
        activity: Activity,
    ) -> Result<ResourceResponse>;

    /// Deletes the activity `reference.activity_id` points at.
    async fn delete_activity(
        &self,
        ctx: &TurnContext,
        reference: &ConversationReference,
    ) -> Result<()>;
}

/// Runs a turn through the adapter's middleware and the bot, then tears the turn down.
///
/// The turn's services are disposed whether or not the pipeline succeeded.
pub async fn run_pipeline(ctx: TurnContext, bot: Option<&dyn Bot>) -> Result<()> {
    let span = turn_span(ctx.activity());

    async move {
        let result = ctx.adapter().middleware().run(&ctx, bot).await;
        debug!(
            turn_id = %ctx.turn_id(),
            succeeded = result.is_ok(),
            responded = ctx.responded(),
            "Turn finished"
        );
        ctx.services().dispose();
        result
    }
    .instrument(span)
    .await
}

/// Creates a turn for an inbound activity and runs it.
pub async fn process_activity(
    adapter: Arc<dyn BotAdapter>,
    activity: Activity,
    bot: &dyn Bot,
) -> Result<()> {
    run_pipeline(TurnContext::new(adapter, activity), Some(bot)).await
}

/// Like [`process_activity`], with a caller-owned cancellation token.
pub async fn process_activity_with_cancellation(
    adapter: Arc<dyn BotAdapter>,
    activity: Activity,
    bot: &dyn Bot,
    cancellation: Arc<CancellationToken>,
) -> Result<()> {
    let ctx = TurnContext::new(adapter, activity).with_cancellation(cancellation);
    run_pipeline(ctx, Some(bot)).await
}

/// Runs a proactive turn for a previously captured conversation.
pub async fn continue_conversation(
    adapter: Arc<dyn BotAdapter>,
    reference: &ConversationReference,
    bot: &dyn Bot,
) -> Result<()> {
    process_activity(adapter, Activity::from_reference(reference), bot).await
}
