//! Integration tests for state scopes, state sets, and auto-save.

#[cfg(test)]
mod tests {
    use crate::config::StateConfig;
    use crate::context::{Activity, TurnContext};
    use crate::errors::{BotflowError, ErrorKind};
    use crate::middleware::bot_fn;
    use crate::state::{AutoSaveStateMiddleware, BotState, BotStateSet};
    use crate::storage::{ETags, MockStorage, StoreItems};
    use crate::testing::{
        assert_error_kind, test_activity, CallLog, RecordingBot, RecordingStorage, TestAdapter,
    };
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::timeout;

    const CONVERSATION_KEY: &str = "test/conversations/Convo1";

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        visits: u32,
    }

    fn setup() -> (Arc<RecordingStorage>, Arc<BotState>, Arc<TestAdapter>) {
        let storage = Arc::new(RecordingStorage::new());
        let state = Arc::new(BotState::conversation(storage.clone()));
        (storage, state, Arc::new(TestAdapter::new()))
    }

    #[tokio::test]
    async fn test_save_writes_only_when_changed() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        state.load(&ctx, false).await.unwrap();
        assert_eq!(storage.reads(), 1);

        state.save_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.writes(), 0);

        state.set_property_value(&ctx, "count", &1).await.unwrap();
        state.save_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.writes(), 1);

        state.save_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.writes(), 1);

        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_force_save_writes_unchanged_state() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        state.load(&ctx, false).await.unwrap();
        state.save_changes(&ctx, true).await.unwrap();
        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test]
    async fn test_force_save_without_load_loads_first() {
        let (storage, state, adapter) = setup();

        let seed = adapter.context("seed");
        state.set_property_value(&seed, "kept", &"yes").await.unwrap();
        state.save_changes(&seed, false).await.unwrap();

        let ctx = adapter.context("hi");
        state.save_changes(&ctx, true).await.unwrap();

        assert_eq!(storage.reads(), 2);
        assert_eq!(storage.writes(), 2);
        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("kept"), Some(&json!("yes")));
    }

    #[tokio::test]
    async fn test_save_without_load_is_noop() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        state.save_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.reads(), 0);
        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn test_reverted_change_is_not_written() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        state.set_property_value(&ctx, "draft", &json!({"a": [1, 2]})).await.unwrap();
        state.delete_property_value(&ctx, "draft").await.unwrap();
        state.save_changes(&ctx, false).await.unwrap();

        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn test_load_is_cached_until_forced() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        state.load(&ctx, false).await.unwrap();
        state.set_property_value(&ctx, "unsaved", &true).await.unwrap();
        state.load(&ctx, false).await.unwrap();
        assert_eq!(storage.reads(), 1);
        assert_eq!(
            state.get_property_value::<bool>(&ctx, "unsaved").await.unwrap(),
            Some(true)
        );

        state.load(&ctx, true).await.unwrap();
        assert_eq!(storage.reads(), 2);
        assert_eq!(
            state.get_property_value::<bool>(&ctx, "unsaved").await.unwrap(),
            None
        );
        assert!(!state.cached_state(&ctx).unwrap().is_changed());
    }

    #[tokio::test]
    async fn test_property_access_loads_lazily() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        assert!(state.cached_state(&ctx).is_none());
        let value: Option<u32> = state.get_property_value(&ctx, "missing").await.unwrap();

        assert_eq!(value, None);
        assert_eq!(storage.reads(), 1);
        assert!(state.cached_state(&ctx).is_some());
        assert!(ctx.services().contains_key(state.cache_key()));
    }

    #[tokio::test]
    async fn test_clear_state_forces_write_of_empty_document() {
        let (storage, state, adapter) = setup();

        let first = adapter.context("first");
        state.set_property_value(&first, "count", &3).await.unwrap();
        state.save_changes(&first, false).await.unwrap();

        let second = adapter.context("second");
        state.load(&second, false).await.unwrap();
        state.clear_state(&second).unwrap();
        assert!(state.cached_state(&second).unwrap().is_changed());

        state.save_changes(&second, false).await.unwrap();
        assert_eq!(storage.writes(), 2);
        assert!(storage.get(CONVERSATION_KEY).unwrap().data.is_empty());
    }

    #[tokio::test]
    async fn test_clear_state_on_empty_scope_still_writes() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        state.load(&ctx, false).await.unwrap();
        state.clear_state(&ctx).unwrap();
        state.save_changes(&ctx, false).await.unwrap();

        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_cache_and_item() {
        let (storage, state, adapter) = setup();

        let first = adapter.context("first");
        state.set_property_value(&first, "count", &1).await.unwrap();
        state.save_changes(&first, false).await.unwrap();
        assert!(storage.get(CONVERSATION_KEY).is_some());

        let second = adapter.context("second");
        state.load(&second, false).await.unwrap();
        state.delete(&second).await.unwrap();

        assert!(state.cached_state(&second).is_none());
        assert!(storage.get(CONVERSATION_KEY).is_none());
        assert_eq!(storage.deletes(), 1);
    }

    #[tokio::test]
    async fn test_accessor_default_is_stored() {
        let (storage, state, adapter) = setup();
        let visits = state.create_property::<u32>("visits");
        let ctx = adapter.context("hi");

        assert_eq!(visits.get_optional(&ctx).await.unwrap(), None);
        assert_eq!(visits.get(&ctx).await.unwrap(), 0);
        assert_eq!(visits.get_optional(&ctx).await.unwrap(), Some(0));

        state.save_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test]
    async fn test_accessor_defaults_by_value_and_factory() {
        let (_storage, state, adapter) = setup();
        let ctx = adapter.context("hi");

        let greeting = state.create_property_with_default("greeting", "hello".to_string());
        assert_eq!(greeting.get(&ctx).await.unwrap(), "hello");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let profile = state.create_property_with_factory("profile", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Profile {
                name: "anonymous".to_string(),
                visits: 0,
            }
        });

        let mut value = profile.get(&ctx).await.unwrap();
        assert_eq!(value.name, "anonymous");
        value.visits += 1;
        profile.set(&ctx, &value).await.unwrap();

        assert_eq!(profile.get(&ctx).await.unwrap().visits, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        profile.delete(&ctx).await.unwrap();
        assert_eq!(profile.get_optional(&ctx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_conversation_is_invalid_state() {
        let (storage, state, adapter) = setup();
        let activity = Activity::message("hi").with_channel_id("test").with_from("user1");
        let ctx = TurnContext::new(adapter, activity);

        let err = assert_error_kind(state.load(&ctx, false).await, ErrorKind::InvalidState);
        assert!(err.to_string().contains("conversation.id"));
        assert!(err.is_programmer_error());
        assert_eq!(storage.reads(), 0);

        assert_error_kind(
            state.get_property_value::<u32>(&ctx, "count").await,
            ErrorKind::InvalidState,
        );
    }

    #[tokio::test]
    async fn test_state_persists_across_turns() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let count = conversation.create_property::<u32>("count");
        let adapter = Arc::new(
            TestAdapter::new().with_auto_save(AutoSaveStateMiddleware::new([conversation])),
        );

        let bot = bot_fn(move |ctx| {
            let count = count.clone();
            Box::pin(async move {
                let next = count.get(ctx).await? + 1;
                count.set(ctx, &next).await?;
                ctx.send_activity(next.to_string()).await?;
                Ok(())
            })
        });

        for text in ["a", "b", "c"] {
            adapter.send(text, &bot).await.unwrap();
        }

        assert_eq!(adapter.sent_texts(), vec!["1", "2", "3"]);
        assert_eq!(storage.reads(), 3);
        assert_eq!(storage.writes(), 3);
    }

    #[tokio::test]
    async fn test_user_state_follows_user_across_conversations() {
        let storage = Arc::new(RecordingStorage::new());
        let user = Arc::new(BotState::user(storage.clone()));
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let auto_save = AutoSaveStateMiddleware::new([user.clone(), conversation.clone()]);

        let first = Arc::new(
            TestAdapter::new()
                .with_conversation("c1")
                .with_auto_save(auto_save.clone()),
        );
        let second = Arc::new(
            TestAdapter::new()
                .with_conversation("c2")
                .with_auto_save(auto_save),
        );

        let name = user.create_property::<String>("name");
        let topic = conversation.create_property::<String>("topic");
        let bot = bot_fn(move |ctx| {
            let name = name.clone();
            let topic = topic.clone();
            Box::pin(async move {
                let text = ctx.activity().text.clone().unwrap_or_default();
                if let Some(value) = text.strip_prefix("name:") {
                    name.set(ctx, &value.to_string()).await?;
                    topic.set(ctx, &"introductions".to_string()).await?;
                }
                let reply = format!("{}/{}", name.get(ctx).await?, topic.get(ctx).await?);
                ctx.send_activity(reply).await?;
                Ok(())
            })
        });

        first.send("name:ada", &bot).await.unwrap();
        second.send("hello", &bot).await.unwrap();

        assert_eq!(first.sent_texts(), vec!["ada/introductions"]);
        assert_eq!(second.sent_texts(), vec!["ada/"]);
        assert!(storage.get("test/users/user1").is_some());
        assert!(storage.get("test/conversations/c1").is_some());
        assert!(storage.get("test/conversations/c2").is_some());
    }

    #[tokio::test]
    async fn test_auto_save_skips_unchanged_turns() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let adapter = Arc::new(
            TestAdapter::new().with_auto_save(AutoSaveStateMiddleware::new([conversation.clone()])),
        );

        let bot = bot_fn(move |ctx| {
            let conversation = conversation.clone();
            Box::pin(async move {
                let _: Option<u32> = conversation.get_property_value(ctx, "count").await?;
                Ok(())
            })
        });

        adapter.send("hi", &bot).await.unwrap();
        assert_eq!(storage.reads(), 1);
        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn test_auto_save_never_loads() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let log = CallLog::new();
        let adapter = Arc::new(
            TestAdapter::new().with_auto_save(AutoSaveStateMiddleware::new([conversation])),
        );

        adapter.send("hi", &RecordingBot::new(&log)).await.unwrap();
        assert_eq!(storage.reads(), 0);
        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn test_auto_save_skipped_when_bot_fails() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let adapter = Arc::new(
            TestAdapter::new().with_auto_save(AutoSaveStateMiddleware::new([conversation.clone()])),
        );

        let bot = bot_fn(move |ctx| {
            let conversation = conversation.clone();
            Box::pin(async move {
                conversation.set_property_value(ctx, "count", &1).await?;
                Err(anyhow::anyhow!("bot exploded").into())
            })
        });

        let err = assert_error_kind(adapter.send("hi", &bot).await, ErrorKind::Handler);
        assert!(err.to_string().contains("bot exploded"));
        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn test_auto_save_is_outermost() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let late = conversation.clone();

        let mut adapter = TestAdapter::new();
        adapter.middleware_mut().add(Arc::new(crate::middleware::from_fn(move |ctx, next| {
            let late = late.clone();
            Box::pin(async move {
                next.run().await?;
                late.set_property_value(ctx, "unwound", &true).await
            })
        })));
        adapter
            .middleware_mut()
            .add_auto_save(AutoSaveStateMiddleware::new([conversation]));
        let adapter = Arc::new(adapter);

        adapter.send("hi", &RecordingBot::new(&CallLog::new())).await.unwrap();

        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("unwound"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_bot_state_as_middleware() {
        let (storage, state, _) = setup();
        let adapter = Arc::new(TestAdapter::new().with(state.clone()));
        let visits = state.create_property::<u32>("visits");

        let bot = bot_fn(move |ctx| {
            let visits = visits.clone();
            Box::pin(async move {
                let next = visits.get(ctx).await? + 1;
                visits.set(ctx, &next).await
            })
        });

        adapter.send("one", &bot).await.unwrap();
        adapter.send("two", &bot).await.unwrap();

        assert_eq!(storage.reads(), 2);
        assert_eq!(storage.writes(), 2);
        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("visits"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_concurrent_turns_conflict() {
        let (storage, state, adapter) = setup();

        let seed = adapter.context("seed");
        state.set_property_value(&seed, "count", &0).await.unwrap();
        state.save_changes(&seed, false).await.unwrap();

        let first = adapter.context("first");
        let second = adapter.context("second");
        state.load(&first, false).await.unwrap();
        state.load(&second, false).await.unwrap();

        state.set_property_value(&first, "count", &1).await.unwrap();
        state.save_changes(&first, false).await.unwrap();

        state.set_property_value(&second, "count", &2).await.unwrap();
        let result = state.save_changes(&second, false).await;
        match assert_error_kind(result, ErrorKind::ConcurrencyConflict) {
            BotflowError::ConcurrencyConflict(conflict) => {
                assert_eq!(conflict.key, CONVERSATION_KEY);
            }
            other => panic!("unexpected error: {other}"),
        }

        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_repeated_saves_in_one_turn() {
        let (storage, state, adapter) = setup();

        let earlier = adapter.context("earlier");
        state.set_property_value(&earlier, "a", &1).await.unwrap();
        state.save_changes(&earlier, false).await.unwrap();

        let ctx = adapter.context("now");
        state.set_property_value(&ctx, "a", &2).await.unwrap();
        state.save_changes(&ctx, false).await.unwrap();
        state.set_property_value(&ctx, "a", &3).await.unwrap();
        state.save_changes(&ctx, false).await.unwrap();

        assert_eq!(storage.writes(), 3);
        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("a"), Some(&json!(3)));
        assert_eq!(state.cached_state(&ctx).unwrap().e_tag(), stored.e_tag);
    }

    #[tokio::test]
    async fn test_save_sends_token_from_previous_write() {
        let mut mock = MockStorage::new();
        mock.expect_read().returning(|_, _| Ok(StoreItems::new()));
        let mut sequence = mockall::Sequence::new();
        mock.expect_write()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|changes, _| changes[CONVERSATION_KEY].e_tag.is_none())
            .returning(|_, _| Ok(ETags::from([(CONVERSATION_KEY.to_string(), "41".to_string())])));
        mock.expect_write()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|changes, _| changes[CONVERSATION_KEY].e_tag.as_deref() == Some("41"))
            .returning(|_, _| Ok(ETags::from([(CONVERSATION_KEY.to_string(), "42".to_string())])));

        let state = Arc::new(BotState::conversation(Arc::new(mock)));
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");

        state.set_property_value(&ctx, "count", &1).await.unwrap();
        state.save_changes(&ctx, false).await.unwrap();
        state.set_property_value(&ctx, "count", &2).await.unwrap();
        state.save_changes(&ctx, false).await.unwrap();

        assert_eq!(state.cached_state(&ctx).unwrap().e_tag().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_last_writer_wins_overwrites() {
        let storage = Arc::new(RecordingStorage::new());
        let state = Arc::new(
            BotState::conversation(storage.clone())
                .with_config(StateConfig::default().with_last_writer_wins(true)),
        );
        let adapter = Arc::new(TestAdapter::new());

        let first = adapter.context("first");
        let second = adapter.context("second");
        state.load(&first, false).await.unwrap();
        state.load(&second, false).await.unwrap();

        state.set_property_value(&first, "count", &1).await.unwrap();
        state.save_changes(&first, false).await.unwrap();
        state.set_property_value(&second, "count", &2).await.unwrap();
        state.save_changes(&second, false).await.unwrap();

        let stored = storage.get(CONVERSATION_KEY).unwrap();
        assert_eq!(stored.data.get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_state_dirty() {
        let mut mock = MockStorage::new();
        mock.expect_read().returning(|_, _| Ok(StoreItems::new()));
        mock.expect_write()
            .times(1)
            .returning(|_, _| Err(BotflowError::storage_unavailable("primary down")));

        let state = Arc::new(BotState::conversation(Arc::new(mock)));
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");

        state.set_property_value(&ctx, "count", &1).await.unwrap();
        assert_error_kind(
            state.save_changes(&ctx, false).await,
            ErrorKind::StorageUnavailable,
        );
        assert!(state.cached_state(&ctx).unwrap().is_changed());
    }

    #[tokio::test]
    async fn test_state_set_loads_and_saves_all() {
        let storage = Arc::new(RecordingStorage::new());
        let user = Arc::new(BotState::user(storage.clone()));
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let set = BotStateSet::new([user.clone(), conversation.clone()]);
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");

        set.load_all(&ctx, false).await.unwrap();
        assert_eq!(storage.reads(), 2);

        user.set_property_value(&ctx, "name", &"ada").await.unwrap();
        set.save_all_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.writes(), 1);
        assert!(storage.get("test/users/user1").is_some());

        conversation.set_property_value(&ctx, "topic", &"rust").await.unwrap();
        set.save_all_changes(&ctx, false).await.unwrap();
        assert_eq!(storage.writes(), 2);
    }

    #[tokio::test]
    async fn test_state_set_ignores_repeated_scope() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let mut set = BotStateSet::new([conversation.clone(), conversation.clone()]);
        set.add(conversation.clone());
        assert_eq!(set.len(), 1);

        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");
        set.load_all(&ctx, false).await.unwrap();
        assert_eq!(storage.reads(), 1);

        conversation.set_property_value(&ctx, "topic", &"rust").await.unwrap();
        set.save_all_changes(&ctx, true).await.unwrap();
        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_loads_of_one_scope() {
        let storage = Arc::new(RecordingStorage::new().with_barrier(Arc::new(Barrier::new(2))));
        let state = Arc::new(BotState::conversation(storage.clone()));
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");

        let (first, second) = tokio::join!(state.load(&ctx, false), state.load(&ctx, true));
        first.unwrap();
        second.unwrap();

        assert_eq!(storage.reads(), 2);
        assert!(state.cached_state(&ctx).is_some());
    }

    #[tokio::test]
    async fn test_auto_save_ignores_repeated_scope() {
        let storage = Arc::new(RecordingStorage::new());
        let conversation = Arc::new(BotState::conversation(storage.clone()));
        let mut auto_save = AutoSaveStateMiddleware::new([conversation.clone()]);
        auto_save.add(conversation.clone());
        assert_eq!(auto_save.bot_state_set().len(), 1);

        let adapter = Arc::new(TestAdapter::new().with_auto_save(auto_save));
        let count = conversation.create_property::<u32>("count");
        let bot = bot_fn(move |ctx| {
            let count = count.clone();
            Box::pin(async move { count.set(ctx, &1).await })
        });

        adapter.send("hi", &bot).await.unwrap();
        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test]
    async fn test_state_set_runs_members_concurrently() {
        let barrier = Arc::new(Barrier::new(3));
        let storage = Arc::new(RecordingStorage::new().with_barrier(barrier));
        let states = [
            Arc::new(BotState::user(storage.clone())),
            Arc::new(BotState::conversation(storage.clone())),
            Arc::new(BotState::private_conversation(storage.clone())),
        ];
        let set = BotStateSet::new(states.clone());
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");

        timeout(Duration::from_secs(5), set.load_all(&ctx, false))
            .await
            .expect("loads should rendezvous")
            .unwrap();

        for state in &states {
            state.set_property_value(&ctx, "touched", &true).await.unwrap();
        }
        timeout(Duration::from_secs(5), set.save_all_changes(&ctx, false))
            .await
            .expect("saves should rendezvous")
            .unwrap();

        assert_eq!(storage.writes(), 3);
    }

    #[tokio::test]
    async fn test_state_set_fails_fast() {
        let stalled = Arc::new(RecordingStorage::new());
        stalled.stall_reads(true);
        let broken = Arc::new(RecordingStorage::new());
        broken.fail_reads(true);

        let set = BotStateSet::new([
            Arc::new(BotState::user(stalled.clone())),
            Arc::new(BotState::conversation(broken)),
        ]);
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");

        let result = timeout(Duration::from_secs(5), set.load_all(&ctx, false))
            .await
            .expect("failure should not wait for the stalled member");
        assert_error_kind(result, ErrorKind::StorageUnavailable);
        assert_eq!(stalled.reads(), 1);
    }

    #[tokio::test]
    async fn test_state_set_cancellation() {
        let storage = Arc::new(RecordingStorage::new());
        storage.stall_reads(true);
        let set = BotStateSet::new([
            Arc::new(BotState::user(storage.clone())),
            Arc::new(BotState::conversation(storage.clone())),
        ]);
        let adapter = Arc::new(TestAdapter::new());
        let ctx = adapter.context("hi");
        let token = ctx.cancellation().clone();

        let (result, ()) = tokio::join!(set.load_all(&ctx, false), async {
            tokio::task::yield_now().await;
            token.cancel("shutdown");
        });

        let err = assert_error_kind(result, ErrorKind::Cancelled);
        assert!(err.to_string().contains("shutdown"));
    }

    #[tokio::test]
    async fn test_cancelled_turn_does_not_save() {
        let (storage, state, adapter) = setup();
        let ctx = adapter.context("hi");
        let set = BotStateSet::new([state.clone()]);

        state.set_property_value(&ctx, "count", &1).await.unwrap();
        ctx.cancellation().cancel("client went away");

        assert_error_kind(set.save_all_changes(&ctx, false).await, ErrorKind::Cancelled);
        assert_eq!(storage.writes(), 0);
    }

    #[tokio::test]
    async fn test_state_set_middleware_forces_load() {
        let (storage, state, _) = setup();
        let adapter = Arc::new(TestAdapter::new().with(Arc::new(BotStateSet::new([state.clone()]))));

        adapter
            .process(test_activity("hi"), &RecordingBot::new(&CallLog::new()))
            .await
            .unwrap();

        assert_eq!(storage.reads(), 1);
        assert_eq!(storage.writes(), 0);
    }
}
