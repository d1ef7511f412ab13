use std::sync::Arc;
use std::time::Duration;

use boardchat::BoardChatError;
use boardchat::chat::{ChatMessage, MessagePatch, Role};
use boardchat::conversation::{ConversationOptions, ConversationStore, ConversationStoreConfig};
use chrono::Utc;

fn store(max_conversations: usize, max_messages: usize) -> ConversationStore {
    ConversationStore::new(ConversationStoreConfig {
        max_conversations,
        max_messages_per_conversation: max_messages,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_message_cap_drops_oldest() {
    let store = store(100, 5);
    let conversation = store.create(["general"], ConversationOptions::default()).await;

    for i in 0..8 {
        store
            .add_message(&conversation.id, ChatMessage::user(format!("message {}", i)))
            .await
            .unwrap();
    }

    let stored = store.get(&conversation.id).await.unwrap();
    assert_eq!(stored.messages.len(), 5);
    assert_eq!(stored.messages[0].content, "message 3");
    assert_eq!(stored.messages[4].content, "message 7");
    // Title survives trimming of the message it came from
    assert_eq!(stored.title.as_deref(), Some("message 0"));
}

#[tokio::test]
async fn test_add_message_to_missing_conversation() {
    let store = store(100, 10);
    let err = store
        .add_message("nope", ChatMessage::user("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, BoardChatError::ConversationNotFound { .. }));
}

#[tokio::test]
async fn test_title_comes_from_first_user_message() {
    let store = store(100, 10);
    let conversation = store.create(["general"], ConversationOptions::default()).await;

    store
        .add_message(&conversation.id, ChatMessage::assistant("Hi, how can I help?"))
        .await
        .unwrap();
    let long = "x".repeat(80);
    store
        .add_message(&conversation.id, ChatMessage::user(long.as_str()))
        .await
        .unwrap();

    let title = store.get(&conversation.id).await.unwrap().title.unwrap();
    assert_eq!(title, format!("{}...", "x".repeat(50)));
}

#[tokio::test]
async fn test_list_orders_by_most_recent_update() {
    let store = store(100, 10);
    let first = store.create(["general"], ConversationOptions::default()).await;
    let second = store.create(["general"], ConversationOptions::default()).await;
    let third = store.create(["general"], ConversationOptions::default()).await;

    store
        .add_message(&first.id, ChatMessage::user("bump"))
        .await
        .unwrap();

    let ids: Vec<String> = store.list().await.into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first.id.clone(), third.id, second.id]);

    let summary = &store.list().await[0];
    assert_eq!(summary.message_count, 1);
    assert_eq!(summary.last_message.as_deref(), Some("bump"));
}

#[tokio::test]
async fn test_get_context_respects_budget() {
    let store = store(100, 50);
    let conversation = store.create(["general"], ConversationOptions::default()).await;
    for i in 0..10 {
        // 40 chars, 10 tokens each
        let content = format!("{:0>40}", i);
        store
            .add_message(&conversation.id, ChatMessage::user(content))
            .await
            .unwrap();
    }

    let context = store.get_context(&conversation.id, 35).await;
    assert_eq!(context.len(), 3);
    assert!(context[2].content.ends_with('9'));
    assert!(context[0].content.ends_with('7'));

    // A single oversized message is still returned
    let tight = store.get_context(&conversation.id, 1).await;
    assert_eq!(tight.len(), 1);

    assert!(store.get_context("missing", 100).await.is_empty());
}

#[tokio::test]
async fn test_updates_touch_conversation() {
    let store = store(100, 10);
    let conversation = store.create(["general"], ConversationOptions::default()).await;
    let reply = store
        .add_message(&conversation.id, ChatMessage::assistant("draft"))
        .await
        .unwrap();

    assert!(store.update_channels(&conversation.id, ["eng", "ops"]).await);
    assert!(
        store
            .update_options(
                &conversation.id,
                ConversationOptions {
                    include_threads: Some(true),
                    ..Default::default()
                },
            )
            .await
    );
    assert!(
        store
            .update_message(&conversation.id, reply.id(), MessagePatch::content("final"))
            .await
    );
    assert!(
        !store
            .update_message(&conversation.id, "no-such-message", MessagePatch::content("x"))
            .await
    );

    let stored = store.get(&conversation.id).await.unwrap();
    assert!(stored.channel_scope.contains("ops"));
    assert!(!stored.channel_scope.contains("general"));
    assert_eq!(stored.options.include_threads, Some(true));
    assert_eq!(stored.messages[0].content, "final");
    assert_eq!(stored.messages[0].role(), Role::Assistant);
    assert!(stored.updated_at > conversation.updated_at);
}

#[tokio::test]
async fn test_delete() {
    let store = store(100, 10);
    let conversation = store.create(["general"], ConversationOptions::default()).await;

    assert!(store.delete(&conversation.id).await);
    assert!(!store.delete(&conversation.id).await);
    assert!(store.get(&conversation.id).await.is_none());
    assert!(!store.update_channels(&conversation.id, ["eng"]).await);
}

#[tokio::test]
async fn test_sweep_removes_stale_then_enforces_cap() {
    let store = store(2, 10);
    for _ in 0..4 {
        store.create(["general"], ConversationOptions::default()).await;
    }

    // Nothing stale yet, so the two least recently accessed go
    let report = store.sweep(Utc::now()).await;
    assert_eq!(report.removed, 2);
    assert_eq!(store.len().await, 2);

    let later = Utc::now() + chrono::Duration::days(2);
    let report = store.sweep(later).await;
    assert_eq!(report.removed, 2);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_background_sweep_removes_idle_conversations() {
    let store = ConversationStore::new(ConversationStoreConfig {
        conversation_timeout: Duration::from_millis(50),
        cleanup_interval: Duration::from_millis(20),
        ..Default::default()
    });
    store.initialize().await;
    let conversation = store.create(["general"], ConversationOptions::default()).await;

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(store.get(&conversation.id).await.is_none());
    store.dispose().await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_stats() {
    let store = store(100, 10);
    let a = store.create(["general"], ConversationOptions::default()).await;
    store.create(["general"], ConversationOptions::default()).await;
    for text in ["one", "two"] {
        store.add_message(&a.id, ChatMessage::user(text)).await.unwrap();
    }

    let stats = store.stats().await;
    assert_eq!(stats.total_conversations, 2);
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.average_messages, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_deletes_and_sweeps() {
    let max_conversations = 8;
    let cap = 5;
    let store = Arc::new(store(max_conversations, cap));

    let mut ids = Vec::new();
    for _ in 0..12 {
        ids.push(store.create(["general"], ConversationOptions::default()).await.id);
    }
    let ids = Arc::new(ids);

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let store = Arc::clone(&store);
        let ids = Arc::clone(&ids);
        tasks.push(tokio::spawn(async move {
            for i in 0..200 {
                let id = &ids[(worker * 5 + i) % ids.len()];
                match store.add_message(id, ChatMessage::user(format!("w{} m{}", worker, i))).await {
                    Ok(_) | Err(BoardChatError::ConversationNotFound { .. }) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
                match i % 25 {
                    0 => {
                        store.sweep(Utc::now()).await;
                    }
                    7 => {
                        store.delete(id).await;
                    }
                    13 => {
                        store.create(["general"], ConversationOptions::default()).await;
                    }
                    _ => {}
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for summary in store.list().await {
        assert!(summary.message_count <= cap);
    }
    let stats = store.stats().await;
    assert_eq!(stats.total_conversations, store.len().await);

    store.sweep(Utc::now()).await;
    assert!(store.len().await <= max_conversations);
}
