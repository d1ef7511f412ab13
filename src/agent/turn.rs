use tracing::debug;

use crate::agent::AgentExecutor;
use crate::chat::ChatMessage;
use crate::conversation::ConversationStore;
use crate::session::SessionStore;
use crate::utils::Result;

/// One user input routed through session memory, the agent and the conversation log
#[derive(Debug, Clone, Copy)]
pub struct ChatTurn<'a> {
    pub session_id: &'a str,
    pub user_id: Option<&'a str>,
    pub channels: &'a [String],
    pub conversation_id: &'a str,
    pub input: &'a str,
    /// Budget for the memory handed to the agent
    pub max_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: ChatMessage,
    /// Messages the agent saw from session memory
    pub history_len: usize,
}

/// Runs one exchange the way the chat routes drive the stores
///
/// The user message is logged before the agent runs, so a failed agent call
/// still leaves the question in the conversation.
pub async fn run_turn(
    sessions: &SessionStore,
    conversations: &ConversationStore,
    agent: &dyn AgentExecutor,
    turn: ChatTurn<'_>,
) -> Result<TurnOutcome> {
    let session = sessions
        .get_or_create(turn.session_id, turn.user_id, turn.channels.iter().cloned())
        .await;

    conversations
        .add_message(turn.conversation_id, ChatMessage::user(turn.input))
        .await?;

    let history = session.memory.load_context(turn.max_tokens).await;
    let answer = agent.respond(&history, turn.input).await?;

    let reply = conversations
        .add_message(turn.conversation_id, ChatMessage::assistant(answer.as_str()))
        .await?;

    if !sessions.record_turn(turn.session_id, turn.input, &answer).await? {
        // Evicted or swept while the agent was running
        debug!(session_id = %turn.session_id, "Session gone before turn was recorded");
    }

    Ok(TurnOutcome {
        reply,
        history_len: history.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EchoAgent;
    use crate::conversation::ConversationOptions;
    use crate::utils::BoardChatError;
    use async_trait::async_trait;

    struct FailingAgent;

    #[async_trait]
    impl AgentExecutor for FailingAgent {
        async fn respond(&self, _history: &[ChatMessage], _input: &str) -> Result<String> {
            Err(BoardChatError::invalid_input("model unavailable"))
        }
    }

    #[tokio::test]
    async fn test_run_turn_updates_both_stores() {
        let sessions = SessionStore::default();
        let conversations = ConversationStore::default();
        let conversation = conversations.create(["general"], ConversationOptions::default()).await;
        let channels = vec!["general".to_string()];

        for input in ["first question", "second question"] {
            run_turn(
                &sessions,
                &conversations,
                &EchoAgent,
                ChatTurn {
                    session_id: "s1",
                    user_id: Some("U1"),
                    channels: &channels,
                    conversation_id: &conversation.id,
                    input,
                    max_tokens: 1000,
                },
            )
            .await
            .unwrap();
        }

        let stored = conversations.get(&conversation.id).await.unwrap();
        assert_eq!(stored.messages.len(), 4);
        assert_eq!(stored.title.as_deref(), Some("first question"));

        let session = sessions.get("s1").await.unwrap();
        assert_eq!(session.message_count, 4);
        assert_eq!(session.memory.len().await, 4);
    }

    #[tokio::test]
    async fn test_run_turn_reports_history_len() {
        let sessions = SessionStore::default();
        let conversations = ConversationStore::default();
        let conversation = conversations.create(["general"], ConversationOptions::default()).await;
        let turn = ChatTurn {
            session_id: "s1",
            user_id: None,
            channels: &[],
            conversation_id: &conversation.id,
            input: "hello",
            max_tokens: 1000,
        };

        let first = run_turn(&sessions, &conversations, &EchoAgent, turn).await.unwrap();
        let second = run_turn(&sessions, &conversations, &EchoAgent, turn).await.unwrap();

        assert_eq!(first.history_len, 0);
        assert_eq!(second.history_len, 2);
        assert!(second.reply.content.contains("2 earlier messages"));
    }

    #[tokio::test]
    async fn test_run_turn_missing_conversation() {
        let sessions = SessionStore::default();
        let conversations = ConversationStore::default();
        let turn = ChatTurn {
            session_id: "s1",
            user_id: None,
            channels: &[],
            conversation_id: "missing",
            input: "hello",
            max_tokens: 1000,
        };

        let err = run_turn(&sessions, &conversations, &EchoAgent, turn).await.unwrap_err();
        assert!(matches!(err, BoardChatError::ConversationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_agent_failure_keeps_question() {
        let sessions = SessionStore::default();
        let conversations = ConversationStore::default();
        let conversation = conversations.create(["general"], ConversationOptions::default()).await;
        let turn = ChatTurn {
            session_id: "s1",
            user_id: None,
            channels: &[],
            conversation_id: &conversation.id,
            input: "hello",
            max_tokens: 1000,
        };

        assert!(run_turn(&sessions, &conversations, &FailingAgent, turn).await.is_err());

        let stored = conversations.get(&conversation.id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(sessions.get("s1").await.unwrap().message_count, 0);
    }
}
