use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use parley_db::models::NewMessage;
use parley_types::events::ServerEvent;
use parley_types::models::{Conversation, ConversationKind, MessageKind};

use crate::GatewayState;
use crate::handlers::Reply;

pub async fn get_group_conversations(
    state: &GatewayState,
    reply: &Reply,
    user_id: &str,
) -> Result<()> {
    let conversations = state
        .db
        .conversations_for_user(user_id, ConversationKind::Group)?;
    let _ = reply.send(ServerEvent::DirectConversationsGroup(conversations));
    Ok(())
}

pub async fn start_conversation(
    state: &GatewayState,
    reply: &Reply,
    participants: Vec<String>,
) -> Result<()> {
    let conversation = state.db.find_or_create_group(&participants)?;
    let _ = reply.send(ServerEvent::StartChatGroup(conversation));
    Ok(())
}

pub async fn get_messages(state: &GatewayState, reply: &Reply, conversation_id: Uuid) -> Result<()> {
    let messages = state.db.get_messages(conversation_id)?;
    let _ = reply.send(ServerEvent::MessageHistoryGroup {
        conversation_id,
        messages,
    });
    Ok(())
}

/// Resolve a group conversation by id when given, else by exact
/// participant set (created if absent).
pub(crate) fn resolve_group(
    state: &GatewayState,
    conversation_id: Option<Uuid>,
    participants: Option<Vec<String>>,
) -> Result<Option<Conversation>> {
    match conversation_id {
        Some(id) => Ok(state.db.get_conversation(id)?),
        None => match participants {
            Some(participants) => Ok(Some(state.db.find_or_create_group(&participants)?)),
            None => Ok(None),
        },
    }
}

pub async fn text_message(
    state: &GatewayState,
    message: String,
    conversation_id: Option<Uuid>,
    from: String,
    participants: Option<Vec<String>>,
) -> Result<()> {
    let Some(conversation) = resolve_group(state, conversation_id, participants)? else {
        debug!("text_message_group could not resolve a conversation");
        return Ok(());
    };

    let recipients = state.db.participant_ids(conversation.id)?;

    let message = state.db.append_message(
        conversation.id,
        NewMessage {
            from,
            to: None,
            kind: MessageKind::Text,
            text: message,
            file: None,
        },
    )?;

    for user in &recipients {
        let delivered = state
            .registry
            .notify(
                user,
                ServerEvent::NewMessageGroup {
                    conversation_id: conversation.id,
                    message: message.clone(),
                },
            )
            .await;
        if !delivered {
            debug!("new_message_group not delivered to {}", user);
        }
    }

    Ok(())
}
