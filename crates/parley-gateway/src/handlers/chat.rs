use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use parley_db::models::NewMessage;
use parley_types::events::ServerEvent;
use parley_types::models::{ConversationKind, MessageKind};

use crate::GatewayState;
use crate::handlers::Reply;

pub async fn get_direct_conversations(
    state: &GatewayState,
    reply: &Reply,
    user_id: &str,
) -> Result<()> {
    let conversations = state
        .db
        .conversations_for_user(user_id, ConversationKind::Direct)?;
    let _ = reply.send(ServerEvent::DirectConversations(conversations));
    Ok(())
}

pub async fn start_conversation(
    state: &GatewayState,
    reply: &Reply,
    from: &str,
    to: &str,
) -> Result<()> {
    let conversation = state.db.find_or_create_direct(from, to)?;
    let _ = reply.send(ServerEvent::StartChat(conversation));
    Ok(())
}

/// An unknown conversation reads back as an empty log.
pub async fn get_messages(state: &GatewayState, reply: &Reply, conversation_id: Uuid) -> Result<()> {
    let messages = state.db.get_messages(conversation_id)?;
    let _ = reply.send(ServerEvent::MessageHistory {
        conversation_id,
        messages,
    });
    Ok(())
}

pub async fn text_message(
    state: &GatewayState,
    message: String,
    conversation_id: Option<Uuid>,
    from: String,
    to: String,
    kind: Option<MessageKind>,
) -> Result<()> {
    // Resolve by id when given, else by pair, creating the pair's
    // conversation if it does not exist yet.
    let conversation = match conversation_id {
        Some(id) => match state.db.get_conversation(id)? {
            Some(conversation) => conversation,
            None => {
                debug!("text_message for unknown conversation {}", id);
                return Ok(());
            }
        },
        None if from != to => state.db.find_or_create_direct(&from, &to)?,
        None => {
            debug!("text_message to self without conversation id, ignoring");
            return Ok(());
        }
    };

    // The stored participant pair decides who is notified; the caller's
    // `to` may be stale or equal to `from`.
    let participants = state.db.participant_ids(conversation.id)?;
    if participants.len() < 2 {
        debug!("conversation {} has no participant pair", conversation.id);
        return Ok(());
    }
    let mut to = participants[0].clone();
    if to == from {
        to = participants[1].clone();
    }

    let message = state.db.append_message(
        conversation.id,
        NewMessage {
            from: from.clone(),
            to: Some(to.clone()),
            kind: kind.unwrap_or(MessageKind::Text),
            text: message,
            file: None,
        },
    )?;

    for user in [&from, &to] {
        let delivered = state
            .registry
            .notify(
                user,
                ServerEvent::NewMessage {
                    conversation_id: conversation.id,
                    message: message.clone(),
                },
            )
            .await;
        if !delivered {
            debug!("new_message not delivered to {}", user);
        }
    }

    Ok(())
}
