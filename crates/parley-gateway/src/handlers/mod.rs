mod calls;
mod chat;
mod files;
mod friends;
mod group;

use tokio::sync::mpsc;
use tracing::{info, warn};

use parley_types::events::{ClientEvent, ServerEvent};
use parley_types::models::{CallKind, Presence};

use crate::GatewayState;

/// Sender for events targeted at the connection that issued the current
/// event; the callback path of the wire protocol.
pub type Reply = mpsc::UnboundedSender<ServerEvent>;

/// What the connection loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Route one client event to its handler. Failures are logged and confined
/// to the event; the connection lives on.
pub async fn dispatch(state: &GatewayState, reply: &Reply, event: ClientEvent) -> Flow {
    use ClientEvent::*;

    let result = match event {
        FriendRequest { from, to } => friends::friend_request(state, &from, &to).await,
        AcceptRequest { request_id } => friends::accept_request(state, request_id).await,

        GetDirectConversations { user_id } => {
            chat::get_direct_conversations(state, reply, &user_id).await
        }
        StartConversation { from, to } => chat::start_conversation(state, reply, &from, &to).await,
        GetMessages { conversation_id } => chat::get_messages(state, reply, conversation_id).await,
        TextMessage {
            message,
            conversation_id,
            from,
            to,
            kind,
        } => chat::text_message(state, message, conversation_id, from, to, kind).await,
        FileMessage {
            from,
            to,
            file_name,
            file,
        } => files::file_message(state, reply, from, to, file_name, file).await,

        GetDirectConversationsGroup { user_id } => {
            group::get_group_conversations(state, reply, &user_id).await
        }
        StartConversationGroup { participants } => {
            group::start_conversation(state, reply, participants).await
        }
        GetMessagesGroup { conversation_id } => {
            group::get_messages(state, reply, conversation_id).await
        }
        TextMessageGroup {
            message,
            conversation_id,
            from,
            participants,
        } => group::text_message(state, message, conversation_id, from, participants).await,
        FileMessageGroup {
            from,
            conversation_id,
            participants,
            file_name,
            file,
        } => {
            files::file_message_group(
                state,
                reply,
                from,
                conversation_id,
                participants,
                file_name,
                file,
            )
            .await
        }

        StartAudioCall { from, to, room_id } => {
            calls::start_call(state, CallKind::Audio, from, to, room_id).await
        }
        StartVideoCall { from, to, room_id } => {
            calls::start_call(state, CallKind::Video, from, to, room_id).await
        }
        AudioCallNotPicked { from, to } => {
            calls::not_picked(state, CallKind::Audio, from, to).await
        }
        AudioCallAccepted { from, to } => calls::accepted(state, CallKind::Audio, from, to).await,
        AudioCallDenied { from, to } => calls::denied(state, CallKind::Audio, from, to).await,
        UserIsBusyAudioCall { from, to } => calls::busy(state, CallKind::Audio, from, to).await,
        VideoCallNotPicked { from, to } => {
            calls::not_picked(state, CallKind::Video, from, to).await
        }
        VideoCallAccepted { from, to } => calls::accepted(state, CallKind::Video, from, to).await,
        VideoCallDenied { from, to } => calls::denied(state, CallKind::Video, from, to).await,
        UserIsBusyVideoCall { from, to } => calls::busy(state, CallKind::Video, from, to).await,

        GetCallLogs { user_id } => calls::get_call_logs(state, reply, &user_id).await,

        End { user_id } => {
            if let Err(e) = end(state, &user_id).await {
                warn!("end handler failed: {:#}", e);
            }
            return Flow::Close;
        }
    };

    if let Err(e) = result {
        warn!("Event handler failed: {:#}", e);
    }
    Flow::Continue
}

/// Explicit disconnect: mark the user offline; the connection loop closes
/// the socket and the registry release clears the stored handle.
async fn end(state: &GatewayState, user_id: &str) -> anyhow::Result<()> {
    if !user_id.is_empty() {
        state.db.set_presence(user_id, Presence::Offline, None)?;
    }
    info!("closing connection for {}", user_id);
    Ok(())
}
