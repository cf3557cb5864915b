use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CallLogEntry, Conversation, Message, MessageKind, User};

/// Events sent from client to server over the gateway socket. The tag is
/// the wire event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Create a friend request from `from` to `to`.
    FriendRequest { from: String, to: String },

    /// Accept a pending friend request.
    AcceptRequest { request_id: Uuid },

    /// List direct conversations for a user. Replied to the caller with
    /// `direct_conversations`.
    GetDirectConversations { user_id: String },

    /// Find or create the direct conversation for a pair. Replied with
    /// `start_chat`.
    StartConversation { from: String, to: String },

    /// Fetch a conversation's message log. Replied with `message_history`.
    GetMessages { conversation_id: Uuid },

    /// Append a text message to a direct conversation and notify both
    /// participants.
    TextMessage {
        message: String,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        from: String,
        to: String,
        #[serde(default, rename = "type")]
        kind: Option<MessageKind>,
    },

    /// Upload a file for a direct conversation. `file` is base64.
    FileMessage {
        from: String,
        to: String,
        #[serde(rename = "name_file")]
        file_name: String,
        file: String,
    },

    /// Group analogs of the direct events above.
    GetDirectConversationsGroup { user_id: String },

    StartConversationGroup { participants: Vec<String> },

    GetMessagesGroup { conversation_id: Uuid },

    TextMessageGroup {
        message: String,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        from: String,
        #[serde(default)]
        participants: Option<Vec<String>>,
    },

    FileMessageGroup {
        from: String,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        participants: Option<Vec<String>>,
        #[serde(rename = "name_file")]
        file_name: String,
        file: String,
    },

    /// Start a call: creates the session row and rings the receiver.
    StartAudioCall {
        from: String,
        to: String,
        #[serde(rename = "roomID")]
        room_id: String,
    },

    StartVideoCall {
        from: String,
        to: String,
        #[serde(rename = "roomID")]
        room_id: String,
    },

    AudioCallNotPicked { from: String, to: String },
    AudioCallAccepted { from: String, to: String },
    AudioCallDenied { from: String, to: String },
    UserIsBusyAudioCall { from: String, to: String },

    VideoCallNotPicked { from: String, to: String },
    VideoCallAccepted { from: String, to: String },
    VideoCallDenied { from: String, to: String },
    UserIsBusyVideoCall { from: String, to: String },

    /// Call history for a user. Replied with `call_logs`.
    GetCallLogs { user_id: String },

    /// Explicit disconnect: mark the user offline and close the socket.
    End { user_id: String },
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewFriendRequest { message: String },
    RequestSent { message: String },
    RequestAccepted { message: String },

    StartChat(Conversation),
    StartChatGroup(Conversation),

    DirectConversations(Vec<Conversation>),
    DirectConversationsGroup(Vec<Conversation>),

    MessageHistory {
        conversation_id: Uuid,
        messages: Vec<Message>,
    },
    MessageHistoryGroup {
        conversation_id: Uuid,
        messages: Vec<Message>,
    },

    NewMessage {
        conversation_id: Uuid,
        message: Message,
    },
    NewMessageGroup {
        conversation_id: Uuid,
        message: Message,
    },
    NewFileMessageGroup {
        conversation_id: Uuid,
        message: Message,
    },

    /// Ringing: carries what the receiver needs to join the call room.
    /// Signaling only, never persisted.
    AudioCallNotification {
        from: User,
        #[serde(rename = "roomID")]
        room_id: String,
        #[serde(rename = "streamID")]
        stream_id: String,
        #[serde(rename = "userID")]
        user_id: String,
        #[serde(rename = "userName")]
        user_name: String,
    },
    VideoCallNotification {
        from: User,
        #[serde(rename = "roomID")]
        room_id: String,
        #[serde(rename = "streamID")]
        stream_id: String,
        #[serde(rename = "userID")]
        user_id: String,
        #[serde(rename = "userName")]
        user_name: String,
    },

    AudioCallMissed { from: String, to: String },
    AudioCallAccepted { from: String, to: String },
    AudioCallDenied { from: String, to: String },
    OnAnotherAudioCall { from: String, to: String },

    VideoCallMissed { from: String, to: String },
    VideoCallAccepted { from: String, to: String },
    VideoCallDenied { from: String, to: String },
    OnAnotherVideoCall { from: String, to: String },

    CallLogs(Vec<CallLogEntry>),

    /// Structured rejection for a frame that could not be handled.
    Error { message: String },
}
