//! End-to-end handler tests: a state with a scratch database and spool, an
//! in-memory object store, and per-user channels registered the same way a
//! live connection would.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use parley_db::Database;
use parley_gateway::GatewayState;
use parley_gateway::handlers::{self, Flow};
use parley_storage::{MemoryObjectStore, ObjectStore, Spool, StorageError};
use parley_types::events::{ClientEvent, ServerEvent};
use parley_types::models::{CallStatus, CallVerdict, MessageKind, Presence};

struct Harness {
    _dir: tempfile::TempDir,
    state: GatewayState,
    objects: Arc<MemoryObjectStore>,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("test.db")).unwrap());
    db.ensure_user("1", "alice").unwrap();
    db.ensure_user("2", "bob").unwrap();
    db.ensure_user("3", "carol").unwrap();

    let spool = Arc::new(Spool::new(dir.path().join("spool")).await.unwrap());
    let objects = Arc::new(MemoryObjectStore::new());
    let state = GatewayState::new(db, spool, objects.clone());

    Harness {
        _dir: dir,
        state,
        objects,
    }
}

/// Register a user the way a live connection would: a fresh channel in the
/// presence registry. Returns the reply handle and the receiving end.
async fn connect(
    state: &GatewayState,
    user_id: &str,
) -> (
    mpsc::UnboundedSender<ServerEvent>,
    mpsc::UnboundedReceiver<ServerEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    state.registry.register(user_id, tx.clone()).await.unwrap();
    (tx, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn spool_is_empty(dir: &Path) -> bool {
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    entries.next_entry().await.unwrap().is_none()
}

#[tokio::test]
async fn start_conversation_replies_with_empty_log() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;

    let flow = handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::StartConversation {
            from: "1".into(),
            to: "2".into(),
        },
    )
    .await;
    assert_eq!(flow, Flow::Continue);

    match recv(&mut alice_rx).await {
        ServerEvent::StartChat(conversation) => {
            assert!(conversation.messages.is_empty());
            let mut ids: Vec<&str> = conversation
                .participants
                .iter()
                .map(|u| u.id.as_str())
                .collect();
            ids.sort();
            assert_eq!(ids, vec!["1", "2"]);
        }
        other => panic!("expected start_chat, got {other:?}"),
    }
}

#[tokio::test]
async fn text_message_creates_conversation_and_notifies_both_sides() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    let (_bob_tx, mut bob_rx) = connect(&h.state, "2").await;

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::TextMessage {
            message: "hi".into(),
            conversation_id: None,
            from: "1".into(),
            to: "2".into(),
            kind: None,
        },
    )
    .await;

    for rx in [&mut alice_rx, &mut bob_rx] {
        match recv(rx).await {
            ServerEvent::NewMessage { message, .. } => {
                assert_eq!(message.text, "hi");
                assert_eq!(message.from, "1");
                assert_eq!(message.to.as_deref(), Some("2"));
                assert_eq!(message.kind, MessageKind::Text);
            }
            other => panic!("expected new_message, got {other:?}"),
        }
    }

    // The lazily created conversation holds exactly the one message.
    let conversation = h.state.db.find_or_create_direct("2", "1").unwrap();
    assert_eq!(conversation.messages.len(), 1);
}

#[tokio::test]
async fn text_message_still_persists_when_recipient_is_offline() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    // Bob never connects.

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::TextMessage {
            message: "anyone there?".into(),
            conversation_id: None,
            from: "1".into(),
            to: "2".into(),
            kind: None,
        },
    )
    .await;

    assert!(matches!(
        recv(&mut alice_rx).await,
        ServerEvent::NewMessage { .. }
    ));

    let conversation = h.state.db.find_or_create_direct("1", "2").unwrap();
    assert_eq!(conversation.messages.len(), 1);
}

#[tokio::test]
async fn recipient_is_derived_from_conversation_not_caller() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    let (_bob_tx, mut bob_rx) = connect(&h.state, "2").await;

    let conversation = h.state.db.find_or_create_direct("1", "2").unwrap();

    // The caller addresses the message to itself; the stored participant
    // pair overrides it.
    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::TextMessage {
            message: "routed".into(),
            conversation_id: Some(conversation.id),
            from: "1".into(),
            to: "1".into(),
            kind: None,
        },
    )
    .await;

    match recv(&mut bob_rx).await {
        ServerEvent::NewMessage { message, .. } => {
            assert_eq!(message.to.as_deref(), Some("2"));
        }
        other => panic!("expected new_message, got {other:?}"),
    }
    assert!(matches!(
        recv(&mut alice_rx).await,
        ServerEvent::NewMessage { .. }
    ));
}

#[tokio::test]
async fn denied_audio_call_reaches_caller_and_ends_session() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    let (bob_tx, mut bob_rx) = connect(&h.state, "2").await;

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::StartAudioCall {
            from: "1".into(),
            to: "2".into(),
            room_id: "r1".into(),
        },
    )
    .await;

    let session_id = match recv(&mut bob_rx).await {
        ServerEvent::AudioCallNotification { from, room_id, .. } => {
            assert_eq!(from.id, "1");
            assert_eq!(room_id, "r1");
            h.state
                .db
                .call_log_for_user("2")
                .unwrap()
                .first()
                .unwrap()
                .id
        }
        other => panic!("expected audio_call_notification, got {other:?}"),
    };

    handlers::dispatch(
        &h.state,
        &bob_tx,
        ClientEvent::AudioCallDenied {
            from: "1".into(),
            to: "2".into(),
        },
    )
    .await;

    assert!(matches!(
        recv(&mut alice_rx).await,
        ServerEvent::AudioCallDenied { .. }
    ));

    let session = h.state.db.get_call(session_id).unwrap().unwrap();
    assert_eq!(session.status, CallStatus::Ended);
    assert_eq!(session.verdict, Some(CallVerdict::Denied));
    assert!(session.ended_at.is_some());
}

#[tokio::test]
async fn disposition_without_ongoing_call_is_silent() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::AudioCallAccepted {
            from: "1".into(),
            to: "2".into(),
        },
    )
    .await;

    // No session, no event. Anything arriving on the caller's channel
    // would be a bug.
    assert!(
        tokio::time::timeout(Duration::from_millis(100), alice_rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn file_message_uploads_classifies_and_notifies() {
    use base64::Engine;

    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    let (_bob_tx, mut bob_rx) = connect(&h.state, "2").await;

    let payload = base64::engine::general_purpose::STANDARD.encode(b"fake png bytes");
    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::FileMessage {
            from: "1".into(),
            to: "2".into(),
            file_name: "holiday.png".into(),
            file: payload,
        },
    )
    .await;

    for rx in [&mut alice_rx, &mut bob_rx] {
        match recv(rx).await {
            ServerEvent::NewMessage { message, .. } => {
                assert_eq!(message.kind, MessageKind::Image);
                assert_eq!(message.text, "holiday.png");
                let location = message.file.expect("uploaded message carries a location");
                assert!(location.starts_with("memory://"));
            }
            other => panic!("expected new_message, got {other:?}"),
        }
    }

    assert_eq!(h.objects.len(), 1);
    assert!(spool_is_empty(h.state.spool.dir()).await);
}

#[tokio::test]
async fn failed_upload_leaves_no_message_and_cleans_spool() {
    use base64::Engine;

    struct FailingStore;

    #[async_trait::async_trait]
    impl ObjectStore for FailingStore {
        async fn put(&self, _key: &str, _path: &Path) -> Result<String, StorageError> {
            Err(StorageError::Upload("store unavailable".into()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("test.db")).unwrap());
    db.ensure_user("1", "alice").unwrap();
    db.ensure_user("2", "bob").unwrap();
    let spool = Arc::new(Spool::new(dir.path().join("spool")).await.unwrap());
    let state = GatewayState::new(db, spool, Arc::new(FailingStore));

    let (alice_tx, mut alice_rx) = connect(&state, "1").await;

    let payload = base64::engine::general_purpose::STANDARD.encode(b"doomed");
    handlers::dispatch(
        &state,
        &alice_tx,
        ClientEvent::FileMessage {
            from: "1".into(),
            to: "2".into(),
            file_name: "doc.pdf".into(),
            file: payload,
        },
    )
    .await;

    // The upload task runs in the background; give it a moment to settle.
    for _ in 0..50 {
        if spool_is_empty(state.spool.dir()).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(spool_is_empty(state.spool.dir()).await);

    // No message was appended and nobody was notified.
    let conversation = state.db.find_or_create_direct("1", "2").unwrap();
    assert!(conversation.messages.is_empty());
    assert!(
        tokio::time::timeout(Duration::from_millis(100), alice_rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn malformed_file_payload_gets_structured_rejection() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::FileMessage {
            from: "1".into(),
            to: "2".into(),
            file_name: "x.bin".into(),
            file: "not base64 at all!!!".into(),
        },
    )
    .await;

    assert!(matches!(
        recv(&mut alice_rx).await,
        ServerEvent::Error { .. }
    ));
}

#[tokio::test]
async fn group_conversation_flow_notifies_every_member() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    let (_bob_tx, mut bob_rx) = connect(&h.state, "2").await;
    let (_carol_tx, mut carol_rx) = connect(&h.state, "3").await;

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::StartConversationGroup {
            participants: vec!["1".into(), "2".into(), "3".into()],
        },
    )
    .await;

    let conversation_id = match recv(&mut alice_rx).await {
        ServerEvent::StartChatGroup(conversation) => conversation.id,
        other => panic!("expected start_chat_group, got {other:?}"),
    };

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::TextMessageGroup {
            message: "hello all".into(),
            conversation_id: Some(conversation_id),
            from: "1".into(),
            participants: None,
        },
    )
    .await;

    for rx in [&mut alice_rx, &mut bob_rx, &mut carol_rx] {
        match recv(rx).await {
            ServerEvent::NewMessageGroup { message, .. } => {
                assert_eq!(message.text, "hello all");
                assert_eq!(message.to, None);
            }
            other => panic!("expected new_message_group, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn friend_request_and_acceptance_notify_both_parties() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;
    let (bob_tx, mut bob_rx) = connect(&h.state, "2").await;

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::FriendRequest {
            from: "1".into(),
            to: "2".into(),
        },
    )
    .await;

    assert!(matches!(
        recv(&mut bob_rx).await,
        ServerEvent::NewFriendRequest { .. }
    ));
    assert!(matches!(
        recv(&mut alice_rx).await,
        ServerEvent::RequestSent { .. }
    ));

    // The pending request id is observable at the store boundary.
    let (request_id, inserted) = h.state.db.create_friend_request("1", "2").unwrap();
    assert!(!inserted);

    handlers::dispatch(
        &h.state,
        &bob_tx,
        ClientEvent::AcceptRequest { request_id },
    )
    .await;

    assert!(matches!(
        recv(&mut alice_rx).await,
        ServerEvent::RequestAccepted { .. }
    ));
    assert!(matches!(
        recv(&mut bob_rx).await,
        ServerEvent::RequestAccepted { .. }
    ));

    assert_eq!(h.state.db.friends_of("1").unwrap(), vec!["2".to_string()]);
    assert_eq!(h.state.db.friends_of("2").unwrap(), vec!["1".to_string()]);
}

#[tokio::test]
async fn end_event_marks_offline_and_closes_the_loop() {
    let h = harness().await;
    let (alice_tx, _alice_rx) = connect(&h.state, "1").await;

    let flow = handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::End {
            user_id: "1".into(),
        },
    )
    .await;

    assert_eq!(flow, Flow::Close);
    let user = h.state.db.get_user("1").unwrap().unwrap();
    assert_eq!(user.status, Presence::Offline);
}

#[tokio::test]
async fn call_log_event_returns_history_for_user() {
    let h = harness().await;
    let (alice_tx, mut alice_rx) = connect(&h.state, "1").await;

    h.state.db.create_call(parley_types::models::CallKind::Audio, "2", "1").unwrap();
    h.state
        .db
        .settle_call(
            parley_types::models::CallKind::Audio,
            "1",
            "2",
            CallVerdict::Missed,
        )
        .unwrap();

    handlers::dispatch(
        &h.state,
        &alice_tx,
        ClientEvent::GetCallLogs {
            user_id: "1".into(),
        },
    )
    .await;

    match recv(&mut alice_rx).await {
        ServerEvent::CallLogs(entries) => {
            assert_eq!(entries.len(), 1);
            assert!(entries[0].incoming);
            assert!(entries[0].missed);
            assert_eq!(entries[0].peer, "2");
        }
        other => panic!("expected call_logs, got {other:?}"),
    }
}
