use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_db::models::NewMessage;
use parley_types::events::ServerEvent;
use parley_types::models::MessageKind;

use crate::GatewayState;
use crate::handlers::{Reply, group};

/// Direct-chat upload. The payload is decoded here so a bad frame is
/// rejected immediately; the upload itself is the long pole and runs in
/// its own task so other events on this connection keep flowing.
pub async fn file_message(
    state: &GatewayState,
    reply: &Reply,
    from: String,
    to: String,
    file_name: String,
    file: String,
) -> Result<()> {
    let Some(bytes) = decode_payload(reply, &file) else {
        return Ok(());
    };

    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = deliver_direct_file(&state, from, to, file_name, bytes).await {
            warn!("Direct file delivery failed: {:#}", e);
        }
    });

    Ok(())
}

pub async fn file_message_group(
    state: &GatewayState,
    reply: &Reply,
    from: String,
    conversation_id: Option<Uuid>,
    participants: Option<Vec<String>>,
    file_name: String,
    file: String,
) -> Result<()> {
    let Some(bytes) = decode_payload(reply, &file) else {
        return Ok(());
    };

    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) =
            deliver_group_file(&state, from, conversation_id, participants, file_name, bytes).await
        {
            warn!("Group file delivery failed: {:#}", e);
        }
    });

    Ok(())
}

fn decode_payload(reply: &Reply, file: &str) -> Option<Vec<u8>> {
    match B64.decode(file.as_bytes()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            let _ = reply.send(ServerEvent::Error {
                message: format!("file payload is not valid base64: {e}"),
            });
            None
        }
    }
}

/// The pipeline: classify, spool, upload, then (and only then) append the
/// message and notify. The transient copy is removed on both upload
/// outcomes before the result is inspected.
async fn upload(
    state: &GatewayState,
    file_name: &str,
    bytes: &[u8],
) -> Result<(MessageKind, String)> {
    let kind = parley_storage::classify_file_name(file_name);

    let spooled = state.spool.write(file_name, bytes).await?;
    let uploaded = state.objects.put(&spooled.key, &spooled.path).await;
    spooled.remove().await;

    let location = uploaded?;
    Ok((kind, location))
}

async fn deliver_direct_file(
    state: &GatewayState,
    from: String,
    to: String,
    file_name: String,
    bytes: Vec<u8>,
) -> Result<()> {
    let (kind, location) = upload(state, &file_name, &bytes).await?;

    let conversation = state.db.find_or_create_direct(&from, &to)?;
    let message = state.db.append_message(
        conversation.id,
        NewMessage {
            from: from.clone(),
            to: Some(to.clone()),
            kind,
            text: file_name,
            file: Some(location),
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

async fn deliver_group_file(
    state: &GatewayState,
    from: String,
    conversation_id: Option<Uuid>,
    participants: Option<Vec<String>>,
    file_name: String,
    bytes: Vec<u8>,
) -> Result<()> {
    let Some(conversation) = group::resolve_group(state, conversation_id, participants)? else {
        debug!("file_message_group could not resolve a conversation");
        return Ok(());
    };

    let (kind, location) = upload(state, &file_name, &bytes).await?;

    let recipients = state.db.participant_ids(conversation.id)?;
    let message = state.db.append_message(
        conversation.id,
        NewMessage {
            from,
            to: None,
            kind,
            text: file_name,
            file: Some(location),
        },
    )?;

    for user in &recipients {
        let delivered = state
            .registry
            .notify(
                user,
                ServerEvent::NewFileMessageGroup {
                    conversation_id: conversation.id,
                    message: message.clone(),
                },
            )
            .await;
        if !delivered {
            debug!("new_file_message_group not delivered to {}", user);
        }
    }

    Ok(())
}
