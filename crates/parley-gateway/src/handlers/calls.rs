use anyhow::Result;
use tracing::debug;

use parley_types::events::ServerEvent;
use parley_types::models::{CallKind, CallVerdict, User};

use crate::GatewayState;
use crate::handlers::Reply;

/// Initiate a call: one session row (status ongoing, verdict unset) plus a
/// ringing notification to the receiver. Ringing is signaling only and is
/// never persisted.
pub async fn start_call(
    state: &GatewayState,
    kind: CallKind,
    from: String,
    to: String,
    room_id: String,
) -> Result<()> {
    let Some(caller) = state.db.get_user(&from)? else {
        debug!("start_call from unknown user {}", from);
        return Ok(());
    };

    state.db.create_call(kind, &from, &to)?;

    let delivered = state
        .registry
        .notify(&to, ringing_event(kind, caller, room_id, &from, &to))
        .await;
    if !delivered {
        debug!("call notification not delivered to {}", to);
    }

    Ok(())
}

/// The receiver never picked up: the session ends as missed and the
/// receiver's client is told to stop ringing.
pub async fn not_picked(state: &GatewayState, kind: CallKind, from: String, to: String) -> Result<()> {
    let Some(_session) = state.db.settle_call(kind, &from, &to, CallVerdict::Missed)? else {
        debug!("no ongoing {:?} call for ({}, {})", kind, from, to);
        return Ok(());
    };

    let event = match kind {
        CallKind::Audio => ServerEvent::AudioCallMissed {
            from: from.clone(),
            to: to.clone(),
        },
        CallKind::Video => ServerEvent::VideoCallMissed {
            from: from.clone(),
            to: to.clone(),
        },
    };
    notify(state, &to, event).await;
    Ok(())
}

/// Acceptance records the verdict but the session keeps running; the
/// caller learns the receiver joined.
pub async fn accepted(state: &GatewayState, kind: CallKind, from: String, to: String) -> Result<()> {
    let Some(_session) = state.db.accept_call(kind, &from, &to)? else {
        debug!("no ongoing {:?} call for ({}, {})", kind, from, to);
        return Ok(());
    };

    let event = match kind {
        CallKind::Audio => ServerEvent::AudioCallAccepted {
            from: from.clone(),
            to: to.clone(),
        },
        CallKind::Video => ServerEvent::VideoCallAccepted {
            from: from.clone(),
            to: to.clone(),
        },
    };
    notify(state, &from, event).await;
    Ok(())
}

pub async fn denied(state: &GatewayState, kind: CallKind, from: String, to: String) -> Result<()> {
    let Some(_session) = state.db.settle_call(kind, &from, &to, CallVerdict::Denied)? else {
        debug!("no ongoing {:?} call for ({}, {})", kind, from, to);
        return Ok(());
    };

    let event = match kind {
        CallKind::Audio => ServerEvent::AudioCallDenied {
            from: from.clone(),
            to: to.clone(),
        },
        CallKind::Video => ServerEvent::VideoCallDenied {
            from: from.clone(),
            to: to.clone(),
        },
    };
    notify(state, &from, event).await;
    Ok(())
}

/// The receiver is already in another call.
pub async fn busy(state: &GatewayState, kind: CallKind, from: String, to: String) -> Result<()> {
    let Some(_session) = state.db.settle_call(kind, &from, &to, CallVerdict::Busy)? else {
        debug!("no ongoing {:?} call for ({}, {})", kind, from, to);
        return Ok(());
    };

    let event = match kind {
        CallKind::Audio => ServerEvent::OnAnotherAudioCall {
            from: from.clone(),
            to: to.clone(),
        },
        CallKind::Video => ServerEvent::OnAnotherVideoCall {
            from: from.clone(),
            to: to.clone(),
        },
    };
    notify(state, &from, event).await;
    Ok(())
}

pub async fn get_call_logs(state: &GatewayState, reply: &Reply, user_id: &str) -> Result<()> {
    let log = state.db.call_log_for_user(user_id)?;
    let _ = reply.send(ServerEvent::CallLogs(log));
    Ok(())
}

fn ringing_event(
    kind: CallKind,
    caller: User,
    room_id: String,
    from: &str,
    to: &str,
) -> ServerEvent {
    match kind {
        CallKind::Audio => ServerEvent::AudioCallNotification {
            from: caller,
            room_id,
            stream_id: from.to_string(),
            user_id: to.to_string(),
            user_name: to.to_string(),
        },
        CallKind::Video => ServerEvent::VideoCallNotification {
            from: caller,
            room_id,
            stream_id: from.to_string(),
            user_id: to.to_string(),
            user_name: to.to_string(),
        },
    }
}

async fn notify(state: &GatewayState, user_id: &str, event: ServerEvent) {
    if !state.registry.notify(user_id, event).await {
        debug!("call event not delivered to {}", user_id);
    }
}
