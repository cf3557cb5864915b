use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use parley_types::events::ServerEvent;

use crate::GatewayState;

/// Create (or land on) the pending request for the pair and tell both
/// sides. The UNIQUE pair index means a repeated send cannot pile up rows,
/// but the parties are still re-notified.
pub async fn friend_request(state: &GatewayState, from: &str, to: &str) -> Result<()> {
    let (request_id, inserted) = state.db.create_friend_request(from, to)?;
    if !inserted {
        debug!("friend request {} from {} to {} already pending", request_id, from, to);
    }

    let delivered = state
        .registry
        .notify(
            to,
            ServerEvent::NewFriendRequest {
                message: "New friend request received".into(),
            },
        )
        .await;
    if !delivered {
        debug!("new_friend_request not delivered to {}", to);
    }

    let delivered = state
        .registry
        .notify(
            from,
            ServerEvent::RequestSent {
                message: "Request sent successfully!".into(),
            },
        )
        .await;
    if !delivered {
        debug!("request_sent not delivered to {}", from);
    }

    Ok(())
}

/// Both friendship directions and the request deletion commit atomically
/// in the store; both parties are then notified.
pub async fn accept_request(state: &GatewayState, request_id: Uuid) -> Result<()> {
    let Some((sender, recipient)) = state.db.accept_friend_request(request_id)? else {
        debug!("accept_request for unknown request {}", request_id);
        return Ok(());
    };

    for user in [&sender, &recipient] {
        let delivered = state
            .registry
            .notify(
                user,
                ServerEvent::RequestAccepted {
                    message: "Friend request accepted".into(),
                },
            )
            .await;
        if !delivered {
            debug!("request_accepted not delivered to {}", user);
        }
    }

    Ok(())
}
