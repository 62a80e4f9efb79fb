//! Message delivery.
//!
//! Not a convergence operation: sending is always a new event. The
//! resulting event id lands in the change record so callers can chain on
//! it.

use crate::changes::{ChangeLog, Entry};
use crate::error::{SyncError, SyncResult};
use crate::output::{Failure, Outcome};
use crate::resources::ResourceClient;
use serde_json::{json, Value};
use tracing::info;

/// Deliver a text (or notice) message to a room.
pub async fn send_text(
    client: &ResourceClient,
    room: &str,
    message: &str,
    notice: bool,
    check: bool,
) -> Result<Outcome, Failure> {
    let mut log = ChangeLog::new();
    match run(client, room, message, notice, check, &mut log).await {
        Ok(resource) => Ok(Outcome::new(resource, log)),
        Err(err) => Err(Failure::new(&err, log)),
    }
}

async fn run(
    client: &ResourceClient,
    room: &str,
    message: &str,
    notice: bool,
    check: bool,
    log: &mut ChangeLog,
) -> SyncResult<Value> {
    let alias = client.resolver().room_alias(room);
    let room_id = if alias.starts_with('!') {
        alias.clone()
    } else {
        client
            .directory()
            .resolve_alias(&alias)
            .await?
            .ok_or_else(|| SyncError::Validation(format!("room `{room}` does not exist")))?
    };

    if check {
        return Ok(json!({"room_id": room_id}));
    }

    let msgtype = if notice { "m.notice" } else { "m.text" };
    let content = json!({"msgtype": msgtype, "body": message});
    let event_id = client.directory().send_message(&room_id, content).await?;
    info!(room = %room_id, event = %event_id, "message sent");
    log.record("event_id", Entry::marker(&event_id));

    Ok(json!({"room_id": room_id, "event_id": event_id}))
}
