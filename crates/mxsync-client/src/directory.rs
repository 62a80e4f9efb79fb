//! The remote directory seam.
//!
//! Everything the reconciliation engine asks of a homeserver goes through
//! [`RemoteDirectory`]. The engine never constructs HTTP requests itself,
//! which keeps reconcilers testable against an in-memory implementation.

use crate::error::RemoteError;
use crate::types::{Account, CreateRoomSpec, GroupSummary, MediaMeta, MediaRef, RoomSnapshot};
use async_trait::async_trait;
use serde_json::Value;

/// Operations the reconcilers consume, mapped onto the Matrix
/// client-server and Synapse admin APIs.
///
/// Lookups of possibly-missing resources return `Ok(None)` on 404; every
/// other non-success response is a [`RemoteError`].
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Resolve the user id the access token acts as.
    async fn whoami(&self) -> Result<String, RemoteError>;

    /// Resolve a fully qualified room alias to a room id.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RemoteError>;

    /// Load the full current state of a room or space.
    async fn room_snapshot(&self, room_id: &str) -> Result<Option<RoomSnapshot>, RemoteError>;

    /// Send a state event into a room. `state_key` is `""` for singleton
    /// events (name, topic, power levels...).
    async fn put_room_state(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<(), RemoteError>;

    /// Create a room (or space) and return its id.
    async fn create_room(&self, spec: &CreateRoomSpec) -> Result<String, RemoteError>;

    /// Invite a user into a room.
    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError>;

    /// Remove (kick) a user from a room.
    async fn kick(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError>;

    /// Current directory visibility of a room (`public` / `private`).
    async fn room_visibility(&self, room_id: &str) -> Result<String, RemoteError>;

    /// Publish or hide a room in the directory.
    async fn set_room_visibility(&self, room_id: &str, visibility: &str)
        -> Result<(), RemoteError>;

    /// Grant a user admin power in a room via the Synapse admin API.
    async fn make_room_admin(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError>;

    /// Delete a room. `block` seals the room id against re-entry, `purge`
    /// drops its history from the database.
    async fn delete_room(
        &self,
        room_id: &str,
        block: bool,
        purge: bool,
    ) -> Result<Value, RemoteError>;

    /// Send an `m.room.message` event; returns the event id.
    async fn send_message(&self, room_id: &str, content: Value) -> Result<String, RemoteError>;

    /// Upload media; returns the new `mxc://` reference.
    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<MediaRef, RemoteError>;

    /// Fetch stored-media metadata (size, MIME, filename) without keeping
    /// the content.
    async fn download_media_meta(&self, media: &MediaRef) -> Result<MediaMeta, RemoteError>;

    /// Load a Synapse account.
    async fn account(&self, user_id: &str) -> Result<Option<Account>, RemoteError>;

    /// Partially update a Synapse account (admin v2 user API semantics).
    async fn update_account(&self, user_id: &str, content: Value) -> Result<(), RemoteError>;

    /// Load a group summary with membership and room lists.
    async fn group_summary(&self, group_id: &str) -> Result<Option<GroupSummary>, RemoteError>;

    /// Create a group from a localpart and display name; returns the
    /// group id.
    async fn create_group(&self, localpart: &str, name: &str) -> Result<String, RemoteError>;

    /// Update group profile fields.
    async fn update_group_profile(
        &self,
        group_id: &str,
        content: Value,
    ) -> Result<(), RemoteError>;

    /// Invite a user into a group.
    async fn group_invite_user(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError>;

    /// Remove a user from a group.
    async fn group_remove_user(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError>;

    /// Attach a room to a group.
    async fn group_add_room(
        &self,
        group_id: &str,
        room_id: &str,
        visibility: &str,
    ) -> Result<(), RemoteError>;

    /// Detach a room from a group.
    async fn group_remove_room(&self, group_id: &str, room_id: &str) -> Result<(), RemoteError>;

    /// Delete a group via the Synapse admin API.
    async fn delete_group(&self, group_id: &str) -> Result<Value, RemoteError>;
}
