//! HTTP implementation of [`RemoteDirectory`] over reqwest.
//!
//! Talks to the Matrix client-server API (`/_matrix/client`), the media
//! repository (`/_matrix/media`) and the Synapse admin API (`/_synapse`)
//! with bearer-token authentication.

use crate::directory::RemoteDirectory;
use crate::error::RemoteError;
use crate::types::{Account, CreateRoomSpec, GroupSummary, MediaMeta, MediaRef, RoomSnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Timeout applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-token HTTP transport for a single homeserver.
pub struct HttpDirectory {
    http: reqwest::Client,
    base: Url,
    token: Zeroizing<String>,
}

impl HttpDirectory {
    /// Build a transport for `base_url` (e.g. `https://matrix.example.com`)
    /// authenticated with `token`.
    pub fn new(base_url: &str, token: &str) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("mxsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::Shape(format!("invalid homeserver URI: {e}")))?;
        Ok(Self {
            http,
            base,
            token: Zeroizing::new(token.to_string()),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Shape("homeserver URI cannot be a base".into()))?;
            for seg in segments {
                path.push(seg);
            }
        }
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, RemoteError> {
        debug!(method = %method, url = %url, "directory request");
        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(self.token.as_str());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        Self::checked(resp).await
    }

    /// Map non-success statuses to [`RemoteError::Api`], decoding the
    /// standard `{errcode, error}` body when present.
    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let errcode = body
            .get("errcode")
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });
        Err(RemoteError::api(status.as_u16(), errcode, message))
    }

    async fn json(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value, RemoteError> {
        let resp = self.request(method, url, body).await?;
        Ok(resp.json().await?)
    }

    /// Required string field of a response body.
    fn field(body: &Value, name: &str) -> Result<String, RemoteError> {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Shape(format!("response missing `{name}`")))
    }

    /// `{"chunk": [{key: ...}, ...]}` list bodies used by the groups API.
    fn chunk_ids(body: &Value, key: &str) -> Vec<String> {
        body.get("chunk")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|it| it.get(key).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Pull the filename out of a `Content-Disposition` header value.
fn disposition_filename(header: &str) -> Option<String> {
    let idx = header.find("filename=")?;
    let raw = header[idx + "filename=".len()..].trim();
    let raw = raw.split(';').next().unwrap_or(raw).trim();
    Some(raw.trim_matches('"').to_string())
}

#[async_trait]
impl RemoteDirectory for HttpDirectory {
    async fn whoami(&self) -> Result<String, RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "account", "whoami"])?;
        let body = self.json(Method::GET, url, None).await?;
        Self::field(&body, "user_id")
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "directory", "room", alias])?;
        match self.json(Method::GET, url, None).await {
            Ok(body) => Ok(Some(Self::field(&body, "room_id")?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn room_snapshot(&self, room_id: &str) -> Result<Option<RoomSnapshot>, RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "rooms", room_id, "state"])?;
        let events = match self.json(Method::GET, url, None).await {
            Ok(Value::Array(events)) => events,
            Ok(other) => {
                return Err(RemoteError::Shape(format!(
                    "room state is not an array: {other}"
                )))
            }
            // Not a member (or the id is unknown to the client API):
            // fall back to the admin state endpoint.
            Err(e) if e.status() == Some(StatusCode::FORBIDDEN.as_u16()) || e.is_not_found() => {
                let url = self.url(&["_synapse", "admin", "v1", "rooms", room_id, "state"])?;
                match self.json(Method::GET, url, None).await {
                    Ok(body) => body
                        .get("state")
                        .and_then(Value::as_array)
                        .cloned()
                        .ok_or_else(|| RemoteError::Shape("admin state missing `state`".into()))?,
                    Err(e) if e.is_not_found() => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(Some(RoomSnapshot::from_state_events(room_id, &events)))
    }

    async fn put_room_state(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<(), RemoteError> {
        let mut segments = vec!["_matrix", "client", "v3", "rooms", room_id, "state", event_type];
        if !state_key.is_empty() {
            segments.push(state_key);
        }
        let url = self.url(&segments)?;
        self.json(Method::PUT, url, Some(&content)).await?;
        Ok(())
    }

    async fn create_room(&self, spec: &CreateRoomSpec) -> Result<String, RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "createRoom"])?;
        let body = self.json(Method::POST, url, Some(&spec.to_body())).await?;
        Self::field(&body, "room_id")
    }

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "rooms", room_id, "invite"])?;
        self.json(Method::POST, url, Some(&json!({"user_id": user_id})))
            .await?;
        Ok(())
    }

    async fn kick(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "rooms", room_id, "kick"])?;
        self.json(Method::POST, url, Some(&json!({"user_id": user_id})))
            .await?;
        Ok(())
    }

    async fn room_visibility(&self, room_id: &str) -> Result<String, RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "directory", "list", "room", room_id])?;
        let body = self.json(Method::GET, url, None).await?;
        Ok(body
            .get("visibility")
            .and_then(Value::as_str)
            .unwrap_or("private")
            .to_string())
    }

    async fn set_room_visibility(
        &self,
        room_id: &str,
        visibility: &str,
    ) -> Result<(), RemoteError> {
        let url = self.url(&["_matrix", "client", "v3", "directory", "list", "room", room_id])?;
        self.json(Method::PUT, url, Some(&json!({"visibility": visibility})))
            .await?;
        Ok(())
    }

    async fn make_room_admin(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&["_synapse", "admin", "v1", "rooms", room_id, "make_room_admin"])?;
        self.json(Method::POST, url, Some(&json!({"user_id": user_id})))
            .await?;
        Ok(())
    }

    async fn delete_room(
        &self,
        room_id: &str,
        block: bool,
        purge: bool,
    ) -> Result<Value, RemoteError> {
        let url = self.url(&["_synapse", "admin", "v1", "rooms", room_id, "delete"])?;
        self.json(
            Method::POST,
            url,
            Some(&json!({"block": block, "purge": purge})),
        )
        .await
    }

    async fn send_message(&self, room_id: &str, content: Value) -> Result<String, RemoteError> {
        let txn_id = Uuid::new_v4().to_string();
        let url = self.url(&[
            "_matrix",
            "client",
            "v3",
            "rooms",
            room_id,
            "send",
            "m.room.message",
            txn_id.as_str(),
        ])?;
        let body = self.json(Method::PUT, url, Some(&content)).await?;
        Self::field(&body, "event_id")
    }

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<MediaRef, RemoteError> {
        let mut url = self.url(&["_matrix", "media", "v3", "upload"])?;
        url.query_pairs_mut().append_pair("filename", filename);
        debug!(url = %url, size = bytes.len(), mime = %mime, "media upload");
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token.as_str())
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(Bytes::from(bytes))
            .send()
            .await?;
        let body: Value = Self::checked(resp).await?.json().await?;
        Ok(MediaRef(Self::field(&body, "content_uri")?))
    }

    async fn download_media_meta(&self, media: &MediaRef) -> Result<MediaMeta, RemoteError> {
        let (server, media_id) = media
            .parts()
            .ok_or_else(|| RemoteError::Shape(format!("not an mxc URI: {media}")))?;
        let url = self.url(&["_matrix", "media", "v3", "download", server, media_id])?;
        let resp = self.request(Method::GET, url, None).await?;

        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let filename = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);
        let size = match resp.content_length() {
            Some(len) => len,
            // Chunked responses carry no length header; fall back to the body.
            None => resp.bytes().await?.len() as u64,
        };

        Ok(MediaMeta {
            size,
            mime,
            filename,
        })
    }

    async fn account(&self, user_id: &str) -> Result<Option<Account>, RemoteError> {
        let url = self.url(&["_synapse", "admin", "v2", "users", user_id])?;
        let body = match self.json(Method::GET, url, None).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut account: Account = serde_json::from_value(body)
            .map_err(|e| RemoteError::Shape(format!("malformed account body: {e}")))?;
        account.mxid.get_or_insert_with(|| user_id.to_string());
        Ok(Some(account))
    }

    async fn update_account(&self, user_id: &str, content: Value) -> Result<(), RemoteError> {
        let url = self.url(&["_synapse", "admin", "v2", "users", user_id])?;
        self.json(Method::PUT, url, Some(&content)).await?;
        Ok(())
    }

    async fn group_summary(&self, group_id: &str) -> Result<Option<GroupSummary>, RemoteError> {
        let url = self.url(&["_matrix", "client", "r0", "groups", group_id, "summary"])?;
        let summary = match self.json(Method::GET, url, None).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let profile = summary
            .get("profile")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| RemoteError::Shape(format!("malformed group profile: {e}")))?
            .unwrap_or_default();

        let users_url = self.url(&["_matrix", "client", "r0", "groups", group_id, "users"])?;
        let users = Self::chunk_ids(&self.json(Method::GET, users_url, None).await?, "user_id");
        let invited_url =
            self.url(&["_matrix", "client", "r0", "groups", group_id, "invited_users"])?;
        let invited_users =
            Self::chunk_ids(&self.json(Method::GET, invited_url, None).await?, "user_id");
        let rooms_url = self.url(&["_matrix", "client", "r0", "groups", group_id, "rooms"])?;
        let rooms = Self::chunk_ids(&self.json(Method::GET, rooms_url, None).await?, "room_id");

        Ok(Some(GroupSummary {
            group_id: group_id.to_string(),
            profile,
            users,
            invited_users,
            rooms,
        }))
    }

    async fn create_group(&self, localpart: &str, name: &str) -> Result<String, RemoteError> {
        let url = self.url(&["_matrix", "client", "r0", "create_group"])?;
        let body = self
            .json(
                Method::POST,
                url,
                Some(&json!({"localpart": localpart, "profile": {"name": name}})),
            )
            .await?;
        Self::field(&body, "group_id")
    }

    async fn update_group_profile(
        &self,
        group_id: &str,
        content: Value,
    ) -> Result<(), RemoteError> {
        let url = self.url(&["_matrix", "client", "r0", "groups", group_id, "profile"])?;
        self.json(Method::POST, url, Some(&content)).await?;
        Ok(())
    }

    async fn group_invite_user(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&[
            "_matrix", "client", "r0", "groups", group_id, "admin", "users", "invite", user_id,
        ])?;
        self.json(Method::PUT, url, Some(&json!({"user_id": user_id})))
            .await?;
        Ok(())
    }

    async fn group_remove_user(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&[
            "_matrix", "client", "r0", "groups", group_id, "admin", "users", "remove", user_id,
        ])?;
        self.json(Method::PUT, url, Some(&json!({}))).await?;
        Ok(())
    }

    async fn group_add_room(
        &self,
        group_id: &str,
        room_id: &str,
        visibility: &str,
    ) -> Result<(), RemoteError> {
        let url = self.url(&[
            "_matrix", "client", "r0", "groups", group_id, "admin", "rooms", room_id,
        ])?;
        self.json(
            Method::PUT,
            url,
            Some(&json!({"m.visibility": {"type": visibility}})),
        )
        .await?;
        Ok(())
    }

    async fn group_remove_room(&self, group_id: &str, room_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&[
            "_matrix", "client", "r0", "groups", group_id, "admin", "rooms", room_id,
        ])?;
        self.json(Method::DELETE, url, Some(&json!({}))).await?;
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<Value, RemoteError> {
        let url = self.url(&["_synapse", "admin", "v1", "delete_group", group_id])?;
        self.json(Method::POST, url, Some(&json!({}))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_parsing() {
        assert_eq!(
            disposition_filename(r#"inline; filename="logo.png""#),
            Some("logo.png".to_string())
        );
        assert_eq!(
            disposition_filename("attachment; filename=avatar.jpeg; size=1"),
            Some("avatar.jpeg".to_string())
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn url_encodes_identifiers() {
        let dir = HttpDirectory::new("https://matrix.example.com", "secret").unwrap();
        let url = dir
            .url(&["_matrix", "client", "v3", "directory", "room", "#ops:example.com"])
            .unwrap();
        assert!(url.as_str().ends_with("/directory/room/%23ops:example.com"));
    }
}
