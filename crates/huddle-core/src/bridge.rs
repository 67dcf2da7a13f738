use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::BridgeError;

/// One message pulled from the external bridge, already reduced to what the
/// relay cares about. `id` is the bridge's monotone update identifier and
/// drives the consumption cursor.
#[derive(Clone, Debug)]
pub struct BridgeUpdate {
    pub id: i64,
    pub sender: String,
    pub payload: BridgePayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgePayload {
    Text(String),
    Photo { resource_id: String },
    /// Anything the relay does not handle (stickers, other chats, service
    /// messages). Still advances the cursor, never becomes a room event.
    Unsupported,
}

/// A downloaded bridge resource. `path` is the bridge-side file path and is
/// only used to infer a content type from its extension.
#[derive(Clone, Debug)]
pub struct BridgeResource {
    pub path: String,
    pub bytes: Bytes,
}

/// The external bridge service boundary.
///
/// Implemented by the real Telegram client and by the scripted mock used in
/// tests. The poller, forwarder and image proxy only ever see this trait.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// Best-effort: turn off any push-delivery subscription so the pull
    /// session below is not starved by a competing webhook.
    async fn disable_push(&self) -> Result<(), BridgeError>;

    /// Fetch updates with id >= `offset`, waiting up to `timeout` for new
    /// ones to arrive (long poll).
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<BridgeUpdate>, BridgeError>;

    async fn send_text(&self, text: &str) -> Result<(), BridgeError>;

    async fn send_image(&self, image: Vec<u8>) -> Result<(), BridgeError>;

    /// Resolve a resource id and download its bytes.
    async fn fetch_resource(&self, resource_id: &str) -> Result<BridgeResource, BridgeError>;
}
