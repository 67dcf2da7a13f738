use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use huddle_core::config::BridgeConfig;
use huddle_core::{BridgeApi, BridgeError, BridgePayload, BridgeResource, BridgeUpdate};

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Headroom on top of the long-poll window before the request itself times out.
const REQUEST_MARGIN: Duration = Duration::from_secs(10);
const FALLBACK_SENDER: &str = "operator";

/// Telegram bot API implementation of the bridge boundary.
///
/// Holds the bot token as a secret; it only surfaces while a request URL is
/// being built. Updates from chats other than the configured operator chat
/// are classified `Unsupported` so they advance the consumer cursor without
/// ever becoming room events.
pub struct TelegramBridge {
    client: Client,
    base_url: String,
    token: SecretString,
    operator_chat: String,
}

impl TelegramBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            base_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_owned()),
            token: config.token.clone(),
            operator_chat: config.operator_chat.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token.expose_secret(), method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token.expose_secret(), file_path)
    }

    /// Send a request and unwrap the bot API's `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BridgeError> {
        let response = request.send().await.map_err(into_network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::from_status(status.as_u16(), body));
        }
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        if !envelope.ok {
            let description = envelope.description.unwrap_or_else(|| "not ok".to_owned());
            return Err(BridgeError::from_status(
                envelope.error_code.unwrap_or(0),
                description,
            ));
        }
        envelope
            .result
            .ok_or_else(|| BridgeError::Decode("envelope has ok=true but no result".into()))
    }
}

#[async_trait]
impl BridgeApi for TelegramBridge {
    async fn disable_push(&self) -> Result<(), BridgeError> {
        let _: bool = self.call(self.client.post(self.method_url("deleteWebhook"))).await?;
        Ok(())
    }

    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<BridgeUpdate>, BridgeError> {
        let request = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            .timeout(timeout + REQUEST_MARGIN);
        let wire: Vec<WireUpdate> = self.call(request).await?;
        Ok(wire
            .into_iter()
            .map(|update| to_update(&self.operator_chat, update))
            .collect())
    }

    async fn send_text(&self, text: &str) -> Result<(), BridgeError> {
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": self.operator_chat, "text": text }));
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    async fn send_image(&self, image: Vec<u8>) -> Result<(), BridgeError> {
        let form = Form::new()
            .text("chat_id", self.operator_chat.clone())
            .part("photo", Part::bytes(image).file_name("upload.jpg"));
        let request = self.client.post(self.method_url("sendPhoto")).multipart(form);
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    async fn fetch_resource(&self, resource_id: &str) -> Result<BridgeResource, BridgeError> {
        let request = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", resource_id)]);
        let file: WireFile = self.call(request).await?;
        let path = file
            .file_path
            .ok_or_else(|| BridgeError::NotFound(resource_id.to_owned()))?;

        let response = self
            .client
            .get(self.file_url(&path))
            .send()
            .await
            .map_err(into_network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::from_status(status.as_u16(), body));
        }
        let bytes = response.bytes().await.map_err(into_network)?;
        Ok(BridgeResource { path, bytes })
    }
}

fn into_network(e: reqwest::Error) -> BridgeError {
    BridgeError::Network(e.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    chat: WireChat,
    #[serde(default)]
    from: Option<WireUser>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    photo: Option<Vec<WirePhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(default)]
    first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    #[serde(default)]
    file_path: Option<String>,
}

/// Reduce one wire update to the relay's vocabulary. Photo updates carry
/// every thumbnail size; the last entry is the largest and the one we keep.
fn to_update(operator_chat: &str, wire: WireUpdate) -> BridgeUpdate {
    let id = wire.update_id;
    let unsupported = |sender: String| BridgeUpdate {
        id,
        sender,
        payload: BridgePayload::Unsupported,
    };

    let Some(message) = wire.message else {
        return unsupported(FALLBACK_SENDER.to_owned());
    };
    let sender = message
        .from
        .and_then(|user| user.first_name)
        .unwrap_or_else(|| FALLBACK_SENDER.to_owned());
    if message.chat.id.to_string() != operator_chat {
        return unsupported(sender);
    }

    let payload = if let Some(text) = message.text {
        BridgePayload::Text(text)
    } else if let Some(resource_id) = message
        .photo
        .and_then(|sizes| sizes.into_iter().last())
        .map(|size| size.file_id)
    {
        BridgePayload::Photo { resource_id }
    } else {
        return unsupported(sender);
    };

    BridgeUpdate { id, sender, payload }
}
