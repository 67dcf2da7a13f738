use std::sync::Arc;

use base64::Engine as _;

use huddle_core::BridgeApi;

/// Forwards outbound room traffic to the external bridge.
///
/// Forwarding is a side channel, never a precondition for in-room delivery:
/// every failure is caught here, logged, and discarded.
pub struct BridgeForwarder {
    api: Arc<dyn BridgeApi>,
}

impl BridgeForwarder {
    pub fn new(api: Arc<dyn BridgeApi>) -> Self {
        Self { api }
    }

    pub async fn forward_text(&self, text: &str) {
        if let Err(e) = self.api.send_text(text).await {
            tracing::warn!(kind = e.error_kind(), error = %e, "failed to forward text to bridge");
        }
    }

    pub async fn forward_image(&self, image: Vec<u8>) {
        if let Err(e) = self.api.send_image(image).await {
            tracing::warn!(kind = e.error_kind(), error = %e, "failed to forward image to bridge");
        }
    }
}

/// Extract the raw bytes of an inline `data:image/...;base64,` payload.
/// Reference URLs and undecodable data yield `None`: nothing to forward.
pub fn decode_inline_image(url: &str) -> Option<Vec<u8>> {
    if !url.starts_with("data:image") {
        return None;
    }
    let (_, encoded) = url.split_once(',')?;
    base64::engine::general_purpose::STANDARD.decode(encoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;

    #[test]
    fn inline_image_decodes_to_its_bytes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"fake-png");
        let url = format!("data:image/png;base64,{encoded}");
        assert_eq!(decode_inline_image(&url).unwrap(), b"fake-png");
    }

    #[test]
    fn reference_urls_are_not_inline_images() {
        assert!(decode_inline_image("https://cdn.example/pic.png").is_none());
        assert!(decode_inline_image("/bridge_image/file-abc").is_none());
    }

    #[test]
    fn broken_payloads_decode_to_none() {
        assert!(decode_inline_image("data:image/png;base64").is_none());
        assert!(decode_inline_image("data:image/png;base64,!!!not-base64!!!").is_none());
    }

    #[tokio::test]
    async fn forward_text_reaches_the_bridge() {
        let mock = Arc::new(MockBridge::new());
        let forwarder = BridgeForwarder::new(Arc::clone(&mock) as Arc<dyn BridgeApi>);

        forwarder.forward_text("hello out there").await;
        assert_eq!(mock.sent_texts(), vec!["hello out there"]);
    }

    #[tokio::test]
    async fn forward_failures_are_swallowed() {
        let mock = Arc::new(MockBridge::new());
        mock.fail_sends(true);
        let forwarder = BridgeForwarder::new(Arc::clone(&mock) as Arc<dyn BridgeApi>);

        forwarder.forward_text("into the void").await;
        forwarder.forward_image(vec![0xff, 0xd8]).await;

        assert!(mock.sent_texts().is_empty());
        assert!(mock.sent_images().is_empty());
    }
}
