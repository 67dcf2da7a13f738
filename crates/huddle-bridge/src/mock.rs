use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use huddle_core::{BridgeApi, BridgeError, BridgePayload, BridgeResource, BridgeUpdate};

/// Scripted bridge for deterministic tests without network access.
///
/// Fetch results are consumed in the order they were scripted; once the
/// script runs dry every fetch returns an empty batch, like a long poll that
/// timed out with nothing new. All send and fetch activity is recorded for
/// assertions.
#[derive(Default)]
pub struct MockBridge {
    fetches: Mutex<VecDeque<Result<Vec<BridgeUpdate>, BridgeError>>>,
    offsets: Mutex<Vec<i64>>,
    sent_texts: Mutex<Vec<String>>,
    sent_images: Mutex<Vec<Vec<u8>>>,
    resources: Mutex<HashMap<String, (String, Bytes)>>,
    push_disables: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next unscripted `fetch_updates` call.
    pub fn script_fetch(&self, result: Result<Vec<BridgeUpdate>, BridgeError>) {
        self.fetches.lock().push_back(result);
    }

    /// Register a downloadable resource for `fetch_resource`.
    pub fn add_resource(&self, resource_id: &str, path: &str, bytes: &[u8]) {
        self.resources.lock().insert(
            resource_id.to_owned(),
            (path.to_owned(), Bytes::copy_from_slice(bytes)),
        );
    }

    /// Make every subsequent send fail with a network error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// Offsets passed to `fetch_updates`, in call order.
    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_texts.lock().clone()
    }

    pub fn sent_images(&self) -> Vec<Vec<u8>> {
        self.sent_images.lock().clone()
    }

    pub fn push_disables(&self) -> usize {
        self.push_disables.load(Ordering::Relaxed)
    }

    /// Convenience: a text update as the operator would produce it.
    pub fn text_update(id: i64, sender: &str, text: &str) -> BridgeUpdate {
        BridgeUpdate {
            id,
            sender: sender.to_owned(),
            payload: BridgePayload::Text(text.to_owned()),
        }
    }

    /// Convenience: a photo update referencing a bridge resource.
    pub fn photo_update(id: i64, sender: &str, resource_id: &str) -> BridgeUpdate {
        BridgeUpdate {
            id,
            sender: sender.to_owned(),
            payload: BridgePayload::Photo { resource_id: resource_id.to_owned() },
        }
    }

    /// Convenience: an update the relay skips over.
    pub fn unsupported_update(id: i64) -> BridgeUpdate {
        BridgeUpdate {
            id,
            sender: "operator".to_owned(),
            payload: BridgePayload::Unsupported,
        }
    }
}

#[async_trait]
impl BridgeApi for MockBridge {
    async fn disable_push(&self) -> Result<(), BridgeError> {
        self.push_disables.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fetch_updates(
        &self,
        offset: i64,
        _timeout: Duration,
    ) -> Result<Vec<BridgeUpdate>, BridgeError> {
        self.offsets.lock().push(offset);
        match self.fetches.lock().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), BridgeError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(BridgeError::Network("mock send failure".into()));
        }
        self.sent_texts.lock().push(text.to_owned());
        Ok(())
    }

    async fn send_image(&self, image: Vec<u8>) -> Result<(), BridgeError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(BridgeError::Network("mock send failure".into()));
        }
        self.sent_images.lock().push(image);
        Ok(())
    }

    async fn fetch_resource(&self, resource_id: &str) -> Result<BridgeResource, BridgeError> {
        match self.resources.lock().get(resource_id) {
            Some((path, bytes)) => Ok(BridgeResource {
                path: path.clone(),
                bytes: bytes.clone(),
            }),
            None => Err(BridgeError::NotFound(resource_id.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_fetches_are_consumed_in_order() {
        let mock = MockBridge::new();
        mock.script_fetch(Ok(vec![MockBridge::text_update(1, "op", "first")]));
        mock.script_fetch(Err(BridgeError::Network("down".into())));

        let batch = mock.fetch_updates(1, Duration::from_secs(30)).await.unwrap();
        assert_eq!(batch.len(), 1);

        assert!(mock.fetch_updates(2, Duration::from_secs(30)).await.is_err());

        // Script exhausted: behaves like an empty long poll.
        let batch = mock.fetch_updates(2, Duration::from_secs(30)).await.unwrap();
        assert!(batch.is_empty());

        assert_eq!(mock.offsets(), vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn sends_are_recorded_until_failures_are_scripted() {
        let mock = MockBridge::new();
        mock.send_text("hello").await.unwrap();
        assert_eq!(mock.sent_texts(), vec!["hello"]);

        mock.fail_sends(true);
        assert!(mock.send_text("lost").await.is_err());
        assert!(mock.send_image(vec![1, 2, 3]).await.is_err());
        assert_eq!(mock.sent_texts(), vec!["hello"]);
        assert!(mock.sent_images().is_empty());
    }

    #[tokio::test]
    async fn resources_resolve_or_404() {
        let mock = MockBridge::new();
        mock.add_resource("file-1", "photos/file_1.png", b"png-bytes");

        let resource = mock.fetch_resource("file-1").await.unwrap();
        assert_eq!(resource.path, "photos/file_1.png");
        assert_eq!(&resource.bytes[..], b"png-bytes");

        let err = mock.fetch_resource("missing").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }
}
