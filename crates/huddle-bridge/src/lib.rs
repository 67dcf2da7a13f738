pub mod forwarder;
pub mod mock;
pub mod poller;
pub mod telegram;

pub use forwarder::{decode_inline_image, BridgeForwarder};
pub use mock::MockBridge;
pub use poller::{BridgePoller, PollerConfig};
pub use telegram::TelegramBridge;
