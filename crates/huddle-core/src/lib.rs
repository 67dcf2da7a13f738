pub mod bridge;
pub mod config;
pub mod errors;
pub mod events;
pub mod ids;

pub use bridge::{BridgeApi, BridgePayload, BridgeResource, BridgeUpdate};
pub use config::{BridgeConfig, Config, ConfigError};
pub use errors::BridgeError;
pub use events::{ChatEvent, EventParseError, PresenceStatus};
pub use ids::ConnId;
