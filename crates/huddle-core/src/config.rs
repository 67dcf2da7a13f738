use secrecy::SecretString;

/// Environment variable names understood at startup.
pub mod env_vars {
    pub const BOT_TOKEN: &str = "HUDDLE_BOT_TOKEN";
    pub const OPERATOR_CHAT: &str = "HUDDLE_OPERATOR_CHAT";
    pub const BRIDGE_ROOM: &str = "HUDDLE_BRIDGE_ROOM";
    pub const PORT: &str = "HUDDLE_PORT";
    pub const BRIDGE_API: &str = "HUDDLE_BRIDGE_API";
}

const DEFAULT_PORT: u16 = 8000;

/// Credentials and addressing for the external bridge service.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Base URL override; `None` means the bridge client's default endpoint.
    pub api_url: Option<String>,
    pub token: SecretString,
    /// The one external chat whose updates are relayed into the bridge room.
    pub operator_chat: String,
}

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// The single room that receives bridge-originated events.
    pub bridge_room: String,
    pub bridge: BridgeConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = require(env_vars::BOT_TOKEN)?;
        let operator_chat = require(env_vars::OPERATOR_CHAT)?;
        let bridge_room = require(env_vars::BRIDGE_ROOM)?;

        let port = match std::env::var(env_vars::PORT) {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: env_vars::PORT,
                reason: format!("{raw:?} is not a port number"),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            bridge_room,
            bridge: BridgeConfig {
                api_url: std::env::var(env_vars::BRIDGE_API).ok(),
                token: SecretString::from(token),
                operator_chat,
            },
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}
