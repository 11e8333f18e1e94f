use serde_json::Value;

use crate::error::ConfigError;

pub const CONFIG_HANDLE_ID: &str = "handle_id";
pub const CONFIG_TOKEN: &str = "oauth_token";
pub const CONFIG_TOKEN_SECRET: &str = "oauth_token_secret";
pub const CONFIG_AUTO_FOLLOW: &str = "auto_follow";

/// The account-level binding a coordinator ingests for. Owned by the
/// surrounding channel-management subsystem; the coordinator only
/// references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelContext {
    pub channel_id: i64,
    pub org_id: i64,
}

/// Per-channel configuration, parsed from the channel's JSON config object.
///
/// The oauth token pair is required (the hosting process needs it to build
/// the platform clients); `handle_id` and `auto_follow` fall back to their
/// defaults when absent.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// The platform account id of the channel itself.
    pub handle_id: i64,
    pub oauth_token: String,
    pub oauth_token_secret: String,
    pub auto_follow: bool,
}

impl ChannelConfig {
    pub fn from_value(channel_id: i64, config: Option<&Value>) -> Result<Self, ConfigError> {
        let config = config.ok_or(ConfigError::MissingConfig { channel_id })?;

        let handle_id = config
            .get(CONFIG_HANDLE_ID)
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let token = config.get(CONFIG_TOKEN).and_then(Value::as_str);
        let secret = config.get(CONFIG_TOKEN_SECRET).and_then(Value::as_str);
        let (oauth_token, oauth_token_secret) = match (token, secret) {
            (Some(token), Some(secret)) => (token.to_string(), secret.to_string()),
            _ => return Err(ConfigError::MissingCredentials { channel_id }),
        };

        Ok(Self {
            handle_id,
            oauth_token,
            oauth_token_secret,
            auto_follow: auto_follow_from(config),
        })
    }
}

/// Reads the hot-reloadable `auto_follow` flag from a channel config.
/// Following new followers back is the default.
pub fn auto_follow_from(config: &Value) -> bool {
    config
        .get(CONFIG_AUTO_FOLLOW)
        .and_then(Value::as_bool)
        .unwrap_or(true)
}
