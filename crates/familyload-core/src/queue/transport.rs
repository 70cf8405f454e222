//! Push transport seam.
//!
//! The queue never talks to a push platform directly; it hands a token
//! list and a message to whatever implements this trait. Implementations
//! are stateless between calls.

use serde_json::Value;

/// Message handed to the transport for one queue row.
#[derive(Debug, Clone)]
pub struct PushMessage<'a> {
    pub title: &'a str,
    pub body: &'a str,
    /// Opaque payload forwarded alongside the notification.
    pub payload: &'a Value,
}

/// Per-token result of a multicast send.
#[derive(Debug, Clone)]
pub struct TokenDelivery {
    pub token: String,
    /// Whether the platform accepted the message for this token.
    pub delivered: bool,
    /// Whether the platform reported the token as dead (unregistered,
    /// malformed). Invalid tokens get pruned from the registry.
    pub invalid_token: bool,
}

/// Every push transport implements this trait.
pub trait PushTransport: Send + Sync {
    /// Unique identifier (e.g. "http", "fcm").
    fn name(&self) -> &str;

    /// Whether the transport has everything it needs to dispatch.
    fn is_configured(&self) -> bool;

    /// Send one message to multiple tokens.
    ///
    /// A transport-level error means nothing was delivered; the caller
    /// treats it as every token having failed.
    fn send(
        &self,
        tokens: &[String],
        message: &PushMessage<'_>,
    ) -> Result<Vec<TokenDelivery>, Box<dyn std::error::Error>>;
}
