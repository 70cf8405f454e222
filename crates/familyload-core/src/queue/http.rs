//! HTTP push transport.
//!
//! Posts a multicast request to a push relay endpoint and reads back
//! per-token results. The relay shape is:
//!
//! ```json
//! // request
//! { "tokens": ["..."], "title": "...", "body": "...", "data": { ... } }
//! // response
//! { "results": [ { "token": "...", "success": true, "error": null } ] }
//! ```
//!
//! Error codes "unregistered", "not_registered" and "invalid_token" mark
//! the token dead so the queue can prune it.

use reqwest::Client;

use super::transport::{PushMessage, PushTransport, TokenDelivery};
use crate::storage::config::PushConfig;

/// Push transport over a JSON multicast relay.
pub struct HttpPushTransport {
    endpoint: String,
    api_key: String,
}

impl HttpPushTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key.clone())
    }
}

fn is_invalid_token_error(code: &str) -> bool {
    matches!(code, "unregistered" | "not_registered" | "invalid_token")
}

impl PushTransport for HttpPushTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }

    fn send(
        &self,
        tokens: &[String],
        message: &PushMessage<'_>,
    ) -> Result<Vec<TokenDelivery>, Box<dyn std::error::Error>> {
        let request = serde_json::json!({
            "tokens": tokens,
            "title": message.title,
            "body": message.body,
            "data": message.payload,
        });

        let resp: serde_json::Value = tokio::runtime::Handle::current().block_on(async {
            Client::new()
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?
                .json()
                .await
        })?;

        if let Some(err) = resp.get("error") {
            return Err(format!("push relay error: {err}").into());
        }

        let results = resp["results"]
            .as_array()
            .ok_or("missing results in push relay response")?;

        let mut deliveries = Vec::with_capacity(results.len());
        for result in results {
            let token = result["token"]
                .as_str()
                .ok_or("missing token in push relay result")?;
            let delivered = result["success"].as_bool().unwrap_or(false);
            let invalid = result["error"]
                .as_str()
                .map(is_invalid_token_error)
                .unwrap_or(false);

            deliveries.push(TokenDelivery {
                token: token.to_string(),
                delivered,
                invalid_token: invalid,
            });
        }
        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_when_fields_empty() {
        assert!(!HttpPushTransport::new("", "").is_configured());
        assert!(!HttpPushTransport::new("https://push.example.test", "").is_configured());
        assert!(HttpPushTransport::new("https://push.example.test", "key").is_configured());
    }

    #[test]
    fn invalid_token_error_codes() {
        assert!(is_invalid_token_error("unregistered"));
        assert!(is_invalid_token_error("not_registered"));
        assert!(is_invalid_token_error("invalid_token"));
        assert!(!is_invalid_token_error("throttled"));
        assert!(!is_invalid_token_error("internal"));
    }
}
