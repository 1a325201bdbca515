use std::sync::Arc;

use agent_core::ChannelToken;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;
use url::Url;
use uuid::Uuid;

use crate::error::ControlChannelError;
use crate::signer::RequestSigner;

#[derive(Debug, Serialize)]
struct TokenRequest {
    #[serde(rename = "MessageSchemaVersion")]
    message_schema_version: &'static str,
    #[serde(rename = "RequestId")]
    request_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "TokenValue")]
    token_value: String,
}

/// Fetches the one-shot channel token the upgrade handshake and the
/// `OpenControlChannel` payload both require (§6 MGS REST surface).
#[derive(TypedBuilder)]
pub struct TokenClient {
    #[builder(default)]
    client: Client,
    signer: Arc<dyn RequestSigner>,
}

impl TokenClient {
    pub async fn fetch_token(&self, rest_endpoint: &Url, short_instance_id: &str) -> Result<ChannelToken, ControlChannelError> {
        let path = format!("/v1/control-channel/{short_instance_id}");
        let url = rest_endpoint.join(&path).map_err(|e| ControlChannelError::Endpoint(e.to_string()))?;

        let request_id = Uuid::new_v4();
        let body = TokenRequest {
            message_schema_version: "1.0",
            request_id,
        };
        let body_json = serde_json::to_string(&body).expect("TokenRequest always serializes");

        let canonical = format!("POST\n{path}\n{body_json}");
        let headers = self.signer.sign(&canonical);

        let mut request = self.client.post(url.clone()).json(&body);
        for (name, value) in &headers {
            request = request.header(name, value);
        }

        debug!(target: "control", "fetching control channel token from {url}");
        let response = request.send().await.map_err(|e| ControlChannelError::TokenFetch(e.to_string()))?;

        if response.status().as_u16() != 201 {
            return Err(ControlChannelError::TokenFetch(format!("unexpected status {}", response.status())));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| ControlChannelError::TokenFetch(e.to_string()))?;
        Ok(ChannelToken::new(parsed.token_value))
    }
}
