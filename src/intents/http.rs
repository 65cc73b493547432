//! Remote intent classifier
//!
//! POSTs `{"text": ...}` and expects `{"route": "TOKEN_SWAP"}` back. Any
//! failure degrades to `Conversation`.

use super::{IntentClassifier, RouteLabel};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    route: String,
}

pub struct HttpIntentClassifier {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpIntentClassifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint
            .parse()
            .map_err(|e| Error::Config(format!("invalid classifier url {}: {}", endpoint, e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    async fn request(&self, text: &str) -> Result<RouteLabel> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ClassifyRequest { text })
            .send()
            .await?
            .error_for_status()?;
        let body: ClassifyResponse = response.json().await?;
        Ok(RouteLabel::from_label(&body.route))
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, text: &str) -> RouteLabel {
        match self.request(text).await {
            Ok(route) => {
                tracing::debug!(route = %route, "Classified message");
                route
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Intent classification failed, treating as conversation"
                );
                RouteLabel::Conversation
            }
        }
    }
}
