//! NATS publisher for prediction replies

use anyhow::{Context, Result};
use async_nats::{Client, Subject};
use tracing::debug;

use crate::types::request::ServiceResponse;

/// Publishes responses to each request's reply subject
#[derive(Clone)]
pub struct ResponsePublisher {
    client: Client,
}

impl ResponsePublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a response to `reply`
    pub async fn publish(&self, reply: Subject, response: &ServiceResponse) -> Result<()> {
        let payload = serde_json::to_vec(response).context("Failed to encode response")?;

        self.client
            .publish(reply.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish reply to {}", reply))?;

        debug!(
            request_id = %response.request_id,
            reply = %reply,
            ok = response.is_ok(),
            "Published response"
        );

        Ok(())
    }
}
