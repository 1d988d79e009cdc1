//! HTTP payment service integration.
//!
//! Talks to a REST ledger exposing two endpoints:
//! - `POST {base}/transfers` — submit a transfer, returns its id
//! - `GET  {base}/transfers/{id}` — current status + optional reason
//!
//! Auth: `Authorization: Bearer {key}` when a key is configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Cash;

use super::{LedgerService, LedgerStatus, StatusReport, TransferMetadata};

const SERVICE_NAME: &str = "rest";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    from_account: &'a str,
    to_account: &'a str,
    amount: Cash,
    metadata: &'a TransferMetadata,
}

#[derive(Debug, Deserialize)]
struct TransferCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TransferStatusResponse {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// REST payment service client.
pub struct RestLedgerClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestLedgerClient {
    /// Create a new client. `api_key` is optional for services that
    /// authenticate by network instead.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("TYCOON/0.1.0 (game-engine)")
            .build()
            .context("Failed to build HTTP client for ledger")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

#[async_trait]
impl LedgerService for RestLedgerClient {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Cash,
        metadata: &TransferMetadata,
    ) -> Result<String> {
        let body = TransferRequest {
            from_account: from,
            to_account: to,
            amount,
            metadata,
        };

        let url = format!("{}/transfers", self.base_url);
        debug!(url = %url, from, to, amount = %amount, "Submitting transfer");

        let resp = self
            .authorize(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .context("Ledger transfer request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ledger transfer rejected {status}: {body}");
        }

        let created: TransferCreated = resp
            .json()
            .await
            .context("Failed to parse ledger transfer response")?;

        Ok(created.id)
    }

    async fn poll_status(&self, transaction_id: &str) -> Result<StatusReport> {
        let url = format!("{}/transfers/{transaction_id}", self.base_url);

        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .context("Ledger status request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ledger status check failed {status}: {body}");
        }

        let parsed: TransferStatusResponse = resp
            .json()
            .await
            .context("Failed to parse ledger status response")?;

        Ok(StatusReport {
            status: LedgerStatus::from_wire(&parsed.status),
            reason: parsed.reason,
        })
    }

    fn name(&self) -> &str {
        SERVICE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
