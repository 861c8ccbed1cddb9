//! Lead records handed to the CRM side when a call ends.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::transport::CallMetadata;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("Lead is missing phone and email")]
    NotActionable,

    #[error("Lead webhook request failed: {0}")]
    Network(String),

    #[error("Lead webhook returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl LeadRecord {
    /// A lead can be followed up only with a phone number or an email.
    pub fn is_actionable(&self) -> bool {
        present(&self.phone) || present(&self.email)
    }

    /// Build a record from what the call itself tells us.
    pub fn from_call(call: Option<&CallMetadata>, utterances: &[String]) -> Self {
        let phone = call
            .and_then(CallMetadata::caller_number)
            .map(|n| n.trim().to_string());

        let mut notes = Vec::new();
        if let Some(call) = call.filter(|c| !c.call_sid.is_empty()) {
            notes.push(format!("Voice call {}", call.call_sid));
        }
        notes.extend(
            utterances
                .iter()
                .map(|u| u.trim())
                .filter(|u| !u.is_empty())
                .map(|u| format!("Caller: {u}")),
        );

        Self {
            phone,
            notes: (!notes.is_empty()).then(|| notes.join("\n")),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn submit(&self, lead: &LeadRecord) -> Result<(), LeadError>;
}

#[derive(Debug, Clone, Default)]
pub struct LoggingLeadSink;

#[async_trait]
impl LeadSink for LoggingLeadSink {
    async fn submit(&self, lead: &LeadRecord) -> Result<(), LeadError> {
        if !lead.is_actionable() {
            return Err(LeadError::NotActionable);
        }
        info!(
            has_phone = present(&lead.phone),
            has_email = present(&lead.email),
            "Lead captured"
        );
        Ok(())
    }
}

/// POSTs lead records as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookLeadSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookLeadSink {
    pub fn new(url: impl Into<String>) -> Result<Self, LeadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LeadError::Network(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LeadSink for WebhookLeadSink {
    async fn submit(&self, lead: &LeadRecord) -> Result<(), LeadError> {
        if !lead.is_actionable() {
            return Err(LeadError::NotActionable);
        }

        let response = self
            .client
            .post(&self.url)
            .json(lead)
            .send()
            .await
            .map_err(|e| LeadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
