//! Realtime Database REST client for the per-user record collection.
//!
//! Layout: `{database_url}/records/{userId}/{recordId}.json?auth={token}`.
//! - `GET` on the collection returns an object keyed by record id, or `null`
//! - `POST` on the collection returns `{"name": "<generated id>"}`
//! - `PATCH` / `DELETE` on a record path

use crate::entry::{Category, EntryDraft, LedgerEntry, NewEntry};
use crate::store::{LedgerStore, SyncContext};
use crate::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracker_config_and_utils::ValidationError;

/// REST client for the hosted record database.
#[derive(Clone)]
pub struct RealtimeLedgerStore {
    http_client: reqwest::Client,
    database_url: String,
}

/// Record as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    created_at: i64,
}

impl WireRecord {
    fn from_new(entry: &NewEntry) -> Self {
        Self {
            amount: entry.amount,
            description: entry.description.clone(),
            category: entry.category.as_str().to_string(),
            created_at: entry.created_at.timestamp_millis(),
        }
    }

    fn from_entry(entry: &LedgerEntry) -> Self {
        Self {
            amount: entry.amount,
            description: entry.description.clone(),
            category: entry.category.as_str().to_string(),
            created_at: entry.created_at.timestamp_millis(),
        }
    }

    /// Check the record against the entry invariants local input must meet.
    fn into_entry(self, id: String) -> Result<LedgerEntry, ValidationError> {
        let category = self.category.parse().unwrap_or_else(|_| {
            tracing::debug!(record_id = %id, category = %self.category, "unknown category, using Other");
            Category::Other
        });
        let created_at = millis_to_datetime(self.created_at);
        let draft = EntryDraft {
            amount: self.amount,
            description: self.description,
            category,
            created_at: Some(created_at),
        };
        Ok(draft.validate(created_at)?.with_id(id))
    }
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

impl RealtimeLedgerStore {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `database_url` - Database root URL (e.g., `https://project-default-rtdb.firebaseio.com`)
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            database_url: database_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, user_id: &str) -> String {
        format!("{}/records/{}.json", self.database_url, user_id)
    }

    fn record_url(&self, user_id: &str, id: &str) -> String {
        format!("{}/records/{}/{}.json", self.database_url, user_id, id)
    }

    /// Turn a non-success response into a [`SyncError`].
    async fn rejection(operation: &str, response: reqwest::Response) -> SyncError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_default();
        let error = error_for_status(status, message);
        tracing::warn!(operation, status = %status, kind = %error.kind(), "record request rejected");
        error
    }
}

fn error_for_status(status: StatusCode, message: String) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::ExpiredSession,
        StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            SyncError::Conflict(if message.is_empty() {
                status.to_string()
            } else {
                message
            })
        }
        _ => SyncError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

/// Decode a collection body, skipping records that do not parse or break
/// the entry invariants.
fn decode_collection(body: &str) -> SyncResult<Vec<LedgerEntry>> {
    let raw: Option<BTreeMap<String, serde_json::Value>> = serde_json::from_str(body)?;
    let mut entries = Vec::new();
    for (id, value) in raw.unwrap_or_default() {
        let record = match serde_json::from_value::<WireRecord>(value) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(record_id = %id, error = %e, "skipping malformed record");
                continue;
            }
        };
        match record.into_entry(id.clone()) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(record_id = %id, error = %e, "skipping invalid record"),
        }
    }
    Ok(entries)
}

#[async_trait]
impl LedgerStore for RealtimeLedgerStore {
    async fn list(&self, ctx: &SyncContext) -> SyncResult<Vec<LedgerEntry>> {
        let response = self
            .http_client
            .get(self.collection_url(&ctx.user_id))
            .query(&[("auth", ctx.token.as_str())])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection("list", response).await);
        }

        let body = response.text().await?;
        let entries = decode_collection(&body)?;
        tracing::debug!(user_id = %ctx.user_id, count = entries.len(), "fetched records");
        Ok(entries)
    }

    async fn create(&self, ctx: &SyncContext, entry: &NewEntry) -> SyncResult<String> {
        let response = self
            .http_client
            .post(self.collection_url(&ctx.user_id))
            .query(&[("auth", ctx.token.as_str())])
            .json(&WireRecord::from_new(entry))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection("create", response).await);
        }

        let pushed: PushResponse = response.json().await?;
        Ok(pushed.name)
    }

    async fn update(&self, ctx: &SyncContext, entry: &LedgerEntry) -> SyncResult<()> {
        let response = self
            .http_client
            .patch(self.record_url(&ctx.user_id, &entry.id))
            .query(&[("auth", ctx.token.as_str())])
            .json(&WireRecord::from_entry(entry))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection("update", response).await);
        }
        Ok(())
    }

    async fn delete(&self, ctx: &SyncContext, id: &str) -> SyncResult<()> {
        let response = self
            .http_client
            .delete(self.record_url(&ctx.user_id, id))
            .query(&[("auth", ctx.token.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection("delete", response).await);
        }
        Ok(())
    }
}
