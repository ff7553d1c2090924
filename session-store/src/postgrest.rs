//! Minimal PostgREST client (Supabase-style).
//!
//! Covers exactly the operations the stores need: idempotent upsert,
//! filtered select, and filtered update. All requests carry the service key
//! as both `apikey` and bearer token.

use reqwest::Client;
use serde_json::Value;

use crate::errors::StoreResult;

/// Connection settings for one PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Endpoint base, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Thin request helper over `reqwest`.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    cfg: PostgrestConfig,
    http: Client,
}

impl PostgrestClient {
    pub fn new(cfg: PostgrestConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { cfg, http })
    }

    /// Builds a client from `SUPABASE_URL` / `SUPABASE_SERVICE_KEY`, or
    /// `None` when either is missing (callers fall back to memory).
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok().filter(|v| !v.trim().is_empty())?;
        let api_key = std::env::var("SUPABASE_SERVICE_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Self::new(PostgrestConfig {
            base_url,
            api_key,
            timeout_secs: 30,
        })
        .ok()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.cfg.base_url.trim_end_matches('/'), table)
    }

    /// Upsert on the conflict column; returns the written rows.
    pub async fn upsert(
        &self,
        table: &str,
        conflict_col: &str,
        row: &Value,
    ) -> StoreResult<Vec<Value>> {
        let resp = self
            .http
            .post(format!("{}?on_conflict={}", self.table_url(table), conflict_col))
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(row)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// `SELECT * WHERE col = value`, optionally ordered.
    pub async fn select_eq(
        &self,
        table: &str,
        col: &str,
        value: &str,
        order: Option<&str>,
    ) -> StoreResult<Vec<Value>> {
        let mut url = format!("{}?select=*&{}=eq.{}", self.table_url(table), col, value);
        if let Some(order) = order {
            url.push_str(&format!("&order={order}"));
        }
        let resp = self
            .http
            .get(url)
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// `SELECT * WHERE col IN (values…)`.
    pub async fn select_in(
        &self,
        table: &str,
        col: &str,
        values: &[&str],
    ) -> StoreResult<Vec<Value>> {
        let url = format!(
            "{}?select=*&{}=in.({})",
            self.table_url(table),
            col,
            values.join(",")
        );
        let resp = self
            .http
            .get(url)
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// `UPDATE … WHERE col = value` with a partial patch.
    pub async fn update_eq(
        &self,
        table: &str,
        col: &str,
        value: &str,
        patch: &Value,
    ) -> StoreResult<()> {
        self.http
            .patch(format!("{}?{}=eq.{}", self.table_url(table), col, value))
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .json(patch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
