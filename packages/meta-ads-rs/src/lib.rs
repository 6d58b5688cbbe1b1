//! Meta Marketing API client.
//!
//! Covers the small slice of the Graph API the automation engine needs:
//! reading an ad set and flipping ad-set/campaign delivery status.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

/// Errors surfaced by the Meta Ads client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("meta ads error {status}: {message}")]
    Api {
        status: u16,
        retry_after_ms: Option<u64>,
        message: String,
    },
}

/// Delivery status accepted by ad-set and campaign updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Active,
    Paused,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Active => "ACTIVE",
            DeliveryStatus::Paused => "PAUSED",
        }
    }
}

/// Ad set details returned by [`MetaAdsClient::get_ad_set`].
#[derive(Debug, Clone, Deserialize)]
pub struct AdSet {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub campaign_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: i64,
}

/// Meta Marketing API client. App credentials are held for token exchange
/// flows owned by the OAuth collaborator; data calls authenticate with the
/// per-user access token passed per request.
#[derive(Debug, Clone)]
pub struct MetaAdsClient {
    client: reqwest::Client,
    base_url: String,
    #[allow(dead_code)]
    app_id: String,
    #[allow(dead_code)]
    app_secret: String,
}

impl MetaAdsClient {
    pub fn new(app_id: String, app_secret: String) -> Result<Self, Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: GRAPH_URL.to_string(),
            app_id,
            app_secret,
        })
    }

    /// Override the base URL (for tests against a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch ad set details. Returns `Ok(None)` when the Graph API reports
    /// the object as missing (error code 100) or responds 404.
    pub async fn get_ad_set(
        &self,
        ad_set_id: &str,
        access_token: &str,
    ) -> Result<Option<AdSet>, Error> {
        let url = format!("{}/{}", self.base_url, ad_set_id);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "id,name,status,campaign_id"),
                ("access_token", access_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let ad_set: AdSet = response.json().await?;
            return Ok(Some(ad_set));
        }

        let retry_after_ms = retry_after_ms(response.headers());
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 404 || is_missing_object(&body) {
            return Ok(None);
        }

        Err(Error::Api {
            status: status.as_u16(),
            retry_after_ms,
            message: graph_message(&body),
        })
    }

    /// Update ad set delivery status.
    pub async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: DeliveryStatus,
        access_token: &str,
    ) -> Result<(), Error> {
        self.post_status(ad_set_id, status, access_token).await
    }

    /// Update campaign delivery status.
    pub async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: DeliveryStatus,
        access_token: &str,
    ) -> Result<(), Error> {
        self.post_status(campaign_id, status, access_token).await
    }

    async fn post_status(
        &self,
        object_id: &str,
        status: DeliveryStatus,
        access_token: &str,
    ) -> Result<(), Error> {
        let url = format!("{}/{}", self.base_url, object_id);
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("status", status.as_str());
        form.insert("access_token", access_token);

        let response = self.client.post(&url).form(&form).send().await?;

        let http_status = response.status();
        if http_status.is_success() {
            return Ok(());
        }

        let retry_after_ms = retry_after_ms(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: http_status.as_u16(),
            retry_after_ms,
            message: graph_message(&body),
        })
    }
}

/// Graph API reports unknown objects with error code 100.
fn is_missing_object(body: &str) -> bool {
    serde_json::from_str::<GraphErrorResponse>(body)
        .map(|e| e.error.code == 100)
        .unwrap_or(false)
}

fn graph_message(body: &str) -> String {
    serde_json::from_str::<GraphErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}
