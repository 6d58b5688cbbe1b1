//! Google Ads API client.
//!
//! Status mutations for ad groups and campaigns via the REST surface of the
//! Google Ads API. Resource names follow the `customers/{cid}/adGroups/{id}`
//! convention; callers pass the composite `customer_id:object_id` ids the
//! rule targets store.

use serde::{Deserialize, Serialize};
use serde_json::json;

const API_URL: &str = "https://googleads.googleapis.com/v17";

/// Errors surfaced by the Google Ads client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("google ads error {status}: {message}")]
    Api {
        status: u16,
        retry_after_ms: Option<u64>,
        message: String,
    },
    #[error("invalid google ads id {0:?}, expected customer_id:object_id")]
    InvalidId(String),
}

/// Serving status accepted by ad-group and campaign mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Enabled,
    Paused,
}

impl ServingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServingStatus::Enabled => "ENABLED",
            ServingStatus::Paused => "PAUSED",
        }
    }
}

/// Google Ads API client. OAuth client credentials are held for the token
/// refresh flow owned by the OAuth collaborator; mutations authenticate with
/// the per-user access token passed per request.
#[derive(Debug, Clone)]
pub struct GoogleAdsClient {
    client: reqwest::Client,
    base_url: String,
    #[allow(dead_code)]
    client_id: String,
    #[allow(dead_code)]
    client_secret: String,
}

impl GoogleAdsClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: API_URL.to_string(),
            client_id,
            client_secret,
        })
    }

    /// Override the base URL (for tests against a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Update ad group serving status.
    pub async fn update_ad_group_status(
        &self,
        ad_group_id: &str,
        status: ServingStatus,
        access_token: &str,
    ) -> Result<(), Error> {
        let (customer_id, object_id) = split_id(ad_group_id)?;
        self.mutate(customer_id, "adGroups", object_id, status, access_token)
            .await
    }

    /// Update campaign serving status.
    pub async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: ServingStatus,
        access_token: &str,
    ) -> Result<(), Error> {
        let (customer_id, object_id) = split_id(campaign_id)?;
        self.mutate(customer_id, "campaigns", object_id, status, access_token)
            .await
    }

    async fn mutate(
        &self,
        customer_id: &str,
        resource: &str,
        object_id: &str,
        status: ServingStatus,
        access_token: &str,
    ) -> Result<(), Error> {
        let url = format!(
            "{}/customers/{}/{}:mutate",
            self.base_url, customer_id, resource
        );
        let resource_name = format!("customers/{}/{}/{}", customer_id, resource, object_id);
        let body = json!({
            "operations": [{
                "update": {
                    "resourceName": resource_name,
                    "status": status.as_str(),
                },
                "updateMask": "status",
            }]
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let http_status = response.status();
        if http_status.is_success() {
            return Ok(());
        }

        let retry_after_ms = retry_after_ms(response.headers());
        let message = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: http_status.as_u16(),
            retry_after_ms,
            message,
        })
    }
}

/// Targets store Google ids as `customer_id:object_id`. A bare id is
/// rejected rather than guessed at.
fn split_id(id: &str) -> Result<(&str, &str), Error> {
    id.split_once(':')
        .filter(|(customer, object)| !customer.is_empty() && !object.is_empty())
        .ok_or_else(|| Error::InvalidId(id.to_string()))
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}
