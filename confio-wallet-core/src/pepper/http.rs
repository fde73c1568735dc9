//! JSON-over-HTTPS implementation of the pepper boundary.
//!
//! A thin client with sensible defaults (timeout, user-agent, HTTPS
//! enforcement). Deliberately retry-free: the session owns all retry and
//! backoff policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{error::WalletError, Environment};

use super::{DerivationPepper, KekPepper, PepperClient};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct DerivationPepperResponse {
    pepper: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KekPepperResponse {
    pepper: String,
    version: u32,
    #[serde(default)]
    is_rotated: bool,
    #[serde(default)]
    grace_period_until: Option<u64>,
}

/// Pepper client speaking the wallet API's JSON endpoints.
pub struct HttpPepperClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPepperClient {
    /// Creates a client against the given environment's API host.
    #[must_use]
    pub fn new(environment: &Environment) -> Self {
        Self::with_base_url(environment.api_base_url())
    }

    /// Creates a client against an explicit base URL. Non-HTTPS URLs are only
    /// accepted for loopback hosts.
    ///
    /// # Panics
    ///
    /// Panics if the URL is neither HTTPS nor loopback.
    #[must_use]
    pub fn with_base_url<U: Into<String>>(base_url: U) -> Self {
        let base_url = base_url.into();
        assert!(
            base_url.starts_with("https://")
                || base_url.contains("127.0.0.1")
                || base_url.contains("localhost"),
            "pepper service URL must be HTTPS"
        );
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, WalletError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .header(
                "User-Agent",
                format!("confio-wallet-core/{}", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await
            .map_err(|err| WalletError::pepper_fetch(format!("{url}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::pepper_fetch(format!(
                "{url}: unexpected status {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| WalletError::pepper_fetch(format!("{url}: malformed response: {err}")))
    }
}

#[async_trait]
impl PepperClient for HttpPepperClient {
    async fn get_derivation_pepper(&self) -> Result<DerivationPepper, WalletError> {
        let response: DerivationPepperResponse =
            self.get_json("/v1/wallet/derivation-pepper", &[]).await?;
        if response.pepper.is_empty() {
            return Err(WalletError::pepper_fetch(
                "server returned an empty derivation pepper",
            ));
        }
        Ok(DerivationPepper::new(response.pepper))
    }

    async fn get_kek_pepper(
        &self,
        requested_version: Option<u32>,
    ) -> Result<KekPepper, WalletError> {
        let mut query = Vec::new();
        if let Some(version) = requested_version {
            query.push(("version", version.to_string()));
        }
        let response: KekPepperResponse =
            self.get_json("/v1/wallet/kek-pepper", &query).await?;
        if response.pepper.is_empty() {
            return Err(WalletError::pepper_fetch(
                "server returned an empty KEK pepper",
            ));
        }

        let mut pepper = KekPepper::new(response.pepper, response.version);
        if response.is_rotated {
            pepper = pepper.rotated();
        }
        if let Some(until) = response.grace_period_until {
            pepper = pepper.with_grace_period(until);
        }
        Ok(pepper)
    }
}
