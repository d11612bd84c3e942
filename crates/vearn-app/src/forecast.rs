//! Trades forecast client.
//!
//! The forecast service precomputes candidate swap strategies per account:
//!
//! ```text
//! GET <endpoint>?account=<address>
//! -> { "txFee": "<wei>", "solutions": [ { "protocolFee", "dexFee", ... } ] } | null
//! ```
//!
//! A `null` body or a non-200 status means "no solutions" and yields an
//! empty forecast. Transport and parse failures are errors.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use vearn_common::Forecast;

/// Request timeout for forecast calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ForecastError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Body was not a forecast.
    #[error("Invalid forecast response: {0}")]
    Json(String),
}

/// Anything that can produce a forecast for an account.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, account: Address) -> Result<Forecast, ForecastError>;
}

/// HTTP client for the forecast service.
pub struct ForecastClient {
    http: Client,
    url: String,
}

impl ForecastClient {
    pub fn new(url: &str) -> Result<Self, ForecastError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.trim().to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Decode a forecast body; `null` is an empty forecast.
pub fn parse_forecast(body: &str) -> Result<Forecast, ForecastError> {
    let parsed: Option<Forecast> =
        serde_json::from_str(body).map_err(|e| ForecastError::Json(e.to_string()))?;
    Ok(parsed.unwrap_or_default())
}

#[async_trait]
impl ForecastSource for ForecastClient {
    async fn fetch(&self, account: Address) -> Result<Forecast, ForecastError> {
        let account = account.to_string().to_lowercase();
        debug!(url = %self.url, account = %account, "Fetching trades forecast");

        let response = self
            .http
            .get(&self.url)
            .query(&[("account", account.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Forecast service returned no forecast");
            return Ok(Forecast::default());
        }

        let body = response.text().await?;
        let forecast = parse_forecast(&body)?;
        debug!(solutions = forecast.solutions.len(), "Forecast received");
        Ok(forecast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[test]
    fn test_parse_null_is_empty() {
        let forecast = parse_forecast("null").unwrap();
        assert!(forecast.is_empty());
        assert_eq!(forecast.tx_fee, U256::ZERO);
    }

    #[test]
    fn test_parse_forecast() {
        let body = r#"{
            "txFee": "1500000000000000000",
            "solutions": [{
                "protocolFee": "300000000000000000",
                "dexFee": "299100000000000000",
                "amountInWithFees": "98900900000000000000",
                "deltaVET": "1938317550000000000",
                "stepsCount": 12,
                "withdrawAmount": "100000000000000000000",
                "totalProfitVET": "23000000000000000000"
            }]
        }"#;
        let forecast = parse_forecast(body).unwrap();
        assert_eq!(forecast.tx_fee, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(forecast.solutions.len(), 1);
        assert_eq!(forecast.solutions[0].steps_count, 12);
        assert_eq!(
            forecast.solutions[0].withdraw_amount,
            U256::from(100_000_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(matches!(parse_forecast("<html>"), Err(ForecastError::Json(_))));
    }

    #[test]
    fn test_client_keeps_url() {
        let client = ForecastClient::new(" https://api.example/forecast ").unwrap();
        assert_eq!(client.url(), "https://api.example/forecast");
    }
}
