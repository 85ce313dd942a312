//! HTTP plumbing shared by the REST providers.

use std::time::Duration;

use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::ProviderCallResult;
use crate::error::{PricingError, PricingResult};

/// Build a JSON client whose every request is bounded by `timeout`.
pub(crate) fn build_client(timeout: Duration) -> PricingResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PricingError::Configuration(format!("HTTP client: {e}")))
}

/// Send `request` and decode a JSON body, classifying every failure.
pub(crate) async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> ProviderCallResult<T> {
    let response = match request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return ProviderCallResult::TransientError(e.to_string()),
    };

    let status = response.status();
    if !status.is_success() {
        return classify_status(status, response.headers().get(RETRY_AFTER));
    }

    match response.json::<T>().await {
        Ok(body) => ProviderCallResult::Ok(body),
        Err(e) => ProviderCallResult::TransientError(format!("malformed payload: {e}")),
    }
}

/// Map a non-success status onto a call result.
///
/// Coinbase answers 400 for currency codes it does not know, so 400 is read
/// the same as 404.
pub(crate) fn classify_status<T>(
    status: StatusCode,
    retry_after: Option<&HeaderValue>,
) -> ProviderCallResult<T> {
    match status {
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => ProviderCallResult::Unsupported,
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderCallResult::RateLimited(retry_after.and_then(parse_retry_after))
        }
        _ => ProviderCallResult::TransientError(format!("HTTP {status}")),
    }
}

/// Positive price or a malformed-payload error.
pub(crate) fn positive_price(value: f64) -> ProviderCallResult<f64> {
    if value.is_finite() && value > 0.0 {
        ProviderCallResult::Ok(value)
    } else {
        ProviderCallResult::TransientError(format!("malformed payload: price {value}"))
    }
}

/// Only the delay-seconds form is honoured; HTTP dates fall back to the
/// default backoff.
fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    value
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
