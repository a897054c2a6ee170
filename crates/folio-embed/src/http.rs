//! Shared HTTP plumbing for the OpenAI-compatible backends.

use std::time::Duration;

use folio_core::{Error, Result, ServiceError};

/// Client with connect/request timeouts and a `folio/{version}` user-agent.
pub fn default_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(request_timeout)
        .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::InvalidConfig(format!("cannot build HTTP client: {e}")))
}

pub fn transport_error(err: &reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(Duration::ZERO)
    } else {
        ServiceError::Transport(err.to_string())
    }
}

/// POST `body` as JSON with bearer auth and decode a successful JSON reply.
pub async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
) -> std::result::Result<R, ServiceError>
where
    B: serde::Serialize + ?Sized,
    R: serde::de::DeserializeOwned,
{
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(&e))?;

    let status = response.status();
    let text = response.text().await.map_err(|e| transport_error(&e))?;
    if !status.is_success() {
        tracing::debug!(%status, url, "service returned an error status");
        return Err(ServiceError::from_status(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(|e| ServiceError::Malformed(e.to_string()))
}
