use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

use crate::config::ClientConfig;
use crate::error::FetchError;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Blocking byte-level access to the remote catalog and its image hosts.
pub trait Transport: Send + Sync {
    fn get(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

pub fn get_json(transport: &dyn Transport, url: &Url) -> Result<serde_json::Value, FetchError> {
    let body = transport.get(url)?;
    serde_json::from_slice(&body).map_err(|err| FetchError::parse(url.as_str(), err.to_string()))
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    user_agent: String,
    retries: u32,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| anyhow::anyhow!("build http client: {err}"))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            retries: config.retries,
        })
    }

    fn get_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let transport_err = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json, image/*;q=0.9, */*;q=0.8")
            .send()
            .map_err(transport_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Service {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().map_err(transport_err)?;
        Ok(bytes.to_vec())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0_u32;
        loop {
            tracing::debug!(%url, attempt, "GET");
            match self.get_once(url) {
                Err(err) if err.is_transport() && attempt < self.retries => {
                    let delay = retry_delay(attempt);
                    tracing::warn!(%url, ?delay, error = %err, "transport failure; retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Exponential backoff from `RETRY_BASE_DELAY`, capped at `MAX_RETRY_DELAY`.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}
