use std::time::Duration;

use anyhow::Context as _;

pub const DEFAULT_API_URL: &str = "https://api.mangadex.org";
pub const DEFAULT_UPLOADS_URL: &str = "https://uploads.mangadex.org";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRIES: u32 = 2;
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub uploads_url: String,
    pub language: String,
    pub timeout: Duration,
    /// Extra attempts after a transport failure. Service errors are never retried.
    pub retries: u32,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            uploads_url: DEFAULT_UPLOADS_URL.to_owned(),
            language: DEFAULT_LANGUAGE.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            user_agent: format!("mangafetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(api_url) = std::env::var("MANGAFETCH_API_URL") {
            config.api_url = api_url;
        }
        if let Ok(uploads_url) = std::env::var("MANGAFETCH_UPLOADS_URL") {
            config.uploads_url = uploads_url;
        }
        if let Ok(language) = std::env::var("MANGAFETCH_LANGUAGE") {
            config.language = language;
        }
        if let Ok(raw) = std::env::var("MANGAFETCH_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid MANGAFETCH_TIMEOUT_SECS={raw:?}"))?;
            config.timeout = Duration::from_secs(secs.max(1));
        }
        if let Ok(raw) = std::env::var("MANGAFETCH_RETRIES") {
            config.retries = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid MANGAFETCH_RETRIES={raw:?}"))?;
        }
        config.normalize()
    }

    /// Applies command-line overrides on top of the environment.
    pub fn with_overrides(
        mut self,
        api_url: Option<&str>,
        language: Option<&str>,
    ) -> anyhow::Result<Self> {
        if let Some(api_url) = api_url {
            self.api_url = api_url.to_owned();
        }
        if let Some(language) = language {
            self.language = language.to_owned();
        }
        self.normalize()
    }

    fn normalize(mut self) -> anyhow::Result<Self> {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_owned();
        self.uploads_url = self.uploads_url.trim().trim_end_matches('/').to_owned();
        self.language = self.language.trim().to_owned();

        for (name, value) in [("api url", &self.api_url), ("uploads url", &self.uploads_url)] {
            let parsed =
                url::Url::parse(value).with_context(|| format!("parse {name}: {value:?}"))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                anyhow::bail!("{name} must be http/https: {value}");
            }
        }
        if self.language.is_empty() {
            anyhow::bail!("language must not be empty");
        }
        if self.retries > MAX_RETRIES {
            tracing::warn!(requested = self.retries, max = MAX_RETRIES, "capping retries");
            self.retries = MAX_RETRIES;
        }
        Ok(self)
    }
}
