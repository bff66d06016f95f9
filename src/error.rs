use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network unreachable, connection reset, or the request timed out.
    #[error("request failed: {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("service returned {status} for {url}")]
    Service { status: u16, url: String },

    #[error("unexpected response from {url}: {message}")]
    Parse { url: String, message: String },

    /// The chapter has no resolvable image set.
    #[error("chapter {chapter_id} has no usable manifest: {message}")]
    Manifest { chapter_id: String, message: String },

    #[error("filesystem error at {}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
