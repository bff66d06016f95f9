use std::sync::Arc;

use serde_json::Value;

use crate::catalog::endpoint;
use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::formats::AssetManifest;
use crate::transport::{Transport, get_json};

pub struct AssetResolver {
    transport: Arc<dyn Transport>,
    api_url: String,
}

impl AssetResolver {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            api_url: config.api_url.clone(),
        }
    }

    pub fn resolve_manifest(&self, chapter_id: &str) -> Result<AssetManifest, FetchError> {
        let url = endpoint(&self.api_url, &["at-home", "server", chapter_id])?;
        let value = get_json(self.transport.as_ref(), &url)?;
        parse_manifest(chapter_id, &value)
    }
}

fn parse_manifest(chapter_id: &str, value: &Value) -> Result<AssetManifest, FetchError> {
    let missing = |message: &str| FetchError::Manifest {
        chapter_id: chapter_id.to_owned(),
        message: message.to_owned(),
    };

    let base_url = value
        .get("baseUrl")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("missing baseUrl"))?;
    let hash = value
        .pointer("/chapter/hash")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("missing chapter hash"))?;
    let filenames = value
        .pointer("/chapter/data")
        .and_then(Value::as_array)
        .map(|data| {
            data.iter()
                .filter_map(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if filenames.is_empty() {
        return Err(missing("no page filenames"));
    }

    Ok(AssetManifest {
        base_url: base_url.trim_end_matches('/').to_owned(),
        hash: hash.to_owned(),
        filenames,
    })
}
