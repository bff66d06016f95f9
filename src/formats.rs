use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaRef {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: String,
    /// Kept as reported; may be absent, empty or non-numeric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub base_url: String,
    pub hash: String,
    /// Page order.
    pub filenames: Vec<String>,
}

impl AssetManifest {
    pub fn page_url(&self, filename: &str) -> String {
        format!(
            "{}/data/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.hash,
            filename
        )
    }

    pub fn page_urls(&self) -> impl Iterator<Item = String> + '_ {
        self.filenames.iter().map(|filename| self.page_url(filename))
    }

    pub fn page_count(&self) -> usize {
        self.filenames.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default)]
    pub downloaded_chapters: Vec<String>,
}
