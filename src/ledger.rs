use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::FetchError;
use crate::formats::LedgerFile;

/// Chapter ids already downloaded, persisted after every completion.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    chapters: Vec<String>,
    seen: HashSet<String>,
}

impl Ledger {
    /// A missing or unreadable ledger starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<LedgerFile>(&bytes) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "ledger is unparsable; starting empty");
                    LedgerFile::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => LedgerFile::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ledger is unreadable; starting empty");
                LedgerFile::default()
            }
        };

        let mut ledger = Self {
            path,
            chapters: Vec::new(),
            seen: HashSet::new(),
        };
        for id in file.downloaded_chapters {
            ledger.insert(id);
        }
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, chapter_id: &str) -> bool {
        self.seen.contains(chapter_id)
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn chapters(&self) -> &[String] {
        &self.chapters
    }

    /// Returns once the ledger is durable on disk.
    pub fn record_completed(&mut self, chapter_id: &str) -> Result<(), FetchError> {
        if !self.insert(chapter_id.to_owned()) {
            return Ok(());
        }
        self.persist()
    }

    fn insert(&mut self, chapter_id: String) -> bool {
        if !self.seen.insert(chapter_id.clone()) {
            return false;
        }
        self.chapters.push(chapter_id);
        true
    }

    fn persist(&self) -> Result<(), FetchError> {
        let file = LedgerFile {
            downloaded_chapters: self.chapters.clone(),
        };
        write_json_atomic(&self.path, &file)
    }
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), FetchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| FetchError::filesystem(parent, err))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value)
        .map_err(|err| FetchError::parse(path.display().to_string(), err.to_string()))?;
    std::fs::write(&tmp_path, &data).map_err(|err| FetchError::filesystem(&tmp_path, err))?;
    std::fs::rename(&tmp_path, path).map_err(|err| FetchError::filesystem(path, err))?;
    Ok(())
}
