use std::collections::HashSet;
use std::path::Path;

use crate::error::FetchError;

const STAGING_PREFIX: &str = ".renumber-";

/// How downloaded pages are ordered before renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SequenceOrder {
    /// Page order declared by the chapter manifest.
    #[default]
    Manifest,
    /// Byte-wise order of the current file names.
    Lexicographic,
}

/// `NNN.<ext>` for the zero-based `index`; widens past 999 pages so names keep sorting.
pub fn sequenced_name(index: usize, total: usize, original: &str) -> String {
    let width = total.to_string().len().max(3);
    let ext = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("jpg");
    format!("{:0width$}.{ext}", index + 1)
}

pub fn renumber(dir: &Path, order: SequenceOrder, manifest: &[String]) -> Result<usize, FetchError> {
    match order {
        SequenceOrder::Manifest => renumber_in_manifest_order(dir, manifest),
        SequenceOrder::Lexicographic => renumber_lexicographic(dir),
    }
}

/// Renames every regular file in `dir` to its position in sorted name order.
pub fn renumber_lexicographic(dir: &Path) -> Result<usize, FetchError> {
    let mut names = list_file_names(dir)?;
    names.sort();

    let total = names.len();
    let plan = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let target = sequenced_name(idx, total, &name);
            (name, target)
        })
        .filter(|(from, to)| from != to)
        .collect::<Vec<_>>();

    apply_renames(dir, plan)
}

/// Renames manifest pages present in `dir` to their manifest position. Files the manifest
/// does not name, including pages already renumbered, are left alone.
pub fn renumber_in_manifest_order(dir: &Path, manifest: &[String]) -> Result<usize, FetchError> {
    let present: HashSet<String> = list_file_names(dir)?.into_iter().collect();
    let total = manifest.len();

    let mut planned_sources = HashSet::new();
    let mut plan = Vec::new();
    for (idx, filename) in manifest.iter().enumerate() {
        if !present.contains(filename) || !planned_sources.insert(filename.as_str()) {
            continue;
        }
        let target = sequenced_name(idx, total, filename);
        if &target == filename {
            continue;
        }
        if present.contains(&target) && !manifest.contains(&target) {
            tracing::warn!(
                dir = %dir.display(),
                page = %filename,
                %target,
                "sequence target already taken by another file; leaving page name unchanged"
            );
            continue;
        }
        plan.push((filename.clone(), target));
    }

    apply_renames(dir, plan)
}

fn list_file_names(dir: &Path) -> Result<Vec<String>, FetchError> {
    let entries = std::fs::read_dir(dir).map_err(|err| FetchError::filesystem(dir, err))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| FetchError::filesystem(dir, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| FetchError::filesystem(entry.path(), err))?;
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if is_staging_name(&name) => {
                tracing::warn!(dir = %dir.display(), %name, "ignoring leftover renumber file");
            }
            Ok(name) => names.push(name),
            Err(name) => {
                tracing::warn!(?name, "skipping non UTF-8 file name");
            }
        }
    }
    Ok(names)
}

/// Temporary names left behind by an interrupted renumber are not pages.
pub(crate) fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

/// Two passes through temporary names so a target that is also a source is never clobbered.
fn apply_renames(dir: &Path, plan: Vec<(String, String)>) -> Result<usize, FetchError> {
    if plan.is_empty() {
        return Ok(0);
    }

    let token = uuid::Uuid::new_v4().simple().to_string();
    let mut staged = Vec::with_capacity(plan.len());
    for (idx, (from, to)) in plan.into_iter().enumerate() {
        let from_path = dir.join(&from);
        let tmp_path = dir.join(format!("{STAGING_PREFIX}{token}-{idx}"));
        std::fs::rename(&from_path, &tmp_path)
            .map_err(|err| FetchError::filesystem(&from_path, err))?;
        staged.push((tmp_path, dir.join(to)));
    }

    let renamed = staged.len();
    for (tmp_path, to_path) in staged {
        std::fs::rename(&tmp_path, &to_path).map_err(|err| FetchError::filesystem(&to_path, err))?;
    }

    tracing::debug!(dir = %dir.display(), renamed, "renumbered pages");
    Ok(renamed)
}
