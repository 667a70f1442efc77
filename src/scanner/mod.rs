//! Input discovery.
//!
//! Finds every supported audio file under the input directory and checks
//! that no two of them share a base name. Derived object keys only use the
//! extension-stripped name, so `track.mp3` and `track.wav` would otherwise
//! overwrite each other's artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::model::SourceFile;

/// Extensions accepted as audio input (lowercase, without the dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "aac", "ogg"];

/// Errors that stop discovery.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to read input directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Input files share a base name: {}", describe_collisions(.0))]
    DuplicateBaseNames(Vec<BaseNameCollision>),
}

/// Two or more inputs that would map to the same object keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseNameCollision {
    pub base_name: String,
    pub paths: Vec<PathBuf>,
}

fn describe_collisions(collisions: &[BaseNameCollision]) -> String {
    collisions
        .iter()
        .map(|c| {
            let files: Vec<String> = c
                .paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            format!("'{}' ({})", c.base_name, files.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check if a path has a supported audio extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Discover audio inputs in `root`, sorted by path.
///
/// Only top-level files are considered unless `recursive` is set. A missing
/// root yields an empty list. Fails if two inputs share a base name.
pub fn discover(root: &Path, recursive: bool) -> Result<Vec<SourceFile>, ScanError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut sources = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| ScanError::ReadDir {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }
        if let Some(source) = SourceFile::from_path(entry.path()) {
            sources.push(source);
        }
    }

    debug!(target: "music_sync::scanner", root = %root.display(), found = sources.len(), recursive, "Scanned input directory");
    ensure_unique_base_names(&sources)?;
    Ok(sources)
}

/// Reject inputs whose base names collide.
pub fn ensure_unique_base_names(sources: &[SourceFile]) -> Result<(), ScanError> {
    let mut by_name: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for source in sources {
        by_name
            .entry(source.base_name.as_str())
            .or_default()
            .push(source.path.clone());
    }

    let collisions: Vec<BaseNameCollision> = by_name
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(name, paths)| BaseNameCollision {
            base_name: name.to_string(),
            paths,
        })
        .collect();

    if collisions.is_empty() {
        Ok(())
    } else {
        Err(ScanError::DuplicateBaseNames(collisions))
    }
}
