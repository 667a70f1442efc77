//! Cover art selection and local staging.
//!
//! Artwork comes only from the audio file's own tags (see [`embedded`]).
//! Before upload it is staged as `{base}_cover.jpg` in the cover directory,
//! which is also the object key it is published under.

mod embedded;

pub use embedded::first_picture;

use std::path::{Path, PathBuf};

use crate::model::ObjectKey;

/// Raw image bytes pulled from a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    /// Raw image data (JPEG or PNG)
    pub data: Vec<u8>,
    /// MIME type as declared in the tag
    pub mime_type: String,
}

impl CoverArt {
    pub fn is_jpeg(&self) -> bool {
        self.mime_type == "image/jpeg"
    }
}

/// Write cover art to `{cover_dir}/{base}_cover.jpg`, replacing any previous copy.
///
/// Returns the staged path and the key it should be uploaded under.
pub async fn stage(
    cover_dir: &Path,
    base_name: &str,
    art: &CoverArt,
) -> std::io::Result<(PathBuf, ObjectKey)> {
    let key = ObjectKey::cover(base_name);
    let path = cover_dir.join(key.as_str());

    tokio::fs::create_dir_all(cover_dir).await?;
    tokio::fs::write(&path, &art.data).await?;

    Ok((path, key))
}
