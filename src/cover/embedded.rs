//! Select cover art embedded in audio file tags.
//!
//! lofty exposes pictures from:
//! - ID3v2 tags (MP3)
//! - Vorbis comments (FLAC, OGG)
//! - MP4 atoms (M4A/AAC)

use lofty::picture::MimeType;
use lofty::tag::Tag;

use super::CoverArt;

/// Take the first embedded picture of a tag.
///
/// Only one picture is published per track: the first one wins, whatever
/// its picture type.
pub fn first_picture(tag: &Tag) -> Option<CoverArt> {
    let picture = tag.pictures().first()?;
    if picture.data().is_empty() {
        return None;
    }

    let mime_type = match picture.mime_type() {
        Some(MimeType::Jpeg) => "image/jpeg",
        Some(MimeType::Png) => "image/png",
        Some(MimeType::Gif) => "image/gif",
        Some(MimeType::Bmp) => "image/bmp",
        Some(MimeType::Tiff) => "image/tiff",
        _ => "image/jpeg", // Default assumption
    };

    Some(CoverArt {
        data: picture.data().to_vec(),
        mime_type: mime_type.to_string(),
    })
}
