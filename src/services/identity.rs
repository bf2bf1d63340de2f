//! Image identity generation and storage key derivation.

use uuid::Uuid;

/// Filename used when the uploader does not supply one.
pub const DEFAULT_FILENAME: &str = "image.jpg";

/// Root prefix of every storage key.
const KEY_ROOT: &str = "images";

/// Longest segment emitted, leaving room under the 255-byte filename limit
/// for the blob store's sidecar and temp-file names.
pub const MAX_SEGMENT_BYTES: usize = 200;

/// Extensions up to this length survive truncation of an over-long segment.
const MAX_KEPT_EXTENSION_BYTES: usize = 16;

/// Blob store sidecar suffix; no derived key may end with it.
const RESERVED_SUFFIX: &str = ".content-type";

/// Generate a fresh image identifier (random 128-bit UUID v4).
pub fn new_identity() -> String {
    Uuid::new_v4().to_string()
}

/// Build the storage key `images/{owner}/{image_id}/{filename}`.
///
/// Pure and total. Each segment is sanitised so the key is always a safe
/// relative path the blob store accepts; the `image_id` segment keeps keys for
/// distinct images apart.
pub fn derive_key(owner_id: &str, image_id: &str, filename: Option<&str>) -> String {
    let filename = match filename {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_FILENAME,
    };
    format!(
        "{}/{}/{}/{}",
        KEY_ROOT,
        sanitize_segment(owner_id),
        sanitize_segment(image_id),
        escape_reserved_suffix(sanitize_segment(filename))
    )
}

/// Replace separators and control bytes with `_`; collapse `.`/`..`/empty;
/// cap the length at [`MAX_SEGMENT_BYTES`].
fn sanitize_segment(segment: &str) -> String {
    if segment.is_empty() || segment == "." || segment == ".." {
        return "_".to_string();
    }
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    truncate_segment(cleaned)
}

/// Shorten `segment` to at most [`MAX_SEGMENT_BYTES`], keeping a short
/// extension so the stored name still hints at its type.
fn truncate_segment(segment: String) -> String {
    if segment.len() <= MAX_SEGMENT_BYTES {
        return segment;
    }
    let extension = match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= MAX_KEPT_EXTENSION_BYTES => ext,
        _ => "",
    };
    let budget = if extension.is_empty() {
        MAX_SEGMENT_BYTES
    } else {
        MAX_SEGMENT_BYTES - extension.len() - 1
    };
    let mut end = budget;
    while !segment.is_char_boundary(end) {
        end -= 1;
    }
    if extension.is_empty() {
        segment[..end].to_string()
    } else {
        format!("{}.{}", &segment[..end], extension)
    }
}

/// `photo.content-type` becomes `photo_content-type`.
fn escape_reserved_suffix(segment: String) -> String {
    match segment.strip_suffix(RESERVED_SUFFIX) {
        Some(stem) => format!("{stem}_{}", &RESERVED_SUFFIX[1..]),
        None => segment,
    }
}
