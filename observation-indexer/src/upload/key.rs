//! Blob key layout for uploaded media.

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

const UNKNOWN_CAMERA: &str = "unknown";
const DEFAULT_STEM: &str = "upload";
const SUFFIX_LEN: usize = 12;

/// Build the storage key for an uploaded file:
/// `uploads/{cameraId}/{yyyy}/{mm}/{dd}/{stem}-{suffix}{ext}`.
///
/// The date is the upload date in UTC. The suffix is 12 random hex
/// characters, so two uploads of the same file never collide.
pub fn blob_key(
    camera_id: Option<&str>,
    now: DateTime<Utc>,
    original_name: Option<&str>,
) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    blob_key_with_suffix(camera_id, now, original_name, &suffix[..SUFFIX_LEN])
}

fn blob_key_with_suffix(
    camera_id: Option<&str>,
    now: DateTime<Utc>,
    original_name: Option<&str>,
    suffix: &str,
) -> String {
    let camera = camera_id
        .map(sanitize)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| UNKNOWN_CAMERA.to_string());
    let (stem, ext) = split_name(original_name.unwrap_or_default());

    format!(
        "uploads/{}/{:04}/{:02}/{:02}/{}-{}{}",
        camera,
        now.year(),
        now.month(),
        now.day(),
        stem,
        suffix,
        ext
    )
}

/// Split a client-supplied file name into a safe stem and a lowercase `.ext`.
fn split_name(original: &str) -> (String, String) {
    // Browsers may send a full path; keep only the last component.
    let file = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => {
            (stem, format!(".{}", sanitize(ext).to_lowercase()))
        }
        _ => (file, String::new()),
    };

    let stem = sanitize(stem);
    let stem = if stem.is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        stem
    };
    (stem, ext)
}

fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
