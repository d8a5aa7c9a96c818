//! Uploaded file checks: declared type, size and content signature.

use crate::domain::error::{ErrorCode, ValidationResult};

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// How many leading bytes are scanned for embedded markup.
pub const CONTENT_SCAN_BYTES: usize = 1000;

/// Formats accepted for user uploads.
///
/// A subset of [`ImageType`]: GIF signatures are recognized by
/// [`validate_file_content`] but GIF uploads are refused by
/// [`validate_file_upload`].
pub const ALLOWED_UPLOAD_TYPES: [ImageType; 3] = [ImageType::Jpeg, ImageType::Png, ImageType::Webp];

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87A_MAGIC: &[u8] = b"GIF87a";
const GIF89A_MAGIC: &[u8] = b"GIF89a";
const RIFF_MAGIC: &[u8] = b"RIFF";
const WEBP_TAG: &[u8] = b"WEBP";

const SUSPICIOUS_MARKERS: [&str; 6] = [
    "<script",
    "javascript:",
    "<?php",
    "<iframe",
    "<object",
    "<embed",
];

/// Image formats with a known signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// `image/jpeg`
    Jpeg,
    /// `image/png`
    Png,
    /// `image/gif`
    Gif,
    /// `image/webp`
    Webp,
}

impl ImageType {
    /// Parse a declared MIME type. Unknown types yield `None`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageType::Jpeg),
            "image/png" => Some(ImageType::Png),
            "image/gif" => Some(ImageType::Gif),
            "image/webp" => Some(ImageType::Webp),
            _ => None,
        }
    }

    /// Canonical MIME string.
    pub fn mime(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::Gif => "image/gif",
            ImageType::Webp => "image/webp",
        }
    }

    /// Whether this format is in [`ALLOWED_UPLOAD_TYPES`].
    pub fn is_upload_allowed(&self) -> bool {
        ALLOWED_UPLOAD_TYPES.contains(self)
    }

    /// Whether `content` starts with this format's signature.
    ///
    /// WebP only checks the `RIFF` container here; see [`validate_webp_content`].
    pub fn matches(&self, content: &[u8]) -> bool {
        match self {
            ImageType::Jpeg => content.starts_with(JPEG_MAGIC),
            ImageType::Png => content.starts_with(PNG_MAGIC),
            ImageType::Gif => {
                content.starts_with(GIF87A_MAGIC) || content.starts_with(GIF89A_MAGIC)
            }
            ImageType::Webp => content.starts_with(RIFF_MAGIC),
        }
    }
}

/// Check leading bytes against the declared MIME type. Unknown types fail.
pub fn validate_file_magic_bytes(content: &[u8], declared_type: &str) -> bool {
    ImageType::from_mime(declared_type).is_some_and(|kind| kind.matches(content))
}

/// Full WebP header: `RIFF` at 0..4 and `WEBP` at 8..12.
pub fn validate_webp_content(content: &[u8]) -> bool {
    content.len() >= 12 && content.starts_with(RIFF_MAGIC) && &content[8..12] == WEBP_TAG
}

/// Whether the first [`CONTENT_SCAN_BYTES`] bytes contain script or markup.
pub fn contains_embedded_markup(content: &[u8]) -> bool {
    let end = content.len().min(CONTENT_SCAN_BYTES);
    let text = String::from_utf8_lossy(&content[..end]).to_lowercase();
    SUSPICIOUS_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Verify uploaded bytes against the declared type.
///
/// Fails with `INVALID_FILE_TYPE` when the signature does not match, the type
/// is unknown, or the leading bytes carry script or PHP markup.
pub fn validate_file_content(content: &[u8], declared_type: &str) -> ValidationResult<ImageType> {
    let kind = ImageType::from_mime(declared_type).ok_or(ErrorCode::InvalidFileType)?;
    if !kind.matches(content) {
        return Err(ErrorCode::InvalidFileType);
    }
    if kind == ImageType::Webp && !validate_webp_content(content) {
        return Err(ErrorCode::InvalidFileType);
    }
    if contains_embedded_markup(content) {
        return Err(ErrorCode::InvalidFileType);
    }
    Ok(kind)
}

/// Check declared size and type before reading the body.
///
/// Only [`ALLOWED_UPLOAD_TYPES`] pass, so a GIF whose bytes would satisfy
/// [`validate_file_content`] is still rejected here.
pub fn validate_file_upload(size: u64, declared_type: &str) -> ValidationResult<()> {
    if size > MAX_UPLOAD_BYTES {
        return Err(ErrorCode::FileTooLarge);
    }
    match ImageType::from_mime(declared_type) {
        Some(kind) if kind.is_upload_allowed() => Ok(()),
        _ => Err(ErrorCode::InvalidFileType),
    }
}
