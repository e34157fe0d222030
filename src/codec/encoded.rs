//! # Encoded Image
//!
//! In-memory image payload tagged with its media type, plus the two adapter
//! operations that move bytes in and out of a session:
//!
//! - [`load_from_user_file`]: read a user-selected file (the only suspension
//!   point before any session state changes)
//! - [`to_downloadable`]: emit the bytes of an image for saving

use image::ImageFormat;
use log::debug;
use std::path::Path;

use super::data_url;
use crate::error::DecodeError;

const FALLBACK_EXTENSION: &str = "bin";

/// Immutable image payload with a declared media type.
///
/// Sessions own their images outright; handing one to the service client
/// clones it so the session copy is never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    media_type: String,
    bytes: Vec<u8>,
}

impl EncodedImage {
    /// Wrap raw bytes, rejecting empty payloads and non-image media types.
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let media_type = media_type.into().trim().to_ascii_lowercase();
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if !media_type.starts_with("image/") {
            return Err(DecodeError::UnsupportedFormat(media_type));
        }
        Ok(Self { media_type, bytes })
    }

    /// Sniff the media type from the bytes themselves.
    ///
    /// `hint` is consulted only when the content is not recognised, e.g. the
    /// original file name.
    pub fn sniff(bytes: Vec<u8>, hint: Option<&Path>) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let format = image::guess_format(&bytes)
            .ok()
            .or_else(|| hint.and_then(|p| ImageFormat::from_path(p).ok()));

        match format {
            Some(format) => Self::new(format.to_mime_type(), bytes),
            None => Err(DecodeError::UnsupportedFormat(
                hint.and_then(|p| p.extension())
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unrecognised content".to_string()),
            )),
        }
    }

    /// Parse a `data:<media-type>;base64,<payload>` string.
    pub fn from_data_url(url: &str) -> Result<Self, DecodeError> {
        let (media_type, bytes) = data_url::parse(url)?;
        Self::new(media_type, bytes)
    }

    /// Self-describing string form, as carried by the cloaking envelope.
    pub fn to_data_url(&self) -> String {
        data_url::format(&self.media_type, &self.bytes)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Preferred file extension for this media type, e.g. `png`.
    pub fn extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.media_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or(FALLBACK_EXTENSION)
    }

    /// File name with `stem` and the extension matching the media type.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

/// Read the whole of a user-selected file into memory.
///
/// # Errors
/// - [`DecodeError::Read`] if the file cannot be read
/// - [`DecodeError::Empty`] if it holds no bytes
/// - [`DecodeError::UnsupportedFormat`] if it is not a recognised image
pub async fn load_from_user_file(path: impl AsRef<Path>) -> Result<EncodedImage, DecodeError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let image = EncodedImage::sniff(bytes, Some(path))?;
    debug!(
        "Loaded {} ({} bytes, {})",
        path.display(),
        image.len(),
        image.media_type()
    );
    Ok(image)
}

/// Raw bytes of `image`, ready to be written out.
///
/// Fails only if the stored image violates its construction invariants.
pub fn to_downloadable(image: &EncodedImage) -> Result<Vec<u8>, DecodeError> {
    if image.is_empty() {
        return Err(DecodeError::Empty);
    }
    if !image.media_type().starts_with("image/") {
        return Err(DecodeError::UnsupportedFormat(image.media_type().to_string()));
    }
    Ok(image.bytes().to_vec())
}
