//! Base64 data-URL framing (`data:<media-type>;base64,<payload>`).

use base64::{engine::general_purpose, Engine as _};

use crate::error::DecodeError;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// Split a data URL into its media type and decoded payload.
pub fn parse(url: &str) -> Result<(String, Vec<u8>), DecodeError> {
    let rest = url
        .trim()
        .strip_prefix(SCHEME)
        .ok_or_else(|| DecodeError::DataUrl("missing `data:` scheme".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::DataUrl("missing `,` separator".to_string()))?;

    let media_type = header
        .strip_suffix(BASE64_MARKER)
        .ok_or_else(|| DecodeError::DataUrl("payload is not base64 encoded".to_string()))?;

    // Parameters such as `;charset=` are not meaningful for images.
    let media_type = media_type.split(';').next().unwrap_or_default();
    if media_type.is_empty() {
        return Err(DecodeError::DataUrl("missing media type".to_string()));
    }

    let bytes = general_purpose::STANDARD.decode(payload)?;
    Ok((media_type.to_string(), bytes))
}

pub fn format(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "{}{}{},{}",
        SCHEME,
        media_type,
        BASE64_MARKER,
        general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_png_data_url() {
        let (media_type, bytes) = parse("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(media_type, "image/png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_format_matches_backend_shape() {
        assert_eq!(format("image/png", b"hello"), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_parse_drops_parameters() {
        let (media_type, _) = parse("data:image/jpeg;name=a.jpg;base64,AA==").unwrap();
        assert_eq!(media_type, "image/jpeg");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            parse("image/png;base64,AA=="),
            Err(DecodeError::DataUrl(_))
        ));
        assert!(matches!(
            parse("data:image/png,plain"),
            Err(DecodeError::DataUrl(_))
        ));
        assert!(matches!(
            parse("data:image/png;base64"),
            Err(DecodeError::DataUrl(_))
        ));
        assert!(matches!(
            parse("data:;base64,AA=="),
            Err(DecodeError::DataUrl(_))
        ));
        assert!(matches!(
            parse("data:image/png;base64,@@@"),
            Err(DecodeError::Base64(_))
        ));
    }
}
