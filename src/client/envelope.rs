//! # Response Envelopes
//!
//! JSON shapes returned by the two collaborator endpoints, and their
//! normalisation into domain values or a [`ServiceError`].
//!
//! ```text
//! POST /api/cloak-image      -> {success, cloaked_image, message?}
//! POST /api/check-protection -> {success, is_protected, faces_detected,
//!                                confidence_scores, protection_level, message}
//! ```
//!
//! The verification engine owns the meaning of `protection_level`; it is
//! carried through as a tag and never re-derived from the scores.

use serde::{Deserialize, Serialize};

use crate::codec::EncodedImage;
use crate::error::ServiceError;

/// Coarse categorical judgement returned by the verification engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProtectionLevel {
    High,
    Medium,
    Low,
    /// Any other tag, including the engine's own `unknown` and `error`.
    Unknown,
}

impl ProtectionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionLevel::High => "high",
            ProtectionLevel::Medium => "medium",
            ProtectionLevel::Low => "low",
            ProtectionLevel::Unknown => "unknown",
        }
    }
}

impl From<&str> for ProtectionLevel {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "high" => ProtectionLevel::High,
            "medium" => ProtectionLevel::Medium,
            "low" => ProtectionLevel::Low,
            _ => ProtectionLevel::Unknown,
        }
    }
}

impl From<String> for ProtectionLevel {
    fn from(tag: String) -> Self {
        ProtectionLevel::from(tag.as_str())
    }
}

impl From<ProtectionLevel> for String {
    fn from(level: ProtectionLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Outcome of a verification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionResult {
    pub is_protected: bool,
    pub faces_detected: u32,
    /// One score in `[0, 1]` per detected face, in detection order
    pub confidence_scores: Vec<f64>,
    pub protection_level: ProtectionLevel,
    pub message: String,
}

impl ProtectionResult {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.confidence_scores.len() != self.faces_detected as usize {
            return Err(ServiceError::Malformed(format!(
                "{} confidence scores for {} faces",
                self.confidence_scores.len(),
                self.faces_detected
            )));
        }
        if let Some(score) = self
            .confidence_scores
            .iter()
            .find(|s| !(0.0..=1.0).contains(*s))
        {
            return Err(ServiceError::Malformed(format!(
                "confidence score {score} outside [0, 1]"
            )));
        }
        Ok(())
    }
}

/// Body of `POST /api/cloak-image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloakEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloaked_image: Option<String>,
    #[serde(default, alias = "detail", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /api/check-protection`.
///
/// Fields are optional on the wire so a `success: false` body still parses;
/// they are required once `success` is true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_protected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces_detected: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_scores: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_level: Option<String>,
    #[serde(default, alias = "detail", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<ProtectionResult> for VerifyEnvelope {
    fn from(result: ProtectionResult) -> Self {
        Self {
            success: true,
            is_protected: Some(result.is_protected),
            faces_detected: Some(result.faces_detected),
            confidence_scores: Some(result.confidence_scores),
            protection_level: Some(result.protection_level.into()),
            message: Some(result.message),
        }
    }
}

/// FastAPI-style error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Extract a readable detail from an error response body, if it has one.
pub fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.detail)
}

/// Decode a cloaking response body.
pub fn parse_cloak(body: &str) -> Result<EncodedImage, ServiceError> {
    let envelope: CloakEnvelope = serde_json::from_str(body)
        .map_err(|e| ServiceError::Malformed(format!("cloak envelope: {e}")))?;

    if !envelope.success {
        return Err(ServiceError::Rejected(envelope.message));
    }

    let url = envelope
        .cloaked_image
        .ok_or_else(|| ServiceError::Malformed("missing `cloaked_image`".to_string()))?;

    EncodedImage::from_data_url(&url)
        .map_err(|e| ServiceError::Malformed(format!("`cloaked_image`: {e}")))
}

/// Decode a verification response body.
pub fn parse_verification(body: &str) -> Result<ProtectionResult, ServiceError> {
    let envelope: VerifyEnvelope = serde_json::from_str(body)
        .map_err(|e| ServiceError::Malformed(format!("verification envelope: {e}")))?;

    if !envelope.success {
        return Err(ServiceError::Rejected(envelope.message));
    }

    fn required<T>(value: Option<T>, field: &str) -> Result<T, ServiceError> {
        value.ok_or_else(|| ServiceError::Malformed(format!("missing `{field}`")))
    }

    let result = ProtectionResult {
        is_protected: required(envelope.is_protected, "is_protected")?,
        faces_detected: required(envelope.faces_detected, "faces_detected")?,
        confidence_scores: required(envelope.confidence_scores, "confidence_scores")?,
        protection_level: required(envelope.protection_level, "protection_level")?.into(),
        message: required(envelope.message, "message")?,
    };
    result.validate()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cloak_success() {
        let image = parse_cloak(r#"{"success":true,"cloaked_image":"data:image/png;base64,WFla"}"#)
            .unwrap();
        assert_eq!(image.media_type(), "image/png");
        assert_eq!(image.bytes(), b"XYZ");
        assert_eq!(image.to_data_url(), "data:image/png;base64,WFla");
    }

    #[test]
    fn test_parse_cloak_rejected() {
        let err = parse_cloak(r#"{"success":false}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(None)));

        let err = parse_cloak(r#"{"success":false,"message":"no face"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(Some(ref m)) if m == "no face"));
    }

    #[test]
    fn test_parse_cloak_malformed() {
        for body in [
            "not json",
            r#"{"cloaked_image":"data:image/png;base64,WFla"}"#,
            r#"{"success":true}"#,
            r#"{"success":true,"cloaked_image":"WFla"}"#,
            r#"{"success":true,"cloaked_image":"data:text/plain;base64,WFla"}"#,
        ] {
            assert!(
                matches!(parse_cloak(body), Err(ServiceError::Malformed(_))),
                "expected malformed for {body}"
            );
        }
    }

    #[test]
    fn test_parse_verification_populates_all_fields() {
        let result = parse_verification(
            r#"{"success":true,"is_protected":true,"faces_detected":1,
                "confidence_scores":[0.12],"protection_level":"high","message":"ok"}"#,
        )
        .unwrap();
        assert_eq!(
            result,
            ProtectionResult {
                is_protected: true,
                faces_detected: 1,
                confidence_scores: vec![0.12],
                protection_level: ProtectionLevel::High,
                message: "ok".to_string(),
            }
        );
    }

    #[test]
    fn test_level_is_trusted_over_scores() {
        let result = parse_verification(
            r#"{"success":true,"is_protected":false,"faces_detected":1,
                "confidence_scores":[0.82],"protection_level":"low","message":"weak"}"#,
        )
        .unwrap();
        assert_eq!(result.protection_level, ProtectionLevel::Low);

        let result = parse_verification(
            r#"{"success":true,"is_protected":true,"faces_detected":1,
                "confidence_scores":[0.82],"protection_level":"HIGH","message":"x"}"#,
        )
        .unwrap();
        assert_eq!(result.protection_level, ProtectionLevel::High);
    }

    #[test]
    fn test_unknown_levels_pass_through() {
        let result = parse_verification(
            r#"{"success":true,"is_protected":false,"faces_detected":0,
                "confidence_scores":[],"protection_level":"error","message":"failed"}"#,
        )
        .unwrap();
        assert_eq!(result.protection_level, ProtectionLevel::Unknown);
    }

    #[test]
    fn test_parse_verification_malformed() {
        for body in [
            r#"{"success":true,"faces_detected":1}"#,
            r#"{"success":true,"is_protected":true,"faces_detected":2,
                "confidence_scores":[0.1],"protection_level":"high","message":"m"}"#,
            r#"{"success":true,"is_protected":true,"faces_detected":1,
                "confidence_scores":[1.4],"protection_level":"high","message":"m"}"#,
            r#"{"success":true,"is_protected":true,"faces_detected":-1,
                "confidence_scores":[],"protection_level":"high","message":"m"}"#,
        ] {
            assert!(
                matches!(parse_verification(body), Err(ServiceError::Malformed(_))),
                "expected malformed for {body}"
            );
        }
    }

    #[test]
    fn test_parse_verification_rejected() {
        let err = parse_verification(r#"{"success":false,"message":"busy"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(Some(_))));

        let err = parse_cloak(r#"{"success":false,"detail":"No faces detected"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(Some(m)) if m == "No faces detected"));
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"File must be an image"}"#).as_deref(),
            Some("File must be an image")
        );
        assert_eq!(error_detail("<html>"), None);
    }
}
