//! # Presentation Projector
//!
//! Pure mapping from a [`Session`] to a renderable [`ViewModel`]. Owns no state
//! and cannot reach the network; call [`project`] again after every trigger.
//!
//! Styling is expressed as a [`Tone`] tag and left to the renderer.

use serde::Serialize;

use crate::client::{ProtectionLevel, ProtectionResult};
use crate::session::{Activity, Session};

/// Styling tag for badges and banners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Reassuring,
    Cautionary,
    Alarming,
    Neutral,
}

impl From<ProtectionLevel> for Tone {
    fn from(level: ProtectionLevel) -> Self {
        match level {
            ProtectionLevel::High => Tone::Reassuring,
            ProtectionLevel::Medium => Tone::Cautionary,
            ProtectionLevel::Low => Tone::Alarming,
            ProtectionLevel::Unknown => Tone::Neutral,
        }
    }
}

/// Which screen the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Upload,
    Compare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfidenceBar {
    /// 1-based face number
    pub face: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtectionReport {
    pub level: Badge,
    pub faces_detected: u32,
    pub protected: &'static str,
    /// First face's confidence as a whole percentage, or "N/A"
    pub headline_confidence: String,
    pub message: String,
    /// Per-face breakdown, only populated when more than one face was found
    pub breakdown: Vec<ConfidenceBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyPanel {
    pub test_original: Button,
    pub test_cloaked: Button,
    pub report: Option<ProtectionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub step: Step,
    pub busy: Option<&'static str>,
    pub error: Option<String>,
    pub original_badge: Option<Badge>,
    pub cloaked_badge: Option<Badge>,
    pub cloak_button: Option<Button>,
    pub download_button: Option<Button>,
    pub verify_panel: Option<VerifyPanel>,
    pub reset_enabled: bool,
}

/// Styling tag for a protection level.
///
/// Total: unknown levels get [`Tone::Neutral`].
pub fn tone_for(level: ProtectionLevel) -> Tone {
    Tone::from(level)
}

pub fn project(session: &Session) -> ViewModel {
    let idle = session.is_idle();
    let has_original = session.original().is_some();
    let has_cloaked = session.cloaked().is_some();

    let busy = match session.activity() {
        Activity::Idle => None,
        Activity::Cloaking => Some("Cloaking image..."),
        Activity::Verifying => Some("Checking protection..."),
    };

    let original_badge = has_original.then(|| Badge {
        label: "Vulnerable to Recognition".to_string(),
        tone: Tone::Alarming,
    });

    let cloaked_badge = has_original.then(|| {
        if has_cloaked {
            Badge {
                label: "Protected Against Recognition".to_string(),
                tone: Tone::Reassuring,
            }
        } else {
            Badge {
                label: "Waiting for Processing".to_string(),
                tone: Tone::Neutral,
            }
        }
    });

    let cloak_button = has_original.then(|| Button {
        label: match (session.activity(), has_cloaked) {
            (Activity::Cloaking, _) => "Processing...",
            (_, true) => "Cloak Again",
            (_, false) => "Cloak Image",
        }
        .to_string(),
        enabled: idle,
    });

    let download_button = has_cloaked.then(|| Button {
        label: "Download Cloaked Image".to_string(),
        enabled: idle,
    });

    // Offered only once there is a cloaked image to compare against.
    let verify_panel = has_cloaked.then(|| VerifyPanel {
        test_original: Button {
            label: "Test Original Image".to_string(),
            enabled: idle,
        },
        test_cloaked: Button {
            label: "Test Cloaked Image".to_string(),
            enabled: idle,
        },
        report: session.verification().map(protection_report),
    });

    ViewModel {
        step: if has_original { Step::Compare } else { Step::Upload },
        busy,
        error: session.last_error().map(|e| e.message.clone()),
        original_badge,
        cloaked_badge,
        cloak_button,
        download_button,
        verify_panel,
        reset_enabled: true,
    }
}

fn percent(score: f64) -> u32 {
    (score.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Render a verification result on its own, e.g. for a command-line summary.
pub fn protection_report(result: &ProtectionResult) -> ProtectionReport {
    let level = result.protection_level;
    let breakdown = if result.confidence_scores.len() > 1 {
        result
            .confidence_scores
            .iter()
            .enumerate()
            .map(|(i, score)| ConfidenceBar {
                face: i + 1,
                percent: percent(*score),
            })
            .collect()
    } else {
        Vec::new()
    };

    ProtectionReport {
        level: Badge {
            label: format!("{} Protection", capitalize(level.as_str())),
            tone: tone_for(level),
        },
        faces_detected: result.faces_detected,
        protected: if result.is_protected { "Yes" } else { "No" },
        headline_confidence: result
            .confidence_scores
            .first()
            .map(|s| format!("{}%", percent(*s)))
            .unwrap_or_else(|| "N/A".to_string()),
        message: result.message.clone(),
        breakdown,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
