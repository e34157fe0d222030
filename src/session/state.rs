//! # Session State
//!
//! The single authoritative state object for one upload-cloak-verify cycle,
//! and its synchronous transitions. Nothing here awaits; the
//! [`controller`](super::controller) brackets each service call with a
//! `begin_*` / `complete_*` pair.
//!
//! ## Shape
//!
//! ```text
//! Stage:     Empty ──upload──► HasOriginal ──cloak ok──► HasCloaked
//!              ▲                    ▲  ▲                    │  │
//!              └──────reset─────────┼──┴───────upload───────┘  │
//!                                   └───────── (any) ◄── reset ┘
//!
//! Activity:  Idle ⇄ Cloaking | Verifying   (at most one in flight)
//! ```
//!
//! ## Stale responses
//!
//! `upload` and `reset` are accepted even while a call is in flight. Each
//! bumps the generation counter; a [`Ticket`] captured at `begin_*` carries
//! the generation it was issued under plus its own call number, and
//! `complete_*` drops any result whose ticket no longer matches. A caller
//! that gives up on a call hands its ticket to [`Session::abandon`].

use uuid::Uuid;

use crate::client::ProtectionResult;
use crate::codec::EncodedImage;
use crate::error::{ErrorInfo, ImageSlot, ServiceError, SessionError};

/// Which images the session holds.
///
/// A cloaked image can only exist alongside the original it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Stage {
    #[default]
    Empty,
    HasOriginal {
        original: EncodedImage,
    },
    HasCloaked {
        original: EncodedImage,
        cloaked: EncodedImage,
    },
}

/// Mutual-exclusion marker for service calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Activity {
    #[default]
    Idle,
    Cloaking,
    Verifying,
}

/// Receipt for an in-flight call, checked when its result comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    call: u64,
    activity: Activity,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }
}

/// What happened to a completed call's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The result was written into the session.
    Committed,
    /// The session moved on (reset or new upload) while the call was in
    /// flight, so the result was dropped.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    stage: Stage,
    verification: Option<ProtectionResult>,
    activity: Activity,
    last_error: Option<ErrorInfo>,
    generation: u64,
    /// Sequence number of the most recently started call
    call: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: Stage::Empty,
            verification: None,
            activity: Activity::Idle,
            last_error: None,
            generation: 0,
            call: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn original(&self) -> Option<&EncodedImage> {
        match &self.stage {
            Stage::Empty => None,
            Stage::HasOriginal { original } | Stage::HasCloaked { original, .. } => Some(original),
        }
    }

    pub fn cloaked(&self) -> Option<&EncodedImage> {
        match &self.stage {
            Stage::HasCloaked { cloaked, .. } => Some(cloaked),
            _ => None,
        }
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&EncodedImage> {
        match slot {
            ImageSlot::Original => self.original(),
            ImageSlot::Cloaked => self.cloaked(),
        }
    }

    pub fn verification(&self) -> Option<&ProtectionResult> {
        self.verification.as_ref()
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn is_idle(&self) -> bool {
        self.activity == Activity::Idle
    }

    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the original image and drop everything derived from the old one.
    ///
    /// Accepted in any state. Any in-flight call becomes stale.
    pub fn upload(&mut self, original: EncodedImage) {
        self.generation += 1;
        self.stage = Stage::HasOriginal { original };
        self.verification = None;
        self.last_error = None;
        self.activity = Activity::Idle;
    }

    /// Return to `Empty`. Any in-flight call becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.stage = Stage::Empty;
        self.verification = None;
        self.last_error = None;
        self.activity = Activity::Idle;
    }

    pub fn record_error(&mut self, err: &SessionError) {
        self.last_error = Some(ErrorInfo::from(err));
    }

    /// Mark a cloak as in flight and hand back a copy of the original to send.
    pub fn begin_cloak(&mut self) -> Result<(Ticket, EncodedImage), SessionError> {
        self.ensure_idle()?;
        let original = self
            .original()
            .cloned()
            .ok_or(SessionError::MissingImage(ImageSlot::Original))?;
        Ok((self.begin(Activity::Cloaking), original))
    }

    /// Mark a verification of `target` as in flight.
    ///
    /// Verifying the original does not require a cloaked image to exist.
    pub fn begin_verify(
        &mut self,
        target: ImageSlot,
    ) -> Result<(Ticket, EncodedImage), SessionError> {
        self.ensure_idle()?;
        let image = self
            .image(target)
            .cloned()
            .ok_or(SessionError::MissingImage(target))?;
        Ok((self.begin(Activity::Verifying), image))
    }

    /// Apply the result of a cloak started with `ticket`.
    ///
    /// On success the cloaked image replaces any previous one and the
    /// verification slot is cleared. On failure only `last_error` changes.
    pub fn complete_cloak(
        &mut self,
        ticket: Ticket,
        result: Result<EncodedImage, ServiceError>,
    ) -> Result<Applied, SessionError> {
        if !self.owns(ticket, Activity::Cloaking) {
            return Ok(Applied::Discarded);
        }
        self.activity = Activity::Idle;

        match result {
            Ok(cloaked) => {
                self.stage = match std::mem::take(&mut self.stage) {
                    Stage::HasOriginal { original } | Stage::HasCloaked { original, .. } => {
                        Stage::HasCloaked { original, cloaked }
                    }
                    // begin_cloak required an original and nothing but
                    // upload/reset replaces the stage, both of which bump
                    // the generation.
                    Stage::Empty => Stage::Empty,
                };
                self.verification = None;
                Ok(Applied::Committed)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Apply the result of a verification started with `ticket`.
    ///
    /// On failure the previous verification, if any, is left in place.
    pub fn complete_verify(
        &mut self,
        ticket: Ticket,
        result: Result<ProtectionResult, ServiceError>,
    ) -> Result<Applied, SessionError> {
        if !self.owns(ticket, Activity::Verifying) {
            return Ok(Applied::Discarded);
        }
        self.activity = Activity::Idle;

        match result {
            Ok(verification) => {
                self.verification = Some(verification);
                Ok(Applied::Committed)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Give up on the call started with `ticket` without applying a result.
    ///
    /// Returns true if the session was still waiting on that call and is now
    /// idle again. Slots and `last_error` are left alone.
    pub fn abandon(&mut self, ticket: Ticket) -> bool {
        if !self.owns(ticket, ticket.activity) {
            return false;
        }
        self.activity = Activity::Idle;
        true
    }

    /// The cloaked image, if a download is possible right now.
    pub fn downloadable(&self) -> Result<&EncodedImage, SessionError> {
        self.ensure_idle()?;
        self.cloaked()
            .ok_or(SessionError::MissingImage(ImageSlot::Cloaked))
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(SessionError::Busy)
        }
    }

    fn begin(&mut self, activity: Activity) -> Ticket {
        self.activity = activity;
        self.last_error = None;
        self.call += 1;
        Ticket {
            generation: self.generation,
            call: self.call,
            activity,
        }
    }

    fn owns(&self, ticket: Ticket, activity: Activity) -> bool {
        ticket.generation == self.generation
            && ticket.call == self.call
            && ticket.activity == activity
            && self.activity == activity
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.record_error(&err);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProtectionLevel;
    use crate::error::ErrorKind;

    fn image(tag: u8) -> EncodedImage {
        EncodedImage::new("image/png", vec![tag; 8]).unwrap()
    }

    fn result(level: ProtectionLevel) -> ProtectionResult {
        ProtectionResult {
            is_protected: level == ProtectionLevel::High,
            faces_detected: 1,
            confidence_scores: vec![0.5],
            protection_level: level,
            message: "m".to_string(),
        }
    }

    fn with_cloaked() -> Session {
        let mut session = Session::new();
        session.upload(image(1));
        let (ticket, _) = session.begin_cloak().unwrap();
        session.complete_cloak(ticket, Ok(image(2))).unwrap();
        session
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new();
        assert_eq!(session.stage(), &Stage::Empty);
        assert!(session.is_idle());
        assert!(session.verification().is_none());
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_upload_clears_derived_slots() {
        let mut session = with_cloaked();
        let (ticket, _) = session.begin_verify(ImageSlot::Cloaked).unwrap();
        session
            .complete_verify(ticket, Ok(result(ProtectionLevel::High)))
            .unwrap();
        session.record_error(&SessionError::Busy);

        session.upload(image(3));

        assert_eq!(session.original(), Some(&image(3)));
        assert!(session.cloaked().is_none());
        assert!(session.verification().is_none());
        assert!(session.last_error().is_none());
        assert!(session.is_idle());
    }

    #[test]
    fn test_begin_cloak_requires_original() {
        let mut session = Session::new();
        let err = session.begin_cloak().unwrap_err();
        assert!(matches!(err, SessionError::MissingImage(ImageSlot::Original)));
        assert!(session.is_idle());
    }

    #[test]
    fn test_begin_is_exclusive() {
        let mut session = Session::new();
        session.upload(image(1));
        let _ticket = session.begin_cloak().unwrap();
        assert_eq!(session.activity(), Activity::Cloaking);

        assert!(matches!(session.begin_cloak(), Err(SessionError::Busy)));
        assert!(matches!(
            session.begin_verify(ImageSlot::Original),
            Err(SessionError::Busy)
        ));
        assert!(matches!(session.downloadable(), Err(SessionError::Busy)));
        assert_eq!(session.activity(), Activity::Cloaking);
    }

    #[test]
    fn test_cloak_success_clears_verification() {
        let mut session = with_cloaked();
        let (ticket, _) = session.begin_verify(ImageSlot::Original).unwrap();
        session
            .complete_verify(ticket, Ok(result(ProtectionLevel::Low)))
            .unwrap();
        assert!(session.verification().is_some());

        let (ticket, sent) = session.begin_cloak().unwrap();
        assert_eq!(sent, image(1));
        let applied = session.complete_cloak(ticket, Ok(image(4))).unwrap();

        assert_eq!(applied, Applied::Committed);
        assert_eq!(session.cloaked(), Some(&image(4)));
        assert_eq!(session.original(), Some(&image(1)));
        assert!(session.verification().is_none());
    }

    #[test]
    fn test_cloak_failure_keeps_prior_cloaked() {
        let mut session = with_cloaked();
        let (ticket, _) = session.begin_cloak().unwrap();
        let err = session
            .complete_cloak(ticket, Err(ServiceError::Transport("down".into())))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(session.cloaked(), Some(&image(2)));
        assert_eq!(session.last_error().map(|e| e.kind), Some(ErrorKind::Transport));
        assert!(session.is_idle());
    }

    #[test]
    fn test_verify_failure_keeps_prior_result() {
        let mut session = with_cloaked();
        let (ticket, _) = session.begin_verify(ImageSlot::Cloaked).unwrap();
        session
            .complete_verify(ticket, Ok(result(ProtectionLevel::Medium)))
            .unwrap();

        let (ticket, _) = session.begin_verify(ImageSlot::Original).unwrap();
        assert!(session.last_error().is_none());
        session
            .complete_verify(ticket, Err(ServiceError::Malformed("x".into())))
            .unwrap_err();

        assert_eq!(
            session.verification().map(|v| v.protection_level),
            Some(ProtectionLevel::Medium)
        );
        assert_eq!(session.last_error().map(|e| e.kind), Some(ErrorKind::Malformed));
    }

    #[test]
    fn test_verify_original_without_cloaked() {
        let mut session = Session::new();
        session.upload(image(1));
        let (ticket, sent) = session.begin_verify(ImageSlot::Original).unwrap();
        assert_eq!(sent, image(1));
        session
            .complete_verify(ticket, Ok(result(ProtectionLevel::Low)))
            .unwrap();
        assert!(session.verification().is_some());

        assert!(matches!(
            session.begin_verify(ImageSlot::Cloaked),
            Err(SessionError::MissingImage(ImageSlot::Cloaked))
        ));
    }

    #[test]
    fn test_stale_result_after_reset_is_discarded() {
        let mut session = Session::new();
        session.upload(image(1));
        let (ticket, _) = session.begin_cloak().unwrap();

        session.reset();
        assert_eq!(ticket.generation() + 1, session.generation());

        let applied = session.complete_cloak(ticket, Ok(image(2))).unwrap();
        assert_eq!(applied, Applied::Discarded);
        assert_eq!(session.stage(), &Stage::Empty);
    }

    #[test]
    fn test_stale_error_after_upload_is_discarded() {
        let mut session = Session::new();
        session.upload(image(1));
        let (ticket, _) = session.begin_verify(ImageSlot::Original).unwrap();

        session.upload(image(5));
        let applied = session
            .complete_verify(ticket, Err(ServiceError::Rejected(None)))
            .unwrap();

        assert_eq!(applied, Applied::Discarded);
        assert!(session.last_error().is_none());
        assert_eq!(session.original(), Some(&image(5)));
    }

    #[test]
    fn test_stale_ticket_does_not_release_newer_call() {
        let mut session = Session::new();
        session.upload(image(1));
        let (stale, _) = session.begin_cloak().unwrap();
        session.upload(image(2));
        let (_fresh, _) = session.begin_cloak().unwrap();

        session.complete_cloak(stale, Ok(image(9))).unwrap();
        assert_eq!(session.activity(), Activity::Cloaking);
        assert!(session.cloaked().is_none());
    }

    #[test]
    fn test_abandon_releases_only_current_call() {
        let mut session = with_cloaked();
        let (ticket, _) = session.begin_cloak().unwrap();

        assert!(session.abandon(ticket));
        assert!(session.is_idle());
        assert_eq!(session.cloaked(), Some(&image(2)));
        assert!(session.last_error().is_none());

        // A late result for the abandoned call is dropped.
        let (fresh, _) = session.begin_verify(ImageSlot::Cloaked).unwrap();
        assert_eq!(
            session.complete_cloak(ticket, Ok(image(9))).unwrap(),
            Applied::Discarded
        );
        assert!(!session.abandon(ticket));
        assert_eq!(session.activity(), Activity::Verifying);
        session
            .complete_verify(fresh, Ok(result(ProtectionLevel::High)))
            .unwrap();

        // Nor can it claim a later call of the same kind.
        let (_next, _) = session.begin_cloak().unwrap();
        assert!(!session.abandon(ticket));
        assert_eq!(
            session.complete_cloak(ticket, Ok(image(9))).unwrap(),
            Applied::Discarded
        );
        assert_eq!(session.activity(), Activity::Cloaking);

        session.upload(image(3));
        assert!(!session.abandon(fresh));
        assert!(session.is_idle());
        assert!(session.cloaked().is_none());
    }

    #[test]
    fn test_downloadable() {
        let mut session = Session::new();
        assert!(matches!(
            session.downloadable(),
            Err(SessionError::MissingImage(ImageSlot::Cloaked))
        ));
        session.upload(image(1));
        assert!(session.downloadable().is_err());

        let session = with_cloaked();
        assert_eq!(session.downloadable().unwrap(), &image(2));
    }
}
