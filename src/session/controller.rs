//! # Session Controller
//!
//! Async orchestrator that owns one [`Session`] and drives the service client
//! on behalf of user triggers.
//!
//! ## Trigger Workflow
//!
//! 1. **Validate**: lock the session, check preconditions, mark the activity
//!    and take a [`Ticket`](super::state::Ticket)
//! 2. **Call**: release the lock and await the service client
//! 3. **Apply**: re-lock and hand the result to the session, which drops it
//!    if the ticket went stale in the meantime
//!
//! The lock is never held across a service call, so `upload`, `reset` and
//! state reads stay responsive while a call is in flight. A second cloak or
//! verify in that window is rejected with [`SessionError::Busy`] before any
//! call is made.
//!
//! ## Cancellation
//!
//! Each call is covered by a guard holding its ticket. If the trigger's
//! future is dropped before the result is applied (a timeout, `select!` or
//! task abort), the guard returns the session to idle, so the next trigger
//! is accepted instead of failing with `Busy`.
//!
//! ## Errors
//!
//! Decode and service failures are recorded in the session's `last_error`
//! slot and also returned. `Busy` and `MissingImage` are only returned: they
//! have no effect on the session, so `last_error` keeps describing the last
//! call that actually ran.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = HttpServiceClient::new(config.service.clone())?;
//! let controller = SessionController::new(client);
//!
//! controller.upload("portrait.png").await?;
//! controller.cloak().await?;
//! controller.verify(ImageSlot::Cloaked).await?;
//! let download = controller.download().await?;
//! ```

use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::state::{Applied, Session, Ticket};
use crate::client::{Operation, ServiceClient, ServiceMetrics};
use crate::codec::{self, EncodedImage};
use crate::error::{ErrorKind, ImageSlot, SessionError};

const DEFAULT_DOWNLOAD_STEM: &str = "cloaked_image";

/// Bytes of the cloaked image, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Returns the session to idle if the call holding `ticket` is dropped
/// before its result is applied.
struct InFlight {
    session: Arc<Mutex<Session>>,
    ticket: Ticket,
    armed: bool,
}

impl InFlight {
    fn new(session: Arc<Mutex<Session>>, ticket: Ticket) -> Self {
        Self {
            session,
            ticket,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn release(session: &mut Session, ticket: Ticket) {
        if session.abandon(ticket) {
            warn!(
                "Session {}: {:?} call was cancelled before completing",
                session.id(),
                ticket.activity()
            );
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let ticket = self.ticket;
        match self.session.try_lock() {
            Ok(mut session) => Self::release(&mut session, ticket),
            Err(_) => {
                // Someone else holds the lock; finish the release on the runtime.
                let session = self.session.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        Self::release(&mut *session.lock().await, ticket);
                    });
                }
            }
        }
    }
}

pub struct SessionController<C> {
    client: C,
    session: Arc<Mutex<Session>>,
    metrics: Option<Arc<Mutex<ServiceMetrics>>>,
    download_stem: String,
}

impl<C: ServiceClient> SessionController<C> {
    /// A controller over a fresh, empty session.
    pub fn new(client: C) -> Self {
        Self {
            client,
            session: Arc::new(Mutex::new(Session::new())),
            metrics: None,
            download_stem: DEFAULT_DOWNLOAD_STEM.to_string(),
        }
    }

    /// Record every service call into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Mutex<ServiceMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// File stem for downloads (`<stem>.<ext>`).
    pub fn with_download_name(mut self, stem: impl Into<String>) -> Self {
        self.download_stem = stem.into();
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Copy of the current session state.
    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Read a user-selected file and make it the session's original image.
    ///
    /// On a read failure the session keeps its previous images and records
    /// the error.
    pub async fn upload(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        match codec::load_from_user_file(path).await {
            Ok(image) => {
                info!("📁 Uploaded {}", path.display());
                self.upload_image(image).await;
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                warn!("Upload of {} failed: {}", path.display(), err);
                self.session.lock().await.record_error(&err);
                Err(err)
            }
        }
    }

    /// Make `image` the session's original, clearing everything derived from
    /// the previous one.
    pub async fn upload_image(&self, image: EncodedImage) {
        let mut session = self.session.lock().await;
        if !session.is_idle() {
            warn!(
                "Session {} replaced its original while {:?} was in flight",
                session.id(),
                session.activity()
            );
        }
        session.upload(image);
        info!(
            "Session {} holds a new original (generation {})",
            session.id(),
            session.generation()
        );
    }

    /// Send the original image to the cloaking service.
    pub async fn cloak(&self) -> Result<Applied, SessionError> {
        let (ticket, original) = {
            let mut session = self.session.lock().await;
            match session.begin_cloak() {
                Ok(begun) => begun,
                Err(e) => {
                    warn!("Cloak rejected for session {}: {}", session.id(), e);
                    return Err(e);
                }
            }
        };

        let mut guard = InFlight::new(self.session.clone(), ticket);

        info!("🛡️  Cloaking original ({} bytes)", original.len());
        let started = Instant::now();
        let result = self.client.request_cloak(original).await;
        let latency = started.elapsed();
        let failure = result.as_ref().err().map(ErrorKind::from);

        let outcome = {
            let mut session = self.session.lock().await;
            guard.disarm();
            session.complete_cloak(ticket, result)
        };
        self.record(Operation::Cloak, latency, failure, &outcome).await;
        Self::log_outcome("Cloak", latency, &outcome);
        outcome
    }

    /// Send the `target` image to the verification service.
    pub async fn verify(&self, target: ImageSlot) -> Result<Applied, SessionError> {
        let (ticket, image) = {
            let mut session = self.session.lock().await;
            match session.begin_verify(target) {
                Ok(begun) => begun,
                Err(e) => {
                    warn!(
                        "Verification of {} image rejected for session {}: {}",
                        target,
                        session.id(),
                        e
                    );
                    return Err(e);
                }
            }
        };

        let mut guard = InFlight::new(self.session.clone(), ticket);

        info!("🔍 Verifying {} image ({} bytes)", target, image.len());
        let started = Instant::now();
        let result = self.client.request_verification(image).await;
        let latency = started.elapsed();
        let failure = result.as_ref().err().map(ErrorKind::from);

        let outcome = {
            let mut session = self.session.lock().await;
            guard.disarm();
            session.complete_verify(ticket, result)
        };
        self.record(Operation::Verify, latency, failure, &outcome).await;
        Self::log_outcome("Verification", latency, &outcome);
        outcome
    }

    /// Return the session to empty. In-flight responses will be ignored.
    pub async fn reset(&self) {
        let mut session = self.session.lock().await;
        session.reset();
        info!(
            "Session {} reset (generation {})",
            session.id(),
            session.generation()
        );
    }

    /// Produce the cloaked image for saving. Does not change the session
    /// unless the stored bytes turn out to be unusable.
    pub async fn download(&self) -> Result<Download, SessionError> {
        let mut session = self.session.lock().await;
        let image = session.downloadable()?;

        match codec::to_downloadable(image) {
            Ok(bytes) => Ok(Download {
                file_name: image.file_name(&self.download_stem),
                media_type: image.media_type().to_string(),
                bytes,
            }),
            Err(e) => {
                let err = SessionError::from(e);
                session.record_error(&err);
                Err(err)
            }
        }
    }

    async fn record(
        &self,
        operation: Operation,
        latency: Duration,
        failure: Option<ErrorKind>,
        outcome: &Result<Applied, SessionError>,
    ) {
        if let Some(metrics) = &self.metrics {
            let discarded = matches!(outcome, Ok(Applied::Discarded));
            metrics
                .lock()
                .await
                .record_call(operation, latency, failure, discarded);
        }
    }

    fn log_outcome(what: &str, latency: Duration, outcome: &Result<Applied, SessionError>) {
        match outcome {
            Ok(Applied::Committed) => {
                info!("✅ {} completed in {}ms", what, latency.as_millis())
            }
            Ok(Applied::Discarded) => warn!(
                "{} response arrived after the session moved on; discarded",
                what
            ),
            Err(e) => warn!("❌ {} failed after {}ms: {}", what, latency.as_millis(), e),
        }
    }
}
