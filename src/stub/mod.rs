//! # Stand-in Collaborator
//!
//! A local server honouring the cloaking and verification contracts, for
//! exercising the client end to end without the real engines.
//!
//! - `POST /api/cloak-image` re-encodes the upload as PNG with an LSB marker
//! - `POST /api/check-protection` reports one face, high protection if the
//!   marker is present and low otherwise
//! - `GET /health`
//!
//! It is not a perturbation algorithm or a face detector.

pub mod marker;
pub mod router;

use anyhow::Result;
use log::info;
use tokio::net::TcpListener;

pub use router::router;

/// Serve the stand-in on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener) -> Result<()> {
    info!("🌐 Stand-in services on http://{}", listener.local_addr()?);
    axum::serve(listener, router()).await?;
    Ok(())
}
