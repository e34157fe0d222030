//! # InvisiFace Client
//!
//! Client-side workflow for face cloaking: upload an image, submit it to a
//! cloaking service, compare the result, and verify either image against a
//! protection-verification service.
//!
//! ## Modules
//!
//! - [`codec`]: Image Codec Adapter (file → [`EncodedImage`] → bytes)
//! - [`client`]: Service Client for the cloak and verify endpoints
//! - [`session`]: Session State Machine and its async controller
//! - [`view`]: Presentation Projector (session → view model)
//! - [`stub`]: Stand-in collaborator server for local runs and tests
//! - [`common`]: Configuration and logging
//! - [`error`]: Error taxonomy

pub mod client;
pub mod codec;
pub mod common;
pub mod error;
pub mod session;
pub mod stub;
pub mod view;

pub use client::{HttpServiceClient, ProtectionLevel, ProtectionResult, ServiceClient};
pub use codec::EncodedImage;
pub use error::{DecodeError, ErrorInfo, ErrorKind, ImageSlot, ServiceError, SessionError};
pub use session::{Session, SessionController};
pub use view::{project, ViewModel};
