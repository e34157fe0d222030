//! # Image Codec Adapter
//!
//! Moves image bytes between the local filesystem, the session and the wire.
//!
//! ## Modules
//!
//! - [`encoded`]: the [`EncodedImage`] payload and the load/download operations
//! - [`data_url`]: base64 data-URL framing used by the cloaking envelope

pub mod data_url;
pub mod encoded;

pub use encoded::{load_from_user_file, to_downloadable, EncodedImage};
