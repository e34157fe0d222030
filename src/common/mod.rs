//! # Common Components
//!
//! Shared utilities used by the library and both binaries.
//!
//! ## Modules
//!
//! - [`config`]: Configuration structures and TOML loading
//! - [`logging`]: Logger initialisation for the binaries

pub mod config;
pub mod logging;
