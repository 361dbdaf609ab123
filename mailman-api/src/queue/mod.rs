//! Inbound queue for injected list posts.
//!
//! This module provides:
//! - The entry format written for each injected message
//! - A directory spool that writes entries atomically
//!
//! ## Flow
//!
//! ```text
//! sendmail handler → ListEngine::inject → Spool → <inqueue dir> → engine's incoming runner
//! ```

pub mod spool;
pub mod types;

pub use spool::Spool;
pub use types::{InboundEntry, INBOUND_QUEUE};
