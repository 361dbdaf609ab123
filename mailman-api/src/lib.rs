//! Mailman API - REST facade for mailing lists.
//!
//! Exposes list enumeration, subscription management and posting over HTTP,
//! delegating storage, membership rules and delivery to a mailing-list
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! HTTP → allowlist → router → ListService / MailInjector → ListEngine → list records / inbound queue
//! ```

pub mod config;
pub mod engine;
pub mod lists;
pub mod mail;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineError, ListEngine, LocalEngine, LockedList};
pub use lists::ListService;
pub use mail::{MailInjector, MessageTemplate};
pub use web::{router, AllowList, AppState};
