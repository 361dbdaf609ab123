//! HTTP surface.
//!
//! ```text
//! request → TraceLayer → allowlist → route → handler → JSON reply
//! ```

pub mod access;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use access::{restrict_to_allowlist, AllowList};
pub use error::ApiError;
pub use handlers::{
    list_lists, members, send_mail, subscribe, unsubscribe, AppState, MISSING_INFORMATION,
};
pub use response::{jsonify, JsonReply};
pub use routes::{router, API_VERSION};
