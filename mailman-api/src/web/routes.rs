//! Route table.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::web::access::{restrict_to_allowlist, AllowList};
use crate::web::handlers::{list_lists, members, send_mail, subscribe, unsubscribe, AppState};

/// Version prefix for every route.
pub const API_VERSION: &str = "/v2";

/// Build the application router.
///
/// The allowlist wraps every route and the fallback, so unknown paths from
/// unknown peers are refused too.
pub fn router(state: AppState, allowlist: AllowList) -> Router {
    Router::new()
        .route(API_VERSION, get(list_lists))
        .route(&format!("{}/", API_VERSION), get(list_lists))
        .route(
            &format!("{}/:listname", API_VERSION),
            get(members).put(subscribe).delete(unsubscribe),
        )
        .route(&format!("{}/:listname/sendmail", API_VERSION), post(send_mail))
        .with_state(state)
        .layer(middleware::from_fn_with_state(allowlist, restrict_to_allowlist))
        .layer(TraceLayer::new_for_http())
}
