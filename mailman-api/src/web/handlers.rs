//! REST endpoint handlers.
//!
//! Each handler reads its parameters (query string for GET, form body
//! otherwise), calls the list or mail service once and formats the result.
//! Nothing is retried. A request without a usable form body is handled as if
//! every field were absent.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::engine::MemberDesc;
use crate::lists::{
    subscribe_message, unsubscribe_message, ListFilter, ListService, ListSummary,
};
use crate::mail::{MailInjector, SendMailError, SendMailForm};
use crate::web::error::ApiError;
use crate::web::response::{jsonify, JsonReply};

/// Reply for a sendmail request lacking a required field.
pub const MISSING_INFORMATION: &str =
    "Missing information. `email_from`, `subject` and `body` are mandatory";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub lists: ListService,
    pub mail: MailInjector,
}

impl AppState {
    pub fn new(lists: ListService, mail: MailInjector) -> Self {
        Self { lists, mail }
    }
}

/// Interpret a boolean-like form value.
pub fn parse_boolean(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes" | "on")
    )
}

/// A query flag is set when it has any non-empty value.
fn is_set(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
}

fn form_or_default<T: Default>(form: Option<Form<T>>) -> T {
    form.map(|Form(form)| form).unwrap_or_default()
}

// =============================================================================
// List Index
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub description: Option<String>,
    pub private: Option<String>,
    pub address: Option<String>,
}

/// `GET /v2/`: names of all lists, optionally annotated or filtered.
pub async fn list_lists(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<JsonReply<Vec<ListSummary>>, ApiError> {
    let filter = ListFilter {
        address: query.address.filter(|a| !a.is_empty()),
        include_description: is_set(&query.description),
        include_private: is_set(&query.private),
    };

    let lists = state.lists.list_all(&filter).await?;

    info!(
        count = lists.len(),
        filtered = filter.address.is_some(),
        "lists_listed"
    );

    Ok(jsonify(lists))
}

// =============================================================================
// Membership
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeForm {
    pub address: Option<String>,
    pub fullname: Option<String>,
    pub digest: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnsubscribeForm {
    pub address: Option<String>,
}

/// `PUT /v2/{listname}`: subscribe an address.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(listname): Path<String>,
    form: Option<Form<SubscribeForm>>,
) -> Result<JsonReply<&'static str>, ApiError> {
    let form = form_or_default(form);
    let member = MemberDesc {
        address: form.address.unwrap_or_default(),
        fullname: form.fullname.filter(|n| !n.is_empty()),
        digest: parse_boolean(form.digest.as_deref()),
    };

    let outcome = state.lists.subscribe(&listname, member).await?;
    Ok(jsonify(subscribe_message(outcome)))
}

/// `DELETE /v2/{listname}`: unsubscribe an address.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(listname): Path<String>,
    form: Option<Form<UnsubscribeForm>>,
) -> Result<JsonReply<&'static str>, ApiError> {
    let address = form_or_default(form).address.unwrap_or_default();

    let outcome = state.lists.unsubscribe(&listname, &address).await?;
    Ok(jsonify(unsubscribe_message(outcome)))
}

/// `GET /v2/{listname}`: member addresses.
pub async fn members(
    State(state): State<AppState>,
    Path(listname): Path<String>,
) -> Result<JsonReply<Vec<String>>, ApiError> {
    Ok(jsonify(state.lists.members(&listname).await?))
}

// =============================================================================
// Posting
// =============================================================================

/// `POST /v2/{listname}/sendmail`: queue a post to the list.
pub async fn send_mail(
    State(state): State<AppState>,
    Path(listname): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    form: Option<Form<SendMailForm>>,
) -> Result<Response, ApiError> {
    let form = form_or_default(form);
    match state.mail.send_mail(&listname, form, peer.ip()).await {
        Ok(()) => Ok(jsonify(true).into_response()),
        Err(SendMailError::MissingInformation) => {
            info!(listname = %listname, "sendmail_missing_information");
            Ok(jsonify(MISSING_INFORMATION)
                .with_status(StatusCode::BAD_REQUEST)
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boolean() {
        assert!(parse_boolean(Some("true")));
        assert!(parse_boolean(Some("True")));
        assert!(parse_boolean(Some("1")));
        assert!(parse_boolean(Some("yes")));
        assert!(!parse_boolean(Some("false")));
        assert!(!parse_boolean(Some("")));
        assert!(!parse_boolean(None));
    }

    #[test]
    fn test_form_or_default() {
        let form: UnsubscribeForm = form_or_default(None);
        assert!(form.address.is_none());

        let form = form_or_default(Some(Form(UnsubscribeForm {
            address: Some("alice@example.com".to_string()),
        })));
        assert_eq!(form.address.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_is_set() {
        assert!(is_set(&Some("1".to_string())));
        assert!(is_set(&Some("0".to_string())));
        assert!(!is_set(&Some(String::new())));
        assert!(!is_set(&None));
    }
}
