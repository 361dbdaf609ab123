//! JSON response formatting.
//!
//! Every handler answers with a bare JSON value (string, boolean, array) and
//! a status code; there is no envelope around the value.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// A JSON body with its status code.
#[derive(Debug)]
pub struct JsonReply<T> {
    status: StatusCode,
    value: T,
}

/// Wrap `value` as a `200 OK` JSON reply.
pub fn jsonify<T: Serialize>(value: T) -> JsonReply<T> {
    JsonReply {
        status: StatusCode::OK,
        value,
    }
}

impl<T> JsonReply<T> {
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for JsonReply<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.value)).into_response()
    }
}
