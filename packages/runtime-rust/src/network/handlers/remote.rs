//! `POST /api/remote`: the HTTP binding of the remote endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tandem_core::RequestContext;
use tracing::debug;
use uuid::Uuid;

use super::AppState;
use crate::network::auth::bearer_token;
use crate::network::HealthState;
use crate::remote::{CORRELATION_HEADER, MSGPACK_CONTENT_TYPE};

/// Decodes an envelope, runs it, and answers with the encoded reply.
///
/// Transport-level rejections use HTTP status codes (503 while not ready,
/// 401 for a bad bearer token); every operation outcome, failures included,
/// is a 200 carrying a response envelope.
///
/// The operation is cancelled when the caller disconnects (axum drops this
/// future) or when the host shuts down.
pub async fn remote_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    if state.shutdown.health_state() != HealthState::Ready {
        return (StatusCode::SERVICE_UNAVAILABLE, "not accepting requests").into_response();
    }

    let mut context = RequestContext::new(state.endpoint.node_id()).with_correlation_id(correlation_id.clone());
    if let (Some(verifier), Some(token)) = (&state.verifier, bearer_token(&headers)) {
        match verifier.verify(token) {
            Ok(principal) => context = context.with_principal(principal),
            Err(err) => {
                debug!(%correlation_id, error = %err, "rejected bearer token");
                return (StatusCode::UNAUTHORIZED, "invalid bearer token").into_response();
            }
        }
    }

    let _in_flight = state.shutdown.in_flight_guard();
    let cancel = state.shutdown.token().child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let reply = state.endpoint.handle(&correlation_id, &body, context, cancel).await;

    let mut response = ([(CONTENT_TYPE, MSGPACK_CONTENT_TYPE)], reply).into_response();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
