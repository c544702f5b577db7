mod handlers;
mod multipart;
mod router_builder;
mod streaming;
mod wire_types;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

pub use router_builder::{AppState, RouterBuilder};
pub use streaming::{NDJSON_CONTENT_TYPE, ndjson_response};
pub use wire_types::*;

pub(crate) fn infer_error_response(err: crate::Error) -> Response {
    let chain = err.format_chain();
    if err.is_client_error() {
        warn!(error = %chain, "request failed");
    } else {
        error!(error = %chain, "request failed");
    }
    (
        err.status_code(),
        Json(ErrorResponse {
            detail: err.detail(),
        }),
    )
        .into_response()
}
