use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::server::multipart::{read_batch_form, read_image_form};
use crate::server::{AppState, infer_error_response, ndjson_response};

fn multipart_body(body: Result<Multipart, MultipartRejection>) -> crate::Result<Multipart> {
    body.map_err(|rejection| crate::Error::bad_request(rejection.body_text()))
}

#[tracing::instrument(name = "lmgate.http.describe_image", skip_all, fields(path = "/describeimage"))]
pub async fn describe_image(
    State(app): State<AppState>,
    body: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match multipart_body(body) {
        Ok(multipart) => read_image_form(multipart).await,
        Err(e) => Err(e),
    };
    let result = match form {
        Ok(form) => app.api().describe_image(form).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => infer_error_response(e),
    }
}

#[tracing::instrument(
    name = "lmgate.http.describe_image_stream",
    skip_all,
    fields(path = "/describeimagestream")
)]
pub async fn describe_image_stream(
    State(app): State<AppState>,
    body: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match multipart_body(body) {
        Ok(multipart) => read_image_form(multipart).await,
        Err(e) => Err(e),
    };
    let run = match form {
        Ok(form) => app.api().describe_image_stream(form).await,
        Err(e) => Err(e),
    };
    match run {
        Ok(run) => {
            debug!(request_id = %run.request_id, "image stream opened");
            ndjson_response(run.rx)
        }
        Err(e) => infer_error_response(e),
    }
}

#[tracing::instrument(
    name = "lmgate.http.describe_image_batch",
    skip_all,
    fields(path = "/describeimagebatch")
)]
pub async fn describe_image_batch(
    State(app): State<AppState>,
    body: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match multipart_body(body) {
        Ok(multipart) => read_batch_form(multipart).await,
        Err(e) => Err(e),
    };
    let result = match form {
        Ok(form) => app.api().describe_image_batch(form).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => infer_error_response(e),
    }
}

#[tracing::instrument(
    name = "lmgate.http.describe_image_batch_stream",
    skip_all,
    fields(path = "/describeimagebatchstream")
)]
pub async fn describe_image_batch_stream(
    State(app): State<AppState>,
    body: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match multipart_body(body) {
        Ok(multipart) => read_batch_form(multipart).await,
        Err(e) => Err(e),
    };
    let run = match form {
        Ok(form) => app.api().describe_image_batch_stream(form).await,
        Err(e) => Err(e),
    };
    match run {
        Ok(run) => {
            debug!(request_id = %run.request_id, "batch stream opened");
            ndjson_response(run.rx)
        }
        Err(e) => infer_error_response(e),
    }
}
