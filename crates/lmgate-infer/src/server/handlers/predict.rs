use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::server::{AppState, PredictRequest, infer_error_response, ndjson_response};

fn parse_body(body: Result<Json<PredictRequest>, JsonRejection>) -> crate::Result<PredictRequest> {
    body.map(|Json(req)| req)
        .map_err(|rejection| crate::Error::bad_request(rejection.body_text()))
}

#[tracing::instrument(name = "lmgate.http.predict", skip_all, fields(path = "/predict"))]
pub async fn predict(
    State(app): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let req = match parse_body(body) {
        Ok(req) => req,
        Err(e) => return infer_error_response(e),
    };
    if req.stream {
        debug!("stream flag ignored on /predict; use /predictstream");
    }

    match app.api().predict(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => infer_error_response(e),
    }
}

#[tracing::instrument(
    name = "lmgate.http.predict_stream",
    skip_all,
    fields(path = "/predictstream")
)]
pub async fn predict_stream(
    State(app): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let req = match parse_body(body) {
        Ok(req) => req,
        Err(e) => return infer_error_response(e),
    };

    match app.api().predict_stream(req).await {
        Ok(run) => {
            debug!(request_id = %run.request_id, "text stream opened");
            ndjson_response(run.rx)
        }
        Err(e) => infer_error_response(e),
    }
}
