use std::any::Any;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::error;

use crate::api::ApiService;
use crate::config::BackendConfig;
use crate::engine::EngineHandle;
use crate::server::handlers;
use crate::server::{ErrorResponse, HealthResponse};
use crate::vision::VisionCell;

pub const INSTANCE_ID_HEADER: &str = "x-instance-id";

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<BackendConfig>,
    pub engine: EngineHandle,
    pub vision: Arc<VisionCell>,
}

impl AppState {
    pub fn api(&self) -> ApiService {
        ApiService::new(self.cfg.clone(), self.engine.clone(), self.vision.clone())
    }
}

#[derive(Default)]
pub struct RouterBuilder {
    state: Option<AppState>,
    allowed_origins: Option<Vec<String>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_allowed_origins(mut self, allowed_origins: Vec<String>) -> Self {
        self.allowed_origins = Some(allowed_origins);
        self
    }

    pub fn build(self) -> crate::Result<Router> {
        let state = self
            .state
            .ok_or_else(|| crate::Error::internal("state must be set"))?;

        let allow_origin = match self.allowed_origins {
            Some(origins) => {
                let parsed: Result<Vec<HeaderValue>, _> =
                    origins.iter().map(|o| o.parse::<HeaderValue>()).collect();
                let origins = parsed.map_err(|e| {
                    crate::Error::bad_request_with_source("invalid allowed origin", e)
                })?;
                AllowOrigin::list(origins)
            }
            None => AllowOrigin::any(),
        };

        let cors_layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE])
            .allow_origin(allow_origin);

        let instance_id = state
            .cfg
            .instance_id
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| crate::Error::internal_with_source("invalid instance id", e))?;

        let router = Router::new()
            .route("/predict", post(handlers::predict))
            .route("/predictstream", post(handlers::predict_stream))
            .route("/describeimage", post(handlers::describe_image))
            .route("/describeimagestream", post(handlers::describe_image_stream))
            .route("/describeimagebatch", post(handlers::describe_image_batch))
            .route(
                "/describeimagebatchstream",
                post(handlers::describe_image_batch_stream),
            )
            .route("/health", get(health))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(cors_layer)
            .layer(DefaultBodyLimit::max(state.cfg.request_body_limit_bytes))
            .with_state(state);

        let router = match instance_id {
            Some(value) => router.layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(INSTANCE_ID_HEADER),
                value,
            )),
            None => router,
        };

        Ok(router)
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: true,
    })
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %message, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            detail: format!("Internal server error: {message}"),
        }),
    )
        .into_response()
}
