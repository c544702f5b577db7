use axum::http::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("bad request: {context}: {source}")]
    BadRequestWithSource {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("engine error: {0}")]
    Engine(String),
    #[error("engine error: {context}: {source}")]
    EngineWithSource {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("internal error: {context}: {source}")]
    InternalWithSource {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn bad_request_with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::BadRequestWithSource {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    pub fn engine_with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::EngineWithSource {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn internal_with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::InternalWithSource {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::BadRequestWithSource { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// The message put on the wire: no category prefix, so clients see
    /// e.g. `No image uploaded` rather than `bad request: No image uploaded`.
    pub fn detail(&self) -> String {
        match self {
            Self::BadRequest(message)
            | Self::Engine(message)
            | Self::Cancelled(message)
            | Self::Internal(message) => message.clone(),
            Self::BadRequestWithSource { context, source }
            | Self::EngineWithSource { context, source }
            | Self::InternalWithSource { context, source } => format!("{context}: {source}"),
        }
    }

    pub fn format_chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = std::error::Error::source(err);
        }
        chain.join(" | caused by: ")
    }
}
