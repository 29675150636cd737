use axum::{
    Json,
    body::Body,
    http::StatusCode,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("upstream request to {target} timed out")]
    UpstreamTimeout { target: String },
    #[error("upstream request to {target} failed: {source}")]
    Upstream {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("internal server error")]
    Internal,
}

impl ProxyError {
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Classifies a transport failure against `target` as a timeout or a plain gateway error.
    pub fn upstream(target: impl Into<String>, source: reqwest::Error) -> Self {
        let target = target.into();
        if source.is_timeout() {
            Self::UpstreamTimeout { target }
        } else {
            Self::Upstream { target, source }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Http { status, .. } => *status,
            ProxyError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &str {
        match self {
            ProxyError::Http { message, .. } => message,
            ProxyError::UpstreamTimeout { .. } => "upstream timed out",
            ProxyError::Upstream { .. } => "upstream is unreachable",
            ProxyError::Internal => "unknown error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::to_vec(&ErrorBody {
            error: self.public_message(),
        })
        .unwrap_or_else(|_| b"{\"error\":\"unknown error\"}".to_vec());
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, crate::constants::HEADER_JSON)
            .body(Body::from(body))
            .unwrap_or_else(|_| {
                let fallback = Json(ErrorBody {
                    error: "unknown error",
                });
                (StatusCode::INTERNAL_SERVER_ERROR, fallback).into_response()
            })
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(_: std::io::Error) -> Self {
        ProxyError::Internal
    }
}

impl From<axum::http::Error> for ProxyError {
    fn from(_: axum::http::Error) -> Self {
        ProxyError::Internal
    }
}
