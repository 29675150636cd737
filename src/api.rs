use crate::{
    app::AppState,
    constants::{FALLBACK_HOST, TOKEN_PATH},
    error::ProxyError,
    route::{RepositoryPath, Route},
    scope::normalize_scope,
};
use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::{Request, State},
    http::{
        HeaderMap, Response, StatusCode, Uri,
        header::{self, HeaderValue},
    },
    response::IntoResponse,
};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Entry point for every request. Any failure below is turned into a
/// deterministic JSON error response here and never escapes to the server.
pub async fn handle(State(state): State<AppState>, req: Request<Body>) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match dispatch(&state, req).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                method = %method,
                path,
                status = err.status().as_u16(),
                error = %err,
                "request failed"
            );
            err.into_response()
        }
    }
}

#[instrument(
    skip(state, req),
    fields(method = %req.method(), path = %req.uri().path(), route = tracing::field::Empty)
)]
async fn dispatch(state: &AppState, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
    let route = Route::classify(req.uri().path());
    tracing::Span::current().record("route", route.as_str());
    debug!(has_query = req.uri().query().is_some(), "dispatching request");

    match route {
        Route::Landing => redirect_response(&state.landing_url),
        Route::Challenge => {
            let origin = request_origin(state, req.headers(), req.uri());
            challenge_response(state, &origin).await
        }
        Route::Token => token_response(state, req).await,
        Route::NamespaceRedirect(repo) => {
            let origin = request_origin(state, req.headers(), req.uri());
            namespace_redirect(state, repo, &origin, req.uri().query())
        }
        Route::Proxy => proxy_response(state, req).await,
    }
}

/// Mirrors the registry's `/v2/` status and body, replacing every header with
/// a bearer challenge that points clients at this host's token endpoint.
async fn challenge_response(state: &AppState, origin: &str) -> Result<Response<Body>, ProxyError> {
    let discovery = state.upstream.discovery().await?;
    let challenge = format!(
        "Bearer realm=\"{origin}{TOKEN_PATH}\",service=\"{}\"",
        state.challenge_service
    );
    let challenge = HeaderValue::from_str(&challenge).map_err(|_| ProxyError::Internal)?;

    let mut response = Response::new(discovery.body);
    *response.status_mut() = discovery.status;
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, challenge);
    Ok(response)
}

async fn token_response(state: &AppState, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
    let params = query_params(req.uri().query());
    let scope = params
        .get("scope")
        .map(|scope| normalize_scope(scope, &state.default_namespace));
    match scope.as_deref() {
        Some(scope) => debug!(scope, "requesting token"),
        None => debug!("requesting token without scope"),
    }

    let (parts, body) = req.into_parts();
    let body = outbound_body(body, state.max_body_size).await?;
    let token = state
        .token_service
        .fetch(parts.method, &parts.headers, scope.as_deref(), body)
        .await?;
    Ok(token.into_response())
}

fn namespace_redirect(
    state: &AppState,
    repo: RepositoryPath,
    origin: &str,
    query: Option<&str>,
) -> Result<Response<Body>, ProxyError> {
    let path = repo.with_namespace(&state.default_namespace).to_path();
    let location = match query {
        Some(query) => format!("{origin}{path}?{query}"),
        None => format!("{origin}{path}"),
    };
    debug!(location, "redirecting to namespaced repository path");
    redirect_response(&location)
}

async fn proxy_response(state: &AppState, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = req.into_parts();
    let body = outbound_body(body, state.max_body_size).await?;
    let upstream = state
        .upstream
        .forward(parts.method, parts.uri.path(), &parts.headers, body)
        .await?;

    if upstream.status.is_redirection() {
        debug!(
            status = upstream.status.as_u16(),
            location = upstream
                .headers
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default(),
            "relaying upstream redirect to client"
        );
    }
    Ok(upstream.into_response())
}

fn redirect_response(location: &str) -> Result<Response<Body>, ProxyError> {
    Ok(Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .body(Body::empty())?)
}

/// Streams the request body through untouched, or buffers it first when a
/// size cap is configured. Bodies known to be empty are not sent at all.
async fn outbound_body(
    body: Body,
    max_body_size: Option<usize>,
) -> Result<Option<reqwest::Body>, ProxyError> {
    if body.size_hint().exact() == Some(0) {
        return Ok(None);
    }
    let Some(limit) = max_body_size else {
        return Ok(Some(reqwest::Body::wrap_stream(body.into_data_stream())));
    };
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|_| ProxyError::http(StatusCode::PAYLOAD_TOO_LARGE, "request entity too large"))?;
    Ok(Some(reqwest::Body::from(bytes)))
}

/// First value wins for repeated keys.
fn query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(query) = query else {
        return out;
    };

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = urlencoding::decode(key)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        out.entry(key).or_insert(value);
    }

    out
}

fn request_origin(state: &AppState, headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = if state.trust_proxy {
        first_header_value(headers, "x-forwarded-proto").unwrap_or(state.public_scheme.as_str())
    } else {
        state.public_scheme.as_str()
    };

    let host_header = if state.trust_proxy {
        first_header_value(headers, "x-forwarded-host")
            .or_else(|| first_header_value(headers, header::HOST.as_str()))
    } else {
        first_header_value(headers, header::HOST.as_str())
    };
    let host = host_header
        .map(ToOwned::to_owned)
        .or_else(|| uri.authority().map(|authority| authority.to_string()))
        .unwrap_or_else(|| FALLBACK_HOST.to_string());

    format!("{scheme}://{host}")
}

fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{first_header_value, outbound_body, query_params};
    use axum::{
        body::Body,
        http::{HeaderMap, HeaderValue, StatusCode},
    };

    #[test]
    fn query_params_decode_and_keep_first_value() {
        let params = query_params(Some(
            "scope=repository%3Aalpine%3Apull&service=x&scope=repository:other:push&flag",
        ));
        assert_eq!(
            params.get("scope").map(String::as_str),
            Some("repository:alpine:pull")
        );
        assert_eq!(params.get("service").map(String::as_str), Some("x"));
        assert!(!params.contains_key("flag"));
        assert!(query_params(None).is_empty());
    }

    #[test]
    fn forwarded_header_lists_use_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-host",
            HeaderValue::from_static("edge.test, internal.test"),
        );
        assert_eq!(
            first_header_value(&headers, "x-forwarded-host"),
            Some("edge.test")
        );
        assert_eq!(first_header_value(&headers, "x-forwarded-proto"), None);
    }

    #[tokio::test]
    async fn empty_bodies_are_not_forwarded() {
        assert!(outbound_body(Body::empty(), None).await.expect("body").is_none());
        assert!(outbound_body(Body::empty(), Some(1)).await.expect("body").is_none());
    }

    #[tokio::test]
    async fn uncapped_bodies_stream_without_a_length() {
        let body = outbound_body(Body::from("layer"), None)
            .await
            .expect("body")
            .expect("non-empty");
        assert!(body.as_bytes().is_none());
    }

    #[tokio::test]
    async fn capped_bodies_are_buffered_and_checked() {
        let body = outbound_body(Body::from("layer"), Some(16))
            .await
            .expect("body")
            .expect("non-empty");
        assert_eq!(body.as_bytes(), Some(&b"layer"[..]));

        let err = outbound_body(Body::from("0123456789"), Some(4))
            .await
            .expect_err("too large");
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
