use crate::{constants::HOP_BY_HOP_HEADERS, error::ProxyError};
use axum::{
    body::Body,
    http::{HeaderMap, Method, Response, StatusCode, header},
};
use reqwest::{Client, redirect::Policy};
use std::time::Duration;
use tracing::{debug, error, instrument};

/// An outbound response whose body is relayed to the client as it arrives.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl UpstreamResponse {
    fn relay(resp: reqwest::Response) -> Self {
        let status = resp.status();
        let mut headers = resp.headers().clone();
        strip_hop_by_hop(&mut headers);
        Self {
            status,
            headers,
            body: Body::from_stream(resp.bytes_stream()),
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// The container registry every unmatched request is forwarded to.
///
/// Redirects are never followed: a 3xx (typically to blob storage on another
/// host) goes back to the client so it can resend its own credentials.
#[derive(Debug, Clone)]
pub struct Upstream {
    base_url: String,
    client: Client,
}

impl Upstream {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ProxyError> {
        let base_url = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(Policy::none(), timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET <base>/v2/`, sent without any client headers.
    #[instrument(skip(self), fields(upstream = %self.base_url))]
    pub async fn discovery(&self) -> Result<UpstreamResponse, ProxyError> {
        let url = format!("{}/v2/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ProxyError::upstream(&url, err))?;
        debug!(status = resp.status().as_u16(), "registry discovery answered");
        Ok(UpstreamResponse::relay(resp))
    }

    /// Sends `method <base><path>` with the caller's end-to-end headers and body.
    /// Any query string must already be stripped from `path`.
    #[instrument(skip(self, headers, body), fields(upstream = %self.base_url, has_body = body.is_some()))]
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: Option<reqwest::Body>,
    ) -> Result<UpstreamResponse, ProxyError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .headers(outbound_headers(headers));
        if let Some(body) = body {
            request = request.body(body);
        }
        let resp = request
            .send()
            .await
            .map_err(|err| ProxyError::upstream(&url, err))?;
        debug!(status = resp.status().as_u16(), "registry answered");
        Ok(UpstreamResponse::relay(resp))
    }
}

/// The external service that issues registry bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenService {
    url: String,
    service: String,
    client: Client,
}

impl TokenService {
    pub fn new(
        url: impl Into<String>,
        service: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ProxyError> {
        let url = url.into();
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            service: service.into(),
            client: build_client(Policy::default(), timeout)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requests a token with `service` and, when given, `scope` as the only query
    /// parameters. Method, headers and body are the client's own.
    #[instrument(skip(self, headers, body), fields(token_service = %self.url, service = %self.service))]
    pub async fn fetch(
        &self,
        method: Method,
        headers: &HeaderMap,
        scope: Option<&str>,
        body: Option<reqwest::Body>,
    ) -> Result<UpstreamResponse, ProxyError> {
        let mut query = vec![("service", self.service.as_str())];
        if let Some(scope) = scope {
            query.push(("scope", scope));
        }
        let mut request = self
            .client
            .request(method, &self.url)
            .headers(outbound_headers(headers))
            .query(&query);
        if let Some(body) = body {
            request = request.body(body);
        }
        let resp = request
            .send()
            .await
            .map_err(|err| ProxyError::upstream(&self.url, err))?;
        debug!(status = resp.status().as_u16(), "token service answered");
        Ok(UpstreamResponse::relay(resp))
    }
}

fn build_client(policy: Policy, timeout: Option<Duration>) -> Result<Client, ProxyError> {
    let mut builder = Client::builder().redirect(policy);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|err| {
        error!(error = %err, "failed to build http client");
        ProxyError::Internal
    })
}

fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    // Content-Length stays: the body is passed through byte for byte.
    headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);
    headers
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}
