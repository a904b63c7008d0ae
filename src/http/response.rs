//! Response construction and finalization.
//!
//! # Responsibilities
//! - Build plain-text error responses for every router failure
//! - Give module authors a small builder for response drafts
//! - Finalize module drafts: protocol version, identity headers, gzip,
//!   date and CORS
//!
//! # Design Decisions
//! - Every response written by the core closes the connection afterwards
//! - Headers already present on a draft win over the defaults added here,
//!   except the identity headers which are always overwritten
//! - Settings are swappable at runtime (see `server.rs`) and read per request

use std::time::SystemTime;

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::{response, HeaderMap, Response, StatusCode, Version};
use serde::Serialize;

use crate::config::ResponseConfig;
use crate::error::GatewayError;
use crate::http::compression;
use crate::http::ResponseDraft;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_HTML: &str = "text/html";
pub const MIME_JSON: &str = "application/json";

/// Header carrying the powered-by banner.
pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Header naming the module that produced the response.
pub const MODULE: HeaderName = HeaderName::from_static("module");

/// Body of an error response: the status line, then the message if any.
fn error_body(status: StatusCode, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("{}\r\n{}", status, message),
        None => status.to_string(),
    }
}

/// Plain-text error response written by the core.
pub fn error_response(status: StatusCode, message: Option<&str>) -> Response<Body> {
    let mut response = Response::new(Body::from(error_body(status, message)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Error draft for module authors, in the same format the core uses.
pub fn error(status: StatusCode, message: Option<&str>) -> ResponseDraft {
    let body = Bytes::from(error_body(status, message));
    let mut response = Response::new(body.clone());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    response
}

/// Redirect draft: 301 when `permanently`, 302 otherwise.
pub fn redirect(url: &str, permanently: bool) -> Result<ResponseDraft, BuildError> {
    let status = if permanently {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::FOUND
    };
    ResponseBuilder::new(status).header(header::LOCATION, url).build()
}

/// Errors raised while building a response draft.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid response: {0}")]
    Http(#[from] axum::http::Error),

    #[error("failed to serialize body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Builder for module response drafts.
pub struct ResponseBuilder {
    inner: response::Builder,
    body: Bytes,
    json_error: Option<serde_json::Error>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            inner: Response::builder().status(status).version(Version::HTTP_11),
            body: Bytes::new(),
            json_error: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Set the payload and its `Content-Length`.
    pub fn content(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        if let Some(headers) = self.inner.headers_mut() {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        self
    }

    /// Serialize `value` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.content(bytes).content_type_json(),
            Err(e) => Self {
                json_error: Some(e),
                ..self
            },
        }
    }

    /// Append a header.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: Into<axum::http::Error>,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: Into<axum::http::Error>,
    {
        self.inner = self.inner.header(name, value);
        self
    }

    pub fn content_type(self, mime: &str, with_utf8: bool) -> Self {
        if with_utf8 {
            self.header(header::CONTENT_TYPE, format!("{}; charset=utf-8", mime))
        } else {
            self.header(header::CONTENT_TYPE, mime)
        }
    }

    pub fn content_type_json(self) -> Self {
        self.content_type(MIME_JSON, true)
    }

    pub fn content_type_plain_text(self) -> Self {
        self.content_type(MIME_TEXT, true)
    }

    pub fn content_type_html(self) -> Self {
        self.content_type(MIME_HTML, true)
    }

    pub fn build(self) -> Result<ResponseDraft, BuildError> {
        if let Some(e) = self.json_error {
            return Err(e.into());
        }
        Ok(self.inner.body(self.body)?)
    }
}

/// Header values applied to every finalized module response.
#[derive(Debug, Clone)]
pub struct ResponseSettings {
    pub server: HeaderValue,
    pub powered_by: HeaderValue,
    pub access_control_allow_origin: Option<HeaderValue>,
}

impl ResponseSettings {
    pub fn from_config(config: &ResponseConfig) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            server: HeaderValue::from_str(&config.server_name)?,
            powered_by: HeaderValue::from_str(&config.powered_by)?,
            access_control_allow_origin: config
                .access_control_allow_origin
                .as_deref()
                .map(HeaderValue::from_str)
                .transpose()?,
        })
    }
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self::from_config(&ResponseConfig::default())
            .unwrap_or_else(|_| Self {
                server: HeaderValue::from_static(env!("CARGO_PKG_NAME")),
                powered_by: HeaderValue::from_static(env!("CARGO_PKG_NAME")),
                access_control_allow_origin: None,
            })
    }
}

/// Turn a module draft into the response written to the client.
pub fn finalize(
    draft: ResponseDraft,
    module_id: &str,
    request_headers: &HeaderMap,
    settings: &ResponseSettings,
) -> Result<Response<Body>, GatewayError> {
    let (mut parts, mut payload) = draft.into_parts();
    parts.version = Version::HTTP_11;

    let module = HeaderValue::from_str(module_id)
        .map_err(|e| GatewayError::Finalization(format!("module header: {}", e)))?;
    let headers = &mut parts.headers;
    headers.insert(header::SERVER, settings.server.clone());
    headers.insert(X_POWERED_BY, settings.powered_by.clone());
    headers.insert(MODULE, module);

    if !headers.contains_key(header::CONTENT_ENCODING) && compression::accepts_gzip(request_headers) {
        let compressed = compression::gzip(&payload)
            .map_err(|e| GatewayError::Finalization(format!("gzip: {}", e)))?;
        payload = Bytes::from(compressed);
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(payload.len()));
    }

    if !headers.contains_key(header::DATE) {
        let now = httpdate::fmt_http_date(SystemTime::now());
        if let Ok(date) = HeaderValue::from_str(&now) {
            headers.insert(header::DATE, date);
        }
    }

    if let Some(origin) = &settings.access_control_allow_origin {
        if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
    }

    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    Ok(Response::from_parts(parts, Body::from(payload)))
}
