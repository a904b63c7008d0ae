//! Error taxonomy for the gateway core.
//!
//! # Responsibilities
//! - Classify every failure the router can surface to a client
//! - Map each class to exactly one HTTP status
//! - Keep handler internals out of client-visible bodies
//!
//! # Design Decisions
//! - Module authors return [`ModuleError`] so any error converts with `?`
//! - Only [`GatewayError::RoutingVetoed`] carries a client-visible message;
//!   everything else answers with the bare status line

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::http::response::error_response;
use crate::module::Capability;

/// Error type returned by module callbacks.
pub type ModuleError = Box<dyn std::error::Error + Send + Sync>;

/// Message sent to the client when a route listener cancels a request.
pub const VETOED_MESSAGE: &str = "The request has been canceled by an event listener";

/// Errors raised by the module registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already taken for the given capability.
    #[error("module id '{id}' already exists for capability {capability}")]
    DuplicateId { id: String, capability: Capability },

    /// The module implements neither capability.
    #[error("invalid module type: module supports neither HTTP nor WebSocket")]
    InvalidModuleType,
}

/// Failures surfaced to HTTP clients by the request router.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The inbound request could not be decoded or buffered.
    #[error("malformed request: {0}")]
    DecodeFailure(String),

    /// A route listener cancelled the request.
    #[error("request vetoed by route listener")]
    RoutingVetoed,

    /// No module is registered under the requested id.
    #[error("no module registered for id {0:?}")]
    ModuleNotFound(Option<String>),

    /// A module exists but not with the capability this request needs.
    #[error("module '{0}' cannot serve this request type")]
    CapabilityMismatch(String),

    /// The module handler returned an error or panicked.
    #[error("module '{module}' failed: {source}")]
    HandlerFailure {
        module: String,
        #[source]
        source: ModuleError,
    },

    /// The client asked for a WebSocket protocol version we do not speak.
    #[error("unsupported WebSocket version {0:?}")]
    HandshakeVersionUnsupported(Option<String>),

    /// Post-processing of a module response failed.
    #[error("response finalization failed: {0}")]
    Finalization(String),
}

impl GatewayError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::DecodeFailure(_) => StatusCode::BAD_REQUEST,
            GatewayError::RoutingVetoed => StatusCode::FORBIDDEN,
            GatewayError::ModuleNotFound(_) | GatewayError::CapabilityMismatch(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::HandlerFailure { .. } | GatewayError::Finalization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::HandshakeVersionUnsupported(_) => StatusCode::UPGRADE_REQUIRED,
        }
    }

    /// Message placed in the client-visible body, if any.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            GatewayError::RoutingVetoed => Some(VETOED_MESSAGE),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = error_response(self.status(), self.client_message());
        if let GatewayError::HandshakeVersionUnsupported(_) = self {
            response.headers_mut().insert(
                axum::http::header::SEC_WEBSOCKET_VERSION,
                axum::http::HeaderValue::from_static(crate::websocket::SUPPORTED_VERSION),
            );
        }
        response
    }
}

/// Errors on an upgraded WebSocket connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A frame kind the connection does not accept.
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// A lifecycle callback returned an error or panicked.
    #[error("connection callback failed: {0}")]
    Callback(ModuleError),

    /// The underlying socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// Text payload was not valid UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidText,

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}
